//! Resolving authentication challenges through a pluggable backend.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::challenge::{Challenge, ChallengeKind};
use crate::SvnError;

/// Supplies credentials when `svn` reports an authentication challenge.
///
/// Implementations typically prompt the user and store what they enter in
/// the `svn` configuration directory (the default one, or the directory
/// returned by [`AuthenticationBackend::special_config_dir`]) so that the
/// retried command picks it up. Methods may block while a prompt is open;
/// [`crate::SvnRunner`] calls them on tokio's blocking thread pool.
pub trait AuthenticationBackend: Send + Sync {
    /// Obtains credentials for `realm` (`None` for a passphrase prompt).
    ///
    /// Returns `false` if the user canceled.
    fn authenticate_for(
        &self,
        realm: Option<&str>,
        base: &Path,
        using_custom_config: bool,
        is_password: bool,
    ) -> bool;

    /// Asks whether to trust the server certificate presented for `realm`.
    fn accept_ssl_server_certificate(&self, base: &Path, realm: &str) -> bool;

    /// Forgets credentials cached for `realm` that `svn` would otherwise
    /// reuse without prompting.
    fn clear_passive_credentials(&self, realm: &str, base: &Path, is_password: bool);

    /// Returns the configuration directory the retried command should use,
    /// if the backend keeps its own.
    fn special_config_dir(&self) -> Option<PathBuf> {
        None
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
/// Resolution state for one kind of challenge during a run.
pub enum CredentialCase {
    /// Realm credentials; `tried` is set after the first prompt.
    Realm {
        /// Whether the backend was already asked during this run.
        tried: bool,
    },
    /// Server certificate acceptance; only one acceptance is honored.
    Certificate {
        /// Whether the certificate was already accepted during this run.
        tried: bool,
    },
    /// Client certificate passphrase.
    Passphrase {
        /// Whether the backend was already asked during this run.
        tried: bool,
    },
}

impl CredentialCase {
    /// Creates a fresh (untried) case for `kind`.
    pub fn new(kind: ChallengeKind) -> Self {
        match kind {
            ChallengeKind::Realm => Self::Realm { tried: false },
            ChallengeKind::Certificate => Self::Certificate { tried: false },
            ChallengeKind::Passphrase => Self::Passphrase { tried: false },
        }
    }

    /// Returns whether this case was already tried.
    pub fn tried(&self) -> bool {
        match *self {
            Self::Realm { tried } | Self::Certificate { tried } | Self::Passphrase { tried } => {
                tried
            }
        }
    }

    /// Returns the challenge kind this case handles.
    pub fn kind(&self) -> ChallengeKind {
        match self {
            Self::Realm { .. } => ChallengeKind::Realm,
            Self::Certificate { .. } => ChallengeKind::Certificate,
            Self::Passphrase { .. } => ChallengeKind::Passphrase,
        }
    }

    /// Resolves `challenge` through `backend`.
    ///
    /// `Ok(())` means credentials are in place and the command should be
    /// retried. A declined prompt is returned as
    /// [`SvnError::AuthenticationCanceled`] or
    /// [`SvnError::CertificateRejected`]. A challenge of another kind
    /// replaces this case with one of that kind, starting untried.
    pub fn resolve(
        &mut self,
        challenge: &Challenge,
        backend: &dyn AuthenticationBackend,
        base: &Path,
    ) -> Result<(), SvnError> {
        let tried = self.kind() == challenge.kind() && self.tried();
        let using_custom_config = backend.special_config_dir().is_some();
        match challenge {
            Challenge::Realm { realm, is_password } => {
                if tried {
                    debug!(realm = %realm, "realm prompted again; clearing cached credentials");
                    backend.clear_passive_credentials(realm, base, *is_password);
                }
                *self = Self::Realm { tried: true };
                if backend.authenticate_for(Some(realm), base, using_custom_config, *is_password)
                {
                    Ok(())
                } else {
                    Err(SvnError::AuthenticationCanceled(realm.clone()))
                }
            }
            Challenge::Certificate { realm } => {
                let accepted = !tried && backend.accept_ssl_server_certificate(base, realm);
                *self = Self::Certificate {
                    tried: tried || accepted,
                };
                if accepted {
                    Ok(())
                } else {
                    Err(SvnError::CertificateRejected(realm.clone()))
                }
            }
            Challenge::Passphrase { target } => {
                *self = Self::Passphrase { tried: true };
                if backend.authenticate_for(None, base, using_custom_config, false) {
                    Ok(())
                } else {
                    Err(SvnError::AuthenticationCanceled(target.clone()))
                }
            }
        }
    }
}

/// Per-run credential state, one [`CredentialCase`] per challenge kind.
///
/// Lives as long as one [`crate::SvnRunner::run`] call, so a realm that is
/// prompted for a second time gets its cached credentials cleared first.
/// Owns its backend so it can be moved onto a blocking thread while a prompt
/// is open.
pub struct CredentialResolver {
    backend: Arc<dyn AuthenticationBackend>,
    base: PathBuf,
    realm: CredentialCase,
    certificate: CredentialCase,
    passphrase: CredentialCase,
}

impl std::fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialResolver")
            .field("base", &self.base)
            .field("realm", &self.realm)
            .field("certificate", &self.certificate)
            .field("passphrase", &self.passphrase)
            .finish()
    }
}

impl CredentialResolver {
    /// Creates a resolver for commands running in `base`.
    pub fn new(backend: Arc<dyn AuthenticationBackend>, base: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            base: base.into(),
            realm: CredentialCase::new(ChallengeKind::Realm),
            certificate: CredentialCase::new(ChallengeKind::Certificate),
            passphrase: CredentialCase::new(ChallengeKind::Passphrase),
        }
    }

    /// Returns the backend.
    pub fn backend(&self) -> &Arc<dyn AuthenticationBackend> {
        &self.backend
    }

    /// Returns the state kept for `kind`.
    pub fn case(&self, kind: ChallengeKind) -> &CredentialCase {
        match kind {
            ChallengeKind::Realm => &self.realm,
            ChallengeKind::Certificate => &self.certificate,
            ChallengeKind::Passphrase => &self.passphrase,
        }
    }

    /// Resolves `challenge` with the case kept for its kind.
    pub fn resolve(&mut self, challenge: &Challenge) -> Result<(), SvnError> {
        debug!(kind = ?challenge.kind(), base = %self.base.display(), "resolving challenge");
        let case = match challenge.kind() {
            ChallengeKind::Realm => &mut self.realm,
            ChallengeKind::Certificate => &mut self.certificate,
            ChallengeKind::Passphrase => &mut self.passphrase,
        };
        case.resolve(challenge, self.backend.as_ref(), &self.base)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct RecordingBackend {
        decline: AtomicBool,
        calls: Mutex<Vec<String>>,
        config_dir: Option<PathBuf>,
    }

    impl RecordingBackend {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl AuthenticationBackend for RecordingBackend {
        fn authenticate_for(
            &self,
            realm: Option<&str>,
            _base: &Path,
            using_custom_config: bool,
            is_password: bool,
        ) -> bool {
            self.record(format!(
                "auth {} custom={using_custom_config} password={is_password}",
                realm.unwrap_or("-")
            ));
            !self.decline.load(Ordering::SeqCst)
        }

        fn accept_ssl_server_certificate(&self, _base: &Path, realm: &str) -> bool {
            self.record(format!("cert {realm}"));
            !self.decline.load(Ordering::SeqCst)
        }

        fn clear_passive_credentials(&self, realm: &str, _base: &Path, is_password: bool) {
            self.record(format!("clear {realm} password={is_password}"));
        }

        fn special_config_dir(&self) -> Option<PathBuf> {
            self.config_dir.clone()
        }
    }

    fn realm(name: &str) -> Challenge {
        Challenge::Realm {
            realm: name.into(),
            is_password: true,
        }
    }

    #[test]
    fn realm_clears_cached_credentials_from_the_second_prompt() {
        let backend = Arc::new(RecordingBackend::default());
        let mut resolver = CredentialResolver::new(backend.clone(), "/wc");

        resolver.resolve(&realm("r")).unwrap();
        assert_eq!(backend.calls(), vec!["auth r custom=false password=true"]);

        resolver.resolve(&realm("r")).unwrap();
        resolver.resolve(&realm("r")).unwrap();
        assert_eq!(
            backend.calls(),
            vec![
                "auth r custom=false password=true",
                "clear r password=true",
                "auth r custom=false password=true",
                "clear r password=true",
                "auth r custom=false password=true",
            ]
        );
        assert!(resolver.case(ChallengeKind::Realm).tried());
    }

    #[test]
    fn declined_realm_is_canceled() {
        let backend = Arc::new(RecordingBackend::default());
        backend.decline.store(true, Ordering::SeqCst);
        let mut resolver = CredentialResolver::new(backend.clone(), "/wc");
        let err = resolver.resolve(&realm("corp")).unwrap_err();
        assert!(matches!(err, SvnError::AuthenticationCanceled(ref r) if r == "corp"));
    }

    #[test]
    fn certificate_is_accepted_only_once() {
        let backend = Arc::new(RecordingBackend::default());
        let mut resolver = CredentialResolver::new(backend.clone(), "/wc");
        let challenge = Challenge::Certificate {
            realm: "https://host".into(),
        };

        resolver.resolve(&challenge).unwrap();
        let err = resolver.resolve(&challenge).unwrap_err();
        assert!(matches!(err, SvnError::CertificateRejected(_)));
        assert_eq!(backend.calls(), vec!["cert https://host"]);
    }

    #[test]
    fn rejected_certificate_fails() {
        let backend = RecordingBackend::default();
        backend.decline.store(true, Ordering::SeqCst);
        let mut case = CredentialCase::new(ChallengeKind::Certificate);
        let challenge = Challenge::Certificate {
            realm: "https://host".into(),
        };
        let err = case
            .resolve(&challenge, &backend, Path::new("/wc"))
            .unwrap_err();
        assert!(matches!(err, SvnError::CertificateRejected(_)));
        assert!(!case.tried());
    }

    #[test]
    fn passphrase_asks_without_realm_and_reports_custom_config() {
        let backend = RecordingBackend {
            config_dir: Some(PathBuf::from("/tmp/cfg")),
            ..RecordingBackend::default()
        };
        let mut case = CredentialCase::new(ChallengeKind::Passphrase);
        let challenge = Challenge::Passphrase {
            target: "'client.p12':".into(),
        };
        case.resolve(&challenge, &backend, Path::new("/wc")).unwrap();
        assert!(case.tried());
        assert_eq!(backend.calls(), vec!["auth - custom=true password=false"]);
    }

    #[test]
    fn mismatched_case_is_realigned_to_the_challenge() {
        let backend = RecordingBackend::default();
        let mut case = CredentialCase::Certificate { tried: true };
        case.resolve(&realm("r"), &backend, Path::new("/wc")).unwrap();
        assert_eq!(case, CredentialCase::Realm { tried: true });
    }

    #[test]
    fn tried_state_does_not_carry_over_to_another_kind() {
        let backend = RecordingBackend::default();
        let mut case = CredentialCase::Realm { tried: true };
        let challenge = Challenge::Certificate {
            realm: "https://host".into(),
        };
        case.resolve(&challenge, &backend, Path::new("/wc")).unwrap();
        assert_eq!(case, CredentialCase::Certificate { tried: true });
        assert_eq!(backend.calls(), vec!["cert https://host"]);

        let mut case = CredentialCase::Certificate { tried: true };
        case.resolve(&realm("r"), &backend, Path::new("/wc")).unwrap();
        // A fresh realm case does not clear cached credentials.
        assert_eq!(
            backend.calls(),
            vec!["cert https://host", "auth r custom=false password=true"]
        );
    }
}
