//! Recognizing authentication prompts in `svn` error output.

use crate::SvnError;

/// Prefix of the error `svn` prints for an untrusted server certificate.
pub const CERTIFICATE_ERROR: &str = "Error validating server certificate for";
/// Prefix of the prompt `svn` prints when a realm needs credentials.
pub const AUTHENTICATION_REALM: &str = "Authentication realm:";
/// Prefix of the prompt `svn` prints for a client certificate passphrase.
pub const PASSPHRASE_FOR: &str = "Passphrase for";

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
/// The kind of a [`Challenge`].
pub enum ChallengeKind {
    /// Username/password (or username-only) credentials for a realm.
    Realm,
    /// Server certificate acceptance.
    Certificate,
    /// Client certificate passphrase.
    Passphrase,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
/// An authentication prompt recognized in error output.
pub enum Challenge {
    /// Credentials are needed for `realm`.
    Realm {
        /// Realm name as printed by the server.
        realm: String,
        /// Whether the prompt mentions a password (as opposed to a
        /// username-only prompt).
        is_password: bool,
    },
    /// The server certificate for `realm` could not be validated.
    Certificate {
        /// The server URL the certificate was presented for.
        realm: String,
    },
    /// A passphrase is needed; `target` is whatever followed the prefix.
    Passphrase {
        /// Remainder of the prompt (usually the key or certificate name).
        target: String,
    },
}

impl Challenge {
    /// Returns the kind of this challenge.
    pub fn kind(&self) -> ChallengeKind {
        match self {
            Self::Realm { .. } => ChallengeKind::Realm,
            Self::Certificate { .. } => ChallengeKind::Certificate,
            Self::Passphrase { .. } => ChallengeKind::Passphrase,
        }
    }
}

/// Classifies accumulated error output.
///
/// Prefixes are checked in a fixed order (certificate, realm, passphrase) and
/// the first match wins. Returns `Ok(None)` if the text is not an
/// authentication prompt, and [`SvnError::MalformedChallenge`] if it starts
/// with a known prefix but lacks the expected newline or quotes.
///
/// # Examples
///
/// ```
/// # use svn_cmdline::{Challenge, classify};
/// let challenge = classify("Authentication realm: <svn://host:3690> repo\nPassword for 'alice':")
///     .unwrap()
///     .unwrap();
/// assert_eq!(
///     challenge,
///     Challenge::Realm { realm: "<svn://host:3690> repo".into(), is_password: true }
/// );
/// ```
pub fn classify(error_text: &str) -> Result<Option<Challenge>, SvnError> {
    let text = error_text.trim();
    if let Some(rest) = text.strip_prefix(CERTIFICATE_ERROR) {
        return parse_certificate(text, rest).map(Some);
    }
    if let Some(rest) = text.strip_prefix(AUTHENTICATION_REALM) {
        return parse_realm(text, rest).map(Some);
    }
    if let Some(rest) = text.strip_prefix(PASSPHRASE_FOR) {
        return Ok(Some(Challenge::Passphrase {
            target: rest.trim().to_string(),
        }));
    }
    Ok(None)
}

fn parse_realm(text: &str, rest: &str) -> Result<Challenge, SvnError> {
    let Some((realm, _)) = rest.split_once('\n') else {
        return Err(SvnError::MalformedChallenge(text.to_string()));
    };
    Ok(Challenge::Realm {
        realm: realm.trim().to_string(),
        is_password: text.to_ascii_lowercase().contains("password"),
    })
}

fn parse_certificate(text: &str, rest: &str) -> Result<Challenge, SvnError> {
    let malformed = || SvnError::MalformedChallenge(text.to_string());
    let (head, _) = rest.split_once('\n').ok_or_else(malformed)?;
    let (_, after_open) = head.split_once('\'').ok_or_else(malformed)?;
    let (realm, _) = after_open.split_once('\'').ok_or_else(malformed)?;
    Ok(Challenge::Certificate {
        realm: realm.to_string(),
    })
}
