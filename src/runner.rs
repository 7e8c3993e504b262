//! Running `svn` commands with authentication-challenge retry.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::auth::{AuthenticationBackend, CredentialResolver};
use crate::challenge::classify;
use crate::path::{base_directory_for, find_wc_root};
use crate::process::{LineCommand, run_simple};
use crate::{CommandName, Invocation, LineListener, SvnError};

/// What one finished attempt leads to.
#[derive(Debug)]
pub(crate) enum Transition {
    /// The command succeeded.
    Success,
    /// Credentials were resolved; run again (after cleanup).
    Retry {
        /// Configuration directory for the next attempt, if the backend
        /// keeps its own.
        config_dir: Option<PathBuf>,
    },
    /// A challenge was found but no attempt is left; the backend was not
    /// asked.
    Exhausted,
}

/// Decides the outcome of one attempt from its error output and exit code.
///
/// A failure is returned as `Err`. May block while the backend prompts; the
/// runner calls it on the blocking thread pool.
pub(crate) fn evaluate(
    error_text: &str,
    exit_code: i32,
    resolver: Option<&mut CredentialResolver>,
    may_retry: bool,
) -> Result<Transition, SvnError> {
    let error_text = error_text.trim();
    if error_text.is_empty() {
        return if exit_code == 0 {
            Ok(Transition::Success)
        } else {
            Err(SvnError::ExitCode(exit_code))
        };
    }

    let Some(resolver) = resolver else {
        return Err(SvnError::ErrorOutput(error_text.to_string()));
    };
    let Some(challenge) = classify(error_text)? else {
        return Err(SvnError::ErrorOutput(error_text.to_string()));
    };
    debug!(challenge = ?challenge, "authentication challenge in svn output");
    if !may_retry {
        return Ok(Transition::Exhausted);
    }
    resolver.resolve(&challenge)?;
    Ok(Transition::Retry {
        config_dir: resolver.backend().special_config_dir(),
    })
}

/// Runs `svn` commands, resolving authentication prompts through an
/// [`AuthenticationBackend`] and retrying until the command succeeds or
/// fails for another reason.
///
/// # Example
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use svn_cmdline::{CommandName, LineCollector, SvnRunner};
/// # async fn demo() -> svn_cmdline::Result<()> {
/// let runner = SvnRunner::new("svn").with_non_interactive(true);
/// let lines = Arc::new(LineCollector::new());
/// runner
///     .run(CommandName::Status, "/home/alice/wc".as_ref(), &["-u"], lines.clone())
///     .await?;
/// for line in lines.stdout_lines() {
///     println!("{line}");
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SvnRunner {
    exe: PathBuf,
    auth: Option<Arc<dyn AuthenticationBackend>>,
    non_interactive: bool,
    abort_on_error_output: bool,
    env: Vec<(String, String)>,
    max_attempts: Option<usize>,
}

impl std::fmt::Debug for SvnRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SvnRunner")
            .field("exe", &self.exe)
            .field("auth", &self.auth.is_some())
            .field("non_interactive", &self.non_interactive)
            .field("abort_on_error_output", &self.abort_on_error_output)
            .field("env", &self.env)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

impl SvnRunner {
    /// Creates a runner for the `svn` executable at `exe`.
    ///
    /// Commands run with `LC_ALL=C` and `LANG=C` so that authentication
    /// prompts are printed in English; override with [`SvnRunner::with_env`].
    pub fn new(exe: impl Into<PathBuf>) -> Self {
        Self {
            exe: exe.into(),
            auth: None,
            non_interactive: false,
            abort_on_error_output: false,
            env: vec![
                ("LC_ALL".to_string(), "C".to_string()),
                ("LANG".to_string(), "C".to_string()),
            ],
            max_attempts: None,
        }
    }

    /// Returns the executable path.
    pub fn exe(&self) -> &Path {
        &self.exe
    }

    /// Returns the authentication backend, if any.
    pub fn auth_backend(&self) -> Option<&Arc<dyn AuthenticationBackend>> {
        self.auth.as_ref()
    }

    /// Returns whether commands get `--non-interactive`.
    pub fn non_interactive(&self) -> bool {
        self.non_interactive
    }

    /// Returns whether processes are killed on their first error output.
    pub fn abort_on_error_output(&self) -> bool {
        self.abort_on_error_output
    }

    /// Returns the environment overrides.
    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    /// Returns the attempt limit, if any.
    pub fn max_attempts(&self) -> Option<usize> {
        self.max_attempts
    }

    /// Sets the backend used to answer authentication prompts.
    ///
    /// Without a backend any error output fails the run.
    #[must_use]
    pub fn with_auth_backend(mut self, backend: Arc<dyn AuthenticationBackend>) -> Self {
        self.auth = Some(backend);
        self
    }

    /// Passes `--non-interactive` to every command.
    #[must_use]
    pub fn with_non_interactive(mut self, non_interactive: bool) -> Self {
        self.non_interactive = non_interactive;
        self
    }

    /// Kills each process on its first error output (see
    /// [`Invocation::with_abort_on_error_output`]).
    #[must_use]
    pub fn with_abort_on_error_output(mut self, abort: bool) -> Self {
        self.abort_on_error_output = abort;
        self
    }

    /// Sets an environment variable for every command.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.env.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.env.push((key, value)),
        }
        self
    }

    /// Limits how many times one command is launched (the first attempt
    /// included).
    ///
    /// Without a limit a backend that keeps answering a realm prompt keeps
    /// the run going until it declines.
    ///
    /// Values below `1` are clamped to `1`.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = Some(max_attempts.max(1));
        self
    }

    fn invocation(
        &self,
        dir: &Path,
        command: CommandName,
        args: &[&str],
        config_dir: Option<PathBuf>,
    ) -> Invocation {
        self.env.iter().fold(
            Invocation::new(&self.exe, dir, command)
                .with_args(args.iter().copied())
                .with_config_dir(config_dir)
                .with_non_interactive(self.non_interactive)
                .with_abort_on_error_output(self.abort_on_error_output),
            |invocation, (key, value)| invocation.with_env(key, value),
        )
    }

    /// Runs `svn <command> <args>` for `target`, retrying after every
    /// resolved authentication prompt.
    ///
    /// The command runs in `target` if it is a directory, otherwise in its
    /// nearest existing parent; `listener` receives that directory first and
    /// then the output of every attempt. A run the listener cancels ends
    /// with `Ok(())` and is not retried.
    pub async fn run(
        &self,
        command: CommandName,
        target: &Path,
        args: &[&str],
        listener: Arc<dyn LineListener>,
    ) -> Result<(), SvnError> {
        let target = target.to_path_buf();
        let base = blocking(move || base_directory_for(&target)).await??;
        listener.base_directory(&base);

        let mut resolver = self
            .auth
            .clone()
            .map(|backend| CredentialResolver::new(backend, &base));
        let mut config_dir = None;
        let mut attempts = 0usize;

        loop {
            attempts += 1;
            let invocation = self.invocation(&base, command, args, config_dir.clone());
            let mut process = LineCommand::start(invocation, vec![listener.clone()])?;
            let exit_code = process.wait_for_exit().await?;
            if listener.is_canceled() {
                debug!(command = %command, "svn command canceled by listener");
                return Ok(());
            }
            let error_text = process.error_text();

            let may_retry = self.max_attempts.is_none_or(|max| attempts < max);
            let (transition, returned) = {
                let error_text = error_text.clone();
                let mut resolver = resolver.take();
                blocking(move || {
                    let transition =
                        evaluate(&error_text, exit_code, resolver.as_mut(), may_retry);
                    (transition, resolver)
                })
                .await?
            };
            resolver = returned;
            match transition? {
                Transition::Success => return Ok(()),
                Transition::Exhausted => {
                    return Err(SvnError::RetryLimit {
                        attempts,
                        last: error_text.trim().to_string(),
                    });
                }
                Transition::Retry {
                    config_dir: new_config_dir,
                } => {
                    if new_config_dir.is_some() {
                        config_dir = new_config_dir;
                    }
                    self.cleanup(command, &base).await?;
                    debug!(attempt = attempts + 1, command = %command, "retrying svn command");
                }
            }
        }
    }

    /// Prepares the working copy for a retry: write commands that were
    /// interrupted by a prompt can leave it locked.
    async fn cleanup(&self, command: CommandName, base: &Path) -> Result<(), SvnError> {
        let wc_root = {
            let base = base.to_path_buf();
            blocking(move || find_wc_root(&base)).await?
        }
        .ok_or_else(|| SvnError::NoWorkingCopy(base.into()))?;
        if !command.is_writeable() {
            return Ok(());
        }
        debug!(wc_root = %wc_root.display(), "running svn cleanup before retry");
        let invocation = self.invocation(&wc_root, CommandName::Cleanup, &[], None);
        run_simple(invocation)
            .await
            .map(drop)
            .map_err(|err| SvnError::Cleanup(Box::new(err)))
    }
}

/// Runs `f` on the blocking thread pool.
///
/// Backends may hold a prompt open and path lookups touch the file system;
/// neither may stall the runtime.
async fn blocking<T, F>(f: F) -> Result<T, SvnError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| SvnError::Io(std::io::Error::other(err)))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingBackend {
        clears: Mutex<usize>,
        config_dir: Option<PathBuf>,
    }

    impl AuthenticationBackend for CountingBackend {
        fn authenticate_for(&self, _: Option<&str>, _: &Path, _: bool, _: bool) -> bool {
            true
        }

        fn accept_ssl_server_certificate(&self, _: &Path, _: &str) -> bool {
            true
        }

        fn clear_passive_credentials(&self, _: &str, _: &Path, _: bool) {
            *self.clears.lock().unwrap() += 1;
        }

        fn special_config_dir(&self) -> Option<PathBuf> {
            self.config_dir.clone()
        }
    }

    #[test]
    fn empty_error_text_uses_exit_code() {
        assert!(matches!(evaluate("", 0, None, true).unwrap(), Transition::Success));
        assert!(matches!(
            evaluate("  \n", 1, None, true).unwrap_err(),
            SvnError::ExitCode(1)
        ));
    }

    #[test]
    fn unclassified_error_text_fails_regardless_of_exit_code() {
        let backend = Arc::new(CountingBackend::default());
        let mut resolver = CredentialResolver::new(backend.clone(), "/wc");
        for code in [0, 1] {
            let err = evaluate("svn: E155007: not a working copy\n", code, Some(&mut resolver), true)
                .unwrap_err();
            assert!(
                matches!(err, SvnError::ErrorOutput(ref text) if text == "svn: E155007: not a working copy")
            );
        }
    }

    #[test]
    fn challenge_without_backend_is_plain_failure() {
        let err = evaluate("Authentication realm: r\nPassword:", 1, None, true).unwrap_err();
        assert!(matches!(err, SvnError::ErrorOutput(_)));
    }

    #[test]
    fn resolved_challenge_retries_with_backend_config_dir() {
        let backend = Arc::new(CountingBackend {
            config_dir: Some(PathBuf::from("/tmp/svn-config")),
            ..CountingBackend::default()
        });
        let mut resolver = CredentialResolver::new(backend.clone(), "/wc");
        let transition =
            evaluate("Authentication realm: r\nPassword:", 1, Some(&mut resolver), true).unwrap();
        assert!(matches!(
            transition,
            Transition::Retry { config_dir: Some(ref dir) } if dir == Path::new("/tmp/svn-config")
        ));
    }

    #[test]
    fn repeated_realm_clears_credentials_from_second_occurrence() {
        let backend = Arc::new(CountingBackend::default());
        let mut resolver = CredentialResolver::new(backend.clone(), "/wc");
        let text = "Authentication realm: <https://host:443> repo\nPassword for 'alice':";

        evaluate(text, 1, Some(&mut resolver), true).unwrap();
        assert_eq!(*backend.clears.lock().unwrap(), 0);
        evaluate(text, 1, Some(&mut resolver), true).unwrap();
        assert_eq!(*backend.clears.lock().unwrap(), 1);
        evaluate(text, 1, Some(&mut resolver), true).unwrap();
        assert_eq!(*backend.clears.lock().unwrap(), 2);
    }

    #[test]
    fn last_attempt_does_not_ask_the_backend() {
        let backend = Arc::new(CountingBackend::default());
        let mut resolver = CredentialResolver::new(backend.clone(), "/wc");
        let text = "Authentication realm: r\nPassword:";
        evaluate(text, 1, Some(&mut resolver), true).unwrap();

        let transition = evaluate(text, 1, Some(&mut resolver), false).unwrap();
        assert!(matches!(transition, Transition::Exhausted));
        assert_eq!(*backend.clears.lock().unwrap(), 0);
        assert!(resolver.case(crate::ChallengeKind::Realm).tried());
    }

    #[test]
    fn malformed_challenge_is_an_error() {
        let backend = Arc::new(CountingBackend::default());
        let mut resolver = CredentialResolver::new(backend.clone(), "/wc");
        let err = evaluate(
            "Error validating server certificate for https://host",
            1,
            Some(&mut resolver),
            true,
        )
        .unwrap_err();
        assert!(matches!(err, SvnError::MalformedChallenge(_)));
    }

    #[test]
    fn runner_sets_c_locale_and_allows_override() {
        let runner = SvnRunner::new("svn").with_env("LANG", "en_US.UTF-8");
        assert_eq!(
            runner.env(),
            &[
                ("LC_ALL".to_string(), "C".to_string()),
                ("LANG".to_string(), "en_US.UTF-8".to_string()),
            ]
        );
        assert_eq!(SvnRunner::new("svn").with_max_attempts(0).max_attempts(), Some(1));
    }
}
