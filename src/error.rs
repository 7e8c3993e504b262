use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
/// Errors returned by this crate.
pub enum SvnError {
    /// The `svn` executable could not be launched.
    #[error("failed to start {program}: {source}")]
    StartFailed {
        /// Program that was being launched.
        program: String,
        /// Underlying spawn error.
        #[source]
        source: std::io::Error,
    },
    /// The error output matched a known authentication prompt but its
    /// structure (newline, quoted realm) was not as expected.
    #[error("can not detect authentication realm name: {0}")]
    MalformedChallenge(String),
    /// The authentication backend declined to supply credentials.
    #[error("authentication canceled for: {0}")]
    AuthenticationCanceled(String),
    /// The authentication backend declined to trust the server certificate.
    #[error("server SSL certificate rejected: {0}")]
    CertificateRejected(String),
    /// The process wrote error output that is not an authentication prompt.
    #[error("{0}")]
    ErrorOutput(String),
    /// The process exited with a non-zero code and no error output.
    #[error("svn process exited with error code: {0}")]
    ExitCode(i32),
    /// No working copy root was found at or above the given directory.
    #[error("can not find working copy root for: {}", .0.display())]
    NoWorkingCopy(PathBuf),
    /// The working-copy cleanup that precedes a retry failed.
    #[error("cleanup failed: {0}")]
    Cleanup(#[source] Box<SvnError>),
    /// The configured number of attempts was used up by authentication retries.
    #[error("gave up after {attempts} attempts: {last}")]
    RetryLimit {
        /// Number of attempts that were run.
        attempts: usize,
        /// Error output of the last attempt.
        last: String,
    },
    /// The target path is unusable (for example it has no existing ancestor).
    #[error("invalid path: {0}")]
    InvalidPath(String),
    /// The word is not a known `svn` subcommand.
    #[error("unknown svn command: {0}")]
    UnknownCommand(String),
    /// An I/O error occurred while driving the process.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SvnError {
    /// Returns `true` if the error ends the run because the user (or backend)
    /// declined to authenticate.
    pub fn is_canceled(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationCanceled(_) | Self::CertificateRejected(_)
        )
    }
}
