//! Listener callbacks for line-oriented process output.

use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
/// Which output channel of the process a line came from.
pub enum OutputStream {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

impl OutputStream {
    /// Returns the conventional short name (`stdout` / `stderr`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

impl Display for OutputStream {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives events from a running [`crate::LineCommand`].
///
/// `on_line` is called from the reader task of the stream the line arrived
/// on, so stdout and stderr callbacks can run concurrently with each other
/// and with the task awaiting the process. Implementations must only use
/// thread-safe state.
pub trait LineListener: Send + Sync {
    /// Called for each complete line, without its terminator.
    fn on_line(&self, line: &str, stream: OutputStream);

    /// Called once after the process exited and all output was delivered.
    ///
    /// A process killed by a signal reports `-1`.
    fn process_terminated(&self, _exit_code: i32) {}

    /// Called if the process could not be launched.
    fn start_failed(&self, _error: &std::io::Error) {}

    /// Polled after every delivered line; returning `true` destroys the
    /// process.
    fn is_canceled(&self) -> bool {
        false
    }

    /// Called by [`crate::SvnRunner::run`] with the directory the command
    /// runs in, before the first attempt.
    fn base_directory(&self, _base: &Path) {}
}

/// A listener that records every line and the exit code.
///
/// Useful when the whole output is needed after the process exits. When it
/// is reused across the attempts of an [`crate::SvnRunner::run`], lines
/// accumulate and the exit code is that of the latest attempt.
#[derive(Debug, Default)]
pub struct LineCollector {
    stdout: Mutex<Vec<String>>,
    stderr: Mutex<Vec<String>>,
    exit_code: Mutex<Option<i32>>,
    canceled: AtomicBool,
}

impl LineCollector {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stdout lines received so far.
    pub fn stdout_lines(&self) -> Vec<String> {
        match self.stdout.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Returns the stderr lines received so far.
    pub fn stderr_lines(&self) -> Vec<String> {
        match self.stderr.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Returns the exit code of the latest terminated process.
    pub fn exit_code(&self) -> Option<i32> {
        match self.exit_code.lock() {
            Ok(code) => *code,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Requests cancellation of the process this collector listens to.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }
}

impl LineListener for LineCollector {
    fn on_line(&self, line: &str, stream: OutputStream) {
        let lines = match stream {
            OutputStream::Stdout => &self.stdout,
            OutputStream::Stderr => &self.stderr,
        };
        match lines.lock() {
            Ok(mut lines) => lines.push(line.to_string()),
            Err(poisoned) => poisoned.into_inner().push(line.to_string()),
        }
    }

    fn process_terminated(&self, exit_code: i32) {
        match self.exit_code.lock() {
            Ok(mut code) => *code = Some(exit_code),
            Err(poisoned) => *poisoned.into_inner() = Some(exit_code),
        }
    }

    fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }
}
