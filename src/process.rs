//! One `svn` process with line-oriented output delivery.

use std::process::Stdio;
use std::sync::{Arc, Mutex, OnceLock};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::framer::{LineFramer, Utf8Carry};
use crate::{Invocation, LineCollector, LineListener, OutputStream, SvnError};

const READ_BUF_SIZE: usize = 8 * 1024;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum KillState {
    Running,
    // The child is being killed, remaining output is still delivered.
    Killing,
    // The child is being killed and further output is dropped.
    Destroyed,
}

/// State shared between the reader tasks and the awaiting task.
struct Shared {
    listeners: Vec<Arc<dyn LineListener>>,
    kill: watch::Sender<KillState>,
    exit_code: OnceLock<i32>,
    // Appended to only by the stderr reader.
    error_text: Mutex<String>,
    abort_on_error_output: bool,
}

impl Shared {
    fn new(listeners: Vec<Arc<dyn LineListener>>, abort_on_error_output: bool) -> Self {
        let (kill, _) = watch::channel(KillState::Running);
        Self {
            listeners,
            kill,
            exit_code: OnceLock::new(),
            error_text: Mutex::new(String::new()),
            abort_on_error_output,
        }
    }

    fn is_destroyed(&self) -> bool {
        *self.kill.borrow() == KillState::Destroyed
    }

    fn request_kill(&self) {
        self.kill.send_if_modified(|state| {
            if *state == KillState::Running {
                *state = KillState::Killing;
                true
            } else {
                false
            }
        });
    }

    fn destroy(&self) {
        let changed = self.kill.send_if_modified(|state| {
            if *state == KillState::Destroyed {
                false
            } else {
                *state = KillState::Destroyed;
                true
            }
        });
        if changed {
            debug!("destroying svn process");
        }
    }

    fn deliver(&self, stream: OutputStream, line: String) {
        if self.is_destroyed() {
            return;
        }
        trace!(%stream, line = %line, "==> line");
        for listener in &self.listeners {
            listener.on_line(&line, stream);
        }
        if self.listeners.iter().any(|listener| listener.is_canceled()) {
            self.destroy();
            return;
        }
        if stream == OutputStream::Stderr {
            let mut text = match self.error_text.lock() {
                Ok(text) => text,
                Err(poisoned) => poisoned.into_inner(),
            };
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&line);
        }
    }

    fn error_text(&self) -> String {
        match self.error_text.lock() {
            Ok(text) => text.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// The delivery path of one output stream.
///
/// Owned by that stream's reader task, so its partial-line buffer is never
/// touched from anywhere else.
struct StreamSink {
    stream: OutputStream,
    framer: LineFramer,
    decoder: Utf8Carry,
    shared: Arc<Shared>,
}

impl StreamSink {
    fn new(stream: OutputStream, shared: Arc<Shared>) -> Self {
        Self {
            stream,
            framer: LineFramer::new(),
            decoder: Utf8Carry::default(),
            shared,
        }
    }

    fn feed_bytes(&mut self, bytes: &[u8]) {
        let text = self.decoder.decode(bytes);
        self.feed_chunk(&text);
    }

    fn feed_chunk(&mut self, text: &str) {
        if self.shared.is_destroyed() {
            return;
        }
        let (stream, shared) = (self.stream, &self.shared);
        self.framer
            .feed_with(text, |line| shared.deliver(stream, line));
        if stream == OutputStream::Stderr && shared.abort_on_error_output && !text.is_empty() {
            shared.request_kill();
        }
    }

    fn finish(&mut self) {
        if let Some(rest) = self.decoder.finish() {
            self.feed_chunk(&rest);
        }
        if let Some(line) = self.framer.flush() {
            self.shared.deliver(self.stream, line);
        }
    }
}

async fn pump<R>(mut reader: R, mut sink: StreamSink) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_BUF_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        sink.feed_bytes(&buf[..n]);
    }
    sink.finish();
    Ok(())
}

async fn wait_for_state(
    rx: &mut watch::Receiver<KillState>,
    predicate: impl FnMut(&KillState) -> bool,
) {
    // The sender lives in `Shared`, which outlives every receiver.
    let _ = rx.wait_for(predicate).await;
}

/// A cloneable handle that can destroy a running [`LineCommand`] from
/// another task.
#[derive(Clone)]
pub struct ProcessHandle {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

impl ProcessHandle {
    /// Kills the process and drops any output that arrives afterwards.
    ///
    /// Calling this more than once has no further effect.
    pub fn destroy(&self) {
        self.shared.destroy();
    }

    /// Returns `true` once [`ProcessHandle::destroy`] was called or a
    /// listener canceled.
    pub fn is_destroyed(&self) -> bool {
        self.shared.is_destroyed()
    }
}

/// A running `svn` process whose stdout and stderr are split into lines and
/// handed to [`LineListener`]s.
///
/// Each stream is read on its own task. Listeners are invoked in
/// registration order for every line; lines of one stream arrive in order,
/// but stdout and stderr are not ordered relative to each other.
pub struct LineCommand {
    invocation: Invocation,
    child: Child,
    pid: Option<u32>,
    readers: Vec<JoinHandle<std::io::Result<()>>>,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for LineCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineCommand")
            .field("invocation", &self.invocation)
            .field("pid", &self.pid)
            .field("exit_code", &self.exit_code())
            .finish()
    }
}

impl LineCommand {
    /// Launches the process described by `invocation`.
    ///
    /// Must be called from within a Tokio runtime. If the process cannot be
    /// launched every listener's [`LineListener::start_failed`] is called and
    /// [`SvnError::StartFailed`] is returned.
    pub fn start(
        invocation: Invocation,
        listeners: Vec<Arc<dyn LineListener>>,
    ) -> Result<Self, SvnError> {
        let mut cmd = Command::new(invocation.exe());
        cmd.args(invocation.command_line())
            .current_dir(invocation.working_dir())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in invocation.env() {
            cmd.env(key, value);
        }

        debug!(
            program = %invocation.exe().display(),
            args = ?invocation.command_line(),
            cwd = %invocation.working_dir().display(),
            "starting svn process"
        );

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                debug!(error = %err, "failed to start svn process");
                for listener in &listeners {
                    listener.start_failed(&err);
                }
                return Err(SvnError::StartFailed {
                    program: invocation.exe().display().to_string(),
                    source: err,
                });
            }
        };

        let shared = Arc::new(Shared::new(listeners, invocation.abort_on_error_output()));
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            let sink = StreamSink::new(OutputStream::Stdout, shared.clone());
            readers.push(tokio::spawn(pump(stdout, sink)));
        }
        if let Some(stderr) = child.stderr.take() {
            let sink = StreamSink::new(OutputStream::Stderr, shared.clone());
            readers.push(tokio::spawn(pump(stderr, sink)));
        }

        Ok(Self {
            invocation,
            pid: child.id(),
            child,
            readers,
            shared,
        })
    }

    /// Returns the invocation this process was started from.
    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    /// Returns the OS process id, if the process is still known to the OS.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Returns a handle that can destroy the process from elsewhere.
    pub fn handle(&self) -> ProcessHandle {
        ProcessHandle {
            shared: self.shared.clone(),
        }
    }

    /// Kills the process and drops any output that arrives afterwards.
    pub fn destroy(&self) {
        self.shared.destroy();
    }

    /// Returns the exit code once [`LineCommand::wait_for_exit`] completed.
    pub fn exit_code(&self) -> Option<i32> {
        self.shared.exit_code.get().copied()
    }

    /// Returns every stderr line received so far, joined with `\n`.
    pub fn error_text(&self) -> String {
        self.shared.error_text()
    }

    /// Waits for the process to exit and for all of its output to be
    /// delivered, then notifies [`LineListener::process_terminated`].
    ///
    /// There is no timeout; wrap the future in `tokio::time::timeout` if one
    /// is needed (dropping `self` kills the process).
    pub async fn wait_for_exit(&mut self) -> Result<i32, SvnError> {
        if let Some(code) = self.exit_code() {
            return Ok(code);
        }

        let mut kill_rx = self.shared.kill.subscribe();
        let status = tokio::select! {
            status = self.child.wait() => status?,
            () = wait_for_state(&mut kill_rx, |state| *state != KillState::Running) => {
                debug!(pid = ?self.pid, "killing svn process");
                if let Err(err) = self.child.start_kill() {
                    debug!(error = %err, "svn process already gone");
                }
                self.child.wait().await?
            }
        };
        // A signal-terminated process has no exit code.
        let code = status.code().unwrap_or(-1);

        for reader in std::mem::take(&mut self.readers) {
            let abort = reader.abort_handle();
            tokio::select! {
                joined = reader => match joined {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => warn!(error = %err, "failed to read svn output"),
                    Err(err) if err.is_cancelled() => {}
                    Err(err) => warn!(error = %err, "svn output reader failed"),
                },
                () = wait_for_state(&mut kill_rx, |state| *state == KillState::Destroyed) => abort.abort(),
            }
        }

        let _ = self.shared.exit_code.set(code);
        debug!(pid = ?self.pid, exit_code = code, "svn process terminated");
        for listener in &self.shared.listeners {
            listener.process_terminated(code);
        }
        Ok(code)
    }
}

/// Collected output of a process run by [`run_simple`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Stdout lines.
    pub stdout: Vec<String>,
    /// Stderr lines.
    pub stderr: Vec<String>,
    /// Exit code (`-1` if the process was killed by a signal).
    pub exit_code: i32,
}

/// Runs `invocation` to completion without any challenge handling.
///
/// A non-zero exit is returned as [`SvnError::ErrorOutput`] carrying the
/// stderr text, or as [`SvnError::ExitCode`] if stderr was empty.
pub async fn run_simple(invocation: Invocation) -> Result<CommandOutput, SvnError> {
    let collector = Arc::new(LineCollector::new());
    let mut command = LineCommand::start(invocation, vec![collector.clone()])?;
    let exit_code = command.wait_for_exit().await?;
    let output = CommandOutput {
        stdout: collector.stdout_lines(),
        stderr: collector.stderr_lines(),
        exit_code,
    };
    if exit_code != 0 {
        let text = output.stderr.join("\n");
        let text = text.trim();
        if text.is_empty() {
            return Err(SvnError::ExitCode(exit_code));
        }
        return Err(SvnError::ErrorOutput(text.to_string()));
    }
    Ok(output)
}
