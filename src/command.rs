//! Subcommand names and process invocations.

use std::ffi::OsString;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
/// An `svn` subcommand.
pub enum CommandName {
    /// `svn add`
    Add,
    /// `svn blame`
    Blame,
    /// `svn cat`
    Cat,
    /// `svn checkout`
    Checkout,
    /// `svn cleanup`
    Cleanup,
    /// `svn commit`
    Commit,
    /// `svn copy`
    Copy,
    /// `svn delete`
    Delete,
    /// `svn diff`
    Diff,
    /// `svn export`
    Export,
    /// `svn import`
    Import,
    /// `svn info`
    Info,
    /// `svn list`
    List,
    /// `svn lock`
    Lock,
    /// `svn log`
    Log,
    /// `svn merge`
    Merge,
    /// `svn mkdir`
    Mkdir,
    /// `svn move`
    Move,
    /// `svn propdel`
    Propdel,
    /// `svn propget`
    Propget,
    /// `svn proplist`
    Proplist,
    /// `svn propset`
    Propset,
    /// `svn relocate`
    Relocate,
    /// `svn resolve`
    Resolve,
    /// `svn revert`
    Revert,
    /// `svn status`
    Status,
    /// `svn switch`
    Switch,
    /// `svn unlock`
    Unlock,
    /// `svn update`
    Update,
    /// `svn upgrade`
    Upgrade,
}

impl CommandName {
    /// Returns the word passed on the command line.
    pub fn as_word(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Blame => "blame",
            Self::Cat => "cat",
            Self::Checkout => "checkout",
            Self::Cleanup => "cleanup",
            Self::Commit => "commit",
            Self::Copy => "copy",
            Self::Delete => "delete",
            Self::Diff => "diff",
            Self::Export => "export",
            Self::Import => "import",
            Self::Info => "info",
            Self::List => "list",
            Self::Lock => "lock",
            Self::Log => "log",
            Self::Merge => "merge",
            Self::Mkdir => "mkdir",
            Self::Move => "move",
            Self::Propdel => "propdel",
            Self::Propget => "propget",
            Self::Proplist => "proplist",
            Self::Propset => "propset",
            Self::Relocate => "relocate",
            Self::Resolve => "resolve",
            Self::Revert => "revert",
            Self::Status => "status",
            Self::Switch => "switch",
            Self::Unlock => "unlock",
            Self::Update => "update",
            Self::Upgrade => "upgrade",
        }
    }

    /// Returns `true` if the command modifies the working copy.
    ///
    /// An interrupted write command can leave the working copy locked, so
    /// these are followed by `svn cleanup` before an authentication retry.
    pub fn is_writeable(self) -> bool {
        matches!(
            self,
            Self::Add
                | Self::Checkout
                | Self::Cleanup
                | Self::Commit
                | Self::Copy
                | Self::Delete
                | Self::Import
                | Self::Lock
                | Self::Merge
                | Self::Mkdir
                | Self::Move
                | Self::Propdel
                | Self::Propset
                | Self::Relocate
                | Self::Resolve
                | Self::Revert
                | Self::Switch
                | Self::Unlock
                | Self::Update
                | Self::Upgrade
        )
    }
}

impl Display for CommandName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_word())
    }
}

impl std::str::FromStr for CommandName {
    type Err = crate::SvnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const ALL: [CommandName; 30] = [
            CommandName::Add,
            CommandName::Blame,
            CommandName::Cat,
            CommandName::Checkout,
            CommandName::Cleanup,
            CommandName::Commit,
            CommandName::Copy,
            CommandName::Delete,
            CommandName::Diff,
            CommandName::Export,
            CommandName::Import,
            CommandName::Info,
            CommandName::List,
            CommandName::Lock,
            CommandName::Log,
            CommandName::Merge,
            CommandName::Mkdir,
            CommandName::Move,
            CommandName::Propdel,
            CommandName::Propget,
            CommandName::Proplist,
            CommandName::Propset,
            CommandName::Relocate,
            CommandName::Resolve,
            CommandName::Revert,
            CommandName::Status,
            CommandName::Switch,
            CommandName::Unlock,
            CommandName::Update,
            CommandName::Upgrade,
        ];
        let word = s.trim();
        ALL.into_iter()
            .find(|name| name.as_word().eq_ignore_ascii_case(word))
            .ok_or_else(|| crate::SvnError::UnknownCommand(word.to_string()))
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
/// Everything needed to launch one `svn` process.
///
/// A fresh invocation is built for every attempt of a run; it is not modified
/// once the process has started.
pub struct Invocation {
    exe: PathBuf,
    working_dir: PathBuf,
    command: CommandName,
    args: Vec<String>,
    config_dir: Option<PathBuf>,
    env: Vec<(String, String)>,
    non_interactive: bool,
    abort_on_error_output: bool,
}

impl Invocation {
    /// Creates an invocation of `exe <command>` in `working_dir`.
    pub fn new(
        exe: impl Into<PathBuf>,
        working_dir: impl Into<PathBuf>,
        command: CommandName,
    ) -> Self {
        Self {
            exe: exe.into(),
            working_dir: working_dir.into(),
            command,
            args: Vec::new(),
            config_dir: None,
            env: Vec::new(),
            non_interactive: false,
            abort_on_error_output: false,
        }
    }

    /// Returns the executable path.
    pub fn exe(&self) -> &Path {
        &self.exe
    }

    /// Returns the working directory of the process.
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Returns the subcommand.
    pub fn command(&self) -> CommandName {
        self.command
    }

    /// Returns the extra arguments, in order.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns the `--config-dir` override, if any.
    pub fn config_dir(&self) -> Option<&Path> {
        self.config_dir.as_deref()
    }

    /// Returns the environment overrides.
    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    /// Returns whether `--non-interactive` is passed.
    pub fn non_interactive(&self) -> bool {
        self.non_interactive
    }

    /// Returns whether the process is killed as soon as it writes to stderr.
    pub fn abort_on_error_output(&self) -> bool {
        self.abort_on_error_output
    }

    /// Appends one argument.
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends arguments.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets (or clears) the `--config-dir` override.
    #[must_use]
    pub fn with_config_dir(mut self, config_dir: Option<PathBuf>) -> Self {
        self.config_dir = config_dir;
        self
    }

    /// Sets an environment variable for the process, replacing an earlier
    /// value for the same key.
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

    /// Passes `--non-interactive` so `svn` never prompts on its terminal.
    #[must_use]
    pub fn with_non_interactive(mut self, non_interactive: bool) -> Self {
        self.non_interactive = non_interactive;
        self
    }

    /// Kills the process as soon as its first stderr output has been split
    /// into lines.
    ///
    /// `svn` waits on its terminal when it prompts for credentials; with
    /// this set the prompt text still reaches the challenge detector while
    /// the process is stopped. Output read after the kill is still delivered.
    #[must_use]
    pub fn with_abort_on_error_output(mut self, abort: bool) -> Self {
        self.abort_on_error_output = abort;
        self
    }

    /// Returns the full argument vector (without the executable).
    pub fn command_line(&self) -> Vec<OsString> {
        let mut line = Vec::with_capacity(self.args.len() + 4);
        line.push(OsString::from(self.command.as_word()));
        if self.non_interactive {
            line.push(OsString::from("--non-interactive"));
        }
        if let Some(dir) = &self.config_dir {
            line.push(OsString::from("--config-dir"));
            line.push(dir.clone().into_os_string());
        }
        line.extend(self.args.iter().map(OsString::from));
        line
    }
}
