//! Drive the `svn` command-line client as a line-oriented subprocess.
//!
//! This crate launches `svn <command>`, splits its stdout and stderr into
//! lines as they arrive, and hands every line to registered listeners. When
//! the command fails with an authentication prompt (realm credentials, an
//! untrusted server certificate, or a client certificate passphrase) an
//! [`AuthenticationBackend`] is asked for credentials and the command is run
//! again.
//!
//! Most users should start with [`SvnRunner`].
//!
//! ## Getting started
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use svn_cmdline::{CommandName, LineCollector, SvnRunner};
//!
//! fn main() -> svn_cmdline::Result<()> {
//!     let rt = tokio::runtime::Builder::new_current_thread()
//!         .enable_all()
//!         .build()?;
//!
//!     rt.block_on(async {
//!         let runner = SvnRunner::new("svn").with_non_interactive(true);
//!         let lines = Arc::new(LineCollector::new());
//!         runner
//!             .run(CommandName::Info, "/home/alice/wc".as_ref(), &[], lines.clone())
//!             .await?;
//!         for line in lines.stdout_lines() {
//!             println!("{line}");
//!         }
//!         Ok(())
//!     })
//! }
//! ```
//!
//! ## Features
//!
//! - `serde`: enables `Serialize`/`Deserialize` for public data types.
//!
//! ## Lower-level access
//!
//! [`LineCommand`] runs a single process without any retry, and
//! [`LineFramer`] is the incremental line splitter used for both streams.

#![deny(unsafe_code)]

mod auth;
mod challenge;
mod command;
mod error;
mod framer;
mod listener;
mod path;
mod process;
mod runner;

pub use auth::{AuthenticationBackend, CredentialCase, CredentialResolver};
pub use challenge::{
    AUTHENTICATION_REALM, CERTIFICATE_ERROR, Challenge, ChallengeKind, PASSPHRASE_FOR, classify,
};
pub use command::{CommandName, Invocation};
pub use error::SvnError;
/// Convenience alias for results returned by this crate.
pub type Result<T> = std::result::Result<T, SvnError>;
pub use framer::LineFramer;
pub use listener::{LineCollector, LineListener, OutputStream};
pub use path::{base_directory_for, correct_up_to_existing_parent, find_wc_root};
pub use process::{CommandOutput, LineCommand, ProcessHandle, run_simple};
pub use runner::SvnRunner;
