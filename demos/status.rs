//! `svn status` with authentication prompts answered on the console.
//!
//! Usage: `cargo run --example status -- <working-copy-path> [svn args...]`
//!
//! Set `SVN_EXE` to use a non-default `svn` binary and `RUST_LOG=debug` to
//! see every attempt.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use svn_cmdline::{
    AuthenticationBackend, CommandName, LineListener, OutputStream, SvnError, SvnRunner,
};

/// Asks on the terminal whether to retry after each prompt.
///
/// Credentials themselves are expected to be stored out of band (for example
/// with `svn auth` in another terminal, or by editing the config directory).
struct ConsoleBackend;

fn confirm(question: &str) -> bool {
    print!("{question} [y/N] ");
    if std::io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    match std::io::stdin().lock().read_line(&mut answer) {
        Ok(_) => matches!(answer.trim(), "y" | "Y" | "yes"),
        Err(_) => false,
    }
}

impl AuthenticationBackend for ConsoleBackend {
    fn authenticate_for(
        &self,
        realm: Option<&str>,
        base: &Path,
        _using_custom_config: bool,
        is_password: bool,
    ) -> bool {
        let what = if is_password { "password" } else { "username" };
        match realm {
            Some(realm) => confirm(&format!(
                "{} needs a {what} for {realm}. Retry once it is stored?",
                base.display()
            )),
            None => confirm("A client certificate passphrase is needed. Retry?"),
        }
    }

    fn accept_ssl_server_certificate(&self, _base: &Path, realm: &str) -> bool {
        confirm(&format!("Trust the server certificate of {realm}?"))
    }

    fn clear_passive_credentials(&self, realm: &str, _base: &Path, _is_password: bool) {
        eprintln!("cached credentials for {realm} were rejected");
    }
}

struct Printer;

impl LineListener for Printer {
    fn on_line(&self, line: &str, stream: OutputStream) {
        match stream {
            OutputStream::Stdout => println!("{line}"),
            OutputStream::Stderr => eprintln!("{line}"),
        }
    }

    fn process_terminated(&self, exit_code: i32) {
        tracing::debug!(exit_code, "svn status finished");
    }
}

fn main() -> svn_cmdline::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run())
}

async fn run() -> svn_cmdline::Result<()> {
    let mut args = std::env::args().skip(1);
    let Some(target) = args.next().map(PathBuf::from) else {
        eprintln!("usage: status <working-copy-path> [svn args...]");
        return Ok(());
    };
    let extra: Vec<String> = args.collect();
    let extra: Vec<&str> = extra.iter().map(String::as_str).collect();
    let exe = std::env::var("SVN_EXE").unwrap_or_else(|_| "svn".to_string());

    let runner = SvnRunner::new(exe)
        .with_auth_backend(Arc::new(ConsoleBackend))
        .with_abort_on_error_output(true)
        .with_max_attempts(5);

    match runner
        .run(CommandName::Status, &target, &extra, Arc::new(Printer))
        .await
    {
        Err(err) if err.is_canceled() => {
            eprintln!("{err}");
            Ok(())
        }
        Err(SvnError::RetryLimit { attempts, .. }) => {
            eprintln!("still asked for credentials after {attempts} attempts");
            Ok(())
        }
        other => other,
    }
}
