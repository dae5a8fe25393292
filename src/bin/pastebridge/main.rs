use anyhow::Result;
use pastebridge::clipboard::OsClipboardReader;
use pastebridge::config::AppConfig;
use pastebridge::handler::{ImageHandler, SpoolImageHandler, TimedImageHandler};
use pastebridge::intercept::Interceptor;
use pastebridge::pty_session::{run_session, stdin_is_tty, SessionSpec};
use pastebridge::terminal_restore::install_terminal_panic_hook;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("pastebridge: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let config = AppConfig::parse_args()?;
    pastebridge::init_logging(&config);
    pastebridge::init_tracing(&config);
    install_terminal_panic_hook();

    let spec = SessionSpec {
        argv: config.command.clone(),
        working_dir: config.cwd.clone(),
        envs: config.env_pairs()?,
        term_value: config.term_value.clone(),
    };

    // Interception needs a raw-mode tty on stdin; anything else (pipes,
    // redirects, --no-intercept) becomes a direct pass-through session.
    let interceptor = if config.no_intercept || !stdin_is_tty() {
        None
    } else {
        let spool: Arc<dyn ImageHandler> = Arc::new(SpoolImageHandler::new(config.spool_dir())?);
        let handler: Arc<dyn ImageHandler> = Arc::new(TimedImageHandler::new(
            spool,
            Duration::from_millis(config.handler_timeout_ms),
        ));
        Some(Interceptor::new(handler, Arc::new(OsClipboardReader)))
    };

    tracing::info!(command = ?spec.argv, intercept = interceptor.is_some(), "starting pty session");
    let status = run_session(&spec, interceptor)?;
    tracing::info!(?status, "child exited");

    Ok(match status.code() {
        Some(code) => ExitCode::from(code.clamp(0, 255) as u8),
        // Killed by signal: conventional shell-style failure code.
        None => ExitCode::from(1),
    })
}
