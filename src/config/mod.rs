//! Command-line parsing and validation helpers.

mod validation;

use clap::{ArgAction, Parser};
use std::env;
use std::path::PathBuf;

pub const DEFAULT_HANDLER_TIMEOUT_MS: u64 = 5_000;
pub const MIN_HANDLER_TIMEOUT_MS: u64 = 100;
pub const MAX_HANDLER_TIMEOUT_MS: u64 = 600_000;

fn default_term() -> String {
    env::var("TERM").unwrap_or_else(|_| "xterm-256color".to_string())
}

/// CLI options for pastebridge. Validated values keep the pty child and the
/// spool handler safe.
#[derive(Debug, Parser, Clone)]
#[command(
    about = "pastebridge - paste images into pty-hosted sessions",
    author,
    version
)]
pub struct AppConfig {
    /// Command (and arguments) to run under the pty
    #[arg(required = true, trailing_var_arg = true, value_name = "COMMAND")]
    pub command: Vec<String>,

    /// Working directory for the child process
    #[arg(long, default_value = ".")]
    pub cwd: String,

    /// Extra environment variables for the child (repeatable)
    #[arg(long = "env", action = ArgAction::Append, value_name = "KEY=VALUE")]
    pub envs: Vec<String>,

    /// TERM value exported to the child
    #[arg(long = "term", default_value_t = default_term())]
    pub term_value: String,

    /// Directory where pasted images are spooled for the child to read
    #[arg(long = "spool-dir")]
    pub spool_dir: Option<PathBuf>,

    /// Image handler timeout (milliseconds)
    #[arg(long = "handler-timeout-ms", default_value_t = DEFAULT_HANDLER_TIMEOUT_MS)]
    pub handler_timeout_ms: u64,

    /// Disable paste interception entirely (raw pass-through)
    #[arg(long = "no-intercept", default_value_t = false)]
    pub no_intercept: bool,

    /// Enable file logging (debug)
    #[arg(long = "logs", env = "PASTEBRIDGE_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all file logging (overrides --logs and log env vars)
    #[arg(long = "no-logs", env = "PASTEBRIDGE_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,

    /// Allow logging pasted-content snippets (debug log only)
    #[arg(
        long = "log-content",
        env = "PASTEBRIDGE_LOG_CONTENT",
        default_value_t = false
    )]
    pub log_content: bool,
}
