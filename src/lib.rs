pub mod clipboard;
pub mod config;
pub mod handler;
pub mod image_format;
pub mod intercept;
pub mod logging;
pub mod pty_session;
mod telemetry;
pub mod terminal_restore;

pub use logging::{
    crash_log_path, init_logging, log_debug, log_debug_content, log_file_path, log_panic,
};
pub use telemetry::init_tracing;
