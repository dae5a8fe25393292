//! Pty session hosting: spawns the child in a real terminal environment and
//! runs the input/output pumps with the interceptor in between.

mod driver;
mod io;
mod pty;

#[cfg(test)]
mod tests;

pub use driver::{run_session, stdin_is_tty, SessionSpec};
pub use pty::PtySession;
