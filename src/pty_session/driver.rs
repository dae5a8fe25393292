//! Session driver: wires host stdin/stdout to the pty child, with the
//! interceptor on the input path.

use crate::intercept::Interceptor;
use crate::terminal_restore::TerminalRestoreGuard;
use anyhow::{Context, Result};
use crossbeam_channel::{bounded, never, select, tick, Receiver};
use std::io::{self, Write};
use std::mem;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::io::{spawn_stdin_reader_thread, write_all};
use super::pty::PtySession;

/// What to run under the pty and with which environment.
#[derive(Debug, Clone)]
pub struct SessionSpec {
    pub argv: Vec<String>,
    pub working_dir: String,
    pub envs: Vec<(String, String)>,
    pub term_value: String,
}

static SIGWINCH_SEEN: AtomicBool = AtomicBool::new(false);

extern "C" fn note_sigwinch(_signal: libc::c_int) {
    SIGWINCH_SEEN.store(true, Ordering::Relaxed);
}

fn install_sigwinch_handler() {
    // SAFETY: the handler only stores to an atomic flag, which is
    // async-signal-safe; the tick in the main loop picks it up.
    unsafe {
        libc::signal(libc::SIGWINCH, note_sigwinch as libc::sighandler_t);
    }
}

/// Current host terminal size, with the classic 24x80 fallback.
pub(super) fn host_terminal_size() -> (u16, u16) {
    // SAFETY: libc::winsize is a plain C struct; zeroed is a valid baseline.
    let mut ws: libc::winsize = unsafe { mem::zeroed() };
    unsafe {
        if libc::ioctl(libc::STDOUT_FILENO, libc::TIOCGWINSZ, &mut ws) == 0
            && ws.ws_row > 0
            && ws.ws_col > 0
        {
            (ws.ws_row, ws.ws_col)
        } else {
            (24, 80)
        }
    }
}

pub fn stdin_is_tty() -> bool {
    // SAFETY: isatty only inspects the descriptor.
    unsafe { libc::isatty(libc::STDIN_FILENO) == 1 }
}

/// Run the child to completion, pumping host stdin through the interceptor
/// into the pty and pty output straight to host stdout.
///
/// With `interceptor` set to `None` the session is a direct pass-through
/// (the non-tty fallback). Terminal state is restored on every exit path,
/// including panic, via [`TerminalRestoreGuard`].
pub fn run_session(spec: &SessionSpec, interceptor: Option<Interceptor>) -> Result<ExitStatus> {
    let mut session = PtySession::spawn(
        &spec.argv,
        &spec.working_dir,
        &spec.envs,
        &spec.term_value,
    )
    .with_context(|| format!("failed to start {:?} under a pty", spec.argv.first()))?;

    let interactive = interceptor.is_some();
    let guard = TerminalRestoreGuard::new();
    if interactive {
        guard
            .enable_raw_mode()
            .context("failed to enable raw mode on the host terminal")?;
        guard
            .enable_bracketed_paste(&mut io::stdout())
            .context("failed to enable bracketed paste reporting")?;
    }
    install_sigwinch_handler();
    let (rows, cols) = host_terminal_size();
    let _ = session.set_winsize(rows, cols);

    let (stdin_tx, stdin_rx) = bounded::<Vec<u8>>(100);
    // The reader exits on stdin EOF or once this loop drops the receiver.
    let _stdin_thread = spawn_stdin_reader_thread(stdin_tx);
    let mut stdin_rx: Receiver<Vec<u8>> = stdin_rx;
    let ticker = tick(Duration::from_millis(50));
    let mut interceptor = interceptor;

    let status = loop {
        select! {
            recv(session.output_rx) -> chunk => match chunk {
                Ok(chunk) => {
                    let mut stdout = io::stdout().lock();
                    stdout
                        .write_all(&chunk)
                        .context("write to host stdout failed")?;
                    let _ = stdout.flush();
                }
                // Reader thread finished: the child closed its side.
                Err(_) => break session.wait()?,
            },
            recv(stdin_rx) -> chunk => match chunk {
                Ok(chunk) => {
                    let rewritten = match interceptor.as_mut() {
                        Some(interceptor) => interceptor.process(&chunk),
                        None => chunk,
                    };
                    if !rewritten.is_empty() {
                        write_all(session.master_fd(), &rewritten)
                            .context("write to pty failed")?;
                    }
                }
                Err(_) => {
                    // Host stdin is gone. Send VEOF so line-canonical
                    // children see end-of-input, then stop selecting on
                    // the closed channel.
                    if !interactive {
                        let _ = write_all(session.master_fd(), b"\x04");
                    }
                    stdin_rx = never();
                }
            },
            recv(ticker) -> _ => {
                if SIGWINCH_SEEN.swap(false, Ordering::Relaxed) {
                    let (rows, cols) = host_terminal_size();
                    let _ = session.set_winsize(rows, cols);
                }
                if let Some(status) = session.try_wait() {
                    // Flush whatever output is still queued before exiting.
                    while let Ok(chunk) = session.output_rx.try_recv() {
                        let mut stdout = io::stdout().lock();
                        let _ = stdout.write_all(&chunk);
                        let _ = stdout.flush();
                    }
                    break status;
                }
            },
        }
    };

    guard.restore();
    Ok(status)
}
