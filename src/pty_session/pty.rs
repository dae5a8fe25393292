//! Low-level pseudo-terminal plumbing: openpty + fork + exec of the child,
//! window sizing, and exit reaping.

use crate::log_debug;
use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Receiver};
use std::ffi::CString;
use std::io;
use std::mem;
use std::os::unix::io::RawFd;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::ptr;
use std::thread;
use std::time::{Duration, Instant};

use super::io::spawn_reader_thread;

/// Runs a child command under a pty so it behaves as if attached to an
/// interactive terminal. Output chunks arrive raw on `output_rx`.
pub struct PtySession {
    pub(super) master_fd: RawFd,
    pub(super) child_pid: i32,
    /// Stream of raw pty output chunks from the child process.
    pub output_rx: Receiver<Vec<u8>>,
    pub(super) _output_thread: thread::JoinHandle<()>,
}

impl PtySession {
    /// Fork and exec `argv[0]` under a fresh pty.
    pub fn spawn(
        argv: &[String],
        working_dir: &str,
        envs: &[(String, String)],
        term_value: &str,
    ) -> Result<Self> {
        if argv.is_empty() {
            return Err(anyhow!("no child command given"));
        }
        let cwd = CString::new(working_dir)
            .with_context(|| format!("working directory contains NUL byte: {working_dir}"))?;
        let term_value_cstr = CString::new(term_value).unwrap_or_else(|_| {
            CString::new("xterm-256color").expect("static TERM fallback should be valid")
        });
        let mut c_argv: Vec<CString> = Vec::with_capacity(argv.len());
        for arg in argv {
            c_argv.push(
                CString::new(arg.as_str())
                    .with_context(|| format!("child argument contains NUL byte: {arg}"))?,
            );
        }
        let mut c_envs: Vec<(CString, CString)> = Vec::with_capacity(envs.len());
        for (key, value) in envs {
            c_envs.push((
                CString::new(key.as_str())
                    .with_context(|| format!("env key contains NUL byte: {key}"))?,
                CString::new(value.as_str())
                    .with_context(|| format!("env value contains NUL byte: {value}"))?,
            ));
        }

        // SAFETY: argv/cwd/TERM/env pairs are valid CStrings; spawn_pty_child
        // returns a valid master fd. set_nonblocking only touches that fd.
        unsafe {
            let (master_fd, child_pid) =
                spawn_pty_child(&c_argv, &cwd, &term_value_cstr, &c_envs)?;
            set_nonblocking(master_fd)?;

            let (tx, rx) = bounded(100);
            let output_thread = spawn_reader_thread(master_fd, tx);

            Ok(Self {
                master_fd,
                child_pid,
                output_rx: rx,
                _output_thread: output_thread,
            })
        }
    }

    pub(super) fn master_fd(&self) -> RawFd {
        self.master_fd
    }

    /// Update the pty window size and notify the child.
    pub fn set_winsize(&self, rows: u16, cols: u16) -> Result<()> {
        // SAFETY: libc::winsize is a plain C struct; zeroed is a valid baseline.
        let mut ws: libc::winsize = unsafe { mem::zeroed() };
        ws.ws_row = rows.max(1);
        ws.ws_col = cols.max(1);
        // SAFETY: ioctl reads master_fd and the initialized ws struct.
        let result = unsafe { libc::ioctl(self.master_fd, libc::TIOCSWINSZ, &ws) };
        if result != 0 {
            return Err(errno_error("ioctl(TIOCSWINSZ) failed"));
        }
        // SAFETY: SIGWINCH is sent to the child pid owned by this session.
        let _ = unsafe { libc::kill(self.child_pid, libc::SIGWINCH) };
        Ok(())
    }

    /// Peek whether the child is still running (without reaping it).
    pub fn is_alive(&self) -> bool {
        if self.child_pid < 0 {
            return false;
        }
        unsafe {
            // SAFETY: child_pid is owned by this session; WNOHANG only inspects state.
            let mut status = 0;
            let ret = libc::waitpid(self.child_pid, &mut status, libc::WNOHANG);
            ret == 0 // 0 means still running
        }
    }

    /// Non-blocking check for child exit; reaps the child on completion.
    pub fn try_wait(&mut self) -> Option<ExitStatus> {
        if self.child_pid < 0 {
            return None;
        }
        unsafe {
            let mut status = 0;
            let ret = libc::waitpid(self.child_pid, &mut status, libc::WNOHANG);
            if ret <= 0 {
                None
            } else {
                self.child_pid = -1;
                Some(ExitStatus::from_raw(status))
            }
        }
    }

    /// Block until the child exits; reaps it.
    pub fn wait(&mut self) -> Result<ExitStatus> {
        if self.child_pid < 0 {
            return Err(anyhow!("child already reaped"));
        }
        unsafe {
            let mut status = 0;
            // SAFETY: child_pid is owned by this session.
            let ret = libc::waitpid(self.child_pid, &mut status, 0);
            if ret < 0 {
                return Err(errno_error("waitpid failed"));
            }
            self.child_pid = -1;
            Ok(ExitStatus::from_raw(status))
        }
    }
}

impl Drop for PtySession {
    fn drop(&mut self) {
        unsafe {
            // SAFETY: child_pid/master_fd come from spawn_pty_child; cleanup
            // closes the master (the child sees EOF/HUP) and escalates
            // through SIGTERM to SIGKILL if it lingers.
            close_fd(self.master_fd);
            self.master_fd = -1;
            if self.child_pid < 0 {
                return;
            }
            if wait_for_exit(self.child_pid, Duration::from_millis(500)) {
                return;
            }
            if libc::kill(self.child_pid, libc::SIGTERM) != 0 {
                log_debug(&format!(
                    "SIGTERM to pty child failed: {}",
                    io::Error::last_os_error()
                ));
            }
            if !wait_for_exit(self.child_pid, Duration::from_millis(500)) {
                if libc::kill(self.child_pid, libc::SIGKILL) != 0 {
                    log_debug(&format!(
                        "SIGKILL to pty child failed: {}",
                        io::Error::last_os_error()
                    ));
                }
                let mut status = 0;
                let ret = libc::waitpid(self.child_pid, &mut status, 0);
                if ret < 0 {
                    log_debug(&format!(
                        "waitpid after SIGKILL failed: {}",
                        io::Error::last_os_error()
                    ));
                }
            }
        }
    }
}

/// Forks and execs a child process under a new pty.
///
/// # Safety
///
/// The caller must ensure:
/// - `argv` and `envs` contain valid null-terminated C strings
/// - `working_dir` is a valid directory path
/// - The returned file descriptor is eventually closed
///
/// The child process calls `_exit(1)` on any setup failure to avoid
/// undefined behavior from returning after `fork()`.
pub(super) unsafe fn spawn_pty_child(
    argv: &[CString],
    working_dir: &CString,
    term_value: &CString,
    envs: &[(CString, CString)],
) -> Result<(RawFd, i32)> {
    let mut master_fd: RawFd = -1;
    let mut slave_fd: RawFd = -1;

    // A real size up front: some children probe it for terminal detection.
    // SAFETY: libc::winsize is a plain C struct; zeroed is a valid baseline.
    let mut winsize: libc::winsize = mem::zeroed();
    winsize.ws_row = 24;
    winsize.ws_col = 80;

    #[allow(clippy::unnecessary_mut_passed)]
    // SAFETY: openpty expects valid pointers for master/slave/winsize; we pass stack locals.
    if libc::openpty(
        &mut master_fd,
        &mut slave_fd,
        ptr::null_mut(),
        ptr::null_mut(),
        &mut winsize,
    ) != 0
    {
        return Err(errno_error("openpty failed"));
    }

    // SAFETY: fork is called before any unsafe Rust invariants are relied on.
    let pid = libc::fork();
    if pid < 0 {
        close_fd(master_fd);
        close_fd(slave_fd);
        return Err(errno_error("fork failed"));
    }

    if pid == 0 {
        child_exec(slave_fd, argv, working_dir, term_value, envs);
    }

    close_fd(slave_fd);
    Ok((master_fd, pid))
}

/// Child process setup after fork: configures the pty and execs the target.
///
/// # Safety
///
/// Must only be called in the child process after `fork()`. Never returns -
/// it either calls `execvp()` to replace the process image or `_exit(1)` on
/// failure.
pub(super) unsafe fn child_exec(
    slave_fd: RawFd,
    argv: &[CString],
    working_dir: &CString,
    term_value: &CString,
    envs: &[(CString, CString)],
) -> ! {
    let fail = |context: &str| -> ! {
        let err = io::Error::last_os_error();
        let msg = format!("child_exec {context} failed: {err}\n");
        // SAFETY: write is async-signal-safe and stderr is a valid fd in the child.
        let _ = libc::write(
            libc::STDERR_FILENO,
            msg.as_ptr() as *const libc::c_void,
            msg.len(),
        );
        libc::_exit(1);
    };

    if libc::setsid() == -1 {
        fail("setsid");
    }
    if libc::ioctl(slave_fd, libc::TIOCSCTTY as libc::c_ulong, 0) == -1 {
        fail("ioctl(TIOCSCTTY)");
    }
    if libc::dup2(slave_fd, libc::STDIN_FILENO) < 0
        || libc::dup2(slave_fd, libc::STDOUT_FILENO) < 0
        || libc::dup2(slave_fd, libc::STDERR_FILENO) < 0
    {
        fail("dup2");
    }
    close_fd(slave_fd);

    if libc::chdir(working_dir.as_ptr()) != 0 {
        fail("chdir");
    }

    let term_key = CString::new("TERM").expect("TERM constant is valid");
    if libc::setenv(term_key.as_ptr(), term_value.as_ptr(), 1) != 0 {
        fail("setenv(TERM)");
    }
    for (key, value) in envs {
        if libc::setenv(key.as_ptr(), value.as_ptr(), 1) != 0 {
            fail("setenv");
        }
    }

    let mut argv_ptrs: Vec<*const libc::c_char> = argv.iter().map(|s| s.as_ptr()).collect();
    argv_ptrs.push(ptr::null());

    libc::execvp(argv_ptrs[0], argv_ptrs.as_ptr());
    fail("execvp");
}

/// Configure the pty master for non-blocking reads.
///
/// # Safety
///
/// `fd` must be a valid, open file descriptor.
pub(super) unsafe fn set_nonblocking(fd: RawFd) -> Result<()> {
    let flags = libc::fcntl(fd, libc::F_GETFL, 0);
    if flags < 0 {
        return Err(errno_error("fcntl(F_GETFL) failed"));
    }
    if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
        return Err(errno_error("fcntl(F_SETFL) failed"));
    }
    Ok(())
}

/// Helper that formats OS errors with additional context.
pub(super) fn errno_error(context: &str) -> anyhow::Error {
    anyhow!("{context}: {}", io::Error::last_os_error())
}

/// Close a file descriptor while ignoring errors.
///
/// # Safety
///
/// `fd` must be a valid, open file descriptor (or -1 to ignore).
pub(super) unsafe fn close_fd(fd: RawFd) {
    if fd >= 0 {
        let _ = libc::close(fd);
    }
}

/// Wait for the child process to terminate, but bail out after a short timeout.
pub(super) fn wait_for_exit(child_pid: i32, timeout: Duration) -> bool {
    if timeout.is_zero() {
        return false;
    }
    let start = Instant::now();
    let mut status = 0;
    while start.elapsed() < timeout {
        // SAFETY: child_pid is owned by this session; WNOHANG only inspects state.
        let result = unsafe { libc::waitpid(child_pid, &mut status, libc::WNOHANG) };
        if result > 0 {
            return true;
        }
        if result < 0 {
            log_debug(&format!(
                "waitpid({child_pid}) failed: {}",
                io::Error::last_os_error()
            ));
            return true;
        }
        thread::sleep(Duration::from_millis(50));
    }
    false
}
