use super::driver::host_terminal_size;
use super::io::*;
use super::pty::*;
use crossbeam_channel::bounded;
use std::fs;
use std::io::{self, ErrorKind};
use std::os::unix::io::RawFd;
use std::sync::{Mutex, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

fn pipe_pair() -> (RawFd, RawFd) {
    let mut fds = [0; 2];
    let result = unsafe { libc::pipe(fds.as_mut_ptr()) };
    assert_eq!(
        result,
        0,
        "pipe() failed with errno {}",
        io::Error::last_os_error()
    );
    (fds[0], fds[1])
}

fn close_raw(fd: RawFd) {
    unsafe {
        libc::close(fd);
    }
}

fn read_some(fd: RawFd, max: usize) -> Vec<u8> {
    let mut buf = vec![0u8; max];
    let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut _, buf.len()) };
    assert!(n >= 0, "read failed: {}", io::Error::last_os_error());
    buf.truncate(n as usize);
    buf
}

/// Drain a session's output channel until the reader thread hangs up.
fn collect_output(session: &PtySession) -> Vec<u8> {
    let mut out = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        match session.output_rx.recv_timeout(Duration::from_millis(200)) {
            Ok(chunk) => out.extend_from_slice(&chunk),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }
    out
}

fn shell_session(script: &str) -> PtySession {
    PtySession::spawn(
        &[
            "/bin/sh".to_string(),
            "-c".to_string(),
            script.to_string(),
        ],
        "/",
        &[],
        "dumb",
    )
    .expect("spawn /bin/sh under a pty")
}

fn log_lock() -> &'static Mutex<()> {
    static LOG_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOG_LOCK.get_or_init(|| Mutex::new(()))
}

fn capture_new_log<F: FnOnce()>(f: F) -> String {
    let _guard = log_lock().lock().unwrap_or_else(|p| p.into_inner());
    crate::logging::set_logging_for_tests(true, false);
    let log_path = crate::log_file_path();
    let before = fs::read(&log_path).unwrap_or_default();
    f();
    let after = fs::read(&log_path).unwrap_or_default();
    crate::logging::set_logging_for_tests(false, false);
    let new_bytes = after.get(before.len()..).unwrap_or(&[]);
    String::from_utf8_lossy(new_bytes).to_string()
}

#[test]
fn write_all_round_trips_through_a_pipe() {
    let (read_fd, write_fd) = pipe_pair();
    write_all(write_fd, b"hello pipe").expect("write_all");
    let got = read_some(read_fd, 64);
    assert_eq!(got, b"hello pipe");
    close_raw(read_fd);
    close_raw(write_fd);
}

#[test]
fn write_all_fails_on_closed_fd() {
    let (read_fd, write_fd) = pipe_pair();
    close_raw(read_fd);
    close_raw(write_fd);
    assert!(write_all(write_fd, b"x").is_err());
}

#[test]
fn retryable_read_errors_are_classified() {
    assert!(should_retry_read_error(&io::Error::from(
        ErrorKind::Interrupted
    )));
    assert!(should_retry_read_error(&io::Error::from(
        ErrorKind::WouldBlock
    )));
    assert!(!should_retry_read_error(&io::Error::from(
        ErrorKind::BrokenPipe
    )));
}

#[test]
fn reader_thread_forwards_chunks_and_stops_on_eof() {
    let (read_fd, write_fd) = pipe_pair();
    let (tx, rx) = bounded(100);
    let handle = spawn_reader_thread(read_fd, tx);

    write_all(write_fd, b"chunk one").expect("write_all");
    let got = rx
        .recv_timeout(Duration::from_secs(2))
        .expect("reader should forward the chunk");
    assert_eq!(got, b"chunk one");

    close_raw(write_fd);
    assert!(
        rx.recv_timeout(Duration::from_secs(2)).is_err(),
        "channel should disconnect after EOF"
    );
    handle.join().expect("reader thread should exit cleanly");
    close_raw(read_fd);
}

#[test]
fn reader_thread_stops_when_receiver_is_dropped() {
    let (read_fd, write_fd) = pipe_pair();
    let (tx, rx) = bounded(1);
    let handle = spawn_reader_thread(read_fd, tx);
    drop(rx);
    write_all(write_fd, b"goes nowhere").expect("write_all");
    // The send fails once the receiver is gone, ending the thread.
    handle.join().expect("reader thread should exit cleanly");
    close_raw(read_fd);
    close_raw(write_fd);
}

#[test]
fn spawn_captures_child_output() {
    let session = shell_session("printf 'hello pty'");
    let out = collect_output(&session);
    let text = String::from_utf8_lossy(&out);
    assert!(text.contains("hello pty"), "got: {text:?}");
}

#[test]
fn spawn_exports_term_and_extra_env() {
    let session = PtySession::spawn(
        &[
            "/bin/sh".to_string(),
            "-c".to_string(),
            r#"printf '%s|%s' "$TERM" "$PB_PROBE""#.to_string(),
        ],
        "/",
        &[("PB_PROBE".to_string(), "probe-value".to_string())],
        "dumb-test",
    )
    .expect("spawn probe shell");
    let out = collect_output(&session);
    let text = String::from_utf8_lossy(&out);
    assert!(text.contains("dumb-test|probe-value"), "got: {text:?}");
}

#[test]
fn spawn_honors_working_dir() {
    let dir = fs::canonicalize("/tmp").expect("canonicalize /tmp");
    let session = PtySession::spawn(
        &["/bin/sh".to_string(), "-c".to_string(), "pwd".to_string()],
        dir.to_str().expect("utf8 temp dir"),
        &[],
        "dumb",
    )
    .expect("spawn pwd shell");
    let out = collect_output(&session);
    let text = String::from_utf8_lossy(&out);
    assert!(text.contains(dir.to_str().unwrap()), "got: {text:?}");
}

#[test]
fn spawn_rejects_empty_argv() {
    assert!(PtySession::spawn(&[], "/", &[], "dumb").is_err());
}

#[test]
fn spawn_rejects_nul_in_arguments() {
    let argv = vec!["/bin/echo".to_string(), "bad\0arg".to_string()];
    assert!(PtySession::spawn(&argv, "/", &[], "dumb").is_err());
}

#[test]
fn wait_reports_child_exit_code() {
    let mut session = shell_session("exit 0");
    let _ = collect_output(&session);
    let status = session.wait().expect("wait should reap the child");
    assert!(status.success());
    assert!(session.wait().is_err(), "second wait has nothing to reap");
}

#[test]
fn try_wait_reaps_exited_child() {
    let mut session = shell_session("exit 3");
    let _ = collect_output(&session);
    let deadline = Instant::now() + Duration::from_secs(5);
    let status = loop {
        if let Some(status) = session.try_wait() {
            break status;
        }
        assert!(Instant::now() < deadline, "child never exited");
        thread::sleep(Duration::from_millis(20));
    };
    assert_eq!(status.code(), Some(3));
    assert!(session.try_wait().is_none());
    assert!(!session.is_alive());
}

#[test]
fn is_alive_tracks_a_sleeping_child() {
    let session = shell_session("sleep 5");
    thread::sleep(Duration::from_millis(50));
    assert!(session.is_alive());
    // Drop escalates from close-master through SIGTERM/SIGKILL.
}

#[test]
fn set_winsize_succeeds_on_live_session() {
    let session = shell_session("sleep 5");
    session.set_winsize(40, 120).expect("TIOCSWINSZ on master");
}

#[test]
fn wait_for_exit_times_out_on_running_child() {
    let session = shell_session("sleep 5");
    assert!(!wait_for_exit(
        session.child_pid,
        Duration::from_millis(120)
    ));
    assert!(!wait_for_exit(session.child_pid, Duration::ZERO));
}

#[test]
fn host_terminal_size_never_reports_zero() {
    let (rows, cols) = host_terminal_size();
    assert!(rows > 0);
    assert!(cols > 0);
}

#[test]
fn pty_read_errors_are_logged() {
    let captured = capture_new_log(|| {
        let (read_fd, write_fd) = pipe_pair();
        close_raw(read_fd);
        let (tx, _rx) = bounded(1);
        // read_fd is already closed, so the thread hits EBADF and logs it.
        let handle = spawn_reader_thread(read_fd, tx);
        handle.join().expect("reader thread should exit");
        close_raw(write_fd);
    });
    assert!(captured.contains("pty read error"), "got: {captured:?}");
}
