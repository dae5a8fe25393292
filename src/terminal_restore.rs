use crossterm::{
    cursor::Show,
    execute,
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::{
    io::{self, Write},
    panic,
    sync::{
        atomic::{AtomicBool, Ordering},
        OnceLock,
    },
};

static RAW_MODE_ENABLED: AtomicBool = AtomicBool::new(false);
static BRACKETED_PASTE_ENABLED: AtomicBool = AtomicBool::new(false);
static PANIC_HOOK_INSTALLED: OnceLock<()> = OnceLock::new();

/// RAII guard to restore terminal state on drop (and on panic via a shared
/// hook). Restoration always turns bracketed-paste reporting back off so the
/// host terminal is never left in paste-reporting mode.
pub struct TerminalRestoreGuard;

impl TerminalRestoreGuard {
    pub fn new() -> Self {
        install_terminal_panic_hook();
        TerminalRestoreGuard
    }

    pub fn enable_raw_mode(&self) -> io::Result<()> {
        enable_raw_mode()?;
        RAW_MODE_ENABLED.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Ask the host terminal to wrap pastes in the bracketed-paste markers
    /// the interceptor recognizes.
    pub fn enable_bracketed_paste(&self, stdout: &mut impl Write) -> io::Result<()> {
        stdout.write_all(b"\x1b[?2004h")?;
        stdout.flush()?;
        BRACKETED_PASTE_ENABLED.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn restore(&self) {
        restore_terminal();
    }
}

impl Default for TerminalRestoreGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TerminalRestoreGuard {
    fn drop(&mut self) {
        restore_terminal();
    }
}

pub fn restore_terminal() {
    let was_raw = RAW_MODE_ENABLED.swap(false, Ordering::SeqCst);
    if was_raw {
        let _ = disable_raw_mode();
    }
    let was_bracketed = BRACKETED_PASTE_ENABLED.swap(false, Ordering::SeqCst);
    if was_raw || was_bracketed {
        let mut stdout = io::stdout();
        let _ = stdout.write_all(b"\x1b[?2004l");
        let _ = execute!(stdout, Show);
        let _ = stdout.flush();
    }
}

pub fn install_terminal_panic_hook() {
    PANIC_HOOK_INSTALLED.get_or_init(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            restore_terminal();
            crate::log_panic(info);
            let location = info
                .location()
                .map(|loc| format!("{}:{}", loc.file(), loc.line()))
                .unwrap_or_else(|| "unknown".to_string());
            crate::log_debug(&format!("panic at {location}"));
            crate::log_debug_content(&format!("panic: {info}"));
            previous(info);
        }));
    });
}
