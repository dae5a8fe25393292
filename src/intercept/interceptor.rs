//! Escape-sequence interceptor.
//!
//! Sits between host stdin and the pty child. Ordinary bytes pass through
//! (via the text scanner); bracketed pastes, inline graphics sequences, and
//! the clipboard shortcut are recognized, captured across arbitrary chunk
//! boundaries, and rewritten so the child only ever sees a short reference
//! string where the image was.

use crate::clipboard::{ClipboardReader, ClipboardTag};
use crate::handler::ImageHandler;
use crate::image_format::ImageFormat;
use crate::log_debug;
use std::sync::Arc;

use super::scanner;

/// Hard cap on any capture buffer. Past this the capture is aborted and
/// flushed verbatim so hostile input cannot grow memory without bound.
pub const CAPTURE_CAP: usize = 10 * 1024 * 1024;

pub(super) const PASTE_START: &[u8] = b"\x1b[200~";
pub(super) const PASTE_END: &[u8] = b"\x1b[201~";
pub(super) const KITTY_START: &[u8] = b"\x1b_G";
pub(super) const KITTY_END: &[u8] = b"\x1b\\";
pub(super) const ITERM_START: &[u8] = b"\x1b]1337;File=";
/// CSI-u (Kitty keyboard protocol) encoding of Ctrl+V press and release.
pub(super) const CLIPBOARD_PRESS: &[u8] = b"\x1b[118;5u";
pub(super) const CLIPBOARD_RELEASE: &[u8] = b"\x1b[118;5:3u";

/// Which inline-graphics dialect a capture is following. Selects the
/// terminator and the payload-extraction rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Kitty,
    ITerm2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Idle,
    BracketedPaste,
    GraphicsCapture(Dialect),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prefix {
    PasteStart,
    ClipboardPress,
    ClipboardRelease,
    KittyStart,
    ITermStart,
}

enum PrefixScan {
    /// A full sequence prefix matched; the length tells how much to consume.
    Complete(Prefix, usize),
    /// The tail is a proper prefix of at least one candidate; wait for more.
    Partial,
    /// No candidate matches; the escape byte is ordinary.
    None,
}

const CANDIDATES: &[(&[u8], Prefix)] = &[
    (PASTE_START, Prefix::PasteStart),
    (CLIPBOARD_PRESS, Prefix::ClipboardPress),
    (CLIPBOARD_RELEASE, Prefix::ClipboardRelease),
    (KITTY_START, Prefix::KittyStart),
    (ITERM_START, Prefix::ITermStart),
];

fn match_prefix(data: &[u8]) -> PrefixScan {
    let mut partial = false;
    for (literal, kind) in CANDIDATES {
        if data.len() >= literal.len() {
            if data.starts_with(literal) {
                return PrefixScan::Complete(*kind, literal.len());
            }
        } else if literal.starts_with(data) {
            partial = true;
        }
    }
    if partial {
        PrefixScan::Partial
    } else {
        PrefixScan::None
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// The cross-call interceptor state. One instance per session; only the
/// stdin pump touches it, sequentially.
pub struct Interceptor {
    mode: Mode,
    /// Accumulation buffer for the active non-idle mode.
    buf: Vec<u8>,
    /// Unterminated possible-escape prefix carried to the next call.
    pending: Vec<u8>,
    handler: Arc<dyn ImageHandler>,
    clipboard: Arc<dyn ClipboardReader>,
}

impl Interceptor {
    pub fn new(handler: Arc<dyn ImageHandler>, clipboard: Arc<dyn ClipboardReader>) -> Self {
        Self {
            mode: Mode::Idle,
            buf: Vec::new(),
            pending: Vec::new(),
            handler,
            clipboard,
        }
    }

    /// Rewrite one input chunk. Called repeatedly with successive, in-order
    /// chunks; never drops ordinary bytes and never reorders output.
    pub fn process(&mut self, chunk: &[u8]) -> Vec<u8> {
        let data: Vec<u8> = if self.pending.is_empty() {
            chunk.to_vec()
        } else {
            let mut joined = std::mem::take(&mut self.pending);
            joined.extend_from_slice(chunk);
            joined
        };

        let mut out = Vec::new();
        let mut plain = Vec::new();
        let mut idx = 0;
        while idx < data.len() {
            match self.mode {
                Mode::Idle => {
                    if data[idx] != 0x1b {
                        plain.push(data[idx]);
                        idx += 1;
                        continue;
                    }
                    match match_prefix(&data[idx..]) {
                        PrefixScan::Complete(kind, len) => {
                            self.flush_plain(&mut plain, &mut out);
                            idx += len;
                            match kind {
                                Prefix::PasteStart => {
                                    self.mode = Mode::BracketedPaste;
                                    self.buf.clear();
                                }
                                Prefix::ClipboardPress => self.paste_clipboard(&mut out),
                                // The release event is swallowed outright.
                                Prefix::ClipboardRelease => {}
                                Prefix::KittyStart => {
                                    self.mode = Mode::GraphicsCapture(Dialect::Kitty);
                                    self.buf = KITTY_START.to_vec();
                                }
                                Prefix::ITermStart => {
                                    self.mode = Mode::GraphicsCapture(Dialect::ITerm2);
                                    self.buf = ITERM_START.to_vec();
                                }
                            }
                        }
                        PrefixScan::Partial => {
                            // Too short to confirm or rule out a sequence;
                            // carry the tail to the next call.
                            self.pending = data[idx..].to_vec();
                            idx = data.len();
                        }
                        PrefixScan::None => {
                            plain.push(data[idx]);
                            idx += 1;
                        }
                    }
                }
                Mode::BracketedPaste => idx = self.pump_paste(&data, idx, &mut out),
                Mode::GraphicsCapture(dialect) => {
                    idx = self.pump_graphics(dialect, &data, idx, &mut out);
                }
            }
        }

        if self.mode == Mode::Idle {
            self.flush_plain(&mut plain, &mut out);
        }
        out
    }

    /// Run the accumulated ordinary-byte run through the text scanner.
    fn flush_plain(&self, plain: &mut Vec<u8>, out: &mut Vec<u8>) {
        if plain.is_empty() {
            return;
        }
        out.extend_from_slice(&scanner::scan(plain, self.handler.as_ref()));
        plain.clear();
    }

    /// Accumulate bracketed-paste bytes; returns the new cursor position.
    fn pump_paste(&mut self, data: &[u8], idx: usize, out: &mut Vec<u8>) -> usize {
        let rest = &data[idx..];
        // Resume the end-marker search just before the old tail so a marker
        // split across chunks is still found.
        let search_from = self.buf.len().saturating_sub(PASTE_END.len() - 1);
        self.buf.extend_from_slice(rest);

        if let Some(pos) = find_subslice(&self.buf[search_from..], PASTE_END) {
            let interior_end = search_from + pos;
            let consumed_end = interior_end + PASTE_END.len();
            let leftover = self.buf.len() - consumed_end;
            out.extend_from_slice(PASTE_START);
            out.extend_from_slice(&scanner::scan(
                &self.buf[..interior_end],
                self.handler.as_ref(),
            ));
            out.extend_from_slice(PASTE_END);
            self.buf = Vec::new();
            self.mode = Mode::Idle;
            return data.len() - leftover;
        }
        if self.buf.len() > CAPTURE_CAP {
            // Bounded-abort: flush verbatim with the literal start marker.
            // The end marker, when it eventually arrives, passes through as
            // ordinary bytes, keeping the pair balanced downstream.
            log_debug(&format!(
                "bracketed paste exceeded {CAPTURE_CAP} bytes; flushing raw"
            ));
            out.extend_from_slice(PASTE_START);
            out.append(&mut self.buf);
            self.mode = Mode::Idle;
        }
        data.len()
    }

    /// Accumulate graphics-sequence bytes; returns the new cursor position.
    fn pump_graphics(
        &mut self,
        dialect: Dialect,
        data: &[u8],
        idx: usize,
        out: &mut Vec<u8>,
    ) -> usize {
        let rest = &data[idx..];
        let search_from = self.buf.len().saturating_sub(1);
        self.buf.extend_from_slice(rest);

        if let Some((term_at, term_len)) = find_terminator(dialect, &self.buf, search_from) {
            let consumed_end = term_at + term_len;
            let leftover = self.buf.len() - consumed_end;
            let sequence = std::mem::take(&mut self.buf);
            self.mode = Mode::Idle;
            self.finish_graphics(dialect, &sequence[..consumed_end], term_len, out);
            return data.len() - leftover;
        }
        if self.buf.len() > CAPTURE_CAP {
            log_debug(&format!(
                "{dialect:?} graphics capture exceeded {CAPTURE_CAP} bytes; flushing raw"
            ));
            out.append(&mut self.buf);
            self.mode = Mode::Idle;
        }
        data.len()
    }

    /// Decode a complete captured graphics sequence and emit the handler's
    /// reference. The original escape bytes are fully swallowed; on any
    /// decode or handler failure nothing is emitted.
    fn finish_graphics(
        &mut self,
        dialect: Dialect,
        sequence: &[u8],
        term_len: usize,
        out: &mut Vec<u8>,
    ) {
        let payload_end = sequence.len() - term_len;
        let payload = match dialect {
            // ESC _ G <control> ; <base64> ESC \
            Dialect::Kitty => match find_subslice(&sequence[..payload_end], b";") {
                Some(semi) => &sequence[semi + 1..payload_end],
                None => {
                    log_debug("kitty graphics sequence without payload separator; dropped");
                    return;
                }
            },
            // ESC ] 1337 ; File = <args> : <base64> (BEL | ESC \)
            Dialect::ITerm2 => {
                match sequence[..payload_end].iter().rposition(|&b| b == b':') {
                    Some(colon) => &sequence[colon + 1..payload_end],
                    None => {
                        log_debug("iTerm2 image sequence without payload separator; dropped");
                        return;
                    }
                }
            }
        };
        let Some(bytes) = scanner::decode_base64_any(payload) else {
            log_debug(&format!(
                "{dialect:?} graphics payload failed base64 decode; dropped"
            ));
            return;
        };
        let format = ImageFormat::detect(&bytes).unwrap_or(ImageFormat::Png);
        match self.handler.handle(&bytes, format) {
            Ok(reference) => out.extend_from_slice(reference.as_bytes()),
            Err(err) => log_debug(&format!("image handler rejected {dialect:?} paste: {err:#}")),
        }
    }

    /// Handle the clipboard shortcut: read the host clipboard and emit
    /// either scanned text or an image reference. Errors emit nothing.
    fn paste_clipboard(&mut self, out: &mut Vec<u8>) {
        let content = match self.clipboard.read() {
            Ok(content) => content,
            Err(err) => {
                log_debug(&format!("clipboard read failed: {err:#}"));
                return;
            }
        };
        match content.tag {
            ClipboardTag::Text => {
                out.extend_from_slice(&scanner::scan(&content.bytes, self.handler.as_ref()));
            }
            ClipboardTag::Image(format) => match self.handler.handle(&content.bytes, format) {
                Ok(reference) => out.extend_from_slice(reference.as_bytes()),
                Err(err) => log_debug(&format!("image handler rejected clipboard paste: {err:#}")),
            },
        }
    }
}

/// Find the earliest dialect terminator at or after `from`. Returns the
/// terminator's offset and length.
fn find_terminator(dialect: Dialect, buf: &[u8], from: usize) -> Option<(usize, usize)> {
    match dialect {
        Dialect::Kitty => find_subslice(&buf[from..], KITTY_END).map(|pos| (from + pos, 2)),
        Dialect::ITerm2 => {
            let bel = buf[from..].iter().position(|&b| b == 0x07);
            let st = find_subslice(&buf[from..], KITTY_END);
            match (bel, st) {
                (Some(b), Some(s)) if b < s => Some((from + b, 1)),
                (Some(_) | None, Some(s)) => Some((from + s, 2)),
                (Some(b), None) => Some((from + b, 1)),
                (None, None) => None,
            }
        }
    }
}
