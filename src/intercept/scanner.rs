//! Plain-text scanning for image references.
//!
//! Pasted (or typed) text can carry images indirectly: absolute or
//! home-relative paths to image files, or `data:image/...;base64,` URIs.
//! One pass collects every candidate range, then replacements are applied
//! back-to-front so earlier splices never invalidate later offsets.

use crate::handler::ImageHandler;
use crate::image_format::ImageFormat;
use crate::log_debug;
use base64::engine::general_purpose::{
    STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD,
};
use base64::Engine as _;
use regex::bytes::Regex;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Files above this size are never read for substitution.
const MAX_FILE_BYTES: u64 = 50 * 1024 * 1024;

/// Absolute (`/...`) or home-relative (`~/...`) path ending in a recognized
/// image extension. The byte class admits anything path-like but stops at
/// whitespace, quotes, and shell metacharacters.
fn path_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?-u)(?:~/|/)[^\x00-\x20\x7f"'<>:;|?*\\]*\.(?i:png|jpe?g|gif|webp|bmp|tiff?|heic|heif|avif)\b"#,
        )
        .expect("path pattern is valid")
    })
}

/// `data:image/<fmt>;base64,<payload>` URI.
fn data_uri_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?-u)data:image/([A-Za-z0-9]+);base64,([A-Za-z0-9+/_=-]+)")
            .expect("data URI pattern is valid")
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchKind {
    FilePath,
    DataUri,
}

/// Transient match record: half-open byte range plus which family hit.
struct PathMatch {
    start: usize,
    end: usize,
    kind: MatchKind,
}

/// Rewrite `bytes`, substituting each image reference the handler accepts.
/// Every failure (missing file, oversize, decode error, handler error)
/// leaves that one occurrence unmodified.
pub fn scan(bytes: &[u8], handler: &dyn ImageHandler) -> Vec<u8> {
    if bytes.is_empty() {
        return Vec::new();
    }
    let mut matches: Vec<PathMatch> = Vec::new();
    for m in path_pattern().find_iter(bytes) {
        matches.push(PathMatch {
            start: m.start(),
            end: m.end(),
            kind: MatchKind::FilePath,
        });
    }
    for m in data_uri_pattern().find_iter(bytes) {
        matches.push(PathMatch {
            start: m.start(),
            end: m.end(),
            kind: MatchKind::DataUri,
        });
    }
    if matches.is_empty() {
        return bytes.to_vec();
    }

    // Replace by descending start offset; drop any match overlapping one
    // already applied.
    matches.sort_by(|a, b| b.start.cmp(&a.start));
    let mut out = bytes.to_vec();
    let mut applied_start = usize::MAX;
    for m in matches {
        if m.end > applied_start {
            continue;
        }
        let replacement = match m.kind {
            MatchKind::FilePath => substitute_path(&bytes[m.start..m.end], handler),
            MatchKind::DataUri => substitute_data_uri(&bytes[m.start..m.end], handler),
        };
        if let Some(reference) = replacement {
            out.splice(m.start..m.end, reference.into_bytes());
            applied_start = m.start;
        }
    }
    out
}

/// Decode base64 trying standard and URL-safe alphabets, padded and
/// unpadded, in that order.
pub(crate) fn decode_base64_any(payload: &[u8]) -> Option<Vec<u8>> {
    STANDARD
        .decode(payload)
        .or_else(|_| STANDARD_NO_PAD.decode(payload))
        .or_else(|_| URL_SAFE.decode(payload))
        .or_else(|_| URL_SAFE_NO_PAD.decode(payload))
        .ok()
}

fn substitute_path(raw: &[u8], handler: &dyn ImageHandler) -> Option<String> {
    let text = std::str::from_utf8(raw).ok()?;
    let path = expand_tilde(text)?;
    let meta = fs::metadata(&path).ok()?;
    if meta.is_dir() {
        return None;
    }
    if meta.len() > MAX_FILE_BYTES {
        log_debug(&format!(
            "skipping {} byte file {text}: over the substitution ceiling",
            meta.len()
        ));
        return None;
    }
    let bytes = fs::read(&path).ok()?;
    let format = ImageFormat::detect(&bytes).or_else(|| {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(ImageFormat::from_extension)
    })?;
    match handler.handle(&bytes, format) {
        Ok(reference) => Some(reference),
        Err(err) => {
            log_debug(&format!("image handler rejected {text}: {err:#}"));
            None
        }
    }
}

fn substitute_data_uri(raw: &[u8], handler: &dyn ImageHandler) -> Option<String> {
    let caps = data_uri_pattern().captures(raw)?;
    let subtype = std::str::from_utf8(caps.get(1)?.as_bytes()).ok()?;
    let format = ImageFormat::from_mime_subtype(subtype)?;
    let bytes = decode_base64_any(caps.get(2)?.as_bytes())?;
    match handler.handle(&bytes, format) {
        Ok(reference) => Some(reference),
        Err(err) => {
            log_debug(&format!("image handler rejected data URI: {err:#}"));
            None
        }
    }
}

/// Expand a leading `~/` against `$HOME`; absolute paths pass through.
fn expand_tilde(path: &str) -> Option<PathBuf> {
    if let Some(rest) = path.strip_prefix("~/") {
        let home = env::var_os("HOME")?;
        Some(PathBuf::from(home).join(rest))
    } else {
        Some(PathBuf::from(path))
    }
}
