//! Host clipboard seam.
//!
//! The interceptor only ever asks "what is on the clipboard right now"; the
//! platform-specific reading lives behind [`ClipboardReader`]. The OS
//! implementation shells out to whichever clipboard utility the host has
//! (`wl-paste`, `xclip`, `pngpaste`/`pbpaste`), trying image targets before
//! falling back to text.

use crate::image_format::ImageFormat;
use crate::log_debug;
use anyhow::{bail, Result};
use std::process::Command;

/// What a clipboard read produced: raw bytes plus a content tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardContent {
    pub bytes: Vec<u8>,
    pub tag: ClipboardTag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipboardTag {
    Text,
    Image(ImageFormat),
}

pub trait ClipboardReader: Send + Sync {
    fn read(&self) -> Result<ClipboardContent>;
}

/// Reads the host clipboard by invoking external utilities.
pub struct OsClipboardReader;

impl OsClipboardReader {
    /// Candidate (command, args, tag) probes in preference order. Image
    /// targets come first so an image copy is not misread as its textual
    /// fallback representation.
    fn probes() -> &'static [(&'static str, &'static [&'static str], Option<ImageFormat>)] {
        &[
            ("wl-paste", &["--type", "image/png"], Some(ImageFormat::Png)),
            (
                "xclip",
                &["-selection", "clipboard", "-t", "image/png", "-o"],
                Some(ImageFormat::Png),
            ),
            ("pngpaste", &["-"], Some(ImageFormat::Png)),
            ("wl-paste", &["--no-newline"], None),
            ("xclip", &["-selection", "clipboard", "-o"], None),
            ("pbpaste", &[], None),
        ]
    }

    fn run_probe(cmd: &str, args: &[&str]) -> Option<Vec<u8>> {
        let output = Command::new(cmd).args(args).output().ok()?;
        if !output.status.success() || output.stdout.is_empty() {
            return None;
        }
        Some(output.stdout)
    }
}

impl ClipboardReader for OsClipboardReader {
    fn read(&self) -> Result<ClipboardContent> {
        for (cmd, args, format) in Self::probes() {
            let Some(bytes) = Self::run_probe(cmd, args) else {
                continue;
            };
            let tag = match format {
                // Trust magic bytes over the requested MIME target when they
                // disagree; some utilities convert on the fly.
                Some(requested) => {
                    ClipboardTag::Image(ImageFormat::detect(&bytes).unwrap_or(*requested))
                }
                None => ClipboardTag::Text,
            };
            log_debug(&format!(
                "clipboard read via {cmd}: {} bytes, {:?}",
                bytes.len(),
                tag
            ));
            return Ok(ClipboardContent { bytes, tag });
        }
        bail!("no clipboard utility produced content (tried wl-paste, xclip, pngpaste, pbpaste)")
    }
}
