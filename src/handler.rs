//! Image placement seam.
//!
//! The interceptor never decides where pasted image bytes go; it hands them
//! to an [`ImageHandler`] and splices whatever reference string comes back
//! into the outgoing stream. The default implementation spools bytes to a
//! directory the remote process can reach and returns the file path.

use crate::image_format::ImageFormat;
use crate::log_debug;
use anyhow::{bail, Context, Result};
use crossbeam_channel::bounded;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Receives raw image bytes and returns the reference string substituted
/// into the stream. Must tolerate rapid repeated calls; a slow `handle`
/// stalls keystroke delivery, so implementations should return quickly or
/// be wrapped in [`TimedImageHandler`].
pub trait ImageHandler: Send + Sync {
    fn handle(&self, bytes: &[u8], format: ImageFormat) -> Result<String>;
}

/// Writes each image into a spool directory under a unique name and returns
/// the resulting path as the reference.
pub struct SpoolImageHandler {
    dir: PathBuf,
    seq: AtomicU64,
}

impl SpoolImageHandler {
    pub fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create spool directory {}", dir.display()))?;
        Ok(Self {
            dir,
            seq: AtomicU64::new(0),
        })
    }

    fn next_name(&self, format: ImageFormat) -> String {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!(
            "paste-{stamp}-{}-{seq}.{}",
            process::id(),
            format.extension()
        )
    }
}

impl ImageHandler for SpoolImageHandler {
    fn handle(&self, bytes: &[u8], format: ImageFormat) -> Result<String> {
        if bytes.is_empty() {
            bail!("refusing to spool an empty image");
        }
        let path = self.dir.join(self.next_name(format));
        fs::write(&path, bytes)
            .with_context(|| format!("failed to spool image to {}", path.display()))?;
        log_debug(&format!(
            "spooled {} byte {} image to {}",
            bytes.len(),
            format.label(),
            path.display()
        ));
        Ok(path.display().to_string())
    }
}

/// Bounds an inner handler with a wall-clock timeout.
///
/// The call runs on a worker thread; on timeout the caller gets an error and
/// moves on while the in-flight call runs to completion on the worker (it is
/// not cancelable).
pub struct TimedImageHandler {
    inner: Arc<dyn ImageHandler>,
    timeout: Duration,
}

impl TimedImageHandler {
    pub fn new(inner: Arc<dyn ImageHandler>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

impl ImageHandler for TimedImageHandler {
    fn handle(&self, bytes: &[u8], format: ImageFormat) -> Result<String> {
        let (tx, rx) = bounded(1);
        let inner = Arc::clone(&self.inner);
        let owned = bytes.to_vec();
        thread::spawn(move || {
            let result = inner.handle(&owned, format);
            let _ = tx.send(result);
        });
        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(_) => {
                log_debug(&format!(
                    "image handler timed out after {}ms",
                    self.timeout.as_millis()
                ));
                bail!("image handler timed out after {}ms", self.timeout.as_millis())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn unique_dir(tag: &str) -> PathBuf {
        env::temp_dir().join(format!("pastebridge_test_{tag}_{}", process::id()))
    }

    #[test]
    fn spool_writes_bytes_and_returns_path() {
        let dir = unique_dir("spool");
        let handler = SpoolImageHandler::new(dir.clone()).unwrap();
        let reference = handler.handle(b"\x89PNG fake", ImageFormat::Png).unwrap();
        assert!(reference.ends_with(".png"), "got {reference}");
        assert_eq!(fs::read(&reference).unwrap(), b"\x89PNG fake");
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn spool_rejects_empty_payload() {
        let dir = unique_dir("spool_empty");
        let handler = SpoolImageHandler::new(dir.clone()).unwrap();
        assert!(handler.handle(b"", ImageFormat::Png).is_err());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn spool_names_are_unique_across_rapid_calls() {
        let dir = unique_dir("spool_seq");
        let handler = SpoolImageHandler::new(dir.clone()).unwrap();
        let a = handler.handle(b"aaaa", ImageFormat::Gif).unwrap();
        let b = handler.handle(b"bbbb", ImageFormat::Gif).unwrap();
        assert_ne!(a, b);
        let _ = fs::remove_dir_all(&dir);
    }

    struct SlowHandler;

    impl ImageHandler for SlowHandler {
        fn handle(&self, _bytes: &[u8], _format: ImageFormat) -> Result<String> {
            thread::sleep(Duration::from_millis(200));
            Ok("too late".to_string())
        }
    }

    struct FastHandler;

    impl ImageHandler for FastHandler {
        fn handle(&self, _bytes: &[u8], _format: ImageFormat) -> Result<String> {
            Ok("quick".to_string())
        }
    }

    #[test]
    fn timed_handler_passes_fast_results_through() {
        let timed = TimedImageHandler::new(Arc::new(FastHandler), Duration::from_millis(500));
        assert_eq!(timed.handle(b"x", ImageFormat::Png).unwrap(), "quick");
    }

    #[test]
    fn timed_handler_errors_on_timeout() {
        let timed = TimedImageHandler::new(Arc::new(SlowHandler), Duration::from_millis(20));
        let err = timed.handle(b"x", ImageFormat::Png).unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
