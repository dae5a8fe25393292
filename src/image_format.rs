//! Image format classification by magic bytes, with an extension fallback
//! for cases where content sniffing is inconclusive.

/// Image formats the paste pipeline knows how to label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
    Bmp,
    Tiff,
    Heic,
    Avif,
}

impl ImageFormat {
    /// Sniff the format from the leading bytes of a buffer.
    ///
    /// Buffers shorter than 8 bytes never match; a buffer that matches no
    /// known signature returns `None` rather than guessing.
    pub fn detect(data: &[u8]) -> Option<Self> {
        if data.len() < 8 {
            return None;
        }
        if data.starts_with(b"\x89PNG\r\n\x1a\n") {
            return Some(Self::Png);
        }
        if data.starts_with(b"\xFF\xD8\xFF") {
            return Some(Self::Jpeg);
        }
        if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            return Some(Self::Gif);
        }
        // RIFF container: "RIFF" <len> "WEBP"
        if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Some(Self::Webp);
        }
        if data.starts_with(b"BM") {
            return Some(Self::Bmp);
        }
        if data.starts_with(b"II*\x00") || data.starts_with(b"MM\x00*") {
            return Some(Self::Tiff);
        }
        // ISO-BMFF: "ftyp" box at offset 4, brand at offset 8.
        if data.len() >= 12 && &data[4..8] == b"ftyp" {
            let brand = &data[8..12];
            if matches!(brand, b"heic" | b"heix" | b"hevc" | b"hevx" | b"mif1" | b"msf1") {
                return Some(Self::Heic);
            }
            if matches!(brand, b"avif" | b"avis") {
                return Some(Self::Avif);
            }
        }
        None
    }

    /// Map a file extension (without the dot, any case) to a format.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::Webp),
            "bmp" => Some(Self::Bmp),
            "tiff" | "tif" => Some(Self::Tiff),
            "heic" | "heif" => Some(Self::Heic),
            "avif" => Some(Self::Avif),
            _ => None,
        }
    }

    /// Parse the `<fmt>` part of a `data:image/<fmt>` MIME label.
    pub fn from_mime_subtype(subtype: &str) -> Option<Self> {
        match subtype.to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpeg" | "jpg" => Some(Self::Jpeg),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::Webp),
            "bmp" => Some(Self::Bmp),
            "tiff" => Some(Self::Tiff),
            "heic" | "heif" => Some(Self::Heic),
            "avif" => Some(Self::Avif),
            _ => None,
        }
    }

    /// Canonical lowercase extension for the format.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Gif => "gif",
            Self::Webp => "webp",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
            Self::Heic => "heic",
            Self::Avif => "avif",
        }
    }

    /// Label used by clipboard readers and logs (`"png"`, `"jpeg"`, ...).
    pub fn label(self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            other => other.extension(),
        }
    }

    /// Parse a clipboard content tag; `"text"` is not an image format.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "jpeg" => Some(Self::Jpeg),
            other => Self::from_extension(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn padded(prefix: &[u8]) -> Vec<u8> {
        let mut data = prefix.to_vec();
        data.resize(data.len().max(16), 0);
        data
    }

    #[test]
    fn detects_png() {
        assert_eq!(
            ImageFormat::detect(&padded(b"\x89PNG\r\n\x1a\n")),
            Some(ImageFormat::Png)
        );
    }

    #[test]
    fn detects_jpeg() {
        assert_eq!(
            ImageFormat::detect(&padded(b"\xFF\xD8\xFF\xE0")),
            Some(ImageFormat::Jpeg)
        );
    }

    #[test]
    fn detects_both_gif_versions() {
        assert_eq!(
            ImageFormat::detect(&padded(b"GIF87a")),
            Some(ImageFormat::Gif)
        );
        assert_eq!(
            ImageFormat::detect(&padded(b"GIF89a")),
            Some(ImageFormat::Gif)
        );
    }

    #[test]
    fn detects_webp_riff_container() {
        let mut data = b"RIFF\x10\x00\x00\x00WEBP".to_vec();
        data.resize(16, 0);
        assert_eq!(ImageFormat::detect(&data), Some(ImageFormat::Webp));
        // RIFF without the WEBP fourcc is not a webp
        let mut wav = b"RIFF\x10\x00\x00\x00WAVE".to_vec();
        wav.resize(16, 0);
        assert_eq!(ImageFormat::detect(&wav), None);
    }

    #[test]
    fn detects_bmp_and_tiff() {
        assert_eq!(ImageFormat::detect(&padded(b"BM")), Some(ImageFormat::Bmp));
        assert_eq!(
            ImageFormat::detect(&padded(b"II*\x00")),
            Some(ImageFormat::Tiff)
        );
        assert_eq!(
            ImageFormat::detect(&padded(b"MM\x00*")),
            Some(ImageFormat::Tiff)
        );
    }

    #[test]
    fn detects_heic_and_avif_by_ftyp_brand() {
        let mut heic = b"\x00\x00\x00\x18ftypheic".to_vec();
        heic.resize(24, 0);
        assert_eq!(ImageFormat::detect(&heic), Some(ImageFormat::Heic));

        let mut avif = b"\x00\x00\x00\x18ftypavif".to_vec();
        avif.resize(24, 0);
        assert_eq!(ImageFormat::detect(&avif), Some(ImageFormat::Avif));

        let mut mp4 = b"\x00\x00\x00\x18ftypisom".to_vec();
        mp4.resize(24, 0);
        assert_eq!(ImageFormat::detect(&mp4), None);
    }

    #[test]
    fn short_buffers_never_match() {
        assert_eq!(ImageFormat::detect(b"\x89PNG"), None);
        assert_eq!(ImageFormat::detect(b""), None);
        assert_eq!(ImageFormat::detect(b"BM"), None);
    }

    #[test]
    fn unknown_signature_returns_none() {
        assert_eq!(ImageFormat::detect(b"definitely not an image"), None);
    }

    #[test]
    fn extension_lookup_covers_aliases() {
        assert_eq!(ImageFormat::from_extension("PNG"), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::from_extension("jpeg"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_extension("jpg"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_extension("tif"), Some(ImageFormat::Tiff));
        assert_eq!(ImageFormat::from_extension("heif"), Some(ImageFormat::Heic));
        assert_eq!(ImageFormat::from_extension("exe"), None);
    }

    #[test]
    fn label_round_trips() {
        for fmt in [
            ImageFormat::Png,
            ImageFormat::Jpeg,
            ImageFormat::Gif,
            ImageFormat::Webp,
            ImageFormat::Bmp,
            ImageFormat::Tiff,
            ImageFormat::Heic,
            ImageFormat::Avif,
        ] {
            assert_eq!(ImageFormat::from_label(fmt.label()), Some(fmt));
        }
        assert_eq!(ImageFormat::from_label("text"), None);
    }
}
