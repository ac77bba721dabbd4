//! Outbound media classification.
//!
//! The rich-media endpoint only takes public URLs and a numeric `file_type`:
//! 1 = image (png/jpg), 2 = video (mp4), 3 = voice (silk). Generic files are
//! not open to bots.

use std::path::Path;

use serde::Serialize;

const IMAGE_EXTS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "u8")]
pub enum FileType {
    Image,
    Video,
    Voice,
}

impl From<FileType> for u8 {
    fn from(ft: FileType) -> u8 {
        match ft {
            FileType::Image => 1,
            FileType::Video => 2,
            FileType::Voice => 3,
        }
    }
}

impl FileType {
    /// Classify by file extension (case-insensitive). `None` when unsupported.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        if IMAGE_EXTS.contains(&ext.as_str()) {
            Some(Self::Image)
        } else if ext == "mp4" {
            Some(Self::Video)
        } else if ext == "silk" {
            Some(Self::Voice)
        } else {
            None
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Best-effort guess for a URL; anything unrecognized is sent as an image.
    pub fn guess_for_url(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let last = path.rsplit('/').next().unwrap_or(path);
        last.rsplit_once('.')
            .and_then(|(_, ext)| Self::from_extension(ext))
            .unwrap_or(Self::Image)
    }
}

/// `true` for values starting with `http://` or `https://` (case-insensitive).
pub fn is_url(value: &str) -> bool {
    let v = value.trim().to_ascii_lowercase();
    v.starts_with("http://") || v.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_detection() {
        assert!(is_url("https://example.com/a.png"));
        assert!(is_url("  HTTP://example.com"));
        assert!(!is_url("/tmp/a.png"));
        assert!(!is_url("ftp://example.com/a.png"));
        assert!(!is_url(""));
    }

    #[test]
    fn classify_extensions() {
        assert_eq!(FileType::from_extension("PNG"), Some(FileType::Image));
        assert_eq!(FileType::from_extension(".webp"), Some(FileType::Image));
        assert_eq!(FileType::from_extension("mp4"), Some(FileType::Video));
        assert_eq!(FileType::from_extension("silk"), Some(FileType::Voice));
        assert_eq!(FileType::from_extension("pdf"), None);
    }

    #[test]
    fn classify_paths() {
        assert_eq!(FileType::from_path(Path::new("/tmp/clip.MP4")), Some(FileType::Video));
        assert_eq!(FileType::from_path(Path::new("/tmp/noext")), None);
    }

    #[test]
    fn url_guess_ignores_query_and_defaults_to_image() {
        assert_eq!(FileType::guess_for_url("https://cdn/x/clip.mp4?sig=1"), FileType::Video);
        assert_eq!(FileType::guess_for_url("https://cdn/x/render"), FileType::Image);
        assert_eq!(FileType::guess_for_url("https://cdn.example.com/"), FileType::Image);
    }

    #[test]
    fn file_type_wire_values() {
        assert_eq!(serde_json::to_string(&FileType::Image).unwrap(), "1");
        assert_eq!(u8::from(FileType::Voice), 3);
    }
}
