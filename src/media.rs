//! Core data model: discovered videos, their enrichment, and the
//! change-detection fingerprint.

use std::fmt::Write as _;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Descriptive metadata merged in from the external lookup provider.
///
/// Every field is optional; an empty `VideoDetails` and a missing one are
/// equivalent as far as the scanner is concerned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plot: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub director: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actors: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster: Option<String>,
}

/// One discovered video file, produced fresh on every scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    /// POSIX-style path relative to the effective root. Doubles as the
    /// cache key and the file-resolution key for streaming.
    pub relative_path: String,
    /// File name with the extension stripped.
    pub title: String,
    /// Human-readable size ("512 B", "2.0 KB", ...).
    pub size_label: String,
    pub last_modified: DateTime<Utc>,
    /// Cheap change-detection digest over path, size, and mtime.
    /// Not a content hash.
    pub fingerprint: String,
    #[serde(flatten)]
    pub details: Option<VideoDetails>,
    pub scanned_at: DateTime<Utc>,
}

/// A [`VideoRecord`] adopted into the index cache.
///
/// Ids are unique and stable only within one cache generation; a rescan
/// may assign fresh ones. Never persist them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedVideo {
    pub id: u64,
    #[serde(flatten)]
    pub record: VideoRecord,
}

/// Derive a display title from a file name by stripping the extension.
pub fn title_from_file_name(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(name)
        .to_string()
}

/// Format a byte count as a base-1024 label with one decimal place from
/// KB upward.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let kb = bytes as f64 / 1024.0;
    if kb < 1024.0 {
        return format!("{kb:.1} KB");
    }
    let mb = kb / 1024.0;
    if mb < 1024.0 {
        return format!("{mb:.1} MB");
    }
    format!("{:.1} GB", mb / 1024.0)
}

/// Compute the change-detection fingerprint for a file.
///
/// Pure function of `(relative_path, size, mtime)`: two files with an
/// identical triple collide deterministically, which is acceptable for
/// change detection and nothing more.
pub fn fingerprint(relative_path: &str, size: u64, modified: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(relative_path.as_bytes());
    hasher.update(b":");
    hasher.update(size.to_string().as_bytes());
    hasher.update(b":");
    hasher.update(modified.timestamp_millis().to_string().as_bytes());

    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_size_labels() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5_242_880), "5.0 MB");
        assert_eq!(format_size(1_073_741_824), "1.0 GB");
        assert_eq!(format_size(1536), "1.5 KB");
    }

    #[test]
    fn test_title_from_file_name() {
        assert_eq!(title_from_file_name("inception.mp4"), "inception");
        assert_eq!(title_from_file_name("The Matrix.mkv"), "The Matrix");
        assert_eq!(title_from_file_name("no_extension"), "no_extension");
    }

    #[test]
    fn test_fingerprint_is_pure() {
        let modified = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

        let a = fingerprint("movies/inception.mp4", 1024, modified);
        let b = fingerprint("movies/inception.mp4", 1024, modified);
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_tracks_each_input() {
        let modified = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let touched = Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap();
        let base = fingerprint("movies/inception.mp4", 1024, modified);

        assert_ne!(base, fingerprint("movies/tenet.mp4", 1024, modified));
        assert_ne!(base, fingerprint("movies/inception.mp4", 2048, modified));
        assert_ne!(base, fingerprint("movies/inception.mp4", 1024, touched));
    }

    #[test]
    fn test_indexed_video_serializes_flat_camel_case() {
        let modified = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let video = IndexedVideo {
            id: 7,
            record: VideoRecord {
                relative_path: "movies/inception.mp4".to_string(),
                title: "inception".to_string(),
                size_label: "1.0 KB".to_string(),
                last_modified: modified,
                fingerprint: "abc123".to_string(),
                details: Some(VideoDetails {
                    year: Some("2010".to_string()),
                    ..VideoDetails::default()
                }),
                scanned_at: modified,
            },
        };

        let json = serde_json::to_value(&video).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["relativePath"], "movies/inception.mp4");
        assert_eq!(json["sizeLabel"], "1.0 KB");
        assert_eq!(json["year"], "2010");
        assert!(json.get("plot").is_none());
    }
}
