//! Media record data model
//!
//! Defines the record produced for every managed file, the optional
//! technical-attribute set filled in by the probes, and the filename key
//! used to join records with ledger rows.

use std::path::Path;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Video container extensions we recognize (lowercase, no dot)
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mxf", "mkv", "avi", "m4v", "webm", "wmv"];

/// Audio container extensions we recognize (lowercase, no dot)
pub const AUDIO_EXTENSIONS: &[&str] = &["wav", "aiff", "aif", "mp3", "m4a", "flac", "ogg"];

/// Trailing `_v<1-3 digits>` version suffix on a filename stem.
/// Four or more digits are treated as part of the stem.
static VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?P<stem>.*)_v(?P<ver>\d{1,3})$").unwrap());

/// Check whether a path carries a recognized media container extension
pub fn is_media_file(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let ext = ext.to_lowercase();
    VIDEO_EXTENSIONS.contains(&ext.as_str()) || AUDIO_EXTENSIONS.contains(&ext.as_str())
}

/// Technical attributes extracted by the probes; every field may be unknown
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaAttributes {
    pub codec: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<f64>,
    pub duration_secs: Option<f64>,
    pub has_audio: Option<bool>,
}

impl MediaAttributes {
    /// True if any field the secondary probe could supply is still unknown
    pub fn is_incomplete(&self) -> bool {
        self.codec.is_none()
            || self.width.is_none()
            || self.height.is_none()
            || self.frame_rate.is_none()
            || self.duration_secs.is_none()
    }

    /// Field-wise merge: fill only fields that are still unknown.
    /// Values already present (primary probe) are never overwritten.
    pub fn fill_missing(&mut self, other: MediaAttributes) {
        self.codec = self.codec.take().or(other.codec);
        self.width = self.width.or(other.width);
        self.height = self.height.or(other.height);
        self.frame_rate = self.frame_rate.or(other.frame_rate);
        self.duration_secs = self.duration_secs.or(other.duration_secs);
        self.has_audio = self.has_audio.or(other.has_audio);
    }
}

/// One managed media file as discovered by the scanner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaRecord {
    /// Absolute path
    pub path: String,
    /// File name including extension
    pub name: String,
    /// Lowercased extension including the dot (e.g., ".mov")
    pub ext: String,
    pub size_bytes: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub attrs: MediaAttributes,
}

impl MediaRecord {
    /// Derive the ledger key for this record from its file name
    pub fn key(&self) -> FileKey {
        derive_key(&self.name)
    }
}

/// Version-suffix-stripped filename stem plus the parsed version, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileKey {
    pub stem: String,
    pub version: Option<u32>,
}

/// Derive the join key from a file name. Never fails: without a version
/// suffix the key is the full stem and the version is absent.
pub fn derive_key(name: &str) -> FileKey {
    let stem = Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("");

    if let Some(caps) = VERSION_RE.captures(stem) {
        let version = caps["ver"].parse::<u32>().ok();
        if version.is_some() {
            return FileKey {
                stem: caps["stem"].to_string(),
                version,
            };
        }
    }

    FileKey {
        stem: stem.to_string(),
        version: None,
    }
}
