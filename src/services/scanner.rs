//! Repository inventory scanner
//!
//! Walks the managed repository tree, filters candidate media files, and
//! produces one `MediaRecord` per readable candidate using a primary
//! (MediaInfo) probe with an ffprobe fallback for still-unknown fields.

use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::media::{self, MediaAttributes, MediaRecord};

use super::ffprobe::FfprobeService;
use super::mediainfo::MediaInfoService;

/// File names that are never media candidates regardless of extension:
/// dotfiles (covers `.DS_Store` and `._*` resource-fork shadows) and
/// Windows shell artifacts.
fn is_ignored_name(name: &str) -> bool {
    name.starts_with('.')
        || name.eq_ignore_ascii_case("thumbs.db")
        || name.eq_ignore_ascii_case("desktop.ini")
}

/// Scanner service for inventorying the repository
pub struct ScannerService {
    primary: MediaInfoService,
    secondary: FfprobeService,
}

impl ScannerService {
    pub fn new() -> Self {
        Self {
            primary: MediaInfoService::new(),
            secondary: FfprobeService::new(),
        }
    }

    pub fn with_probes(primary: MediaInfoService, secondary: FfprobeService) -> Self {
        Self { primary, secondary }
    }

    /// Scan the repository tree and return records in traversal order.
    /// One-shot: callers re-invoke the whole walk to refresh.
    pub async fn scan(&self, root: &Path) -> Result<Vec<MediaRecord>> {
        if !root.is_dir() {
            return Err(Error::NotFound(root.to_path_buf()));
        }

        info!(root = %root.display(), "Starting repository scan");

        let mut records = Vec::new();

        // Ignored names are pruned at walk level so a dot-named directory
        // is never descended into. Depth 0 is the root itself and always
        // passes, whatever it is called.
        for entry in WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0 || !is_ignored_name(&e.file_name().to_string_lossy())
            })
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if !media::is_media_file(path) {
                continue;
            }

            // Unreadable candidates (permission errors, dangling links,
            // removed mid-scan) are skipped silently; not a scan failure.
            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Skipping unreadable file");
                    continue;
                }
            };

            let attrs = self.probe_with_fallback(path).await;

            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| format!(".{}", e.to_lowercase()))
                .unwrap_or_default();

            records.push(MediaRecord {
                path: path.to_string_lossy().to_string(),
                name,
                ext,
                size_bytes: metadata.len(),
                created_at: metadata.created().ok().map(DateTime::<Utc>::from),
                modified_at: metadata.modified().ok().map(DateTime::<Utc>::from),
                attrs,
            });
        }

        info!(root = %root.display(), total = records.len(), "Repository scan completed");
        Ok(records)
    }

    /// Run the primary probe, then fill still-unknown fields from the
    /// secondary probe. Probe failures yield empty results, never scan
    /// failures; a record with all-unknown attributes is still produced.
    async fn probe_with_fallback(&self, path: &Path) -> MediaAttributes {
        let mut attrs = match self.primary.probe(path).await {
            Ok(attrs) => attrs,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Primary probe failed");
                MediaAttributes::default()
            }
        };

        if attrs.is_incomplete() {
            match self.secondary.probe(path).await {
                Ok(fallback) => attrs.fill_missing(fallback),
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Secondary probe failed");
                }
            }
        }

        if attrs.is_incomplete() {
            warn!(path = %path.display(), "Probes left fields unknown; recording as-is");
        }

        attrs
    }
}

impl Default for ScannerService {
    fn default() -> Self {
        Self::new()
    }
}
