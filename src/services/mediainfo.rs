//! MediaInfo-based structural analysis (primary probe)
//!
//! Shells out to the `mediainfo` CLI with JSON output. MediaInfo reads
//! container structure without decoding, so it is the first stop for codec,
//! geometry, frame rate, and duration; ffprobe only fills what it misses.

use std::path::Path;

use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};
use crate::media::MediaAttributes;

/// MediaInfo JSON output structures (only the fields we read).
/// MediaInfo reports every value as a string.
#[derive(Debug, Deserialize)]
struct MediaInfoOutput {
    media: Option<Media>,
}

#[derive(Debug, Deserialize)]
struct Media {
    #[serde(default)]
    track: Vec<Track>,
}

#[derive(Debug, Deserialize)]
struct Track {
    #[serde(rename = "@type")]
    track_type: Option<String>,
    #[serde(rename = "Format")]
    format: Option<String>,
    #[serde(rename = "CodecID")]
    codec_id: Option<String>,
    #[serde(rename = "Width")]
    width: Option<String>,
    #[serde(rename = "Height")]
    height: Option<String>,
    #[serde(rename = "FrameRate")]
    frame_rate: Option<String>,
    #[serde(rename = "Duration")]
    duration: Option<String>,
}

/// Structural media probe backed by the MediaInfo CLI
pub struct MediaInfoService {
    mediainfo_path: String,
}

impl MediaInfoService {
    pub fn new() -> Self {
        Self {
            mediainfo_path: "mediainfo".to_string(),
        }
    }

    pub fn with_mediainfo_path(mediainfo_path: String) -> Self {
        Self { mediainfo_path }
    }

    /// Analyze a file. The result may be partially populated or empty for
    /// ordinary unsupported files; that is not an error. Only a failed
    /// invocation or unparsable output errors, and the scanner treats that
    /// as an empty result.
    pub async fn probe(&self, path: &Path) -> Result<MediaAttributes> {
        debug!(path = %path.display(), "Analyzing file with mediainfo");

        let output = Command::new(&self.mediainfo_path)
            .arg("--Output=JSON")
            .arg(path)
            .output()
            .await
            .map_err(|e| Error::external("mediainfo", e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::external(
                "mediainfo",
                format!("exit {:?}: {}", output.status.code(), stderr.trim()),
            ));
        }

        let parsed: MediaInfoOutput = serde_json::from_slice(&output.stdout)
            .map_err(|e| Error::external("mediainfo", format!("unparsable JSON output: {e}")))?;

        Ok(attributes_from(parsed))
    }
}

impl Default for MediaInfoService {
    fn default() -> Self {
        Self::new()
    }
}

fn attributes_from(parsed: MediaInfoOutput) -> MediaAttributes {
    let mut attrs = MediaAttributes::default();

    let tracks = parsed.media.map(|m| m.track).unwrap_or_default();
    for track in &tracks {
        match track.track_type.as_deref() {
            Some("Video") if attrs.width.is_none() => {
                attrs.width = parse_num(&track.width);
                attrs.height = parse_num(&track.height);
                attrs.frame_rate = parse_num(&track.frame_rate);
                attrs.codec = track.format.clone().or_else(|| track.codec_id.clone());
                if attrs.duration_secs.is_none() {
                    attrs.duration_secs = parse_num(&track.duration);
                }
            }
            Some("Audio") => {
                attrs.has_audio = Some(true);
                if attrs.duration_secs.is_none() {
                    attrs.duration_secs = parse_num(&track.duration);
                }
            }
            _ => {}
        }
    }

    attrs
}

fn parse_num<T: std::str::FromStr>(raw: &Option<String>) -> Option<T> {
    raw.as_deref().and_then(|s| s.trim().parse().ok())
}
