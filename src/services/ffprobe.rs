//! ffprobe-based stream inspection (secondary probe)
//!
//! Used only to fill attribute fields the primary probe left unknown.
//! ffprobe's JSON output format is stable and well-documented, so we shell
//! out rather than bind against FFmpeg libraries.

use std::path::Path;

use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};
use crate::media::MediaAttributes;

/// ffprobe JSON output structures (only the fields we read)
#[derive(Debug, Deserialize)]
pub struct FfprobeOutput {
    pub format: Option<Format>,
    pub streams: Option<Vec<Stream>>,
}

#[derive(Debug, Deserialize)]
pub struct Format {
    pub duration: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Stream {
    pub codec_type: Option<String>,
    pub codec_name: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub r_frame_rate: Option<String>,
    pub avg_frame_rate: Option<String>,
}

/// Stream-inspection probe backed by the ffprobe CLI
pub struct FfprobeService {
    ffprobe_path: String,
}

impl FfprobeService {
    pub fn new() -> Self {
        Self {
            ffprobe_path: "ffprobe".to_string(),
        }
    }

    pub fn with_ffprobe_path(ffprobe_path: String) -> Self {
        Self { ffprobe_path }
    }

    /// Inspect a file and reduce its streams to the attribute set.
    /// Non-zero exit or unparsable output is an `ExternalTool` error; the
    /// scanner treats that as an empty result, not a scan failure.
    pub async fn probe(&self, path: &Path) -> Result<MediaAttributes> {
        debug!(path = %path.display(), "Probing streams with ffprobe");

        let output = Command::new(&self.ffprobe_path)
            .args(["-v", "error"])
            .args(["-print_format", "json"])
            .args(["-show_streams", "-show_format"])
            .arg(path)
            .output()
            .await
            .map_err(|e| Error::external("ffprobe", e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::external(
                "ffprobe",
                format!("exit {:?}: {}", output.status.code(), stderr.trim()),
            ));
        }

        let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)
            .map_err(|e| Error::external("ffprobe", format!("unparsable JSON output: {e}")))?;

        Ok(attributes_from(probe))
    }
}

impl Default for FfprobeService {
    fn default() -> Self {
        Self::new()
    }
}

/// Reduce raw ffprobe output to the attribute set
fn attributes_from(probe: FfprobeOutput) -> MediaAttributes {
    let mut attrs = MediaAttributes::default();

    for stream in probe.streams.unwrap_or_default() {
        match stream.codec_type.as_deref() {
            Some("video") => {
                attrs.width = attrs.width.or(stream.width);
                attrs.height = attrs.height.or(stream.height);
                if attrs.codec.is_none() {
                    attrs.codec = stream.codec_name.clone();
                }
                if attrs.frame_rate.is_none() {
                    attrs.frame_rate = stream
                        .avg_frame_rate
                        .as_deref()
                        .and_then(parse_rational)
                        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rational));
                }
            }
            Some("audio") => {
                attrs.has_audio = Some(true);
            }
            _ => {}
        }
    }

    attrs.duration_secs = probe
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok());

    attrs
}

/// Parse a rational frame rate of the form `"num/den"`.
/// A zero or unparsable denominator yields `None`, never an error.
pub fn parse_rational(raw: &str) -> Option<f64> {
    let (num, den) = raw.split_once('/')?;
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    if den == 0.0 {
        return None;
    }
    Some(num / den)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rational() {
        assert_eq!(parse_rational("30/1"), Some(30.0));
        assert_eq!(parse_rational("30000/1001"), Some(30000.0 / 1001.0));
        assert_eq!(parse_rational("0/0"), None);
        assert_eq!(parse_rational("24"), None);
        assert_eq!(parse_rational("abc/def"), None);
    }

    #[test]
    fn test_attributes_from_streams() {
        let raw = serde_json::json!({
            "streams": [
                {
                    "codec_type": "video",
                    "codec_name": "h264",
                    "width": 1920,
                    "height": 1080,
                    "avg_frame_rate": "30000/1001"
                },
                {
                    "codec_type": "audio",
                    "codec_name": "aac"
                }
            ],
            "format": { "duration": "12.480" }
        });
        let probe: FfprobeOutput = serde_json::from_value(raw).unwrap();
        let attrs = attributes_from(probe);

        assert_eq!(attrs.codec.as_deref(), Some("h264"));
        assert_eq!(attrs.width, Some(1920));
        assert_eq!(attrs.height, Some(1080));
        assert_eq!(attrs.has_audio, Some(true));
        assert_eq!(attrs.duration_secs, Some(12.48));
        assert!((attrs.frame_rate.unwrap() - 29.97).abs() < 0.01);
    }

    #[test]
    fn test_attributes_from_empty_output() {
        let probe: FfprobeOutput = serde_json::from_str("{}").unwrap();
        let attrs = attributes_from(probe);
        assert_eq!(attrs, MediaAttributes::default());
    }

    #[test]
    fn test_zero_denominator_frame_rate_is_unknown() {
        let raw = serde_json::json!({
            "streams": [
                { "codec_type": "video", "codec_name": "hap", "avg_frame_rate": "0/0" }
            ]
        });
        let probe: FfprobeOutput = serde_json::from_value(raw).unwrap();
        assert_eq!(attributes_from(probe).frame_rate, None);
    }
}
