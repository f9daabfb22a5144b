//! FFmpeg-backed transcode operations
//!
//! The command lines are opaque external-tool invocations: a Hap proxy
//! scaled by `1/res_factor`, and a Hap-video + PCM-audio extraction used to
//! carry audio-only assets through video pipelines.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Transcode service invoking ffmpeg
pub struct Transcoder {
    ffmpeg_path: String,
    /// Where generated proxies land
    proxy_dir: PathBuf,
}

impl Transcoder {
    pub fn new(proxy_dir: PathBuf) -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            proxy_dir,
        }
    }

    pub fn with_ffmpeg_path(proxy_dir: PathBuf, ffmpeg_path: String) -> Self {
        Self {
            ffmpeg_path,
            proxy_dir,
        }
    }

    /// Create a Hap (or Hap Alpha) proxy MOV scaled by `1/res_factor`.
    /// Output: `<proxy_dir>/<stem>_proxy<res_factor>.mov`
    pub async fn create_proxy(
        &self,
        source: &Path,
        res_factor: u32,
        alpha: bool,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.proxy_dir).await?;

        let stem = source
            .file_stem()
            .ok_or_else(|| Error::NotFound(source.to_path_buf()))?
            .to_string_lossy();
        let out_path = self.proxy_dir.join(format!("{stem}_proxy{res_factor}.mov"));

        let scale_expr = format!("scale=iw/{res_factor}:ih/{res_factor}");

        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.arg("-y")
            .args(["-i"])
            .arg(source)
            .args(["-vf", &scale_expr])
            .args(["-c:v", "hap"]);
        if alpha {
            cmd.args(["-format", "hap_alpha"]);
        }
        cmd.args(["-acodec", "pcm_s16le"]).arg(&out_path);

        debug!(source = %source.display(), out = %out_path.display(), "Generating proxy");
        run_ffmpeg(cmd).await?;

        info!(out = %out_path.display(), "Proxy generated");
        Ok(out_path)
    }

    /// Create a MOV with a black 16x16 Hap video track at 30fps plus the
    /// source's audio as PCM s16le. Output lands next to the source unless
    /// `out_dir` is given: `<stem>_hapaudio.mov`
    pub async fn extract_audio(&self, source: &Path, out_dir: Option<&Path>) -> Result<PathBuf> {
        let target_dir = match out_dir {
            Some(dir) => dir.to_path_buf(),
            None => source
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| Error::NotFound(source.to_path_buf()))?,
        };
        fs::create_dir_all(&target_dir).await?;

        let stem = source
            .file_stem()
            .ok_or_else(|| Error::NotFound(source.to_path_buf()))?
            .to_string_lossy();
        let out_path = target_dir.join(format!("{stem}_hapaudio.mov"));

        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.arg("-y")
            .args(["-f", "lavfi", "-i", "color=c=black:s=16x16"])
            .arg("-i")
            .arg(source)
            .args(["-map", "0:v", "-map", "1:a"])
            .args(["-c:v", "hap"])
            .args(["-c:a", "pcm_s16le"])
            .args(["-vf", "fps=30"])
            .args(["-ar", "48000"])
            .args(["-f", "mov"])
            .arg("-shortest")
            .arg(&out_path);

        debug!(source = %source.display(), out = %out_path.display(), "Extracting audio");
        run_ffmpeg(cmd).await?;

        info!(out = %out_path.display(), "Audio extraction complete");
        Ok(out_path)
    }
}

async fn run_ffmpeg(mut cmd: Command) -> Result<()> {
    let output = cmd
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| Error::external("ffmpeg", e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::external(
            "ffmpeg",
            format!("exit {:?}: {}", output.status.code(), stderr.trim()),
        ));
    }
    Ok(())
}
