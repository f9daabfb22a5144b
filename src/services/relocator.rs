//! Relocation engine for moving files between managed zones
//!
//! Per-file state machine: try an atomic rename first; on a cross-device
//! error fall back to a copy with progress reporting. Fallback preference is
//! `rsync --progress` when present, then the platform `mv`, then a manual
//! copy+delete. Every source must resolve inside the configured base
//! directory before anything is touched.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Progress-line parsing for the copy-with-progress tool.
///
/// Contract (v1): a line reports `<bytes> <percent>%` where bytes may use
/// comma grouping and percent is 0-100. Anything else — summary lines,
/// speed-only lines, partial writes — is silently dropped. Swapping the
/// fallback tool means revisiting only this module.
pub mod progress {
    use once_cell::sync::Lazy;
    use regex::Regex;

    static LINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*([\d,]+)\s+(\d{1,3})%").unwrap());

    /// Extract `(bytes_so_far, percent)` from one status line, if it
    /// matches the contract.
    pub fn parse_line(line: &str) -> Option<(u64, u8)> {
        let caps = LINE_RE.captures(line)?;
        let bytes: u64 = caps[1].replace(',', "").parse().ok()?;
        let percent: u8 = caps[2].parse().ok()?;
        if percent > 100 {
            return None;
        }
        Some((bytes, percent))
    }
}

/// A single progress report forwarded to the caller, as reported by the
/// copy tool (no smoothing, no monotonic clamping)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyProgress {
    pub bytes: u64,
    pub percent: u8,
}

/// Which copy strategy backs the cross-device fallback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackTool {
    /// `rsync --progress --remove-source-files` (preferred; emits progress)
    Rsync,
    /// The platform `mv` command
    PlatformMove,
    /// `tokio::fs` copy followed by source delete
    Manual,
}

/// Per-file event emitted while a batch runs
#[derive(Debug, Clone)]
pub enum RelocationEvent {
    Started { index: usize, source: PathBuf },
    Progress { index: usize, progress: CopyProgress },
    Moved { index: usize, target: PathBuf },
    Failed { index: usize, source: PathBuf, message: String },
}

/// Outcome of a whole batch
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub moved: Vec<PathBuf>,
    pub errors: Vec<String>,
}

/// Relocation engine bound to a managed base directory
pub struct Relocator {
    base_dir: PathBuf,
    fallback: FallbackTool,
    rsync_path: String,
}

impl Relocator {
    /// Create an engine, probing the host once for the best fallback tool
    pub async fn new(base_dir: PathBuf) -> Self {
        let fallback = detect_fallback().await;
        info!(base = %base_dir.display(), fallback = ?fallback, "Relocator ready");
        Self {
            base_dir,
            fallback,
            rsync_path: "rsync".to_string(),
        }
    }

    /// Create an engine with an explicit fallback strategy
    pub fn with_fallback(base_dir: PathBuf, fallback: FallbackTool) -> Self {
        Self {
            base_dir,
            fallback,
            rsync_path: "rsync".to_string(),
        }
    }

    /// Override the rsync binary location
    pub fn with_rsync_path(mut self, rsync_path: String) -> Self {
        self.rsync_path = rsync_path;
        self
    }

    /// Move one file into `dest_dir`, reporting copy progress through
    /// `on_progress` when the fallback path runs. Returns the final target
    /// path, which may carry a ` (n)` collision suffix.
    pub async fn relocate(
        &self,
        source: &Path,
        dest_dir: &Path,
        on_progress: &mut (dyn FnMut(CopyProgress) + Send),
    ) -> Result<PathBuf> {
        // Safety precondition: resolve and bounds-check before any mutation.
        let src = fs::canonicalize(source)
            .await
            .map_err(|e| resolve_error(e, source))?;
        let base = fs::canonicalize(&self.base_dir)
            .await
            .map_err(|e| resolve_error(e, &self.base_dir))?;
        if !src.starts_with(&base) {
            return Err(Error::OutOfBounds {
                path: source.to_path_buf(),
                base: self.base_dir.clone(),
            });
        }

        fs::create_dir_all(dest_dir).await?;

        let file_name = src
            .file_name()
            .ok_or_else(|| Error::NotFound(src.clone()))?
            .to_os_string();
        let target = available_target(dest_dir, Path::new(&file_name)).await?;

        match self.try_atomic(&src, &target).await {
            Ok(()) => {
                info!(source = %src.display(), target = %target.display(), "Moved (rename)");
                Ok(target)
            }
            Err(Error::CrossDevice(_)) => {
                debug!(
                    source = %src.display(),
                    tool = ?self.fallback,
                    "Cross-device move, using copy fallback"
                );
                self.fallback_copy(&src, &target, on_progress).await?;
                info!(source = %src.display(), target = %target.display(), "Moved (copy fallback)");
                Ok(target)
            }
            Err(e) => Err(e),
        }
    }

    /// Move many files sequentially. One file's failure is recorded and the
    /// batch continues; it never aborts the remaining paths.
    pub async fn relocate_batch(
        &self,
        sources: &[PathBuf],
        dest_dir: &Path,
        mut on_event: impl FnMut(RelocationEvent) + Send,
    ) -> BatchSummary {
        let mut summary = BatchSummary::default();

        for (index, source) in sources.iter().enumerate() {
            on_event(RelocationEvent::Started {
                index,
                source: source.clone(),
            });

            let result = {
                let mut forward =
                    |progress: CopyProgress| on_event(RelocationEvent::Progress { index, progress });
                self.relocate(source, dest_dir, &mut forward).await
            };

            match result {
                Ok(target) => {
                    summary.moved.push(target.clone());
                    on_event(RelocationEvent::Moved { index, target });
                }
                Err(e) => {
                    let message = format!("{}: {}", source.display(), e);
                    warn!(source = %source.display(), error = %e, "Relocation failed");
                    summary.errors.push(message.clone());
                    on_event(RelocationEvent::Failed {
                        index,
                        source: source.clone(),
                        message,
                    });
                }
            }
        }

        summary
    }

    /// Atomic rename; a cross-device error becomes the internal
    /// `CrossDevice` signal that triggers the fallback.
    async fn try_atomic(&self, src: &Path, target: &Path) -> Result<()> {
        fs::rename(src, target).await.map_err(|e| {
            if e.kind() == io::ErrorKind::CrossesDevices {
                Error::CrossDevice(src.to_path_buf())
            } else {
                Error::Io(e)
            }
        })
    }

    /// Copy across volumes with the selected tool, then make sure the
    /// source is gone exactly once the destination write is confirmed.
    async fn fallback_copy(
        &self,
        src: &Path,
        target: &Path,
        on_progress: &mut (dyn FnMut(CopyProgress) + Send),
    ) -> Result<()> {
        match self.fallback {
            FallbackTool::Rsync => self.rsync_copy(src, target, on_progress).await,
            FallbackTool::PlatformMove => platform_move(src, target).await,
            FallbackTool::Manual => {
                let bytes = fs::copy(src, target).await?;
                on_progress(CopyProgress {
                    bytes,
                    percent: 100,
                });
                // Source is deleted only after the destination write landed.
                fs::remove_file(src).await?;
                Ok(())
            }
        }
    }

    async fn rsync_copy(
        &self,
        src: &Path,
        target: &Path,
        on_progress: &mut (dyn FnMut(CopyProgress) + Send),
    ) -> Result<()> {
        let mut child = Command::new(&self.rsync_path)
            .arg("--progress")
            .arg("--remove-source-files")
            .arg(src)
            .arg(target)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| Error::external("rsync", e.to_string()))?;

        // stderr is drained on its own task while the progress loop runs,
        // so a chatty stderr can never fill its pipe and stall the child.
        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_string(&mut buf).await;
            }
            buf
        });

        // rsync terminates progress updates with \r and everything else
        // with \n; split on both and let the parser drop the rest.
        if let Some(stdout) = child.stdout.take() {
            let mut reader = BufReader::new(stdout);
            let mut chunk = Vec::new();
            loop {
                chunk.clear();
                let n = reader
                    .read_until(b'\r', &mut chunk)
                    .await
                    .map_err(|e| Error::external("rsync", e.to_string()))?;
                if n == 0 {
                    break;
                }
                for piece in String::from_utf8_lossy(&chunk).split(['\r', '\n']) {
                    if let Some((bytes, percent)) = progress::parse_line(piece) {
                        on_progress(CopyProgress { bytes, percent });
                    }
                }
            }
        }

        let stderr_buf = stderr_task.await.unwrap_or_default();

        let status = child
            .wait()
            .await
            .map_err(|e| Error::external("rsync", e.to_string()))?;
        if !status.success() {
            return Err(Error::external(
                "rsync",
                format!("exit {:?}: {}", status.code(), stderr_buf.trim()),
            ));
        }

        // --remove-source-files already deleted the source; trust it, but
        // confirm the destination actually exists.
        if !fs::try_exists(target).await? {
            return Err(Error::external(
                "rsync",
                format!("reported success but '{}' is missing", target.display()),
            ));
        }
        Ok(())
    }
}

/// Map a canonicalize failure: an absent path is `NotFound`, anything else
/// (permissions, non-directory components) keeps its io error.
fn resolve_error(e: io::Error, path: &Path) -> Error {
    if e.kind() == io::ErrorKind::NotFound {
        Error::NotFound(path.to_path_buf())
    } else {
        Error::Io(e)
    }
}

/// Plain `mv` invocation; no progress stream to parse
async fn platform_move(src: &Path, target: &Path) -> Result<()> {
    let output = Command::new("mv")
        .arg(src)
        .arg(target)
        .output()
        .await
        .map_err(|e| Error::external("mv", e.to_string()))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::external(
            "mv",
            format!("exit {:?}: {}", output.status.code(), stderr.trim()),
        ));
    }
    Ok(())
}

/// Probe the host once for the preferred fallback tool
async fn detect_fallback() -> FallbackTool {
    if tool_on_path("rsync").await {
        FallbackTool::Rsync
    } else if tool_on_path("mv").await {
        FallbackTool::PlatformMove
    } else {
        FallbackTool::Manual
    }
}

async fn tool_on_path(tool: &str) -> bool {
    Command::new(tool)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .is_ok()
}

/// Find a free destination name: the original name if unused, else
/// `"name (1).ext"`, `"name (2).ext"`, … with no upper bound.
async fn available_target(dest_dir: &Path, file_name: &Path) -> Result<PathBuf> {
    let candidate = dest_dir.join(file_name);
    if !fs::try_exists(&candidate).await? {
        return Ok(candidate);
    }

    let stem = file_name
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = file_name.extension().map(|e| e.to_string_lossy().to_string());

    let mut n: u64 = 1;
    loop {
        let name = match &ext {
            Some(ext) => format!("{stem} ({n}).{ext}"),
            None => format!("{stem} ({n})"),
        };
        let candidate = dest_dir.join(name);
        if !fs::try_exists(&candidate).await? {
            return Ok(candidate);
        }
        n += 1;
    }
}
