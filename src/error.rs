//! Error taxonomy shared across the crate
//!
//! Per-file conditions (probe failures, individual move failures) are
//! recovered locally and aggregated onto job snapshots; only the variants
//! here surface to callers.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// A path or directory that must exist does not
    #[error("not found: {0}")]
    NotFound(PathBuf),

    /// A relocation source escapes the configured managed root.
    /// Raised before any filesystem mutation.
    #[error("path '{path}' is outside the managed base directory '{base}'")]
    OutOfBounds { path: PathBuf, base: PathBuf },

    /// Source and destination live on different volumes. Internal signal
    /// that triggers the copy fallback; never surfaced as a failure.
    #[error("cross-device transfer from '{0}'")]
    CrossDevice(PathBuf),

    /// An external tool (probe, copy tool, ffmpeg) exited non-zero or
    /// produced unusable output. Recorded per file, non-fatal to a batch.
    #[error("{tool} failed: {message}")]
    ExternalTool { tool: &'static str, message: String },

    /// The ledger store rejected access. Aborts the whole sync attempt.
    #[error("ledger store access failed: {0}")]
    StoreAccess(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn external(tool: &'static str, message: impl Into<String>) -> Self {
        Self::ExternalTool {
            tool,
            message: message.into(),
        }
    }
}
