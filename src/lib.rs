//! Curator: media repository inventory, relocation, and ledger sync
//!
//! The crate is organized around four pieces:
//!
//! - [`services::ScannerService`] walks a managed directory and builds a
//!   [`media::MediaRecord`] per recognized media file, probing technical
//!   attributes with MediaInfo first and ffprobe as the gap-filler.
//! - [`services::Relocator`] moves files under a managed base directory,
//!   preferring an atomic rename and falling back to a copying tool when
//!   the destination is on another volume.
//! - [`jobs`] tracks long-running batches in an in-memory store polled by
//!   id, with a bounded worker pool driving them.
//! - [`ledger`] merges scanner output into an external spreadsheet while
//!   leaving human-added columns untouched.
//!
//! Everything is plumbing-agnostic: an HTTP or CLI front end constructs
//! [`config::Config`], wires the services together, and maps job ids to
//! whatever surface it exposes.

pub mod config;
pub mod error;
pub mod jobs;
pub mod ledger;
pub mod media;
pub mod services;

pub use config::Config;
pub use error::{Error, Result};
