//! Core services: probes, scanning, relocation, transcoding

pub mod ffprobe;
pub mod mediainfo;
pub mod relocator;
pub mod scanner;
pub mod transcoder;

pub use ffprobe::FfprobeService;
pub use mediainfo::MediaInfoService;
pub use relocator::{
    BatchSummary, CopyProgress, FallbackTool, RelocationEvent, Relocator,
};
pub use scanner::ScannerService;
pub use transcoder::Transcoder;
