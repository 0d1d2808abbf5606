//! # Media Module
//!
//! Frame extraction, batched re-encoding, lossless concatenation and the
//! final audio remux. Decoding and encoding are delegated to ffmpeg; images
//! are read and written with the `image` crate.

pub mod batcher;
pub mod concat;
pub mod extractor;
pub mod merge;
pub mod probe;
pub mod staging;
pub mod types;

pub use batcher::{BatchOutcome, FfmpegSegmentWriter, SegmentBatcher, SegmentWriter, RESTORED_DIR_NAME};
pub use concat::{ConcatManifest, SegmentConcatenator};
pub use extractor::{ExtractedFrames, FrameExtractor, RawFrameReader};
pub use merge::AudioVideoMerger;
pub use probe::{probe_video, VideoInfo};
pub use types::{FrameRecord, FrameSequence, SegmentRecord};

/// Whether an `ffmpeg` binary is on `PATH`, for tests that need a real one
#[cfg(test)]
pub(crate) fn ffmpeg_available() -> bool {
    use std::process::{Command, Stdio};

    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}
