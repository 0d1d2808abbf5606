use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use image::imageops::FilterType;
use image::RgbImage;
use rayon::prelude::*;
use tokio::task;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{MediaError, ProcessError, Result};
use crate::media::staging;
use crate::media::types::{padded_width, segment_file_name, FrameRecord, FrameSequence, SegmentRecord};
use crate::process::tools::format_rate;

/// Name of the directory the restoration tool writes its output into
pub const RESTORED_DIR_NAME: &str = "restored_imgs";

/// Encodes an ordered run of frames into one video file
pub trait SegmentWriter: Send + Sync {
    /// All frames share the dimensions of the first one
    fn write_segment(&self, output: &Path, fps: f64, frames: &[RgbImage]) -> Result<()>;
}

/// [`SegmentWriter`] that pipes raw RGB frames into ffmpeg
#[derive(Debug, Clone)]
pub struct FfmpegSegmentWriter {
    ffmpeg: PathBuf,
    codec: String,
    codec_tag: Option<String>,
}

impl FfmpegSegmentWriter {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ffmpeg: config.resolve_program(&config.encoding.ffmpeg),
            codec: config.encoding.codec.clone(),
            codec_tag: config.encoding.codec_tag.clone(),
        }
    }
}

impl SegmentWriter for FfmpegSegmentWriter {
    fn write_segment(&self, output: &Path, fps: f64, frames: &[RgbImage]) -> Result<()> {
        let first = frames.first().ok_or_else(|| MediaError::EncodingFailed {
            reason: "segment has no frames".to_string(),
        })?;
        let (width, height) = first.dimensions();

        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-y", "-v", "error", "-f", "rawvideo", "-pix_fmt", "rgb24"])
            .arg("-s")
            .arg(format!("{}x{}", width, height))
            .arg("-r")
            .arg(format_rate(fps))
            .args(["-i", "-", "-c:v", self.codec.as_str()]);
        if let Some(tag) = &self.codec_tag {
            cmd.args(["-vtag", tag.as_str()]);
        }
        // yuv420p needs even dimensions
        cmd.args(["-vf", "pad=ceil(iw/2)*2:ceil(ih/2)*2", "-pix_fmt", "yuv420p"])
            .arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| ProcessError::SpawnFailed {
            program: self.ffmpeg.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut write_error = None;
        if let Some(mut stdin) = child.stdin.take() {
            for frame in frames {
                if let Err(e) = stdin.write_all(frame.as_raw()) {
                    write_error = Some(e);
                    break;
                }
            }
        }

        let result = child.wait_with_output().map_err(|e| ProcessError::WaitFailed {
            program: self.ffmpeg.display().to_string(),
            reason: e.to_string(),
        })?;

        if !result.status.success() {
            return Err(MediaError::EncodingFailed {
                reason: format!(
                    "ffmpeg exited with {}: {}",
                    result.status,
                    String::from_utf8_lossy(&result.stderr).trim()
                ),
            }
            .into());
        }
        if let Some(e) = write_error {
            return Err(MediaError::EncodingFailed {
                reason: format!("could not feed frames to ffmpeg: {}", e),
            }
            .into());
        }

        Ok(())
    }
}

/// What the batching stage produced
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    /// Where the restored frames were found, `None` if they never appeared
    pub restored_dir: Option<PathBuf>,
    pub segments: Vec<SegmentRecord>,
    /// Frames that could not be decoded and were left out
    pub skipped_frames: usize,
    /// Frames of the source sequence with no restored counterpart
    pub missing_frames: usize,
}

/// Groups restored frames into fixed-size batches and encodes each batch
/// as a `batch_NNNN.mp4` segment.
pub struct SegmentBatcher {
    writer: Arc<dyn SegmentWriter>,
    batch_size: usize,
    min_digits: usize,
}

impl SegmentBatcher {
    pub fn new(writer: Arc<dyn SegmentWriter>, batch_size: usize, min_digits: usize) -> Self {
        Self {
            writer,
            batch_size: batch_size.max(1),
            min_digits,
        }
    }

    pub fn from_config(config: &Config, writer: Arc<dyn SegmentWriter>) -> Self {
        Self::new(writer, config.encoding.batch_size, config.encoding.frame_digits)
    }

    /// Encode the frames under `frames_root/restored_imgs` into `out_dir`.
    ///
    /// With a `source` sequence, restored files are matched to it by name
    /// and keep its ordering. Without one the directory is read in lexical
    /// order. A missing `restored_imgs` directory yields zero segments.
    pub async fn encode(
        &self,
        frames_root: &Path,
        out_dir: &Path,
        fps: f64,
        source: Option<&FrameSequence>,
    ) -> Result<BatchOutcome> {
        let restored_dir = match locate_child_dir(frames_root, RESTORED_DIR_NAME)? {
            Some(dir) => dir,
            None => {
                warn!("{} folder not found in {:?}", RESTORED_DIR_NAME, frames_root);
                return Ok(BatchOutcome::default());
            }
        };

        let (sequence, missing_frames) = match source {
            Some(source) => source.rebase(&restored_dir)?,
            None => (FrameSequence::scan(&restored_dir)?, 0),
        };
        if missing_frames > 0 {
            warn!("{} extracted frames have no restored counterpart", missing_frames);
        }

        let total_batches = sequence.len().div_ceil(self.batch_size);
        let width = padded_width(self.min_digits, total_batches);
        info!(
            "Encoding {} frames into {} segment(s) of up to {} frames",
            sequence.len(),
            total_batches,
            self.batch_size
        );

        let mut outcome = BatchOutcome {
            restored_dir: Some(restored_dir),
            missing_frames,
            ..BatchOutcome::default()
        };

        for (chunk_number, chunk) in sequence.frames().chunks(self.batch_size).enumerate() {
            let start = chunk_number * self.batch_size;
            debug!("Processing {} {}", start, start + chunk.len());

            let index = outcome.segments.len();
            let target = out_dir.join(segment_file_name(index, width));
            let records = chunk.to_vec();
            let writer = Arc::clone(&self.writer);
            let staged_target = target.clone();

            let (written, skipped) = task::spawn_blocking(move || -> Result<(usize, usize)> {
                let (frames, skipped) = decode_chunk(&records);
                if frames.is_empty() {
                    return Ok((0, skipped));
                }
                let frames = match_dimensions(frames);

                let staging_path = staging::staging_path(&staged_target);
                if let Err(e) = writer.write_segment(&staging_path, fps, &frames) {
                    staging::discard(&staging_path);
                    return Err(e);
                }
                staging::commit(&staging_path, &staged_target)?;
                Ok((frames.len(), skipped))
            })
            .await
            .map_err(|e| MediaError::EncodingFailed {
                reason: format!("segment task failed: {}", e),
            })??;

            outcome.skipped_frames += skipped;
            if written == 0 {
                warn!("Batch starting at frame {} has no decodable frames, no segment written", start);
                continue;
            }

            outcome.segments.push(SegmentRecord {
                index,
                path: target,
                frame_count: written,
            });
        }

        if outcome.skipped_frames > 0 {
            warn!("Skipped {} undecodable frame(s)", outcome.skipped_frames);
        }
        info!("Wrote {} segment(s)", outcome.segments.len());
        Ok(outcome)
    }
}

/// First immediate child directory of `parent` named exactly `name`
pub fn locate_child_dir(parent: &Path, name: &str) -> Result<Option<PathBuf>> {
    if !parent.is_dir() {
        return Ok(None);
    }

    let mut children: Vec<PathBuf> = std::fs::read_dir(parent)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    children.sort();

    Ok(children
        .into_iter()
        .find(|path| path.is_dir() && path.file_name().map(|n| n == name).unwrap_or(false)))
}

/// Decode a batch in parallel, keeping frame order and dropping failures
fn decode_chunk(records: &[FrameRecord]) -> (Vec<RgbImage>, usize) {
    let decoded: Vec<Option<RgbImage>> = records
        .par_iter()
        .map(|record| match image::open(&record.path) {
            Ok(image) => Some(image.to_rgb8()),
            Err(e) => {
                warn!("Invalid frame: {:?} ({})", record.path, e);
                None
            }
        })
        .collect();

    let skipped = decoded.iter().filter(|f| f.is_none()).count();
    (decoded.into_iter().flatten().collect(), skipped)
}

/// Resize every frame to the size of the first one
fn match_dimensions(frames: Vec<RgbImage>) -> Vec<RgbImage> {
    let Some((width, height)) = frames.first().map(|f| f.dimensions()) else {
        return frames;
    };

    frames
        .into_iter()
        .map(|frame| {
            if frame.dimensions() == (width, height) {
                frame
            } else {
                debug!("Resizing {:?} frame to {}x{}", frame.dimensions(), width, height);
                image::imageops::resize(&frame, width, height, FilterType::Lanczos3)
            }
        })
        .collect()
}
