use std::fs::File;
use std::io::{self, BufWriter, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, RgbImage};
use tokio::task;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{MediaError, ProcessError, Result};
use crate::media::probe::{probe_video, VideoInfo};
use crate::media::types::{frame_file_name, padded_width, FrameSequence};

/// Result of splitting a video into numbered images
#[derive(Debug, Clone)]
pub struct ExtractedFrames {
    /// Source frame rate, reused when re-encoding
    pub fps: f64,
    /// Frame count the container advertised
    pub expected_frames: u64,
    pub sequence: FrameSequence,
}

/// Iterator over packed RGB24 frames read from a byte stream.
///
/// Lazy, finite and single pass: each `next` reads exactly one frame.
pub struct RawFrameReader<R> {
    reader: R,
    width: u32,
    height: u32,
    done: bool,
}

impl<R: Read> RawFrameReader<R> {
    pub fn new(reader: R, width: u32, height: u32) -> Self {
        Self {
            reader,
            width,
            height,
            done: false,
        }
    }

    fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

impl<R: Read> Iterator for RawFrameReader<R> {
    type Item = io::Result<RgbImage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut buf = vec![0u8; self.frame_len()];
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }

        if filled == 0 {
            self.done = true;
            return None;
        }
        if filled < buf.len() {
            self.done = true;
            return Some(Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("truncated frame: {} of {} bytes", filled, buf.len()),
            )));
        }

        // Buffer length matches the dimensions, so this cannot fail
        RgbImage::from_raw(self.width, self.height, buf).map(Ok)
    }
}

/// Write up to `expected` frames as `NNNN.jpg` into `out_dir`.
///
/// Stops at the first frame the decoder could not deliver, so a short
/// stream never produces corrupt images.
pub fn write_frames<I>(
    frames: I,
    expected: usize,
    out_dir: &Path,
    min_digits: usize,
    jpeg_quality: u8,
) -> Result<FrameSequence>
where
    I: Iterator<Item = io::Result<RgbImage>>,
{
    let width = padded_width(min_digits, expected);
    let mut sequence = FrameSequence::new();

    for (index, frame) in frames.take(expected).enumerate() {
        let image = match frame {
            Ok(image) => image,
            Err(e) => {
                warn!("Decoder stopped at frame {}: {}", index, e);
                break;
            }
        };

        let path = out_dir.join(frame_file_name(index, width, "jpg"));
        let mut writer = BufWriter::new(File::create(&path)?);
        JpegEncoder::new_with_quality(&mut writer, jpeg_quality).encode(
            image.as_raw(),
            image.width(),
            image.height(),
            ColorType::Rgb8,
        )?;
        sequence.push(path);

        if index % 500 == 0 {
            debug!("Wrote frame {}/{}", index, expected);
        }
    }

    if sequence.len() < expected {
        warn!("Extracted {} of {} advertised frames", sequence.len(), expected);
    }
    Ok(sequence)
}

/// Splits a video into numbered JPEG frames using ffmpeg for decoding
#[derive(Debug, Clone)]
pub struct FrameExtractor {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    min_digits: usize,
    jpeg_quality: u8,
}

impl FrameExtractor {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ffmpeg: config.resolve_program(&config.encoding.ffmpeg),
            ffprobe: config.resolve_program(&config.encoding.ffprobe),
            min_digits: config.encoding.frame_digits,
            jpeg_quality: config.encoding.jpeg_quality,
        }
    }

    /// Extract every frame of `video` into the existing directory `out_dir`
    pub async fn extract(&self, video: &Path, out_dir: &Path) -> Result<ExtractedFrames> {
        let info = probe_video(&self.ffprobe, video).await?;
        info!("FPS: {:.3}, Frames: {}", info.fps, info.frame_count);

        if info.width == 0 || info.height == 0 {
            return Err(MediaError::ProbeFailed {
                path: video.to_path_buf(),
                reason: "video stream has no dimensions".to_string(),
            }
            .into());
        }

        let extractor = self.clone();
        let video = video.to_path_buf();
        let out_dir = out_dir.to_path_buf();
        let probed = info.clone();
        let sequence = task::spawn_blocking(move || extractor.decode_into(&video, &out_dir, &probed))
            .await
            .map_err(|e| MediaError::DecodingFailed {
                reason: format!("extraction task failed: {}", e),
            })??;

        info!("Extracted {} frames", sequence.len());
        Ok(ExtractedFrames {
            fps: info.fps,
            expected_frames: info.frame_count,
            sequence,
        })
    }

    fn decode_into(&self, video: &Path, out_dir: &Path, info: &VideoInfo) -> Result<FrameSequence> {
        let mut child = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-i"])
            .arg(video)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| ProcessError::SpawnFailed {
                program: self.ffmpeg.display().to_string(),
                reason: e.to_string(),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| MediaError::DecodingFailed {
            reason: "ffmpeg stdout unavailable".to_string(),
        })?;

        let frames = RawFrameReader::new(stdout, info.width, info.height);
        let written = write_frames(
            frames,
            info.frame_count as usize,
            out_dir,
            self.min_digits,
            self.jpeg_quality,
        );

        // We may stop reading before ffmpeg is done writing
        let _ = child.kill();
        let _ = child.wait();

        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::ffmpeg_available;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn raw_frames(count: usize, width: u32, height: u32) -> Vec<u8> {
        (0..count)
            .flat_map(|i| vec![(i * 40) as u8; (width * height * 3) as usize])
            .collect()
    }

    #[test]
    fn test_reader_yields_each_frame_once() {
        let bytes = raw_frames(3, 4, 2);
        let frames: Vec<_> = RawFrameReader::new(Cursor::new(bytes), 4, 2).collect();

        assert_eq!(frames.len(), 3);
        let last = frames[2].as_ref().unwrap();
        assert_eq!(last.dimensions(), (4, 2));
        assert_eq!(last.get_pixel(0, 0).0, [80, 80, 80]);
    }

    #[test]
    fn test_reader_reports_truncated_frame() {
        let mut bytes = raw_frames(2, 4, 2);
        bytes.truncate(bytes.len() - 5);
        let frames: Vec<_> = RawFrameReader::new(Cursor::new(bytes), 4, 2).collect();

        assert_eq!(frames.len(), 2);
        assert!(frames[0].is_ok());
        assert!(frames[1].is_err());
    }

    #[test]
    fn test_write_frames_numbers_from_zero() {
        let dir = tempdir().unwrap();
        let bytes = raw_frames(5, 8, 8);
        let reader = RawFrameReader::new(Cursor::new(bytes), 8, 8);

        let sequence = write_frames(reader, 5, dir.path(), 4, 90).unwrap();

        assert_eq!(sequence.len(), 5);
        for i in 0..5 {
            assert!(dir.path().join(format!("000{}.jpg", i)).is_file());
        }
        assert!(image::open(dir.path().join("0004.jpg")).is_ok());
    }

    #[test]
    fn test_write_frames_stops_when_stream_runs_short() {
        let dir = tempdir().unwrap();
        let bytes = raw_frames(3, 8, 8);
        let reader = RawFrameReader::new(Cursor::new(bytes), 8, 8);

        let sequence = write_frames(reader, 10, dir.path(), 4, 90).unwrap();
        assert_eq!(sequence.len(), 3);
        assert!(!dir.path().join("0003.jpg").exists());
    }

    #[tokio::test]
    async fn test_extract_real_video() {
        if !ffmpeg_available() {
            eprintln!("ffmpeg not installed, skipping");
            return;
        }
        let dir = tempdir().unwrap();
        let video = dir.path().join("clip.mp4");
        let status = std::process::Command::new("ffmpeg")
            .args(["-y", "-v", "error", "-f", "lavfi", "-i", "testsrc=size=64x48:rate=10"])
            .args(["-frames:v", "12", "-pix_fmt", "yuv420p"])
            .arg(&video)
            .status()
            .unwrap();
        assert!(status.success());

        let frames_dir = dir.path().join("frames");
        std::fs::create_dir(&frames_dir).unwrap();
        let extractor = FrameExtractor::from_config(&Config::default());
        let extracted = extractor.extract(&video, &frames_dir).await.unwrap();

        assert_eq!(extracted.fps, 10.0);
        assert_eq!(extracted.sequence.len(), 12);
        assert!(frames_dir.join("0011.jpg").is_file());
    }
}
