use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::Config;
use crate::error::{MediaError, Result};
use crate::media::staging;
use crate::media::types::{padded_width, segment_file_name, SegmentRecord};
use crate::process::{CommandSpec, ProcessOutcome, ProcessRunner};

/// ffmpeg concat-demuxer manifest: one `file <name>` line per segment, in
/// playback order. Names are relative to the manifest's directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConcatManifest {
    entries: Vec<String>,
}

impl ConcatManifest {
    pub fn from_segments(segments: &[SegmentRecord]) -> Self {
        let mut ordered: Vec<&SegmentRecord> = segments.iter().collect();
        ordered.sort_by_key(|s| s.index);
        Self {
            entries: ordered.into_iter().map(SegmentRecord::file_name).collect(),
        }
    }

    /// Manifest for `count` segments named by the batcher's convention
    pub fn numbered(count: usize, min_digits: usize) -> Self {
        let width = padded_width(min_digits, count);
        Self {
            entries: (0..count).map(|i| segment_file_name(i, width)).collect(),
        }
    }

    pub fn render(&self) -> String {
        self.entries.iter().map(|name| format!("file {}\n", name)).collect()
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.render())?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Joins segments losslessly with ffmpeg's concat demuxer
#[derive(Debug, Clone)]
pub struct SegmentConcatenator {
    ffmpeg: PathBuf,
    runner: ProcessRunner,
}

impl SegmentConcatenator {
    pub fn new(ffmpeg: PathBuf, runner: ProcessRunner) -> Self {
        Self { ffmpeg, runner }
    }

    pub fn from_config(config: &Config, runner: ProcessRunner) -> Self {
        Self::new(config.resolve_program(&config.encoding.ffmpeg), runner)
    }

    pub fn command(&self, manifest_path: &Path, output: &Path) -> CommandSpec {
        CommandSpec::new("ffmpeg concat", &self.ffmpeg)
            .args(["-y", "-f", "concat", "-i"])
            .arg(manifest_path)
            .args(["-c", "copy"])
            .arg(output)
    }

    /// Write the manifest and stream-copy the listed segments into `output`.
    ///
    /// Segment files are not checked; ffmpeg reports missing ones.
    pub async fn concatenate(
        &self,
        manifest: &ConcatManifest,
        manifest_path: &Path,
        output: &Path,
    ) -> Result<ProcessOutcome> {
        if manifest.is_empty() {
            return Err(MediaError::EncodingFailed {
                reason: "concat manifest lists no segments".to_string(),
            }
            .into());
        }

        manifest.write_to(manifest_path)?;
        info!("Concatenating {} segment(s) into {:?}", manifest.len(), output);

        let staging_path = staging::staging_path(output);
        let outcome = self.runner.run(&self.command(manifest_path, &staging_path)).await?;
        if outcome.success {
            staging::commit(&staging_path, output)?;
        } else {
            staging::discard(&staging_path);
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_numbered_manifest_lists_every_segment_in_order() {
        let manifest = ConcatManifest::numbered(3, 4);
        assert_eq!(
            manifest.render(),
            "file batch_0000.mp4\nfile batch_0001.mp4\nfile batch_0002.mp4\n"
        );
    }

    #[test]
    fn test_manifest_from_segments_sorts_by_index() {
        let segments = vec![
            SegmentRecord { index: 1, path: PathBuf::from("/o/batch_0001.mp4"), frame_count: 5 },
            SegmentRecord { index: 0, path: PathBuf::from("/o/batch_0000.mp4"), frame_count: 600 },
        ];
        let manifest = ConcatManifest::from_segments(&segments);
        let lines: Vec<_> = manifest.render().lines().map(str::to_string).collect();
        assert_eq!(lines, vec!["file batch_0000.mp4", "file batch_0001.mp4"]);
        assert_eq!(manifest, ConcatManifest::numbered(2, 4));
    }

    #[test]
    fn test_command_uses_stream_copy() {
        let concatenator = SegmentConcatenator::from_config(&Config::default(), ProcessRunner::default());
        let spec = concatenator.command(Path::new("concat.txt"), Path::new("out.mp4"));
        assert_eq!(spec.command_line(), "ffmpeg -y -f concat -i concat.txt -c copy out.mp4");
    }

    #[tokio::test]
    async fn test_empty_manifest_is_refused() {
        let dir = tempdir().unwrap();
        let manifest_path = dir.path().join("concat.txt");
        let concatenator = SegmentConcatenator::from_config(&Config::default(), ProcessRunner::default());

        let result = concatenator
            .concatenate(&ConcatManifest::default(), &manifest_path, &dir.path().join("out.mp4"))
            .await;
        assert!(result.is_err());
        assert!(!manifest_path.exists());
    }
}
