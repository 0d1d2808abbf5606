use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::media::staging;
use crate::process::{CommandSpec, ProcessOutcome, ProcessRunner};

/// Remuxes a new audio track onto a video stream
#[derive(Debug, Clone)]
pub struct AudioVideoMerger {
    ffmpeg: PathBuf,
    runner: ProcessRunner,
}

impl AudioVideoMerger {
    pub fn new(ffmpeg: PathBuf, runner: ProcessRunner) -> Self {
        Self { ffmpeg, runner }
    }

    pub fn from_config(config: &Config, runner: ProcessRunner) -> Self {
        Self::new(config.resolve_program(&config.encoding.ffmpeg), runner)
    }

    /// Video from the first input is copied untouched, audio comes from the
    /// second, and the result stops at the shorter of the two.
    pub fn command(&self, video: &Path, audio: &Path, output: &Path) -> CommandSpec {
        CommandSpec::new("ffmpeg merge", &self.ffmpeg)
            .args(["-y", "-i"])
            .arg(video)
            .arg("-i")
            .arg(audio)
            .args(["-map", "0:v", "-map", "1:a", "-c:v", "copy", "-shortest"])
            .arg(output)
    }

    pub async fn merge(&self, video: &Path, audio: &Path, output: &Path) -> Result<ProcessOutcome> {
        info!("Merging {:?} with {:?}", video, audio);

        let staging_path = staging::staging_path(output);
        let outcome = self.runner.run(&self.command(video, audio, &staging_path)).await?;
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

    #[test]
    fn test_merge_command_maps_streams() {
        let merger = AudioVideoMerger::from_config(&Config::default(), ProcessRunner::default());
        let spec = merger.command(
            Path::new("concated_output.mp4"),
            Path::new("alice.wav"),
            Path::new("final_with_audio.mp4"),
        );
        assert_eq!(
            spec.command_line(),
            "ffmpeg -y -i concated_output.mp4 -i alice.wav -map 0:v -map 1:a -c:v copy -shortest final_with_audio.mp4"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_merge_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("final_with_audio.mp4");
        // `false` ignores its arguments and exits 1
        let merger = AudioVideoMerger::new(PathBuf::from("false"), ProcessRunner::default());

        let outcome = merger
            .merge(Path::new("missing.mp4"), Path::new("missing.wav"), &output)
            .await
            .unwrap();
        assert!(!outcome.success);
        assert!(!output.exists());
    }
}
