use std::path::{Path, PathBuf};

use crate::config::{Config, LipSyncConfig, RestorationConfig};
use crate::process::CommandSpec;

/// Command builder for the lip-sync inference script.
///
/// Contract with the tool: it writes a video to `--outfile` or exits non-zero.
#[derive(Debug, Clone)]
pub struct LipSyncTool {
    interpreter: PathBuf,
    script: PathBuf,
    checkpoint: PathBuf,
    working_dir: Option<PathBuf>,
    settings: LipSyncConfig,
}

impl LipSyncTool {
    pub fn from_config(config: &Config) -> Self {
        let settings = config.lipsync.clone();
        Self {
            interpreter: config.resolve_program(&settings.interpreter),
            script: config.resolve(&settings.script),
            checkpoint: config.resolve(&settings.checkpoint),
            working_dir: working_dir(config),
            settings,
        }
    }

    pub fn command(&self, face: &Path, audio: &Path, outfile: &Path) -> CommandSpec {
        let spec = CommandSpec::new("lip-sync", &self.interpreter)
            .arg(&self.script)
            .arg("--checkpoint_path")
            .arg(&self.checkpoint)
            .arg("--face")
            .arg(face)
            .arg("--audio")
            .arg(audio)
            .arg("--outfile")
            .arg(outfile)
            .arg("--resize_factor")
            .arg(self.settings.resize_factor.to_string())
            .arg("--fps")
            .arg(format_rate(self.settings.fps))
            .arg("--face_det_batch_size")
            .arg(self.settings.face_det_batch_size.to_string())
            .arg("--wav2lip_batch_size")
            .arg(self.settings.model_batch_size.to_string())
            .args(&self.settings.extra_args)
            .timeout_secs(self.settings.timeout_secs);
        in_dir(spec, self.working_dir.as_deref())
    }
}

/// Command builder for the face-restoration inference script.
///
/// Contract with the tool: it creates a `restored_imgs` directory under the
/// output path and fills it, or exits non-zero.
#[derive(Debug, Clone)]
pub struct FaceRestorationTool {
    interpreter: PathBuf,
    script: PathBuf,
    working_dir: Option<PathBuf>,
    settings: RestorationConfig,
}

impl FaceRestorationTool {
    pub fn from_config(config: &Config) -> Self {
        let settings = config.restoration.clone();
        Self {
            interpreter: config.resolve_program(&settings.interpreter),
            script: config.resolve(&settings.script),
            working_dir: working_dir(config),
            settings,
        }
    }

    pub fn command(&self, input_dir: &Path, output_dir: &Path) -> CommandSpec {
        let mut spec = CommandSpec::new("face-restoration", &self.interpreter)
            .arg(&self.script)
            .arg("-i")
            .arg(input_dir)
            .arg("-o")
            .arg(output_dir)
            .arg("-v")
            .arg(&self.settings.model_version)
            .arg("-s")
            .arg(self.settings.upscale.to_string());

        if self.settings.only_center_face {
            spec = spec.arg("--only_center_face");
        }

        spec = spec
            .arg("--bg_upsampler")
            .arg(&self.settings.bg_upsampler)
            .args(&self.settings.extra_args)
            .timeout_secs(self.settings.timeout_secs);
        in_dir(spec, self.working_dir.as_deref())
    }
}

/// Tools write scratch files relative to their working directory: run them
/// from the root once it is absolute
fn working_dir(config: &Config) -> Option<PathBuf> {
    config
        .paths
        .root
        .is_absolute()
        .then(|| config.paths.root.clone())
}

fn in_dir(spec: CommandSpec, dir: Option<&Path>) -> CommandSpec {
    match dir {
        Some(dir) => spec.current_dir(dir),
        None => spec,
    }
}

/// Integral rates print without a fractional part (`60`, not `60.0`)
pub(crate) fn format_rate(fps: f64) -> String {
    if fps.fract() == 0.0 {
        format!("{}", fps as i64)
    } else {
        format!("{}", fps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_of(spec: &CommandSpec) -> Vec<String> {
        spec.args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    fn value_after(args: &[String], flag: &str) -> Option<String> {
        args.iter().position(|a| a == flag).and_then(|i| args.get(i + 1).cloned())
    }

    #[test]
    fn test_lipsync_command_defaults() {
        let mut config = Config::default();
        config.paths.root = PathBuf::from("/work");
        let tool = LipSyncTool::from_config(&config);

        let spec = tool.command(
            Path::new("/in/alice.mp4"),
            Path::new("/in/alice.wav"),
            Path::new("/out/alice/result.mp4"),
        );
        let args = args_of(&spec);

        assert_eq!(spec.program, PathBuf::from("python"));
        assert_eq!(args[0], "/work/Wav2Lip-master/inference.py");
        assert_eq!(value_after(&args, "--face").as_deref(), Some("/in/alice.mp4"));
        assert_eq!(value_after(&args, "--outfile").as_deref(), Some("/out/alice/result.mp4"));
        assert_eq!(value_after(&args, "--resize_factor").as_deref(), Some("2"));
        assert_eq!(value_after(&args, "--fps").as_deref(), Some("60"));
        assert_eq!(value_after(&args, "--face_det_batch_size").as_deref(), Some("8"));
        assert_eq!(value_after(&args, "--wav2lip_batch_size").as_deref(), Some("128"));
        assert!(spec.timeout.is_none());
        assert_eq!(spec.current_dir, Some(PathBuf::from("/work")));
    }

    #[test]
    fn test_restoration_command_flags() {
        let mut config = Config::default();
        config.restoration.only_center_face = false;
        config.restoration.timeout_secs = Some(600);
        let tool = FaceRestorationTool::from_config(&config);

        let spec = tool.command(Path::new("frames"), Path::new("restored_imgs"));
        let args = args_of(&spec);

        assert_eq!(value_after(&args, "-v").as_deref(), Some("1.4"));
        assert_eq!(value_after(&args, "-s").as_deref(), Some("2"));
        assert_eq!(value_after(&args, "--bg_upsampler").as_deref(), Some("None"));
        assert!(!args.contains(&"--only_center_face".to_string()));
        assert_eq!(spec.timeout.map(|t| t.as_secs()), Some(600));
        // Relative root: inherit the caller's directory
        assert!(spec.current_dir.is_none());
    }

    #[test]
    fn test_format_rate() {
        assert_eq!(format_rate(60.0), "60");
        assert_eq!(format_rate(29.97), "29.97");
    }
}
