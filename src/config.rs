use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Main configuration for the dubbing pipeline
///
/// Defaults are the tuned production values; an empty TOML file behaves
/// like no file at all.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Input/output directory layout
    pub paths: PathsConfig,

    /// Lip-sync inference tool invocation
    pub lipsync: LipSyncConfig,

    /// Face-restoration inference tool invocation
    pub restoration: RestorationConfig,

    /// Frame extraction, segment encoding and muxing
    pub encoding: EncodingConfig,

    /// Scheduling and failure handling
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| {
            ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string(),
            }
            .into()
        })
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.lipsync.validate()?;
        self.restoration.validate()?;
        self.encoding.validate()?;
        Ok(())
    }

    /// Resolve a configured path against the working root
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.paths.root.join(path)
        }
    }

    /// Resolve an executable or script path.
    ///
    /// Bare program names such as `ffmpeg` or `python3.10` are left for
    /// `PATH` lookup. Anything with a directory part resolves like a path.
    pub fn resolve_program(&self, path: &Path) -> PathBuf {
        if path.components().count() == 1 && !path.is_absolute() {
            path.to_path_buf()
        } else {
            self.resolve(path)
        }
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.resolve(&self.paths.audio_dir)
    }

    pub fn video_dir(&self) -> PathBuf {
        self.resolve(&self.paths.video_dir)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.resolve(&self.paths.output_dir)
    }
}

/// Directory layout, relative to `root`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Base directory everything else hangs off
    pub root: PathBuf,

    /// Directory scanned for audio inputs, one pipeline item per file
    pub audio_dir: PathBuf,

    /// Directory holding `<title>.<video_extension>` source videos
    pub video_dir: PathBuf,

    /// Directory receiving one `<title>/` subdirectory per item
    pub output_dir: PathBuf,

    /// Extension of the paired source video
    pub video_extension: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            audio_dir: PathBuf::from("inputs/source_audio"),
            video_dir: PathBuf::from("inputs/source_video"),
            output_dir: PathBuf::from("outputs"),
            video_extension: "mp4".to_string(),
        }
    }
}

/// Lip-sync inference tool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LipSyncConfig {
    /// Interpreter used to run the inference script
    pub interpreter: PathBuf,

    /// Inference entry point
    pub script: PathBuf,

    /// Model checkpoint
    pub checkpoint: PathBuf,

    /// Input downscale factor
    pub resize_factor: u32,

    /// Output frame rate requested from the tool
    pub fps: f64,

    /// Face detector batch size
    pub face_det_batch_size: u32,

    /// Generator batch size
    pub model_batch_size: u32,

    /// Extra arguments appended verbatim
    pub extra_args: Vec<String>,

    /// Kill the tool after this many seconds
    pub timeout_secs: Option<u64>,
}

impl Default for LipSyncConfig {
    fn default() -> Self {
        Self {
            interpreter: PathBuf::from("python"),
            script: PathBuf::from("Wav2Lip-master/inference.py"),
            checkpoint: PathBuf::from("Wav2Lip-master/checkpoints/wav2lip.pth"),
            resize_factor: 2,
            fps: 60.0,
            face_det_batch_size: 8,
            model_batch_size: 128,
            extra_args: Vec::new(),
            timeout_secs: None,
        }
    }
}

impl LipSyncConfig {
    fn validate(&self) -> Result<()> {
        if self.resize_factor == 0 {
            return Err(ConfigError::InvalidValue {
                key: "lipsync.resize_factor".to_string(),
                value: self.resize_factor.to_string(),
            }
            .into());
        }

        if !(self.fps.is_finite() && self.fps > 0.0) {
            return Err(ConfigError::InvalidValue {
                key: "lipsync.fps".to_string(),
                value: self.fps.to_string(),
            }
            .into());
        }

        if self.face_det_batch_size == 0 || self.model_batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "lipsync.batch_size".to_string(),
                value: format!("{}/{}", self.face_det_batch_size, self.model_batch_size),
            }
            .into());
        }

        Ok(())
    }
}

/// Face-restoration inference tool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestorationConfig {
    pub interpreter: PathBuf,

    pub script: PathBuf,

    /// Model version passed as `-v`
    pub model_version: String,

    /// Upscale factor passed as `-s`
    pub upscale: u32,

    /// Only restore the most central face
    pub only_center_face: bool,

    /// Background upsampler name, `None` disables it
    pub bg_upsampler: String,

    pub extra_args: Vec<String>,

    pub timeout_secs: Option<u64>,
}

impl Default for RestorationConfig {
    fn default() -> Self {
        Self {
            interpreter: PathBuf::from("python"),
            script: PathBuf::from("GFPGAN-master/inference_gfpgan.py"),
            model_version: "1.4".to_string(),
            upscale: 2,
            only_center_face: true,
            bg_upsampler: "None".to_string(),
            extra_args: Vec::new(),
            timeout_secs: None,
        }
    }
}

impl RestorationConfig {
    fn validate(&self) -> Result<()> {
        if self.upscale == 0 {
            return Err(ConfigError::InvalidValue {
                key: "restoration.upscale".to_string(),
                value: self.upscale.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Frame and container settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingConfig {
    pub ffmpeg: PathBuf,

    pub ffprobe: PathBuf,

    /// Frames per encoded segment
    pub batch_size: usize,

    /// Encoder for segments
    pub codec: String,

    /// FourCC tag written on segments, e.g. `DIVX` for an `avi` container.
    /// ffmpeg's mp4 muxer rejects foreign tags, so none by default.
    pub codec_tag: Option<String>,

    /// Minimum zero-padding width for frame and segment names
    pub frame_digits: usize,

    /// JPEG quality for extracted frames (1-100)
    pub jpeg_quality: u8,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            batch_size: 600,
            codec: "mpeg4".to_string(),
            codec_tag: None,
            frame_digits: 4,
            jpeg_quality: 95,
        }
    }
}

impl EncodingConfig {
    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "encoding.batch_size".to_string(),
                value: self.batch_size.to_string(),
            }
            .into());
        }

        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::InvalidValue {
                key: "encoding.jpeg_quality".to_string(),
                value: self.jpeg_quality.to_string(),
            }
            .into());
        }

        if self.frame_digits == 0 {
            return Err(ConfigError::InvalidValue {
                key: "encoding.frame_digits".to_string(),
                value: self.frame_digits.to_string(),
            }
            .into());
        }

        Ok(())
    }
}

/// What the orchestrator does after a stage fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Log and run the remaining stages anyway
    Continue,
    /// Skip every remaining stage of the item
    Halt,
}

/// Scheduling and failure handling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Items allowed to run at once; 0 means no limit
    pub max_concurrent_items: usize,

    pub on_stage_failure: FailurePolicy,

    /// Clear frame, restored and segment outputs left by a previous run
    pub clean_stale_outputs: bool,

    /// Lines of child stderr kept for failure reports
    pub stderr_tail_lines: usize,

    /// Write `report.json` into each item's output directory
    pub write_reports: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            // ML inference is memory hungry, stay conservative
            max_concurrent_items: (num_cpus::get() / 4).max(1),
            on_stage_failure: FailurePolicy::Continue,
            clean_stale_outputs: true,
            stderr_tail_lines: 20,
            write_reports: true,
        }
    }
}
