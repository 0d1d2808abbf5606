use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the dubbing pipeline
#[derive(Error, Debug)]
pub enum DubbingError {
    #[error("External process error: {0}")]
    Process(#[from] ProcessError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Generic error: {0}")]
    Generic(String),
}

/// Errors raised while launching or supervising a child process.
///
/// A child that runs and exits non-zero is *not* an error; that is reported
/// through [`ProcessOutcome`](crate::process::ProcessOutcome).
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to spawn {program}: {reason}")]
    SpawnFailed { program: String, reason: String },

    #[error("{program} timed out after {secs}s")]
    TimedOut { program: String, secs: u64 },

    #[error("Lost contact with {program}: {reason}")]
    WaitFailed { program: String, reason: String },
}

/// Frame, probe and encoding errors
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Probe failed for {path}: {reason}")]
    ProbeFailed { path: PathBuf, reason: String },

    #[error("Frame decoding failed: {reason}")]
    DecodingFailed { reason: String },

    #[error("Segment encoding failed: {reason}")]
    EncodingFailed { reason: String },

    #[error("Unreadable audio file: {path}")]
    AudioUnreadable { path: PathBuf },
}

/// Pipeline sequencing errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Input directory not found: {path}")]
    InputDirMissing { path: PathBuf },

    #[error("No segments to concatenate for '{title}'")]
    NoSegments { title: String },

    #[error("Stage {stage} failed: {reason}")]
    StageFailed { stage: String, reason: String },

    #[error("Worker task for '{title}' aborted: {reason}")]
    TaskAborted { title: String, reason: String },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}: {reason}")]
    ParseFailed { path: String, reason: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using DubbingError
pub type Result<T> = std::result::Result<T, DubbingError>;

impl DubbingError {
    /// Create a generic error with a custom message
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into())
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Process(ProcessError::SpawnFailed { program, .. }) => {
                format!("Could not start '{}'. Check that it is installed and the configured path is correct.", program)
            }
            Self::Pipeline(PipelineError::InputDirMissing { path }) => {
                format!("Input directory '{}' does not exist.", path.display())
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_errors_convert() {
        let err: DubbingError = MediaError::DecodingFailed { reason: "eof".to_string() }.into();
        assert!(matches!(err, DubbingError::Media(_)));
        assert!(err.to_string().contains("eof"));
    }

    #[test]
    fn test_user_message_for_missing_tool() {
        let err: DubbingError = ProcessError::SpawnFailed {
            program: "ffmpeg".to_string(),
            reason: "No such file".to_string(),
        }
        .into();
        assert!(err.user_message().contains("'ffmpeg'"));
    }
}
