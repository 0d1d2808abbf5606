//! # Lipsync-Dubber
//!
//! Dub videos onto new audio tracks: lip-sync every face to the new speech,
//! restore the regenerated faces and remux the result with the new audio.
//!
//! The heavy lifting is done by two external inference tools (lip-sync and
//! face restoration) and ffmpeg. This library sequences them, moves frames
//! between them and keeps every item's outputs isolated.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lipsync_dubber::{config::Config, discover_items, FanOutDriver};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let config = Arc::new(Config::default());
//! let items = discover_items(&config)?;
//!
//! let summary = FanOutDriver::from_config(config).run(items).await?;
//! summary.log();
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//!
//! - [`process`] - Supervised external processes and tool command lines
//! - [`media`] - Frame extraction, segment encoding, concatenation and remux
//! - [`audio`] - Audio duration preflight
//! - [`pipeline`] - Item discovery, per-item orchestration and fan-out
//! - [`config`] - Configuration management
//!
//! ## Output layout
//!
//! For an audio input `inputs/source_audio/<title>.<ext>` paired with
//! `inputs/source_video/<title>.mp4`, everything lands in `outputs/<title>/`:
//! `result.mp4`, `frames/`, `restored_imgs/`, `batch_NNNN.mp4`, `concat.txt`,
//! `concated_output.mp4`, `final_with_audio.mp4` and `report.json`.

pub mod audio;
pub mod config;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod process;

// Re-export commonly used types for convenience
pub use crate::{
    config::Config,
    error::{DubbingError, Result},
    pipeline::{discover_items, FanOutDriver, ItemReport, PipelineItem, PipelineOrchestrator, RunSummary},
};
