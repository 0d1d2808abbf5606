//! # Pipeline Module
//!
//! Ties the stages together. [`discover_items`] turns the audio input
//! directory into [`PipelineItem`]s, the [`PipelineOrchestrator`] runs the
//! six stages for one item, and the [`FanOutDriver`] runs many items
//! concurrently under a worker limit.
//!
//! Every run produces an [`ItemReport`]; the driver collects them into a
//! [`RunSummary`].

pub mod driver;
pub mod item;
pub mod orchestrator;
pub mod report;

pub use driver::FanOutDriver;
pub use item::{discover_items, PipelineItem};
pub use orchestrator::PipelineOrchestrator;
pub use report::{ItemReport, RunSummary, Stage, StageReport, StageStatus};
