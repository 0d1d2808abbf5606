use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;

/// The six stages every item goes through, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    LipSync,
    FrameExtraction,
    FaceRestoration,
    SegmentEncoding,
    Concatenation,
    AudioMerge,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::LipSync,
        Stage::FrameExtraction,
        Stage::FaceRestoration,
        Stage::SegmentEncoding,
        Stage::Concatenation,
        Stage::AudioMerge,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::LipSync => "lip-sync",
            Stage::FrameExtraction => "frame-extraction",
            Stage::FaceRestoration => "face-restoration",
            Stage::SegmentEncoding => "segment-encoding",
            Stage::Concatenation => "concatenation",
            Stage::AudioMerge => "audio-merge",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageStatus {
    Succeeded,
    Failed { reason: String },
    Skipped { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: Stage,
    #[serde(flatten)]
    pub status: StageStatus,
    pub elapsed_ms: u64,
}

/// Everything known about one item's run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemReport {
    pub title: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stages: Vec<StageReport>,
    pub fps: Option<f64>,
    pub frames_extracted: usize,
    pub segments: usize,
    pub skipped_frames: usize,
    pub audio_duration_secs: Option<f64>,
    pub final_duration_secs: Option<f64>,
    pub final_output: Option<PathBuf>,
}

impl ItemReport {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            started_at: Utc::now(),
            finished_at: None,
            stages: Vec::new(),
            fps: None,
            frames_extracted: 0,
            segments: 0,
            skipped_frames: 0,
            audio_duration_secs: None,
            final_duration_secs: None,
            final_output: None,
        }
    }

    /// Report for an item whose task died before producing its own report
    pub fn aborted(title: impl Into<String>, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let mut report = Self::new(title);
        for stage in Stage::ALL {
            report.record(stage, StageStatus::Failed { reason: reason.clone() }, Duration::ZERO);
        }
        report.finish();
        report
    }

    pub fn record(&mut self, stage: Stage, status: StageStatus, elapsed: Duration) {
        self.stages.push(StageReport {
            stage,
            status,
            elapsed_ms: elapsed.as_millis() as u64,
        });
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn status_of(&self, stage: Stage) -> Option<&StageStatus> {
        self.stages.iter().find(|s| s.stage == stage).map(|s| &s.status)
    }

    /// First stage that failed, if any
    pub fn first_failure(&self) -> Option<Stage> {
        self.stages
            .iter()
            .find(|s| matches!(s.status, StageStatus::Failed { .. }))
            .map(|s| s.stage)
    }

    /// Every stage ran and succeeded
    pub fn succeeded(&self) -> bool {
        self.stages.len() == Stage::ALL.len()
            && self.stages.iter().all(|s| s.status == StageStatus::Succeeded)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| crate::error::DubbingError::generic(format!("report serialization: {}", e)))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Reports for every item of a run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub reports: Vec<ItemReport>,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.reports.iter().filter(|r| r.succeeded()).count()
    }

    pub fn failed_titles(&self) -> Vec<&str> {
        self.reports
            .iter()
            .filter(|r| !r.succeeded())
            .map(|r| r.title.as_str())
            .collect()
    }

    pub fn all_succeeded(&self) -> bool {
        self.reports.iter().all(ItemReport::succeeded)
    }

    pub fn log(&self) {
        for report in &self.reports {
            match report.first_failure() {
                None if report.succeeded() => info!(
                    "✅ {}: {} segment(s), {} skipped frame(s) -> {:?}",
                    report.title,
                    report.segments,
                    report.skipped_frames,
                    report.final_output.as_deref().unwrap_or(Path::new("-"))
                ),
                None => warn!("⚠️  {}: incomplete", report.title),
                Some(stage) => warn!("❌ {}: first failure at {}", report.title, stage),
            }
        }
        info!("{}/{} item(s) completed", self.succeeded(), self.reports.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_report() -> ItemReport {
        let mut report = ItemReport::new("alice");
        for stage in Stage::ALL {
            report.record(stage, StageStatus::Succeeded, Duration::from_millis(5));
        }
        report
    }

    #[test]
    fn test_success_requires_every_stage() {
        let mut report = full_report();
        assert!(report.succeeded());

        report.stages.pop();
        assert!(!report.succeeded());
    }

    #[test]
    fn test_first_failure() {
        let mut report = ItemReport::new("bob");
        report.record(Stage::LipSync, StageStatus::Succeeded, Duration::ZERO);
        report.record(
            Stage::FrameExtraction,
            StageStatus::Failed { reason: "probe".to_string() },
            Duration::ZERO,
        );
        report.record(
            Stage::FaceRestoration,
            StageStatus::Skipped { reason: "halted".to_string() },
            Duration::ZERO,
        );
        assert_eq!(report.first_failure(), Some(Stage::FrameExtraction));
        assert!(!report.succeeded());
    }

    #[test]
    fn test_report_json_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        full_report().write_json(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["title"], "alice");
        assert_eq!(value["stages"][0]["stage"], "lip_sync");
        assert_eq!(value["stages"][0]["status"], "succeeded");
    }

    #[test]
    fn test_summary_counts() {
        let summary = RunSummary {
            reports: vec![full_report(), ItemReport::aborted("bob", "panic")],
        };
        assert_eq!(summary.succeeded(), 1);
        assert_eq!(summary.failed_titles(), vec!["bob"]);
        assert!(!summary.all_succeeded());
    }
}
