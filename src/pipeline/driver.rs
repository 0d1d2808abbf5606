use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, Instrument};

use crate::config::Config;
use crate::error::{DubbingError, PipelineError, Result};
use crate::pipeline::item::PipelineItem;
use crate::pipeline::orchestrator::PipelineOrchestrator;
use crate::pipeline::report::{ItemReport, RunSummary};

/// Launches one orchestrator run per item and waits for all of them.
///
/// Every item gets its own task straight away; a semaphore decides how many
/// of them may be inside the pipeline at once.
pub struct FanOutDriver {
    orchestrator: Arc<PipelineOrchestrator>,
    max_concurrent: usize,
}

impl FanOutDriver {
    /// `max_concurrent == 0` lets every item run at once
    pub fn new(orchestrator: Arc<PipelineOrchestrator>, max_concurrent: usize) -> Self {
        Self {
            orchestrator,
            max_concurrent,
        }
    }

    pub fn from_config(config: Arc<Config>) -> Self {
        let max_concurrent = config.pipeline.max_concurrent_items;
        Self::new(Arc::new(PipelineOrchestrator::new(config)), max_concurrent)
    }

    /// Permits handed out for `item_count` items
    pub fn permits_for(&self, item_count: usize) -> usize {
        match self.max_concurrent {
            0 => item_count.max(1),
            limit => limit,
        }
    }

    /// Run all items and collect their reports, sorted by title.
    ///
    /// A task that panics is reported as failed; the other items carry on.
    pub async fn run(&self, items: Vec<PipelineItem>) -> Result<RunSummary> {
        let permits = self.permits_for(items.len());
        info!(
            "🚀 Running {} item(s), at most {} at a time",
            items.len(),
            permits
        );

        let semaphore = Arc::new(Semaphore::new(permits));
        let mut handles: Vec<(String, JoinHandle<Result<ItemReport>>)> = Vec::with_capacity(items.len());

        for item in items {
            let semaphore = Arc::clone(&semaphore);
            let orchestrator = Arc::clone(&self.orchestrator);
            let span = info_span!("item", title = %item.title);
            let title = item.title.clone();

            let handle = tokio::spawn(
                async move {
                    let _permit = semaphore.acquire_owned().await.map_err(|e| {
                        PipelineError::TaskAborted {
                            title: item.title.clone(),
                            reason: e.to_string(),
                        }
                    })?;
                    Ok::<_, DubbingError>(orchestrator.run_item(&item).await)
                }
                .instrument(span),
            );
            handles.push((title, handle));
        }

        let mut reports = Vec::with_capacity(handles.len());
        for (title, handle) in handles {
            let report = match handle.await {
                Ok(Ok(report)) => report,
                Ok(Err(e)) => {
                    error!("'{}' never started: {}", title, e);
                    ItemReport::aborted(title, e.to_string())
                }
                Err(e) => {
                    let e = PipelineError::TaskAborted {
                        title: title.clone(),
                        reason: e.to_string(),
                    };
                    error!("{}", e);
                    ItemReport::aborted(title, e.to_string())
                }
            };
            reports.push(report);
        }

        reports.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(RunSummary { reports })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::FailurePolicy;
    use crate::pipeline::item::discover_items;
    use crate::pipeline::report::{Stage, StageStatus};
    use std::path::{Path, PathBuf};
    use tempfile::tempdir;

    /// Workspace with `titles` audio/video pairs and a lip-sync stand-in
    /// that fails, after recording whether another copy was running.
    fn workspace(root: &Path, titles: &[&str]) -> Config {
        let mut config = Config::default();
        config.paths.root = root.to_path_buf();
        config.pipeline.on_stage_failure = FailurePolicy::Halt;
        config.pipeline.write_reports = false;

        std::fs::create_dir_all(config.audio_dir()).unwrap();
        std::fs::create_dir_all(config.video_dir()).unwrap();
        for title in titles {
            std::fs::write(config.audio_dir().join(format!("{}.wav", title)), b"x").unwrap();
            std::fs::write(config.video_dir().join(format!("{}.mp4", title)), b"x").unwrap();
        }

        // mkdir is atomic: failing to create the lock means another run holds it
        let script = root.join("lipsync.sh");
        std::fs::write(
            &script,
            format!(
                r#"if mkdir "{lock}" 2>/dev/null; then
  sleep 0.2
  rmdir "{lock}"
else
  touch "{overlap}"
fi
exit 3
"#,
                lock = root.join("lock").display(),
                overlap = root.join("overlap").display()
            ),
        )
        .unwrap();

        config.lipsync.interpreter = PathBuf::from("sh");
        config.lipsync.script = script;
        config
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_single_permit_serializes_items() {
        let root = tempdir().unwrap();
        let mut config = workspace(root.path(), &["carol", "alice", "bob"]);
        config.pipeline.max_concurrent_items = 1;
        let config = Arc::new(config);

        let items = discover_items(&config).unwrap();
        let summary = FanOutDriver::from_config(config).run(items).await.unwrap();

        let titles: Vec<_> = summary.reports.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["alice", "bob", "carol"]);
        assert!(!root.path().join("overlap").exists());
        assert_eq!(summary.succeeded(), 0);
        for report in &summary.reports {
            match report.status_of(Stage::LipSync) {
                Some(StageStatus::Failed { reason }) => assert!(reason.contains("exit code 3")),
                other => panic!("unexpected lip-sync status: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_unbounded_runs_every_item() {
        let root = tempdir().unwrap();
        let mut config = workspace(root.path(), &["alice", "bob"]);
        config.pipeline.max_concurrent_items = 0;
        let config = Arc::new(config);

        let driver = FanOutDriver::from_config(Arc::clone(&config));
        assert_eq!(driver.permits_for(2), 2);
        assert_eq!(driver.permits_for(0), 1);

        let items = discover_items(&config).unwrap();
        let summary = driver.run(items).await.unwrap();
        assert_eq!(summary.reports.len(), 2);
        assert_eq!(summary.failed_titles(), vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn test_no_items() {
        let driver = FanOutDriver::from_config(Arc::new(Config::default()));
        let summary = driver.run(Vec::new()).await.unwrap();
        assert!(summary.reports.is_empty());
        assert!(summary.all_succeeded());
    }
}
