use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task;
use tracing::{debug, info, warn};

use crate::{
    audio::AudioProbe,
    config::{Config, FailurePolicy},
    error::{DubbingError, MediaError, PipelineError, Result},
    media::{
        probe_video, staging, AudioVideoMerger, ConcatManifest, FfmpegSegmentWriter,
        FrameExtractor, FrameSequence, SegmentBatcher, SegmentConcatenator, SegmentRecord,
        SegmentWriter,
    },
    pipeline::{
        item::PipelineItem,
        report::{ItemReport, Stage, StageStatus},
    },
    process::{FaceRestorationTool, LipSyncTool, ProcessOutcome, ProcessRunner},
};

/// State handed from one stage to the next within a single item.
///
/// A stage only reads files its upstream stage produced in this run, so
/// outputs left by an earlier run are never picked up.
#[derive(Debug, Default)]
struct ItemState {
    lipsync_ok: bool,
    fps: Option<f64>,
    frames: Option<FrameSequence>,
    restored_ok: bool,
    segments: Vec<SegmentRecord>,
    concat_ok: bool,
}

/// Runs the six dubbing stages for one item at a time
///
/// Stages run strictly in order:
/// 1. Lip-sync - Regenerate the mouth region of the source video against the new audio
/// 2. Frame extraction - Split the lip-synced video into numbered JPEG frames
/// 3. Face restoration - Enhance every frame with the restoration tool
/// 4. Segment encoding - Re-encode restored frames in fixed-size batches
/// 5. Concatenation - Join the segments without re-encoding
/// 6. Audio merge - Put the new audio track on the joined video
///
/// With `clean_stale_outputs` set, everything an earlier run left in the
/// item's output directory is removed before the first stage.
///
/// A failed stage is recorded in the item's report. With
/// [`FailurePolicy::Continue`] the remaining stages still run, with
/// [`FailurePolicy::Halt`] they are marked skipped.
pub struct PipelineOrchestrator {
    config: Arc<Config>,
    runner: ProcessRunner,
    ffprobe: PathBuf,
    lipsync: LipSyncTool,
    restoration: FaceRestorationTool,
    extractor: FrameExtractor,
    batcher: SegmentBatcher,
    concatenator: SegmentConcatenator,
    merger: AudioVideoMerger,
}

impl PipelineOrchestrator {
    /// Create an orchestrator that encodes segments with ffmpeg
    pub fn new(config: Arc<Config>) -> Self {
        let writer = Arc::new(FfmpegSegmentWriter::from_config(&config));
        Self::with_segment_writer(config, writer)
    }

    /// Create an orchestrator with a custom segment encoder
    pub fn with_segment_writer(config: Arc<Config>, writer: Arc<dyn SegmentWriter>) -> Self {
        let runner = ProcessRunner::new(config.pipeline.stderr_tail_lines);
        Self {
            ffprobe: config.resolve_program(&config.encoding.ffprobe),
            lipsync: LipSyncTool::from_config(&config),
            restoration: FaceRestorationTool::from_config(&config),
            extractor: FrameExtractor::from_config(&config),
            batcher: SegmentBatcher::from_config(&config, writer),
            concatenator: SegmentConcatenator::from_config(&config, runner.clone()),
            merger: AudioVideoMerger::from_config(&config, runner.clone()),
            runner,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run every stage for `item` and return what happened.
    ///
    /// Never fails: stage errors end up in the report.
    pub async fn run_item(&self, item: &PipelineItem) -> ItemReport {
        info!("🎬 Starting '{}'", item.title);
        info!("   Audio: {:?}", item.audio_path);
        info!("   Video: {:?}", item.video_path);
        info!("   Output: {:?}", item.output_dir);

        let mut report = ItemReport::new(&item.title);
        report.audio_duration_secs = self.audio_duration(&item.audio_path).await;

        if self.config.pipeline.clean_stale_outputs {
            if let Err(e) = self.clear_stale_outputs(item) {
                warn!("Could not clear stale outputs for '{}': {}", item.title, e);
            }
        }

        let mut state = ItemState::default();
        let mut halted_at: Option<Stage> = None;

        for stage in Stage::ALL {
            if let Some(failed) = halted_at {
                report.record(
                    stage,
                    StageStatus::Skipped {
                        reason: format!("{} failed", failed),
                    },
                    Duration::ZERO,
                );
                continue;
            }

            let started = Instant::now();
            let status = match self.run_stage(stage, item, &mut state, &mut report).await {
                Ok(()) => {
                    debug!("{} finished in {:.1?}", stage, started.elapsed());
                    StageStatus::Succeeded
                }
                Err(e) => {
                    warn!("❌ {} failed for '{}': {}", stage, item.title, e);
                    if self.config.pipeline.on_stage_failure == FailurePolicy::Halt {
                        halted_at = Some(stage);
                    }
                    StageStatus::Failed { reason: e.to_string() }
                }
            };
            report.record(stage, status, started.elapsed());
        }

        report.finish();
        if self.config.pipeline.write_reports {
            self.write_report(item, &report);
        }

        if report.succeeded() {
            info!("🎉 '{}' complete: {:?}", item.title, item.final_output());
        } else {
            warn!("'{}' finished with failures", item.title);
        }
        report
    }

    async fn run_stage(
        &self,
        stage: Stage,
        item: &PipelineItem,
        state: &mut ItemState,
        report: &mut ItemReport,
    ) -> Result<()> {
        match stage {
            Stage::LipSync => self.lip_sync(item, state).await,
            Stage::FrameExtraction => self.extract_frames(item, state, report).await,
            Stage::FaceRestoration => self.restore_faces(item, state).await,
            Stage::SegmentEncoding => self.encode_segments(item, state, report).await,
            Stage::Concatenation => self.concatenate(item, state).await,
            Stage::AudioMerge => self.merge_audio(item, state, report).await,
        }
    }

    /// Remove the files and directories an earlier run wrote for `item`
    fn clear_stale_outputs(&self, item: &PipelineItem) -> Result<()> {
        let files = [
            item.lipsync_output(),
            item.manifest_path(),
            item.concat_output(),
            item.final_output(),
        ];
        let mut removed = staging::remove_stale_files(&files)?;
        removed += staging::remove_stale_segments(&item.output_dir)?;
        for dir in [item.frames_dir(), item.restored_dir()] {
            if dir.is_dir() {
                std::fs::remove_dir_all(&dir)?;
                removed += 1;
            }
        }
        if removed > 0 {
            debug!("Removed {} stale output(s) under {:?}", removed, item.output_dir);
        }
        Ok(())
    }

    // ==========================================
    // STAGE 1: LIP-SYNC
    // ==========================================

    async fn lip_sync(&self, item: &PipelineItem, state: &mut ItemState) -> Result<()> {
        info!("👄 Step 1: Lip-syncing '{}'...", item.title);

        if !item.video_path.is_file() {
            return Err(MediaError::FileNotFound {
                path: item.video_path.clone(),
            }
            .into());
        }
        std::fs::create_dir_all(&item.output_dir)?;

        let output = item.lipsync_output();
        let staging_path = staging::staging_path(&output);
        let spec = self
            .lipsync
            .command(&item.video_path, &item.audio_path, &staging_path);
        let outcome = self.runner.run(&spec).await?;

        if outcome.success && staging_path.is_file() {
            staging::commit(&staging_path, &output)?;
            state.lipsync_ok = true;
            return Ok(());
        }

        staging::discard(&staging_path);
        if outcome.success {
            return Err(stage_failed(
                Stage::LipSync,
                format!("{} exited cleanly but wrote no video", spec.label),
            ));
        }
        Err(failed_outcome(Stage::LipSync, &spec.label, &outcome))
    }

    // ==========================================
    // STAGE 2: FRAME EXTRACTION
    // ==========================================

    async fn extract_frames(
        &self,
        item: &PipelineItem,
        state: &mut ItemState,
        report: &mut ItemReport,
    ) -> Result<()> {
        info!("🎞️  Step 2: Extracting frames...");

        if !state.lipsync_ok {
            return Err(not_produced(Stage::FrameExtraction, Stage::LipSync));
        }

        let frames_dir = item.frames_dir();
        staging::prepare_dir(&frames_dir, self.config.pipeline.clean_stale_outputs)?;

        let extracted = self
            .extractor
            .extract(&item.lipsync_output(), &frames_dir)
            .await?;

        report.fps = Some(extracted.fps);
        report.frames_extracted = extracted.sequence.len();
        state.fps = Some(extracted.fps);
        state.frames = Some(extracted.sequence);
        Ok(())
    }

    // ==========================================
    // STAGE 3: FACE RESTORATION
    // ==========================================

    async fn restore_faces(&self, item: &PipelineItem, state: &mut ItemState) -> Result<()> {
        info!("✨ Step 3: Restoring faces...");

        if state.frames.is_none() {
            return Err(not_produced(Stage::FaceRestoration, Stage::FrameExtraction));
        }

        let restored_dir = item.restored_dir();
        staging::prepare_dir(&restored_dir, self.config.pipeline.clean_stale_outputs)?;

        let spec = self.restoration.command(&item.frames_dir(), &restored_dir);
        let outcome = self.runner.run(&spec).await?;
        if !outcome.success {
            return Err(failed_outcome(Stage::FaceRestoration, &spec.label, &outcome));
        }
        state.restored_ok = true;
        Ok(())
    }

    // ==========================================
    // STAGE 4: SEGMENT ENCODING
    // ==========================================

    async fn encode_segments(
        &self,
        item: &PipelineItem,
        state: &mut ItemState,
        report: &mut ItemReport,
    ) -> Result<()> {
        info!("📼 Step 4: Encoding restored frames...");

        if !state.restored_ok {
            return Err(not_produced(Stage::SegmentEncoding, Stage::FaceRestoration));
        }

        let fps = state.fps.unwrap_or(self.config.lipsync.fps);

        let outcome = self
            .batcher
            .encode(&item.restored_dir(), &item.output_dir, fps, state.frames.as_ref())
            .await?;

        report.segments = outcome.segments.len();
        report.skipped_frames = outcome.skipped_frames;
        state.segments = outcome.segments;

        if outcome.restored_dir.is_none() {
            return Err(stage_failed(
                Stage::SegmentEncoding,
                format!("no restored frames under {:?}", item.restored_dir()),
            ));
        }
        if state.segments.is_empty() {
            return Err(PipelineError::NoSegments {
                title: item.title.clone(),
            }
            .into());
        }
        Ok(())
    }

    // ==========================================
    // STAGE 5: CONCATENATION
    // ==========================================

    async fn concatenate(&self, item: &PipelineItem, state: &mut ItemState) -> Result<()> {
        info!("🔗 Step 5: Concatenating segments...");

        if state.segments.is_empty() {
            return Err(PipelineError::NoSegments {
                title: item.title.clone(),
            }
            .into());
        }

        let manifest = ConcatManifest::from_segments(&state.segments);
        let outcome = self
            .concatenator
            .concatenate(&manifest, &item.manifest_path(), &item.concat_output())
            .await?;
        if !outcome.success {
            return Err(failed_outcome(Stage::Concatenation, "ffmpeg concat", &outcome));
        }
        state.concat_ok = true;
        Ok(())
    }

    // ==========================================
    // STAGE 6: AUDIO MERGE
    // ==========================================

    async fn merge_audio(
        &self,
        item: &PipelineItem,
        state: &ItemState,
        report: &mut ItemReport,
    ) -> Result<()> {
        info!("🎵 Step 6: Merging audio...");

        if !state.concat_ok {
            return Err(not_produced(Stage::AudioMerge, Stage::Concatenation));
        }

        let output = item.final_output();
        let outcome = self
            .merger
            .merge(&item.concat_output(), &item.audio_path, &output)
            .await?;
        if !outcome.success {
            return Err(failed_outcome(Stage::AudioMerge, "ffmpeg merge", &outcome));
        }

        match probe_video(&self.ffprobe, &output).await {
            Ok(info) => {
                info!("   Final video: {:.2}s at {:.3} fps", info.duration, info.fps);
                report.final_duration_secs = Some(info.duration);
            }
            Err(e) => warn!("Could not probe {:?}: {}", output, e),
        }
        report.final_output = Some(output);
        Ok(())
    }

    /// Replacement audio length, or `None` when the file cannot be read
    async fn audio_duration(&self, audio: &Path) -> Option<f64> {
        let path = audio.to_path_buf();
        match task::spawn_blocking(move || AudioProbe::duration(&path)).await {
            Ok(Ok(duration)) => {
                info!("   Audio duration: {:.2}s", duration);
                Some(duration)
            }
            Ok(Err(e)) => {
                warn!("Audio preflight failed: {}", e);
                None
            }
            Err(e) => {
                warn!("Audio preflight task failed: {}", e);
                None
            }
        }
    }

    fn write_report(&self, item: &PipelineItem, report: &ItemReport) {
        let path = item.report_path();
        let written = std::fs::create_dir_all(&item.output_dir)
            .map_err(DubbingError::from)
            .and_then(|_| report.write_json(&path));
        match written {
            Ok(()) => debug!("Report written to {:?}", path),
            Err(e) => warn!("Could not write report {:?}: {}", path, e),
        }
    }
}

fn stage_failed(stage: Stage, reason: String) -> DubbingError {
    PipelineError::StageFailed {
        stage: stage.to_string(),
        reason,
    }
    .into()
}

fn not_produced(stage: Stage, upstream: Stage) -> DubbingError {
    stage_failed(stage, format!("{} produced no output in this run", upstream))
}

fn failed_outcome(stage: Stage, label: &str, outcome: &ProcessOutcome) -> DubbingError {
    stage_failed(stage, outcome.failure_reason(label))
}
