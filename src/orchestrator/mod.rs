//! Batch orchestration: fetch -> project -> calibrate -> reconstruct -> export, per sequence.

pub mod checkpoint;
pub mod phases;
pub mod state;

use serde::Serialize;
use std::time::Duration;
use tokio::sync::watch;

pub use checkpoint::ProjectLayout;
pub use state::{SequenceRunState, Stage};

use crate::config::RunConfig;
use crate::engine::ReconstructionEngine;
use crate::error::{FetchError, PipelineError, StageError};
use crate::fetch::AssetFetcher;
use crate::models::Sequence;

/// A sequence abandoned during this run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedSequence {
    pub id: i64,
    pub name: String,
    pub stage: Stage,
    pub kind: &'static str,
    pub error: String,
}

/// What happened to each sequence of one `process` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub completed: Vec<i64>,
    pub skipped: Vec<i64>,
    pub failed: Vec<FailedSequence>,
    /// Set when a user interrupt stopped the batch early.
    pub interrupted: bool,
}

impl BatchReport {
    pub fn attempted(&self) -> usize {
        self.completed.len() + self.failed.len()
    }
}

/// Drives sequences through the pipeline one at a time.
pub struct Orchestrator {
    config: RunConfig,
    fetcher: AssetFetcher,
    cancel_rx: watch::Receiver<bool>,
}

impl Orchestrator {
    /// Create an orchestrator for `config`.
    ///
    /// # Arguments
    /// * `config` - Run settings (paths, fetch, region, stage parameters)
    /// * `cancel_rx` - Flipped to `true` on user interrupt
    pub fn new(config: RunConfig, cancel_rx: watch::Receiver<bool>) -> Result<Self, FetchError> {
        let fetcher = AssetFetcher::new(config.paths.workdir.clone(), config.fetch.clone())?;
        Ok(Orchestrator {
            config,
            fetcher,
            cancel_rx,
        })
    }

    pub fn layout_for(&self, sequence: &Sequence) -> ProjectLayout {
        ProjectLayout::new(&self.config.paths.workdir, sequence)
    }

    /// Process `sequences` in order against `engine`.
    ///
    /// Completed sequences are skipped, failures are logged and recorded, and
    /// an interrupt stops the batch without touching the remaining sequences.
    pub async fn process<E: ReconstructionEngine + ?Sized>(
        &self,
        engine: &mut E,
        sequences: &[Sequence],
    ) -> BatchReport {
        log::info!("[Pipeline] The following sequences will be processed:");
        for sequence in sequences {
            log::info!("[Pipeline]   {}", sequence);
        }

        let mut report = BatchReport::default();
        for sequence in sequences {
            if *self.cancel_rx.borrow() {
                report.interrupted = true;
                break;
            }

            let layout = self.layout_for(sequence);
            if layout.is_complete() {
                log::info!("[Pipeline] {} already complete, skipping", sequence);
                report.skipped.push(sequence.id);
                continue;
            }

            let mut state = SequenceRunState::new(sequence.id);
            match self.run_guarded(engine, sequence, &layout, &mut state).await {
                Ok(()) => {
                    log::info!(
                        "[Pipeline] {} completed in {}",
                        sequence,
                        format_elapsed(state.elapsed())
                    );
                    report.completed.push(sequence.id);
                }
                Err(PipelineError::Stage(err)) => {
                    log::error!(
                        "[Pipeline] {} failed at {} after {}: {}. Moving on...",
                        sequence,
                        err.stage.as_str(),
                        format_elapsed(state.elapsed()),
                        err
                    );
                    report.failed.push(failure_record(sequence, &err));
                }
                Err(PipelineError::Interrupted) => {
                    log::warn!(
                        "[Pipeline] Stopping due to user input during {} ({})",
                        sequence,
                        state.current().as_str()
                    );
                    report.interrupted = true;
                    break;
                }
            }
        }

        log::info!(
            "[Pipeline] Batch finished: {} completed, {} skipped, {} failed{}",
            report.completed.len(),
            report.skipped.len(),
            report.failed.len(),
            if report.interrupted { " (interrupted)" } else { "" }
        );
        report
    }

    /// Run one sequence, racing it against the interrupt signal.
    async fn run_guarded<E: ReconstructionEngine + ?Sized>(
        &self,
        engine: &mut E,
        sequence: &Sequence,
        layout: &ProjectLayout,
        state: &mut SequenceRunState,
    ) -> Result<(), PipelineError> {
        let mut cancel_rx = self.cancel_rx.clone();
        tokio::select! {
            result = self.run_sequence(engine, sequence, layout, state) => {
                result.map_err(PipelineError::from)
            }
            _ = wait_for_cancel(&mut cancel_rx) => Err(PipelineError::Interrupted),
        }
    }

    async fn run_sequence<E: ReconstructionEngine + ?Sized>(
        &self,
        engine: &mut E,
        sequence: &Sequence,
        layout: &ProjectLayout,
        state: &mut SequenceRunState,
    ) -> Result<(), StageError> {
        let paths = &self.config.paths;
        let stages = &self.config.stages;

        let photos = phases::materialize_images(&self.fetcher, sequence, layout, state).await?;
        phases::create_project(engine, sequence, layout, state).await?;
        phases::import_photos(engine, &photos, state).await?;
        phases::detect_markers(engine, stages, &paths.markers_path(), state).await?;
        phases::update_region(engine, &self.config.region, layout, state).await?;
        phases::run_reconstruction(engine, stages, &paths.cameras_path(), layout, state).await?;
        phases::export_results(engine, sequence, layout, state).await
    }
}

/// Resolves once the interrupt flag is set; never resolves if the sender is gone.
async fn wait_for_cancel(cancel_rx: &mut watch::Receiver<bool>) {
    if cancel_rx.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn failure_record(sequence: &Sequence, err: &StageError) -> FailedSequence {
    FailedSequence {
        id: sequence.id,
        name: sequence.name.clone(),
        stage: err.stage,
        kind: err.kind.label(),
        error: err.kind.to_string(),
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{}h{:02}m{:02}s", secs / 3600, (secs / 60) % 60, secs % 60)
}
