//! Orchestrator phases: the per-sequence pipeline split by concern.
//!
//! - **prep**: raw image materialization and project image copy
//! - **calibrate**: project creation, per-camera sensors, markers, region
//! - **reconstruct**: matching through texturing, one save per stage
//! - **export**: metadata/mesh export and the completion checkpoint
//!
//! Every phase advances the sequence's `SequenceRunState` before touching the
//! engine, so an error is always attributed to the stage that raised it.

pub mod calibrate;
pub mod export;
pub mod prep;
pub mod reconstruct;

use crate::engine::ReconstructionEngine;
use crate::error::{StageContext, StageError, StageErrorKind};
use crate::orchestrator::checkpoint::ProjectLayout;
use crate::orchestrator::state::{SequenceRunState, Stage};

pub use calibrate::{create_project, detect_markers, import_photos, update_region};
pub use export::export_results;
pub use prep::materialize_images;
pub use reconstruct::run_reconstruction;

/// Enter `stage`, attributing a transition error to it.
pub(crate) fn enter(state: &mut SequenceRunState, stage: Stage) -> Result<(), StageError> {
    state
        .transition_to(stage)
        .map_err(|msg| StageError::new(stage, StageErrorKind::Transition(msg)))?;
    log::info!("[Pipeline] [#{}] {}", state.sequence_id, stage.as_str());
    Ok(())
}

/// Persist the engine project after `stage`.
pub(crate) async fn save<E: ReconstructionEngine + ?Sized>(
    engine: &mut E,
    layout: &ProjectLayout,
    stage: Stage,
) -> Result<(), StageError> {
    engine
        .save_project(&layout.project_file())
        .await
        .at_stage(stage)
}
