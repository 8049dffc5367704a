//! Phase 4: Export - metadata, mesh and the completion checkpoint.

use super::enter;
use crate::engine::{ModelFormat, ReconstructionEngine};
use crate::error::{StageContext, StageError};
use crate::models::Sequence;
use crate::orchestrator::checkpoint::ProjectLayout;
use crate::orchestrator::state::{SequenceRunState, Stage};

/// Export cameras, markers and the textured mesh, then write the checkpoint.
///
/// The checkpoint is the last write; until it exists the sequence is
/// reprocessed on the next run.
pub async fn export_results<E: ReconstructionEngine + ?Sized>(
    engine: &mut E,
    sequence: &Sequence,
    layout: &ProjectLayout,
    state: &mut SequenceRunState,
) -> Result<(), StageError> {
    enter(state, Stage::Export)?;

    tokio::fs::create_dir_all(layout.model_dir())
        .await
        .at_stage(Stage::Export)?;
    tokio::fs::create_dir_all(layout.data_dir())
        .await
        .at_stage(Stage::Export)?;

    engine
        .export_cameras(&layout.cameras_export())
        .await
        .at_stage(Stage::Export)?;
    engine
        .export_markers(&layout.markers_export())
        .await
        .at_stage(Stage::Export)?;
    engine
        .export_model(&layout.model_export(ModelFormat::Obj), ModelFormat::Obj)
        .await
        .at_stage(Stage::Export)?;

    layout.write_checkpoint(sequence).at_stage(Stage::Export)?;
    enter(state, Stage::Completed)
}
