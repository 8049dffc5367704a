//! Phase 3: Reconstruction - matching through texturing.
//!
//! Each stage is followed by a project save so an interrupted run reopens a
//! project holding everything up to the last finished stage.

use std::path::Path;

use super::{enter, save};
use crate::config::require_input_file;
use crate::engine::{ReconstructionEngine, StageSettings};
use crate::error::{StageContext, StageError};
use crate::orchestrator::checkpoint::ProjectLayout;
use crate::orchestrator::state::{SequenceRunState, Stage};

pub async fn run_reconstruction<E: ReconstructionEngine + ?Sized>(
    engine: &mut E,
    settings: &StageSettings,
    cameras_file: &Path,
    layout: &ProjectLayout,
    state: &mut SequenceRunState,
) -> Result<(), StageError> {
    enter(state, Stage::MatchPhotos)?;
    engine
        .match_photos(&settings.matching)
        .await
        .at_stage(Stage::MatchPhotos)?;
    save(engine, layout, Stage::MatchPhotos).await?;

    enter(state, Stage::ImportCameras)?;
    require_input_file(cameras_file).at_stage(Stage::ImportCameras)?;
    engine
        .import_cameras(cameras_file)
        .await
        .at_stage(Stage::ImportCameras)?;
    save(engine, layout, Stage::ImportCameras).await?;

    enter(state, Stage::BuildPoints)?;
    engine.build_points().await.at_stage(Stage::BuildPoints)?;
    save(engine, layout, Stage::BuildPoints).await?;

    enter(state, Stage::BuildDepthMaps)?;
    engine
        .build_depth_maps(&settings.depth)
        .await
        .at_stage(Stage::BuildDepthMaps)?;
    save(engine, layout, Stage::BuildDepthMaps).await?;

    enter(state, Stage::BuildModel)?;
    engine
        .build_model(&settings.model)
        .await
        .at_stage(Stage::BuildModel)?;
    save(engine, layout, Stage::BuildModel).await?;

    enter(state, Stage::BuildUv)?;
    engine
        .build_uv(&settings.texture)
        .await
        .at_stage(Stage::BuildUv)?;
    save(engine, layout, Stage::BuildUv).await?;

    enter(state, Stage::BuildTexture)?;
    engine
        .build_texture(&settings.texture)
        .await
        .at_stage(Stage::BuildTexture)?;
    save(engine, layout, Stage::BuildTexture).await
}
