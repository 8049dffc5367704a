//! Phase 2: Calibration - project creation, sensors, markers and region.

use std::path::{Path, PathBuf};

use super::{enter, save};
use crate::config::load_marker_table;
use crate::engine::{ReconstructionEngine, StageSettings};
use crate::error::{StageContext, StageError};
use crate::models::{CanonicalBox, Sequence};
use crate::orchestrator::checkpoint::ProjectLayout;
use crate::orchestrator::state::{SequenceRunState, Stage};
use crate::region::compute_region;

/// Open a fresh chunk labelled with the sequence name and save it at once.
pub async fn create_project<E: ReconstructionEngine + ?Sized>(
    engine: &mut E,
    sequence: &Sequence,
    layout: &ProjectLayout,
    state: &mut SequenceRunState,
) -> Result<(), StageError> {
    enter(state, Stage::CreateProject)?;

    tokio::fs::create_dir_all(layout.root())
        .await
        .at_stage(Stage::CreateProject)?;
    engine
        .create_project(&sequence.name)
        .await
        .at_stage(Stage::CreateProject)?;
    save(engine, layout, Stage::CreateProject).await
}

/// Add the photos, then give every camera its own copy of its sensor.
///
/// The engine groups photos by inferred sensor; per-camera sensors keep
/// photos with distinct intrinsics from sharing one calibration.
pub async fn import_photos<E: ReconstructionEngine + ?Sized>(
    engine: &mut E,
    photos: &[PathBuf],
    state: &mut SequenceRunState,
) -> Result<(), StageError> {
    enter(state, Stage::ImportPhotos)?;
    log::info!("[Pipeline] [#{}] Adding {} photos", state.sequence_id, photos.len());

    engine.add_photos(photos).await.at_stage(Stage::ImportPhotos)?;

    let cameras = engine.cameras().await.at_stage(Stage::ImportPhotos)?;
    for camera in &cameras {
        let profile = camera.sensor.relabelled(camera.label.clone());
        let sensor = engine
            .add_sensor(&profile)
            .await
            .at_stage(Stage::ImportPhotos)?;
        engine
            .set_camera_sensor(camera.id, sensor)
            .await
            .at_stage(Stage::ImportPhotos)?;
    }
    log::debug!(
        "[Pipeline] [#{}] Rebound {} cameras to dedicated sensors",
        state.sequence_id,
        cameras.len()
    );
    Ok(())
}

/// Import masks, detect markers and pin known ones to reference coordinates.
///
/// # Returns
/// * Number of detected markers whose reference location was overwritten
pub async fn detect_markers<E: ReconstructionEngine + ?Sized>(
    engine: &mut E,
    settings: &StageSettings,
    markers_file: &Path,
    state: &mut SequenceRunState,
) -> Result<usize, StageError> {
    enter(state, Stage::DetectMarkers)?;

    let table = load_marker_table(markers_file).at_stage(Stage::DetectMarkers)?;

    engine
        .import_masks(&settings.masks)
        .await
        .at_stage(Stage::DetectMarkers)?;
    engine
        .detect_markers(&settings.markers)
        .await
        .at_stage(Stage::DetectMarkers)?;

    let mut pinned = 0;
    for marker in engine.markers().await.at_stage(Stage::DetectMarkers)? {
        let Some(location) = table.get(&marker.label) else {
            continue;
        };
        log::info!(
            "[Pipeline] [#{}] Updating target {} to [{}, {}, {}]",
            state.sequence_id,
            marker.label,
            location.x,
            location.y,
            location.z
        );
        engine
            .set_marker_reference(marker.id, *location)
            .await
            .at_stage(Stage::DetectMarkers)?;
        pinned += 1;
    }
    Ok(pinned)
}

/// Replace the processing region with the canonical box in chunk coordinates.
pub async fn update_region<E: ReconstructionEngine + ?Sized>(
    engine: &mut E,
    canonical: &CanonicalBox,
    layout: &ProjectLayout,
    state: &mut SequenceRunState,
) -> Result<(), StageError> {
    enter(state, Stage::UpdateRegion)?;

    let transform = engine
        .scene_transform()
        .await
        .at_stage(Stage::UpdateRegion)?;
    if transform.is_none() {
        log::info!(
            "[Pipeline] [#{}] Chunk has no transform, using identity",
            state.sequence_id
        );
    }

    let region = compute_region(transform.as_ref(), canonical).at_stage(Stage::UpdateRegion)?;
    engine.set_region(&region).await.at_stage(Stage::UpdateRegion)?;
    engine
        .reset_reference_crs()
        .await
        .at_stage(Stage::UpdateRegion)?;
    engine
        .update_transform()
        .await
        .at_stage(Stage::UpdateRegion)?;
    log::info!(
        "[Pipeline] [#{}] Region center {:?} size {:?}",
        state.sequence_id,
        region.center.as_slice(),
        region.size.as_slice()
    );

    save(engine, layout, Stage::UpdateRegion).await
}
