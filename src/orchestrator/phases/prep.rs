//! Phase 1: Preparation - raw images into the project.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::enter;
use crate::error::{FetchError, StageContext, StageError};
use crate::fetch::AssetFetcher;
use crate::models::Sequence;
use crate::orchestrator::checkpoint::ProjectLayout;
use crate::orchestrator::state::{SequenceRunState, Stage};

/// Fetch the sequence's images and copy them flat into `<project>/images`.
///
/// # Returns
/// * The copied photo paths, sorted, ready to be added to the engine project
pub async fn materialize_images(
    fetcher: &AssetFetcher,
    sequence: &Sequence,
    layout: &ProjectLayout,
    state: &mut SequenceRunState,
) -> Result<Vec<PathBuf>, StageError> {
    enter(state, Stage::FetchImages)?;

    let source = fetcher
        .ensure_images(sequence.id)
        .await
        .at_stage(Stage::FetchImages)?;

    let target = layout.images_dir();
    let photos = tokio::task::spawn_blocking(move || copy_images(&source, &target))
        .await
        .map_err(|e| StageError::new(Stage::FetchImages, FetchError::Join(e.to_string())))?
        .at_stage(Stage::FetchImages)?;

    log::info!(
        "[Pipeline] [#{}] {} photos staged in {}",
        sequence.id,
        photos.len(),
        layout.images_dir().display()
    );
    Ok(photos)
}

/// Copy every regular file under `source` (recursively) into `target`.
///
/// Files with the same name in different subdirectories collapse to one.
fn copy_images(source: &Path, target: &Path) -> std::io::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(target)?;

    let mut photos = Vec::new();
    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let dest = target.join(entry.file_name());
        std::fs::copy(entry.path(), &dest)?;
        photos.push(dest);
    }

    photos.sort();
    photos.dedup();
    Ok(photos)
}
