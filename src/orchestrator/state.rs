//! Sequence stage tracking.
//!
//! `Stage` enumerates the pipeline steps in execution order; a
//! `SequenceRunState` follows one sequence through them so a failure can be
//! reported against the exact stage that raised it.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Pipeline stages in strict execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Download/extract raw images and copy them into the project
    FetchImages,
    /// New engine chunk, first project save
    CreateProject,
    /// Photos added, one sensor per camera
    ImportPhotos,
    /// Masks imported, markers detected and pinned to reference coordinates
    DetectMarkers,
    /// Canonical box mapped into the chunk frame
    UpdateRegion,
    MatchPhotos,
    ImportCameras,
    BuildPoints,
    BuildDepthMaps,
    BuildModel,
    BuildUv,
    BuildTexture,
    /// Metadata and mesh exported, completion checkpoint written
    Export,
    Completed,
}

impl Stage {
    pub const ORDER: [Stage; 14] = [
        Stage::FetchImages,
        Stage::CreateProject,
        Stage::ImportPhotos,
        Stage::DetectMarkers,
        Stage::UpdateRegion,
        Stage::MatchPhotos,
        Stage::ImportCameras,
        Stage::BuildPoints,
        Stage::BuildDepthMaps,
        Stage::BuildModel,
        Stage::BuildUv,
        Stage::BuildTexture,
        Stage::Export,
        Stage::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::FetchImages => "fetch_images",
            Stage::CreateProject => "create_project",
            Stage::ImportPhotos => "import_photos",
            Stage::DetectMarkers => "detect_markers",
            Stage::UpdateRegion => "update_region",
            Stage::MatchPhotos => "match_photos",
            Stage::ImportCameras => "import_cameras",
            Stage::BuildPoints => "build_points",
            Stage::BuildDepthMaps => "build_depth_maps",
            Stage::BuildModel => "build_model",
            Stage::BuildUv => "build_uv",
            Stage::BuildTexture => "build_texture",
            Stage::Export => "export",
            Stage::Completed => "completed",
        }
    }

    /// The stage that follows this one, `None` once completed.
    pub fn next(&self) -> Option<Stage> {
        let idx = Stage::ORDER.iter().position(|s| s == self)?;
        Stage::ORDER.get(idx + 1).copied()
    }

    pub fn can_transition_to(&self, next: Stage) -> bool {
        self.next() == Some(next)
    }
}

/// Progress of one sequence through the pipeline.
#[derive(Debug, Clone)]
pub struct SequenceRunState {
    pub sequence_id: i64,
    /// Current stage, `None` before the first one starts.
    pub stage: Option<Stage>,
    started: Instant,
    stage_started: Instant,
}

impl SequenceRunState {
    pub fn new(sequence_id: i64) -> Self {
        let now = Instant::now();
        SequenceRunState {
            sequence_id,
            stage: None,
            started: now,
            stage_started: now,
        }
    }

    /// Move to `next`, which must directly follow the current stage.
    pub fn transition_to(&mut self, next: Stage) -> Result<(), String> {
        let valid = match self.stage {
            None => next == Stage::FetchImages,
            Some(current) => current.can_transition_to(next),
        };
        if !valid {
            return Err(format!(
                "Invalid stage transition: {} -> {}",
                self.stage.map_or("start", |s| s.as_str()),
                next.as_str()
            ));
        }

        if let Some(current) = self.stage {
            log::debug!(
                "[Pipeline] [#{}] {} took {:.1?}",
                self.sequence_id,
                current.as_str(),
                self.stage_started.elapsed()
            );
        }
        self.stage = Some(next);
        self.stage_started = Instant::now();
        Ok(())
    }

    /// Stage reached so far; failures before the first stage count as fetch.
    pub fn current(&self) -> Stage {
        self.stage.unwrap_or(Stage::FetchImages)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn is_completed(&self) -> bool {
        self.stage == Some(Stage::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_is_linear() {
        assert_eq!(Stage::FetchImages.next(), Some(Stage::CreateProject));
        assert_eq!(Stage::BuildTexture.next(), Some(Stage::Export));
        assert_eq!(Stage::Completed.next(), None);
        assert!(Stage::MatchPhotos < Stage::ImportCameras);
    }

    #[test]
    fn test_run_state_walks_every_stage() {
        let mut state = SequenceRunState::new(1);
        for stage in Stage::ORDER {
            state.transition_to(stage).unwrap();
        }
        assert!(state.is_completed());
    }

    #[test]
    fn test_skipping_a_stage_is_rejected() {
        let mut state = SequenceRunState::new(1);
        assert!(state.transition_to(Stage::CreateProject).is_err());
        state.transition_to(Stage::FetchImages).unwrap();
        assert!(state.transition_to(Stage::ImportPhotos).is_err());
        assert_eq!(state.current(), Stage::FetchImages);
    }
}
