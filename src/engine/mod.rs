//! Reconstruction engine capability interface.
//!
//! The orchestrator never touches engine internals. Everything it needs is
//! expressed by [`ReconstructionEngine`]; one value of an implementing type is
//! one engine session holding a single open project (one chunk). The
//! production adapter is [`bridge::BridgeEngine`], which forwards each call to
//! an external engine host process.

pub mod bridge;
pub mod settings;

use async_trait::async_trait;
use nalgebra::{Matrix4, Vector3};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::EngineError;
use crate::models::Region;

pub use bridge::BridgeEngine;
pub use settings::{
    DepthSettings, MarkerDetection, MaskImport, MatchSettings, ModelFormat, ModelSettings,
    StageSettings, TextureSettings,
};

/// Opaque engine-side identifier of a camera, sensor or marker.
pub type ObjectId = u64;

/// Intrinsic sensor description copied between sensor profiles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorProfile {
    pub label: String,
    #[serde(rename = "type")]
    pub sensor_type: String,
    /// Engine-native calibration payload, passed through untouched.
    pub calibration: serde_json::Value,
    pub width: u32,
    pub height: u32,
    pub focal_length: Option<f64>,
    pub pixel_width: Option<f64>,
    pub pixel_height: Option<f64>,
}

impl SensorProfile {
    /// Copy of this profile under a new label.
    pub fn relabelled(&self, label: impl Into<String>) -> Self {
        SensorProfile {
            label: label.into(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub id: ObjectId,
    pub label: String,
    pub sensor_id: ObjectId,
    pub sensor: SensorProfile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub id: ObjectId,
    pub label: String,
    /// Reference location, `None` until the engine or the operator sets one.
    pub reference: Option<Vector3<f64>>,
}

/// One engine session with a single open project.
#[async_trait]
pub trait ReconstructionEngine: Send {
    /// Start a fresh project with one chunk labelled `label`.
    async fn create_project(&mut self, label: &str) -> Result<(), EngineError>;

    /// Persist the open project to `path`.
    async fn save_project(&mut self, path: &Path) -> Result<(), EngineError>;

    async fn add_photos(&mut self, photos: &[PathBuf]) -> Result<(), EngineError>;

    async fn cameras(&mut self) -> Result<Vec<Camera>, EngineError>;

    async fn add_sensor(&mut self, profile: &SensorProfile) -> Result<ObjectId, EngineError>;

    async fn set_camera_sensor(
        &mut self,
        camera: ObjectId,
        sensor: ObjectId,
    ) -> Result<(), EngineError>;

    async fn import_masks(&mut self, masks: &MaskImport) -> Result<(), EngineError>;

    async fn detect_markers(&mut self, detection: &MarkerDetection) -> Result<(), EngineError>;

    async fn markers(&mut self) -> Result<Vec<Marker>, EngineError>;

    async fn set_marker_reference(
        &mut self,
        marker: ObjectId,
        location: Vector3<f64>,
    ) -> Result<(), EngineError>;

    /// Chunk-to-reference transform, `None` when unset.
    async fn scene_transform(&mut self) -> Result<Option<Matrix4<f64>>, EngineError>;

    async fn set_region(&mut self, region: &Region) -> Result<(), EngineError>;

    /// Point camera and marker reference systems at the chunk's own CRS.
    async fn reset_reference_crs(&mut self) -> Result<(), EngineError>;

    /// Recompute the marker-derived chunk transform.
    async fn update_transform(&mut self) -> Result<(), EngineError>;

    async fn match_photos(&mut self, settings: &MatchSettings) -> Result<(), EngineError>;

    async fn import_cameras(&mut self, path: &Path) -> Result<(), EngineError>;

    async fn build_points(&mut self) -> Result<(), EngineError>;

    async fn build_depth_maps(&mut self, settings: &DepthSettings) -> Result<(), EngineError>;

    async fn build_model(&mut self, settings: &ModelSettings) -> Result<(), EngineError>;

    async fn build_uv(&mut self, settings: &TextureSettings) -> Result<(), EngineError>;

    async fn build_texture(&mut self, settings: &TextureSettings) -> Result<(), EngineError>;

    async fn export_cameras(&mut self, path: &Path) -> Result<(), EngineError>;

    async fn export_markers(&mut self, path: &Path) -> Result<(), EngineError>;

    async fn export_model(&mut self, path: &Path, format: ModelFormat) -> Result<(), EngineError>;
}
