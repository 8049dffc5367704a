//! Shared fixtures for pipeline integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use nalgebra::{Matrix4, Vector3};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::sync::watch;

use recon_batch::config::{FetchSettings, PathSettings, RunConfig};
use recon_batch::engine::{
    Camera, DepthSettings, MarkerDetection, MaskImport, MatchSettings, ModelFormat,
    ModelSettings, ObjectId, SensorProfile, TextureSettings,
};
use recon_batch::engine::Marker;
use recon_batch::{EngineError, ReconstructionEngine, Region, Sequence};

/// In-memory engine that records every call and writes placeholder files.
pub struct RecordingEngine {
    pub calls: Vec<String>,
    pub project_label: Option<String>,
    pub markers: Vec<Marker>,
    pub marker_refs: HashMap<ObjectId, Vector3<f64>>,
    pub transform: Option<Matrix4<f64>>,
    pub region: Option<Region>,
    pub camera_sensors: HashMap<ObjectId, ObjectId>,
    pub added_sensors: Vec<SensorProfile>,
    photos: Vec<PathBuf>,
    next_sensor: ObjectId,
    /// Fail `op` while the open project carries this label.
    fail_on: Option<(String, String)>,
    /// Flip the interrupt flag inside `op`, then never return.
    hang_on: Option<(String, watch::Sender<bool>)>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        RecordingEngine {
            calls: Vec::new(),
            project_label: None,
            markers: Vec::new(),
            marker_refs: HashMap::new(),
            transform: None,
            region: None,
            camera_sensors: HashMap::new(),
            added_sensors: Vec::new(),
            photos: Vec::new(),
            next_sensor: 100,
            fail_on: None,
            hang_on: None,
        }
    }

    pub fn with_markers(mut self, markers: Vec<Marker>) -> Self {
        for marker in &markers {
            if let Some(reference) = marker.reference {
                self.marker_refs.insert(marker.id, reference);
            }
        }
        self.markers = markers;
        self
    }

    pub fn with_transform(mut self, transform: Matrix4<f64>) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn failing(mut self, op: &str, label: &str) -> Self {
        self.fail_on = Some((op.to_string(), label.to_string()));
        self
    }

    pub fn interrupting(mut self, op: &str, cancel_tx: watch::Sender<bool>) -> Self {
        self.hang_on = Some((op.to_string(), cancel_tx));
        self
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls.iter().filter(|c| c.as_str() == op).count()
    }

    async fn record(&mut self, op: &str) -> Result<(), EngineError> {
        self.calls.push(op.to_string());

        if let Some((hang_op, cancel_tx)) = &self.hang_on {
            if hang_op == op {
                let _ = cancel_tx.send(true);
                std::future::pending::<()>().await;
            }
        }

        if let Some((fail_op, label)) = &self.fail_on {
            if fail_op == op && self.project_label.as_deref() == Some(label.as_str()) {
                return Err(EngineError::Operation {
                    op: op.to_string(),
                    message: "simulated engine failure".to_string(),
                });
            }
        }
        Ok(())
    }
}

fn touch(path: &Path, content: &str) -> Result<(), EngineError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

fn sensor(label: &str) -> SensorProfile {
    SensorProfile {
        label: label.to_string(),
        sensor_type: "frame".to_string(),
        calibration: serde_json::json!({"f": 5200.0}),
        width: 5472,
        height: 3648,
        focal_length: Some(24.0),
        pixel_width: Some(0.0044),
        pixel_height: Some(0.0044),
    }
}

#[async_trait]
impl ReconstructionEngine for RecordingEngine {
    async fn create_project(&mut self, label: &str) -> Result<(), EngineError> {
        self.project_label = Some(label.to_string());
        self.photos.clear();
        self.record("create_project").await
    }

    async fn save_project(&mut self, path: &Path) -> Result<(), EngineError> {
        self.record("save_project").await?;
        touch(path, "project")
    }

    async fn add_photos(&mut self, photos: &[PathBuf]) -> Result<(), EngineError> {
        self.photos = photos.to_vec();
        self.record("add_photos").await
    }

    async fn cameras(&mut self) -> Result<Vec<Camera>, EngineError> {
        self.record("cameras").await?;
        Ok(self
            .photos
            .iter()
            .enumerate()
            .map(|(i, photo)| Camera {
                id: i as ObjectId,
                label: photo
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                sensor_id: 0,
                sensor: sensor("shared"),
            })
            .collect())
    }

    async fn add_sensor(&mut self, profile: &SensorProfile) -> Result<ObjectId, EngineError> {
        self.record("add_sensor").await?;
        self.added_sensors.push(profile.clone());
        self.next_sensor += 1;
        Ok(self.next_sensor)
    }

    async fn set_camera_sensor(
        &mut self,
        camera: ObjectId,
        sensor: ObjectId,
    ) -> Result<(), EngineError> {
        self.record("set_camera_sensor").await?;
        self.camera_sensors.insert(camera, sensor);
        Ok(())
    }

    async fn import_masks(&mut self, _masks: &MaskImport) -> Result<(), EngineError> {
        self.record("import_masks").await
    }

    async fn detect_markers(&mut self, _detection: &MarkerDetection) -> Result<(), EngineError> {
        self.record("detect_markers").await
    }

    async fn markers(&mut self) -> Result<Vec<Marker>, EngineError> {
        self.record("markers").await?;
        Ok(self.markers.clone())
    }

    async fn set_marker_reference(
        &mut self,
        marker: ObjectId,
        location: Vector3<f64>,
    ) -> Result<(), EngineError> {
        self.record("set_marker_reference").await?;
        self.marker_refs.insert(marker, location);
        Ok(())
    }

    async fn scene_transform(&mut self) -> Result<Option<Matrix4<f64>>, EngineError> {
        self.record("scene_transform").await?;
        Ok(self.transform)
    }

    async fn set_region(&mut self, region: &Region) -> Result<(), EngineError> {
        self.record("set_region").await?;
        self.region = Some(*region);
        Ok(())
    }

    async fn reset_reference_crs(&mut self) -> Result<(), EngineError> {
        self.record("reset_reference_crs").await
    }

    async fn update_transform(&mut self) -> Result<(), EngineError> {
        self.record("update_transform").await
    }

    async fn match_photos(&mut self, _settings: &MatchSettings) -> Result<(), EngineError> {
        self.record("match_photos").await
    }

    async fn import_cameras(&mut self, _path: &Path) -> Result<(), EngineError> {
        self.record("import_cameras").await
    }

    async fn build_points(&mut self) -> Result<(), EngineError> {
        self.record("build_points").await
    }

    async fn build_depth_maps(&mut self, _settings: &DepthSettings) -> Result<(), EngineError> {
        self.record("build_depth_maps").await
    }

    async fn build_model(&mut self, _settings: &ModelSettings) -> Result<(), EngineError> {
        self.record("build_model").await
    }

    async fn build_uv(&mut self, _settings: &TextureSettings) -> Result<(), EngineError> {
        self.record("build_uv").await
    }

    async fn build_texture(&mut self, _settings: &TextureSettings) -> Result<(), EngineError> {
        self.record("build_texture").await
    }

    async fn export_cameras(&mut self, path: &Path) -> Result<(), EngineError> {
        self.record("export_cameras").await?;
        touch(path, "<document/>")
    }

    async fn export_markers(&mut self, path: &Path) -> Result<(), EngineError> {
        self.record("export_markers").await?;
        touch(path, "<document/>")
    }

    async fn export_model(&mut self, path: &Path, _format: ModelFormat) -> Result<(), EngineError> {
        self.record("export_model").await?;
        touch(path, "o mesh")
    }
}

/// A scratch working directory with inputs for a batch run.
pub struct Workspace {
    pub dir: TempDir,
    pub config: RunConfig,
}

impl Workspace {
    /// Writes `markers.json` and `cameras.xml`; nothing is ever downloaded
    /// because every sequence gets a pre-extracted image directory.
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("markers.json"),
            r#"{"target 1": [1.0, 2.0, 3.0], "target 9": [0.0, 0.0, 0.5]}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("cameras.xml"), "<document/>").unwrap();

        let config = RunConfig {
            paths: PathSettings {
                workdir: dir.path().to_path_buf(),
                ..PathSettings::default()
            },
            fetch: FetchSettings {
                url_template: "http://127.0.0.1:9/images.zip?sequences={id}".to_string(),
                ..FetchSettings::default()
            },
            ..RunConfig::default()
        };
        Workspace { dir, config }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Pre-extract two photos for `sequence`, one of them nested.
    pub fn stage_images(&self, sequence: &Sequence) {
        let image_dir = self.path().join(format!("images-{}", sequence.id));
        std::fs::create_dir_all(image_dir.join("cam2")).unwrap();
        std::fs::write(image_dir.join("IMG_0001.jpg"), b"jpeg-1").unwrap();
        std::fs::write(image_dir.join("cam2/IMG_0002.jpg"), b"jpeg-2").unwrap();
    }
}

pub fn sequences(specs: &[(i64, &str)]) -> Vec<Sequence> {
    specs
        .iter()
        .map(|(id, name)| Sequence::new(*id, *name))
        .collect()
}

pub fn marker(id: ObjectId, label: &str, reference: Option<[f64; 3]>) -> Marker {
    Marker {
        id,
        label: label.to_string(),
        reference: reference.map(|[x, y, z]| Vector3::new(x, y, z)),
    }
}
