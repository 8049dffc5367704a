//! Engine bridge adapter.
//!
//! Drives an external engine host (typically the engine's own scripting
//! runtime running a small request loop) over the child's stdin/stdout. Each
//! call is one JSON line `{"id", "op", "params"}`; the host answers with one
//! JSON line `{"id", "ok", "result" | "error"}`. Any stdout line that does not
//! start with `{` is engine chatter and is forwarded to the log. stderr is
//! streamed to the log line by line.

use async_trait::async_trait;
use nalgebra::{Matrix4, Vector3};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use super::{
    Camera, DepthSettings, Marker, MarkerDetection, MaskImport, MatchSettings, ModelFormat,
    ModelSettings, ObjectId, ReconstructionEngine, SensorProfile, TextureSettings,
};
use crate::error::EngineError;
use crate::models::Region;

/// How to launch the engine host process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Grace period for the host to exit after stdin is closed.
    pub shutdown_timeout_secs: u64,
}

impl Default for BridgeCommand {
    fn default() -> Self {
        BridgeCommand {
            program: "metashape.sh".to_string(),
            args: vec![
                "-platform".to_string(),
                "offscreen".to_string(),
                "-r".to_string(),
                "engine_host.py".to_string(),
            ],
            shutdown_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Reply {
    id: Option<u64>,
    ok: bool,
    #[serde(default)]
    result: Value,
    error: Option<String>,
}

/// Engine session backed by a child process.
pub struct BridgeEngine {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    shutdown_timeout: Duration,
}

impl BridgeEngine {
    /// Launch the engine host described by `command`.
    pub fn spawn(command: &BridgeCommand) -> Result<Self, EngineError> {
        log::info!(
            "[Engine] Launching bridge: {} {}",
            command.program,
            command.args.join(" ")
        );

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Spawn(format!("{}: {}", command.program, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Spawn("Failed to capture stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Spawn("Failed to capture stdout".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    log::debug!("[Engine] [STDERR] {}", line);
                }
            });
        }

        Ok(BridgeEngine {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 1,
            shutdown_timeout: Duration::from_secs(command.shutdown_timeout_secs),
        })
    }

    /// Close the request stream and wait for the host to exit.
    pub async fn shutdown(mut self) -> Result<(), EngineError> {
        self.stdin.shutdown().await?;
        drop(self.stdin);
        match tokio::time::timeout(self.shutdown_timeout, self.child.wait()).await {
            Ok(status) => {
                log::info!("[Engine] Bridge exited with status: {}", status?);
            }
            Err(_) => {
                log::warn!("[Engine] Bridge did not exit in time, killing it");
                self.child.kill().await?;
            }
        }
        Ok(())
    }

    async fn call(&mut self, op: &str, params: Value) -> Result<Value, EngineError> {
        let id = self.next_id;
        self.next_id += 1;

        let mut line = serde_json::to_string(&json!({ "id": id, "op": op, "params": params }))?;
        line.push('\n');
        log::debug!("[Engine] -> {}", op);
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;

        loop {
            let raw = self.stdout.next_line().await?.ok_or(EngineError::Closed)?;
            let trimmed = raw.trim();
            if !trimmed.starts_with('{') {
                if !trimmed.is_empty() {
                    log::debug!("[Engine] {}", trimmed);
                }
                continue;
            }

            let reply: Reply = serde_json::from_str(trimmed)?;
            if let Some(got) = reply.id {
                if got != id {
                    return Err(EngineError::Desync { expected: id, got });
                }
            }
            if !reply.ok {
                return Err(EngineError::Operation {
                    op: op.to_string(),
                    message: reply.error.unwrap_or_else(|| "unspecified failure".to_string()),
                });
            }
            return Ok(reply.result);
        }
    }

    async fn call_as<T: DeserializeOwned>(
        &mut self,
        op: &str,
        params: Value,
    ) -> Result<T, EngineError> {
        let value = self.call(op, params).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn call_unit(&mut self, op: &str, params: Value) -> Result<(), EngineError> {
        self.call(op, params).await.map(|_| ())
    }
}

fn path_param(path: &Path) -> Value {
    Value::String(path.to_string_lossy().into_owned())
}

/// Scene transforms travel as 16 row-major values.
fn decode_transform(raw: Option<Vec<f64>>) -> Result<Option<Matrix4<f64>>, EngineError> {
    match raw {
        None => Ok(None),
        Some(values) if values.len() == 16 => Ok(Some(Matrix4::from_row_slice(&values))),
        Some(values) => Err(EngineError::Operation {
            op: "scene_transform".to_string(),
            message: format!("expected 16 matrix entries, got {}", values.len()),
        }),
    }
}

fn encode_region(region: &Region) -> Value {
    let rotation: Vec<f64> = region.rotation.transpose().iter().copied().collect();
    json!({
        "rotation": rotation,
        "size": [region.size.x, region.size.y, region.size.z],
        "center": [region.center.x, region.center.y, region.center.z],
    })
}

#[async_trait]
impl ReconstructionEngine for BridgeEngine {
    async fn create_project(&mut self, label: &str) -> Result<(), EngineError> {
        self.call_unit("create_project", json!({ "label": label })).await
    }

    async fn save_project(&mut self, path: &Path) -> Result<(), EngineError> {
        self.call_unit("save_project", json!({ "path": path_param(path) }))
            .await
    }

    async fn add_photos(&mut self, photos: &[PathBuf]) -> Result<(), EngineError> {
        let photos: Vec<Value> = photos.iter().map(|p| path_param(p)).collect();
        self.call_unit("add_photos", json!({ "photos": photos })).await
    }

    async fn cameras(&mut self) -> Result<Vec<Camera>, EngineError> {
        self.call_as("cameras", json!({})).await
    }

    async fn add_sensor(&mut self, profile: &SensorProfile) -> Result<ObjectId, EngineError> {
        self.call_as("add_sensor", json!({ "profile": profile })).await
    }

    async fn set_camera_sensor(
        &mut self,
        camera: ObjectId,
        sensor: ObjectId,
    ) -> Result<(), EngineError> {
        self.call_unit(
            "set_camera_sensor",
            json!({ "camera": camera, "sensor": sensor }),
        )
        .await
    }

    async fn import_masks(&mut self, masks: &MaskImport) -> Result<(), EngineError> {
        self.call_unit("import_masks", json!({ "masks": masks, "source": "background" }))
            .await
    }

    async fn detect_markers(&mut self, detection: &MarkerDetection) -> Result<(), EngineError> {
        self.call_unit("detect_markers", json!(detection)).await
    }

    async fn markers(&mut self) -> Result<Vec<Marker>, EngineError> {
        self.call_as("markers", json!({})).await
    }

    async fn set_marker_reference(
        &mut self,
        marker: ObjectId,
        location: Vector3<f64>,
    ) -> Result<(), EngineError> {
        self.call_unit(
            "set_marker_reference",
            json!({ "marker": marker, "location": [location.x, location.y, location.z] }),
        )
        .await
    }

    async fn scene_transform(&mut self) -> Result<Option<Matrix4<f64>>, EngineError> {
        let raw: Option<Vec<f64>> = self.call_as("scene_transform", json!({})).await?;
        decode_transform(raw)
    }

    async fn set_region(&mut self, region: &Region) -> Result<(), EngineError> {
        self.call_unit("set_region", encode_region(region)).await
    }

    async fn reset_reference_crs(&mut self) -> Result<(), EngineError> {
        self.call_unit("reset_reference_crs", json!({})).await
    }

    async fn update_transform(&mut self) -> Result<(), EngineError> {
        self.call_unit("update_transform", json!({})).await
    }

    async fn match_photos(&mut self, settings: &MatchSettings) -> Result<(), EngineError> {
        self.call_unit("match_photos", json!(settings)).await
    }

    async fn import_cameras(&mut self, path: &Path) -> Result<(), EngineError> {
        self.call_unit("import_cameras", json!({ "path": path_param(path) }))
            .await
    }

    async fn build_points(&mut self) -> Result<(), EngineError> {
        self.call_unit("build_points", json!({})).await
    }

    async fn build_depth_maps(&mut self, settings: &DepthSettings) -> Result<(), EngineError> {
        self.call_unit("build_depth_maps", json!(settings)).await
    }

    async fn build_model(&mut self, settings: &ModelSettings) -> Result<(), EngineError> {
        self.call_unit("build_model", json!(settings)).await
    }

    async fn build_uv(&mut self, settings: &TextureSettings) -> Result<(), EngineError> {
        self.call_unit("build_uv", json!({ "mapping": settings.mapping }))
            .await
    }

    async fn build_texture(&mut self, settings: &TextureSettings) -> Result<(), EngineError> {
        self.call_unit(
            "build_texture",
            json!({ "blending": settings.blending, "size": settings.size }),
        )
        .await
    }

    async fn export_cameras(&mut self, path: &Path) -> Result<(), EngineError> {
        self.call_unit("export_cameras", json!({ "path": path_param(path) }))
            .await
    }

    async fn export_markers(&mut self, path: &Path) -> Result<(), EngineError> {
        self.call_unit("export_markers", json!({ "path": path_param(path) }))
            .await
    }

    async fn export_model(&mut self, path: &Path, format: ModelFormat) -> Result<(), EngineError> {
        self.call_unit(
            "export_model",
            json!({ "path": path_param(path), "format": format }),
        )
        .await
    }
}
