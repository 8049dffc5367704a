//! Per-stage engine parameters.
//!
//! Defaults reproduce the production pipeline: high accuracy matching with
//! mask-aware filtering, high quality depth maps with mild filtering, an
//! arbitrary-surface mesh from depth maps and an 8K mosaic texture.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    CircularTarget12bit,
    CircularTarget14bit,
    CircularTarget16bit,
    CrossTarget,
}

/// Fiducial marker detection parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerDetection {
    pub target_type: TargetType,
    pub tolerance: u32,
}

impl Default for MarkerDetection {
    fn default() -> Self {
        MarkerDetection {
            target_type: TargetType::CircularTarget12bit,
            tolerance: 50,
        }
    }
}

/// Background mask import parameters.
///
/// `path_template` is resolved by the engine per camera; `{filename}` expands
/// to the photo's file stem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskImport {
    pub path_template: String,
    pub tolerance: u32,
}

impl Default for MaskImport {
    fn default() -> Self {
        MaskImport {
            path_template: "Mask/{filename}.cr2".to_string(),
            tolerance: 23,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accuracy {
    Highest,
    High,
    Medium,
    Low,
    Lowest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preselection {
    None,
    Generic,
    Reference,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchSettings {
    pub accuracy: Accuracy,
    pub filter_mask: bool,
    pub mask_tiepoints: bool,
    pub preselection: Preselection,
}

impl Default for MatchSettings {
    fn default() -> Self {
        MatchSettings {
            accuracy: Accuracy::High,
            filter_mask: true,
            mask_tiepoints: true,
            preselection: Preselection::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthFilter {
    None,
    Mild,
    Moderate,
    Aggressive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthSettings {
    pub quality: Accuracy,
    pub filter: DepthFilter,
}

impl Default for DepthSettings {
    fn default() -> Self {
        DepthSettings {
            quality: Accuracy::High,
            filter: DepthFilter::Mild,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaceCount {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub from_depth_maps: bool,
    pub arbitrary_surface: bool,
    pub interpolation: bool,
    pub face_count: FaceCount,
    pub keep_depth: bool,
}

impl Default for ModelSettings {
    fn default() -> Self {
        ModelSettings {
            from_depth_maps: true,
            arbitrary_surface: true,
            interpolation: true,
            face_count: FaceCount::High,
            keep_depth: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UvMapping {
    Generic,
    Orthophoto,
    Spherical,
    Camera,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Blending {
    Mosaic,
    Average,
    Max,
    Min,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureSettings {
    pub mapping: UvMapping,
    pub blending: Blending,
    pub size: u32,
}

impl Default for TextureSettings {
    fn default() -> Self {
        TextureSettings {
            mapping: UvMapping::Generic,
            blending: Blending::Mosaic,
            size: 8192,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFormat {
    Obj,
    Ply,
    Fbx,
}

impl ModelFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ModelFormat::Obj => "obj",
            ModelFormat::Ply => "ply",
            ModelFormat::Fbx => "fbx",
        }
    }
}

/// All stage parameters, as read from the `[stages]` table of `recon.toml`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StageSettings {
    pub markers: MarkerDetection,
    pub masks: MaskImport,
    pub matching: MatchSettings,
    pub depth: DepthSettings,
    pub model: ModelSettings,
    pub texture: TextureSettings,
}
