//! Core data types for the reconstruction batch runner.

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One unit of work as published by the job catalog.
///
/// Only `ID` and `name` are interpreted; every other field of the catalog
/// record is kept in `extra` so the completion checkpoint reproduces the
/// record verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    #[serde(rename = "ID")]
    pub id: i64,

    pub name: String,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Sequence {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Sequence {
            id,
            name: name.into(),
            extra: serde_json::Map::new(),
        }
    }

    /// Filesystem-safe project key: whitespace stripped, lowercased.
    pub fn project_key(&self) -> String {
        self.name
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase()
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} '{}'", self.id, self.name)
    }
}

/// Ground-truth marker coordinates in the reference frame, keyed by label.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkerTable {
    entries: BTreeMap<String, Vector3<f64>>,
}

impl MarkerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: impl Into<String>, location: Vector3<f64>) {
        self.entries.insert(label.into(), location);
    }

    pub fn get(&self, label: &str) -> Option<&Vector3<f64>> {
        self.entries.get(label)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, Vector3<f64>)> for MarkerTable {
    fn from_iter<I: IntoIterator<Item = (String, Vector3<f64>)>>(iter: I) -> Self {
        MarkerTable {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Physical capture volume in reference-frame units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanonicalBox {
    pub size: [f64; 3],
    pub center: [f64; 3],
}

impl Default for CanonicalBox {
    fn default() -> Self {
        CanonicalBox {
            size: [1.0, 2.5, 1.0],
            center: [0.0, 1.25, 0.0],
        }
    }
}

impl CanonicalBox {
    pub fn size_vector(&self) -> Vector3<f64> {
        Vector3::from(self.size)
    }

    pub fn center_vector(&self) -> Vector3<f64> {
        Vector3::from(self.center)
    }
}

/// Oriented processing region in the engine's chunk frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub rotation: Matrix3<f64>,
    pub size: Vector3<f64>,
    pub center: Vector3<f64>,
}
