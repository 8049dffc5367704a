//! Project layout and the completion checkpoint.
//!
//! A project directory may exist in any intermediate state. Only
//! `<key>/data/sequence.json` marks a sequence as done, and it is written
//! through a temp file plus rename so a crash can never leave a truncated one.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::engine::ModelFormat;
use crate::models::Sequence;

pub const PROJECT_FILE: &str = "project.psz";
pub const CHECKPOINT_FILE: &str = "sequence.json";

/// Paths of one sequence's project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    key: String,
    root: PathBuf,
}

impl ProjectLayout {
    pub fn new(workdir: &Path, sequence: &Sequence) -> Self {
        let key = sequence.project_key();
        ProjectLayout {
            root: workdir.join(&key),
            key,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn project_file(&self) -> PathBuf {
        self.root.join(PROJECT_FILE)
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }

    pub fn model_dir(&self) -> PathBuf {
        self.root.join("model")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    pub fn cameras_export(&self) -> PathBuf {
        self.data_dir().join("cameras.xml")
    }

    pub fn markers_export(&self) -> PathBuf {
        self.data_dir().join("markers.xml")
    }

    pub fn model_export(&self, format: ModelFormat) -> PathBuf {
        self.model_dir()
            .join(format!("{}.{}", self.key, format.extension()))
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.data_dir().join(CHECKPOINT_FILE)
    }

    pub fn is_complete(&self) -> bool {
        self.checkpoint_path().is_file()
    }

    /// Record `sequence` as the completion checkpoint.
    pub fn write_checkpoint(&self, sequence: &Sequence) -> io::Result<()> {
        let data_dir = self.data_dir();
        fs::create_dir_all(&data_dir)?;

        let json = serde_json::to_vec(sequence)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&data_dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.checkpoint_path()).map_err(|e| e.error)?;
        Ok(())
    }

    pub fn read_checkpoint(&self) -> io::Result<Sequence> {
        let raw = fs::read(self.checkpoint_path())?;
        Ok(serde_json::from_slice(&raw)?)
    }
}
