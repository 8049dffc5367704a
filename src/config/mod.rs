//! Run configuration.
//!
//! All settings live in an optional `recon.toml`. Every table and field has a
//! default, so a missing file or a partial file is valid.
//!
//! # Module Structure
//!
//! - `loader`: reads `recon.toml`, `markers.json`, `sequences.json` and checks
//!   required inputs such as `cameras.xml`

pub mod loader;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::engine::bridge::BridgeCommand;
use crate::engine::settings::StageSettings;
use crate::models::CanonicalBox;

pub use loader::{
    load_marker_table, load_run_config, load_sequences, require_input_file, save_sequences,
};

/// Default config file name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "recon.toml";

/// Complete settings for one batch run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub paths: PathSettings,
    pub catalog: CatalogSettings,
    pub fetch: FetchSettings,
    pub region: CanonicalBox,
    pub engine: BridgeCommand,
    pub stages: StageSettings,
}

/// Locations of inputs and outputs. Relative paths resolve against `workdir`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub workdir: PathBuf,
    pub sequences_file: PathBuf,
    pub markers_file: PathBuf,
    pub cameras_file: PathBuf,
    pub log_dir: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        PathSettings {
            workdir: PathBuf::from("."),
            sequences_file: PathBuf::from("sequences.json"),
            markers_file: PathBuf::from("markers.json"),
            cameras_file: PathBuf::from("cameras.xml"),
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl PathSettings {
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workdir.join(path)
        }
    }

    pub fn sequences_path(&self) -> PathBuf {
        self.resolve(&self.sequences_file)
    }

    pub fn markers_path(&self) -> PathBuf {
        self.resolve(&self.markers_file)
    }

    pub fn cameras_path(&self) -> PathBuf {
        self.resolve(&self.cameras_file)
    }

    pub fn log_path(&self) -> PathBuf {
        self.resolve(&self.log_dir)
    }
}

/// Job catalog session parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    pub url: String,
    pub realm: String,
    pub ready_topic: String,
    pub register_procedure: String,
    pub query_procedure: String,
    pub datatype: String,
    /// Appended to the hostname to form the registered worker name.
    pub worker_suffix: String,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        CatalogSettings {
            url: "ws://photomaster2.irc.umbc.edu:8080/ws".to_string(),
            realm: "realm1".to_string(),
            ready_topic: "com.scanmanager.ready".to_string(),
            register_procedure: "com.scanmanager.register_name".to_string(),
            query_procedure: "com.scanmanager.query".to_string(),
            datatype: "SequenceImages".to_string(),
            worker_suffix: "-Metashape".to_string(),
        }
    }
}

/// Image archive download parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    /// `{id}` is replaced with the sequence id.
    pub url_template: String,
    /// The image server uses a self-signed certificate.
    pub accept_invalid_certs: bool,
    pub connect_timeout_secs: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        FetchSettings {
            url_template: "http://photomaster2.irc.umbc.edu/download/images.zip?sequences={id}"
                .to_string(),
            accept_invalid_certs: true,
            connect_timeout_secs: 30,
        }
    }
}

impl FetchSettings {
    pub fn url_for(&self, sequence_id: i64) -> String {
        self.url_template.replace("{id}", &sequence_id.to_string())
    }
}
