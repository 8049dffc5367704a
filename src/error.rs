//! Unified error type hierarchy for the reconstruction batch runner
//!
//! Provides structured error handling with FetchError, EngineError, ConfigError,
//! RegionError, CatalogError, and the per-sequence StageError / PipelineError pair.

use std::io;
use thiserror::Error;

use crate::orchestrator::Stage;

/// Remote asset retrieval errors (download, extraction).
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download of sequence {id} returned status {status}")]
    Status { id: i64, status: u16 },

    #[error("Archive is corrupt or unreadable: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Extraction task aborted: {0}")]
    Join(String),

    #[error("IO error during asset retrieval: {0}")]
    IoError(#[from] io::Error),
}

/// Failures raised by the reconstruction engine or its transport.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Engine bridge could not be started: {0}")]
    Spawn(String),

    #[error("Engine bridge transport failed: {0}")]
    Transport(#[from] io::Error),

    #[error("Engine bridge closed the connection")]
    Closed,

    #[error("Malformed engine reply: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("Engine reply out of order: expected {expected}, got {got}")]
    Desync { expected: u64, got: u64 },

    #[error("Engine operation '{op}' failed: {message}")]
    Operation { op: String, message: String },
}

/// Configuration file parsing and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid JSON in config: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Invalid TOML in config: {0}")]
    InvalidToml(#[from] toml::de::Error),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("IO error during config operations: {0}")]
    IoError(#[from] io::Error),
}

/// Degenerate scene transforms that cannot yield a processing region.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegionError {
    #[error("Scene transform has degenerate scale {0}")]
    DegenerateScale(f64),

    #[error("Scene transform is not invertible")]
    Singular,
}

/// Job catalog session errors.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("WebSocket failure: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Malformed WAMP message: {0}")]
    Protocol(String),

    #[error("Router aborted the session: {0}")]
    Aborted(String),

    #[error("Call to {procedure} failed: {error}")]
    CallFailed { procedure: String, error: String },

    #[error("Catalog has no sequence with ID {0}")]
    MissingSequence(i64),

    #[error("Session closed before the exchange completed")]
    Closed,

    #[error("Invalid sequence record: {0}")]
    InvalidRecord(#[from] serde_json::Error),
}

/// Error kind carried by a failed pipeline stage.
#[derive(Error, Debug)]
pub enum StageErrorKind {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Region(#[from] RegionError),

    #[error("Project filesystem error: {0}")]
    Io(#[from] io::Error),

    /// Stages entered out of order.
    #[error("{0}")]
    Transition(String),
}

impl StageErrorKind {
    /// Short tag used in log lines and batch reports.
    pub fn label(&self) -> &'static str {
        match self {
            StageErrorKind::Fetch(_) => "fetch",
            StageErrorKind::Engine(_) => "engine",
            StageErrorKind::Config(_) => "config",
            StageErrorKind::Region(_) => "region",
            StageErrorKind::Io(_) => "io",
            StageErrorKind::Transition(_) => "transition",
        }
    }
}

/// A failure pinned to the stage that raised it.
#[derive(Error, Debug)]
#[error("stage '{}' failed ({}): {kind}", .stage.as_str(), .kind.label())]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub kind: StageErrorKind,
}

impl StageError {
    pub fn new(stage: Stage, kind: impl Into<StageErrorKind>) -> Self {
        StageError {
            stage,
            kind: kind.into(),
        }
    }
}

/// Outcome of driving one sequence when it does not complete.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Isolated to the current sequence; the batch continues.
    #[error(transparent)]
    Stage(#[from] StageError),

    /// User interrupt; the batch stops.
    #[error("Processing interrupted by user")]
    Interrupted,
}

/// Attach a stage to any error convertible into a [`StageErrorKind`].
pub trait StageContext<T> {
    fn at_stage(self, stage: Stage) -> Result<T, StageError>;
}

impl<T, E> StageContext<T> for Result<T, E>
where
    E: Into<StageErrorKind>,
{
    fn at_stage(self, stage: Stage) -> Result<T, StageError> {
        self.map_err(|e| StageError::new(stage, e))
    }
}
