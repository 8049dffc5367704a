//! Recon Batch
//!
//! Resumable batch orchestrator for photogrammetry reconstruction. Given a
//! list of capture sequences it downloads each sequence's images, drives an
//! external reconstruction engine through a fixed chain of stages and writes
//! a completion checkpoint so finished sequences are skipped on the next run.
//!
//! The system is organized into functional modules:
//! - **error**: Error type hierarchy per concern plus per-stage wrapping
//! - **models**: Sequence, marker table, canonical box and region types
//! - **config**: `recon.toml` and JSON input loading
//! - **catalog**: Job catalog client and the batch-level `sequences.json` cache
//! - **fetch**: Image archive download and extraction
//! - **region**: Canonical box to chunk-coordinate region transform
//! - **engine**: Reconstruction engine interface and the bridge adapter
//! - **orchestrator**: Per-sequence stage driver and batch loop
//! - **log_collector**: Disk-backed logger for the `log` facade

pub mod error;
pub mod models;

pub mod config;

pub mod catalog;

pub mod fetch;

pub mod region;

pub mod engine;

pub mod orchestrator;

pub mod log_collector;

pub use log;

// ============================================================================
// PUBLIC RE-EXPORTS FOR CONVENIENCE
// ============================================================================

pub use error::{
    CatalogError, ConfigError, EngineError, FetchError, PipelineError, RegionError, StageError,
    StageErrorKind,
};

pub use models::{CanonicalBox, MarkerTable, Region, Sequence};

pub use config::{RunConfig, DEFAULT_CONFIG_FILE};

pub use catalog::{load_or_fetch_sequences, JobCatalog, SequenceListError, WampCatalogClient};

pub use fetch::AssetFetcher;

pub use region::compute_region;

pub use engine::{BridgeEngine, ReconstructionEngine};

pub use orchestrator::{BatchReport, FailedSequence, Orchestrator, ProjectLayout, Stage};

pub use log_collector::{LogCollector, LogLine};

/// Crate version, logged at startup.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
