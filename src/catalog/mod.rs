//! Job catalog: where the batch's sequence list comes from.
//!
//! The orchestrator only ever sees [`load_or_fetch_sequences`]; the session
//! mechanics live behind the [`JobCatalog`] trait.

pub mod wamp;

use async_trait::async_trait;
use std::ops::Range;
use std::path::Path;
use thiserror::Error;

use crate::config::{load_sequences, save_sequences};
use crate::error::{CatalogError, ConfigError};
use crate::models::Sequence;

pub use wamp::WampCatalogClient;

/// Source of sequence records keyed by integer id.
#[async_trait]
pub trait JobCatalog: Send {
    /// Fetch one record per id in `range`, in id order.
    async fn fetch_sequences(&mut self, range: Range<i64>) -> Result<Vec<Sequence>, CatalogError>;
}

/// Failure to produce the batch's sequence list.
#[derive(Error, Debug)]
pub enum SequenceListError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Cache(#[from] ConfigError),
}

/// Return the cached list at `path`, or fetch `range` from `catalog` and cache it.
///
/// An existing cache wins outright: the catalog is never contacted and
/// `range` is ignored.
pub async fn load_or_fetch_sequences<C: JobCatalog + ?Sized>(
    path: &Path,
    catalog: &mut C,
    range: Range<i64>,
) -> Result<Vec<Sequence>, SequenceListError> {
    if path.is_file() {
        let sequences = load_sequences(path)?;
        log::info!(
            "[Catalog] Reusing {} cached sequences from {}",
            sequences.len(),
            path.display()
        );
        return Ok(sequences);
    }

    log::info!(
        "[Catalog] No cached list at {}, querying ids {}..{}",
        path.display(),
        range.start,
        range.end
    );
    let sequences = catalog.fetch_sequences(range).await?;
    save_sequences(path, &sequences)?;
    log::info!("[Catalog] Cached {} sequences", sequences.len());
    Ok(sequences)
}
