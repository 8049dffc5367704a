//! A cached `sequences.json` fully replaces the catalog exchange.

mod common;

use async_trait::async_trait;
use std::ops::Range;
use tokio::sync::watch;

use common::{RecordingEngine, Workspace};
use recon_batch::config::{load_sequences, save_sequences};
use recon_batch::{load_or_fetch_sequences, CatalogError, JobCatalog, Orchestrator, Sequence};

/// Catalog that counts calls and answers with a fixed list.
struct ScriptedCatalog {
    calls: Vec<Range<i64>>,
}

#[async_trait]
impl JobCatalog for ScriptedCatalog {
    async fn fetch_sequences(&mut self, range: Range<i64>) -> Result<Vec<Sequence>, CatalogError> {
        self.calls.push(range.clone());
        Ok(range.map(|id| Sequence::new(id, format!("Catalog {}", id))).collect())
    }
}

#[tokio::test]
async fn test_cached_list_skips_catalog_and_ignores_range() {
    let ws = Workspace::new();
    let cached: Vec<Sequence> = serde_json::from_str(
        r#"[{"ID": 41, "name": "Cached A", "camera_rig": "north"},
            {"ID": 42, "name": "Cached B"}]"#,
    )
    .unwrap();
    let path = ws.config.paths.sequences_path();
    save_sequences(&path, &cached).unwrap();
    let mut catalog = ScriptedCatalog { calls: Vec::new() };

    let sequences = load_or_fetch_sequences(&path, &mut catalog, 100..200)
        .await
        .unwrap();

    assert!(catalog.calls.is_empty());
    assert_eq!(sequences, cached);

    for sequence in &sequences {
        ws.stage_images(sequence);
    }
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let orchestrator = Orchestrator::new(ws.config.clone(), cancel_rx).unwrap();
    let mut engine = RecordingEngine::new();
    let report = orchestrator.process(&mut engine, &sequences).await;

    assert_eq!(report.completed, vec![41, 42]);
    assert_eq!(engine.count("create_project"), 2);
}

#[tokio::test]
async fn test_first_run_fetches_then_caches() {
    let ws = Workspace::new();
    let path = ws.config.paths.sequences_path();
    let mut catalog = ScriptedCatalog { calls: Vec::new() };

    let fetched = load_or_fetch_sequences(&path, &mut catalog, 7..10)
        .await
        .unwrap();
    let again = load_or_fetch_sequences(&path, &mut catalog, 0..1)
        .await
        .unwrap();

    assert_eq!(catalog.calls, vec![7..10]);
    assert_eq!(fetched.len(), 3);
    assert_eq!(again, fetched);
    assert_eq!(load_sequences(&path).unwrap(), fetched);
}

#[tokio::test]
async fn test_checkpoint_is_the_verbatim_catalog_record() {
    let ws = Workspace::new();
    let record: Sequence =
        serde_json::from_str(r#"{"ID": 9, "name": "Extra Fields", "frames": 120, "tags": ["a"]}"#)
            .unwrap();
    ws.stage_images(&record);
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let orchestrator = Orchestrator::new(ws.config.clone(), cancel_rx).unwrap();
    let mut engine = RecordingEngine::new();

    orchestrator.process(&mut engine, std::slice::from_ref(&record)).await;

    let written = std::fs::read_to_string(ws.path().join("extrafields/data/sequence.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&written).unwrap();
    assert_eq!(
        value,
        serde_json::json!({"ID": 9, "name": "Extra Fields", "frames": 120, "tags": ["a"]})
    );
}
