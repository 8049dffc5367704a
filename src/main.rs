use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;

use recon_batch::config::load_run_config;
use recon_batch::{
    load_or_fetch_sequences, BridgeEngine, LogCollector, Orchestrator, WampCatalogClient,
    DEFAULT_CONFIG_FILE, VERSION,
};

/// Reconstruct every sequence in `[start, end)` that is not already complete.
#[derive(Parser, Debug)]
#[command(name = "recon_batch", version)]
struct Args {
    /// First sequence id to query from the catalog
    start: i64,

    /// One past the last sequence id
    end: i64,

    /// Run configuration (missing file means all defaults)
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = load_run_config(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    // =========================================================================
    // LOGGING - MUST BE FIRST AFTER CONFIG
    // =========================================================================
    let log_collector = LogCollector::new(&config.paths.log_path(), true)
        .map_err(anyhow::Error::msg)
        .context("starting log collector")?;
    if let Err(e) = log_collector.install(log::LevelFilter::Info) {
        eprintln!("[Main] WARNING: Failed to set LogCollector as global logger: {}", e);
    }
    log::info!("[Main] recon_batch {} (log: {})", VERSION, log_collector.log_path().display());

    let result = run(args, config).await;
    if let Err(e) = &result {
        log::error!("[Main] Fatal: {:#}", e);
    }

    if let Err(e) = log_collector.wait_for_empty().await {
        eprintln!("[Main] WARNING: Failed to flush logs: {}", e);
    }
    result
}

async fn run(args: Args, config: recon_batch::RunConfig) -> anyhow::Result<()> {
    // =========================================================================
    // SEQUENCE LIST - CACHED OR FROM THE CATALOG
    // =========================================================================
    let mut catalog = WampCatalogClient::new(config.catalog.clone());
    let sequences = load_or_fetch_sequences(
        &config.paths.sequences_path(),
        &mut catalog,
        args.start..args.end,
    )
    .await
    .context("obtaining the sequence list")?;

    // =========================================================================
    // INTERRUPT HANDLING
    // =========================================================================
    let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("[Main] Interrupt received, stopping after cleanup");
            let _ = cancel_tx.send(true);
        }
    });

    // =========================================================================
    // ENGINE + BATCH
    // =========================================================================
    let mut engine = BridgeEngine::spawn(&config.engine).context("starting the engine bridge")?;
    let orchestrator = Orchestrator::new(config, cancel_rx).context("building the fetcher")?;

    let report = orchestrator.process(&mut engine, &sequences).await;

    if let Err(e) = engine.shutdown().await {
        log::warn!("[Main] Engine bridge did not shut down cleanly: {}", e);
    }

    for failure in &report.failed {
        log::warn!(
            "[Main] #{} '{}' failed at {} ({}): {}",
            failure.id,
            failure.name,
            failure.stage.as_str(),
            failure.kind,
            failure.error
        );
    }
    Ok(())
}
