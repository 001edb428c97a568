// src/main.rs
//! API Sniffer
//!
//! Resumes the persisted event store and writes every export format of the
//! captured log into the configured output directory.

use anyhow::{Context, Result};
use api_sniffer_engine::export::{ExportFormat, Exporter};
use api_sniffer_engine::observability::{init_metrics, init_tracing};
use api_sniffer_engine::recording::{AuthorityService, SqliteStorage, StartMode};
use api_sniffer_engine::utils::config::EngineConfig;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Configuration first: it carries the log level
    let config = EngineConfig::load().context("Failed to load configuration")?;

    init_tracing(&config.observability)?;
    init_metrics()?;

    info!("Starting API Sniffer v{}", api_sniffer_engine::VERSION);
    info!("Configuration loaded: {:?}", config);

    let storage = SqliteStorage::open(&config.storage.path).with_context(|| {
        format!("Failed to open storage at {}", config.storage.path.display())
    })?;
    let authority = AuthorityService::spawn(Arc::new(storage), StartMode::Resume);

    let state = authority.get_state().await?;
    info!(
        "Store resumed: recording={}, paused={}, {} records",
        state.recording, state.paused, state.count
    );

    let logs = authority.get_logs().await?;
    let stats = authority.get_stats().await?;
    info!("\n{}", stats.text_report());

    let mut failures = 0;
    for format in ExportFormat::ALL {
        let written = match Exporter::new(format).export_file(&logs) {
            Ok(file) => file.write_to(&config.export.output_dir).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            error!("{} export failed: {}", format, e);
            failures += 1;
        }
    }

    authority.shutdown();

    if failures > 0 {
        anyhow::bail!("{} of {} exports failed", failures, ExportFormat::ALL.len());
    }
    info!("Exports written to {}", config.export.output_dir.display());
    Ok(())
}
