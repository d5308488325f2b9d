//! # Telemetry Gateway Node
//!
//! Loads the configuration, starts a [`NodeRuntime`] and runs until Ctrl+C.
//!
//! The configuration path comes from `TG_CONFIG` or the first argument.
//! Without either the node starts with defaults.

use anyhow::{Context, Result};
use node_runtime::{LatestValueStore, NodeConfig, NodeRuntime, CONFIG_PATH_ENV};
use std::path::PathBuf;
use std::sync::Arc;
use tg_telemetry::{init_telemetry, TelemetryConfig};
use tracing::info;

fn config_path() -> Option<PathBuf> {
    std::env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .or_else(|| std::env::args_os().nth(1).map(PathBuf::from))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_telemetry(&TelemetryConfig::from_env()).context("Failed to initialize telemetry")?;

    let path = config_path();
    let config = NodeConfig::load(path.as_deref()).context("Failed to load configuration")?;

    let store = Arc::new(LatestValueStore::new());
    let runtime = NodeRuntime::start(config, store.clone(), store).await?;

    info!("[node] Node is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    runtime.shutdown().await;
    Ok(())
}
