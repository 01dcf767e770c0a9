//! driftd: run one driftkv node.
//!
//! Usage: `driftd [config.json]`. With no argument the node starts
//! standalone with defaults. On ctrl-c it stops serving and attempts both
//! final snapshots.

use std::path::Path;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use drift_cluster::RunningNode;
use drift_core::NodeConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => NodeConfig::load(Path::new(&path))
            .with_context(|| format!("loading config from {path}"))?,
        None => NodeConfig::default(),
    };

    let node = RunningNode::start(config).await.context("starting node")?;
    tracing::info!(addr = %node.addr(), "serving; ctrl-c to stop");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("shutting down");
    node.shutdown().await;
    Ok(())
}
