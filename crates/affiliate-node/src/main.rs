//! # Affiliate Node
//!
//! Service entry point. See the library crate for the startup sequence.

use affiliate_node::{AffiliateNode, NodeConfig};
use affiliate_telemetry::{init_telemetry, TelemetryConfig};
use anyhow::{Context, Result};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = TelemetryConfig::from_env();
    let _guard = init_telemetry(&telemetry).context("failed to initialize telemetry")?;

    let config = NodeConfig::from_env().context("invalid configuration")?;

    let mut node = AffiliateNode::new(config)
        .await
        .context("failed to initialize affiliate node")?;
    node.start().await.context("failed to start affiliate node")?;

    info!("Affiliate node is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    node.shutdown().await.context("unclean shutdown")?;
    Ok(())
}
