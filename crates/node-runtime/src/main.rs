//! # Quantum-Chain Sync Node
//!
//! Entry point for a node that catches up with its peers.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration from the environment
//! 2. Initialize telemetry (logging + metrics)
//! 3. Open the block store and connect to the configured peers
//! 4. Start the syncer, watcher and node info refresher
//! 5. Run until Ctrl+C, then shut down gracefully

use anyhow::{Context, Result};
use node_runtime::{NodeConfig, NodeRuntime};
use quantum_telemetry::init_telemetry;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = NodeConfig::from_env().context("Failed to load node configuration")?;

    let _telemetry = init_telemetry(config.telemetry.clone())
        .context("Failed to initialize telemetry")?;

    info!(
        network = %config.telemetry.network,
        peers = config.network.peers.len(),
        backend = %config.storage.backend,
        "Quantum-Chain sync node starting"
    );

    let mut runtime = NodeRuntime::new(config).context("Failed to build node runtime")?;
    runtime.start();

    info!("Node is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    runtime.shutdown().await;
    Ok(())
}
