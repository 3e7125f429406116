//! # Node Runtime Library
//!
//! Wiring for a sync-only Quantum-Chain node. The `node-runtime` binary
//! loads a `NodeConfig`, builds a `NodeRuntime` and runs it until Ctrl+C.
//!
//! ## Task Layout
//!
//! ```text
//! NodeInfoRefresher ──node info──► PeerTable ◄── Watcher ──target──► Syncer ──► Pool
//!                                                                        │
//!                                                                        ▼
//!                                                                   BlockStore
//! ```
//!
//! One shutdown trigger stops the watcher, the refresher and the metrics
//! endpoint; the syncer is then stopped, which cancels and drains its pool.

#![warn(missing_docs)]

pub mod adapters;
pub mod container;

use std::net::SocketAddr;
use std::sync::Arc;

use qc_18_block_sync::{shutdown_channel, ShutdownTrigger, SyncApi, SyncProgress};
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub use container::{ConfigError, ContainerError, NodeConfig, SyncContainer};

/// A running sync node.
pub struct NodeRuntime {
    container: SyncContainer,
    metrics_port: u16,
    trigger: ShutdownTrigger,
    tasks: Vec<JoinHandle<()>>,
}

impl NodeRuntime {
    /// Build every component from `config`.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(config: NodeConfig) -> Result<Self, ContainerError> {
        info!("Creating Quantum-Chain sync node runtime");
        let container = SyncContainer::new(&config)?;
        Ok(Self::from_container(container, config.telemetry.metrics_port))
    }

    /// Run an already wired container. A `metrics_port` of 0 disables the
    /// metrics endpoint.
    pub fn from_container(container: SyncContainer, metrics_port: u16) -> Self {
        let (trigger, _) = shutdown_channel();
        Self {
            container,
            metrics_port,
            trigger,
            tasks: Vec::new(),
        }
    }

    /// The wired components.
    pub fn container(&self) -> &SyncContainer {
        &self.container
    }

    /// Current sync progress.
    pub async fn progress(&self) -> Option<SyncProgress> {
        self.container.syncer.handle().sync_progress().await.ok()
    }

    /// Spawn the syncer loop, watcher, node info refresher and metrics
    /// endpoint.
    pub fn start(&mut self) {
        info!("Starting block sync");

        let syncer = Arc::clone(&self.container.syncer);
        self.tasks.push(tokio::spawn(async move {
            if let Err(e) = syncer.start().await {
                warn!("[qc-18] Sync loop did not start: {}", e);
            }
        }));

        let refresher = Arc::clone(&self.container.refresher);
        let signal = self.trigger.subscribe();
        self.tasks
            .push(tokio::spawn(async move { refresher.run(signal).await }));

        let watcher = Arc::clone(&self.container.watcher);
        let signal = self.trigger.subscribe();
        self.tasks
            .push(tokio::spawn(async move { watcher.run(signal).await }));

        if self.metrics_port != 0 {
            let addr = SocketAddr::from(([0, 0, 0, 0], self.metrics_port));
            let signal = self.trigger.subscribe();
            self.tasks.push(tokio::spawn(async move {
                if let Err(e) = adapters::serve_metrics(addr, signal).await {
                    warn!("Metrics endpoint on {} failed: {}", addr, e);
                }
            }));
        }
    }

    /// Stop every task and wait for them to exit.
    pub async fn shutdown(self) {
        info!("Initiating graceful shutdown...");

        self.trigger.fire();
        self.container.syncer.stop().await;

        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("Runtime task ended abnormally: {}", e);
            }
        }
        info!("Shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::PeerSpec;
    use qc_18_block_sync::test_utils::{chain_fixture, ChainNodeClient};
    use qc_18_block_sync::{BlockStore, InMemoryBlockStore, SyncConfig};
    use shared_types::PeerAddress;
    use std::time::Duration;

    fn test_config() -> NodeConfig {
        let mut config = NodeConfig::default();
        config.sync = SyncConfig::for_testing();
        config.network.peers = vec!["a=http://127.0.0.1:1".parse::<PeerSpec>().unwrap()];
        config.telemetry.metrics_port = 0;
        config
    }

    #[tokio::test]
    async fn test_start_and_shutdown_with_unreachable_peer() {
        let mut runtime = NodeRuntime::new(test_config()).unwrap();
        runtime.start();
        tokio::time::sleep(Duration::from_millis(50)).await;

        tokio::time::timeout(Duration::from_secs(5), runtime.shutdown())
            .await
            .expect("shutdown hung");
    }

    #[tokio::test]
    async fn test_shutdown_without_start() {
        let runtime = NodeRuntime::new(test_config()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), runtime.shutdown())
            .await
            .expect("shutdown hung");
    }

    #[tokio::test]
    async fn test_runtime_syncs_from_in_process_peer() {
        let config = test_config();
        let chain = chain_fixture(6);
        let store = Arc::new(InMemoryBlockStore::new());
        store.insert_bundle(&chain[0]);

        let container = SyncContainer::with_store(&config, store.clone()).unwrap();
        // Swap the HTTP client for one serving the chain in process
        container.peers.connect(
            PeerAddress::from("a"),
            Arc::new(ChainNodeClient::new(chain).with_address(PeerAddress::from("a"))),
        );

        let mut runtime = NodeRuntime::from_container(container, 0);
        runtime.start();

        let synced = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if store.latest_block().unwrap().map(|b| b.height) == Some(6) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(synced.is_ok(), "node did not catch up");

        let progress = runtime.progress().await.unwrap();
        assert_eq!(progress.highest_block, 6);

        runtime.shutdown().await;
    }
}
