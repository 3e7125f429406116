//! # Sync Container
//!
//! Builds the block sync pipeline from a `NodeConfig` and holds the
//! instances for the runtime.
//!
//! ## Initialization Order
//!
//! ```text
//! 1. Block store (memory or RocksDB)
//! 2. Peer table with one HttpNodeClient per configured peer
//! 3. Fetcher + Validator
//! 4. Syncer (spawns its worker pool)
//! 5. Watcher + node info refresher
//! ```

use std::sync::Arc;

use qc_18_block_sync::{
    BlockStore, ClientError, Fetcher, HttpNodeClient, InMemoryBlockStore, PeerTable, StoreError,
    Syncer, Validator, Watcher,
};
use thiserror::Error;
use tracing::info;

use crate::adapters::NodeInfoRefresher;
use crate::container::config::{ConfigError, NodeConfig, StorageBackend};

/// Failures while assembling the node.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// The configuration is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A peer endpoint could not be turned into a client.
    #[error("Cannot create client for peer {peer}: {source}")]
    Client {
        /// Peer name
        peer: String,
        /// Client failure
        #[source]
        source: ClientError,
    },

    /// The block store could not be opened.
    #[error("Cannot open block store: {0}")]
    Storage(#[from] StoreError),
}

/// All sync components of a running node.
pub struct SyncContainer {
    /// Persistent block store shared with the validator.
    pub store: Arc<dyn BlockStore>,
    /// Connected peers and their node info.
    pub peers: Arc<PeerTable>,
    /// The sync orchestrator.
    pub syncer: Arc<Syncer>,
    /// Network height watcher feeding the syncer.
    pub watcher: Arc<Watcher>,
    /// Node info poller feeding the peer table.
    pub refresher: Arc<NodeInfoRefresher>,
}

impl SyncContainer {
    /// Validate `config`, open its block store and wire the pipeline.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(config: &NodeConfig) -> Result<Self, ContainerError> {
        config.validate()?;
        let store = open_store(config)?;
        Self::with_store(config, store)
    }

    /// Wire the pipeline over an existing store.
    pub fn with_store(
        config: &NodeConfig,
        store: Arc<dyn BlockStore>,
    ) -> Result<Self, ContainerError> {
        let timeout = config.sync.fetch_timeout();

        let peers = Arc::new(PeerTable::new());
        for spec in &config.network.peers {
            let client = HttpNodeClient::new(spec.endpoint.clone(), timeout)
                .map_err(|source| ContainerError::Client {
                    peer: spec.address.to_string(),
                    source,
                })?
                .with_max_body(config.sync.max_response_bytes);
            peers.connect(spec.address.clone(), Arc::new(client));
        }

        let fetcher = Arc::new(Fetcher::new(peers.clone(), timeout));
        let validator = Arc::new(Validator::new(store.clone()));
        let syncer = Arc::new(
            Syncer::new(config.sync.clone(), fetcher, validator, store.clone())
                .map_err(ConfigError::from)?,
        );

        let watcher = Arc::new(Watcher::new(
            peers.clone(),
            Arc::new(syncer.handle()),
            config.sync.watch_interval(),
        ));
        let refresher = Arc::new(NodeInfoRefresher::new(
            peers.clone(),
            config.node_info_interval(),
            timeout,
        ));

        info!(
            "[qc-18] Sync pipeline ready: {} peers, pool size {}",
            peers.len(),
            config.sync.pool_size
        );

        Ok(Self {
            store,
            peers,
            syncer,
            watcher,
            refresher,
        })
    }
}

fn open_store(config: &NodeConfig) -> Result<Arc<dyn BlockStore>, ContainerError> {
    match config.storage.backend {
        StorageBackend::Memory => {
            info!("[qc-18] Using in-memory block store");
            Ok(Arc::new(InMemoryBlockStore::new()))
        }
        #[cfg(feature = "rocksdb")]
        StorageBackend::RocksDb => {
            use crate::adapters::storage::{RocksDbBlockStore, RocksDbConfig};

            let path = config.storage.data_dir.join("blocks");
            info!("[qc-18] Opening RocksDB block store at {}", path.display());
            Ok(Arc::new(RocksDbBlockStore::open(RocksDbConfig::at(path))?))
        }
        #[cfg(not(feature = "rocksdb"))]
        StorageBackend::RocksDb => Err(ConfigError::BackendUnavailable(StorageBackend::RocksDb).into()),
    }
}
