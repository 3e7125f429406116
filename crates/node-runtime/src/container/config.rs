//! # Node Configuration
//!
//! Unified configuration for the sync node, loaded from environment
//! variables.
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `QC_PEERS` | (required) | Comma-separated `name=url` or `url` entries |
//! | `QC_DATA_DIR` | `./data` | Storage directory |
//! | `QC_STORAGE_BACKEND` | `memory` | `memory` or `rocksdb` |
//! | `QC_SYNC_POOL_SIZE` | `300` | Concurrent sync workers |
//! | `QC_SYNC_CHECK_INTERVAL_SECS` | `30` | Control loop check period |
//! | `QC_SYNC_FETCH_TIMEOUT_SECS` | `60` | Node API request timeout |
//! | `QC_SYNC_RETRY_INTERVAL_SECS` | `10` | Pause between retries |
//! | `QC_WATCH_INTERVAL_SECS` | `5` | Peer height poll period |
//! | `QC_SYNC_MAX_RESPONSE_BYTES` | `16777216` | Largest block response accepted from a peer |
//! | `QC_NODE_INFO_INTERVAL_SECS` | `5` | Node info refresh period |

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use qc_18_block_sync::SyncConfig;
use quantum_telemetry::TelemetryConfig;
use shared_types::PeerAddress;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A `QC_PEERS` entry could not be parsed.
    #[error("Invalid peer entry `{0}`: expected `name=http://host:port` or `http://host:port`")]
    InvalidPeer(String),

    /// A numeric variable holds something else.
    #[error("{var} must be a non-negative integer, got `{value}`")]
    InvalidNumber {
        /// Variable name
        var: &'static str,
        /// Raw value
        value: String,
    },

    /// `QC_STORAGE_BACKEND` names an unknown backend.
    #[error("Unknown storage backend `{0}` (expected `memory` or `rocksdb`)")]
    UnknownBackend(String),

    /// The binary was built without the requested backend.
    #[error("Storage backend `{0}` is not compiled in; rebuild with `--features {0}`")]
    BackendUnavailable(StorageBackend),

    /// There is nobody to sync from.
    #[error("No peers configured. Set QC_PEERS.")]
    NoPeers,

    /// The sync settings are unusable.
    #[error(transparent)]
    Sync(#[from] qc_18_block_sync::ConfigError),
}

/// Complete node configuration.
#[derive(Debug, Clone, Default)]
pub struct NodeConfig {
    /// Network configuration.
    pub network: NetworkConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Block sync configuration.
    pub sync: SyncConfig,
    /// Logging and metrics configuration.
    pub telemetry: TelemetryConfig,
}

/// A peer to connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSpec {
    /// Name the peer is known by.
    pub address: PeerAddress,
    /// Base URL of its node API.
    pub endpoint: String,
}

impl FromStr for PeerSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (name, endpoint) = match s.split_once('=') {
            Some((name, endpoint)) => (name.trim(), endpoint.trim()),
            None => (s, s),
        };
        let valid_scheme = endpoint.starts_with("http://") || endpoint.starts_with("https://");
        if name.is_empty() || !valid_scheme {
            return Err(ConfigError::InvalidPeer(s.to_string()));
        }
        Ok(Self {
            address: PeerAddress::new(name),
            endpoint: endpoint.to_string(),
        })
    }
}

/// Network configuration.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Peers to sync from.
    pub peers: Vec<PeerSpec>,
    /// Node info refresh period in seconds.
    pub node_info_interval_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            peers: Vec::new(),
            node_info_interval_secs: 5,
        }
    }
}

/// Block store implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackend {
    /// Volatile in-memory store.
    #[default]
    Memory,
    /// RocksDB under `data_dir` (requires the `rocksdb` feature).
    RocksDb,
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageBackend::Memory => f.write_str("memory"),
            StorageBackend::RocksDb => f.write_str("rocksdb"),
        }
    }
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "rocksdb" => Ok(StorageBackend::RocksDb),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Data directory for block storage.
    pub data_dir: PathBuf,
    /// Which store to use.
    pub backend: StorageBackend,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            backend: StorageBackend::Memory,
        }
    }
}

fn parse_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<u64>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
    }
}

impl NodeConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.telemetry = TelemetryConfig::from_env();
        Ok(config)
    }

    /// Load configuration through `lookup`, starting from defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(peers) = lookup("QC_PEERS") {
            config.network.peers = peers
                .split(',')
                .filter(|entry| !entry.trim().is_empty())
                .map(str::parse)
                .collect::<Result<_, _>>()?;
        }
        if let Some(dir) = lookup("QC_DATA_DIR") {
            config.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(backend) = lookup("QC_STORAGE_BACKEND") {
            config.storage.backend = backend.parse()?;
        }

        if let Some(size) = parse_secs(&lookup, "QC_SYNC_POOL_SIZE")? {
            config.sync.pool_size = size as usize;
        }
        if let Some(secs) = parse_secs(&lookup, "QC_SYNC_CHECK_INTERVAL_SECS")? {
            config.sync.check_interval_ms = secs.saturating_mul(1000);
        }
        if let Some(secs) = parse_secs(&lookup, "QC_SYNC_FETCH_TIMEOUT_SECS")? {
            config.sync.fetch_timeout_ms = secs.saturating_mul(1000);
        }
        if let Some(secs) = parse_secs(&lookup, "QC_SYNC_RETRY_INTERVAL_SECS")? {
            config.sync.retry_interval_ms = secs.saturating_mul(1000);
        }
        if let Some(secs) = parse_secs(&lookup, "QC_WATCH_INTERVAL_SECS")? {
            config.sync.watch_interval_ms = secs.saturating_mul(1000);
        }
        if let Some(bytes) = parse_secs(&lookup, "QC_SYNC_MAX_RESPONSE_BYTES")? {
            config.sync.max_response_bytes = bytes as usize;
        }
        if let Some(secs) = parse_secs(&lookup, "QC_NODE_INFO_INTERVAL_SECS")? {
            config.network.node_info_interval_secs = secs;
        }

        Ok(config)
    }

    /// Check the configuration can run a node.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.peers.is_empty() {
            return Err(ConfigError::NoPeers);
        }
        if self.network.node_info_interval_secs == 0 {
            return Err(ConfigError::InvalidNumber {
                var: "QC_NODE_INFO_INTERVAL_SECS",
                value: "0".to_string(),
            });
        }
        self.sync.validate()?;
        if self.storage.backend == StorageBackend::RocksDb && !cfg!(feature = "rocksdb") {
            return Err(ConfigError::BackendUnavailable(StorageBackend::RocksDb));
        }
        Ok(())
    }

    /// Node info refresh period.
    pub fn node_info_interval(&self) -> Duration {
        Duration::from_secs(self.network.node_info_interval_secs)
    }
}
