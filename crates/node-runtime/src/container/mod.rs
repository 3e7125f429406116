//! # Sync Container
//!
//! Node configuration and the wiring of the block sync pipeline.

pub mod config;
pub mod subsystems;

pub use config::{ConfigError, NetworkConfig, NodeConfig, PeerSpec, StorageBackend, StorageConfig};
pub use subsystems::{ContainerError, SyncContainer};
