//! # QC-18 Block Sync
//!
//! Catch-up synchronization for a node that has fallen behind the network.
//!
//! **Subsystem ID:** 18
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! Fetch missing heights from peers, check each one independently and
//! persist it durably and idempotently, while ordinary block production
//! keeps committing heights on its own.
//!
//! ## Pipeline
//!
//! ```text
//! Watcher ──set_sync_target_block──► Syncer (control loop, owns progress)
//!                                       │ try_add(work(h))
//!                                       ▼
//!                                     Pool ── worker: Fetcher ──► Validator ──► BlockStore
//! ```
//!
//! | Component | Role |
//! |-----------|------|
//! | `Pool` | Bounded workers; non-blocking submission sheds load |
//! | `Fetcher` | One height from one peer over the node API |
//! | `Validator` | Rule check, then atomic idempotent persist |
//! | `Syncer` | Single-owner progress, schedules heights, retries forever |
//! | `Watcher` | Polls peer heights, raises the target |
//!
//! ## Module Structure
//!
//! ```text
//! qc-18-block-sync/
//! ├── domain/          # SyncInfo, SyncProgress, errors, invariants
//! ├── algorithms/      # Stream codec, watermark, peer selection, structural rules
//! ├── ports/           # SyncApi (inbound) + fetch/validate/store/network traits (outbound)
//! ├── application/     # Pool, Fetcher, Validator, Syncer, Watcher
//! ├── adapters/        # HTTP node client, peer table, in-memory store
//! └── config.rs        # SyncConfig
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-exports
pub use adapters::{HttpNodeClient, InMemoryBlockStore, PeerTable, StoreSnapshot};
pub use algorithms::{
    compute_watermark, encode_block_stream, encode_error_stream, parse_block_stream, BlockBundle,
    RandomPeerSelector, RoundRobinPeerSelector, StreamItem, StructuralRules, Watermark,
};
pub use application::{
    shutdown_channel, Fetcher, Pool, ShutdownSignal, ShutdownTrigger, Syncer, SyncerHandle,
    Validator, Watcher,
};
pub use config::{ConfigError, SyncConfig};
pub use domain::{
    ClientError, EntityKind, RuleViolation, StoreError, SyncError, SyncInfo, SyncProgress,
    SyncResponse, SyncState, DEFAULT_MAX_RESPONSE_BYTES, DEFAULT_POOL_SIZE,
};
pub use ports::{
    BlockFetcher, BlockRules, BlockStore, BlockValidator, ConnectionManager, NodeClient,
    PeerSelector, StoreBatch, SyncApi,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
