//! # Outbound Ports
//!
//! Traits for the collaborators Block Sync depends on: the fetch and
//! validate stages driven by the syncer, the block store, the rule set,
//! the connection manager and the node API client.

use std::sync::Arc;

use async_trait::async_trait;
use shared_types::{Block, BlockMode, HeightRange, NodeInfo, Operation, PeerAddress, Transaction};

use crate::domain::{ClientError, RuleViolation, StoreError, SyncError, SyncInfo};

// =============================================================================
// PIPELINE STAGES
// =============================================================================

/// Retrieves one height's block, transactions and operations from a peer.
#[async_trait]
pub trait BlockFetcher: Send + Sync {
    /// Fetch the height described by `info`.
    ///
    /// `info` is never modified; on success a populated copy is returned,
    /// so a failed call can be re-issued with the same input.
    async fn fetch(&self, info: &SyncInfo) -> Result<SyncInfo, SyncError>;

    /// Fetch as the `attempt`-th try (0-based) for this height, letting
    /// implementations rotate peers on retries.
    async fn fetch_attempt(&self, info: &SyncInfo, attempt: u32) -> Result<SyncInfo, SyncError> {
        let _ = attempt;
        self.fetch(info).await
    }
}

/// Checks a fetched height and persists it idempotently.
#[async_trait]
pub trait BlockValidator: Send + Sync {
    /// Validate and persist `info`. Succeeds without work when the height
    /// is already stored.
    async fn validate(&self, info: &SyncInfo) -> Result<(), SyncError>;
}

// =============================================================================
// STORAGE
// =============================================================================

/// Block store - outbound port.
///
/// Synchronous like the storage engines behind it. Implementations must be
/// safe to share between workers.
pub trait BlockStore: Send + Sync {
    /// Highest stored block, `None` on an empty store.
    fn latest_block(&self) -> Result<Option<Block>, StoreError>;

    /// Whether a block is stored at `height`.
    fn exists_block_by_height(&self, height: u64) -> Result<bool, StoreError>;

    /// Block stored at `height`, if any.
    fn block_by_height(&self, height: u64) -> Result<Option<Block>, StoreError>;

    /// Start an atomic write batch.
    fn begin(&self) -> Box<dyn StoreBatch + '_>;
}

/// Atomic write batch over a `BlockStore`.
///
/// Each `save_*` reports `StoreError::AlreadyExists` when the entity is
/// already stored or staged; nothing is visible until `commit`.
pub trait StoreBatch: Send {
    /// Stage an operation.
    fn save_operation(&mut self, operation: &Operation) -> Result<(), StoreError>;

    /// Stage a transaction.
    fn save_transaction(&mut self, transaction: &Transaction) -> Result<(), StoreError>;

    /// Stage a block.
    fn save_block(&mut self, block: &Block) -> Result<(), StoreError>;

    /// Apply every staged write at once.
    ///
    /// Returns `StoreError::AlreadyExists` and writes nothing if the staged
    /// block's height was persisted by another writer after staging.
    fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Pluggable block acceptance rules.
pub trait BlockRules: Send + Sync {
    /// Accept or reject a populated `SyncInfo`. `store` gives read access
    /// to already persisted blocks.
    fn check(&self, info: &SyncInfo, store: &dyn BlockStore) -> Result<(), RuleViolation>;
}

// =============================================================================
// NETWORK
// =============================================================================

/// Client for one peer's node API - outbound port.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Fetch the newline-delimited block stream for `range`.
    async fn get_blocks(&self, range: HeightRange, mode: BlockMode) -> Result<String, ClientError>;

    /// Fetch the peer's self-reported node info.
    async fn node_info(&self) -> Result<NodeInfo, ClientError>;
}

/// Connection manager - outbound port.
pub trait ConnectionManager: Send + Sync {
    /// Currently connected peers, in a stable order.
    fn all_connected(&self) -> Vec<PeerAddress>;

    /// Client for a connected peer.
    fn get_connection(&self, peer: &PeerAddress) -> Option<Arc<dyn NodeClient>>;

    /// Last node info received from a peer, if any.
    fn get_node(&self, peer: &PeerAddress) -> Option<NodeInfo>;
}

/// Picks the peer to ask for a height.
pub trait PeerSelector: Send + Sync {
    /// Choose one of `candidates` to serve `height` on the given retry
    /// `attempt` (0-based). Returns `None` only when `candidates` is empty.
    fn select<'a>(
        &self,
        candidates: &'a [PeerAddress],
        height: u64,
        attempt: u32,
    ) -> Option<&'a PeerAddress>;
}
