//! # Inbound Ports
//!
//! API trait defining what the Block Sync subsystem offers to the rest of
//! the node (the watcher, admin surfaces, tests).

use async_trait::async_trait;
use shared_types::PeerAddress;

use crate::domain::{SyncError, SyncProgress};

/// Block Sync API - inbound port.
///
/// Both calls are round trips to the syncer's control loop. Callers that
/// need a deadline wrap the future in `tokio::time::timeout`.
#[async_trait]
pub trait SyncApi: Send + Sync {
    /// Raise the target height.
    ///
    /// A height at or below the current target is accepted and ignored.
    /// `peers` are the peers that reported the height; they scope which
    /// peers are consulted for the new range.
    async fn set_sync_target_block(
        &self,
        height: u64,
        peers: Vec<PeerAddress>,
    ) -> Result<(), SyncError>;

    /// Snapshot of the current progress.
    async fn sync_progress(&self) -> Result<SyncProgress, SyncError>;
}
