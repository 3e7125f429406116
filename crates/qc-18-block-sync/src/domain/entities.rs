//! # Domain Entities
//!
//! The unit of sync work and the progress record owned by the control loop.

use serde::{Deserialize, Serialize};
use shared_types::{Block, Operation, PeerAddress, Transaction};

use super::errors::SyncError;

/// Unit of work for one height.
///
/// Created empty except for `height` (and the peers allowed to serve it),
/// populated by the fetcher, consumed by the validator.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncInfo {
    /// Height to sync.
    pub height: u64,
    /// The fetched block, once populated.
    pub block: Option<Block>,
    /// Transactions of the block, in block order.
    pub transactions: Vec<Transaction>,
    /// Operations of those transactions, in transaction order.
    pub operations: Vec<Operation>,
    /// Peers that reported this range; scopes peer selection when non-empty.
    pub peers: Vec<PeerAddress>,
    /// Peer that served the populated data.
    pub source: Option<PeerAddress>,
}

impl SyncInfo {
    /// Create an unpopulated unit of work.
    pub fn new(height: u64, peers: Vec<PeerAddress>) -> Self {
        Self {
            height,
            peers,
            ..Self::default()
        }
    }

    /// Whether the fetcher has filled in a block.
    pub fn is_populated(&self) -> bool {
        self.block.is_some()
    }
}

/// Informal syncer state derived from `SyncProgress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    /// Caught up: `current_block == highest_block`.
    Idle,
    /// Behind: `current_block < highest_block`.
    Syncing,
}

/// Sync progress, owned and mutated only by the syncer control loop.
///
/// `starting_block <= current_block` always; `current_block` and
/// `highest_block` never decrease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncProgress {
    /// Height at which the current sync run started.
    pub starting_block: u64,
    /// Highest height handed to the pool (or found in local storage).
    pub current_block: u64,
    /// Target height reported by the network.
    pub highest_block: u64,
}

impl SyncProgress {
    /// Current informal state.
    pub fn state(&self) -> SyncState {
        if self.current_block < self.highest_block {
            SyncState::Syncing
        } else {
            SyncState::Idle
        }
    }

    /// Heights still to be scheduled.
    pub fn remaining(&self) -> u64 {
        self.highest_block.saturating_sub(self.current_block)
    }

    /// Raise `highest_block`; returns whether it moved.
    pub fn raise_highest(&mut self, height: u64) -> bool {
        if height > self.highest_block {
            self.highest_block = height;
            true
        } else {
            false
        }
    }

    /// Raise `current_block`; returns whether it moved.
    pub fn raise_current(&mut self, height: u64) -> bool {
        if height > self.current_block {
            self.current_block = height;
            true
        } else {
            false
        }
    }
}

/// Outcome of one fetch + validate attempt for a height.
#[derive(Debug)]
pub struct SyncResponse {
    /// Failure, if the attempt failed.
    pub error: Option<SyncError>,
    /// The unit of work, populated when the fetch succeeded.
    pub info: SyncInfo,
}

impl SyncResponse {
    /// Successful attempt.
    pub fn success(info: SyncInfo) -> Self {
        Self { error: None, info }
    }

    /// Failed attempt; `info` is what should be retried.
    pub fn failure(info: SyncInfo, error: SyncError) -> Self {
        Self {
            error: Some(error),
            info,
        }
    }

    /// Whether the attempt succeeded.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
