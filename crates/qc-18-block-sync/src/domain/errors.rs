//! # Domain Errors
//!
//! Error types for Block Sync.
//!
//! ## Taxonomy
//!
//! | Class | Variants | Handling in `work` |
//! |-------|----------|--------------------|
//! | Transient fetch | `Client`, `NoPeers`, `NoConnection`, `MalformedStream` | retried |
//! | Not yet produced | `NotFound` | retried, logged at debug |
//! | Validation | `Validation`, `Storage` | retried |
//! | Already exists | `StoreError::AlreadyExists` | swallowed by the validator |
//! | Lifecycle | `PoolFinished`, `Cancelled`, `Stopped` | ends the caller |

use std::fmt;

use shared_types::{Hash, PeerAddress};
use thiserror::Error;

/// Block sync error types.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The worker pool has begun shutting down.
    #[error("Worker pool is finished")]
    PoolFinished,

    /// The shared shutdown signal fired before the operation completed.
    #[error("Operation cancelled by shutdown")]
    Cancelled,

    /// The syncer control loop is not running (never started or stopped).
    #[error("Syncer is not running")]
    Stopped,

    /// No connected peer is eligible to serve this height.
    #[error("No connected peers available for height {height}")]
    NoPeers {
        /// Height being fetched
        height: u64,
    },

    /// The connection manager listed a peer but has no client for it.
    #[error("No connection to peer {peer}")]
    NoConnection {
        /// Peer that was selected
        peer: PeerAddress,
    },

    /// The peer has not produced this height yet (HTTP 404).
    #[error("Block {height} not found on peer {peer}")]
    NotFound {
        /// Height being fetched
        height: u64,
        /// Peer that answered
        peer: PeerAddress,
    },

    /// Network, timeout or HTTP status failure talking to a peer.
    #[error("Fetching block {height} from {peer} failed: {source}")]
    Client {
        /// Height being fetched
        height: u64,
        /// Peer that was asked
        peer: PeerAddress,
        /// Underlying client failure
        #[source]
        source: ClientError,
    },

    /// The response stream was undecodable or incomplete.
    #[error("Malformed block stream for height {height}: {reason}")]
    MalformedStream {
        /// Height being fetched
        height: u64,
        /// What was wrong
        reason: String,
    },

    /// The rule set rejected the fetched height.
    #[error("Block {height} rejected: {source}")]
    Validation {
        /// Height being validated
        height: u64,
        /// Violated rule
        #[source]
        source: RuleViolation,
    },

    /// The block store failed while checking or persisting a height.
    #[error("Storage error at height {height}: {source}")]
    Storage {
        /// Height being persisted
        height: u64,
        /// Store failure
        #[source]
        source: StoreError,
    },
}

impl SyncError {
    /// Whether the peer simply has not produced the height yet.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound { .. })
    }

    /// Whether the error ends the caller rather than triggering a retry.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncError::PoolFinished | SyncError::Cancelled | SyncError::Stopped
        )
    }

    /// Whether the failure happened while fetching (vs. validating/persisting).
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            SyncError::NoPeers { .. }
                | SyncError::NoConnection { .. }
                | SyncError::NotFound { .. }
                | SyncError::Client { .. }
                | SyncError::MalformedStream { .. }
        )
    }

    /// Label used for the fetch failure counter.
    pub fn metric_reason(&self) -> &'static str {
        match self {
            SyncError::NotFound { .. } => "not_found",
            SyncError::Client {
                source: ClientError::Timeout,
                ..
            } => "timeout",
            SyncError::Client { .. } => "network",
            SyncError::MalformedStream { .. } => "malformed",
            SyncError::NoPeers { .. } | SyncError::NoConnection { .. } => "no_peers",
            SyncError::Validation { .. } => "validation",
            SyncError::Storage { .. } => "storage",
            SyncError::PoolFinished | SyncError::Cancelled | SyncError::Stopped => "shutdown",
        }
    }
}

/// Failures of the node API client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// HTTP 404: the requested height does not exist on the peer yet.
    #[error("Not found")]
    NotFound,

    /// Any other non-success HTTP status.
    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    /// The request exceeded the configured timeout.
    #[error("Request timed out")]
    Timeout,

    /// Connection refused, reset, DNS failure and similar.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The body could not be read or decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The response body exceeded the client's size limit.
    #[error("Response body exceeds {limit} bytes")]
    BodyTooLarge {
        /// Configured limit in bytes
        limit: usize,
    },
}

/// Kind of entity a store write refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    /// A block, keyed by height.
    Block,
    /// A transaction, keyed by hash.
    Transaction,
    /// An operation, keyed by hash.
    Operation,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Block => f.write_str("block"),
            EntityKind::Transaction => f.write_str("transaction"),
            EntityKind::Operation => f.write_str("operation"),
        }
    }
}

/// Block store failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The entity is already persisted; a concurrent writer won the race.
    #[error("{kind} {key} already exists")]
    AlreadyExists {
        /// What was being written
        kind: EntityKind,
        /// Height or hash of the entity
        key: String,
    },

    /// The storage engine failed.
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// A stored value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Whether this is the distinguished "already exists" condition.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }
}

/// Reasons a rule set rejects a fetched height.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleViolation {
    /// No block was fetched.
    #[error("Block is missing")]
    MissingBlock,

    /// The block is for a different height than requested.
    #[error("Height mismatch: expected {expected}, got {actual}")]
    HeightMismatch {
        /// Requested height
        expected: u64,
        /// Height in the block
        actual: u64,
    },

    /// The block hash does not match its contents.
    #[error("Block hash mismatch at height {height}")]
    BlockHashMismatch {
        /// Block height
        height: u64,
    },

    /// A transaction hash does not match its contents.
    #[error("Transaction hash mismatch: {hash}")]
    TransactionHashMismatch {
        /// Claimed hash
        hash: Hash,
    },

    /// An operation hash does not match its contents.
    #[error("Operation hash mismatch: {hash}")]
    OperationHashMismatch {
        /// Claimed hash
        hash: Hash,
    },

    /// A transaction listed by the block is absent.
    #[error("Transaction {hash} listed by the block is missing")]
    MissingTransaction {
        /// Listed hash
        hash: Hash,
    },

    /// An operation listed by a transaction is absent.
    #[error("Operation {hash} listed by a transaction is missing")]
    MissingOperation {
        /// Listed hash
        hash: Hash,
    },

    /// A transaction is present that the block does not list.
    #[error("Transaction {hash} is not part of the block")]
    UnexpectedTransaction {
        /// Unlisted hash
        hash: Hash,
    },

    /// An operation is present that no listed transaction references.
    #[error("Operation {hash} is not referenced by any transaction of the block")]
    UnexpectedOperation {
        /// Unreferenced hash
        hash: Hash,
    },

    /// An operation does not point back at its transaction, or disagrees
    /// with it on source, sequence or position.
    #[error("Operation {hash} is not linked to its transaction")]
    OperationLinkMismatch {
        /// Operation hash
        hash: Hash,
    },

    /// The previous block is stored and its hash differs from `prev_block_hash`.
    #[error("Block at height {height} does not extend the stored chain")]
    ParentMismatch {
        /// Block height
        height: u64,
    },

    /// Rejection by a pluggable rule set, with its own reason.
    #[error("Rejected: {0}")]
    Rejected(String),
}
