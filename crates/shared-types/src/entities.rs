//! # Core Chain Entities
//!
//! Blocks, transactions and operations as stored by the node and served by
//! the node API.
//!
//! ## Commitment Structure
//!
//! ```text
//! Block ──hash covers──→ [tx hash, ...]
//!   Transaction ──hash covers──→ [op hash, ...]
//!     Operation ──hash covers──→ (source, sequence_id, index, kind, target, amount)
//! ```
//!
//! `Operation::tx_hash` is a back-reference and is NOT part of the operation
//! hash, otherwise transaction and operation hashes would depend on each other.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::HashParseError;

// =============================================================================
// HASH
// =============================================================================

/// A 32-byte SHA-256 digest, hex encoded on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hash(#[serde(with = "hex::serde")] pub [u8; 32]);

impl Hash {
    /// The all-zero hash (parent of the first block).
    pub const ZERO: Hash = Hash([0u8; 32]);

    /// SHA-256 of arbitrary bytes.
    pub fn digest(data: &[u8]) -> Self {
        Hash(Sha256::digest(data).into())
    }

    /// Parse a 64-char hex string.
    pub fn from_hex(s: &str) -> Result<Self, HashParseError> {
        if s.len() != 64 {
            return Err(HashParseError::InvalidLength(s.len()));
        }
        let mut out = [0u8; 32];
        hex::decode_to_slice(s, &mut out)
            .map_err(|e| HashParseError::InvalidHex(e.to_string()))?;
        Ok(Hash(out))
    }

    /// Full lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First four bytes as hex, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({}..)", self.short())
    }
}

/// Field-by-field SHA-256 with length-prefixed strings.
struct CanonicalHasher(Sha256);

impl CanonicalHasher {
    fn new(domain: &'static [u8]) -> Self {
        let mut inner = Sha256::new();
        inner.update(domain);
        Self(inner)
    }

    fn u64(mut self, value: u64) -> Self {
        self.0.update(value.to_be_bytes());
        self
    }

    fn str(mut self, value: &str) -> Self {
        self.0.update((value.len() as u64).to_be_bytes());
        self.0.update(value.as_bytes());
        self
    }

    fn hash(mut self, value: &Hash) -> Self {
        self.0.update(value.0);
        self
    }

    fn hashes(mut self, values: &[Hash]) -> Self {
        self.0.update((values.len() as u64).to_be_bytes());
        for value in values {
            self.0.update(value.0);
        }
        self
    }

    fn finish(self) -> Hash {
        Hash(self.0.finalize().into())
    }
}

// =============================================================================
// BLOCK
// =============================================================================

/// A committed block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Position in the chain.
    pub height: u64,
    /// Hash over every other field.
    pub hash: Hash,
    /// Hash of the block at `height - 1`.
    pub prev_block_hash: Hash,
    /// Address of the proposing validator.
    pub proposer: String,
    /// Consensus round in which the block was agreed.
    pub round: u64,
    /// Unix timestamp (seconds) of confirmation.
    pub timestamp: u64,
    /// Hashes of the transactions included, in order.
    pub transactions: Vec<Hash>,
}

impl Block {
    /// Build a block and compute its hash.
    pub fn new(
        height: u64,
        prev_block_hash: Hash,
        proposer: impl Into<String>,
        round: u64,
        timestamp: u64,
        transactions: Vec<Hash>,
    ) -> Self {
        let mut block = Self {
            height,
            hash: Hash::ZERO,
            prev_block_hash,
            proposer: proposer.into(),
            round,
            timestamp,
            transactions,
        };
        block.hash = block.compute_hash();
        block
    }

    /// Recompute the canonical hash from the other fields.
    pub fn compute_hash(&self) -> Hash {
        CanonicalHasher::new(b"qc/block")
            .u64(self.height)
            .hash(&self.prev_block_hash)
            .str(&self.proposer)
            .u64(self.round)
            .u64(self.timestamp)
            .hashes(&self.transactions)
            .finish()
    }
}

// =============================================================================
// TRANSACTION
// =============================================================================

/// A transaction: an ordered bundle of operations from one source account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Hash over every other field.
    pub hash: Hash,
    /// Source account address.
    pub source: String,
    /// Fee paid, in base units.
    pub fee: u64,
    /// Source account sequence number.
    pub sequence_id: u64,
    /// Hashes of the operations, in execution order.
    pub operations: Vec<Hash>,
}

impl Transaction {
    /// Build a transaction from its operations.
    ///
    /// Each operation gets its `tx_hash` back-reference filled in.
    pub fn new(
        source: impl Into<String>,
        fee: u64,
        sequence_id: u64,
        operations: &mut [Operation],
    ) -> Self {
        let mut tx = Self {
            hash: Hash::ZERO,
            source: source.into(),
            fee,
            sequence_id,
            operations: operations.iter().map(|op| op.hash).collect(),
        };
        tx.hash = tx.compute_hash();
        for op in operations.iter_mut() {
            op.tx_hash = tx.hash;
        }
        tx
    }

    /// Recompute the canonical hash from the other fields.
    pub fn compute_hash(&self) -> Hash {
        CanonicalHasher::new(b"qc/transaction")
            .str(&self.source)
            .u64(self.fee)
            .u64(self.sequence_id)
            .hashes(&self.operations)
            .finish()
    }
}

// =============================================================================
// OPERATION
// =============================================================================

/// The kind of state change an operation requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    /// Create and fund a new account.
    CreateAccount,
    /// Transfer between existing accounts.
    Payment,
    /// Freeze an amount for staking.
    Freeze,
    /// Release a previously frozen amount.
    Unfreeze,
}

impl OperationKind {
    fn tag(self) -> u64 {
        match self {
            OperationKind::CreateAccount => 1,
            OperationKind::Payment => 2,
            OperationKind::Freeze => 3,
            OperationKind::Unfreeze => 4,
        }
    }
}

/// A single state change inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Hash over source, sequence, index and body.
    pub hash: Hash,
    /// Owning transaction. Not covered by `hash`.
    pub tx_hash: Hash,
    /// Source account of the owning transaction.
    pub source: String,
    /// Sequence number of the owning transaction.
    pub sequence_id: u64,
    /// Position inside the owning transaction.
    pub index: u32,
    /// What the operation does.
    pub kind: OperationKind,
    /// Target account address.
    pub target: String,
    /// Amount in base units.
    pub amount: u64,
}

impl Operation {
    /// Build an operation; `tx_hash` stays zero until a `Transaction` is built from it.
    pub fn new(
        source: impl Into<String>,
        sequence_id: u64,
        index: u32,
        kind: OperationKind,
        target: impl Into<String>,
        amount: u64,
    ) -> Self {
        let mut op = Self {
            hash: Hash::ZERO,
            tx_hash: Hash::ZERO,
            source: source.into(),
            sequence_id,
            index,
            kind,
            target: target.into(),
            amount,
        };
        op.hash = op.compute_hash();
        op
    }

    /// Recompute the canonical hash from the covered fields.
    pub fn compute_hash(&self) -> Hash {
        CanonicalHasher::new(b"qc/operation")
            .str(&self.source)
            .u64(self.sequence_id)
            .u64(u64::from(self.index))
            .u64(self.kind.tag())
            .str(&self.target)
            .u64(self.amount)
            .finish()
    }
}
