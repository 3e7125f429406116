//! # Structural Rules
//!
//! Default `BlockRules`: a fetched height is accepted when it is
//! self-consistent. Semantic rules (balances, signatures, fees) belong to a
//! different `BlockRules` implementation.
//!
//! ## Checks, in order
//!
//! 1. Block present and at the requested height
//! 2. Block hash recomputes
//! 3. Every listed transaction present, no unlisted ones, hashes recompute
//! 4. Every listed operation present, no unreferenced ones, linked back to
//!    its transaction
//! 5. Parent hash matches the stored block at `height - 1`, when stored
//!
//! Heights complete out of order, so a missing parent is not an error.

use std::collections::{HashMap, HashSet};

use shared_types::{Hash, Operation};

use crate::domain::{RuleViolation, SyncInfo};
use crate::ports::{BlockRules, BlockStore};

/// Self-consistency rules for a fetched height.
#[derive(Debug, Clone, Copy)]
pub struct StructuralRules {
    check_parent: bool,
}

impl Default for StructuralRules {
    fn default() -> Self {
        Self { check_parent: true }
    }
}

impl StructuralRules {
    /// Rules with parent linkage checking enabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rules that ignore the stored parent.
    pub fn without_parent_check() -> Self {
        Self {
            check_parent: false,
        }
    }
}

impl BlockRules for StructuralRules {
    fn check(&self, info: &SyncInfo, store: &dyn BlockStore) -> Result<(), RuleViolation> {
        let block = info.block.as_ref().ok_or(RuleViolation::MissingBlock)?;

        if block.height != info.height {
            return Err(RuleViolation::HeightMismatch {
                expected: info.height,
                actual: block.height,
            });
        }
        if block.compute_hash() != block.hash {
            return Err(RuleViolation::BlockHashMismatch {
                height: block.height,
            });
        }

        if let Some(tx) = info
            .transactions
            .iter()
            .find(|tx| !block.transactions.contains(&tx.hash))
        {
            return Err(RuleViolation::UnexpectedTransaction { hash: tx.hash });
        }

        let referenced: HashSet<&Hash> = info
            .transactions
            .iter()
            .flat_map(|tx| tx.operations.iter())
            .collect();
        if let Some(op) = info
            .operations
            .iter()
            .find(|op| !referenced.contains(&op.hash))
        {
            return Err(RuleViolation::UnexpectedOperation { hash: op.hash });
        }

        let operations: HashMap<Hash, &Operation> =
            info.operations.iter().map(|op| (op.hash, op)).collect();

        for tx_hash in &block.transactions {
            let tx = info
                .transactions
                .iter()
                .find(|tx| tx.hash == *tx_hash)
                .ok_or(RuleViolation::MissingTransaction { hash: *tx_hash })?;
            if tx.compute_hash() != tx.hash {
                return Err(RuleViolation::TransactionHashMismatch { hash: tx.hash });
            }

            for (index, op_hash) in tx.operations.iter().enumerate() {
                let op = operations
                    .get(op_hash)
                    .ok_or(RuleViolation::MissingOperation { hash: *op_hash })?;
                if op.compute_hash() != op.hash {
                    return Err(RuleViolation::OperationHashMismatch { hash: op.hash });
                }
                let linked = op.tx_hash == tx.hash
                    && op.source == tx.source
                    && op.sequence_id == tx.sequence_id
                    && op.index as usize == index;
                if !linked {
                    return Err(RuleViolation::OperationLinkMismatch { hash: op.hash });
                }
            }
        }

        if self.check_parent && block.height > 0 {
            let parent = store
                .block_by_height(block.height - 1)
                .map_err(|e| RuleViolation::Rejected(format!("parent lookup failed: {}", e)))?;
            if let Some(parent) = parent {
                if parent.hash != block.prev_block_hash {
                    return Err(RuleViolation::ParentMismatch {
                        height: block.height,
                    });
                }
            }
        }

        Ok(())
    }
}
