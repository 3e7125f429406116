//! # In-Memory Block Store
//!
//! `BlockStore` backed by maps behind a `parking_lot::RwLock`. Used by
//! tests and by the node runtime's `memory` storage backend.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use shared_types::{Block, Hash, Operation, Transaction};

use crate::algorithms::BlockBundle;
use crate::domain::{EntityKind, StoreError};
use crate::ports::{BlockStore, StoreBatch};

/// Full contents of an `InMemoryBlockStore`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSnapshot {
    /// Blocks by height.
    pub blocks: BTreeMap<u64, Block>,
    /// Transactions by hash.
    pub transactions: HashMap<Hash, Transaction>,
    /// Operations by hash.
    pub operations: HashMap<Hash, Operation>,
}

/// Thread-safe in-memory block store.
#[derive(Debug, Default)]
pub struct InMemoryBlockStore {
    data: RwLock<StoreSnapshot>,
}

impl InMemoryBlockStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a whole height directly, bypassing batches.
    ///
    /// Stands in for the node's own block production committing a height.
    pub fn insert_bundle(&self, bundle: &BlockBundle) {
        let mut data = self.data.write();
        for op in &bundle.operations {
            data.operations.insert(op.hash, op.clone());
        }
        for tx in &bundle.transactions {
            data.transactions.insert(tx.hash, tx.clone());
        }
        data.blocks.insert(bundle.block.height, bundle.block.clone());
    }

    /// Number of stored blocks.
    pub fn block_count(&self) -> usize {
        self.data.read().blocks.len()
    }

    /// Number of stored transactions.
    pub fn transaction_count(&self) -> usize {
        self.data.read().transactions.len()
    }

    /// Number of stored operations.
    pub fn operation_count(&self) -> usize {
        self.data.read().operations.len()
    }

    /// Copy of the full contents.
    pub fn snapshot(&self) -> StoreSnapshot {
        self.data.read().clone()
    }
}

impl BlockStore for InMemoryBlockStore {
    fn latest_block(&self) -> Result<Option<Block>, StoreError> {
        Ok(self.data.read().blocks.values().next_back().cloned())
    }

    fn exists_block_by_height(&self, height: u64) -> Result<bool, StoreError> {
        Ok(self.data.read().blocks.contains_key(&height))
    }

    fn block_by_height(&self, height: u64) -> Result<Option<Block>, StoreError> {
        Ok(self.data.read().blocks.get(&height).cloned())
    }

    fn begin(&self) -> Box<dyn StoreBatch + '_> {
        Box::new(MemoryBatch {
            store: self,
            operations: Vec::new(),
            transactions: Vec::new(),
            block: None,
        })
    }
}

struct MemoryBatch<'a> {
    store: &'a InMemoryBlockStore,
    operations: Vec<Operation>,
    transactions: Vec<Transaction>,
    block: Option<Block>,
}

fn already_exists(kind: EntityKind, key: impl ToString) -> StoreError {
    StoreError::AlreadyExists {
        kind,
        key: key.to_string(),
    }
}

impl StoreBatch for MemoryBatch<'_> {
    fn save_operation(&mut self, operation: &Operation) -> Result<(), StoreError> {
        let stored = self.store.data.read().operations.contains_key(&operation.hash);
        if stored || self.operations.iter().any(|op| op.hash == operation.hash) {
            return Err(already_exists(EntityKind::Operation, operation.hash));
        }
        self.operations.push(operation.clone());
        Ok(())
    }

    fn save_transaction(&mut self, transaction: &Transaction) -> Result<(), StoreError> {
        let stored = self
            .store
            .data
            .read()
            .transactions
            .contains_key(&transaction.hash);
        if stored || self.transactions.iter().any(|tx| tx.hash == transaction.hash) {
            return Err(already_exists(EntityKind::Transaction, transaction.hash));
        }
        self.transactions.push(transaction.clone());
        Ok(())
    }

    fn save_block(&mut self, block: &Block) -> Result<(), StoreError> {
        let stored = self.store.data.read().blocks.contains_key(&block.height);
        if stored || self.block.is_some() {
            return Err(already_exists(EntityKind::Block, block.height));
        }
        self.block = Some(block.clone());
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let batch = *self;
        let mut data = batch.store.data.write();

        if let Some(block) = &batch.block {
            if data.blocks.contains_key(&block.height) {
                return Err(already_exists(EntityKind::Block, block.height));
            }
        }

        for op in batch.operations {
            data.operations.entry(op.hash).or_insert(op);
        }
        for tx in batch.transactions {
            data.transactions.entry(tx.hash).or_insert(tx);
        }
        if let Some(block) = batch.block {
            data.blocks.insert(block.height, block);
        }
        Ok(())
    }
}
