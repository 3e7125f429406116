//! # Validator
//!
//! Checks a fetched height and persists it in one atomic batch.
//!
//! ## Steps
//!
//! 1. Height already stored: success, nothing else happens
//! 2. `BlockRules::check` (rejection becomes `SyncError::Validation`)
//! 3. Stage operations, then transactions, then the block
//! 4. Commit
//!
//! Any `AlreadyExists` from steps 3 and 4 means a concurrent writer got
//! there first and is treated as success.

use std::sync::Arc;

use async_trait::async_trait;
use quantum_telemetry::{time_histogram, SYNC_BLOCKS_PERSISTED, SYNC_PERSIST_DURATION};
use tracing::debug;

use crate::algorithms::StructuralRules;
use crate::domain::{RuleViolation, StoreError, SyncError, SyncInfo};
use crate::ports::{BlockRules, BlockStore, BlockValidator};

/// Rule-checking, persisting validator.
pub struct Validator {
    store: Arc<dyn BlockStore>,
    rules: Arc<dyn BlockRules>,
}

impl Validator {
    /// Validator using `StructuralRules`.
    pub fn new(store: Arc<dyn BlockStore>) -> Self {
        Self::with_rules(store, Arc::new(StructuralRules::new()))
    }

    /// Validator using a custom rule set.
    pub fn with_rules(store: Arc<dyn BlockStore>, rules: Arc<dyn BlockRules>) -> Self {
        Self { store, rules }
    }
}

/// Map "already exists" to success.
fn tolerate_existing(result: Result<(), StoreError>) -> Result<(), StoreError> {
    match result {
        Err(e) if e.is_already_exists() => Ok(()),
        other => other,
    }
}

#[async_trait]
impl BlockValidator for Validator {
    async fn validate(&self, info: &SyncInfo) -> Result<(), SyncError> {
        let height = info.height;
        let storage = |source| SyncError::Storage { height, source };

        if self.store.exists_block_by_height(height).map_err(storage)? {
            debug!("[qc-18] Block {} already stored, skipping", height);
            return Ok(());
        }

        self.rules
            .check(info, self.store.as_ref())
            .map_err(|source| SyncError::Validation { height, source })?;

        let block = info.block.as_ref().ok_or(SyncError::Validation {
            height,
            source: RuleViolation::MissingBlock,
        })?;

        let _timer = time_histogram!(SYNC_PERSIST_DURATION);
        let mut batch = self.store.begin();
        for operation in &info.operations {
            tolerate_existing(batch.save_operation(operation)).map_err(storage)?;
        }
        for transaction in &info.transactions {
            tolerate_existing(batch.save_transaction(transaction)).map_err(storage)?;
        }
        tolerate_existing(batch.save_block(block)).map_err(storage)?;

        match batch.commit() {
            Ok(()) => {
                SYNC_BLOCKS_PERSISTED.inc();
                debug!(
                    "[qc-18] Persisted block {} ({} txs, {} ops)",
                    height,
                    info.transactions.len(),
                    info.operations.len()
                );
                Ok(())
            }
            Err(e) if e.is_already_exists() => {
                debug!("[qc-18] Block {} persisted concurrently: {}", height, e);
                Ok(())
            }
            Err(e) => Err(storage(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryBlockStore;
    use crate::test_utils::{chain_fixture, sync_info_for};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRules {
        calls: AtomicUsize,
        verdict: Result<(), RuleViolation>,
    }

    impl BlockRules for CountingRules {
        fn check(&self, _info: &SyncInfo, _store: &dyn BlockStore) -> Result<(), RuleViolation> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.verdict.clone()
        }
    }

    #[tokio::test]
    async fn test_validate_persists_height() {
        let chain = chain_fixture(3);
        let store = Arc::new(InMemoryBlockStore::new());
        let validator = Validator::new(store.clone());

        validator.validate(&sync_info_for(&chain, 2)).await.unwrap();

        assert!(store.exists_block_by_height(2).unwrap());
        assert_eq!(store.transaction_count(), chain[2].transactions.len());
        assert_eq!(store.operation_count(), chain[2].operations.len());
    }

    #[tokio::test]
    async fn test_validate_twice_is_idempotent() {
        let chain = chain_fixture(3);
        let store = Arc::new(InMemoryBlockStore::new());
        let validator = Validator::new(store.clone());
        let info = sync_info_for(&chain, 1);

        validator.validate(&info).await.unwrap();
        let snapshot = store.snapshot();
        validator.validate(&info).await.unwrap();
        assert_eq!(store.snapshot(), snapshot);
    }

    #[tokio::test]
    async fn test_existing_height_skips_rules() {
        let chain = chain_fixture(2);
        let store = Arc::new(InMemoryBlockStore::new());
        store.insert_bundle(&chain[1]);
        let rules = Arc::new(CountingRules {
            calls: AtomicUsize::new(0),
            verdict: Err(RuleViolation::Rejected("never".to_string())),
        });
        let validator = Validator::with_rules(store, rules.clone());

        validator.validate(&sync_info_for(&chain, 1)).await.unwrap();
        assert_eq!(rules.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rule_rejection() {
        let chain = chain_fixture(2);
        let store = Arc::new(InMemoryBlockStore::new());
        let rules = Arc::new(CountingRules {
            calls: AtomicUsize::new(0),
            verdict: Err(RuleViolation::Rejected("fee too low".to_string())),
        });
        let validator = Validator::with_rules(store.clone(), rules);

        let err = validator.validate(&sync_info_for(&chain, 1)).await.unwrap_err();
        assert!(matches!(err, SyncError::Validation { height: 1, .. }));
        assert!(!store.exists_block_by_height(1).unwrap());
        assert_eq!(store.operation_count(), 0);
    }

    #[tokio::test]
    async fn test_unreferenced_operation_not_saved() {
        let chain = chain_fixture(3);
        let store = Arc::new(InMemoryBlockStore::new());
        let validator = Validator::new(store.clone());
        let mut info = sync_info_for(&chain, 1);
        let orphan = chain[2].operations[0].clone();
        info.operations.push(orphan.clone());

        let err = validator.validate(&info).await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::Validation {
                height: 1,
                source: RuleViolation::UnexpectedOperation { .. },
            }
        ));
        assert!(!store.snapshot().operations.contains_key(&orphan.hash));
        assert!(!store.exists_block_by_height(1).unwrap());
    }

    #[tokio::test]
    async fn test_partially_stored_entities_tolerated() {
        let chain = chain_fixture(2);
        let store = Arc::new(InMemoryBlockStore::new());
        {
            let mut batch = store.begin();
            batch.save_operation(&chain[1].operations[0]).unwrap();
            batch.save_transaction(&chain[1].transactions[0]).unwrap();
            batch.commit().unwrap();
        }
        let validator = Validator::new(store.clone());

        validator.validate(&sync_info_for(&chain, 1)).await.unwrap();
        assert!(store.exists_block_by_height(1).unwrap());
        assert_eq!(store.operation_count(), chain[1].operations.len());
    }

    #[tokio::test]
    async fn test_out_of_order_heights() {
        let chain = chain_fixture(4);
        let store = Arc::new(InMemoryBlockStore::new());
        let validator = Validator::new(store.clone());

        validator.validate(&sync_info_for(&chain, 4)).await.unwrap();
        validator.validate(&sync_info_for(&chain, 2)).await.unwrap();
        validator.validate(&sync_info_for(&chain, 3)).await.unwrap();
        assert_eq!(store.latest_block().unwrap().map(|b| b.height), Some(4));
    }
}
