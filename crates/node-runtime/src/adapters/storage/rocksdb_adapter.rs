//! # RocksDB Block Store
//!
//! Durable `BlockStore` for the sync node.
//!
//! ## Column Families
//!
//! - `blocks` - Blocks keyed by big-endian height, so iteration order is
//!   height order and the last key is the chain tip
//! - `transactions` - Transactions keyed by hash
//! - `operations` - Operations keyed by hash
//!
//! Values are bincode-encoded. A batch becomes one `WriteBatch`, written
//! with fsync when `sync_writes` is set.

use std::path::PathBuf;

use parking_lot::Mutex;
use qc_18_block_sync::{BlockStore, EntityKind, StoreBatch, StoreError};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared_types::{Block, Operation, Transaction};

/// Block column family.
pub const CF_BLOCKS: &str = "blocks";
/// Transaction column family.
pub const CF_TRANSACTIONS: &str = "transactions";
/// Operation column family.
pub const CF_OPERATIONS: &str = "operations";

/// All column families used by the store.
pub const COLUMN_FAMILIES: &[&str] = &[CF_BLOCKS, CF_TRANSACTIONS, CF_OPERATIONS];

/// RocksDB configuration.
#[derive(Debug, Clone)]
pub struct RocksDbConfig {
    /// Path to the database directory
    pub path: PathBuf,
    /// Block cache size in bytes (default: 256MB)
    pub block_cache_size: usize,
    /// Write buffer size in bytes (default: 64MB)
    pub write_buffer_size: usize,
    /// Maximum number of write buffers (default: 3)
    pub max_write_buffer_number: i32,
    /// Enable fsync after each commit (default: true for durability)
    pub sync_writes: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/blocks"),
            block_cache_size: 256 * 1024 * 1024, // 256MB
            write_buffer_size: 64 * 1024 * 1024, // 64MB
            max_write_buffer_number: 3,
            sync_writes: true,
        }
    }
}

impl RocksDbConfig {
    /// Production defaults rooted at `path`.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Create config for testing (smaller buffers, no sync)
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 8 * 1024 * 1024,  // 8MB
            write_buffer_size: 4 * 1024 * 1024, // 4MB
            max_write_buffer_number: 2,
            sync_writes: false,
        }
    }
}

fn backend(context: &str, e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(format!("RocksDB {} failed: {}", context, e))
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn already_exists(kind: EntityKind, key: impl ToString) -> StoreError {
    StoreError::AlreadyExists {
        kind,
        key: key.to_string(),
    }
}

/// RocksDB-backed block store.
pub struct RocksDbBlockStore {
    db: DB,
    config: RocksDbConfig,
    // Serializes the exists-check and write of concurrent commits
    commit_lock: Mutex<()>,
}

impl RocksDbBlockStore {
    /// Open or create the database.
    pub fn open(config: RocksDbConfig) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        opts.set_write_buffer_size(config.write_buffer_size);
        opts.set_max_write_buffer_number(config.max_write_buffer_number);
        opts.set_compression_type(rocksdb::DBCompressionType::Snappy);

        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        block_opts.set_block_cache(&rocksdb::Cache::new_lru_cache(config.block_cache_size));
        opts.set_block_based_table_factory(&block_opts);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| {
                let mut cf_opts = Options::default();
                cf_opts.set_compression_type(rocksdb::DBCompressionType::Snappy);
                ColumnFamilyDescriptor::new(*name, cf_opts)
            })
            .collect();

        let db = DB::open_cf_descriptors(&opts, &config.path, cf_descriptors)
            .map_err(|e| backend("open", e))?;

        Ok(Self {
            db,
            config,
            commit_lock: Mutex::new(()),
        })
    }

    /// Configuration the store was opened with.
    pub fn config(&self) -> &RocksDbConfig {
        &self.config
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Backend(format!("missing column family {}", name)))
    }

    fn contains(&self, cf_name: &str, key: &[u8]) -> Result<bool, StoreError> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_pinned_cf(cf, key)
            .map(|v| v.is_some())
            .map_err(|e| backend("exists check", e))
    }

    /// Number of stored blocks (full scan; meant for tests and tooling).
    pub fn block_count(&self) -> Result<usize, StoreError> {
        let cf = self.cf(CF_BLOCKS)?;
        let mut count = 0;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            item.map_err(|e| backend("scan", e))?;
            count += 1;
        }
        Ok(count)
    }

    /// Transaction by hash.
    pub fn transaction(&self, hash: &shared_types::Hash) -> Result<Option<Transaction>, StoreError> {
        let cf = self.cf(CF_TRANSACTIONS)?;
        match self.db.get_cf(cf, hash.as_bytes()) {
            Ok(Some(bytes)) => decode(&bytes).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(backend("get", e)),
        }
    }

    /// Operation by hash.
    pub fn operation(&self, hash: &shared_types::Hash) -> Result<Option<Operation>, StoreError> {
        let cf = self.cf(CF_OPERATIONS)?;
        match self.db.get_cf(cf, hash.as_bytes()) {
            Ok(Some(bytes)) => decode(&bytes).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(backend("get", e)),
        }
    }
}

impl BlockStore for RocksDbBlockStore {
    fn latest_block(&self) -> Result<Option<Block>, StoreError> {
        let cf = self.cf(CF_BLOCKS)?;
        match self.db.iterator_cf(cf, IteratorMode::End).next() {
            Some(Ok((_, value))) => decode(&value).map(Some),
            Some(Err(e)) => Err(backend("scan", e)),
            None => Ok(None),
        }
    }

    fn exists_block_by_height(&self, height: u64) -> Result<bool, StoreError> {
        self.contains(CF_BLOCKS, &height.to_be_bytes())
    }

    fn block_by_height(&self, height: u64) -> Result<Option<Block>, StoreError> {
        let cf = self.cf(CF_BLOCKS)?;
        match self.db.get_cf(cf, height.to_be_bytes()) {
            Ok(Some(bytes)) => decode(&bytes).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(backend("get", e)),
        }
    }

    fn begin(&self) -> Box<dyn StoreBatch + '_> {
        Box::new(RocksBatch {
            store: self,
            operations: Vec::new(),
            transactions: Vec::new(),
            block: None,
        })
    }
}

struct RocksBatch<'a> {
    store: &'a RocksDbBlockStore,
    operations: Vec<(Operation, Vec<u8>)>,
    transactions: Vec<(Transaction, Vec<u8>)>,
    block: Option<(Block, Vec<u8>)>,
}

impl StoreBatch for RocksBatch<'_> {
    fn save_operation(&mut self, operation: &Operation) -> Result<(), StoreError> {
        let staged = self.operations.iter().any(|(op, _)| op.hash == operation.hash);
        if staged || self.store.contains(CF_OPERATIONS, operation.hash.as_bytes())? {
            return Err(already_exists(EntityKind::Operation, operation.hash));
        }
        self.operations.push((operation.clone(), encode(operation)?));
        Ok(())
    }

    fn save_transaction(&mut self, transaction: &Transaction) -> Result<(), StoreError> {
        let staged = self
            .transactions
            .iter()
            .any(|(tx, _)| tx.hash == transaction.hash);
        if staged || self.store.contains(CF_TRANSACTIONS, transaction.hash.as_bytes())? {
            return Err(already_exists(EntityKind::Transaction, transaction.hash));
        }
        self.transactions
            .push((transaction.clone(), encode(transaction)?));
        Ok(())
    }

    fn save_block(&mut self, block: &Block) -> Result<(), StoreError> {
        if self.block.is_some() || self.store.exists_block_by_height(block.height)? {
            return Err(already_exists(EntityKind::Block, block.height));
        }
        self.block = Some((block.clone(), encode(block)?));
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let batch = *self;
        let store = batch.store;
        let _guard = store.commit_lock.lock();

        if let Some((block, _)) = &batch.block {
            if store.exists_block_by_height(block.height)? {
                return Err(already_exists(EntityKind::Block, block.height));
            }
        }

        let mut write = WriteBatch::default();
        let ops_cf = store.cf(CF_OPERATIONS)?;
        for (op, bytes) in &batch.operations {
            write.put_cf(ops_cf, op.hash.as_bytes(), bytes);
        }
        let txs_cf = store.cf(CF_TRANSACTIONS)?;
        for (tx, bytes) in &batch.transactions {
            write.put_cf(txs_cf, tx.hash.as_bytes(), bytes);
        }
        if let Some((block, bytes)) = &batch.block {
            write.put_cf(store.cf(CF_BLOCKS)?, block.height.to_be_bytes(), bytes);
        }

        let mut write_opts = rocksdb::WriteOptions::default();
        write_opts.set_sync(store.config.sync_writes);
        store
            .db
            .write_opt(write, &write_opts)
            .map_err(|e| backend("batch write", e))
    }
}
