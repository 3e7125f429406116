//! # Storage Adapters
//!
//! Durable block storage for the sync node.
//!
//! ## Usage
//!
//! Enable the `rocksdb` feature to use these adapters:
//!
//! ```toml
//! node-runtime = { path = "...", features = ["rocksdb"] }
//! ```
//!
//! Without it only the in-memory store from `qc-18-block-sync` is available.

#[cfg(feature = "rocksdb")]
pub mod rocksdb_adapter;

#[cfg(feature = "rocksdb")]
pub use rocksdb_adapter::{
    RocksDbBlockStore, RocksDbConfig, CF_BLOCKS, CF_OPERATIONS, CF_TRANSACTIONS, COLUMN_FAMILIES,
};
