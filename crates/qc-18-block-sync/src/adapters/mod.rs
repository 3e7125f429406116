//! # Adapters Layer (Hexagonal Architecture)
//!
//! Implements outbound port traits: the HTTP node API client, the peer
//! table connection manager and the in-memory block store.

mod connections;
mod http_client;
mod memory_store;

pub use connections::PeerTable;
pub use http_client::HttpNodeClient;
pub use memory_store::{InMemoryBlockStore, StoreSnapshot};
