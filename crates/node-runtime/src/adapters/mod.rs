//! # Node Adapters
//!
//! Runtime-side adapters: durable storage, node info polling and the
//! metrics endpoint.

pub mod metrics_server;
pub mod node_info;
pub mod storage;

pub use metrics_server::{metrics_router, serve_metrics};
pub use node_info::NodeInfoRefresher;
