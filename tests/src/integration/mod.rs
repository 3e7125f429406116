//! # Integration Tests
//!
//! Cross-crate flows through the whole sync pipeline.

pub mod node_api;
pub mod sync_flows;
