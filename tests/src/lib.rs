//! # Quantum-Chain Test Suite
//!
//! Unified test crate for the sync node.
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── benches/
//! │   └── sync_benchmarks.rs  # Stream parsing and validation throughput
//! └── src/
//!     └── integration/
//!         ├── sync_flows.rs   # Pipeline scenarios and properties
//!         └── node_api.rs     # HTTP node API end to end
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p qc-tests
//!
//! # By category
//! cargo test -p qc-tests integration::sync_flows
//! cargo test -p qc-tests integration::node_api
//!
//! # Benchmarks
//! cargo bench -p qc-tests
//! ```

pub mod integration;
