//! # Shared Types Crate
//!
//! Chain entities shared between the node runtime, the block sync subsystem
//! and remote peers.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: block, transaction and operation layout is
//!   defined once, here.
//! - **Self-verifying entities**: every entity carries its own hash and can
//!   recompute it with `compute_hash()`, so data fetched from an untrusted
//!   peer can be checked without any external context.
//! - **Wire-stable encoding**: hashes are serialized as lowercase hex so the
//!   node API stream is human readable.

pub mod entities;
pub mod errors;
pub mod network;

pub use entities::*;
pub use errors::*;
pub use network::*;
