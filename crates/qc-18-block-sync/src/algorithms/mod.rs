//! # Algorithms Module
//!
//! Pure building blocks of Block Sync: the node API stream codec, the
//! watermark computation, peer selection policies and the default rule set.

pub mod peer_selection;
pub mod rules;
pub mod stream;
pub mod watermark;

pub use peer_selection::{RandomPeerSelector, RoundRobinPeerSelector};
pub use rules::StructuralRules;
pub use stream::{
    encode_block_stream, encode_error_stream, parse_block_stream, BlockBundle, StreamItem,
};
pub use watermark::{compute_watermark, Watermark};
