//! # Error Types
//!
//! Parse errors for the value types exchanged with peers.

use thiserror::Error;

/// Errors raised when decoding a hex hash.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HashParseError {
    /// Input is not valid hex.
    #[error("Invalid hex in hash: {0}")]
    InvalidHex(String),

    /// Input decodes to the wrong number of bytes.
    #[error("Invalid hash length: expected 64 hex chars, got {0}")]
    InvalidLength(usize),
}

/// Errors raised when parsing a `height-range` query value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeParseError {
    /// Missing the `-` separator.
    #[error("Height range must look like <start>-<end>: {0}")]
    MissingSeparator(String),

    /// One of the bounds is not an unsigned integer.
    #[error("Invalid height in range: {0}")]
    InvalidHeight(String),

    /// `end` is not strictly greater than `start`.
    #[error("Empty height range: {start}-{end}")]
    Empty {
        /// Inclusive start.
        start: u64,
        /// Exclusive end.
        end: u64,
    },
}
