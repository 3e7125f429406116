//! # Networking Value Types
//!
//! Peer identity and the query vocabulary of the node API.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::entities::Hash;
use crate::errors::RangeParseError;

/// Address under which a peer is known to the connection manager.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerAddress(pub String);

impl PeerAddress {
    /// Create from anything string-like.
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// The address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerAddress {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// What a peer reports about itself through the node-info exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// The peer's own address.
    pub address: PeerAddress,
    /// Base URL of the peer's node API.
    pub endpoint: String,
    /// Height of the latest block the peer has committed.
    pub block_height: u64,
    /// Hash of that block.
    pub block_hash: Hash,
}

/// Half-open height range `[start, end)`, written `start-end` in queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeightRange {
    /// Inclusive start.
    pub start: u64,
    /// Exclusive end.
    pub end: u64,
}

impl HeightRange {
    /// The range containing exactly `height`.
    pub fn single(height: u64) -> Self {
        Self {
            start: height,
            end: height.saturating_add(1),
        }
    }

    /// Whether `height` lies inside the range.
    pub fn contains(&self, height: u64) -> bool {
        height >= self.start && height < self.end
    }

    /// Number of heights covered.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// True when the range covers nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for HeightRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl FromStr for HeightRange {
    type Err = RangeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| RangeParseError::MissingSeparator(s.to_string()))?;
        let start: u64 = start
            .trim()
            .parse()
            .map_err(|_| RangeParseError::InvalidHeight(start.to_string()))?;
        let end: u64 = end
            .trim()
            .parse()
            .map_err(|_| RangeParseError::InvalidHeight(end.to_string()))?;
        if end <= start {
            return Err(RangeParseError::Empty { start, end });
        }
        Ok(Self { start, end })
    }
}

/// How much of each block the node API should stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockMode {
    /// Block headers only.
    Header,
    /// Block plus all of its transactions and operations.
    Full,
}

impl fmt::Display for BlockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockMode::Header => f.write_str("header"),
            BlockMode::Full => f.write_str("full"),
        }
    }
}
