//! # Peer Selection
//!
//! Policies for choosing which peer serves a height. Fetched data is
//! verified downstream, so the policies only spread load and rotate away
//! from a peer that keeps failing.

use rand::Rng;
use shared_types::PeerAddress;

use crate::ports::PeerSelector;

/// Uniform random choice, drawn again on every attempt.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomPeerSelector;

impl RandomPeerSelector {
    /// Create the selector.
    pub fn new() -> Self {
        Self
    }
}

impl PeerSelector for RandomPeerSelector {
    fn select<'a>(
        &self,
        candidates: &'a [PeerAddress],
        _height: u64,
        _attempt: u32,
    ) -> Option<&'a PeerAddress> {
        if candidates.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..candidates.len());
        candidates.get(index)
    }
}

/// Rotates through the candidates.
///
/// The first attempt for a height starts at `height % len`, so neighbouring
/// heights land on different peers, and each retry moves one peer further.
#[derive(Debug, Default, Clone, Copy)]
pub struct RoundRobinPeerSelector;

impl RoundRobinPeerSelector {
    /// Create the selector.
    pub fn new() -> Self {
        Self
    }
}

impl PeerSelector for RoundRobinPeerSelector {
    fn select<'a>(
        &self,
        candidates: &'a [PeerAddress],
        height: u64,
        attempt: u32,
    ) -> Option<&'a PeerAddress> {
        let len = candidates.len() as u64;
        if len == 0 {
            return None;
        }
        let index = (height % len + u64::from(attempt) % len) % len;
        candidates.get(index as usize)
    }
}
