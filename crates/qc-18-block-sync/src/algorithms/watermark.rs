//! # Watermark
//!
//! Derives the network's highest agreed height from per-peer reports.

use shared_types::PeerAddress;

/// Highest height reported by any peer, and who reported it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watermark {
    /// Maximum reported height.
    pub height: u64,
    /// Peers reporting exactly `height`, in report order.
    pub peers: Vec<PeerAddress>,
}

/// Compute the watermark over `(peer, height)` reports.
///
/// Returns `None` when there are no reports.
pub fn compute_watermark(reports: &[(PeerAddress, u64)]) -> Option<Watermark> {
    let height = reports.iter().map(|(_, h)| *h).max()?;
    let peers = reports
        .iter()
        .filter(|(_, h)| *h == height)
        .map(|(peer, _)| peer.clone())
        .collect();
    Some(Watermark { height, peers })
}
