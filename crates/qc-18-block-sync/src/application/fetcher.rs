//! # Fetcher
//!
//! Retrieves one height from a connected peer over the node API.
//!
//! ## Flow
//!
//! ```text
//! candidates = connected ∩ info.peers  (or all connected)
//!      │
//!      ▼
//! selector.select(candidates, h, attempt) ──► client.get_blocks([h, h+1), full)
//!                                                  │ (bounded by fetch_timeout)
//!                                                  ▼
//!                                       parse_block_stream ──► populated SyncInfo
//! ```
//!
//! The result is only trusted after the validator has checked it, so peer
//! choice is about load and rotation, not trust.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use shared_types::{BlockMode, HeightRange, PeerAddress};
use tracing::trace;

use crate::algorithms::{parse_block_stream, RandomPeerSelector};
use crate::domain::{ClientError, SyncError, SyncInfo};
use crate::ports::{BlockFetcher, ConnectionManager, PeerSelector};

/// Node API fetcher.
pub struct Fetcher {
    connections: Arc<dyn ConnectionManager>,
    selector: Arc<dyn PeerSelector>,
    timeout: Duration,
}

impl Fetcher {
    /// Create a fetcher choosing peers at random.
    pub fn new(connections: Arc<dyn ConnectionManager>, timeout: Duration) -> Self {
        Self {
            connections,
            selector: Arc::new(RandomPeerSelector::new()),
            timeout,
        }
    }

    /// Replace the peer selection policy.
    pub fn with_selector(mut self, selector: Arc<dyn PeerSelector>) -> Self {
        self.selector = selector;
        self
    }

    /// Peers eligible to serve `info`.
    ///
    /// Connected peers restricted to `info.peers`; if none of those are
    /// connected any more, every connected peer.
    pub fn candidates(&self, info: &SyncInfo) -> Vec<PeerAddress> {
        let connected = self.connections.all_connected();
        if info.peers.is_empty() {
            return connected;
        }
        let scoped: Vec<PeerAddress> = connected
            .iter()
            .filter(|peer| info.peers.contains(peer))
            .cloned()
            .collect();
        if scoped.is_empty() {
            connected
        } else {
            scoped
        }
    }
}

#[async_trait]
impl BlockFetcher for Fetcher {
    async fn fetch(&self, info: &SyncInfo) -> Result<SyncInfo, SyncError> {
        self.fetch_attempt(info, 0).await
    }

    async fn fetch_attempt(&self, info: &SyncInfo, attempt: u32) -> Result<SyncInfo, SyncError> {
        let height = info.height;
        let candidates = self.candidates(info);
        let peer = self
            .selector
            .select(&candidates, height, attempt)
            .cloned()
            .ok_or(SyncError::NoPeers { height })?;

        let client = self
            .connections
            .get_connection(&peer)
            .ok_or_else(|| SyncError::NoConnection { peer: peer.clone() })?;

        trace!("[qc-18] Fetching block {} from {} (attempt {})", height, peer, attempt);

        let request = client.get_blocks(HeightRange::single(height), BlockMode::Full);
        let body = match tokio::time::timeout(self.timeout, request).await {
            Err(_) => {
                return Err(SyncError::Client {
                    height,
                    peer,
                    source: ClientError::Timeout,
                })
            }
            Ok(Err(ClientError::NotFound)) => return Err(SyncError::NotFound { height, peer }),
            Ok(Err(source)) => {
                return Err(SyncError::Client {
                    height,
                    peer,
                    source,
                })
            }
            Ok(Ok(body)) => body,
        };

        let bundle = parse_block_stream(height, &body)?;

        let mut populated = info.clone();
        populated.block = Some(bundle.block);
        populated.transactions = bundle.transactions;
        populated.operations = bundle.operations;
        populated.source = Some(peer);
        Ok(populated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::PeerTable;
    use crate::algorithms::RoundRobinPeerSelector;
    use crate::test_utils::{chain_fixture, ChainNodeClient};

    fn table_with(peers: &[(&str, Arc<ChainNodeClient>)]) -> Arc<PeerTable> {
        let table = Arc::new(PeerTable::new());
        for (name, client) in peers {
            table.connect(PeerAddress::from(*name), client.clone());
        }
        table
    }

    #[tokio::test]
    async fn test_fetch_populates_copy() {
        let chain = chain_fixture(5);
        let client = Arc::new(ChainNodeClient::new(chain.clone()));
        let fetcher = Fetcher::new(table_with(&[("node-1", client)]), Duration::from_secs(1));

        let info = SyncInfo::new(3, vec![]);
        let fetched = fetcher.fetch(&info).await.unwrap();

        assert!(!info.is_populated());
        assert_eq!(fetched.block.as_ref(), Some(&chain[3].block));
        assert_eq!(fetched.transactions, chain[3].transactions);
        assert_eq!(fetched.operations, chain[3].operations);
        assert_eq!(fetched.source, Some(PeerAddress::from("node-1")));
    }

    #[tokio::test]
    async fn test_no_connected_peers() {
        let fetcher = Fetcher::new(Arc::new(PeerTable::new()), Duration::from_secs(1));
        let err = fetcher.fetch(&SyncInfo::new(1, vec![])).await.unwrap_err();
        assert!(matches!(err, SyncError::NoPeers { height: 1 }));
    }

    #[tokio::test]
    async fn test_height_not_produced_is_not_found() {
        let client = Arc::new(ChainNodeClient::new(chain_fixture(2)));
        let fetcher = Fetcher::new(table_with(&[("node-1", client)]), Duration::from_secs(1));

        let err = fetcher.fetch(&SyncInfo::new(9, vec![])).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_client_failure_maps_to_client_error() {
        let client = Arc::new(ChainNodeClient::new(chain_fixture(2)));
        client.set_failure(Some(ClientError::Status(503)));
        let fetcher = Fetcher::new(table_with(&[("node-1", client)]), Duration::from_secs(1));

        let err = fetcher.fetch(&SyncInfo::new(1, vec![])).await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::Client {
                source: ClientError::Status(503),
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_peer_times_out() {
        let client = Arc::new(ChainNodeClient::new(chain_fixture(2)));
        client.set_delay(Duration::from_secs(30));
        let fetcher = Fetcher::new(table_with(&[("node-1", client)]), Duration::from_secs(1));

        let err = fetcher.fetch(&SyncInfo::new(1, vec![])).await.unwrap_err();
        assert_eq!(err.metric_reason(), "timeout");
    }

    #[tokio::test]
    async fn test_scoped_to_reporting_peers() {
        let chain = chain_fixture(3);
        let a = Arc::new(ChainNodeClient::new(chain.clone()));
        let b = Arc::new(ChainNodeClient::new(chain));
        let table = table_with(&[("node-a", a.clone()), ("node-b", b.clone())]);
        let fetcher = Fetcher::new(table, Duration::from_secs(1));

        let info = SyncInfo::new(2, vec![PeerAddress::from("node-b")]);
        for _ in 0..5 {
            fetcher.fetch(&info).await.unwrap();
        }
        assert_eq!(a.requests(), 0);
        assert_eq!(b.requests(), 5);
    }

    #[tokio::test]
    async fn test_falls_back_when_scope_disconnected() {
        let a = Arc::new(ChainNodeClient::new(chain_fixture(3)));
        let fetcher = Fetcher::new(table_with(&[("node-a", a.clone())]), Duration::from_secs(1));

        let info = SyncInfo::new(2, vec![PeerAddress::from("node-gone")]);
        assert_eq!(fetcher.candidates(&info), vec![PeerAddress::from("node-a")]);
        fetcher.fetch(&info).await.unwrap();
        assert_eq!(a.requests(), 1);
    }

    #[tokio::test]
    async fn test_retry_rotates_peers() {
        let chain = chain_fixture(3);
        let a = Arc::new(ChainNodeClient::new(chain.clone()));
        let b = Arc::new(ChainNodeClient::new(chain));
        let fetcher = Fetcher::new(
            table_with(&[("node-a", a.clone()), ("node-b", b.clone())]),
            Duration::from_secs(1),
        )
        .with_selector(Arc::new(RoundRobinPeerSelector::new()));

        let info = SyncInfo::new(1, vec![]);
        let mut served_by_a = Vec::new();
        for attempt in 0..4 {
            let before = a.requests();
            fetcher.fetch_attempt(&info, attempt).await.unwrap();
            served_by_a.push(a.requests() > before);
        }
        // Each retry for the same height goes to the other peer
        for pair in served_by_a.windows(2) {
            assert_ne!(pair[0], pair[1], "served by: {:?}", served_by_a);
        }
        assert_eq!(a.requests(), 2);
        assert_eq!(b.requests(), 2);
    }
}
