//! # Peer Table
//!
//! `ConnectionManager` holding one `NodeClient` per connected peer and the
//! last node info each peer reported.
//!
//! Node info is refreshed out of band by `refresh()`; a peer that fails to
//! answer loses its node info until it answers again, which keeps it out of
//! the watcher's watermark without disconnecting it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::RwLock;
use quantum_telemetry::PEERS_CONNECTED;
use shared_types::{NodeInfo, PeerAddress};
use tracing::{debug, trace};

use crate::domain::ClientError;
use crate::ports::{ConnectionManager, NodeClient};

#[derive(Clone)]
struct PeerEntry {
    client: Arc<dyn NodeClient>,
    info: Option<NodeInfo>,
}

/// Connected peers and their last known node info.
#[derive(Default)]
pub struct PeerTable {
    peers: RwLock<BTreeMap<PeerAddress, PeerEntry>>,
}

impl PeerTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the client for `peer`.
    pub fn connect(&self, peer: PeerAddress, client: Arc<dyn NodeClient>) {
        let mut peers = self.peers.write();
        peers.insert(peer, PeerEntry { client, info: None });
        PEERS_CONNECTED.set(peers.len() as f64);
    }

    /// Drop `peer`; returns whether it was connected.
    pub fn disconnect(&self, peer: &PeerAddress) -> bool {
        let mut peers = self.peers.write();
        let removed = peers.remove(peer).is_some();
        PEERS_CONNECTED.set(peers.len() as f64);
        removed
    }

    /// Record node info for a connected peer; ignored for unknown peers.
    pub fn update_node(&self, peer: &PeerAddress, info: NodeInfo) -> bool {
        match self.peers.write().get_mut(peer) {
            Some(entry) => {
                entry.info = Some(info);
                true
            }
            None => false,
        }
    }

    /// Forget a peer's node info, keeping the connection.
    pub fn clear_node(&self, peer: &PeerAddress) {
        if let Some(entry) = self.peers.write().get_mut(peer) {
            entry.info = None;
        }
    }

    /// Number of connected peers.
    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    /// True when no peer is connected.
    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }

    /// Ask every connected peer for its node info, concurrently.
    ///
    /// Returns how many peers answered within `timeout`.
    pub async fn refresh(&self, timeout: Duration) -> usize {
        let targets: Vec<(PeerAddress, Arc<dyn NodeClient>)> = self
            .peers
            .read()
            .iter()
            .map(|(peer, entry)| (peer.clone(), entry.client.clone()))
            .collect();

        let answers = join_all(targets.into_iter().map(|(peer, client)| async move {
            let result = match tokio::time::timeout(timeout, client.node_info()).await {
                Ok(result) => result,
                Err(_) => Err(ClientError::Timeout),
            };
            (peer, result)
        }))
        .await;

        let mut reachable = 0;
        for (peer, result) in answers {
            match result {
                Ok(info) => {
                    trace!("[qc-18] Peer {} reports height {}", peer, info.block_height);
                    if self.update_node(&peer, info) {
                        reachable += 1;
                    }
                }
                Err(e) => {
                    debug!("[qc-18] Node info from {} unavailable: {}", peer, e);
                    self.clear_node(&peer);
                }
            }
        }
        reachable
    }
}

impl ConnectionManager for PeerTable {
    fn all_connected(&self) -> Vec<PeerAddress> {
        self.peers.read().keys().cloned().collect()
    }

    fn get_connection(&self, peer: &PeerAddress) -> Option<Arc<dyn NodeClient>> {
        self.peers.read().get(peer).map(|entry| entry.client.clone())
    }

    fn get_node(&self, peer: &PeerAddress) -> Option<NodeInfo> {
        self.peers.read().get(peer).and_then(|entry| entry.info.clone())
    }
}
