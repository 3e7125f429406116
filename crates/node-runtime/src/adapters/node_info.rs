//! # Node Info Refresher
//!
//! Keeps the peer table's node info current so the watcher sees fresh
//! peer heights.

use std::sync::Arc;
use std::time::Duration;

use qc_18_block_sync::{PeerTable, ShutdownSignal};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Periodically asks every connected peer for its node info.
pub struct NodeInfoRefresher {
    table: Arc<PeerTable>,
    interval: Duration,
    timeout: Duration,
}

impl NodeInfoRefresher {
    /// Refresh `table` every `interval`, giving each peer `timeout` to answer.
    pub fn new(table: Arc<PeerTable>, interval: Duration, timeout: Duration) -> Self {
        Self {
            table,
            interval,
            timeout,
        }
    }

    /// One refresh round. Returns how many peers answered.
    pub async fn refresh_once(&self) -> usize {
        let reachable = self.table.refresh(self.timeout).await;
        if reachable == 0 && !self.table.is_empty() {
            warn!(
                "[qc-18] None of {} peers answered the node info request",
                self.table.len()
            );
        } else {
            debug!("[qc-18] Node info refreshed from {} peers", reachable);
        }
        reachable
    }

    /// Refresh until `shutdown` fires. The first round runs immediately.
    pub async fn run(&self, shutdown: ShutdownSignal) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.refresh_once().await;
                }
            }
        }
        debug!("[qc-18] Node info refresher stopped");
    }
}
