//! # Watcher
//!
//! Polls connected peers' last reported heights and raises the syncer's
//! target when the network moves ahead.
//!
//! Peers without node info (never answered, or stopped answering) are left
//! out of the watermark rather than treated as errors.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use shared_types::PeerAddress;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::shutdown::ShutdownSignal;
use crate::algorithms::{compute_watermark, Watermark};
use crate::domain::SyncError;
use crate::ports::{ConnectionManager, SyncApi};

/// Periodic network height watcher.
pub struct Watcher {
    connections: Arc<dyn ConnectionManager>,
    syncer: Arc<dyn SyncApi>,
    interval: Duration,
    last_forwarded: AtomicU64,
}

impl Watcher {
    /// Create a watcher polling every `interval`.
    pub fn new(
        connections: Arc<dyn ConnectionManager>,
        syncer: Arc<dyn SyncApi>,
        interval: Duration,
    ) -> Self {
        Self {
            connections,
            syncer,
            interval,
            last_forwarded: AtomicU64::new(0),
        }
    }

    /// Highest target forwarded so far.
    pub fn last_forwarded(&self) -> u64 {
        self.last_forwarded.load(Ordering::SeqCst)
    }

    /// `(peer, height)` for every connected peer with known node info.
    pub fn reports(&self) -> Vec<(PeerAddress, u64)> {
        self.connections
            .all_connected()
            .into_iter()
            .filter_map(|peer| {
                let info = self.connections.get_node(&peer)?;
                Some((peer, info.block_height))
            })
            .collect()
    }

    /// One poll. Returns the watermark if it was forwarded to the syncer.
    pub async fn tick(&self) -> Result<Option<Watermark>, SyncError> {
        let reports = self.reports();
        let Some(mark) = compute_watermark(&reports) else {
            debug!("[qc-18] No peer heights known yet");
            return Ok(None);
        };

        if mark.height <= self.last_forwarded() {
            return Ok(None);
        }

        self.syncer
            .set_sync_target_block(mark.height, mark.peers.clone())
            .await?;
        self.last_forwarded.fetch_max(mark.height, Ordering::SeqCst);
        info!(
            "[qc-18] Network height {} reported by {} of {} peers",
            mark.height,
            mark.peers.len(),
            reports.len()
        );
        Ok(Some(mark))
    }

    /// Poll until `shutdown` fires or the syncer goes away.
    pub async fn run(&self, shutdown: ShutdownSignal) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => match self.tick().await {
                    Ok(_) => {}
                    Err(SyncError::Stopped) => {
                        debug!("[qc-18] Syncer stopped, watcher exiting");
                        break;
                    }
                    Err(e) => warn!("[qc-18] Failed to forward sync target: {}", e),
                },
            }
        }
    }
}
