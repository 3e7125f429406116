//! # Test Utilities
//!
//! Chain fixtures and scripted collaborators shared by the unit tests and
//! the workspace test suite (enable the `test-utils` feature).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use shared_types::{
    Block, BlockMode, Hash, HeightRange, NodeInfo, Operation, OperationKind, PeerAddress,
    Transaction,
};

use crate::algorithms::{encode_block_stream, BlockBundle};
use crate::domain::{ClientError, SyncError, SyncInfo, SyncProgress};
use crate::ports::{BlockFetcher, BlockValidator, NodeClient, SyncApi};

// =============================================================================
// CHAIN FIXTURES
// =============================================================================

/// Linked chain with heights `0..=tip`; `chain[h]` is height `h`.
pub fn chain_fixture(tip: u64) -> Vec<BlockBundle> {
    chain_fixture_with_seed(tip, 0)
}

/// Like `chain_fixture`, but blocks differ (in proposer) per `seed`.
pub fn chain_fixture_with_seed(tip: u64, seed: u64) -> Vec<BlockBundle> {
    let mut chain = Vec::with_capacity(tip as usize + 1);
    let mut prev = Hash::ZERO;

    for height in 0..=tip {
        let source = format!("GA-account-{}", height % 3);
        let mut transactions = Vec::new();
        let mut operations = Vec::new();

        for t in 0..(1 + height % 2) {
            let sequence = height * 10 + t;
            let mut tx_ops = vec![
                Operation::new(
                    &source,
                    sequence,
                    0,
                    OperationKind::Payment,
                    format!("GA-dest-{}", t),
                    100 + height,
                ),
                Operation::new(&source, sequence, 1, OperationKind::Freeze, &source, 1),
            ];
            let tx = Transaction::new(&source, 100, sequence, &mut tx_ops);
            transactions.push(tx);
            operations.extend(tx_ops);
        }

        let block = Block::new(
            height,
            prev,
            format!("GA-proposer-{}", seed),
            0,
            1_700_000_000 + height * 5,
            transactions.iter().map(|tx| tx.hash).collect(),
        );
        prev = block.hash;
        chain.push(BlockBundle {
            block,
            transactions,
            operations,
        });
    }
    chain
}

/// Populated `SyncInfo` for `chain[height]`.
pub fn sync_info_for(chain: &[BlockBundle], height: u64) -> SyncInfo {
    let bundle = &chain[height as usize];
    SyncInfo {
        height,
        block: Some(bundle.block.clone()),
        transactions: bundle.transactions.clone(),
        operations: bundle.operations.clone(),
        peers: Vec::new(),
        source: None,
    }
}

/// Node info of a peer whose tip is the last block of `chain`.
pub fn node_info_for(peer: &PeerAddress, endpoint: &str, chain: &[BlockBundle]) -> NodeInfo {
    let tip = chain.last().map(|b| (b.block.height, b.block.hash));
    let (block_height, block_hash) = tip.unwrap_or((0, Hash::ZERO));
    NodeInfo {
        address: peer.clone(),
        endpoint: endpoint.to_string(),
        block_height,
        block_hash,
    }
}

/// Node info reporting `height` with a placeholder hash.
pub fn node_info_at(peer: &PeerAddress, height: u64) -> NodeInfo {
    NodeInfo {
        address: peer.clone(),
        endpoint: format!("memory://{}", peer),
        block_height: height,
        block_hash: Hash::ZERO,
    }
}

// =============================================================================
// NODE CLIENT
// =============================================================================

/// `NodeClient` serving a fixture chain as a node API would.
pub struct ChainNodeClient {
    address: PeerAddress,
    chain: RwLock<Vec<BlockBundle>>,
    failure: Mutex<Option<ClientError>>,
    delay: Mutex<Option<Duration>>,
    requests: AtomicUsize,
}

impl ChainNodeClient {
    /// Serve `chain`.
    pub fn new(chain: Vec<BlockBundle>) -> Self {
        Self {
            address: PeerAddress::from("chain-node"),
            chain: RwLock::new(chain),
            failure: Mutex::new(None),
            delay: Mutex::new(None),
            requests: AtomicUsize::new(0),
        }
    }

    /// Report `address` as the node's own address.
    pub fn with_address(mut self, address: PeerAddress) -> Self {
        self.address = address;
        self
    }

    /// Fail every request with `failure` until cleared with `None`.
    pub fn set_failure(&self, failure: Option<ClientError>) {
        *self.failure.lock() = failure;
    }

    /// Delay every response.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Replace the served chain (e.g. to simulate the peer advancing).
    pub fn set_chain(&self, chain: Vec<BlockBundle>) {
        *self.chain.write() = chain;
    }

    /// Number of block requests received.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn scripted_failure(&self) -> Option<ClientError> {
        self.failure.lock().clone()
    }
}

#[async_trait]
impl NodeClient for ChainNodeClient {
    async fn get_blocks(&self, range: HeightRange, _mode: BlockMode) -> Result<String, ClientError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if let Some(failure) = self.scripted_failure() {
            return Err(failure);
        }

        let bundle = self.chain.read().get(range.start as usize).cloned();
        match bundle {
            Some(b) => encode_block_stream(&b.block, &b.transactions, &b.operations)
                .map_err(|e| ClientError::Decode(e.to_string())),
            None => Err(ClientError::NotFound),
        }
    }

    async fn node_info(&self) -> Result<NodeInfo, ClientError> {
        self.pause().await;
        if let Some(failure) = self.scripted_failure() {
            return Err(failure);
        }
        let endpoint = format!("memory://{}", self.address);
        Ok(node_info_for(&self.address, &endpoint, &self.chain.read()))
    }
}

// =============================================================================
// PIPELINE STAGES
// =============================================================================

/// `BlockFetcher` answering from a fixture chain, with scripted failures.
pub struct ScriptedFetcher {
    chain: Vec<BlockBundle>,
    failures: Mutex<HashMap<u64, u32>>,
    calls: Mutex<HashMap<u64, u32>>,
    peers_seen: Mutex<HashMap<u64, Vec<PeerAddress>>>,
}

impl ScriptedFetcher {
    /// Serve `chain`; heights past its tip are `NotFound`.
    pub fn new(chain: Vec<BlockBundle>) -> Self {
        Self {
            chain,
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            peers_seen: Mutex::new(HashMap::new()),
        }
    }

    /// Fail the next `times` fetches of `height`.
    pub fn fail_times(&self, height: u64, times: u32) {
        self.failures.lock().insert(height, times);
    }

    /// Fetches of `height` so far.
    pub fn calls_for(&self, height: u64) -> u32 {
        self.calls.lock().get(&height).copied().unwrap_or(0)
    }

    /// Fetches of any height so far.
    pub fn total_calls(&self) -> u32 {
        self.calls.lock().values().sum()
    }

    /// Peer scope of the last fetch of `height`.
    pub fn peers_seen(&self, height: u64) -> Option<Vec<PeerAddress>> {
        self.peers_seen.lock().get(&height).cloned()
    }
}

#[async_trait]
impl BlockFetcher for ScriptedFetcher {
    async fn fetch(&self, info: &SyncInfo) -> Result<SyncInfo, SyncError> {
        let height = info.height;
        *self.calls.lock().entry(height).or_insert(0) += 1;
        self.peers_seen.lock().insert(height, info.peers.clone());
        let peer = PeerAddress::from("scripted");

        {
            let mut failures = self.failures.lock();
            if let Some(remaining) = failures.get_mut(&height) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(SyncError::Client {
                        height,
                        peer,
                        source: ClientError::Transport("scripted failure".to_string()),
                    });
                }
            }
        }

        if height as usize >= self.chain.len() {
            return Err(SyncError::NotFound { height, peer });
        }
        let mut populated = sync_info_for(&self.chain, height);
        populated.peers = info.peers.clone();
        populated.source = Some(peer);
        Ok(populated)
    }
}

/// `BlockValidator` wrapper counting calls per height.
pub struct RecordingValidator {
    inner: Arc<dyn BlockValidator>,
    calls: Mutex<HashMap<u64, u32>>,
}

impl RecordingValidator {
    /// Wrap `inner`.
    pub fn new(inner: Arc<dyn BlockValidator>) -> Self {
        Self {
            inner,
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Validations of `height` so far.
    pub fn calls_for(&self, height: u64) -> u32 {
        self.calls.lock().get(&height).copied().unwrap_or(0)
    }

    /// Validations of any height so far.
    pub fn total_calls(&self) -> u32 {
        self.calls.lock().values().sum()
    }
}

#[async_trait]
impl BlockValidator for RecordingValidator {
    async fn validate(&self, info: &SyncInfo) -> Result<(), SyncError> {
        *self.calls.lock().entry(info.height).or_insert(0) += 1;
        self.inner.validate(info).await
    }
}

// =============================================================================
// SYNC API
// =============================================================================

/// `SyncApi` recording every target it receives.
#[derive(Default)]
pub struct RecordingSyncApi {
    targets: Mutex<Vec<(u64, Vec<PeerAddress>)>>,
    stopped: AtomicBool,
}

impl RecordingSyncApi {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Targets received, in order.
    pub fn targets(&self) -> Vec<(u64, Vec<PeerAddress>)> {
        self.targets.lock().clone()
    }

    /// Make every later call fail with `SyncError::Stopped`.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SyncApi for RecordingSyncApi {
    async fn set_sync_target_block(
        &self,
        height: u64,
        peers: Vec<PeerAddress>,
    ) -> Result<(), SyncError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(SyncError::Stopped);
        }
        self.targets.lock().push((height, peers));
        Ok(())
    }

    async fn sync_progress(&self) -> Result<SyncProgress, SyncError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(SyncError::Stopped);
        }
        let highest = self.targets.lock().iter().map(|(h, _)| *h).max().unwrap_or(0);
        Ok(SyncProgress {
            starting_block: 0,
            current_block: 0,
            highest_block: highest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_fixture_is_linked() {
        let chain = chain_fixture(4);
        assert_eq!(chain.len(), 5);
        for pair in chain.windows(2) {
            assert_eq!(pair[1].block.prev_block_hash, pair[0].block.hash);
        }
    }

    #[test]
    fn test_seeds_differ() {
        let a = chain_fixture_with_seed(2, 1);
        let b = chain_fixture_with_seed(2, 2);
        assert_ne!(a[2].block.hash, b[2].block.hash);
    }

    #[tokio::test]
    async fn test_scripted_failures_run_out() {
        let fetcher = ScriptedFetcher::new(chain_fixture(3));
        fetcher.fail_times(2, 1);
        let info = SyncInfo::new(2, vec![]);

        assert!(fetcher.fetch(&info).await.is_err());
        assert!(fetcher.fetch(&info).await.is_ok());
        assert_eq!(fetcher.calls_for(2), 2);
    }
}
