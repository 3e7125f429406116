//! # Sync Pipeline Flows
//!
//! Drives Syncer, Pool, Fetcher, Validator and Watcher together against
//! in-process peers and the in-memory block store.
//!
//! ## Flows Tested
//!
//! 1. **Catch-up from empty**: a target on an empty store is reached
//! 2. **Transient failures**: a height that fails twice is still persisted
//! 3. **Monotonic target**: a lower target never replaces a higher one
//! 4. **Watcher → Syncer**: the network maximum becomes the target
//! 5. **Idempotence / no redundant work / clean shutdown**

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use qc_18_block_sync::test_utils::{
        chain_fixture, sync_info_for, ChainNodeClient, RecordingValidator, ScriptedFetcher,
    };
    use qc_18_block_sync::{
        shutdown_channel, BlockFetcher, BlockStore, BlockValidator, Fetcher, InMemoryBlockStore,
        PeerTable, Pool, SyncApi, SyncConfig, SyncError, SyncProgress, Syncer, SyncerHandle,
        Validator, Watcher,
    };
    use shared_types::PeerAddress;
    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    struct Node {
        syncer: Arc<Syncer>,
        handle: SyncerHandle,
        store: Arc<InMemoryBlockStore>,
        runner: JoinHandle<Result<(), SyncError>>,
    }

    impl Node {
        fn start(
            config: SyncConfig,
            fetcher: Arc<dyn BlockFetcher>,
            validator: Arc<dyn BlockValidator>,
            store: Arc<InMemoryBlockStore>,
        ) -> Self {
            let syncer = Arc::new(Syncer::new(config, fetcher, validator, store.clone()).unwrap());
            let handle = syncer.handle();
            let runner = {
                let syncer = syncer.clone();
                tokio::spawn(async move { syncer.start().await })
            };
            Self {
                syncer,
                handle,
                store,
                runner,
            }
        }

        /// Node syncing from a scripted fetcher with the real validator.
        fn scripted(config: SyncConfig, fetcher: Arc<ScriptedFetcher>) -> Self {
            let store = Arc::new(InMemoryBlockStore::new());
            let validator = Arc::new(Validator::new(store.clone()));
            Self::start(config, fetcher, validator, store)
        }

        async fn wait_for_height(&self, height: u64) -> SyncProgress {
            timeout(Duration::from_secs(10), async {
                loop {
                    let progress = self.handle.sync_progress().await.unwrap();
                    let stored = self.store.latest_block().unwrap().map(|b| b.height);
                    let complete = (1..=height)
                        .all(|h| self.store.exists_block_by_height(h).unwrap_or(false));
                    if progress.current_block >= height && stored == Some(height) && complete {
                        return progress;
                    }
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            })
            .await
            .expect("node should reach the target height")
        }

        async fn shutdown(self) {
            timeout(Duration::from_secs(5), self.syncer.stop())
                .await
                .expect("stop should return promptly");
            self.runner.await.unwrap().unwrap();
        }
    }

    // =========================================================================
    // SCENARIOS
    // =========================================================================

    #[tokio::test]
    async fn test_empty_store_syncs_to_target() {
        let fetcher = Arc::new(ScriptedFetcher::new(chain_fixture(10)));
        let node = Node::scripted(SyncConfig::for_testing(), fetcher);

        node.handle
            .set_sync_target_block(10, vec![PeerAddress::from("a")])
            .await
            .unwrap();
        let progress = node.wait_for_height(10).await;

        assert_eq!(progress.current_block, 10);
        assert_eq!(progress.highest_block, 10);
        assert_eq!(node.store.latest_block().unwrap().map(|b| b.height), Some(10));
        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_height_failing_twice_is_still_persisted() {
        let fetcher = Arc::new(ScriptedFetcher::new(chain_fixture(8)));
        fetcher.fail_times(5, 2);
        let node = Node::scripted(SyncConfig::for_testing(), fetcher.clone());

        node.handle.set_sync_target_block(8, vec![]).await.unwrap();
        node.wait_for_height(8).await;

        assert!(node.store.exists_block_by_height(5).unwrap());
        assert_eq!(fetcher.calls_for(5), 3);
        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_lower_target_is_ignored() {
        // Peers have nothing yet, so only the target moves
        let fetcher = Arc::new(ScriptedFetcher::new(chain_fixture(0)));
        let node = Node::scripted(SyncConfig::for_testing(), fetcher);

        node.handle.set_sync_target_block(5, vec![]).await.unwrap();
        node.handle.set_sync_target_block(3, vec![]).await.unwrap();

        let progress = node.handle.sync_progress().await.unwrap();
        assert_eq!(progress.highest_block, 5);
        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_watcher_forwards_network_maximum() {
        let chain = chain_fixture(7);
        let peers = Arc::new(PeerTable::new());
        for (name, tip) in [("a", 3usize), ("b", 7), ("c", 5)] {
            let address = PeerAddress::from(name);
            let client = ChainNodeClient::new(chain[..=tip].to_vec()).with_address(address.clone());
            peers.connect(address, Arc::new(client));
        }
        assert_eq!(peers.refresh(Duration::from_secs(1)).await, 3);

        let store = Arc::new(InMemoryBlockStore::new());
        store.insert_bundle(&chain[0]);
        let config = SyncConfig::for_testing();
        let fetcher = Arc::new(Fetcher::new(peers.clone(), config.fetch_timeout()));
        let validator = Arc::new(Validator::new(store.clone()));
        let node = Node::start(config.clone(), fetcher, validator, store);

        let watcher = Watcher::new(peers, Arc::new(node.handle.clone()), config.watch_interval());
        let mark = watcher.tick().await.unwrap().expect("watermark forwarded");
        assert_eq!(mark.height, 7);
        assert_eq!(mark.peers, vec![PeerAddress::from("b")]);

        let progress = node.wait_for_height(7).await;
        assert_eq!(progress.highest_block, 7);
        assert_eq!(node.store.latest_block().unwrap(), Some(chain[7].block.clone()));
        node.shutdown().await;
    }

    // =========================================================================
    // PROPERTIES
    // =========================================================================

    #[tokio::test]
    async fn test_validate_twice_is_idempotent() {
        let chain = chain_fixture(3);
        let store = Arc::new(InMemoryBlockStore::new());
        store.insert_bundle(&chain[0]);
        let validator = Validator::new(store.clone());
        let info = sync_info_for(&chain, 1);

        validator.validate(&info).await.unwrap();
        let after_first = store.snapshot();
        validator.validate(&info).await.unwrap();

        assert_eq!(store.snapshot(), after_first);
    }

    #[tokio::test]
    async fn test_stored_heights_are_not_refetched() {
        let chain = chain_fixture(8);
        let store = Arc::new(InMemoryBlockStore::new());
        for bundle in &chain[..=5] {
            store.insert_bundle(bundle);
        }
        let fetcher = Arc::new(ScriptedFetcher::new(chain));
        let validator = Arc::new(RecordingValidator::new(Arc::new(Validator::new(
            store.clone(),
        ))));
        let node = Node::start(
            SyncConfig::for_testing(),
            fetcher.clone(),
            validator.clone(),
            store,
        );

        node.handle.set_sync_target_block(8, vec![]).await.unwrap();
        node.wait_for_height(8).await;

        for height in 0..=5 {
            assert_eq!(fetcher.calls_for(height), 0, "height {} refetched", height);
            assert_eq!(validator.calls_for(height), 0, "height {} revalidated", height);
        }
        for height in 6..=8 {
            assert_eq!(validator.calls_for(height), 1);
        }
        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_saturated_pool_still_reaches_target() {
        let config = SyncConfig {
            pool_size: 2,
            ..SyncConfig::for_testing()
        };
        let fetcher = Arc::new(ScriptedFetcher::new(chain_fixture(25)));
        let node = Node::scripted(config, fetcher.clone());

        node.handle.set_sync_target_block(25, vec![]).await.unwrap();
        node.wait_for_height(25).await;

        assert_eq!(fetcher.total_calls(), 25);
        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_stop_ends_endless_retries() {
        let fetcher = Arc::new(ScriptedFetcher::new(chain_fixture(3)));
        fetcher.fail_times(2, u32::MAX);
        let node = Node::scripted(SyncConfig::for_testing(), fetcher.clone());
        let handle = node.handle.clone();

        handle.set_sync_target_block(3, vec![]).await.unwrap();
        timeout(Duration::from_secs(5), async {
            while fetcher.calls_for(2) < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("height 2 should be retried");

        node.shutdown().await;

        let calls = fetcher.calls_for(2);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fetcher.calls_for(2), calls, "retries continued after stop");
        assert!(matches!(
            handle.set_sync_target_block(9, vec![]).await,
            Err(SyncError::Stopped)
        ));
    }

    #[tokio::test]
    async fn test_pool_finish_waits_for_cancelled_workers() {
        let pool = Pool::new(3);
        let (trigger, signal) = shutdown_channel();

        for _ in 0..3 {
            let job_signal = signal.clone();
            pool.add(&signal, async move { job_signal.cancelled().await })
                .await
                .unwrap();
        }
        assert!(!pool.try_add(async {}));

        trigger.fire();
        timeout(Duration::from_secs(5), pool.finish())
            .await
            .expect("finish should return once workers exit");

        assert!(pool.is_finished());
        assert!(matches!(
            pool.add(&signal, async {}).await,
            Err(SyncError::PoolFinished)
        ));
    }
}
