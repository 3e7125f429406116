//! # Node API Integration
//!
//! Runs the reqwest node client against an axum server that speaks the
//! node API, then a whole `NodeRuntime` against two such servers.
//!
//! ## Node API
//!
//! - `GET /` - node info (JSON)
//! - `GET /blocks?height-range=H-H+1&mode=full` - NDJSON block stream, 404
//!   for heights the node has not produced

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::extract::{Query, State};
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use parking_lot::RwLock;
    use tokio::time::timeout;

    use node_runtime::container::PeerSpec;
    use node_runtime::{NodeConfig, NodeRuntime};
    use qc_18_block_sync::test_utils::{chain_fixture, node_info_for, sync_info_for};
    use qc_18_block_sync::{
        encode_block_stream, BlockBundle, BlockFetcher, BlockStore, ClientError,
        ConnectionManager, Fetcher, HttpNodeClient, NodeClient, PeerTable, SyncConfig, SyncError,
        SyncInfo,
    };
    use shared_types::{BlockMode, HeightRange, NodeInfo, PeerAddress};

    // =========================================================================
    // TEST NODE API SERVER
    // =========================================================================

    /// Chain a test node serves; can grow while the server runs.
    #[derive(Clone)]
    struct ServedChain {
        name: PeerAddress,
        endpoint: Arc<RwLock<String>>,
        chain: Arc<RwLock<Vec<BlockBundle>>>,
    }

    impl ServedChain {
        fn advance_to(&self, chain: Vec<BlockBundle>) {
            *self.chain.write() = chain;
        }
    }

    async fn info_handler(State(served): State<ServedChain>) -> Json<NodeInfo> {
        let endpoint = served.endpoint.read().clone();
        Json(node_info_for(&served.name, &endpoint, &served.chain.read()))
    }

    async fn blocks_handler(
        State(served): State<ServedChain>,
        Query(params): Query<HashMap<String, String>>,
    ) -> Result<String, StatusCode> {
        let range: HeightRange = params
            .get("height-range")
            .and_then(|r| r.parse().ok())
            .ok_or(StatusCode::BAD_REQUEST)?;
        if params.get("mode").map(String::as_str) != Some("full") {
            return Err(StatusCode::BAD_REQUEST);
        }

        let bundle = served.chain.read().get(range.start as usize).cloned();
        match bundle {
            Some(b) => encode_block_stream(&b.block, &b.transactions, &b.operations)
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR),
            None => Err(StatusCode::NOT_FOUND),
        }
    }

    async fn serve_chain(name: &str, chain: Vec<BlockBundle>) -> (String, ServedChain) {
        let served = ServedChain {
            name: PeerAddress::from(name),
            endpoint: Arc::new(RwLock::new(String::new())),
            chain: Arc::new(RwLock::new(chain)),
        };
        let app = Router::new()
            .route("/", get(info_handler))
            .route("/blocks", get(blocks_handler))
            .with_state(served.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        *served.endpoint.write() = endpoint.clone();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (endpoint, served)
    }

    // =========================================================================
    // CLIENT AND FETCHER
    // =========================================================================

    #[tokio::test]
    async fn test_http_fetcher_populates_sync_info() {
        let chain = chain_fixture(4);
        let (endpoint, _served) = serve_chain("node-1", chain.clone()).await;

        let peers = Arc::new(PeerTable::new());
        let client = HttpNodeClient::new(endpoint, Duration::from_secs(2)).unwrap();
        peers.connect(PeerAddress::from("node-1"), Arc::new(client));
        let fetcher = Fetcher::new(peers, Duration::from_secs(2));

        let request = SyncInfo::new(3, vec![]);
        let populated = fetcher.fetch(&request).await.unwrap();

        let expected = sync_info_for(&chain, 3);
        assert_eq!(populated.block, expected.block);
        assert_eq!(populated.transactions, expected.transactions);
        assert_eq!(populated.operations, expected.operations);
        assert_eq!(populated.source, Some(PeerAddress::from("node-1")));
        // The request itself is untouched
        assert!(request.block.is_none());
    }

    #[tokio::test]
    async fn test_unproduced_height_is_not_found() {
        let (endpoint, _served) = serve_chain("node-1", chain_fixture(2)).await;

        let client = HttpNodeClient::new(endpoint.clone(), Duration::from_secs(2)).unwrap();
        let result = client
            .get_blocks(HeightRange::single(9), BlockMode::Full)
            .await;
        assert_eq!(result, Err(ClientError::NotFound));

        let peers = Arc::new(PeerTable::new());
        peers.connect(PeerAddress::from("node-1"), Arc::new(client));
        let fetcher = Fetcher::new(peers, Duration::from_secs(2));
        let err = fetcher.fetch(&SyncInfo::new(9, vec![])).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_refresh_reads_node_info_over_http() {
        let (endpoint, _served) = serve_chain("node-1", chain_fixture(6)).await;
        let peers = PeerTable::new();
        let client = HttpNodeClient::new(endpoint.clone(), Duration::from_secs(2)).unwrap();
        peers.connect(PeerAddress::from("node-1"), Arc::new(client));

        assert_eq!(peers.refresh(Duration::from_secs(2)).await, 1);
        let info = peers.get_node(&PeerAddress::from("node-1")).unwrap();
        assert_eq!(info.block_height, 6);
        assert_eq!(info.endpoint, endpoint);
    }

    #[tokio::test]
    async fn test_unreachable_peer_is_a_client_error() {
        let peers = Arc::new(PeerTable::new());
        let client = HttpNodeClient::new("http://127.0.0.1:1", Duration::from_secs(1)).unwrap();
        peers.connect(PeerAddress::from("down"), Arc::new(client));
        let fetcher = Fetcher::new(peers, Duration::from_secs(1));

        let err = fetcher.fetch(&SyncInfo::new(1, vec![])).await.unwrap_err();
        assert!(matches!(err, SyncError::Client { .. }));
    }

    // =========================================================================
    // WHOLE NODE
    // =========================================================================

    fn node_config(peers: &[(&str, &str)]) -> NodeConfig {
        let mut config = NodeConfig::default();
        config.sync = SyncConfig::for_testing();
        config.network.node_info_interval_secs = 1;
        config.telemetry.metrics_port = 0;
        config.network.peers = peers
            .iter()
            .map(|(name, endpoint)| format!("{}={}", name, endpoint).parse::<PeerSpec>().unwrap())
            .collect();
        config
    }

    async fn wait_for_tip(runtime: &NodeRuntime, height: u64) {
        let store = runtime.container().store.clone();
        timeout(Duration::from_secs(10), async {
            loop {
                if store.latest_block().unwrap().map(|b| b.height) == Some(height) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("node did not reach height {}", height));
    }

    #[tokio::test]
    async fn test_runtime_catches_up_and_follows_peers() {
        let full = chain_fixture(12);
        let (endpoint_a, served_a) = serve_chain("a", full[..=8].to_vec()).await;
        let (endpoint_b, _served_b) = serve_chain("b", full[..=5].to_vec()).await;

        let mut runtime =
            NodeRuntime::new(node_config(&[("a", &endpoint_a), ("b", &endpoint_b)])).unwrap();
        runtime.start();

        wait_for_tip(&runtime, 8).await;
        let progress = runtime.progress().await.unwrap();
        assert_eq!(progress.highest_block, 8);

        // Peer a produces more blocks; the next refresh and watch pick them up
        served_a.advance_to(full.clone());
        wait_for_tip(&runtime, 12).await;

        let store = runtime.container().store.clone();
        for bundle in &full[1..] {
            assert_eq!(
                store.block_by_height(bundle.block.height).unwrap(),
                Some(bundle.block.clone())
            );
        }

        timeout(Duration::from_secs(5), runtime.shutdown())
            .await
            .expect("shutdown hung");
    }
}
