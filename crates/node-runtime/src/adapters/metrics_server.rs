//! # Metrics Endpoint
//!
//! Serves the Prometheus text format on `GET /metrics`.

use std::net::SocketAddr;

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use qc_18_block_sync::ShutdownSignal;
use quantum_telemetry::encode_metrics;
use tracing::info;

async fn metrics() -> Result<String, (StatusCode, String)> {
    encode_metrics().map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// Router exposing `/metrics`.
pub fn metrics_router() -> Router {
    Router::new().route("/metrics", get(metrics))
}

/// Serve metrics on `addr` until `shutdown` fires.
pub async fn serve_metrics(addr: SocketAddr, shutdown: ShutdownSignal) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("[qc-18] Metrics available at http://{}/metrics", listener.local_addr()?);
    axum::serve(listener, metrics_router())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
