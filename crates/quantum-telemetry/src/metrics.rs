//! Prometheus metrics for the block sync pipeline.
//!
//! All metrics follow the naming convention: `qc_<subsystem>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., blocks_persisted_total)
//! - **Gauge**: Value that can go up or down (e.g., current_height)
//! - **Histogram**: Distribution of values (e.g., block_persist_duration_seconds)

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Gauge, Histogram, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // SYNC PROGRESS
    // =========================================================================

    /// Highest height scheduled by the sync control loop
    pub static ref SYNC_CURRENT_HEIGHT: Gauge = Gauge::new(
        "qc_sync_current_height",
        "Highest block height scheduled for sync"
    ).expect("metric creation failed");

    /// Network watermark the node is syncing towards
    pub static ref SYNC_HIGHEST_HEIGHT: Gauge = Gauge::new(
        "qc_sync_highest_height",
        "Highest block height reported by peers"
    ).expect("metric creation failed");

    /// Blocks persisted by the sync pipeline
    pub static ref SYNC_BLOCKS_PERSISTED: Counter = Counter::new(
        "qc_sync_blocks_persisted_total",
        "Total number of blocks persisted by sync"
    ).expect("metric creation failed");

    // =========================================================================
    // SYNC FAILURES
    // =========================================================================

    /// Fetch failures by reason
    pub static ref SYNC_FETCH_FAILURES: CounterVec = CounterVec::new(
        Opts::new("qc_sync_fetch_failures_total", "Failed block fetches"),
        &["reason"]  // reason: not_found/network/timeout/malformed/no_peers
    ).expect("metric creation failed");

    /// Fetched heights rejected by the rule set or the store
    pub static ref SYNC_VALIDATION_FAILURES: Counter = Counter::new(
        "qc_sync_validation_failures_total",
        "Fetched blocks that failed validation or persistence"
    ).expect("metric creation failed");

    /// Heights deferred because every worker was busy
    pub static ref SYNC_POOL_REJECTIONS: Counter = Counter::new(
        "qc_sync_pool_rejections_total",
        "Work submissions shed because the pool was saturated"
    ).expect("metric creation failed");

    /// Validate + persist duration
    pub static ref SYNC_PERSIST_DURATION: Histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "qc_sync_block_persist_duration_seconds",
            "Time spent validating and persisting a fetched block"
        ).buckets(exponential_buckets(0.0001, 2.0, 14).expect("valid buckets"))
    ).expect("metric creation failed");

    // =========================================================================
    // PEER METRICS
    // =========================================================================

    /// Connected peers
    pub static ref PEERS_CONNECTED: Gauge = Gauge::new(
        "qc_peers_connected",
        "Number of currently connected peers"
    ).expect("metric creation failed");
}

/// Handle proving the metrics were registered.
pub struct MetricsHandle {
    _registry: Arc<Registry>,
}

/// Register all metrics with the global registry.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Progress
        Box::new(SYNC_CURRENT_HEIGHT.clone()),
        Box::new(SYNC_HIGHEST_HEIGHT.clone()),
        Box::new(SYNC_BLOCKS_PERSISTED.clone()),
        // Failures
        Box::new(SYNC_FETCH_FAILURES.clone()),
        Box::new(SYNC_VALIDATION_FAILURES.clone()),
        Box::new(SYNC_POOL_REJECTIONS.clone()),
        Box::new(SYNC_PERSIST_DURATION.clone()),
        // Peers
        Box::new(PEERS_CONNECTED.clone()),
    ];

    for metric in metrics {
        REGISTRY
            .register(metric)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }

    Ok(MetricsHandle {
        _registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}

/// Start timing for a histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::HistogramTimer::new(&$histogram)
    };
}
