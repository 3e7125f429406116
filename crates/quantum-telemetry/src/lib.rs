//! # Quantum Telemetry
//!
//! Logging and metrics for the Quantum-Chain sync node.
//!
//! ## Components
//!
//! - **Logging**: `tracing-subscriber` with an env filter, plain or JSON output
//! - **Metrics**: Prometheus counters/gauges/histograms for the sync pipeline
//!
//! ## Usage
//!
//! ```rust,ignore
//! use quantum_telemetry::{TelemetryConfig, init_telemetry};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = TelemetryConfig::from_env();
//!     let _guard = init_telemetry(config).expect("Failed to init telemetry");
//!
//!     // Your application code here
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `QC_LOG_LEVEL` | `info` | Log level filter |
//! | `QC_JSON_LOGS` | `false` | JSON log lines |
//! | `QC_METRICS_PORT` | `9100` | Prometheus port |
//! | `QC_NETWORK` | `testnet` | Network label |

#![warn(missing_docs)]

mod config;
mod logging;
mod metrics;

pub use config::TelemetryConfig;
pub use logging::{build_filter, init_logging};
pub use metrics::{
    encode_metrics, register_metrics, HistogramTimer, MetricsHandle, PEERS_CONNECTED,
    SYNC_BLOCKS_PERSISTED, SYNC_CURRENT_HEIGHT, SYNC_FETCH_FAILURES, SYNC_HIGHEST_HEIGHT,
    SYNC_PERSIST_DURATION, SYNC_POOL_REJECTIONS, SYNC_VALIDATION_FAILURES,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// The global subscriber could not be installed.
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    /// A metric could not be registered or encoded.
    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    /// The configuration is unusable.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and metrics.
///
/// Returns a guard that should be held for the lifetime of the application.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    // Metrics first so early log lines can already be counted against them
    let metrics_handle = register_metrics()?;

    logging::init_logging(&config)?;

    Ok(TelemetryGuard {
        _metrics: metrics_handle,
        service_name: config.service_name,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    _metrics: MetricsHandle,
    service_name: String,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service_name, "Shutting down telemetry...");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TelemetryError::Config("bad filter".to_string());
        assert!(err.to_string().contains("bad filter"));
    }
}
