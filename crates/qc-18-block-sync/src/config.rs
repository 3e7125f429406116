//! # Block Sync Configuration
//!
//! Tunables for the worker pool, the control loop, the fetcher and the
//! watcher.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{DEFAULT_MAX_RESPONSE_BYTES, DEFAULT_POOL_SIZE};

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A pool with no workers can never make progress.
    #[error("Sync pool size must be at least 1")]
    ZeroPoolSize,

    /// A zero interval would spin the loop or time out every request.
    #[error("Sync setting `{0}` must be greater than zero")]
    ZeroInterval(&'static str),
}

/// Block sync configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncConfig {
    /// Number of concurrent workers fetching and persisting heights.
    pub pool_size: usize,

    /// Period of the control loop's progress check, in milliseconds.
    pub check_interval_ms: u64,

    /// Timeout of one node API request, in milliseconds.
    pub fetch_timeout_ms: u64,

    /// Pause between retries of a failed height, in milliseconds.
    pub retry_interval_ms: u64,

    /// Period of the watcher's peer height poll, in milliseconds.
    pub watch_interval_ms: u64,

    /// Capacity of the command channel into the control loop.
    pub command_buffer: usize,

    /// Largest node API response body accepted from a peer, in bytes.
    pub max_response_bytes: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            check_interval_ms: 30_000,
            fetch_timeout_ms: 60_000,
            retry_interval_ms: 10_000,
            watch_interval_ms: 5_000,
            command_buffer: 16,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }
}

impl SyncConfig {
    /// Create a config for testing (small pool, fast timers).
    pub fn for_testing() -> Self {
        Self {
            pool_size: 4,
            check_interval_ms: 20,
            fetch_timeout_ms: 1_000,
            retry_interval_ms: 10,
            watch_interval_ms: 20,
            command_buffer: 4,
            max_response_bytes: 1024 * 1024,
        }
    }

    /// Reject settings that would stall or spin the pipeline.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_size == 0 {
            return Err(ConfigError::ZeroPoolSize);
        }
        let intervals = [
            ("check_interval_ms", self.check_interval_ms),
            ("fetch_timeout_ms", self.fetch_timeout_ms),
            ("watch_interval_ms", self.watch_interval_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(ConfigError::ZeroInterval(name));
            }
        }
        if self.command_buffer == 0 {
            return Err(ConfigError::ZeroInterval("command_buffer"));
        }
        if self.max_response_bytes == 0 {
            return Err(ConfigError::ZeroInterval("max_response_bytes"));
        }
        Ok(())
    }

    /// Control loop check period.
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    /// Per-request fetch timeout.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// Pause between retries.
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    /// Watcher poll period.
    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms)
    }
}
