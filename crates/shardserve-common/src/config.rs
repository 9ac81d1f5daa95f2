//! Configuration types for ShardServe
//!
//! This module defines configuration structures used across components.
//! Every section falls back to its defaults, so a partial file is valid.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for ShardServe
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Query node configuration
    pub qnode: QNodeConfig,
    /// DNode client configuration
    pub client: ClientConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Query node (router) configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct QNodeConfig {
    /// Address for the REST API
    pub listen: String,
    /// Versions older than the served one kept per tablespace
    pub max_versions_per_tablespace: usize,
    /// Per-attempt query timeout (milliseconds)
    pub query_timeout_ms: u64,
    /// Interval between periodic version sweeps (seconds, 0 = disabled)
    pub reap_interval_secs: u64,
    /// Run a version sweep whenever the served versions change
    pub reap_on_deploy: bool,
    /// Capacity of the membership event channel
    pub event_buffer: usize,
}

impl Default for QNodeConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:4412".to_string(),
            max_versions_per_tablespace: 10,
            query_timeout_ms: 10_000,
            reap_interval_secs: 300,
            reap_on_deploy: true,
            event_buffer: 1024,
        }
    }
}

impl QNodeConfig {
    /// Per-attempt query timeout
    #[must_use]
    pub const fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    /// Periodic sweep interval, `None` when disabled
    #[must_use]
    pub const fn reap_interval(&self) -> Option<Duration> {
        if self.reap_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.reap_interval_secs))
        }
    }
}

/// DNode RPC client configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Connection timeout (milliseconds)
    pub connect_timeout_ms: u64,
    /// Timeout for delete-old-versions calls (milliseconds)
    pub delete_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 2_000,
            delete_timeout_ms: 30_000,
        }
    }
}

impl ClientConfig {
    /// Connection timeout
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Timeout for delete-old-versions calls
    #[must_use]
    pub const fn delete_timeout(&self) -> Duration {
        Duration::from_millis(self.delete_timeout_ms)
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
