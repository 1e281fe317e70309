//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway
//! core. All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the FastCGI gateway core.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Number of worker tasks. Each worker owns a disjoint partition of
    /// request and connection state.
    pub workers: u16,

    /// Requested per-worker in-flight request capacity. Rounded up to the
    /// next power of two at initialization.
    pub request_capacity: u32,

    /// Upstream FastCGI locations the gateway proxies to.
    pub locations: Vec<LocationConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            request_capacity: 256,
            locations: Vec::new(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// One upstream FastCGI location.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocationConfig {
    /// Unique location identifier for routing and logging.
    pub name: String,

    /// Backend address: "127.0.0.1:9000" for TCP, or "unix:/path/to.sock"
    /// for a local socket.
    pub address: String,

    /// When to dial the backend: at worker startup or on first use.
    #[serde(default)]
    pub dial: DialPolicy,

    /// Connection establishment timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_connect_timeout() -> u64 {
    5
}

/// Dial policy for a location's backend connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DialPolicy {
    /// Dial every worker's connection when the worker starts.
    Eager,
    /// Dial on the first request that needs the connection.
    #[default]
    Lazy,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl ObservabilityConfig {
    /// Tracing filter directive used when `RUST_LOG` is unset.
    pub fn env_filter_directive(&self) -> String {
        format!("fastcgi_gateway={}", self.log_level)
    }
}
