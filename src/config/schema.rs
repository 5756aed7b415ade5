//! Static configuration schema.
//!
//! The static configuration is read once at startup. It names the entry points,
//! the configuration provider, and the tuning knobs of the background jobs.
//! Routers, middlewares and services live in the dynamic configuration
//! (see [`crate::config::dynamic`]) and may change at runtime.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root static configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Named listeners that routers attach to.
    pub entry_points: BTreeMap<String, EntryPointConfig>,

    /// Sources of dynamic configuration.
    pub providers: ProvidersConfig,

    /// Admin API settings.
    pub api: ApiConfig,

    /// Active health check settings.
    pub health_check: HealthCheckConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Backoff applied to background jobs (providers).
    pub backoff: BackoffConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        let mut entry_points = BTreeMap::new();
        entry_points.insert("web".to_string(), EntryPointConfig::default());
        Self {
            entry_points,
            providers: ProvidersConfig::default(),
            api: ApiConfig::default(),
            health_check: HealthCheckConfig::default(),
            timeouts: TimeoutConfig::default(),
            backoff: BackoffConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Traffic kind served by an entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Tcp,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Http => write!(f, "http"),
            Protocol::Tcp => write!(f, "tcp"),
        }
    }
}

/// Entry point (listener) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EntryPointConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub address: String,

    /// Whether the entry point carries HTTP requests or raw TCP connections.
    pub protocol: Protocol,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for EntryPointConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:8080".to_string(),
            protocol: Protocol::Http,
            max_connections: 10_000,
        }
    }
}

/// Configuration providers.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProvidersConfig {
    /// File provider; disabled when absent.
    pub file: Option<FileProviderConfig>,
}

/// File provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileProviderConfig {
    /// Path of the dynamic configuration file (TOML).
    pub path: PathBuf,

    /// Reload the file when it changes.
    #[serde(default = "default_true")]
    pub watch: bool,
}

fn default_true() -> bool {
    true
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// Admin API bind address.
    pub bind_address: String,

    /// Bearer token; the API is open when unset.
    pub api_key: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: "127.0.0.1:8081".to_string(),
            api_key: None,
        }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable active health checks.
    pub enabled: bool,

    /// Health check interval in seconds.
    pub interval_secs: u64,

    /// Health check timeout in seconds.
    pub timeout_secs: u64,

    /// Path to probe for HTTP health checks.
    pub path: String,

    /// Number of consecutive failures before marking unhealthy.
    pub unhealthy_threshold: u32,

    /// Number of consecutive successes before marking healthy.
    pub healthy_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 10,
            timeout_secs: 5,
            path: "/health".to_string(),
            unhealthy_threshold: 3,
            healthy_threshold: 2,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Backend connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Forwarded HTTP request timeout in seconds.
    pub request_secs: u64,

    /// Grace period for in-flight connections on shutdown, in seconds.
    pub drain_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
            drain_secs: 10,
        }
    }
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    pub fn drain(&self) -> Duration {
        Duration::from_secs(self.drain_secs)
    }
}

/// Exponential backoff parameters for background jobs.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// First (and minimum) retry interval in milliseconds.
    pub initial_interval_ms: u64,

    /// Growth factor applied after each failed attempt.
    pub multiplier: f64,

    /// Jitter as a fraction of the nominal interval (0.1 = ±10%).
    pub randomization_factor: f64,

    /// Upper bound of the nominal interval in milliseconds.
    pub max_interval_ms: u64,

    /// Give up once a run of failures lasts longer than this; retries forever when unset.
    pub max_elapsed_time_secs: Option<u64>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: 500,
            multiplier: 2.0,
            randomization_factor: 0.1,
            max_interval_ms: 5_000,
            max_elapsed_time_secs: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}
