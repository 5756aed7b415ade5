//! Dynamic configuration snapshot.
//!
//! A snapshot describes routers, middlewares and services by name. Providers
//! produce snapshots; the builder compiles them into handler graphs. Names are
//! unique within their namespace (`http.routers`, `tcp.services`, ...), and
//! references between components are plain names.
//!
//! Maps are ordered so that builds and reports are deterministic.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One snapshot of the dynamic configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DynamicConfig {
    pub http: HttpConfig,
    pub tcp: TcpConfig,
}

/// HTTP routers, middlewares and services.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    pub routers: BTreeMap<String, HttpRouterConfig>,
    pub middlewares: BTreeMap<String, HttpMiddlewareConfig>,
    pub services: BTreeMap<String, HttpServiceConfig>,
}

/// An HTTP router: rule + middlewares + service.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HttpRouterConfig {
    /// Entry points the router attaches to; all HTTP entry points when empty.
    #[serde(default)]
    pub entry_points: Vec<String>,

    /// Match conditions.
    #[serde(default)]
    pub rule: RuleConfig,

    /// Middlewares applied in order, outermost first.
    #[serde(default)]
    pub middlewares: Vec<String>,

    /// Service receiving the traffic.
    pub service: String,

    /// Higher priority routers are matched first.
    #[serde(default)]
    pub priority: i32,
}

/// Request match conditions, combined with AND. An empty rule matches everything.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RuleConfig {
    /// Host header to match (case-insensitive, port ignored).
    pub host: Option<String>,

    /// Path prefix to match.
    pub path_prefix: Option<String>,
}

/// HTTP middleware definitions.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HttpMiddlewareConfig {
    /// Applies other middlewares, by name, in order.
    Chain(ChainConfig),
    /// Sets request and response headers.
    Headers(HeadersConfig),
    /// Removes a leading path prefix.
    StripPrefix(StripPrefixConfig),
    /// Rejects clients outside the given ranges.
    IpAllowList(IpAllowListConfig),
    /// Per-client token bucket.
    RateLimit(RateLimitConfig),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ChainConfig {
    pub middlewares: Vec<String>,
}

/// Custom headers. An empty value removes the header.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HeadersConfig {
    pub request: BTreeMap<String, String>,
    pub response: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StripPrefixConfig {
    pub prefixes: Vec<String>,
}

/// CIDR ranges (or single addresses) allowed to pass.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct IpAllowListConfig {
    pub source_range: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Sustained requests per second per client.
    pub average: u32,

    /// Bucket capacity.
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            average: 100,
            burst: 50,
        }
    }
}

/// HTTP service definitions.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HttpServiceConfig {
    /// Round-robin over backend servers.
    LoadBalancer(HttpLoadBalancerConfig),
    /// Weighted round-robin over other services, by name.
    Weighted(WeightedConfig),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HttpLoadBalancerConfig {
    #[serde(default)]
    pub servers: Vec<HttpServerConfig>,

    /// Forward the client's Host header instead of the server's authority.
    #[serde(default = "default_true")]
    pub pass_host_header: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HttpServerConfig {
    /// Base URL (e.g., "http://127.0.0.1:3000").
    pub url: String,

    /// Declared weight; not used by the round-robin balancer.
    #[serde(default)]
    pub weight: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WeightedConfig {
    pub services: Vec<WeightedServiceRef>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WeightedServiceRef {
    pub name: String,

    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

/// TCP routers, middlewares and services.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TcpConfig {
    pub routers: BTreeMap<String, TcpRouterConfig>,
    pub middlewares: BTreeMap<String, TcpMiddlewareConfig>,
    pub services: BTreeMap<String, TcpServiceConfig>,
}

/// A TCP router. Connections are not inspected; the highest-priority router of
/// an entry point receives every connection.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TcpRouterConfig {
    #[serde(default)]
    pub entry_points: Vec<String>,

    #[serde(default)]
    pub middlewares: Vec<String>,

    pub service: String,

    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TcpMiddlewareConfig {
    IpAllowList(IpAllowListConfig),
    InFlightConn(InFlightConnConfig),
}

/// Maximum simultaneous connections per client IP.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct InFlightConnConfig {
    pub amount: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TcpServiceConfig {
    LoadBalancer(TcpLoadBalancerConfig),
    Weighted(WeightedConfig),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TcpLoadBalancerConfig {
    pub servers: Vec<TcpServerConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TcpServerConfig {
    /// Backend address (e.g., "127.0.0.1:5432").
    pub address: String,

    #[serde(default)]
    pub weight: Option<u32>,
}

impl HttpServiceConfig {
    /// Server URLs of a load-balancer service.
    pub fn server_urls(&self) -> Vec<&str> {
        match self {
            HttpServiceConfig::LoadBalancer(lb) => lb.servers.iter().map(|s| s.url.as_str()).collect(),
            HttpServiceConfig::Weighted(_) => Vec::new(),
        }
    }
}

impl TcpServiceConfig {
    /// Server addresses of a load-balancer service.
    pub fn server_addresses(&self) -> Vec<&str> {
        match self {
            TcpServiceConfig::LoadBalancer(lb) => lb.servers.iter().map(|s| s.address.as_str()).collect(),
            TcpServiceConfig::Weighted(_) => Vec::new(),
        }
    }
}
