//! Edge reverse proxy library.
//!
//! Compiles a declarative, hot-reloadable configuration of routers,
//! middlewares and services into a live graph of HTTP and TCP handlers.

pub mod admin;
pub mod builder;
pub mod config;
pub mod handler;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod middleware;
pub mod net;
pub mod observability;
pub mod provider;
pub mod resilience;
pub mod routing;
pub mod runtime;

pub use builder::{BuildError, BuildReport, Builder};
pub use config::{DynamicConfig, ProxyConfig};
pub use lifecycle::{Proxy, Shutdown};
pub use runtime::Runtime;
