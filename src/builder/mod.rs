//! Instantiation graph builder.
//!
//! # Data Flow
//! ```text
//! DynamicConfig snapshot + entry points
//!     → build_graph()
//!         for each router: stack.push(router) → middlewares → service
//!             (http.rs / tcp.rs, recursion check before any construction)
//!         → routing tables per entry point (routing::router)
//!         → BuildReport (enabled / disabled with errors, per component)
//!     → Graph, swapped into the running entry points
//! ```
//!
//! # Design Decisions
//! - Every nested construction gets its own copy of the instantiation stack
//! - The cycle check runs before the memo lookup and before the constructor
//! - Middlewares and services are memoized by name for the snapshot, failures included;
//!   two routers naming the same middleware share one instance and its state
//! - Stateful middlewares can outlive the snapshot through `MiddlewareStates`
//! - Routers are never memoized; each is built exactly once per graph
//! - A failing component only disables itself and whatever references it (partial apply)
//! - No I/O during build: servers are parsed, not contacted

pub mod http;
pub mod report;
pub mod stack;
pub mod state;
pub mod tcp;

pub use report::{BuildReport, ComponentId, ComponentStatus, Status};
pub use stack::{ComponentKind, InstantiationStack};
pub use state::MiddlewareStates;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use thiserror::Error;

use crate::config::dynamic::DynamicConfig;
use crate::config::schema::{EntryPointConfig, Protocol, TimeoutConfig};
use crate::handler::{HttpHandler, TcpHandler};
use crate::health::HealthRegistry;
use crate::http::forward::{http_client, HttpClient};
use crate::middleware::{HttpMiddleware, TcpMiddleware};
use crate::observability::metrics;
use crate::routing::{HttpRoute, HttpRoutes, TcpRoute, TcpRoutes};

/// Build-time failures, scoped to one component.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// A component references itself, directly or transitively.
    #[error("recursion detected in {path}")]
    RecursionDetected { path: String },

    #[error("{kind} {name:?} does not exist")]
    NotFound { kind: ComponentKind, name: String },

    #[error("invalid {kind} {name:?}: {reason}")]
    InvalidConfig {
        kind: ComponentKind,
        name: String,
        reason: String,
    },

    #[error("no {protocol} entry point named {entry_point:?}")]
    UnknownEntryPoint {
        protocol: Protocol,
        entry_point: String,
    },
}

impl BuildError {
    pub(crate) fn invalid(kind: ComponentKind, name: &str, reason: impl Into<String>) -> Self {
        BuildError::InvalidConfig {
            kind,
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(kind: ComponentKind, name: &str) -> Self {
        BuildError::NotFound {
            kind,
            name: name.to_string(),
        }
    }
}

/// Result of building one snapshot.
#[derive(Default)]
pub struct Graph {
    /// Routing table per HTTP entry point (every configured one, possibly empty).
    pub http: BTreeMap<String, HttpRoutes>,
    /// Routing table per TCP entry point.
    pub tcp: BTreeMap<String, TcpRoutes>,
    pub report: BuildReport,
}

/// Builds the handler graph of one configuration snapshot.
///
/// Memo tables belong to the snapshot the builder was created for; build a
/// new builder for every snapshot.
pub struct Builder<'a> {
    config: &'a DynamicConfig,
    health: Option<&'a HealthRegistry>,
    states: Option<&'a MiddlewareStates>,
    client: HttpClient,
    timeouts: TimeoutConfig,
    report: BuildReport,
    http_middlewares: HashMap<String, Result<Arc<dyn HttpMiddleware>, BuildError>>,
    http_services: HashMap<String, Result<Arc<dyn HttpHandler>, BuildError>>,
    tcp_middlewares: HashMap<String, Result<Arc<dyn TcpMiddleware>, BuildError>>,
    tcp_services: HashMap<String, Result<Arc<dyn TcpHandler>, BuildError>>,
    constructions: HashMap<(Protocol, String), usize>,
}

impl<'a> Builder<'a> {
    pub fn new(config: &'a DynamicConfig) -> Self {
        let timeouts = TimeoutConfig::default();
        Self {
            config,
            health: None,
            states: None,
            client: http_client(timeouts.connect()),
            timeouts,
            report: BuildReport::new(),
            http_middlewares: HashMap::new(),
            http_services: HashMap::new(),
            tcp_middlewares: HashMap::new(),
            tcp_services: HashMap::new(),
            constructions: HashMap::new(),
        }
    }

    /// Leave servers this registry marks unhealthy out of balancers.
    pub fn with_health(mut self, health: &'a HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Reuse rate limiters and connection caps kept from earlier graphs.
    pub fn with_states(mut self, states: &'a MiddlewareStates) -> Self {
        self.states = Some(states);
        self
    }

    pub fn with_client(mut self, client: HttpClient) -> Self {
        self.client = client;
        self
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn report(&self) -> &BuildReport {
        &self.report
    }

    /// How many times the constructor of `kind:name` ran.
    pub fn constructions(&self, protocol: Protocol, kind: ComponentKind, name: &str) -> usize {
        self.constructions
            .get(&(protocol, stack::token(kind, name)))
            .copied()
            .unwrap_or(0)
    }

    /// Whether `kind:name` was memoized (successfully or not).
    pub fn is_built(&self, protocol: Protocol, kind: ComponentKind, name: &str) -> bool {
        match (protocol, kind) {
            (Protocol::Http, ComponentKind::Middleware) => self.http_middlewares.contains_key(name),
            (Protocol::Http, ComponentKind::Service) => self.http_services.contains_key(name),
            (Protocol::Tcp, ComponentKind::Middleware) => self.tcp_middlewares.contains_key(name),
            (Protocol::Tcp, ComponentKind::Service) => self.tcp_services.contains_key(name),
            (_, ComponentKind::Router) => false,
        }
    }

    fn is_healthy(&self, server: &str) -> bool {
        self.health.map_or(true, |health| health.is_healthy(server))
    }

    fn record_construction(&mut self, protocol: Protocol, kind: ComponentKind, name: &str) {
        *self
            .constructions
            .entry((protocol, stack::token(kind, name)))
            .or_insert(0) += 1;
    }

    fn record_outcome<T>(
        &mut self,
        protocol: Protocol,
        kind: ComponentKind,
        name: &str,
        result: &Result<T, BuildError>,
    ) {
        let id = ComponentId::new(protocol, kind, name);
        match result {
            Ok(_) => self.report.enable(id),
            Err(e) => {
                tracing::warn!(%protocol, %kind, name, error = %e, "Component build failed");
                metrics::record_build_error(kind_label(kind));
                self.report.add_error(id, e.to_string());
            }
        }
    }

    /// Build every router and group them by entry point.
    pub fn build_graph(&mut self, entry_points: &BTreeMap<String, EntryPointConfig>) -> Graph {
        let mut http: BTreeMap<String, Vec<HttpRoute>> = BTreeMap::new();
        let mut tcp: BTreeMap<String, Vec<TcpRoute>> = BTreeMap::new();
        for (name, ep) in entry_points {
            match ep.protocol {
                Protocol::Http => {
                    http.insert(name.clone(), Vec::new());
                }
                Protocol::Tcp => {
                    tcp.insert(name.clone(), Vec::new());
                }
            }
        }

        let config = self.config;
        for (name, router) in &config.http.routers {
            let Some(targets) =
                self.resolve_entry_points(Protocol::Http, name, &router.entry_points, &http)
            else {
                continue;
            };
            match self.build_http_router(name, &InstantiationStack::new()) {
                Ok(handler) => {
                    self.report
                        .enable(ComponentId::new(Protocol::Http, ComponentKind::Router, name));
                    for ep in targets {
                        if let Some(routes) = http.get_mut(&ep) {
                            routes.push(http::route(name, router, handler.clone()));
                        }
                    }
                }
                Err(e) => self.record_router_error(Protocol::Http, name, &e),
            }
        }

        for (name, router) in &config.tcp.routers {
            let Some(targets) =
                self.resolve_entry_points(Protocol::Tcp, name, &router.entry_points, &tcp)
            else {
                continue;
            };
            match self.build_tcp_router(name, &InstantiationStack::new()) {
                Ok(handler) => {
                    self.report
                        .enable(ComponentId::new(Protocol::Tcp, ComponentKind::Router, name));
                    for ep in targets {
                        if let Some(routes) = tcp.get_mut(&ep) {
                            routes.push(tcp::route(name, router, handler.clone()));
                        }
                    }
                }
                Err(e) => self.record_router_error(Protocol::Tcp, name, &e),
            }
        }

        let graph = Graph {
            http: http.into_iter().map(|(ep, routes)| (ep, HttpRoutes::new(routes))).collect(),
            tcp: tcp.into_iter().map(|(ep, routes)| (ep, TcpRoutes::new(routes))).collect(),
            report: self.report.clone(),
        };
        tracing::info!(
            components = graph.report.len(),
            errors = graph.report.error_count(),
            "Handler graph built"
        );
        graph
    }

    /// Entry points a router attaches to; an empty list means every entry point
    /// of the router's protocol. `None` (and a recorded error) if any is unknown.
    fn resolve_entry_points<T>(
        &mut self,
        protocol: Protocol,
        router: &str,
        requested: &[String],
        known: &BTreeMap<String, T>,
    ) -> Option<Vec<String>> {
        if requested.is_empty() {
            return Some(known.keys().cloned().collect());
        }

        let mut ok = true;
        for ep in requested {
            if !known.contains_key(ep) {
                let err = BuildError::UnknownEntryPoint {
                    protocol,
                    entry_point: ep.clone(),
                };
                self.record_router_error(protocol, router, &err);
                ok = false;
            }
        }
        ok.then(|| requested.to_vec())
    }

    fn record_router_error(&mut self, protocol: Protocol, name: &str, err: &BuildError) {
        tracing::warn!(%protocol, router = name, error = %err, "Router disabled");
        metrics::record_build_error(kind_label(ComponentKind::Router));
        self.report.add_error(
            ComponentId::new(protocol, ComponentKind::Router, name),
            err.to_string(),
        );
    }
}

fn kind_label(kind: ComponentKind) -> &'static str {
    match kind {
        ComponentKind::Router => "router",
        ComponentKind::Middleware => "middleware",
        ComponentKind::Service => "service",
    }
}
