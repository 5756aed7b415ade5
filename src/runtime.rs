//! Live state shared by entry points, the configuration watcher and the admin API.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::builder::{BuildReport, Graph};
use crate::config::schema::{EntryPointConfig, Protocol};
use crate::health::{HealthRegistry, HealthTargets};
use crate::http::server::SharedHttpRoutes;
use crate::net::server::SharedTcpRoutes;
use crate::routing::{HttpRoutes, TcpRoutes};

pub struct Runtime {
    http: BTreeMap<String, SharedHttpRoutes>,
    tcp: BTreeMap<String, SharedTcpRoutes>,
    report: ArcSwap<BuildReport>,
    health: Arc<HealthRegistry>,
    targets: Arc<ArcSwap<HealthTargets>>,
    generation: AtomicU64,
}

impl Runtime {
    /// One empty routing table per configured entry point.
    pub fn new(entry_points: &BTreeMap<String, EntryPointConfig>, health: Arc<HealthRegistry>) -> Self {
        let mut http = BTreeMap::new();
        let mut tcp = BTreeMap::new();
        for (name, ep) in entry_points {
            match ep.protocol {
                Protocol::Http => {
                    http.insert(name.clone(), Arc::new(ArcSwap::from_pointee(HttpRoutes::default())));
                }
                Protocol::Tcp => {
                    tcp.insert(name.clone(), Arc::new(ArcSwap::from_pointee(TcpRoutes::default())));
                }
            }
        }

        Self {
            http,
            tcp,
            report: ArcSwap::from_pointee(BuildReport::new()),
            health,
            targets: Arc::new(ArcSwap::from_pointee(HealthTargets::default())),
            generation: AtomicU64::new(0),
        }
    }

    pub fn http_routes(&self, entry_point: &str) -> Option<SharedHttpRoutes> {
        self.http.get(entry_point).cloned()
    }

    pub fn tcp_routes(&self, entry_point: &str) -> Option<SharedTcpRoutes> {
        self.tcp.get(entry_point).cloned()
    }

    /// Report of the last applied graph.
    pub fn report(&self) -> Arc<BuildReport> {
        self.report.load_full()
    }

    pub fn health(&self) -> &Arc<HealthRegistry> {
        &self.health
    }

    pub fn targets(&self) -> &Arc<ArcSwap<HealthTargets>> {
        &self.targets
    }

    /// Number of graphs applied so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Swap every entry point onto `graph`. Entry points the graph does not
    /// mention get an empty table.
    pub fn apply(&self, mut graph: Graph) {
        for (name, routes) in &self.http {
            routes.store(Arc::new(graph.http.remove(name).unwrap_or_default()));
        }
        for (name, routes) in &self.tcp {
            routes.store(Arc::new(graph.tcp.remove(name).unwrap_or_default()));
        }
        self.report.store(Arc::new(graph.report));

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::info!(generation, "Configuration applied");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{ComponentId, ComponentKind};
    use crate::handler::HttpHandler;
    use crate::load_balancer::RoundRobin;
    use crate::routing::matcher::AndMatcher;
    use crate::routing::HttpRoute;

    fn entry_points() -> BTreeMap<String, EntryPointConfig> {
        let web = EntryPointConfig::default();
        let db = EntryPointConfig {
            protocol: Protocol::Tcp,
            ..Default::default()
        };
        BTreeMap::from([("web".to_string(), web), ("db".to_string(), db)])
    }

    #[test]
    fn apply_swaps_tables_and_report() {
        let runtime = Runtime::new(&entry_points(), Arc::new(HealthRegistry::new(1, 1)));
        let web = runtime.http_routes("web").unwrap();
        assert!(runtime.tcp_routes("web").is_none());
        assert_eq!(runtime.generation(), 0);

        let handler: Arc<dyn HttpHandler> = Arc::new(RoundRobin::<dyn HttpHandler>::new("app"));
        let mut graph = Graph::default();
        graph.http.insert(
            "web".into(),
            HttpRoutes::new(vec![HttpRoute::new("r", 0, AndMatcher::new(Vec::new()), handler)]),
        );
        graph
            .report
            .enable(ComponentId::new(Protocol::Http, ComponentKind::Router, "r"));
        runtime.apply(graph);

        assert_eq!(web.load().names(), vec!["r"]);
        assert!(runtime.report().is_enabled(Protocol::Http, ComponentKind::Router, "r"));
        assert_eq!(runtime.generation(), 1);

        runtime.apply(Graph::default());
        assert!(web.load().is_empty());
        assert!(runtime.report().is_empty());
    }
}
