//! Configuration watcher: turns provider snapshots into running graphs.
//!
//! # Responsibilities
//! - Receive snapshots from providers and health transitions from the monitor
//! - Skip a snapshot identical to the one already applied
//! - Coalesce a burst of messages into one rebuild
//! - Build the graph and swap it into the runtime
//!
//! # Design Decisions
//! - Builds run on the watcher task; live traffic keeps using the previous graph
//!   until the swap
//! - A health transition rebuilds the last applied snapshot so fresh balancers
//!   leave unhealthy servers out
//! - Rate limiters and connection caps whose definition is unchanged survive
//!   the rebuild with their state

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use crate::builder::{Builder, MiddlewareStates};
use crate::config::dynamic::DynamicConfig;
use crate::config::schema::{EntryPointConfig, TimeoutConfig};
use crate::health::HealthTargets;
use crate::http::forward::{http_client, HttpClient};
use crate::observability::metrics;
use crate::runtime::Runtime;

/// Capacity of the watcher's inbox.
pub const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigMessage {
    /// A full snapshot from the named provider.
    Snapshot { provider: String, config: DynamicConfig },
    /// A backend server changed health state.
    HealthChanged,
}

pub struct ConfigurationWatcher {
    runtime: Arc<Runtime>,
    messages: mpsc::Receiver<ConfigMessage>,
    entry_points: BTreeMap<String, EntryPointConfig>,
    timeouts: TimeoutConfig,
    client: HttpClient,
    states: MiddlewareStates,
    current: Option<DynamicConfig>,
}

/// Messages received since the last rebuild, reduced to what matters.
#[derive(Default)]
struct Pending {
    snapshot: Option<(String, DynamicConfig)>,
    health_changed: bool,
}

impl Pending {
    fn push(&mut self, message: ConfigMessage) {
        match message {
            ConfigMessage::Snapshot { provider, config } => self.snapshot = Some((provider, config)),
            ConfigMessage::HealthChanged => self.health_changed = true,
        }
    }
}

impl ConfigurationWatcher {
    /// Returns the watcher and the sender providers and the health monitor use.
    pub fn new(
        runtime: Arc<Runtime>,
        entry_points: BTreeMap<String, EntryPointConfig>,
        timeouts: TimeoutConfig,
    ) -> (Self, mpsc::Sender<ConfigMessage>) {
        let (tx, messages) = mpsc::channel(CHANNEL_CAPACITY);
        let client = http_client(timeouts.connect());
        let watcher = Self {
            runtime,
            messages,
            entry_points,
            timeouts,
            client,
            states: MiddlewareStates::new(),
            current: None,
        };
        (watcher, tx)
    }

    /// Last applied snapshot.
    pub fn current(&self) -> Option<&DynamicConfig> {
        self.current.as_ref()
    }

    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!("Configuration watcher starting");
        loop {
            let first = tokio::select! {
                message = self.messages.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
                _ = shutdown.recv() => break,
            };

            let mut pending = Pending::default();
            pending.push(first);
            while let Ok(message) = self.messages.try_recv() {
                pending.push(message);
            }
            self.process(pending);
        }
        tracing::info!("Configuration watcher stopped");
    }

    /// Handle one message right away. Returns true if a graph was applied.
    pub fn handle(&mut self, message: ConfigMessage) -> bool {
        let mut pending = Pending::default();
        pending.push(message);
        self.process(pending)
    }

    fn process(&mut self, pending: Pending) -> bool {
        let mut rebuild = pending.health_changed && self.current.is_some();

        if let Some((provider, config)) = pending.snapshot {
            if self.current.as_ref() == Some(&config) {
                tracing::debug!(provider = %provider, "Skipping identical configuration");
            } else {
                tracing::info!(provider = %provider, "Received new configuration");
                self.current = Some(config);
                rebuild = true;
            }
        }

        if rebuild {
            self.rebuild();
        }
        rebuild
    }

    fn rebuild(&self) {
        let Some(config) = &self.current else {
            return;
        };

        let graph = Builder::new(config)
            .with_health(self.runtime.health())
            .with_states(&self.states)
            .with_client(self.client.clone())
            .with_timeouts(self.timeouts.clone())
            .build_graph(&self.entry_points);
        self.states.retain(config);

        self.runtime.targets().store(Arc::new(HealthTargets::from_config(config)));
        self.runtime.apply(graph);
        metrics::record_config_reload();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ComponentKind;
    use crate::config::schema::Protocol;
    use crate::handler::HttpHandler;
    use crate::health::HealthRegistry;
    use axum::http::StatusCode;

    fn setup() -> (ConfigurationWatcher, mpsc::Sender<ConfigMessage>, Arc<Runtime>) {
        let entry_points = BTreeMap::from([("web".to_string(), EntryPointConfig::default())]);
        let runtime = Arc::new(Runtime::new(&entry_points, Arc::new(HealthRegistry::new(1, 1))));
        let (watcher, tx) =
            ConfigurationWatcher::new(runtime.clone(), entry_points, TimeoutConfig::default());
        (watcher, tx, runtime)
    }

    fn snapshot(toml: &str) -> ConfigMessage {
        ConfigMessage::Snapshot {
            provider: "file".into(),
            config: toml::from_str(toml).unwrap(),
        }
    }

    const ONE_ROUTER: &str = r#"
        [http.routers.app]
        service = "app"

        [http.services.app.load_balancer]
        servers = [{ url = "http://127.0.0.1:9001" }]
    "#;

    #[tokio::test]
    async fn applies_new_and_skips_identical_snapshots() {
        let (mut watcher, _tx, runtime) = setup();

        assert!(watcher.handle(snapshot(ONE_ROUTER)));
        assert_eq!(runtime.generation(), 1);
        assert_eq!(runtime.http_routes("web").unwrap().load().names(), vec!["app"]);
        assert!(runtime.targets().load().http.contains("http://127.0.0.1:9001"));

        assert!(!watcher.handle(snapshot(ONE_ROUTER)));
        assert_eq!(runtime.generation(), 1);

        assert!(watcher.handle(snapshot("")));
        assert_eq!(runtime.generation(), 2);
        assert!(runtime.http_routes("web").unwrap().load().is_empty());
    }

    #[tokio::test]
    async fn health_change_rebuilds_last_snapshot() {
        let (mut watcher, _tx, runtime) = setup();
        assert!(!watcher.handle(ConfigMessage::HealthChanged));
        assert_eq!(runtime.generation(), 0);

        watcher.handle(snapshot(ONE_ROUTER));
        runtime.health().record_failure("http://127.0.0.1:9001");
        assert!(watcher.handle(ConfigMessage::HealthChanged));
        assert_eq!(runtime.generation(), 2);
        assert!(runtime.report().is_enabled(Protocol::Http, ComponentKind::Service, "app"));
    }

    /// Status the current graph of `web` answers `/` with.
    async fn status(runtime: &Runtime) -> StatusCode {
        let routes = runtime.http_routes("web").unwrap().load_full();
        let req = axum::http::Request::new(axum::body::Body::empty());
        let handler = routes.match_request(&req).unwrap().handler().clone();
        match handler.handle(req).await {
            Ok(response) => response.status(),
            Err(e) => e.status(),
        }
    }

    #[tokio::test]
    async fn rebuilds_keep_rate_limit_state() {
        let (mut watcher, _tx, runtime) = setup();
        let limited = r#"
            [http.routers.app]
            middlewares = ["limit"]
            service = "app"

            [http.middlewares.limit.rate_limit]
            average = 0
            burst = 1

            [http.services.app.load_balancer]
            servers = []

            [http.services.other.load_balancer]
            servers = [{ url = "http://127.0.0.1:9002" }]
        "#;
        watcher.handle(snapshot(limited));

        assert_eq!(status(&runtime).await, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status(&runtime).await, StatusCode::TOO_MANY_REQUESTS);

        // A server no router uses flaps.
        runtime.health().record_failure("http://127.0.0.1:9002");
        assert!(watcher.handle(ConfigMessage::HealthChanged));
        assert_eq!(status(&runtime).await, StatusCode::TOO_MANY_REQUESTS);

        // A changed definition starts over.
        watcher.handle(snapshot(&limited.replace("burst = 1", "burst = 2")));
        assert_eq!(status(&runtime).await, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn run_coalesces_bursts_and_stops_on_shutdown() {
        let (watcher, tx, runtime) = setup();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        tx.send(snapshot("")).await.unwrap();
        tx.send(ConfigMessage::HealthChanged).await.unwrap();
        tx.send(snapshot(ONE_ROUTER)).await.unwrap();

        let task = tokio::spawn(watcher.run(shutdown_rx));
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while runtime.generation() == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        assert_eq!(runtime.generation(), 1);
        assert_eq!(runtime.http_routes("web").unwrap().load().names(), vec!["app"]);

        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
    }
}
