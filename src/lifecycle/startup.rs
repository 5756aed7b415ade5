//! Startup orchestration.
//!
//! # Responsibilities
//! - Create the runtime and the configuration watcher
//! - Start background jobs (health monitor, providers)
//! - Bind entry points and the admin API and begin accepting traffic
//! - Drain open connections once shutdown was triggered
//!
//! # Design Decisions
//! - Fail fast: a listener that cannot bind aborts startup
//! - Entry points start last and answer 404 / close connections until the
//!   first snapshot is applied

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::admin;
use crate::config::schema::{Protocol, ProxyConfig};
use crate::config::watcher::{ConfigMessage, ConfigurationWatcher};
use crate::health::{HealthMonitor, HealthRegistry};
use crate::http::HttpServer;
use crate::lifecycle::Shutdown;
use crate::net::connection::ConnectionTracker;
use crate::net::{Listener, ListenerError, TcpServer};
use crate::provider::{self, FileProvider};
use crate::resilience::ExponentialBackoff;
use crate::runtime::Runtime;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to bind {name} on {address}: {source}")]
    Bind {
        name: String,
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// A running proxy.
pub struct Proxy {
    runtime: Arc<Runtime>,
    config_tx: mpsc::Sender<ConfigMessage>,
    tasks: Vec<JoinHandle<()>>,
    tracker: ConnectionTracker,
    addresses: BTreeMap<String, SocketAddr>,
    admin_address: Option<SocketAddr>,
    drain_timeout: Duration,
}

impl Proxy {
    pub async fn start(config: ProxyConfig, shutdown: &Shutdown) -> Result<Self, StartupError> {
        let health = Arc::new(HealthRegistry::from_config(&config.health_check));
        let runtime = Arc::new(Runtime::new(&config.entry_points, health.clone()));
        let mut tasks = Vec::new();

        let (watcher, config_tx) = ConfigurationWatcher::new(
            runtime.clone(),
            config.entry_points.clone(),
            config.timeouts.clone(),
        );
        tasks.push(tokio::spawn(watcher.run(shutdown.subscribe())));

        let monitor = HealthMonitor::new(
            health,
            runtime.targets().clone(),
            config.health_check.clone(),
            config_tx.clone(),
        );
        tasks.push(tokio::spawn(monitor.run(shutdown.subscribe())));

        if let Some(file) = &config.providers.file {
            let provider = Arc::new(FileProvider::from_config(file));
            let job = provider::start(
                provider,
                config_tx.clone(),
                ExponentialBackoff::from_config(&config.backoff),
                shutdown,
            );
            tasks.push(tokio::spawn(async move {
                let _ = job.await;
            }));
        }

        let tracker = ConnectionTracker::new();
        let mut addresses = BTreeMap::new();
        for (name, entry_point) in &config.entry_points {
            match entry_point.protocol {
                Protocol::Http => {
                    let listener = TcpListener::bind(&entry_point.address).await.map_err(|source| {
                        StartupError::Bind {
                            name: format!("entry point {name}"),
                            address: entry_point.address.clone(),
                            source,
                        }
                    })?;
                    addresses.insert(name.clone(), local_addr(&listener, name)?);

                    let routes = runtime.http_routes(name).unwrap_or_default();
                    let server = HttpServer::new(name.clone(), routes, entry_point.max_connections);
                    let rx = shutdown.subscribe();
                    let name = name.clone();
                    tasks.push(tokio::spawn(async move {
                        if let Err(e) = server.run(listener, rx).await {
                            tracing::error!(entry_point = %name, error = %e, "HTTP entry point failed");
                        }
                    }));
                }
                Protocol::Tcp => {
                    let listener = Listener::bind(&entry_point.address, entry_point.max_connections).await?;
                    if let Ok(addr) = listener.local_addr() {
                        addresses.insert(name.clone(), addr);
                    }

                    let routes = runtime.tcp_routes(name).unwrap_or_default();
                    let server = TcpServer::new(name.clone(), routes, tracker.clone());
                    let rx = shutdown.subscribe();
                    let name = name.clone();
                    tasks.push(tokio::spawn(async move {
                        if let Err(e) = server.run(listener, rx).await {
                            tracing::error!(entry_point = %name, error = %e, "TCP entry point failed");
                        }
                    }));
                }
            }
        }

        let admin_address = if config.api.enabled {
            let listener = TcpListener::bind(&config.api.bind_address).await.map_err(|source| {
                StartupError::Bind {
                    name: "admin API".to_string(),
                    address: config.api.bind_address.clone(),
                    source,
                }
            })?;
            let addr = local_addr(&listener, "admin API")?;
            let app = admin::router(runtime.clone(), config.api.api_key.clone());
            let mut rx = shutdown.subscribe();
            tasks.push(tokio::spawn(async move {
                tracing::info!(address = %addr, "Admin API listening");
                let served = axum::serve(listener, app)
                    .with_graceful_shutdown(async move {
                        let _ = rx.recv().await;
                    })
                    .await;
                if let Err(e) = served {
                    tracing::error!(error = %e, "Admin API failed");
                }
            }));
            Some(addr)
        } else {
            None
        };

        tracing::info!(entry_points = addresses.len(), "Proxy started");
        Ok(Self {
            runtime,
            config_tx,
            tasks,
            tracker,
            addresses,
            admin_address,
            drain_timeout: config.timeouts.drain(),
        })
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// Sender for pushing snapshots directly, next to any configured provider.
    pub fn config_sender(&self) -> mpsc::Sender<ConfigMessage> {
        self.config_tx.clone()
    }

    /// Bound address of an entry point.
    pub fn local_addr(&self, entry_point: &str) -> Option<SocketAddr> {
        self.addresses.get(entry_point).copied()
    }

    pub fn admin_addr(&self) -> Option<SocketAddr> {
        self.admin_address
    }

    /// Wait for every task to stop (trigger shutdown first), then give open
    /// TCP connections the drain timeout to finish.
    pub async fn wait(self) {
        drop(self.config_tx);
        for task in self.tasks {
            let _ = task.await;
        }

        if self.tracker.drain(self.drain_timeout).await {
            tracing::info!("All connections drained");
        } else {
            tracing::warn!(
                remaining = self.tracker.active_count(),
                "Drain timeout reached, dropping connections"
            );
        }
    }
}

fn local_addr(listener: &TcpListener, name: &str) -> Result<SocketAddr, StartupError> {
    listener.local_addr().map_err(|source| StartupError::Bind {
        name: name.to_string(),
        address: "<bound>".to_string(),
        source,
    })
}
