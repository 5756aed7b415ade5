//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every configured server (HTTP GET or TCP connect)
//! - Update the health registry
//! - Ask the configuration watcher for a rebuild when a server changes state

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::http::Request;
use futures_util::future::join_all;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::time;

use crate::config::dynamic::DynamicConfig;
use crate::config::schema::HealthCheckConfig;
use crate::config::watcher::ConfigMessage;
use crate::health::state::HealthRegistry;
use crate::http::forward::{http_client, HttpClient};

/// Servers to probe, refreshed whenever a snapshot is applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HealthTargets {
    pub http: BTreeSet<String>,
    pub tcp: BTreeSet<String>,
}

impl HealthTargets {
    pub fn from_config(config: &DynamicConfig) -> Self {
        let http = config
            .http
            .services
            .values()
            .flat_map(|service| service.server_urls())
            .map(String::from)
            .collect();
        let tcp = config
            .tcp
            .services
            .values()
            .flat_map(|service| service.server_addresses())
            .map(String::from)
            .collect();
        Self { http, tcp }
    }

    pub fn all(&self) -> BTreeSet<String> {
        self.http.union(&self.tcp).cloned().collect()
    }
}

pub struct HealthMonitor {
    registry: Arc<HealthRegistry>,
    targets: Arc<ArcSwap<HealthTargets>>,
    config: HealthCheckConfig,
    client: HttpClient,
    changes: mpsc::Sender<ConfigMessage>,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<HealthRegistry>,
        targets: Arc<ArcSwap<HealthTargets>>,
        config: HealthCheckConfig,
        changes: mpsc::Sender<ConfigMessage>,
    ) -> Self {
        let client = http_client(Duration::from_secs(config.timeout_secs));
        Self {
            registry,
            targets,
            config,
            client,
            changes,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Active health checks disabled");
            return;
        }

        tracing::info!(
            interval = self.config.interval_secs,
            path = %self.config.path,
            "Health monitor starting"
        );

        let mut ticker = time::interval(Duration::from_secs(self.config.interval_secs));
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe every target once. Returns true if any server changed state.
    pub async fn check_all(&self) -> bool {
        let targets = self.targets.load_full();
        self.registry.retain(&targets.all());

        let http = join_all(targets.http.iter().map(|url| async move {
            (url, self.probe_http(url).await)
        }));
        let tcp = join_all(targets.tcp.iter().map(|address| async move {
            (address, self.probe_tcp(address).await)
        }));
        let (http, tcp) = tokio::join!(http, tcp);

        let mut changed = false;
        for (server, healthy) in http.into_iter().chain(tcp) {
            changed |= if healthy {
                self.registry.record_success(server)
            } else {
                self.registry.record_failure(server)
            };
        }

        if changed && self.changes.send(ConfigMessage::HealthChanged).await.is_err() {
            tracing::debug!("Configuration watcher gone, health change dropped");
        }
        changed
    }

    async fn probe_http(&self, url: &str) -> bool {
        let uri = format!("{}{}", url.trim_end_matches('/'), self.config.path);
        let request = match Request::builder()
            .method("GET")
            .uri(&uri)
            .header("user-agent", "edge-proxy-health-check")
            .body(Body::empty())
        {
            Ok(req) => req,
            Err(e) => {
                tracing::error!(server = %url, error = %e, "Failed to build health check request");
                return false;
            }
        };

        let timeout = Duration::from_secs(self.config.timeout_secs);
        match time::timeout(timeout, self.client.request(request)).await {
            Ok(Ok(response)) => {
                let success = response.status().is_success();
                if !success {
                    tracing::warn!(server = %url, status = %response.status(), "Health check failed: non-success status");
                }
                success
            }
            Ok(Err(e)) => {
                tracing::warn!(server = %url, error = %e, "Health check failed: connection error");
                false
            }
            Err(_) => {
                tracing::warn!(server = %url, "Health check failed: timeout");
                false
            }
        }
    }

    async fn probe_tcp(&self, address: &str) -> bool {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        match time::timeout(timeout, TcpStream::connect(address)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::warn!(server = %address, error = %e, "Health check failed: connection error");
                false
            }
            Err(_) => {
                tracing::warn!(server = %address, "Health check failed: timeout");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn closed_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    fn config() -> HealthCheckConfig {
        HealthCheckConfig {
            enabled: true,
            interval_secs: 1,
            timeout_secs: 1,
            path: "/health".into(),
            unhealthy_threshold: 1,
            healthy_threshold: 1,
        }
    }

    #[test]
    fn targets_collect_every_server() {
        let config: DynamicConfig = toml::from_str(
            r#"
            [http.services.a.load_balancer]
            servers = [{ url = "http://127.0.0.1:1" }, { url = "http://127.0.0.1:2" }]
            [http.services.b.load_balancer]
            servers = [{ url = "http://127.0.0.1:1" }]
            [tcp.services.db.load_balancer]
            servers = [{ address = "127.0.0.1:5432" }]
            "#,
        )
        .unwrap();

        let targets = HealthTargets::from_config(&config);
        assert_eq!(targets.http.len(), 2);
        assert_eq!(targets.all().len(), 3);
    }

    #[tokio::test]
    async fn tcp_probe_marks_dead_server_and_requests_rebuild() {
        let alive = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let alive_addr = alive.local_addr().unwrap().to_string();
        let dead_addr = format!("127.0.0.1:{}", closed_port());

        let targets = HealthTargets {
            http: BTreeSet::new(),
            tcp: BTreeSet::from([alive_addr.clone(), dead_addr.clone()]),
        };
        let registry = Arc::new(HealthRegistry::new(1, 1));
        let (tx, mut rx) = mpsc::channel(4);
        let monitor = HealthMonitor::new(
            registry.clone(),
            Arc::new(ArcSwap::from_pointee(targets)),
            config(),
            tx,
        );

        assert!(monitor.check_all().await);
        assert!(registry.is_healthy(&alive_addr));
        assert!(!registry.is_healthy(&dead_addr));
        assert!(matches!(rx.try_recv(), Ok(ConfigMessage::HealthChanged)));

        // No transition, no rebuild request.
        assert!(!monitor.check_all().await);
        assert!(rx.try_recv().is_err());
    }
}
