//! Backend health state machine.
//!
//! # States
//! - Healthy: server is included in freshly built balancers
//! - Unhealthy: server is left out of freshly built balancers
//!
//! # State Transitions
//! ```text
//! Healthy → Unhealthy: consecutive failures >= unhealthy_threshold
//! Unhealthy → Healthy: consecutive successes >= healthy_threshold
//! ```
//!
//! # Design Decisions
//! - Hysteresis prevents flapping
//! - Servers never probed count as healthy
//! - Counters reset on state transition

use std::collections::{BTreeMap, BTreeSet};

use dashmap::DashMap;
use serde::Serialize;

use crate::config::schema::HealthCheckConfig;
use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone)]
struct ServerHealth {
    status: HealthStatus,
    consecutive_failures: u32,
    consecutive_successes: u32,
}

impl Default for ServerHealth {
    fn default() -> Self {
        Self {
            status: HealthStatus::Healthy,
            consecutive_failures: 0,
            consecutive_successes: 0,
        }
    }
}

/// Health of every probed server, keyed by URL (HTTP) or address (TCP).
#[derive(Debug)]
pub struct HealthRegistry {
    servers: DashMap<String, ServerHealth>,
    healthy_threshold: u32,
    unhealthy_threshold: u32,
}

impl HealthRegistry {
    pub fn new(healthy_threshold: u32, unhealthy_threshold: u32) -> Self {
        Self {
            servers: DashMap::new(),
            healthy_threshold: healthy_threshold.max(1),
            unhealthy_threshold: unhealthy_threshold.max(1),
        }
    }

    pub fn from_config(config: &HealthCheckConfig) -> Self {
        Self::new(config.healthy_threshold, config.unhealthy_threshold)
    }

    pub fn status(&self, server: &str) -> HealthStatus {
        self.servers
            .get(server)
            .map(|entry| entry.status)
            .unwrap_or(HealthStatus::Healthy)
    }

    pub fn is_healthy(&self, server: &str) -> bool {
        self.status(server) == HealthStatus::Healthy
    }

    /// Record a passed probe. Returns true if the server became healthy.
    pub fn record_success(&self, server: &str) -> bool {
        let mut entry = self.servers.entry(server.to_string()).or_default();
        entry.consecutive_failures = 0;
        entry.consecutive_successes += 1;

        if entry.status == HealthStatus::Unhealthy
            && entry.consecutive_successes >= self.healthy_threshold
        {
            entry.status = HealthStatus::Healthy;
            entry.consecutive_successes = 0;
            tracing::info!(server = %server, "Server became healthy");
            metrics::record_backend_health(server, true);
            return true;
        }
        false
    }

    /// Record a failed probe. Returns true if the server became unhealthy.
    pub fn record_failure(&self, server: &str) -> bool {
        let mut entry = self.servers.entry(server.to_string()).or_default();
        entry.consecutive_successes = 0;
        entry.consecutive_failures += 1;

        if entry.status == HealthStatus::Healthy
            && entry.consecutive_failures >= self.unhealthy_threshold
        {
            entry.status = HealthStatus::Unhealthy;
            entry.consecutive_failures = 0;
            tracing::warn!(server = %server, "Server became unhealthy");
            metrics::record_backend_health(server, false);
            return true;
        }
        false
    }

    /// Forget servers that are no longer configured.
    pub fn retain(&self, servers: &BTreeSet<String>) {
        self.servers.retain(|server, _| servers.contains(server));
    }

    pub fn snapshot(&self) -> BTreeMap<String, HealthStatus> {
        self.servers
            .iter()
            .map(|entry| (entry.key().clone(), entry.status))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVER: &str = "http://127.0.0.1:3000";

    #[test]
    fn unknown_servers_are_healthy() {
        let registry = HealthRegistry::new(2, 3);
        assert!(registry.is_healthy(SERVER));
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn transitions_need_consecutive_results() {
        let registry = HealthRegistry::new(2, 3);

        assert!(!registry.record_failure(SERVER));
        assert!(!registry.record_failure(SERVER));
        assert!(registry.is_healthy(SERVER));
        assert!(registry.record_failure(SERVER));
        assert_eq!(registry.status(SERVER), HealthStatus::Unhealthy);

        assert!(!registry.record_success(SERVER));
        assert!(!registry.record_failure(SERVER));
        assert!(!registry.record_success(SERVER));
        assert!(registry.record_success(SERVER));
        assert!(registry.is_healthy(SERVER));
    }

    #[test]
    fn retain_forgets_removed_servers() {
        let registry = HealthRegistry::new(1, 1);
        registry.record_failure("a:1");
        registry.record_failure("b:1");

        registry.retain(&BTreeSet::from(["a:1".to_string()]));
        assert_eq!(registry.snapshot().len(), 1);
        assert!(registry.is_healthy("b:1"));
    }
}
