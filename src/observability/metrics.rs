//! Metrics recording.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status, router
//! - `proxy_request_duration_seconds` (histogram): latency distribution
//! - `proxy_dispatch_total` (counter): balancer picks by service, outcome
//! - `proxy_build_errors_total` (counter): components that failed to build, by kind
//! - `proxy_config_reloads_total` (counter): applied configuration snapshots
//! - `proxy_retry_total` (counter): retried attempts of background jobs
//! - `proxy_backend_health` (gauge): 1=healthy, 0=unhealthy
//! - `proxy_rate_limited_total` (counter): requests rejected by rate limiting
//! - `proxy_active_connections` (gauge): open TCP connections per entry point
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; no exporter is installed here, an
//!   embedding application may install one
//! - Labels for service, router, status code

use std::time::Instant;

pub fn record_request(method: &str, status: u16, router: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("router", router.to_string()),
    ];
    ::metrics::counter!("proxy_requests_total", &labels).increment(1);
    ::metrics::histogram!("proxy_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_dispatch(service: &str, outcome: &'static str) {
    ::metrics::counter!(
        "proxy_dispatch_total",
        "service" => service.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_build_error(kind: &'static str) {
    ::metrics::counter!("proxy_build_errors_total", "kind" => kind).increment(1);
}

pub fn record_config_reload() {
    ::metrics::counter!("proxy_config_reloads_total").increment(1);
}

pub fn record_retry() {
    ::metrics::counter!("proxy_retry_total").increment(1);
}

pub fn record_backend_health(server: &str, healthy: bool) {
    ::metrics::gauge!("proxy_backend_health", "server" => server.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_rate_limited(middleware: &str) {
    ::metrics::counter!("proxy_rate_limited_total", "middleware" => middleware.to_string())
        .increment(1);
}

pub fn record_active_connections(entry_point: &str, count: usize) {
    ::metrics::gauge!("proxy_active_connections", "entry_point" => entry_point.to_string())
        .set(count as f64);
}
