//! Per-client token bucket rate limiting.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::time::Instant;

use crate::handler::{client_addr, HandlerError, HttpHandler};
use crate::middleware::HttpMiddleware;
use crate::observability::metrics;

/// A simple token bucket.
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Whether the bucket has refilled to `capacity` by `now`.
    fn is_full(&self, now: Instant, capacity: f64, refill_rate: f64) -> bool {
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens + elapsed * refill_rate >= capacity
    }
}

struct Buckets {
    by_client: HashMap<Option<IpAddr>, TokenBucket>,
    last_sweep: Instant,
}

/// Buckets shared by every router using the same named middleware.
struct RateLimiterState {
    name: String,
    buckets: Mutex<Buckets>,
    average: f64,
    burst: f64,
    /// Time an empty bucket needs to refill. `None` when buckets never refill.
    sweep_every: Option<Duration>,
}

impl RateLimiterState {
    fn check(&self, key: Option<IpAddr>) -> bool {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        self.sweep(&mut buckets);
        buckets
            .by_client
            .entry(key)
            .or_insert_with(|| TokenBucket::new(self.burst))
            .try_acquire(self.burst, self.average)
    }

    /// Forget full buckets; a fresh bucket behaves the same.
    fn sweep(&self, buckets: &mut Buckets) {
        let Some(every) = self.sweep_every else {
            return;
        };
        let now = Instant::now();
        if now.duration_since(buckets.last_sweep) < every {
            return;
        }
        buckets.last_sweep = now;

        let before = buckets.by_client.len();
        buckets
            .by_client
            .retain(|_, bucket| !bucket.is_full(now, self.burst, self.average));
        tracing::trace!(
            middleware = %self.name,
            removed = before - buckets.by_client.len(),
            "Swept idle rate limit buckets"
        );
    }

    fn tracked_clients(&self) -> usize {
        self.buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .by_client
            .len()
    }
}

/// Allows `average` requests per second per client IP, with bursts up to `burst`.
///
/// Clones share their buckets.
#[derive(Clone)]
pub struct RateLimit {
    state: Arc<RateLimiterState>,
}

impl RateLimit {
    pub fn new(name: impl Into<String>, average: u32, burst: u32) -> Result<Self, String> {
        if burst == 0 {
            return Err("burst must be at least 1".to_string());
        }
        let (average, burst) = (average as f64, burst as f64);
        Ok(Self {
            state: Arc::new(RateLimiterState {
                name: name.into(),
                buckets: Mutex::new(Buckets {
                    by_client: HashMap::new(),
                    last_sweep: Instant::now(),
                }),
                average,
                burst,
                sweep_every: (average > 0.0).then(|| Duration::from_secs_f64(burst / average)),
            }),
        })
    }

    /// Clients that currently hold a bucket.
    pub fn tracked_clients(&self) -> usize {
        self.state.tracked_clients()
    }
}

impl HttpMiddleware for RateLimit {
    fn wrap(&self, next: Arc<dyn HttpHandler>) -> Arc<dyn HttpHandler> {
        Arc::new(RateLimitHandler {
            state: self.state.clone(),
            next,
        })
    }
}

struct RateLimitHandler {
    state: Arc<RateLimiterState>,
    next: Arc<dyn HttpHandler>,
}

#[async_trait]
impl HttpHandler for RateLimitHandler {
    async fn handle(&self, req: Request<Body>) -> Result<Response, HandlerError> {
        let client = client_addr(&req).map(|addr| addr.ip());
        if self.state.check(client) {
            return self.next.handle(req).await;
        }

        tracing::warn!(client = ?client, middleware = %self.state.name, "Rate limit exceeded");
        metrics::record_rate_limited(&self.state.name);
        Ok((StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded").into_response())
    }
}
