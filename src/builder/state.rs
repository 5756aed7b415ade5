//! Middleware state carried from one graph to the next.
//!
//! Rate limit buckets and connection counts live in the middleware instance.
//! A rebuild (new snapshot or health transition) reuses the instance of every
//! stateful middleware whose definition did not change, so clients keep their
//! budget and open connections keep their slots.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::config::dynamic::{
    DynamicConfig, HttpMiddlewareConfig, InFlightConnConfig, RateLimitConfig, TcpMiddlewareConfig,
};
use crate::middleware::{InFlightConn, RateLimit};

#[derive(Default)]
pub struct MiddlewareStates {
    rate_limits: Mutex<HashMap<String, (RateLimitConfig, RateLimit)>>,
    in_flight: Mutex<HashMap<String, (InFlightConnConfig, InFlightConn)>>,
}

impl MiddlewareStates {
    pub fn new() -> Self {
        Self::default()
    }

    /// The rate limiter named `name`, reused if `config` is unchanged.
    pub fn rate_limit(&self, name: &str, config: &RateLimitConfig) -> Result<RateLimit, String> {
        let mut limits = self.rate_limits.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((previous, limit)) = limits.get(name) {
            if previous == config {
                return Ok(limit.clone());
            }
        }

        let limit = RateLimit::new(name, config.average, config.burst)?;
        limits.insert(name.to_string(), (config.clone(), limit.clone()));
        Ok(limit)
    }

    /// The connection cap named `name`, reused if `config` is unchanged.
    pub fn in_flight_conn(&self, name: &str, config: &InFlightConnConfig) -> Result<InFlightConn, String> {
        let mut caps = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((previous, cap)) = caps.get(name) {
            if previous == config {
                return Ok(cap.clone());
            }
        }

        let cap = InFlightConn::new(config.amount)?;
        caps.insert(name.to_string(), (config.clone(), cap.clone()));
        Ok(cap)
    }

    /// Drop the state of middlewares `config` no longer defines as they were.
    pub fn retain(&self, config: &DynamicConfig) {
        self.rate_limits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|name, (previous, _)| {
                matches!(
                    config.http.middlewares.get(name),
                    Some(HttpMiddlewareConfig::RateLimit(current)) if *current == *previous
                )
            });
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|name, (previous, _)| {
                matches!(
                    config.tcp.middlewares.get(name),
                    Some(TcpMiddlewareConfig::InFlightConn(current)) if *current == *previous
                )
            });
    }

    pub fn len(&self) -> usize {
        self.rate_limits.lock().unwrap_or_else(PoisonError::into_inner).len()
            + self.in_flight.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HttpHandler;
    use crate::middleware::testing::Echo;
    use crate::middleware::HttpMiddleware;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;

    async fn status(limit: &RateLimit) -> StatusCode {
        let handler = limit.wrap(Arc::new(Echo));
        handler.handle(Request::new(Body::empty())).await.unwrap().status()
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_definitions_share_state() {
        let states = MiddlewareStates::new();
        let config = RateLimitConfig { average: 0, burst: 1 };

        let first = states.rate_limit("limit", &config).unwrap();
        assert_eq!(status(&first).await, StatusCode::OK);

        let again = states.rate_limit("limit", &config).unwrap();
        assert_eq!(status(&again).await, StatusCode::TOO_MANY_REQUESTS);

        // A new definition starts with fresh buckets.
        let changed = states
            .rate_limit("limit", &RateLimitConfig { average: 0, burst: 2 })
            .unwrap();
        assert_eq!(status(&changed).await, StatusCode::OK);
        assert_eq!(states.len(), 1);
    }

    #[test]
    fn retain_drops_removed_and_redefined_middlewares() {
        let states = MiddlewareStates::new();
        states
            .rate_limit("limit", &RateLimitConfig { average: 1, burst: 1 })
            .unwrap();
        states
            .in_flight_conn("cap", &InFlightConnConfig { amount: 2 })
            .unwrap();
        states
            .in_flight_conn("gone", &InFlightConnConfig { amount: 2 })
            .unwrap();

        let config: DynamicConfig = toml::from_str(
            r#"
            [http.middlewares.limit.rate_limit]
            average = 1
            burst = 1

            [tcp.middlewares.cap.in_flight_conn]
            amount = 3
            "#,
        )
        .unwrap();
        states.retain(&config);
        assert_eq!(states.len(), 1);

        states.retain(&DynamicConfig::default());
        assert!(states.is_empty());
    }

    #[test]
    fn invalid_definitions_are_not_cached() {
        let states = MiddlewareStates::new();
        assert!(states
            .in_flight_conn("cap", &InFlightConnConfig { amount: 0 })
            .is_err());
        assert!(states.is_empty());
    }
}
