//! Weighted round-robin load balancing strategy.
//!
//! Interleaved weighted round-robin: the scan lowers a current weight by the
//! gcd of all weights each time it wraps, and picks the next entry whose weight
//! reaches it. Weights 3 and 1 yield `A A A B` per cycle. Entries with weight 0
//! never receive traffic.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use axum::response::Response;

use crate::handler::{HandlerError, HttpHandler, TcpConnection, TcpHandler};
use crate::load_balancer::DispatchError;
use crate::observability::metrics;

#[derive(Debug)]
pub struct WeightedRoundRobin<H: ?Sized> {
    service: String,
    state: Mutex<WeightedPool<H>>,
}

#[derive(Debug)]
struct WeightedPool<H: ?Sized> {
    entries: Vec<(Arc<H>, u32)>,
    /// Index of the last pick; `None` before the first one.
    index: Option<usize>,
    current_weight: u32,
    gcd: u32,
    max_weight: u32,
}

impl<H: ?Sized> WeightedRoundRobin<H> {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            state: Mutex::new(WeightedPool {
                entries: Vec::new(),
                index: None,
                current_weight: 0,
                gcd: 0,
                max_weight: 0,
            }),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Add a server with its weight.
    pub fn add_server(&self, server: Arc<H>, weight: u32) {
        let mut pool = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        pool.entries.push((server, weight));
        pool.gcd = gcd(pool.gcd, weight);
        pool.max_weight = pool.max_weight.max(weight);
    }

    pub fn next_server(&self) -> Result<Arc<H>, DispatchError> {
        let mut pool = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if pool.max_weight == 0 {
            return Err(DispatchError::NoAvailableBackend(self.service.clone()));
        }

        let n = pool.entries.len();
        loop {
            let index = pool.index.map_or(0, |i| (i + 1) % n);
            pool.index = Some(index);

            if index == 0 {
                pool.current_weight = pool.current_weight.saturating_sub(pool.gcd);
                if pool.current_weight == 0 {
                    pool.current_weight = pool.max_weight;
                }
            }

            let (server, weight) = &pool.entries[index];
            if *weight >= pool.current_weight {
                tracing::trace!(service = %self.service, index, "Weighted round-robin selected server");
                return Ok(server.clone());
            }
        }
    }
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

fn select<H: ?Sized>(lb: &WeightedRoundRobin<H>) -> Result<Arc<H>, HandlerError> {
    match lb.next_server() {
        Ok(server) => {
            metrics::record_dispatch(lb.service(), "ok");
            Ok(server)
        }
        Err(e) => {
            metrics::record_dispatch(lb.service(), "no_backend");
            tracing::warn!(service = %lb.service(), "No available backend");
            Err(e.into())
        }
    }
}

#[async_trait]
impl HttpHandler for WeightedRoundRobin<dyn HttpHandler> {
    async fn handle(&self, req: Request<Body>) -> Result<Response, HandlerError> {
        let server = select(self)?;
        server.handle(req).await
    }
}

#[async_trait]
impl TcpHandler for WeightedRoundRobin<dyn TcpHandler> {
    async fn handle(&self, conn: TcpConnection) -> Result<(), HandlerError> {
        let server = select(self)?;
        server.handle(conn).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn picks(lb: &WeightedRoundRobin<&'static str>, n: usize) -> Vec<&'static str> {
        (0..n).map(|_| *lb.next_server().unwrap()).collect()
    }

    #[test]
    fn interleaves_by_weight() {
        let lb = WeightedRoundRobin::new("split");
        lb.add_server(Arc::new("A"), 3);
        lb.add_server(Arc::new("B"), 1);

        assert_eq!(picks(&lb, 8), vec!["A", "A", "A", "B", "A", "A", "A", "B"]);
    }

    #[test]
    fn equal_weights_behave_like_round_robin() {
        let lb = WeightedRoundRobin::new("split");
        lb.add_server(Arc::new("A"), 2);
        lb.add_server(Arc::new("B"), 2);
        lb.add_server(Arc::new("C"), 2);

        assert_eq!(picks(&lb, 6), vec!["A", "B", "C", "A", "B", "C"]);
    }

    #[test]
    fn ratio_holds_over_many_picks() {
        let lb = WeightedRoundRobin::new("split");
        lb.add_server(Arc::new("A"), 4);
        lb.add_server(Arc::new("B"), 2);
        lb.add_server(Arc::new("C"), 0);

        let chosen = picks(&lb, 300);
        assert_eq!(chosen.iter().filter(|s| **s == "A").count(), 200);
        assert_eq!(chosen.iter().filter(|s| **s == "B").count(), 100);
        assert!(!chosen.contains(&"C"));
    }

    #[test]
    fn zero_total_weight_has_no_backend() {
        let empty: WeightedRoundRobin<&'static str> = WeightedRoundRobin::new("split");
        assert!(empty.next_server().is_err());

        let zero = WeightedRoundRobin::new("split");
        zero.add_server(Arc::new("A"), 0);
        assert_eq!(
            zero.next_server().unwrap_err(),
            DispatchError::NoAvailableBackend("split".into())
        );
    }
}
