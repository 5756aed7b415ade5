//! Round-robin load balancing strategy.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use axum::response::Response;

use crate::handler::{HandlerError, HttpHandler, TcpConnection, TcpHandler};
use crate::load_balancer::DispatchError;
use crate::observability::metrics;

/// Round-robin balancer.
///
/// Visits servers in insertion order and wraps around. The server list and the
/// cursor are guarded together, so `add_server` and `next_server` may race
/// freely from any number of tasks.
#[derive(Debug)]
pub struct RoundRobin<H: ?Sized> {
    service: String,
    pool: Mutex<Pool<H>>,
}

#[derive(Debug)]
struct Pool<H: ?Sized> {
    servers: Vec<Arc<H>>,
    current: usize,
}

impl<H: ?Sized> RoundRobin<H> {
    /// Create an empty balancer for the named service.
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            pool: Mutex::new(Pool {
                servers: Vec::new(),
                current: 0,
            }),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Append a server to the rotation.
    pub fn add_server(&self, server: Arc<H>) {
        let mut pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
        pool.servers.push(server);
    }

    /// Pick the server under the cursor and advance it.
    pub fn next_server(&self) -> Result<Arc<H>, DispatchError> {
        let mut pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
        if pool.servers.is_empty() {
            return Err(DispatchError::NoAvailableBackend(self.service.clone()));
        }

        let index = pool.current;
        let server = pool.servers[index].clone();
        pool.current = (index + 1) % pool.servers.len();

        tracing::trace!(service = %self.service, index, "Round-robin selected server");
        Ok(server)
    }

    pub fn len(&self) -> usize {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner).servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn select<H: ?Sized>(lb: &RoundRobin<H>) -> Result<Arc<H>, HandlerError> {
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
impl HttpHandler for RoundRobin<dyn HttpHandler> {
    async fn handle(&self, req: Request<Body>) -> Result<Response, HandlerError> {
        let server = select(self)?;
        server.handle(req).await
    }
}

#[async_trait]
impl TcpHandler for RoundRobin<dyn TcpHandler> {
    async fn handle(&self, conn: TcpConnection) -> Result<(), HandlerError> {
        let server = select(self)?;
        server.handle(conn).await
    }
}
