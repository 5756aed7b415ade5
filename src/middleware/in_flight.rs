//! Per-client limit on simultaneous TCP connections.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::handler::{HandlerError, TcpConnection, TcpHandler};
use crate::middleware::TcpMiddleware;

/// Active connection counts per client IP.
#[derive(Debug)]
struct ConnectionCounts {
    counts: Mutex<HashMap<IpAddr, usize>>,
    limit: usize,
}

impl ConnectionCounts {
    /// Returns true if allowed, false if the limit is reached.
    fn try_increment(&self, ip: IpAddr) -> bool {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        let current = counts.entry(ip).or_insert(0);
        if *current < self.limit {
            *current += 1;
            true
        } else {
            false
        }
    }

    fn decrement(&self, ip: IpAddr) {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = counts.get_mut(&ip) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                counts.remove(&ip);
            }
        }
    }

    fn current(&self, ip: IpAddr) -> usize {
        let counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        counts.get(&ip).copied().unwrap_or(0)
    }
}

/// Releases one slot when dropped.
struct Slot<'a> {
    counts: &'a ConnectionCounts,
    ip: IpAddr,
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        self.counts.decrement(self.ip);
    }
}

/// Caps simultaneous connections per client IP. Clones share their counts.
#[derive(Clone)]
pub struct InFlightConn {
    counts: Arc<ConnectionCounts>,
}

impl InFlightConn {
    pub fn new(amount: usize) -> Result<Self, String> {
        if amount == 0 {
            return Err("amount must be at least 1".to_string());
        }
        Ok(Self {
            counts: Arc::new(ConnectionCounts {
                counts: Mutex::new(HashMap::new()),
                limit: amount,
            }),
        })
    }

    /// Connections currently held by `ip`.
    pub fn in_flight(&self, ip: IpAddr) -> usize {
        self.counts.current(ip)
    }
}

impl TcpMiddleware for InFlightConn {
    fn wrap(&self, next: Arc<dyn TcpHandler>) -> Arc<dyn TcpHandler> {
        Arc::new(InFlightHandler {
            counts: self.counts.clone(),
            next,
        })
    }
}

struct InFlightHandler {
    counts: Arc<ConnectionCounts>,
    next: Arc<dyn TcpHandler>,
}

#[async_trait]
impl TcpHandler for InFlightHandler {
    async fn handle(&self, mut conn: TcpConnection) -> Result<(), HandlerError> {
        let ip = conn.peer.ip();
        if !self.counts.try_increment(ip) {
            tracing::debug!(connection_id = %conn.id, client = %ip, "Too many connections from client");
            conn.stream.shutdown().await?;
            return Ok(());
        }

        let _slot = Slot {
            counts: &self.counts,
            ip,
        };
        self.next.handle(conn).await
    }
}
