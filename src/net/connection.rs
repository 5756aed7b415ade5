//! Connection identity and open-connection accounting for shutdown drains.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection identifier, shown as `conn-<n>` in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Default)]
struct Open {
    count: AtomicU64,
    closed: Notify,
}

/// Counts open connections across TCP entry points. Clones share the count.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    open: Arc<Open>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count `id` as open until the returned guard is dropped.
    pub fn track(&self, id: ConnectionId) -> ConnectionGuard {
        self.open.count.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            open: self.open.clone(),
            id,
        }
    }

    pub fn active_count(&self) -> u64 {
        self.open.count.load(Ordering::SeqCst)
    }

    /// Wait for the count to reach zero. False if `deadline` passed first.
    pub async fn drain(&self, deadline: Duration) -> bool {
        let all_closed = async {
            loop {
                let closed = self.open.closed.notified();
                if self.active_count() == 0 {
                    return;
                }
                closed.await;
            }
        };
        tokio::time::timeout(deadline, all_closed).await.is_ok()
    }
}

#[derive(Debug)]
pub struct ConnectionGuard {
    open: Arc<Open>,
    id: ConnectionId,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if self.open.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.open.closed.notify_waiters();
        }
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}
