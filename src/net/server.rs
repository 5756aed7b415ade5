//! TCP entry point.
//!
//! # Responsibilities
//! - Accept connections through the bounded listener
//! - Hand each connection to the highest-priority router of the current table
//! - Track open connections so shutdown can drain them
//!
//! # Design Decisions
//! - One task per connection; the table is loaded when the connection arrives
//! - Without a router the connection is closed immediately

use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::broadcast;

use crate::handler::TcpConnection;
use crate::net::connection::ConnectionTracker;
use crate::net::listener::{Listener, ListenerError};
use crate::observability::metrics;
use crate::routing::TcpRoutes;

pub type SharedTcpRoutes = Arc<ArcSwap<TcpRoutes>>;

pub struct TcpServer {
    name: String,
    routes: SharedTcpRoutes,
    tracker: ConnectionTracker,
}

impl TcpServer {
    pub fn new(name: impl Into<String>, routes: SharedTcpRoutes, tracker: ConnectionTracker) -> Self {
        Self {
            name: name.into(),
            routes,
            tracker,
        }
    }

    /// Accept until `shutdown` fires. Open connections keep running; drain them
    /// through the tracker.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        let name: Arc<str> = Arc::from(self.name.as_str());
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(entry_point = %name, address = %addr, "TCP entry point starting");
        }

        loop {
            let accepted = tokio::select! {
                result = listener.accept() => result,
                _ = shutdown.recv() => break,
            };

            let (stream, peer, permit) = match accepted {
                Ok(accepted) => accepted,
                Err(ListenerError::Closed) => break,
                Err(e) => {
                    tracing::warn!(entry_point = %name, error = %e, "Accept failed");
                    continue;
                }
            };

            let conn = TcpConnection::new(stream, peer);
            let guard = self.tracker.track(conn.id);
            metrics::record_active_connections(&name, self.tracker.active_count() as usize);

            let routes = self.routes.load_full();
            let tracker = self.tracker.clone();
            let name = name.clone();
            tokio::spawn(async move {
                let _permit = permit;
                let Some(route) = routes.select() else {
                    tracing::debug!(entry_point = %name, connection_id = %conn.id, "No TCP router, closing");
                    return;
                };

                let id = conn.id;
                tracing::debug!(entry_point = %name, router = %route.name, connection_id = %id, client = %peer, "Routing connection");
                if let Err(e) = route.handler().handle(conn).await {
                    tracing::warn!(router = %route.name, connection_id = %id, error = %e, "Connection failed");
                }

                drop(guard);
                metrics::record_active_connections(&name, tracker.active_count() as usize);
            });
        }

        tracing::info!(entry_point = %name, "TCP entry point stopped accepting");
        Ok(())
    }
}
