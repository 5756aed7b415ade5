//! Middleware subsystem.
//!
//! # Data Flow
//! ```text
//! Router handler
//!     → middleware layers, outermost = first listed on the router
//!         chain.rs         (expands referenced middlewares in order)
//!         headers.rs       (custom request/response headers)
//!         strip_prefix.rs  (path rewrite + X-Forwarded-Prefix)
//!         ip_allow_list.rs (403 / closed connection)
//!         rate_limit.rs    (429 when the client bucket is empty)
//!         in_flight.rs     (per-client connection cap, TCP)
//!     → service handler
//! ```
//!
//! # Design Decisions
//! - A middleware is built once per snapshot and then wraps any number of inner handlers;
//!   every wrapped handler shares the middleware's state (rate buckets, connection counts)
//! - A middleware that stops traffic answers it itself: explicit HTTP response or a
//!   shut-down connection

pub mod chain;
pub mod headers;
pub mod in_flight;
pub mod ip_allow_list;
pub mod rate_limit;
pub mod strip_prefix;

pub use chain::Chain;
pub use headers::Headers;
pub use in_flight::InFlightConn;
pub use ip_allow_list::{HttpIpAllowList, IpAllowList, TcpIpAllowList};
pub use rate_limit::RateLimit;
pub use strip_prefix::StripPrefix;

use std::sync::Arc;

use crate::handler::{HttpHandler, TcpHandler};

/// Builds HTTP handlers that run before `next`.
pub trait HttpMiddleware: Send + Sync {
    fn wrap(&self, next: Arc<dyn HttpHandler>) -> Arc<dyn HttpHandler>;
}

/// Builds TCP handlers that run before `next`.
pub trait TcpMiddleware: Send + Sync {
    fn wrap(&self, next: Arc<dyn TcpHandler>) -> Arc<dyn TcpHandler>;
}

/// Wrap `handler` so that `layers[0]` sees traffic first.
pub fn apply_http(layers: &[Arc<dyn HttpMiddleware>], handler: Arc<dyn HttpHandler>) -> Arc<dyn HttpHandler> {
    layers.iter().rev().fold(handler, |next, layer| layer.wrap(next))
}

/// Wrap `handler` so that `layers[0]` sees connections first.
pub fn apply_tcp(layers: &[Arc<dyn TcpMiddleware>], handler: Arc<dyn TcpHandler>) -> Arc<dyn TcpHandler> {
    layers.iter().rev().fold(handler, |next, layer| layer.wrap(next))
}

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::{IntoResponse, Response};

    use crate::handler::{HandlerError, HttpHandler};

    /// Echoes the request path and headers back in response headers.
    pub struct Echo;

    #[async_trait]
    impl HttpHandler for Echo {
        async fn handle(&self, req: Request<Body>) -> Result<Response, HandlerError> {
            let mut response = (StatusCode::OK, req.uri().path().to_string()).into_response();
            for (name, value) in req.headers() {
                response.headers_mut().insert(name.clone(), value.clone());
            }
            Ok(response)
        }
    }

    pub async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }
}
