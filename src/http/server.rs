//! HTTP entry point.
//!
//! # Responsibilities
//! - Serve HTTP/1.1 and HTTP/2 on a bound listener via Axum
//! - Look up the router for each request in the current routing table
//! - Hand the request to the router's handler chain
//! - Render handler errors as gateway responses
//!
//! # Design Decisions
//! - The routing table is loaded once per request; a swap mid-request does not affect it
//! - Unmatched requests get an explicit 404
//! - Client address is recorded via connect info for middlewares and forwarders

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::observability::metrics;
use crate::routing::HttpRoutes;

/// Routing table of an HTTP entry point, swapped on every applied snapshot.
pub type SharedHttpRoutes = Arc<ArcSwap<HttpRoutes>>;

#[derive(Clone)]
struct EntryPointState {
    name: Arc<str>,
    routes: SharedHttpRoutes,
}

/// HTTP server for one entry point.
pub struct HttpServer {
    name: String,
    router: Router,
}

impl HttpServer {
    /// `max_requests` caps concurrently handled requests.
    pub fn new(name: impl Into<String>, routes: SharedHttpRoutes, max_requests: usize) -> Self {
        let name = name.into();
        let state = EntryPointState {
            name: Arc::from(name.as_str()),
            routes,
        };
        let router = Router::new()
            .fallback(proxy_handler)
            .with_state(state)
            .layer(GlobalConcurrencyLimitLayer::new(max_requests))
            .layer(TraceLayer::new_for_http());
        Self { name, router }
    }

    /// Run until `shutdown` fires, then finish in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(entry_point = %self.name, address = %addr, "HTTP entry point starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!(entry_point = %self.name, "HTTP entry point stopped");
        Ok(())
    }
}

async fn proxy_handler(State(state): State<EntryPointState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let routes = state.routes.load_full();
    let Some(route) = routes.match_request(&request) else {
        tracing::debug!(entry_point = %state.name, path = %path, "No route matched");
        metrics::record_request(&method, 404, "none", start_time);
        return (StatusCode::NOT_FOUND, "No matching route found").into_response();
    };

    tracing::debug!(
        entry_point = %state.name,
        router = %route.name,
        method = %method,
        path = %path,
        "Proxying request"
    );

    let response = match route.handler().handle(request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(router = %route.name, error = %e, "Request failed");
            e.into_response()
        }
    };
    metrics::record_request(&method, response.status().as_u16(), &route.name, start_time);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{HandlerError, HttpHandler};
    use crate::load_balancer::RoundRobin;
    use crate::routing::matcher::AndMatcher;
    use crate::routing::HttpRoute;
    use crate::config::dynamic::RuleConfig;
    use async_trait::async_trait;
    use tower::ServiceExt;

    struct Fixed(&'static str);

    #[async_trait]
    impl HttpHandler for Fixed {
        async fn handle(&self, _req: Request<Body>) -> Result<Response, HandlerError> {
            Ok(self.0.into_response())
        }
    }

    fn table(routes: Vec<HttpRoute>) -> SharedHttpRoutes {
        Arc::new(ArcSwap::from_pointee(HttpRoutes::new(routes)))
    }

    fn api_route(handler: Arc<dyn HttpHandler>) -> HttpRoute {
        let rule = RuleConfig {
            host: None,
            path_prefix: Some("/api".into()),
        };
        HttpRoute::new("api", 0, AndMatcher::from_rule(&rule), handler)
    }

    async fn call(router: Router, path: &str) -> (StatusCode, String) {
        let response = router
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn dispatches_to_matching_router() {
        let server = HttpServer::new("web", table(vec![api_route(Arc::new(Fixed("api")))]), 16);
        assert_eq!(call(server.router.clone(), "/api/x").await, (StatusCode::OK, "api".into()));
        assert_eq!(call(server.router, "/other").await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn empty_service_answers_503() {
        let empty: Arc<dyn HttpHandler> = Arc::new(RoundRobin::<dyn HttpHandler>::new("app"));
        let server = HttpServer::new("web", table(vec![api_route(empty)]), 16);
        assert_eq!(call(server.router, "/api").await.0, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn swapped_table_takes_effect() {
        let routes = table(vec![api_route(Arc::new(Fixed("old")))]);
        let server = HttpServer::new("web", routes.clone(), 16);

        routes.store(Arc::new(HttpRoutes::new(vec![api_route(Arc::new(Fixed("new")))])));
        assert_eq!(call(server.router, "/api").await.1, "new");
    }
}
