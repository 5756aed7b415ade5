//! Per-entry-point routing tables.
//!
//! # Responsibilities
//! - Store the routers built for one entry point
//! - Look up the router for a request, or report no match
//!
//! # Design Decisions
//! - Immutable after construction; a new snapshot builds a new table
//! - Ordered by descending priority, then name, so lookups are deterministic
//! - First match wins

use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;

use crate::handler::{HttpHandler, TcpHandler};
use crate::routing::matcher::{AndMatcher, Matcher};

/// A built HTTP router: its rule plus the head of its handler chain.
pub struct HttpRoute {
    pub name: String,
    pub priority: i32,
    matcher: AndMatcher,
    handler: Arc<dyn HttpHandler>,
}

impl HttpRoute {
    pub fn new(
        name: impl Into<String>,
        priority: i32,
        matcher: AndMatcher,
        handler: Arc<dyn HttpHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            priority,
            matcher,
            handler,
        }
    }

    pub fn handler(&self) -> &Arc<dyn HttpHandler> {
        &self.handler
    }
}

impl std::fmt::Debug for HttpRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRoute")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("matcher", &self.matcher)
            .finish()
    }
}

/// Routing table of an HTTP entry point.
#[derive(Debug, Default)]
pub struct HttpRoutes {
    routes: Vec<HttpRoute>,
}

impl HttpRoutes {
    pub fn new(mut routes: Vec<HttpRoute>) -> Self {
        routes.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.name.cmp(&b.name)));
        Self { routes }
    }

    /// First router whose rule matches the request.
    pub fn match_request(&self, req: &Request<Body>) -> Option<&HttpRoute> {
        self.routes.iter().find(|route| route.matcher.matches(req))
    }

    pub fn names(&self) -> Vec<&str> {
        self.routes.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

pub struct TcpRoute {
    pub name: String,
    pub priority: i32,
    handler: Arc<dyn TcpHandler>,
}

impl TcpRoute {
    pub fn new(name: impl Into<String>, priority: i32, handler: Arc<dyn TcpHandler>) -> Self {
        Self {
            name: name.into(),
            priority,
            handler,
        }
    }

    pub fn handler(&self) -> &Arc<dyn TcpHandler> {
        &self.handler
    }
}

impl std::fmt::Debug for TcpRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpRoute")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .finish()
    }
}

/// Routing table of a TCP entry point.
///
/// Raw TCP carries nothing to match on, so every connection goes to the
/// highest-priority router.
#[derive(Debug, Default)]
pub struct TcpRoutes {
    routes: Vec<TcpRoute>,
}

impl TcpRoutes {
    pub fn new(mut routes: Vec<TcpRoute>) -> Self {
        routes.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.name.cmp(&b.name)));
        Self { routes }
    }

    pub fn select(&self) -> Option<&TcpRoute> {
        self.routes.first()
    }

    pub fn names(&self) -> Vec<&str> {
        self.routes.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::dynamic::RuleConfig;
    use crate::handler::{HandlerError, TcpConnection};
    use async_trait::async_trait;
    use axum::response::Response;

    struct Noop;

    #[async_trait]
    impl HttpHandler for Noop {
        async fn handle(&self, _req: Request<Body>) -> Result<Response, HandlerError> {
            Ok(Response::new(Body::empty()))
        }
    }

    #[async_trait]
    impl TcpHandler for Noop {
        async fn handle(&self, _conn: TcpConnection) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    fn route(name: &str, priority: i32, host: Option<&str>, prefix: Option<&str>) -> HttpRoute {
        let rule = RuleConfig {
            host: host.map(String::from),
            path_prefix: prefix.map(String::from),
        };
        HttpRoute::new(name, priority, AndMatcher::from_rule(&rule), Arc::new(Noop))
    }

    fn request(host: &str, path: &str) -> Request<Body> {
        Request::builder()
            .uri(path)
            .header("host", host)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn higher_priority_wins() {
        let routes = HttpRoutes::new(vec![
            route("catch-all", 0, None, None),
            route("api", 10, None, Some("/api")),
            route("api-host", 20, Some("api.example.com"), Some("/api")),
        ]);
        assert_eq!(routes.names(), vec!["api-host", "api", "catch-all"]);

        let name = |host, path| routes.match_request(&request(host, path)).unwrap().name.clone();
        assert_eq!(name("api.example.com", "/api/v1"), "api-host");
        assert_eq!(name("example.com", "/api/v1"), "api");
        assert_eq!(name("example.com", "/"), "catch-all");
    }

    #[test]
    fn equal_priority_orders_by_name() {
        let routes = HttpRoutes::new(vec![route("b", 0, None, None), route("a", 0, None, None)]);
        assert_eq!(routes.match_request(&request("x", "/")).unwrap().name, "a");
    }

    #[test]
    fn no_match_is_explicit() {
        let routes = HttpRoutes::new(vec![route("api", 0, None, Some("/api"))]);
        assert!(routes.match_request(&request("x", "/web")).is_none());
        assert!(HttpRoutes::default().match_request(&request("x", "/")).is_none());
    }

    #[test]
    fn tcp_selects_highest_priority() {
        let routes = TcpRoutes::new(vec![
            TcpRoute::new("low", 1, Arc::new(Noop)),
            TcpRoute::new("high", 5, Arc::new(Noop)),
        ]);
        assert_eq!(routes.select().unwrap().name, "high");
        assert!(TcpRoutes::default().select().is_none());
    }
}
