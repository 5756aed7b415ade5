//! Path prefix removal.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderValue, Request, Uri};
use axum::response::Response;

use crate::handler::{HandlerError, HttpHandler};
use crate::middleware::HttpMiddleware;

pub const FORWARDED_PREFIX: &str = "x-forwarded-prefix";

/// Removes the first matching prefix from the request path and records it in
/// `X-Forwarded-Prefix`. Requests matching no prefix pass through untouched.
pub struct StripPrefix {
    prefixes: Arc<Vec<String>>,
}

impl StripPrefix {
    pub fn new(prefixes: &[String]) -> Result<Self, String> {
        if let Some(bad) = prefixes.iter().find(|p| !p.starts_with('/')) {
            return Err(format!("prefix {bad:?} must start with '/'"));
        }
        Ok(Self {
            prefixes: Arc::new(prefixes.to_vec()),
        })
    }
}

impl HttpMiddleware for StripPrefix {
    fn wrap(&self, next: Arc<dyn HttpHandler>) -> Arc<dyn HttpHandler> {
        Arc::new(StripPrefixHandler {
            prefixes: self.prefixes.clone(),
            next,
        })
    }
}

struct StripPrefixHandler {
    prefixes: Arc<Vec<String>>,
    next: Arc<dyn HttpHandler>,
}

/// Strip `prefix` from `path` on a segment boundary.
fn strip<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let prefix = prefix.trim_end_matches('/');
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() || rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

#[async_trait]
impl HttpHandler for StripPrefixHandler {
    async fn handle(&self, mut req: Request<Body>) -> Result<Response, HandlerError> {
        let path = req.uri().path().to_string();
        let matched = self
            .prefixes
            .iter()
            .find_map(|prefix| strip(&path, prefix).map(|rest| (prefix, rest)));

        if let Some((prefix, rest)) = matched {
            let new_path = if rest.is_empty() { "/" } else { rest };
            let path_and_query = match req.uri().query() {
                Some(q) => format!("{new_path}?{q}"),
                None => new_path.to_string(),
            };

            let mut parts = req.uri().clone().into_parts();
            parts.path_and_query = Some(
                path_and_query
                    .parse()
                    .map_err(|e| HandlerError::InvalidRequest(format!("{e}")))?,
            );
            *req.uri_mut() =
                Uri::from_parts(parts).map_err(|e| HandlerError::InvalidRequest(e.to_string()))?;

            let value = HeaderValue::from_str(prefix.trim_end_matches('/'))
                .map_err(|e| HandlerError::InvalidRequest(e.to_string()))?;
            req.headers_mut().insert(FORWARDED_PREFIX, value);
            tracing::trace!(prefix = %prefix, path = %new_path, "Stripped path prefix");
        }

        self.next.handle(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::testing::{body_string, Echo};

    async fn run(prefixes: &[&str], uri: &str) -> Response {
        let prefixes: Vec<String> = prefixes.iter().map(|p| p.to_string()).collect();
        let handler = StripPrefix::new(&prefixes).unwrap().wrap(Arc::new(Echo));
        handler
            .handle(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn strips_first_matching_prefix() {
        let response = run(&["/v1", "/api"], "/api/users?page=2").await;
        assert_eq!(response.headers()[FORWARDED_PREFIX], "/api");
        assert_eq!(body_string(response).await, "/users");
    }

    #[tokio::test]
    async fn exact_prefix_becomes_root() {
        let response = run(&["/api/"], "/api").await;
        assert_eq!(body_string(response).await, "/");
    }

    #[tokio::test]
    async fn partial_segment_is_not_stripped() {
        let response = run(&["/api"], "/apiary").await;
        assert!(response.headers().get(FORWARDED_PREFIX).is_none());
        assert_eq!(body_string(response).await, "/apiary");
    }

    #[test]
    fn relative_prefix_is_rejected() {
        assert!(StripPrefix::new(&["api".to_string()]).is_err());
    }
}
