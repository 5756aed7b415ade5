//! Custom request and response headers.
//!
//! An empty value removes the header instead of setting it.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request};
use axum::response::Response;

use crate::handler::{HandlerError, HttpHandler};
use crate::middleware::HttpMiddleware;

#[derive(Debug, Clone)]
enum HeaderOp {
    Set(HeaderName, HeaderValue),
    Remove(HeaderName),
}

impl HeaderOp {
    fn apply(&self, headers: &mut HeaderMap) {
        match self {
            HeaderOp::Set(name, value) => {
                headers.insert(name.clone(), value.clone());
            }
            HeaderOp::Remove(name) => {
                headers.remove(name);
            }
        }
    }
}

fn parse_ops(headers: &BTreeMap<String, String>) -> Result<Vec<HeaderOp>, String> {
    headers
        .iter()
        .map(|(name, value)| {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| format!("invalid header name {name:?}: {e}"))?;
            if value.is_empty() {
                return Ok(HeaderOp::Remove(name));
            }
            let value = HeaderValue::from_str(value)
                .map_err(|e| format!("invalid value for header {name}: {e}"))?;
            Ok(HeaderOp::Set(name, value))
        })
        .collect()
}

pub struct Headers {
    ops: Arc<HeaderOps>,
}

#[derive(Debug)]
struct HeaderOps {
    request: Vec<HeaderOp>,
    response: Vec<HeaderOp>,
}

impl Headers {
    pub fn new(
        request: &BTreeMap<String, String>,
        response: &BTreeMap<String, String>,
    ) -> Result<Self, String> {
        Ok(Self {
            ops: Arc::new(HeaderOps {
                request: parse_ops(request)?,
                response: parse_ops(response)?,
            }),
        })
    }
}

impl HttpMiddleware for Headers {
    fn wrap(&self, next: Arc<dyn HttpHandler>) -> Arc<dyn HttpHandler> {
        Arc::new(HeadersHandler {
            ops: self.ops.clone(),
            next,
        })
    }
}

struct HeadersHandler {
    ops: Arc<HeaderOps>,
    next: Arc<dyn HttpHandler>,
}

#[async_trait]
impl HttpHandler for HeadersHandler {
    async fn handle(&self, mut req: Request<Body>) -> Result<Response, HandlerError> {
        for op in &self.ops.request {
            op.apply(req.headers_mut());
        }
        let mut response = self.next.handle(req).await?;
        for op in &self.ops.response {
            op.apply(response.headers_mut());
        }
        Ok(response)
    }
}
