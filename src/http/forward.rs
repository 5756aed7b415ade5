//! Terminal HTTP dispatcher: forwards a request to one backend server.
//!
//! # Responsibilities
//! - Rewrite the request URI onto the server URL
//! - Keep or replace the Host header
//! - Append the client to `X-Forwarded-For`
//! - Enforce the request deadline
//!
//! # Design Decisions
//! - One pooled hyper client for the watcher's lifetime, shared by every server of
//!   every snapshot
//! - Upstream failures surface as `HandlerError`; the entry point renders them

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::{header, HeaderValue, Request, Uri};
use axum::response::Response;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use url::Url;

use crate::handler::{client_addr, HandlerError, HttpHandler};

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_FORWARDED_HOST: &str = "x-forwarded-host";

pub type HttpClient = Client<HttpConnector, Body>;

/// Pooled client shared by every forwarder the watcher builds.
pub fn http_client(connect_timeout: Duration) -> HttpClient {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(connect_timeout));
    connector.set_nodelay(true);
    Client::builder(TokioExecutor::new()).build(connector)
}

pub struct ForwardHandler {
    url: String,
    authority: Authority,
    base_path: String,
    pass_host_header: bool,
    client: HttpClient,
    request_timeout: Duration,
}

impl ForwardHandler {
    /// Only `http://` servers are supported.
    pub fn new(
        url: &str,
        pass_host_header: bool,
        client: HttpClient,
        request_timeout: Duration,
    ) -> Result<Self, String> {
        let parsed = Url::parse(url).map_err(|e| format!("invalid server URL {url:?}: {e}"))?;
        if parsed.scheme() != "http" {
            return Err(format!("unsupported scheme {:?} in server URL {url:?}", parsed.scheme()));
        }
        let host = parsed
            .host_str()
            .ok_or_else(|| format!("server URL {url:?} has no host"))?;
        let authority = match parsed.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let authority = Authority::from_str(&authority)
            .map_err(|e| format!("invalid authority in server URL {url:?}: {e}"))?;

        Ok(Self {
            url: url.to_string(),
            authority,
            base_path: parsed.path().trim_end_matches('/').to_string(),
            pass_host_header,
            client,
            request_timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn upstream_uri(&self, uri: &Uri) -> Result<Uri, HandlerError> {
        let path_and_query = uri.path_and_query().map(PathAndQuery::as_str).unwrap_or("/");
        let path_and_query = PathAndQuery::from_str(&format!("{}{}", self.base_path, path_and_query))
            .map_err(|e| HandlerError::InvalidRequest(e.to_string()))?;

        Uri::builder()
            .scheme(Scheme::HTTP)
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
            .map_err(|e| HandlerError::InvalidRequest(e.to_string()))
    }
}

#[async_trait]
impl HttpHandler for ForwardHandler {
    async fn handle(&self, mut req: Request<Body>) -> Result<Response, HandlerError> {
        let uri = self.upstream_uri(req.uri())?;
        let client = client_addr(&req);
        let headers = req.headers_mut();

        if let Some(addr) = client {
            let forwarded = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
                Some(existing) => format!("{existing}, {}", addr.ip()),
                None => addr.ip().to_string(),
            };
            if let Ok(value) = HeaderValue::from_str(&forwarded) {
                headers.insert(X_FORWARDED_FOR, value);
            }
        }

        if let Some(host) = headers.get(header::HOST).cloned() {
            headers.insert(X_FORWARDED_HOST, host);
        }
        if !self.pass_host_header {
            if let Ok(value) = HeaderValue::from_str(self.authority.as_str()) {
                headers.insert(header::HOST, value);
            }
        }

        *req.uri_mut() = uri;

        tracing::debug!(server = %self.url, uri = %req.uri(), "Forwarding request");
        match tokio::time::timeout(self.request_timeout, self.client.request(req)).await {
            Ok(Ok(response)) => {
                let (parts, body) = response.into_parts();
                Ok(Response::from_parts(parts, Body::new(body)))
            }
            Ok(Err(e)) => {
                tracing::warn!(server = %self.url, error = %e, "Upstream error");
                Err(HandlerError::Upstream(e.to_string()))
            }
            Err(_) => {
                tracing::warn!(server = %self.url, timeout = ?self.request_timeout, "Upstream timed out");
                Err(HandlerError::UpstreamTimeout)
            }
        }
    }
}
