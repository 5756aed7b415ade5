//! Traffic handler abstraction.
//!
//! # Data Flow
//! ```text
//! Entry point (HTTP request / TCP connection)
//!     → router handler (middlewares, outermost first)
//!     → service handler (load balancer)
//!     → terminal dispatcher (http::forward / net::forward)
//! ```
//!
//! # Design Decisions
//! - One capability trait per traffic kind, shared by middlewares, balancers and dispatchers
//! - Handlers are `Arc`-shared; the graph is a tree built once per snapshot
//! - A handler that stops traffic must answer it (explicit response or closed connection)
//! - Errors are returned to the entry point, which turns them into a response

use std::net::SocketAddr;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tokio::net::TcpStream;

use crate::load_balancer::DispatchError;
use crate::net::connection::ConnectionId;

/// Handles one HTTP request.
#[async_trait]
pub trait HttpHandler: Send + Sync {
    async fn handle(&self, req: Request<Body>) -> Result<Response, HandlerError>;
}

/// Handles one TCP connection until it is done.
#[async_trait]
pub trait TcpHandler: Send + Sync {
    async fn handle(&self, conn: TcpConnection) -> Result<(), HandlerError>;
}

/// An accepted downstream connection.
#[derive(Debug)]
pub struct TcpConnection {
    pub stream: TcpStream,
    pub peer: SocketAddr,
    pub id: ConnectionId,
}

impl TcpConnection {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            id: ConnectionId::new(),
        }
    }
}

/// Errors surfaced by handlers to the entry point.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("upstream timed out")]
    UpstreamTimeout,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),
}

impl HandlerError {
    pub fn status(&self) -> StatusCode {
        match self {
            HandlerError::Dispatch(_) => StatusCode::SERVICE_UNAVAILABLE,
            HandlerError::Upstream(_) | HandlerError::Io(_) => StatusCode::BAD_GATEWAY,
            HandlerError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            HandlerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let body = match &self {
            HandlerError::Dispatch(_) => "No available backend",
            HandlerError::Upstream(_) | HandlerError::Io(_) => "Upstream request failed",
            HandlerError::UpstreamTimeout => "Upstream timed out",
            HandlerError::InvalidRequest(_) => "Invalid request",
        };
        (self.status(), body).into_response()
    }
}

/// Client address recorded by the entry point, if any.
pub fn client_addr(req: &Request<Body>) -> Option<SocketAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}
