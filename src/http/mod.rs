//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, routing table lookup)
//!     → router handler chain (middlewares, service)
//!     → forward.rs (rewrite URI, forward to the selected server)
//!     → Send response to client
//! ```

pub mod forward;
pub mod server;

pub use forward::{http_client, ForwardHandler, HttpClient};
pub use server::{HttpServer, SharedHttpRoutes};
