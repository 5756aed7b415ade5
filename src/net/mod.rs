//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept, connection limits)
//!     → connection.rs (identity, lifecycle tracking)
//!     → server.rs (TCP entry point: pick router, spawn handler)
//!     → forward.rs (pipe bytes to the selected server)
//! ```
//!
//! # Design Decisions
//! - Bounded accept prevents resource exhaustion
//! - Each connection tracked for graceful shutdown

pub mod connection;
pub mod forward;
pub mod listener;
pub mod server;

pub use forward::TcpForwarder;
pub use listener::{Listener, ListenerError};
pub use server::{SharedTcpRoutes, TcpServer};
