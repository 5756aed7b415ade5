//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (host, path)
//!     → router.rs (table of the entry point)
//!     → matcher.rs (evaluate router rules)
//!     → Return: matched route handler or NoMatch
//!
//! Table compilation (on every applied snapshot):
//!     routers of the entry point
//!     → Sort by priority
//!     → Compile rules
//!     → Freeze as immutable table, swapped in atomically
//! ```
//!
//! # Design Decisions
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route
//! - First match wins (ordered by priority)

pub mod matcher;
pub mod router;

pub use router::{HttpRoute, HttpRoutes, TcpRoute, TcpRoutes};
