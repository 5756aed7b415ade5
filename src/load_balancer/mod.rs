//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Service handler invoked
//!     → balancer picks a server (round_robin.rs / weighted.rs)
//!     → selected handler receives the request or connection
//!     → empty pool: DispatchError::NoAvailableBackend
//! ```
//!
//! # Design Decisions
//! - One balancer type per policy, generic over the handler kind (HTTP or TCP)
//! - Server list and cursor share a single mutex; selection never sees a half-updated pool
//! - No health awareness here: unhealthy servers are left out by the next rebuild,
//!   which replaces the whole balancer
//! - Declared server weights are ignored by round-robin; `weighted.rs` honors weights
//!   between services

pub mod round_robin;
pub mod weighted;

pub use round_robin::RoundRobin;
pub use weighted::WeightedRoundRobin;

use thiserror::Error;

/// Dispatch-time failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The balancer has no server to hand the traffic to.
    #[error("no available backend for service {0:?}")]
    NoAvailableBackend(String),
}
