//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Runtime → watcher → health monitor → providers → entry points → admin API
//!
//! Shutdown (shutdown.rs):
//!     Signal received → every task stops accepting → TCP connections drain → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: background jobs first, listeners last
//! - Shutdown has a timeout: connections still open after the drain deadline are dropped

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
pub use startup::{Proxy, StartupError};
