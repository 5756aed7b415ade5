//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Periodic timer
//!     → Probe each configured server
//!     → Update state.rs
//!     → On a transition: ask the configuration watcher to rebuild
//!
//! State machine (state.rs):
//!     Healthy ←→ Unhealthy
//!     With thresholds to prevent flapping
//! ```
//!
//! # Design Decisions
//! - Balancers are not health-aware; a rebuild leaves unhealthy servers out
//! - State transitions require consecutive successes/failures
//! - Health state is per server, shared by every service listing it

pub mod active;
pub mod state;

pub use active::{HealthMonitor, HealthTargets};
pub use state::{HealthRegistry, HealthStatus};
