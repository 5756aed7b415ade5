//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Background job (provider pull, ...):
//!     → job.rs (named tokio task, logs each failure)
//!     → retries.rs (retry loop, long-job reset, cancellable sleep)
//!     → backoff.rs (exponential interval, capped, jittered)
//! ```
//!
//! # Design Decisions
//! - Jittered backoff prevents thundering herd against a recovering source
//! - An attempt that ran for a long time counts as recovered; the next failure starts from
//!   the initial interval again
//! - Cancellation is not an error: it is reported as its own outcome
//! - Operations mark unrecoverable failures permanent to stop retrying

pub mod backoff;
pub mod job;
pub mod retries;

pub use backoff::{Backoff, ExponentialBackoff};
pub use job::spawn_job;
pub use retries::{retry, retry_notify, OperationError, RetryError, LONG_JOB_THRESHOLD};
