//! Retry loop driven by a backoff policy.
//!
//! # Responsibilities
//! - Re-run a fallible async operation until it succeeds, fails permanently or the policy stops
//! - Reset the policy after a long-running attempt so a job that ran fine for a while
//!   recovers quickly from a fresh blip
//! - Report each failure with the upcoming wait through a notify callback
//! - Abort the inter-attempt sleep promptly on shutdown
//!
//! # Design Decisions
//! - Only the sleep is raced against cancellation; a running attempt owns its own shutdown
//! - Cancellation is checked before every attempt, so a signal sent during an attempt
//!   is honoured before the next one starts

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::time::Instant;

use crate::observability::metrics;
use crate::resilience::backoff::Backoff;

/// An attempt that ran at least this long resets the policy before the next wait.
pub const LONG_JOB_THRESHOLD: Duration = Duration::from_secs(30);

/// Failure of a single attempt.
#[derive(Debug, Error)]
pub enum OperationError<E> {
    /// Worth retrying.
    #[error("{0}")]
    Transient(E),
    /// Stop retrying at once.
    #[error("{0}")]
    Permanent(E),
}

impl<E> OperationError<E> {
    pub fn transient(err: E) -> Self {
        OperationError::Transient(err)
    }

    pub fn permanent(err: E) -> Self {
        OperationError::Permanent(err)
    }
}

impl<E> From<E> for OperationError<E> {
    fn from(err: E) -> Self {
        OperationError::Transient(err)
    }
}

/// Why `retry_notify` gave up.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The policy stopped; carries the last error.
    #[error("retries exhausted: {0}")]
    Exhausted(E),

    #[error("permanent failure: {0}")]
    Permanent(E),

    /// Shutdown was signalled. Not a failure of the operation.
    #[error("retry cancelled")]
    Cancelled,
}

impl<E> RetryError<E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled)
    }
}

fn is_signalled(cancel: &mut broadcast::Receiver<()>) -> bool {
    !matches!(cancel.try_recv(), Err(TryRecvError::Empty))
}

/// Run `operation` until it succeeds, calling `notify(error, wait)` before each sleep.
///
/// The policy is reset when the loop starts. A closed or lagged cancel channel
/// counts as a shutdown signal.
pub async fn retry_notify<T, E, Op, Fut, B, N>(
    mut operation: Op,
    backoff: &mut B,
    mut notify: N,
    cancel: &mut broadcast::Receiver<()>,
) -> Result<T, RetryError<E>>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, OperationError<E>>>,
    B: Backoff + ?Sized,
    N: FnMut(&E, Duration),
{
    backoff.reset();

    loop {
        if is_signalled(cancel) {
            return Err(RetryError::Cancelled);
        }

        let started = Instant::now();
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(OperationError::Permanent(err)) => return Err(RetryError::Permanent(err)),
            Err(OperationError::Transient(err)) => err,
        };

        if started.elapsed() >= LONG_JOB_THRESHOLD {
            backoff.reset();
        }

        let Some(wait) = backoff.next_backoff() else {
            return Err(RetryError::Exhausted(err));
        };

        metrics::record_retry();
        notify(&err, wait);

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = cancel.recv() => return Err(RetryError::Cancelled),
        }
    }
}

/// `retry_notify` without a notify callback.
pub async fn retry<T, E, Op, Fut, B>(
    operation: Op,
    backoff: &mut B,
    cancel: &mut broadcast::Receiver<()>,
) -> Result<T, RetryError<E>>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, OperationError<E>>>,
    B: Backoff + ?Sized,
{
    retry_notify(operation, backoff, |_, _| {}, cancel).await
}
