//! Background jobs kept alive by the retry loop.

use std::fmt::Display;
use std::future::Future;

use tokio::task::JoinHandle;

use crate::lifecycle::Shutdown;
use crate::resilience::backoff::ExponentialBackoff;
use crate::resilience::retries::{retry_notify, OperationError, RetryError};

/// Spawn `operation` as a named task that is retried with `backoff` until it
/// succeeds, fails permanently, exhausts the policy or shutdown is triggered.
///
/// Returns the operation's value when it completed successfully.
pub fn spawn_job<T, E, Op, Fut>(
    name: impl Into<String>,
    operation: Op,
    mut backoff: ExponentialBackoff,
    shutdown: &Shutdown,
) -> JoinHandle<Option<T>>
where
    T: Send + 'static,
    E: Display + Send + 'static,
    Op: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, OperationError<E>>> + Send + 'static,
{
    let name = name.into();
    let mut cancel = shutdown.subscribe();

    tokio::spawn(async move {
        let notify = |err: &E, wait: std::time::Duration| {
            tracing::warn!(
                job = %name,
                error = %err,
                retry_in_ms = wait.as_millis() as u64,
                "Job failed, retrying"
            );
        };

        match retry_notify(operation, &mut backoff, notify, &mut cancel).await {
            Ok(value) => {
                tracing::debug!(job = %name, "Job finished");
                Some(value)
            }
            Err(RetryError::Cancelled) => {
                tracing::debug!(job = %name, "Job cancelled");
                None
            }
            Err(e) => {
                tracing::error!(job = %name, error = %e, "Job stopped");
                None
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn job_retries_until_success() {
        let shutdown = Shutdown::new();
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let handle = spawn_job(
            "flaky",
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(OperationError::transient(format!("attempt {n} failed")))
                    } else {
                        Ok(n)
                    }
                }
            },
            ExponentialBackoff::default(),
            &shutdown,
        );

        assert_eq!(handle.await.unwrap(), Some(3));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_the_job() {
        let shutdown = Shutdown::new();
        let handle = spawn_job(
            "down",
            || async { Err::<(), _>(OperationError::transient("unreachable source")) },
            ExponentialBackoff::new(Duration::from_secs(60), 2.0, Duration::from_secs(60), 0.0),
            &shutdown,
        );

        tokio::time::sleep(Duration::from_secs(1)).await;
        shutdown.trigger();
        assert_eq!(handle.await.unwrap(), None);
    }
}
