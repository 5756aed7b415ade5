//! Dynamic configuration providers.
//!
//! # Data Flow
//! ```text
//! Provider (file.rs, ...)
//!     → ConfigMessage::Snapshot over the watcher channel
//!     → ConfigurationWatcher (dedupe, build, swap)
//! ```
//!
//! # Design Decisions
//! - Every provider runs as a background job under the retry scheduler: a
//!   transient failure restarts it after a backoff, a permanent one stops it
//! - Providers always send complete snapshots, never deltas

pub mod file;

pub use file::FileProvider;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::config::loader::ConfigError;
use crate::config::watcher::ConfigMessage;
use crate::lifecycle::Shutdown;
use crate::resilience::{spawn_job, ExponentialBackoff, OperationError};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("loading configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("watching configuration: {0}")]
    Watch(#[from] notify::Error),

    /// The configuration watcher dropped its receiver.
    #[error("configuration channel closed")]
    Closed,
}

/// A source of dynamic configuration snapshots.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    /// Send snapshots into `sink` until `shutdown` fires or the source is
    /// exhausted. Errors marked transient restart the provider.
    async fn provide(
        &self,
        sink: mpsc::Sender<ConfigMessage>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), OperationError<ProviderError>>;
}

/// Run `provider` as a retried background job.
pub fn start(
    provider: Arc<dyn Provider>,
    sink: mpsc::Sender<ConfigMessage>,
    backoff: ExponentialBackoff,
    shutdown: &Shutdown,
) -> JoinHandle<Option<()>> {
    let name = format!("provider:{}", provider.name());
    let signal = shutdown.clone();

    spawn_job(
        name,
        move || {
            let provider = provider.clone();
            let sink = sink.clone();
            let shutdown = signal.subscribe();
            async move { provider.provide(sink, shutdown).await }
        },
        backoff,
        shutdown,
    )
}
