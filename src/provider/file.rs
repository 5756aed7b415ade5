//! File provider: reads the dynamic configuration from a TOML file.
//!
//! The parent directory is watched rather than the file itself so that editors
//! replacing the file through a rename are still noticed.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use notify::{Event, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};

use crate::config::loader::load_dynamic_config;
use crate::config::schema::FileProviderConfig;
use crate::config::watcher::ConfigMessage;
use crate::provider::{Provider, ProviderError};
use crate::resilience::OperationError;

/// Quiet period after a file event before the file is read again.
const DEBOUNCE: Duration = Duration::from_millis(100);

pub struct FileProvider {
    path: PathBuf,
    watch: bool,
}

impl FileProvider {
    pub fn new(path: impl Into<PathBuf>, watch: bool) -> Self {
        Self {
            path: path.into(),
            watch,
        }
    }

    pub fn from_config(config: &FileProviderConfig) -> Self {
        Self::new(config.path.clone(), config.watch)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn send_snapshot(
        &self,
        sink: &mpsc::Sender<ConfigMessage>,
    ) -> Result<(), OperationError<ProviderError>> {
        let config = load_dynamic_config(&self.path).map_err(ProviderError::from)?;
        tracing::debug!(path = %self.path.display(), "Configuration file read");

        let message = ConfigMessage::Snapshot {
            provider: self.name().to_string(),
            config,
        };
        sink.send(message)
            .await
            .map_err(|_| OperationError::permanent(ProviderError::Closed))
    }

    fn watch_dir(&self) -> &Path {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }
}

#[async_trait]
impl Provider for FileProvider {
    fn name(&self) -> &str {
        "file"
    }

    async fn provide(
        &self,
        sink: mpsc::Sender<ConfigMessage>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), OperationError<ProviderError>> {
        self.send_snapshot(&sink).await?;
        if !self.watch {
            return Ok(());
        }

        let file_name: Option<OsString> = self.path.file_name().map(OsString::from);
        let (events_tx, mut events) = mpsc::unbounded_channel::<()>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let ours = event
                    .paths
                    .iter()
                    .any(|p| p.file_name().map(OsString::from) == file_name);
                let relevant = event.kind.is_create() || event.kind.is_modify() || event.kind.is_remove();
                if ours && relevant {
                    let _ = events_tx.send(());
                }
            }
            Err(e) => tracing::warn!(error = %e, "File watch error"),
        })
        .map_err(ProviderError::from)?;
        watcher
            .watch(self.watch_dir(), RecursiveMode::NonRecursive)
            .map_err(ProviderError::from)?;
        tracing::info!(path = %self.path.display(), "Watching configuration file");

        loop {
            tokio::select! {
                event = events.recv() => {
                    if event.is_none() {
                        return Err(OperationError::transient(ProviderError::Closed));
                    }
                }
                _ = shutdown.recv() => return Ok(()),
            }

            tokio::time::sleep(DEBOUNCE).await;
            while events.try_recv().is_ok() {}

            tracing::info!(path = %self.path.display(), "Configuration file changed, reloading");
            // A half-written or broken file restarts the provider, which reads it again after a backoff.
            self.send_snapshot(&sink).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::ConfigError;
    use std::fs;

    const FIRST: &str = "[http.services.app.load_balancer]\nservers = []\n";
    const SECOND: &str = "[http.services.other.load_balancer]\nservers = []\n";

    async fn next_services(rx: &mut mpsc::Receiver<ConfigMessage>) -> Vec<String> {
        let message = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("no snapshot received")
            .unwrap();
        match message {
            ConfigMessage::Snapshot { provider, config } => {
                assert_eq!(provider, "file");
                config.http.services.keys().cloned().collect()
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[tokio::test]
    async fn sends_one_snapshot_without_watch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dynamic.toml");
        fs::write(&path, FIRST).unwrap();

        let (tx, mut rx) = mpsc::channel(4);
        let (_shutdown_tx, shutdown) = broadcast::channel(1);
        FileProvider::new(&path, false).provide(tx, shutdown).await.unwrap();

        assert_eq!(next_services(&mut rx).await, vec!["app"]);
    }

    #[tokio::test]
    async fn missing_file_is_transient() {
        let (tx, _rx) = mpsc::channel(4);
        let (_shutdown_tx, shutdown) = broadcast::channel(1);
        let err = FileProvider::new("/nonexistent/dynamic.toml", false)
            .provide(tx, shutdown)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OperationError::Transient(ProviderError::Config(ConfigError::Io(_)))
        ));
    }

    #[tokio::test]
    async fn closed_sink_is_permanent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dynamic.toml");
        fs::write(&path, FIRST).unwrap();

        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let (_shutdown_tx, shutdown) = broadcast::channel(1);
        let err = FileProvider::new(&path, false).provide(tx, shutdown).await.unwrap_err();
        assert!(matches!(err, OperationError::Permanent(ProviderError::Closed)));
    }

    #[tokio::test]
    async fn reloads_when_the_file_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dynamic.toml");
        fs::write(&path, FIRST).unwrap();

        let (tx, mut rx) = mpsc::channel(4);
        let (shutdown_tx, shutdown) = broadcast::channel(1);
        let provider = FileProvider::new(&path, true);
        let task = tokio::spawn(async move { provider.provide(tx, shutdown).await });

        assert_eq!(next_services(&mut rx).await, vec!["app"]);

        // Give the watcher time to register before touching the file.
        tokio::time::sleep(Duration::from_millis(200)).await;
        fs::write(&path, SECOND).unwrap();
        assert_eq!(next_services(&mut rx).await, vec!["other"]);

        shutdown_tx.send(()).unwrap();
        assert!(task.await.unwrap().is_ok());
    }
}
