//! Reload triggers and the reload queue.
//!
//! Triggers never reload directly. They push a [`ReloadTrigger`] onto a
//! single-consumer queue, and the [`ReloadWorker`] re-resolves on its next
//! turn, so a reload never runs inside a signal or watcher callback. Requests
//! that pile up while a reload is pending are coalesced into one.
//!
//! Two triggers exist:
//! - SIGHUP (unix only)
//! - A debounced watcher on the config directory, reacting to changes of
//!   files with a supported config extension

use super::discover::SourceFormat;
use super::publisher::ConfigService;
use crate::error::Result;
use notify_debouncer_mini::{DebouncedEventKind, new_debouncer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc as std_mpsc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Why a reload was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadTrigger {
    /// The process received SIGHUP
    Signal,
    /// Config files changed on disk
    FilesChanged(Vec<PathBuf>),
    /// Requested programmatically
    Manual,
}

impl std::fmt::Display for ReloadTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReloadTrigger::Signal => write!(f, "signal"),
            ReloadTrigger::FilesChanged(paths) => write!(f, "{} changed file(s)", paths.len()),
            ReloadTrigger::Manual => write!(f, "request"),
        }
    }
}

/// Sending side of the reload queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ReloadQueue {
    tx: mpsc::UnboundedSender<ReloadTrigger>,
}

impl ReloadQueue {
    /// Enqueue a reload. Returns `false` once the worker is gone.
    pub fn request(&self, trigger: ReloadTrigger) -> bool {
        self.tx.send(trigger).is_ok()
    }
}

/// Consuming side of the reload queue.
#[derive(Debug)]
pub struct ReloadWorker {
    rx: mpsc::UnboundedReceiver<ReloadTrigger>,
}

/// Create a connected queue and worker.
pub fn reload_queue() -> (ReloadQueue, ReloadWorker) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ReloadQueue { tx }, ReloadWorker { rx })
}

impl ReloadWorker {
    /// Process reload requests until every queue handle is dropped.
    ///
    /// A failed reload ends the loop with the error; the previous
    /// configuration is not kept as a fallback.
    pub async fn run(mut self, service: Arc<ConfigService>) -> Result<()> {
        while let Some(trigger) = self.rx.recv().await {
            let coalesced = self.discard_pending();
            info!(
                "Reload requested by {} ({} request(s) coalesced)",
                trigger,
                coalesced + 1
            );
            service.reload()?;
        }
        debug!("Reload queue closed");
        Ok(())
    }

    /// Handle every request already queued, without waiting.
    ///
    /// Returns the number of reloads performed (0 or 1).
    pub fn run_pending(&mut self, service: &ConfigService) -> Result<usize> {
        match self.rx.try_recv() {
            Ok(trigger) => {
                let coalesced = self.discard_pending();
                debug!(
                    "Reload requested by {} ({} request(s) coalesced)",
                    trigger,
                    coalesced + 1
                );
                service.reload()?;
                Ok(1)
            }
            Err(_) => Ok(0),
        }
    }

    fn discard_pending(&mut self) -> usize {
        let mut count = 0;
        while self.rx.try_recv().is_ok() {
            count += 1;
        }
        count
    }
}

/// Forward SIGHUP to the reload queue.
///
/// Must be called from within a tokio runtime.
#[cfg(unix)]
pub fn spawn_signal_listener(queue: ReloadQueue) -> std::io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = signal(SignalKind::hangup())?;
    info!("Listening for SIGHUP to reload configuration");
    Ok(tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            debug!("SIGHUP received");
            if !queue.request(ReloadTrigger::Signal) {
                break;
            }
        }
    }))
}

#[cfg(not(unix))]
pub fn spawn_signal_listener(queue: ReloadQueue) -> std::io::Result<JoinHandle<()>> {
    tracing::warn!("Reload signal is not supported on this platform");
    Ok(tokio::spawn(async move {
        drop(queue);
    }))
}

/// Configuration for the file watcher.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Debounce duration for coalescing rapid changes.
    pub debounce_duration: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_duration: Duration::from_millis(500),
        }
    }
}

/// Handle to the running file watcher.
pub struct ConfigWatcherHandle {
    /// Handle to the watcher task.
    _task_handle: JoinHandle<()>,
}

/// Watch `config_dir` recursively and enqueue a reload whenever a config file
/// in it changes.
///
/// The watcher stops once the reload worker is gone.
pub fn start_config_watcher(
    config_dir: &Path,
    config: WatcherConfig,
    queue: ReloadQueue,
) -> std::result::Result<ConfigWatcherHandle, notify::Error> {
    let (notify_tx, notify_rx) = std_mpsc::channel();

    // Create the debounced watcher
    let mut debouncer = new_debouncer(config.debounce_duration, notify_tx)?;
    debouncer
        .watcher()
        .watch(config_dir, notify::RecursiveMode::Recursive)?;
    info!("Watching config directory: {}", config_dir.display());

    // Spawn the event processing task
    let task_handle = tokio::task::spawn_blocking(move || {
        // Keep the debouncer alive
        let _debouncer = debouncer;
        process_notify_events(notify_rx, queue);
    });

    Ok(ConfigWatcherHandle {
        _task_handle: task_handle,
    })
}

/// Turn debounced notify events into reload requests.
fn process_notify_events(
    rx: std_mpsc::Receiver<
        std::result::Result<Vec<notify_debouncer_mini::DebouncedEvent>, notify::Error>,
    >,
    queue: ReloadQueue,
) {
    loop {
        match rx.recv() {
            Ok(Ok(events)) => {
                let paths = events
                    .into_iter()
                    .filter(|event| {
                        matches!(
                            event.kind,
                            DebouncedEventKind::Any | DebouncedEventKind::AnyContinuous
                        )
                    })
                    .map(|event| event.path);
                if let Some(trigger) = classify_paths(paths) {
                    debug!("Config change detected: {:?}", trigger);
                    if !queue.request(trigger) {
                        info!("Reload worker gone, stopping config watcher");
                        return;
                    }
                }
            }
            Ok(Err(e)) => {
                error!("File watcher error: {}", e);
            }
            Err(_) => {
                // Channel closed, exit
                info!("Config watcher channel closed, stopping");
                return;
            }
        }
    }
}

/// Keep only paths with a supported config extension.
fn classify_paths(paths: impl IntoIterator<Item = PathBuf>) -> Option<ReloadTrigger> {
    let mut changed: Vec<PathBuf> = paths
        .into_iter()
        .filter(|path| SourceFormat::from_path(path).is_some())
        .collect();
    changed.sort();
    changed.dedup();
    (!changed.is_empty()).then_some(ReloadTrigger::FilesChanged(changed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Overrides, Resolver, ResolverSettings};
    use crate::error::ErrorKind;
    use serde_json::json;
    use tempfile::TempDir;

    fn service_for(dir: &Path) -> Arc<ConfigService> {
        let resolver = Resolver::new(ResolverSettings::with_dir(dir), Overrides::new());
        ConfigService::new(resolver).unwrap()
    }

    #[test]
    fn test_classify_config_files() {
        let trigger = classify_paths(vec![
            PathBuf::from("config/default.toml"),
            PathBuf::from("config/default.toml"),
            PathBuf::from("config/conf.d/db.json"),
        ]);
        assert_eq!(
            trigger,
            Some(ReloadTrigger::FilesChanged(vec![
                PathBuf::from("config/conf.d/db.json"),
                PathBuf::from("config/default.toml"),
            ]))
        );
    }

    #[test]
    fn test_classify_ignores_unrelated_files() {
        let trigger = classify_paths(vec![
            PathBuf::from("config/.default.toml.swp"),
            PathBuf::from("config/README.md"),
        ]);
        assert!(trigger.is_none());
    }

    #[test]
    fn test_request_fails_after_worker_dropped() {
        let (queue, worker) = reload_queue();
        assert!(queue.request(ReloadTrigger::Manual));
        drop(worker);
        assert!(!queue.request(ReloadTrigger::Manual));
    }

    #[tokio::test]
    async fn test_worker_coalesces_pending_requests() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("default.toml"), "a = 1\n").unwrap();
        let service = service_for(temp.path());

        let (queue, worker) = reload_queue();
        queue.request(ReloadTrigger::Signal);
        queue.request(ReloadTrigger::Signal);
        queue.request(ReloadTrigger::Manual);
        drop(queue);

        worker.run(Arc::clone(&service)).await.unwrap();
        assert_eq!(service.snapshot().generation, 1);
    }

    #[tokio::test]
    async fn test_worker_stops_on_failed_reload() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("default.toml");
        std::fs::write(&file, "a = 1\n").unwrap();
        let service = service_for(temp.path());

        std::fs::write(&file, "a = [\n").unwrap();
        let (queue, worker) = reload_queue();
        queue.request(ReloadTrigger::Signal);

        let err = worker.run(Arc::clone(&service)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Parse);
        // Nothing was published
        assert_eq!(*service.tree(), json!({"a": 1}));
        drop(queue);
    }

    #[test]
    fn test_run_pending_without_requests() {
        let temp = TempDir::new().unwrap();
        let service = service_for(temp.path());
        let (queue, mut worker) = reload_queue();

        assert_eq!(worker.run_pending(&service).unwrap(), 0);
        queue.request(ReloadTrigger::Manual);
        queue.request(ReloadTrigger::Manual);
        assert_eq!(worker.run_pending(&service).unwrap(), 1);
        assert_eq!(worker.run_pending(&service).unwrap(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sighup_is_deferred_to_worker() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("default.toml"), "a = 1\n").unwrap();
        let service = service_for(temp.path());

        let (queue, mut worker) = reload_queue();
        let _listener = spawn_signal_listener(queue).unwrap();

        std::process::Command::new("kill")
            .args(["-HUP", &std::process::id().to_string()])
            .status()
            .unwrap();

        // The handler only enqueues; nothing is reloaded until the worker runs
        let mut reloads = 0;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            reloads = worker.run_pending(&service).unwrap();
            if reloads > 0 {
                break;
            }
        }
        assert_eq!(reloads, 1);
        assert_eq!(service.snapshot().generation, 1);
    }
}
