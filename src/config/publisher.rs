//! The published configuration and its reload subscribers.
//!
//! [`ConfigService`] owns the current [`Snapshot`] behind an `ArcSwap`, so
//! readers always see a fully built tree: the one before a reload or the one
//! after it, never a partial merge. Callers should keep the service handle
//! and read through it after every reload instead of caching sub-values.

use super::resolver::Resolver;
use super::tree::{ConfigTree, empty_tree, get_path};
use crate::error::Result;
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// One published configuration.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub tree: Arc<ConfigTree>,
    /// 0 for the initial resolution, incremented by every reload
    pub generation: u64,
    pub loaded_at: DateTime<Utc>,
    /// Files that contributed, in merge order
    pub sources: Vec<PathBuf>,
}

impl Snapshot {
    fn new(tree: ConfigTree, generation: u64, sources: Vec<PathBuf>) -> Self {
        Self {
            tree: Arc::new(tree),
            generation,
            loaded_at: Utc::now(),
            sources,
        }
    }

    /// Look up a dotted path in this snapshot's tree.
    pub fn get(&self, path: &str) -> Option<&ConfigTree> {
        get_path(&self.tree, path)
    }
}

/// Handle returned by [`ConfigService::on_reload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type ReloadCallback = Arc<dyn Fn(&Snapshot) + Send + Sync>;

/// Owns the published configuration and re-resolves it on demand.
pub struct ConfigService {
    resolver: Resolver,
    current: ArcSwap<Snapshot>,
    subscribers: Mutex<Vec<(SubscriptionId, ReloadCallback)>>,
    next_subscription: AtomicU64,
    reloads: AtomicU64,
}

impl ConfigService {
    /// Resolve the initial configuration.
    ///
    /// This establishes the starting state and notifies nobody. When the
    /// resolver is disabled nothing is loaded and an empty tree is published.
    pub fn new(resolver: Resolver) -> Result<Arc<Self>> {
        let initial = if resolver.settings().disabled {
            info!("Configuration disabled; publishing an empty tree");
            Snapshot::new(empty_tree(), 0, Vec::new())
        } else {
            let resolution = resolver.resolve()?;
            Snapshot::new(resolution.tree, 0, resolution.sources)
        };

        Ok(Arc::new(Self {
            resolver,
            current: ArcSwap::from_pointee(initial),
            subscribers: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(0),
            reloads: AtomicU64::new(0),
        }))
    }

    /// The resolver this service re-runs on reload.
    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn is_enabled(&self) -> bool {
        !self.resolver.settings().disabled
    }

    /// The snapshot currently in effect.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// The tree currently in effect.
    pub fn tree(&self) -> Arc<ConfigTree> {
        Arc::clone(&self.current.load().tree)
    }

    /// Look up a dotted path in the current tree.
    pub fn get(&self, path: &str) -> Option<ConfigTree> {
        self.current.load().get(path).cloned()
    }

    /// Register a callback run after every successful reload.
    pub fn on_reload<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Snapshot) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.push((id, Arc::new(callback)));
        debug!("Reload subscriber {:?} registered", id);
        id
    }

    /// Remove a callback. Returns `true` if it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock().unwrap();
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }

    /// Re-run the whole pipeline, publish the result, then notify subscribers.
    ///
    /// On error nothing is published; the caller is expected to treat the
    /// error as fatal rather than keep serving the previous tree. A disabled
    /// service does nothing.
    pub fn reload(&self) -> Result<()> {
        if !self.is_enabled() {
            debug!("Configuration disabled; reload skipped");
            return Ok(());
        }

        let resolution = self.resolver.resolve()?;
        let generation = self.reloads.fetch_add(1, Ordering::Relaxed) + 1;
        let snapshot = Arc::new(Snapshot::new(
            resolution.tree,
            generation,
            resolution.sources,
        ));
        self.current.store(Arc::clone(&snapshot));
        info!("Configuration reloaded (generation {})", generation);

        // Callbacks run outside the lock so they may subscribe or unsubscribe
        let callbacks: Vec<ReloadCallback> = self
            .subscribers
            .lock()
            .unwrap()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in callbacks {
            callback(&snapshot);
        }
        Ok(())
    }
}

impl std::fmt::Debug for ConfigService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigService")
            .field("resolver", &self.resolver)
            .field("generation", &self.current.load().generation)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
