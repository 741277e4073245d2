//! 🗂️ Watcher Registry - one entry per subscription key
//!
//! Starts watcher tasks, remembers their cancellation handles and stops
//! them on unsubscribe or shutdown. What happens when the same key is
//! started twice is decided by `DuplicatePolicy`; the default spawns a
//! second, fully independent watcher (own SeenSet, own RPC traffic).

use crate::ledger::Ledger;
use crate::notifier::NotificationSink;
use crate::seen_set::SeenSet;
use crate::types::SubscriptionKey;
use crate::watcher::{PollSchedule, Watcher};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{info, warn};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Behaviour of `start` for a key that already has a running watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Start another independent watcher next to the existing ones
    #[default]
    Spawn,
    /// Refuse and keep the existing watcher
    Reject,
    /// Cancel existing watchers for the key, then start a fresh one
    Replace,
}

impl FromStr for DuplicatePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "spawn" => Ok(Self::Spawn),
            "reject" => Ok(Self::Reject),
            "replace" => Ok(Self::Replace),
            other => anyhow::bail!("Unknown duplicate watcher policy: {}", other),
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("already watching {0}")]
    AlreadyWatching(SubscriptionKey),
    #[error("registry is shut down")]
    ShutDown,
}

/// Settings applied to every watcher the registry starts
#[derive(Debug, Clone, Copy, Default)]
pub struct WatcherSettings {
    pub schedule: PollSchedule,
    /// 0 = unbounded
    pub seen_capacity: usize,
    pub duplicate_policy: DuplicatePolicy,
}

/// Cancellation control for one running watcher
#[derive(Debug, Clone)]
pub struct WatcherHandle {
    id: u64,
    key: SubscriptionKey,
    token: CancellationToken,
}

impl WatcherHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn key(&self) -> &SubscriptionKey {
        &self.key
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

struct RunningWatcher {
    handle: WatcherHandle,
    task: JoinHandle<()>,
}

pub struct WatcherRegistry {
    ledger: Arc<dyn Ledger>,
    default_sink: Arc<dyn NotificationSink>,
    settings: WatcherSettings,
    watchers: DashMap<SubscriptionKey, Vec<RunningWatcher>>,
    next_id: AtomicU64,
    /// Parent of every watcher token
    shutdown: CancellationToken,
}

impl WatcherRegistry {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        default_sink: Arc<dyn NotificationSink>,
        settings: WatcherSettings,
    ) -> Self {
        Self {
            ledger,
            default_sink,
            settings,
            watchers: DashMap::new(),
            next_id: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
        }
    }

    /// Start watching `key.address` for `key.subscriber` through the default sink
    pub fn start_watching(&self, key: SubscriptionKey) -> Result<WatcherHandle, RegistryError> {
        self.start(key, self.default_sink.clone())
    }

    /// Spawn a watcher task delivering to `sink`. Must be called inside a
    /// tokio runtime.
    pub fn start(
        &self,
        key: SubscriptionKey,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<WatcherHandle, RegistryError> {
        if self.shutdown.is_cancelled() {
            warn!("⚠️  Registry shut down, not watching {}", key);
            return Err(RegistryError::ShutDown);
        }

        match self.watchers.entry(key.clone()) {
            Entry::Occupied(mut entry) => match self.settings.duplicate_policy {
                DuplicatePolicy::Reject if !entry.get().is_empty() => {
                    warn!("⚠️  Already watching {}, ignoring new subscription", key);
                    Err(RegistryError::AlreadyWatching(key))
                }
                DuplicatePolicy::Replace => {
                    for old in entry.get().iter() {
                        old.handle.token.cancel();
                    }
                    info!("🔁 Replacing {} watcher(s) for {}", entry.get().len(), key);
                    let running = self.spawn_watcher(key, sink);
                    let handle = running.handle.clone();
                    *entry.get_mut() = vec![running];
                    Ok(handle)
                }
                _ => {
                    if !entry.get().is_empty() {
                        info!(
                            "➕ Starting another independent watcher for {} ({} already running)",
                            key,
                            entry.get().len()
                        );
                    }
                    let running = self.spawn_watcher(key, sink);
                    let handle = running.handle.clone();
                    entry.get_mut().push(running);
                    Ok(handle)
                }
            },
            Entry::Vacant(entry) => {
                let running = self.spawn_watcher(key, sink);
                let handle = running.handle.clone();
                entry.insert(vec![running]);
                Ok(handle)
            }
        }
    }

    fn spawn_watcher(&self, key: SubscriptionKey, sink: Arc<dyn NotificationSink>) -> RunningWatcher {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = self.shutdown.child_token();

        let watcher = Watcher::new(
            key.clone(),
            self.ledger.clone(),
            sink,
            SeenSet::from_capacity(self.settings.seen_capacity),
            self.settings.schedule,
        );
        let task = tokio::spawn(watcher.run(token.clone()));

        RunningWatcher {
            handle: WatcherHandle { id, key, token },
            task,
        }
    }

    /// Cancel one watcher. Returns false if the registry no longer tracked it.
    pub fn cancel(&self, handle: &WatcherHandle) -> bool {
        handle.token.cancel();

        let removed = match self.watchers.get_mut(&handle.key) {
            Some(mut running) => {
                let before = running.len();
                running.retain(|w| w.handle.id != handle.id);
                running.len() != before
            }
            None => false,
        };
        self.watchers.remove_if(&handle.key, |_, running| running.is_empty());
        removed
    }

    /// Cancel every watcher for `key`; returns how many were stopped
    pub fn stop_watching(&self, key: &SubscriptionKey) -> usize {
        let Some((_, running)) = self.watchers.remove(key) else {
            return 0;
        };
        for w in &running {
            w.handle.token.cancel();
        }
        info!("🛑 Unsubscribed {} ({} watcher(s))", key, running.len());
        running.len()
    }

    pub fn is_watching(&self, key: &SubscriptionKey) -> bool {
        self.watchers
            .get(key)
            .map(|running| !running.is_empty())
            .unwrap_or(false)
    }

    /// Number of running watchers across all keys
    pub fn active_count(&self) -> usize {
        self.watchers.iter().map(|entry| entry.value().len()).sum()
    }

    /// Cancel all watchers and wait for their tasks to finish
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let keys: Vec<SubscriptionKey> = self.watchers.iter().map(|e| e.key().clone()).collect();
        let mut tasks = Vec::new();
        for key in keys {
            if let Some((_, running)) = self.watchers.remove(&key) {
                tasks.extend(running.into_iter().map(|w| w.task));
            }
        }

        info!("🛑 Shutting down {} watcher(s)", tasks.len());
        for task in tasks {
            if let Err(e) = task.await {
                warn!("⚠️  Watcher task ended abnormally: {}", e);
            }
        }
    }
}
