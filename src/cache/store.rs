//! Resource cache store.
//!
//! The single owner of [`CacheEntry`] lifetimes. Everything else reads through
//! [`ResourceCacheStore::get`], writes through [`ResourceCacheStore::upsert`],
//! and observes through [`ResourceCacheStore::subscribe`].
//!
//! Entries without subscribers are "idle" and live in an LRU. The LRU is
//! bounded by `max_idle_entries`, and [`ResourceCacheStore::sweep`] drops idle
//! entries released longer than `keep_unused_for` ago. Loading entries are
//! never evicted. Eviction prunes the key from the [`TagIndex`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use lru::LruCache;
use metrics::counter;
use tokio::time::Instant;
use tracing::debug;

use super::config::CacheConfig;
use super::entry::{CacheEntry, EntryPatch, UpsertOutcome};
use super::keys::CacheKey;
use super::lock::mutex_lock;
use super::registry::TagIndex;

const SOURCE: &str = "cache::store";

pub(crate) const METRIC_CACHE_EVICTED: &str = "agromart_cache_evicted_total";
pub(crate) const METRIC_CACHE_STALE_COMPLETION: &str = "agromart_cache_stale_completion_total";

/// Callback invoked with the entry snapshot after every notifying upsert.
pub type Listener = Arc<dyn Fn(&CacheEntry) + Send + Sync>;

struct StoreState {
    entries: HashMap<CacheKey, CacheEntry>,
    listeners: HashMap<CacheKey, Vec<(u64, Listener)>>,
    idle: LruCache<CacheKey, ()>,
    /// Store-wide request generation; only ever grows, also across `clear`.
    generation: u64,
}

impl StoreState {
    fn insert_idle(&mut self, key: &CacheKey) {
        let mut entry = CacheEntry::new(key.clone(), self.generation);
        entry.released_at = Some(Instant::now());
        self.entries.insert(key.clone(), entry);
        self.idle.put(key.clone(), ());
    }

    fn listeners_for(&self, key: &CacheKey) -> Vec<Listener> {
        self.listeners
            .get(key)
            .map(|listeners| listeners.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default()
    }

    fn evict(&mut self, key: &CacheKey) {
        self.entries.remove(key);
        self.listeners.remove(key);
        self.idle.pop(key);
    }

    /// Evict least recently used, non-loading idle entries until the
    /// bound holds or only loading entries remain.
    fn enforce_idle_bound(&mut self, max_idle: usize) -> Vec<CacheKey> {
        let mut evicted = Vec::new();
        let mut loading = Vec::new();

        while self.idle.len() > max_idle {
            let Some((key, ())) = self.idle.pop_lru() else {
                break;
            };
            if self.entries.get(&key).is_some_and(CacheEntry::is_loading) {
                loading.push(key);
                continue;
            }
            self.evict(&key);
            evicted.push(key);
        }

        for key in loading {
            self.idle.put(key, ());
        }
        evicted
    }
}

pub struct ResourceCacheStore {
    state: Mutex<StoreState>,
    tags: Arc<TagIndex>,
    max_idle_entries: usize,
    keep_unused_for: Duration,
    next_listener: AtomicU64,
}

impl ResourceCacheStore {
    pub fn new(config: &CacheConfig, tags: Arc<TagIndex>) -> Self {
        Self {
            state: Mutex::new(StoreState {
                entries: HashMap::new(),
                listeners: HashMap::new(),
                idle: LruCache::unbounded(),
                generation: 0,
            }),
            tags,
            max_idle_entries: config.max_idle_entries_non_zero().get(),
            keep_unused_for: config.keep_unused_for(),
            next_listener: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        mutex_lock(&self.state, SOURCE, "get").entries.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.state, SOURCE, "len").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries currently without subscribers.
    pub fn idle_len(&self) -> usize {
        mutex_lock(&self.state, SOURCE, "idle_len").idle.len()
    }

    /// Merge `patch` into the entry for `key`.
    ///
    /// `Begin` creates a missing entry; completion and invalidation patches
    /// for a missing entry are dropped. Started and resolved entries register
    /// their provided tags with the tag index. Subscribers are notified after
    /// the store lock has been released.
    pub fn upsert(&self, key: &CacheKey, patch: EntryPatch) -> UpsertOutcome {
        let patch_name = patch.name();
        let registers_tags = matches!(
            patch,
            EntryPatch::Begin { .. } | EntryPatch::Fulfilled { .. }
        );
        let mut state = mutex_lock(&self.state, SOURCE, "upsert");

        if !state.entries.contains_key(key) {
            if !patch.creates_entry() {
                drop(state);
                debug!(key = %key, patch = patch_name, "Patch for absent cache entry dropped");
                return UpsertOutcome::Discarded;
            }
            state.insert_idle(key);
        }

        let StoreState {
            entries,
            generation,
            ..
        } = &mut *state;
        let Some(entry) = entries.get_mut(key) else {
            return UpsertOutcome::Discarded;
        };
        let outcome = entry.apply(patch, generation);
        let snapshot = outcome.notifies().then(|| entry.clone());
        if registers_tags && outcome.notifies() {
            self.tags.register(key.clone(), entry.tags().clone());
        }

        let listeners = match &snapshot {
            Some(_) => state.listeners_for(key),
            None => Vec::new(),
        };
        state.idle.promote(key);
        let evicted = state.enforce_idle_bound(self.max_idle_entries);
        self.forget(&evicted, "lru");
        drop(state);

        if matches!(outcome, UpsertOutcome::Discarded) {
            counter!(METRIC_CACHE_STALE_COMPLETION).increment(1);
            debug!(key = %key, patch = patch_name, "Superseded completion discarded");
        }

        if let Some(snapshot) = snapshot {
            for listener in listeners {
                listener(&snapshot);
            }
        }
        outcome
    }

    /// Register `listener` for every notifying upsert of `key`.
    ///
    /// Creates the entry if needed and takes it out of the idle pool. Dropping
    /// the returned [`Subscription`] unsubscribes.
    pub fn subscribe<F>(self: &Arc<Self>, key: &CacheKey, listener: F) -> Subscription
    where
        F: Fn(&CacheEntry) + Send + Sync + 'static,
    {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        let mut state = mutex_lock(&self.state, SOURCE, "subscribe");

        if !state.entries.contains_key(key) {
            let entry = CacheEntry::new(key.clone(), state.generation);
            state.entries.insert(key.clone(), entry);
        }
        state.idle.pop(key);
        if let Some(entry) = state.entries.get_mut(key) {
            entry.subscriber_count += 1;
            entry.released_at = None;
        }
        state
            .listeners
            .entry(key.clone())
            .or_default()
            .push((id, Arc::new(listener)));
        drop(state);

        Subscription {
            store: Arc::downgrade(self),
            key: key.clone(),
            id,
            active: true,
        }
    }

    fn unsubscribe(&self, key: &CacheKey, id: u64) {
        let mut state = mutex_lock(&self.state, SOURCE, "unsubscribe");

        let removed = match state.listeners.get_mut(key) {
            Some(listeners) => {
                let before = listeners.len();
                listeners.retain(|(listener_id, _)| *listener_id != id);
                before != listeners.len()
            }
            None => false,
        };
        if !removed {
            return;
        }

        let became_idle = match state.entries.get_mut(key) {
            Some(entry) => {
                entry.subscriber_count = entry.subscriber_count.saturating_sub(1);
                if entry.subscriber_count == 0 {
                    entry.released_at = Some(Instant::now());
                    true
                } else {
                    false
                }
            }
            None => false,
        };
        if !became_idle {
            return;
        }

        state.listeners.remove(key);
        state.idle.put(key.clone(), ());
        let evicted = state.enforce_idle_bound(self.max_idle_entries);
        self.forget(&evicted, "lru");
        drop(state);

        debug!(key = %key, "Cache entry released");
    }

    /// Evict idle entries released at least `keep_unused_for` ago.
    pub fn sweep(&self) -> Vec<CacheKey> {
        let now = Instant::now();
        let mut state = mutex_lock(&self.state, SOURCE, "sweep");

        let expired: Vec<CacheKey> = state
            .idle
            .iter()
            .map(|(key, ())| key)
            .filter(|key| {
                state.entries.get(*key).is_some_and(|entry| {
                    !entry.is_loading()
                        && entry
                            .released_at
                            .is_some_and(|at| now.duration_since(at) >= self.keep_unused_for)
                })
            })
            .cloned()
            .collect();
        for key in &expired {
            state.evict(key);
        }
        self.forget(&expired, "expired");
        drop(state);

        expired
    }

    /// Drop every entry and tag registration. Request generations keep
    /// counting, so requests still in flight cannot repopulate the store.
    pub fn clear(&self) {
        let mut state = mutex_lock(&self.state, SOURCE, "clear");
        state.entries.clear();
        state.listeners.clear();
        state.idle.clear();
        drop(state);
        self.tags.clear();
    }

    /// Prune evicted keys from the tag index. Runs under the store lock so a
    /// key re-created concurrently keeps its fresh registrations.
    fn forget(&self, evicted: &[CacheKey], reason: &'static str) {
        if evicted.is_empty() {
            return;
        }
        for key in evicted {
            self.tags.prune(key);
            debug!(key = %key, reason, "Cache entry evicted");
        }
        counter!(METRIC_CACHE_EVICTED, "reason" => reason).increment(evicted.len() as u64);
    }
}

/// Active registration on one cache key. Unsubscribes on drop.
pub struct Subscription {
    store: Weak<ResourceCacheStore>,
    key: CacheKey,
    id: u64,
    active: bool,
}

impl Subscription {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !std::mem::take(&mut self.active) {
            return;
        }
        if let Some(store) = self.store.upgrade() {
            store.unsubscribe(&self.key, self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}
