//! Keyed cache of fetched values.
//!
//! # Responsibilities
//! - Store fetched data per serialized [`QueryKey`] with a timestamp
//! - Track per-entry subscriber sets and notify them synchronously
//! - Invalidate by exact key or structural key prefix
//! - Collapse concurrent fetches for one key onto a single future
//!
//! # Design Decisions
//! - Not a singleton: an explicit `Arc<CacheStore>` is passed to every
//!   query, so tests and independent cache scopes stay isolated
//! - Entries are never evicted short of `clear()`; an entry with zero
//!   subscribers is retained. Growth is bounded by the set of distinct
//!   keys a process ever queries; `clear()` is the escape hatch
//! - Subscribers receive a [`CacheEvent`]: `Updated` when another writer
//!   stored fresh data (adopt it), `Invalidated` when staleness was
//!   forced (refetch). A writer's own subscription is skipped on `set`
//! - Callback lists are cloned out before invocation; no internal lock
//!   is held while subscriber code runs

use super::key::QueryKey;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

/// Shared, cloneable fetch failure.
pub type FetchError = Arc<dyn std::error::Error + Send + Sync>;

pub(crate) type CachedValue = Arc<dyn Any + Send + Sync>;
pub(crate) type FetchOutcome = Result<CachedValue, FetchError>;
pub(crate) type SharedFetch = Shared<BoxFuture<'static, FetchOutcome>>;

/// Why a subscriber is being notified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
    /// Fresh data was stored for the key by another writer.
    Updated,
    /// The entry's timestamp was forced to stale.
    Invalidated,
}

pub(crate) type NotifyFn = Arc<dyn Fn(CacheEvent) + Send + Sync>;
type SubscriberMap = Mutex<HashMap<u64, NotifyFn>>;

struct CacheEntry {
    data: Option<CachedValue>,
    /// `None` is the epoch-zero marker: always stale.
    timestamp: Option<Instant>,
    subscribers: Arc<SubscriberMap>,
}

impl CacheEntry {
    fn empty() -> Self {
        Self {
            data: None,
            timestamp: None,
            subscribers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn subscribers_except(&self, skip: Option<u64>) -> Vec<NotifyFn> {
        self.subscribers
            .lock()
            .expect("cache subscriber mutex poisoned")
            .iter()
            .filter(|(id, _)| Some(**id) != skip)
            .map(|(_, callback)| callback.clone())
            .collect()
    }
}

/// Process-wide keyed store of fetched values.
pub struct CacheStore {
    entries: DashMap<String, CacheEntry>,
    /// At most one concurrent fetch per serialized key; concurrent
    /// requesters share the initiator's future. This closes the race
    /// where two call sites created in the same turn both observe an
    /// empty entry and both hit the network.
    inflight: Mutex<HashMap<String, SharedFetch>>,
    next_subscriber_id: AtomicU64,
}

impl CacheStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            inflight: Mutex::new(HashMap::new()),
            next_subscriber_id: AtomicU64::new(0),
        }
    }

    /// Cached data for `key`, if present and of type `T`.
    pub fn get<T: Clone + Send + Sync + 'static>(&self, key: &QueryKey) -> Option<T> {
        let entry = self.entries.get(&key.canonical())?;
        let data = entry.data.clone()?;
        drop(entry);
        data.downcast_ref::<T>().cloned()
    }

    /// Store `data` for `key`, refreshing the entry timestamp and
    /// preserving its subscriber set. All subscribers are notified.
    pub fn set<T: Send + Sync + 'static>(&self, key: &QueryKey, data: T) {
        self.set_raw(&key.canonical(), Arc::new(data), None);
    }

    pub(crate) fn set_raw(
        &self,
        serialized: &str,
        data: CachedValue,
        skip_subscriber: Option<u64>,
    ) {
        let notify: Vec<NotifyFn> = {
            let mut entry = self
                .entries
                .entry(serialized.to_string())
                .or_insert_with(CacheEntry::empty);
            entry.data = Some(data);
            entry.timestamp = Some(Instant::now());
            entry.subscribers_except(skip_subscriber)
        };
        metrics::gauge!("query_cache_entries").set(self.entries.len() as f64);

        for callback in notify {
            callback(CacheEvent::Updated);
        }
    }

    /// Register interest in `key`, lazily creating an empty entry.
    pub fn subscribe(
        &self,
        key: &QueryKey,
        callback: impl Fn(CacheEvent) + Send + Sync + 'static,
    ) -> CacheSubscription {
        self.subscribe_raw(key.canonical(), Arc::new(callback))
    }

    pub(crate) fn subscribe_raw(&self, serialized: String, callback: NotifyFn) -> CacheSubscription {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let subscribers = self
            .entries
            .entry(serialized)
            .or_insert_with(CacheEntry::empty)
            .subscribers
            .clone();
        subscribers
            .lock()
            .expect("cache subscriber mutex poisoned")
            .insert(id, callback);
        CacheSubscription {
            subscribers: Arc::downgrade(&subscribers),
            id,
        }
    }

    /// Force the entry stale and notify all its subscribers.
    pub fn invalidate(&self, key: &QueryKey) {
        self.invalidate_serialized(&key.canonical());
    }

    fn invalidate_serialized(&self, serialized: &str) {
        let notify: Vec<NotifyFn> = match self.entries.get_mut(serialized) {
            Some(mut entry) => {
                entry.timestamp = None;
                entry.subscribers_except(None)
            }
            None => return,
        };
        metrics::counter!("query_cache_invalidations_total").increment(1);

        for callback in notify {
            callback(CacheEvent::Invalidated);
        }
    }

    /// Force stale every entry whose key has `prefix` as a structural
    /// prefix, notifying their subscribers. Returns how many entries
    /// matched.
    pub fn invalidate_matching(&self, prefix: &QueryKey) -> usize {
        let pattern = prefix.prefix_pattern();
        let mut matched = 0usize;
        let mut notify = Vec::new();
        for mut entry in self.entries.iter_mut() {
            if entry.key().starts_with(&pattern) {
                entry.timestamp = None;
                matched += 1;
                notify.extend(entry.subscribers_except(None));
            }
        }
        metrics::counter!("query_cache_invalidations_total").increment(matched as u64);

        for callback in notify {
            callback(CacheEvent::Invalidated);
        }
        matched
    }

    /// Application-facing prefix invalidation entry point.
    pub fn invalidate_queries(&self, prefix: &QueryKey) -> usize {
        self.invalidate_matching(prefix)
    }

    /// Whether `key` has no usable entry younger than `stale_time`.
    pub fn is_stale(&self, key: &QueryKey, stale_time: Duration) -> bool {
        match self.entries.get(&key.canonical()) {
            Some(entry) => match entry.timestamp {
                Some(timestamp) => timestamp.elapsed() > stale_time,
                None => true,
            },
            None => true,
        }
    }

    /// Cached data for `serialized` only when present and not stale.
    pub(crate) fn fresh_value(
        &self,
        serialized: &str,
        stale_time: Duration,
    ) -> Option<CachedValue> {
        let entry = self.entries.get(serialized)?;
        let data = entry.data.clone()?;
        let timestamp = entry.timestamp?;
        if timestamp.elapsed() > stale_time {
            return None;
        }
        Some(data)
    }

    /// Drop every entry. Existing subscriptions are silently orphaned;
    /// no final notification is delivered.
    pub fn clear(&self) {
        self.entries.clear();
        metrics::gauge!("query_cache_entries").set(0.0);
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Join or start the single in-flight fetch for `serialized`.
    ///
    /// Returns the shared future and whether this caller initiated it;
    /// the initiator must call [`CacheStore::finish_fetch`] once the
    /// future completes.
    pub(crate) fn join_fetch(
        &self,
        serialized: &str,
        create: impl FnOnce() -> BoxFuture<'static, FetchOutcome>,
    ) -> (SharedFetch, bool) {
        let mut inflight = self
            .inflight
            .lock()
            .expect("in-flight fetch mutex poisoned");
        if let Some(existing) = inflight.get(serialized) {
            metrics::counter!("query_fetch_dedup_total").increment(1);
            return (existing.clone(), false);
        }
        let shared = create().shared();
        inflight.insert(serialized.to_string(), shared.clone());
        (shared, true)
    }

    pub(crate) fn finish_fetch(&self, serialized: &str) {
        self.inflight
            .lock()
            .expect("in-flight fetch mutex poisoned")
            .remove(serialized);
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Registered interest in one cache entry.
///
/// Unsubscribes when dropped; a subscription orphaned by `clear()`
/// degrades to a no-op.
pub struct CacheSubscription {
    subscribers: Weak<SubscriberMap>,
    id: u64,
}

impl CacheSubscription {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub fn unsubscribe(self) {}
}

impl Drop for CacheSubscription {
    fn drop(&mut self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            subscribers
                .lock()
                .expect("cache subscriber mutex poisoned")
                .remove(&self.id);
        }
    }
}

impl std::fmt::Debug for CacheSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheSubscription")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
