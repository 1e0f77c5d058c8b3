//! Reactive cached fetches.
//!
//! # Responsibilities
//! - Bind a call site to one (possibly changing) cache key
//! - Serve fresh cached data without touching the network
//! - Drive the pending → success/error state machine, indefinitely
//! - React to cache invalidation and to updates written by other
//!   subscribers of the same key
//!
//! # Design Decisions
//! - Construction is async and performs the initial fetch when enabled
//! - The host reactivity seams are explicit methods: `sync()` when the
//!   key/params/enabled inputs may have changed, `handle_focus()` when
//!   the window regains focus; `refetch_interval` is a background task
//! - A manual `refetch` suppresses the store's own invalidation
//!   notification so it cannot double-fetch itself
//! - Superseding fetches are not cancelled; the last completion wins

use super::cache::{CacheEvent, CacheStore, CacheSubscription, CachedValue, FetchError, NotifyFn};
use super::key::QueryKey;
use crate::signal::{Signal, Subscription};
use crate::BoxError;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Lifecycle of a fetch-backed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Pending,
    Success,
    Error,
}

/// Observable snapshot of a query.
#[derive(Debug, Clone)]
pub struct QueryState<T> {
    pub data: Option<T>,
    pub error: Option<FetchError>,
    pub status: QueryStatus,
}

impl<T> QueryState<T> {
    fn initial() -> Self {
        Self {
            data: None,
            error: None,
            status: QueryStatus::Pending,
        }
    }

    /// Pending with nothing to show yet.
    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Pending && self.data.is_none()
    }

    /// Pending, possibly with previous data still held.
    pub fn is_fetching(&self) -> bool {
        self.status == QueryStatus::Pending
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }
}

type FetchFn<T, P> = Arc<dyn Fn(P) -> BoxFuture<'static, Result<T, BoxError>> + Send + Sync>;
type ParamsFn<P> = Arc<dyn Fn() -> P + Send + Sync>;

enum KeySource<P> {
    Fixed(QueryKey),
    Derived(Arc<dyn Fn(&P) -> QueryKey + Send + Sync>),
}

enum EnabledSource {
    Fixed(bool),
    Derived(Arc<dyn Fn() -> bool + Send + Sync>),
}

/// Configuration for a [`Query`].
pub struct QueryOptions<T, P = ()> {
    key: KeySource<P>,
    fetch: FetchFn<T, P>,
    params: Option<ParamsFn<P>>,
    stale_time: Duration,
    enabled: EnabledSource,
    refetch_on_focus: bool,
    refetch_interval: Option<Duration>,
    on_success: Option<Arc<dyn Fn(&T) + Send + Sync>>,
    on_error: Option<Arc<dyn Fn(&FetchError) + Send + Sync>>,
}

impl<T, P> QueryOptions<T, P> {
    /// A query under a fixed key.
    pub fn new<F, Fut>(key: QueryKey, fetch: F) -> Self
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        Self {
            key: KeySource::Fixed(key),
            fetch: Arc::new(move |params| fetch(params).boxed()),
            params: None,
            stale_time: Duration::ZERO,
            enabled: EnabledSource::Fixed(true),
            refetch_on_focus: true,
            refetch_interval: None,
            on_success: None,
            on_error: None,
        }
    }

    /// A query whose key is derived from the current parameters.
    pub fn keyed<K, F, Fut>(key: K, fetch: F) -> Self
    where
        K: Fn(&P) -> QueryKey + Send + Sync + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        let mut options = Self::new(QueryKey::default(), fetch);
        options.key = KeySource::Derived(Arc::new(key));
        options
    }

    /// Supplier of the parameter snapshot passed to the fetch function.
    pub fn params(mut self, params: impl Fn() -> P + Send + Sync + 'static) -> Self {
        self.params = Some(Arc::new(params));
        self
    }

    /// How long cached data stays fresh. Default: always stale.
    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = EnabledSource::Fixed(enabled);
        self
    }

    /// Enable the query only while the predicate holds.
    pub fn enabled_when(mut self, enabled: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.enabled = EnabledSource::Derived(Arc::new(enabled));
        self
    }

    /// Whether `handle_focus` refetches stale data. Default: true.
    pub fn refetch_on_focus(mut self, refetch: bool) -> Self {
        self.refetch_on_focus = refetch;
        self
    }

    /// Refetch on a fixed interval while the query is alive.
    pub fn refetch_interval(mut self, every: Duration) -> Self {
        self.refetch_interval = Some(every);
        self
    }

    pub fn on_success(mut self, callback: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl Fn(&FetchError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }
}

struct QueryInner<T, P> {
    cache: Arc<CacheStore>,
    options: QueryOptions<T, P>,
    state: Signal<QueryState<T>>,
    current_key: Mutex<QueryKey>,
    subscription: Mutex<Option<CacheSubscription>>,
    cache_callback: NotifyFn,
    manual_refetch: AtomicBool,
    fetched: AtomicBool,
    interval_task: Mutex<Option<JoinHandle<()>>>,
}

/// A reactive, cache-backed fetch bound to one call site.
pub struct Query<T, P = ()> {
    inner: Arc<QueryInner<T, P>>,
}

impl<T, P> Query<T, P>
where
    T: Clone + Send + Sync + 'static,
    P: Default + Send + 'static,
{
    /// Create the query, subscribe it to `cache`, and run the initial
    /// fetch when enabled.
    pub async fn new(cache: Arc<CacheStore>, options: QueryOptions<T, P>) -> Self {
        let initial_key = compute_key(&options);

        let inner = Arc::new_cyclic(|weak: &Weak<QueryInner<T, P>>| {
            let weak = weak.clone();
            let cache_callback: NotifyFn = Arc::new(move |event| {
                let Some(inner) = weak.upgrade() else { return };
                match event {
                    CacheEvent::Updated => inner.adopt_cached(),
                    CacheEvent::Invalidated => {
                        if !inner.manual_refetch.load(Ordering::SeqCst) {
                            QueryInner::spawn_fetch(inner);
                        }
                    }
                }
            });
            QueryInner {
                cache,
                options,
                state: Signal::new(QueryState::initial()),
                current_key: Mutex::new(initial_key.clone()),
                subscription: Mutex::new(None),
                cache_callback,
                manual_refetch: AtomicBool::new(false),
                fetched: AtomicBool::new(false),
                interval_task: Mutex::new(None),
            }
        });

        let subscription = inner
            .cache
            .subscribe_raw(initial_key.canonical(), inner.cache_callback.clone());
        *inner.lock_subscription() = Some(subscription);

        if let Some(every) = inner.options.refetch_interval {
            let weak = Arc::downgrade(&inner);
            let handle = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(every);
                // The first tick completes immediately; skip it so the
                // interval starts counting after the initial fetch.
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    let Some(inner) = weak.upgrade() else { break };
                    if inner.is_enabled() {
                        inner.fetch().await;
                    }
                }
            });
            *inner
                .interval_task
                .lock()
                .expect("query interval mutex poisoned") = Some(handle);
        }

        if inner.is_enabled() {
            inner.clone().fetch().await;
        }

        Self { inner }
    }

    /// Snapshot of the observable state.
    pub fn state(&self) -> QueryState<T> {
        (*self.inner.state.get()).clone()
    }

    pub fn data(&self) -> Option<T> {
        self.inner.state.get().data.clone()
    }

    pub fn error(&self) -> Option<FetchError> {
        self.inner.state.get().error.clone()
    }

    pub fn status(&self) -> QueryStatus {
        self.inner.state.get().status
    }

    /// The key this query is currently bound to.
    pub fn key(&self) -> QueryKey {
        self.inner.lock_key().clone()
    }

    /// Observe every state change.
    pub fn observe(
        &self,
        observer: impl Fn(&QueryState<T>) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.state.subscribe(observer)
    }

    /// Force-invalidate the bound key and fetch again.
    ///
    /// The store's invalidation notification for this instance is
    /// suppressed for the duration so the manual call cannot race a
    /// duplicate of itself.
    pub async fn refetch(&self) {
        self.inner.manual_refetch.store(true, Ordering::SeqCst);
        let key = self.inner.lock_key().clone();
        self.inner.cache.invalidate(&key);
        self.inner.clone().fetch().await;
        self.inner.manual_refetch.store(false, Ordering::SeqCst);
    }

    /// Invalidate the bound key without fetching from this instance.
    pub fn invalidate(&self) {
        let key = self.inner.lock_key().clone();
        self.inner.cache.invalidate(&key);
    }

    /// Re-evaluate the key and enabled inputs.
    ///
    /// Call whenever the values feeding the key/params/enabled closures
    /// may have changed. A key change (by serialized identity) moves the
    /// cache subscription and, when enabled, fetches under the new key;
    /// an enabled transition to true with no data fetches.
    pub async fn sync(&self) {
        let new_key = compute_key(&self.inner.options);
        let changed = {
            let mut current = self.inner.lock_key();
            if new_key.canonical() != current.canonical() {
                *current = new_key.clone();
                true
            } else {
                false
            }
        };

        if changed {
            let subscription = self
                .inner
                .cache
                .subscribe_raw(new_key.canonical(), self.inner.cache_callback.clone());
            // Replacing drops the old subscription, which unsubscribes.
            *self.inner.lock_subscription() = Some(subscription);
            if self.inner.is_enabled() {
                self.inner.clone().fetch().await;
            }
            return;
        }

        // Enabled flipping on for a query that has never fetched.
        if self.inner.is_enabled() && !self.inner.fetched.load(Ordering::SeqCst) {
            self.inner.clone().fetch().await;
        }
    }

    /// Window-focus seam: refetch when enabled, configured for focus
    /// refetch, and the bound entry has gone stale.
    pub async fn handle_focus(&self) {
        if !self.inner.options.refetch_on_focus || !self.inner.is_enabled() {
            return;
        }
        let key = self.inner.lock_key().clone();
        if self.inner.cache.is_stale(&key, self.inner.options.stale_time) {
            self.inner.clone().fetch().await;
        }
    }
}

impl<T, P> Drop for Query<T, P> {
    fn drop(&mut self) {
        if let Some(handle) = self
            .inner
            .interval_task
            .lock()
            .expect("query interval mutex poisoned")
            .take()
        {
            handle.abort();
        }
    }
}

impl<T, P> QueryInner<T, P>
where
    T: Clone + Send + Sync + 'static,
    P: Default + Send + 'static,
{
    fn is_enabled(&self) -> bool {
        match &self.options.enabled {
            EnabledSource::Fixed(enabled) => *enabled,
            EnabledSource::Derived(predicate) => predicate(),
        }
    }

    fn compute_params(&self) -> P {
        match &self.options.params {
            Some(params) => params(),
            None => P::default(),
        }
    }

    /// Pick up data another subscriber wrote for our key.
    fn adopt_cached(&self) {
        let key = self.lock_key().clone();
        if let Some(data) = self.cache.get::<T>(&key) {
            self.set_success(data);
        }
    }

    fn spawn_fetch(inner: Arc<Self>) {
        tokio::spawn(async move {
            inner.fetch().await;
        });
    }

    async fn fetch(self: Arc<Self>) {
        if !self.is_enabled() {
            return;
        }
        self.fetched.store(true, Ordering::SeqCst);

        let key = self.lock_key().clone();
        let serialized = key.canonical();

        // Fresh cache hit: adopt without touching the network.
        if let Some(value) = self.cache.fresh_value(&serialized, self.options.stale_time) {
            if let Some(data) = value.downcast_ref::<T>() {
                metrics::counter!("query_cache_hits_total").increment(1);
                tracing::trace!(key = %serialized, "serving query from cache");
                self.set_success(data.clone());
                return;
            }
        }
        metrics::counter!("query_cache_misses_total").increment(1);

        // Keep any previous data while the fetch is in flight.
        self.state.update(|state| QueryState {
            data: state.data.clone(),
            error: state.error.clone(),
            status: QueryStatus::Pending,
        });

        let (future, initiated) = {
            let cache = self.cache.clone();
            let fetch = self.options.fetch.clone();
            let params = self.compute_params();
            let skip = self.lock_subscription().as_ref().map(|sub| sub.id());
            let write_key = serialized.clone();
            self.cache.join_fetch(&serialized, move || {
                async move {
                    match fetch(params).await {
                        Ok(data) => {
                            let value: CachedValue = Arc::new(data);
                            cache.set_raw(&write_key, value.clone(), skip);
                            Ok(value)
                        }
                        Err(error) => Err(FetchError::from(error)),
                    }
                }
                .boxed()
            })
        };

        let outcome = future.await;
        if initiated {
            self.cache.finish_fetch(&serialized);
        }

        match outcome {
            Ok(value) => match value.downcast_ref::<T>() {
                Some(data) => {
                    let data = data.clone();
                    self.set_success(data.clone());
                    if let Some(callback) = &self.options.on_success {
                        callback(&data);
                    }
                }
                None => {
                    tracing::warn!(key = %serialized, "cached value type mismatch for query key");
                }
            },
            Err(error) => {
                tracing::debug!(key = %serialized, %error, "query fetch failed");
                self.state.set(QueryState {
                    data: None,
                    error: Some(error.clone()),
                    status: QueryStatus::Error,
                });
                if let Some(callback) = &self.options.on_error {
                    callback(&error);
                }
            }
        }
    }

    fn set_success(&self, data: T) {
        self.state.set(QueryState {
            data: Some(data),
            error: None,
            status: QueryStatus::Success,
        });
    }

    fn lock_key(&self) -> std::sync::MutexGuard<'_, QueryKey> {
        self.current_key.lock().expect("query key mutex poisoned")
    }

    fn lock_subscription(&self) -> std::sync::MutexGuard<'_, Option<CacheSubscription>> {
        self.subscription
            .lock()
            .expect("query subscription mutex poisoned")
    }
}

fn compute_key<T, P: Default>(options: &QueryOptions<T, P>) -> QueryKey {
    match &options.key {
        KeySource::Fixed(key) => key.clone(),
        KeySource::Derived(derive) => {
            let params = match &options.params {
                Some(params) => params(),
                None => P::default(),
            };
            derive(&params)
        }
    }
}
