//! Observable value cells.
//!
//! # Responsibilities
//! - Hold a value and publish replacement snapshots atomically
//! - Notify registered observers synchronously on every publish
//! - Hand out explicit unsubscribe handles
//!
//! # Design Decisions
//! - Snapshots are `Arc`-shared so readers never block writers
//! - Observer callbacks run after the swap, outside any internal lock,
//!   so an observer may read or re-subscribe without deadlocking
//! - Dropping a [`Subscription`] without calling `unsubscribe` keeps the
//!   observer registered; cleanup is an explicit act

use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;
type ObserverList<T> = Mutex<Vec<(u64, Observer<T>)>>;

/// A value cell that notifies observers when it changes.
///
/// This is the reactivity primitive underlying the router's published
/// route state and the query engine's status fields. It deliberately does
/// not depend on any UI framework; a rendering layer subscribes with a
/// plain callback.
pub struct Signal<T> {
    value: ArcSwap<T>,
    observers: Arc<ObserverList<T>>,
    next_id: AtomicU64,
}

impl<T: Send + Sync + 'static> Signal<T> {
    /// Create a signal holding `initial`.
    pub fn new(initial: T) -> Self {
        Self {
            value: ArcSwap::from_pointee(initial),
            observers: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Snapshot of the current value.
    pub fn get(&self) -> Arc<T> {
        self.value.load_full()
    }

    /// Replace the value and notify all observers.
    pub fn set(&self, value: T) {
        let value = Arc::new(value);
        self.value.store(value.clone());
        self.notify(&value);
    }

    /// Replace the value with one computed from the current snapshot.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let current = self.value.load_full();
        self.set(f(&current));
    }

    /// Register an observer. Returns a handle that removes it again.
    pub fn subscribe(&self, observer: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers
            .lock()
            .expect("signal observer list mutex poisoned")
            .push((id, Arc::new(observer)));

        let registry: Weak<ObserverList<T>> = Arc::downgrade(&self.observers);
        Subscription::new(move || {
            if let Some(list) = registry.upgrade() {
                list.lock()
                    .expect("signal observer list mutex poisoned")
                    .retain(|(entry_id, _)| *entry_id != id);
            }
        })
    }

    fn notify(&self, value: &T) {
        // Clone the callbacks out so observers may touch this signal.
        let observers: Vec<Observer<T>> = self
            .observers
            .lock()
            .expect("signal observer list mutex poisoned")
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();
        for observer in observers {
            observer(value);
        }
    }
}

impl<T: Send + Sync + 'static + Default> Default for Signal<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Handle returned by subscription-style registrations across the crate.
///
/// Unregistration is explicit; the handle does nothing when dropped.
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub(crate) fn new(remove: impl FnOnce() + Send + 'static) -> Self {
        Self {
            remove: Some(Box::new(remove)),
        }
    }

    /// Remove the registered callback.
    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}
