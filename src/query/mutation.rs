//! Imperative writes with lifecycle callbacks.
//!
//! # Responsibilities
//! - Run a side-effecting async operation on demand
//! - Expose pending/success/error state observably
//! - Fire `on_success`/`on_error` then `on_settled`, in that order
//!
//! # Design Decisions
//! - Mutations never touch the cache themselves; callers invalidate
//!   the affected keys from `on_success`
//! - `mutate` is fire-and-observe, `mutate_async` returns the result

use super::cache::FetchError;
use super::query::QueryStatus;
use crate::signal::{Signal, Subscription};
use crate::BoxError;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::future::Future;
use std::sync::Arc;

/// Observable snapshot of a mutation.
#[derive(Debug, Clone)]
pub struct MutationState<T> {
    pub data: Option<T>,
    pub error: Option<FetchError>,
    pub status: QueryStatus,
    pub pending: bool,
}

impl<T> MutationState<T> {
    fn idle() -> Self {
        Self {
            data: None,
            error: None,
            status: QueryStatus::Pending,
            pending: false,
        }
    }
}

type MutateFn<T, V> = Arc<dyn Fn(V) -> BoxFuture<'static, Result<T, BoxError>> + Send + Sync>;

/// Configuration for a [`Mutation`].
pub struct MutationOptions<T, V = ()> {
    mutate: MutateFn<T, V>,
    on_success: Option<Arc<dyn Fn(&T, &V) + Send + Sync>>,
    on_error: Option<Arc<dyn Fn(&FetchError, &V) + Send + Sync>>,
    on_settled: Option<Arc<dyn Fn(Option<&T>, Option<&FetchError>, &V) + Send + Sync>>,
}

impl<T, V> MutationOptions<T, V> {
    pub fn new<F, Fut>(mutate: F) -> Self
    where
        F: Fn(V) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        Self {
            mutate: Arc::new(move |variables| mutate(variables).boxed()),
            on_success: None,
            on_error: None,
            on_settled: None,
        }
    }

    pub fn on_success(mut self, callback: impl Fn(&T, &V) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl Fn(&FetchError, &V) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }

    /// Fires after `on_success` or `on_error`, on every outcome.
    pub fn on_settled(
        mut self,
        callback: impl Fn(Option<&T>, Option<&FetchError>, &V) + Send + Sync + 'static,
    ) -> Self {
        self.on_settled = Some(Arc::new(callback));
        self
    }
}

/// An on-demand async operation with observable state.
pub struct Mutation<T, V = ()> {
    options: MutationOptions<T, V>,
    state: Signal<MutationState<T>>,
}

impl<T, V> Mutation<T, V>
where
    T: Clone + Send + Sync + 'static,
    V: Clone + Send + 'static,
{
    pub fn new(options: MutationOptions<T, V>) -> Self {
        Self {
            options,
            state: Signal::new(MutationState::idle()),
        }
    }

    pub fn state(&self) -> MutationState<T> {
        (*self.state.get()).clone()
    }

    pub fn data(&self) -> Option<T> {
        self.state.get().data.clone()
    }

    pub fn error(&self) -> Option<FetchError> {
        self.state.get().error.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.state.get().pending
    }

    /// Observe every state change.
    pub fn observe(
        &self,
        observer: impl Fn(&MutationState<T>) + Send + Sync + 'static,
    ) -> Subscription {
        self.state.subscribe(observer)
    }

    /// Run the operation, discarding the result. Outcome is observable
    /// through the state and the lifecycle callbacks.
    pub async fn mutate(&self, variables: V) {
        let _ = self.mutate_async(variables).await;
    }

    /// Run the operation and return its result.
    pub async fn mutate_async(&self, variables: V) -> Result<T, FetchError> {
        self.state.set(MutationState {
            data: None,
            error: None,
            status: QueryStatus::Pending,
            pending: true,
        });

        match (self.options.mutate)(variables.clone()).await {
            Ok(data) => {
                self.state.set(MutationState {
                    data: Some(data.clone()),
                    error: None,
                    status: QueryStatus::Success,
                    pending: false,
                });
                if let Some(callback) = &self.options.on_success {
                    callback(&data, &variables);
                }
                if let Some(callback) = &self.options.on_settled {
                    callback(Some(&data), None, &variables);
                }
                Ok(data)
            }
            Err(error) => {
                let error = FetchError::from(error);
                tracing::debug!(%error, "mutation failed");
                self.state.set(MutationState {
                    data: None,
                    error: Some(error.clone()),
                    status: QueryStatus::Error,
                    pending: false,
                });
                if let Some(callback) = &self.options.on_error {
                    callback(&error, &variables);
                }
                if let Some(callback) = &self.options.on_settled {
                    callback(None, Some(&error), &variables);
                }
                Err(error)
            }
        }
    }

    /// Return to the idle state, clearing data and error.
    pub fn reset(&self) {
        self.state.set(MutationState::idle());
    }
}
