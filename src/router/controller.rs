//! Navigation control.
//!
//! # Responsibilities
//! - Resolve requested paths against the flattened route table
//! - Run cancellable pre-navigation guards strictly in sequence
//! - Mutate history, resolve views, publish the new route state
//! - Interpolate path templates and patch the query string
//!
//! # Design Decisions
//! - The route table is immutable after construction
//! - Guards are awaited one at a time and all complete before any
//!   history mutation; a cancelled navigation leaves no trace
//! - The leaf view and its ancestor chain load concurrently, but the
//!   published state is atomic: observers never see a partial route
//! - A failed view loader is logged and leaves its slot `None`; the
//!   navigation still publishes (best-effort forward, so a broken lazy
//!   chunk degrades one outlet instead of wedging the whole transition)

use super::history::History;
use super::matcher::PathMatcher;
use super::query_string::{ParamPatch, QueryParams};
use super::table::{flatten, FlattenedRoute, RouteSpec, ViewRef};
use crate::signal::{Signal, Subscription};
use futures_util::future::{join_all, BoxFuture};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use thiserror::Error;

/// Errors surfaced synchronously from path-template interpolation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    /// `resolve` was called without parameters on a parameterized path.
    #[error("missing parameters for path: {path}")]
    MissingParams { path: String },

    /// A `:name` placeholder had no corresponding supplied value.
    #[error("missing parameter: {name}")]
    MissingParam { name: String },
}

/// What initiated a navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationKind {
    /// Explicit programmatic navigation.
    Goto,
    /// Browser back/forward.
    PopState,
    /// An intercepted link click.
    Link,
}

/// A matched route with all views resolved to concrete handles.
///
/// `view` and `parents` slots are `None` when their loader failed; see
/// the module notes on best-effort forward navigation.
#[derive(Debug, Clone)]
pub struct ResolvedRoute<V> {
    pub path: String,
    pub view: Option<V>,
    pub parents: Vec<Option<V>>,
}

/// The published current location.
#[derive(Debug, Clone)]
pub struct RouteState<V> {
    pub route: Option<ResolvedRoute<V>>,
    pub params: HashMap<String, String>,
    pub path: String,
}

impl<V> Default for RouteState<V> {
    fn default() -> Self {
        Self {
            route: None,
            params: HashMap::new(),
            path: String::new(),
        }
    }
}

/// Result of matching a concrete path against the route table.
#[derive(Debug, Clone)]
pub struct MatchResult<V> {
    pub route: Option<Arc<FlattenedRoute<V>>>,
    pub params: HashMap<String, String>,
}

/// One transition between route states.
#[derive(Debug, Clone)]
pub struct Navigation<V> {
    pub from: RouteState<V>,
    pub to: RouteState<V>,
    pub kind: NavigationKind,
}

/// Veto handle passed to pre-navigation guards.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    cancelled: Arc<AtomicBool>,
}

impl Cancellation {
    fn new() -> Self {
        Self::default()
    }

    /// Abort the navigation before any externally visible state changes.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

type BeforeNavigateFn<V> =
    Arc<dyn Fn(Navigation<V>, Cancellation) -> BoxFuture<'static, ()> + Send + Sync>;
type AfterNavigateFn<V> = Arc<dyn Fn(&Navigation<V>) + Send + Sync>;
type CallbackRegistry<F> = Arc<Mutex<Vec<(u64, F)>>>;

/// Orchestrates transitions between the current and a requested route.
pub struct Router<V> {
    matcher: PathMatcher<Arc<FlattenedRoute<V>>>,
    routes: Vec<Arc<FlattenedRoute<V>>>,
    history: Arc<dyn History>,
    current: Signal<RouteState<V>>,
    before: CallbackRegistry<BeforeNavigateFn<V>>,
    after: CallbackRegistry<AfterNavigateFn<V>>,
    next_callback_id: AtomicU64,
    nav_kind: Mutex<NavigationKind>,
}

impl<V: Clone + Send + Sync + 'static> Router<V> {
    /// Build a router over `routes`, bound to a history implementation.
    ///
    /// The tree is flattened once here; no dynamic re-registration.
    pub fn new(routes: Vec<RouteSpec<V>>, history: Arc<dyn History>) -> Self {
        let flattened: Vec<Arc<FlattenedRoute<V>>> =
            flatten(&routes).into_iter().map(Arc::new).collect();

        let mut matcher = PathMatcher::new();
        for route in &flattened {
            matcher.insert(&route.path, route.clone());
        }

        Self {
            matcher,
            routes: flattened,
            history,
            current: Signal::new(RouteState::default()),
            before: Arc::new(Mutex::new(Vec::new())),
            after: Arc::new(Mutex::new(Vec::new())),
            next_callback_id: AtomicU64::new(0),
            nav_kind: Mutex::new(NavigationKind::Goto),
        }
    }

    /// Snapshot of the published current state.
    pub fn current(&self) -> RouteState<V> {
        (*self.current.get()).clone()
    }

    /// Observe every published state change.
    pub fn observe(
        &self,
        observer: impl Fn(&RouteState<V>) + Send + Sync + 'static,
    ) -> Subscription {
        self.current.subscribe(observer)
    }

    /// The flattened leaf routes, in configuration order.
    pub fn routes(&self) -> &[Arc<FlattenedRoute<V>>] {
        &self.routes
    }

    /// Match a concrete path against the route table.
    pub fn match_path(&self, path: &str) -> MatchResult<V> {
        match self.matcher.lookup(path) {
            Some((route, params)) => MatchResult {
                route: Some(route.clone()),
                params,
            },
            None => MatchResult {
                route: None,
                params: HashMap::new(),
            },
        }
    }

    /// Interpolate `:name` placeholders in `pattern`.
    ///
    /// With an empty parameter list a parameterized pattern is an error;
    /// otherwise every placeholder must have a supplied value.
    pub fn resolve(&self, pattern: &str, params: &[(&str, &str)]) -> Result<String, RouteError> {
        if params.is_empty() {
            if pattern.contains(':') {
                return Err(RouteError::MissingParams {
                    path: pattern.to_string(),
                });
            }
            return Ok(pattern.to_string());
        }
        interpolate(pattern, params)
    }

    /// Interpolate `pattern` and navigate to the result.
    ///
    /// Template errors surface here before any navigation side effect.
    pub async fn goto(&self, pattern: &str, params: &[(&str, &str)]) -> Result<(), RouteError> {
        let path = self.resolve(pattern, params)?;
        self.navigate(&path).await;
        Ok(())
    }

    /// Navigate with a pushed history entry, kind [`NavigationKind::Goto`].
    pub async fn navigate(&self, path: &str) {
        self.navigate_with(path, false, NavigationKind::Goto).await;
    }

    /// Full navigation entry point.
    ///
    /// Guards run strictly sequentially; all of them complete before the
    /// history mutation, and any `cancel()` aborts with the current state
    /// untouched.
    pub async fn navigate_with(&self, path: &str, replace: bool, kind: NavigationKind) {
        *self.lock_nav_kind() = kind;

        let from = self.current();
        let MatchResult { params, .. } = self.match_path(path);
        // Views are not loaded yet at guard time.
        let to = RouteState {
            route: None,
            params,
            path: path.to_string(),
        };
        let navigation = Navigation { from, to, kind };

        let cancellation = Cancellation::new();
        let guards: Vec<BeforeNavigateFn<V>> = self
            .before
            .lock()
            .expect("navigation callback mutex poisoned")
            .iter()
            .map(|(_, guard)| guard.clone())
            .collect();
        for guard in guards {
            guard(navigation.clone(), cancellation.clone()).await;
            if cancellation.is_cancelled() {
                tracing::debug!(path, "navigation cancelled by guard");
                return;
            }
        }

        if replace {
            self.history.replace(path);
        } else {
            self.history.push(path);
        }

        self.update_route(None).await;
    }

    /// Re-resolve from the history's actual current path and publish.
    ///
    /// This is also the entry point a host shell calls on `popstate`,
    /// with [`NavigationKind::PopState`]; the path published here may
    /// differ from the one a preceding `navigate` requested.
    pub async fn update_route(&self, kind: Option<NavigationKind>) {
        if let Some(kind) = kind {
            *self.lock_nav_kind() = kind;
        }
        let kind = *self.lock_nav_kind();

        let from = self.current();
        let pathname = self.history.pathname();
        let matched = self.match_path(&pathname);

        let route = match matched.route {
            Some(flat) => {
                let (view, parents) = tokio::join!(
                    resolve_view(&flat.view),
                    join_all(flat.parents.iter().map(resolve_view)),
                );
                Some(ResolvedRoute {
                    path: flat.path.clone(),
                    view,
                    parents,
                })
            }
            None => None,
        };

        let to = RouteState {
            route,
            params: matched.params,
            path: pathname.clone(),
        };
        self.current.set(to.clone());
        tracing::debug!(path = %pathname, ?kind, "route published");

        let navigation = Navigation { from, to, kind };
        let callbacks: Vec<AfterNavigateFn<V>> = self
            .after
            .lock()
            .expect("navigation callback mutex poisoned")
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();
        for callback in callbacks {
            callback(&navigation);
        }
    }

    /// Register a pre-navigation guard. Returns an unsubscribe handle.
    pub fn before_navigate<F, Fut>(&self, guard: F) -> Subscription
    where
        F: Fn(Navigation<V>, Cancellation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let wrapped: BeforeNavigateFn<V> =
            Arc::new(move |navigation, cancellation| Box::pin(guard(navigation, cancellation)));
        Self::register(&self.before, &self.next_callback_id, wrapped)
    }

    /// Register a post-navigation callback. Returns an unsubscribe handle.
    pub fn after_navigate(
        &self,
        callback: impl Fn(&Navigation<V>) + Send + Sync + 'static,
    ) -> Subscription {
        let wrapped: AfterNavigateFn<V> = Arc::new(callback);
        Self::register(&self.after, &self.next_callback_id, wrapped)
    }

    fn register<F: Send + 'static>(
        registry: &CallbackRegistry<F>,
        next_id: &AtomicU64,
        callback: F,
    ) -> Subscription {
        let id = next_id.fetch_add(1, Ordering::Relaxed);
        registry
            .lock()
            .expect("navigation callback mutex poisoned")
            .push((id, callback));

        let registry: Weak<Mutex<Vec<(u64, F)>>> = Arc::downgrade(registry);
        Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry
                    .lock()
                    .expect("navigation callback mutex poisoned")
                    .retain(|(entry_id, _)| *entry_id != id);
            }
        })
    }

    /// Whether the current path is `path` or nested under it.
    pub fn is_active(&self, path: &str, exact: bool) -> bool {
        let current = self.current().path;
        if exact {
            return current == path;
        }
        current == path
            || current
                .strip_prefix(path)
                .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Read view over the current query string.
    pub fn query_params(&self) -> QueryParams {
        QueryParams::parse(&self.history.search())
    }

    /// Merge a patch into the query string and push/replace the result.
    ///
    /// The pathname is preserved and the route-matching pipeline is
    /// bypassed; the current state is republished so observers see the
    /// query-string change.
    pub fn set_query_params(&self, patch: &[(&str, ParamPatch)], replace: bool) {
        let mut params = self.query_params();
        for (key, param_patch) in patch {
            params.apply(key, param_patch);
        }

        let pathname = self.history.pathname();
        let serialized = params.to_string();
        let url = if serialized.is_empty() {
            pathname
        } else {
            format!("{pathname}?{serialized}")
        };

        if replace {
            self.history.replace(&url);
        } else {
            self.history.push(&url);
        }

        let state = self.current();
        self.current.set(state);
    }

    fn lock_nav_kind(&self) -> std::sync::MutexGuard<'_, NavigationKind> {
        self.nav_kind.lock().expect("navigation kind mutex poisoned")
    }
}

async fn resolve_view<V: Clone>(view: &ViewRef<V>) -> Option<V> {
    match view {
        ViewRef::Ready(view) => Some(view.clone()),
        ViewRef::Loader(load) => match load().await {
            Ok(view) => Some(view),
            Err(error) => {
                tracing::error!(%error, "failed to load route view");
                None
            }
        },
    }
}

fn interpolate(pattern: &str, params: &[(&str, &str)]) -> Result<String, RouteError> {
    let mut out = String::with_capacity(pattern.len());
    for (i, segment) in pattern.split('/').enumerate() {
        if i > 0 {
            out.push('/');
        }
        if let Some(name) = segment.strip_prefix(':') {
            let value = params
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| *value)
                .ok_or_else(|| RouteError::MissingParam {
                    name: name.to_string(),
                })?;
            out.push_str(value);
        } else {
            out.push_str(segment);
        }
    }
    Ok(out)
}
