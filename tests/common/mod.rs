//! Shared fixtures for router and query integration tests.

// Each test binary uses a subset of these fixtures.
#![allow(dead_code)]

use spa_runtime::router::{MemoryHistory, RouteSpec, Router, ViewRef};
use spa_runtime::BoxError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};

static TRACING: Once = Once::new();

/// Install a tracing subscriber once per test binary, honoring RUST_LOG.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A small app tree: a dashboard layout with nested children, a
/// parameterized user page, and a root index.
pub fn app_routes() -> Vec<RouteSpec<&'static str>> {
    vec![
        RouteSpec::new("/", "home"),
        RouteSpec::new("/about", "about"),
        RouteSpec::new("/users/:id", "user-detail"),
        RouteSpec::new("/dashboard", "dashboard-layout").with_children(vec![
            RouteSpec::new("/", "dashboard-index"),
            RouteSpec::new("/settings", "dashboard-settings"),
            RouteSpec::new("/reports", "reports-layout")
                .with_children(vec![RouteSpec::new("/:year", "report-detail")]),
        ]),
    ]
}

/// Router over [`app_routes`] backed by in-memory history, started at `/`.
pub fn app_router() -> (Arc<Router<&'static str>>, Arc<MemoryHistory>) {
    let history = Arc::new(MemoryHistory::new("/"));
    let router = Arc::new(Router::new(app_routes(), history.clone()));
    (router, history)
}

/// A lazy view that resolves successfully after yielding once.
pub fn async_view(name: &'static str) -> ViewRef<&'static str> {
    ViewRef::loader(move || async move {
        tokio::task::yield_now().await;
        Ok(name)
    })
}

/// A lazy view whose loader always fails.
pub fn failing_view() -> ViewRef<&'static str> {
    ViewRef::loader(|| async { Err::<&'static str, BoxError>("loader exploded".into()) })
}

/// Counts how many times a fetch function actually runs.
#[derive(Default)]
pub struct FetchCounter {
    count: AtomicUsize,
}

impl FetchCounter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record(&self) -> usize {
        self.count.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}
