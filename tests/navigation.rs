//! Integration tests for route matching, navigation, guards and the
//! query-string accessor.

mod common;

use common::{app_router, async_view, failing_view};
use spa_runtime::router::{
    MemoryHistory, NavigationKind, ParamPatch, RouteError, RouteSpec, Router,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[tokio::test]
async fn navigation_publishes_matched_route_and_params() {
    common::init_tracing();
    let (router, history) = app_router();

    router.navigate("/users/42").await;

    let state = router.current();
    assert_eq!(state.path, "/users/42");
    assert_eq!(state.params.get("id"), Some(&"42".to_string()));
    let route = state.route.expect("route should resolve");
    assert_eq!(route.view, Some("user-detail"));
    assert_eq!(history.current_url(), "/users/42");
}

#[tokio::test]
async fn unmatched_path_publishes_empty_route() {
    let (router, _history) = app_router();

    router.navigate("/missing/page").await;

    let state = router.current();
    assert_eq!(state.path, "/missing/page");
    assert!(state.route.is_none());
    assert!(state.params.is_empty());
}

#[tokio::test]
async fn layout_parents_resolve_outermost_first() {
    let (router, _history) = app_router();

    router.navigate("/dashboard/reports/2024").await;

    let state = router.current();
    let route = state.route.expect("nested route should resolve");
    assert_eq!(route.view, Some("report-detail"));
    assert_eq!(
        route.parents,
        vec![Some("dashboard-layout"), Some("reports-layout")]
    );
    assert_eq!(state.params.get("year"), Some(&"2024".to_string()));
}

#[tokio::test]
async fn index_child_matches_layout_path() {
    let (router, _history) = app_router();

    router.navigate("/dashboard").await;

    let route = router.current().route.expect("index child should resolve");
    assert_eq!(route.view, Some("dashboard-index"));
    assert_eq!(route.parents, vec![Some("dashboard-layout")]);
}

#[tokio::test]
async fn lazy_views_load_during_navigation() {
    let history = Arc::new(MemoryHistory::new("/"));
    let routes = vec![
        RouteSpec::new("/lazy", async_view("lazy-page")),
        RouteSpec::new("/broken", failing_view()),
    ];
    let router = Router::new(routes, history);

    router.navigate("/lazy").await;
    assert_eq!(router.current().route.unwrap().view, Some("lazy-page"));

    // A failing loader leaves its slot empty instead of failing the
    // whole navigation.
    router.navigate("/broken").await;
    let route = router.current().route.expect("route still matches");
    assert_eq!(route.view, None);
}

#[tokio::test]
async fn guard_cancellation_blocks_history_and_state() {
    let (router, history) = app_router();
    router.navigate("/about").await;

    let _guard = router.before_navigate(|navigation, cancellation| async move {
        if navigation.to.path.starts_with("/dashboard") {
            cancellation.cancel();
        }
    });

    router.navigate("/dashboard/settings").await;

    assert_eq!(router.current().path, "/about");
    assert_eq!(history.current_url(), "/about");

    router.navigate("/users/7").await;
    assert_eq!(router.current().path, "/users/7");
}

#[tokio::test]
async fn guards_run_sequentially_before_after_callbacks() {
    let (router, _history) = app_router();
    let order = Arc::new(Mutex::new(Vec::new()));

    let first = order.clone();
    let _g1 = router.before_navigate(move |_, _| {
        let first = first.clone();
        async move {
            tokio::task::yield_now().await;
            first.lock().unwrap().push("guard-1");
        }
    });
    let second = order.clone();
    let _g2 = router.before_navigate(move |_, _| {
        let second = second.clone();
        async move {
            second.lock().unwrap().push("guard-2");
        }
    });
    let after = order.clone();
    let _after = router.after_navigate(move |_| {
        after.lock().unwrap().push("after");
    });

    router.navigate("/about").await;

    assert_eq!(*order.lock().unwrap(), vec!["guard-1", "guard-2", "after"]);
}

#[tokio::test]
async fn unsubscribed_guard_no_longer_runs() {
    let (router, _history) = app_router();
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = calls.clone();
    let guard = router.before_navigate(move |_, _| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    router.navigate("/about").await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    guard.unsubscribe();
    router.navigate("/users/1").await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn replace_navigation_leaves_no_back_entry() {
    let (router, history) = app_router();

    router.navigate("/about").await;
    router
        .navigate_with("/users/9", true, NavigationKind::Goto)
        .await;

    assert_eq!(history.current_url(), "/users/9");
    assert!(history.back());
    assert_eq!(history.current_url(), "/");
}

#[tokio::test]
async fn popstate_rematches_from_history() {
    let (router, history) = app_router();
    router.navigate("/about").await;
    router.navigate("/users/3").await;

    let kinds = Arc::new(Mutex::new(Vec::new()));
    let seen = kinds.clone();
    let _after = router.after_navigate(move |navigation| {
        seen.lock().unwrap().push(navigation.kind);
    });

    assert!(history.back());
    router.update_route(Some(NavigationKind::PopState)).await;

    let state = router.current();
    assert_eq!(state.path, "/about");
    assert_eq!(state.route.unwrap().view, Some("about"));
    assert_eq!(*kinds.lock().unwrap(), vec![NavigationKind::PopState]);
}

#[tokio::test]
async fn navigation_kind_reaches_after_callbacks() {
    let (router, _history) = app_router();
    let kinds = Arc::new(Mutex::new(Vec::new()));

    let seen = kinds.clone();
    let _after = router.after_navigate(move |navigation| {
        seen.lock().unwrap().push(navigation.kind);
    });

    router
        .navigate_with("/about", false, NavigationKind::Link)
        .await;
    router.navigate("/users/5").await;

    assert_eq!(
        *kinds.lock().unwrap(),
        vec![NavigationKind::Link, NavigationKind::Goto]
    );
}

#[tokio::test]
async fn goto_interpolates_and_reports_missing_params() {
    let (router, _history) = app_router();

    router
        .goto("/users/:id", &[("id", "12")])
        .await
        .expect("interpolation should succeed");
    assert_eq!(router.current().path, "/users/12");

    let err = router.goto("/users/:id", &[]).await.unwrap_err();
    assert_eq!(
        err,
        RouteError::MissingParams {
            path: "/users/:id".to_string()
        }
    );
    // A failed template never navigates.
    assert_eq!(router.current().path, "/users/12");

    let err = router.goto("/users/:id", &[("name", "x")]).await.unwrap_err();
    assert_eq!(
        err,
        RouteError::MissingParam {
            name: "id".to_string()
        }
    );
}

#[tokio::test]
async fn resolve_builds_paths_without_navigating() {
    let (router, _history) = app_router();

    assert_eq!(router.resolve("/about", &[]).unwrap(), "/about");
    assert_eq!(
        router.resolve("/users/:id", &[("id", "5")]).unwrap(),
        "/users/5"
    );
    assert!(router.resolve("/users/:id", &[]).is_err());
    // Nothing published: the state is still the pre-navigation default.
    assert_eq!(router.current().path, "");
}

#[tokio::test]
async fn is_active_distinguishes_exact_and_prefix() {
    let (router, _history) = app_router();
    router.navigate("/dashboard/settings").await;

    assert!(router.is_active("/dashboard/settings", true));
    assert!(!router.is_active("/dashboard", true));
    assert!(router.is_active("/dashboard", false));
    // "/dash" is a string prefix but not a path-segment prefix.
    assert!(!router.is_active("/dash", false));
}

#[tokio::test]
async fn set_query_params_merges_and_removes() {
    let (router, history) = app_router();
    router.navigate("/about?tags=a&tags=b&page=2").await;

    router.set_query_params(&[("tags", ParamPatch::Remove)], false);
    assert_eq!(history.current_url(), "/about?page=2");
    let params = router.query_params();
    assert!(!params.has("tags"));
    assert_eq!(params.get("page"), Some("2"));

    router.set_query_params(&[("page", ParamPatch::from("3"))], true);
    assert_eq!(router.query_params().get("page"), Some("3"));

    router.set_query_params(
        &[("tags", ParamPatch::from(vec!["x", "y"]))],
        false,
    );
    assert_eq!(router.query_params().get_all("tags"), vec!["x", "y"]);
}

#[tokio::test]
async fn route_state_is_observable() {
    let (router, _history) = app_router();
    let paths = Arc::new(Mutex::new(Vec::new()));

    let seen = paths.clone();
    let _sub = router.observe(move |state| {
        seen.lock().unwrap().push(state.path.clone());
    });

    router.navigate("/about").await;
    router.navigate("/users/8").await;

    assert_eq!(*paths.lock().unwrap(), vec!["/about", "/users/8"]);
}
