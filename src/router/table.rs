//! Route tree flattening.
//!
//! # Responsibilities
//! - Describe the nested route configuration supplied by the application
//! - Flatten the tree into leaf routes with fully-qualified paths
//! - Carry each leaf's ancestor layout chain in root-to-leaf order
//!
//! # Design Decisions
//! - A node with children is a layout: it contributes its view to every
//!   descendant's `parents` chain and produces no leaf of its own
//! - Path segments are joined with single `/` separators; repeated
//!   slashes collapse; an empty join defaults to `/`
//! - Views are either ready handles or zero-argument async loaders; the
//!   crate is generic over the opaque handle type

use crate::BoxError;
use futures_util::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Zero-argument async loader producing a view handle.
pub type ViewLoaderFn<V> =
    Arc<dyn Fn() -> BoxFuture<'static, Result<V, BoxError>> + Send + Sync>;

/// A view handle that is either directly available or loaded on demand.
#[derive(Clone)]
pub enum ViewRef<V> {
    /// A handle usable as-is.
    Ready(V),
    /// Deferred: resolved by invoking and awaiting the loader.
    Loader(ViewLoaderFn<V>),
}

impl<V> ViewRef<V> {
    /// Wrap an async loader.
    pub fn loader<F, Fut>(load: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, BoxError>> + Send + 'static,
    {
        ViewRef::Loader(Arc::new(move || Box::pin(load())))
    }
}

impl<V> From<V> for ViewRef<V> {
    fn from(view: V) -> Self {
        ViewRef::Ready(view)
    }
}

impl<V> fmt::Debug for ViewRef<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewRef::Ready(_) => f.write_str("ViewRef::Ready"),
            ViewRef::Loader(_) => f.write_str("ViewRef::Loader"),
        }
    }
}

/// One node of the nested route configuration.
///
/// Owned by application configuration; immutable after the router is
/// constructed from it.
#[derive(Debug, Clone)]
pub struct RouteSpec<V> {
    /// Path pattern segment(s), possibly containing `:name` parameters.
    pub path: String,
    /// View rendered for this node (for layouts: around its children).
    pub view: ViewRef<V>,
    /// Nested child routes; non-empty makes this node a layout.
    pub children: Vec<RouteSpec<V>>,
}

impl<V> RouteSpec<V> {
    pub fn new(path: impl Into<String>, view: impl Into<ViewRef<V>>) -> Self {
        Self {
            path: path.into(),
            view: view.into(),
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<RouteSpec<V>>) -> Self {
        self.children = children;
        self
    }
}

/// One leaf of the flattened route table.
#[derive(Debug, Clone)]
pub struct FlattenedRoute<V> {
    /// Fully-qualified path pattern.
    pub path: String,
    /// The leaf's own view.
    pub view: ViewRef<V>,
    /// Ancestor layout views, root first.
    pub parents: Vec<ViewRef<V>>,
}

/// Depth-first flattening of a route tree into its leaves.
pub fn flatten<V: Clone>(routes: &[RouteSpec<V>]) -> Vec<FlattenedRoute<V>> {
    let mut leaves = Vec::new();
    flatten_into(routes, "", &[], &mut leaves);
    leaves
}

fn flatten_into<V: Clone>(
    routes: &[RouteSpec<V>],
    base: &str,
    parents: &[ViewRef<V>],
    leaves: &mut Vec<FlattenedRoute<V>>,
) {
    for route in routes {
        let full_path = join_paths(base, &route.path);
        if route.children.is_empty() {
            leaves.push(FlattenedRoute {
                path: full_path,
                view: route.view.clone(),
                parents: parents.to_vec(),
            });
        } else {
            let mut chain = parents.to_vec();
            chain.push(route.view.clone());
            flatten_into(&route.children, &full_path, &chain, leaves);
        }
    }
}

fn join_paths(base: &str, path: &str) -> String {
    if path == "/" {
        return if base.is_empty() {
            "/".to_string()
        } else {
            base.to_string()
        };
    }

    let mut joined = String::with_capacity(base.len() + path.len() + 1);
    for part in [base, "/", path] {
        for c in part.chars() {
            if c == '/' && joined.ends_with('/') {
                continue;
            }
            joined.push(c);
        }
    }

    if joined.is_empty() {
        "/".to_string()
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(path: &str) -> RouteSpec<&'static str> {
        RouteSpec::new(path, "leaf")
    }

    #[test]
    fn test_join_paths() {
        assert_eq!(join_paths("", "/"), "/");
        assert_eq!(join_paths("", "/about"), "/about");
        assert_eq!(join_paths("/admin", "/"), "/admin");
        assert_eq!(join_paths("/admin", "users"), "/admin/users");
        assert_eq!(join_paths("/admin/", "/users"), "/admin/users");
    }

    #[test]
    fn test_flat_tree_has_no_parents() {
        let leaves = flatten(&[leaf("/"), leaf("/about")]);
        assert_eq!(leaves.len(), 2);
        assert_eq!(leaves[0].path, "/");
        assert_eq!(leaves[1].path, "/about");
        assert!(leaves[0].parents.is_empty());
    }

    #[test]
    fn test_layout_contributes_to_descendants_only() {
        let routes = vec![RouteSpec::new("/admin", "admin-layout").with_children(vec![
            leaf("/users"),
            RouteSpec::new("/reports", "reports-layout")
                .with_children(vec![leaf("/monthly")]),
        ])];

        let leaves = flatten(&routes);
        let paths: Vec<&str> = leaves.iter().map(|l| l.path.as_str()).collect();
        assert_eq!(paths, vec!["/admin/users", "/admin/reports/monthly"]);

        // The layout itself produced no leaf.
        assert_eq!(leaves[0].parents.len(), 1);
        // Nested layouts accumulate root-to-leaf.
        assert_eq!(leaves[1].parents.len(), 2);
        assert!(matches!(leaves[1].parents[0], ViewRef::Ready("admin-layout")));
        assert!(matches!(leaves[1].parents[1], ViewRef::Ready("reports-layout")));
    }

    #[test]
    fn test_parents_count_equals_ancestors_with_children() {
        let routes = vec![RouteSpec::new("/a", "a").with_children(vec![
            RouteSpec::new("/b", "b")
                .with_children(vec![RouteSpec::new("/c", "c")
                    .with_children(vec![leaf("/d")])]),
        ])];

        let leaves = flatten(&routes);
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].path, "/a/b/c/d");
        assert_eq!(leaves[0].parents.len(), 3);
    }

    #[test]
    fn test_index_child_keeps_parent_path() {
        let routes =
            vec![RouteSpec::new("/admin", "layout").with_children(vec![leaf("/")])];
        let leaves = flatten(&routes);
        assert_eq!(leaves[0].path, "/admin");
    }
}
