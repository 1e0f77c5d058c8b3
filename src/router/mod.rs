//! Nested-route resolution and navigation.
//!
//! # Data Flow
//! ```text
//! RouteSpec tree ──flatten──▶ FlattenedRoute table ──insert──▶ PathMatcher
//!
//! navigate(path)
//!     → match_path          (matcher + table)
//!     → before_navigate guards, sequential, cancellable
//!     → history push/replace
//!     → update_route: read history, load views (fan-out/fan-in),
//!       publish RouteState, fire after_navigate
//! ```
//!
//! The browser is behind the [`History`] trait; everything here runs the
//! same headless.

pub mod controller;
pub mod history;
pub mod matcher;
pub mod query_string;
pub mod table;

pub use controller::{
    Cancellation, MatchResult, Navigation, NavigationKind, ResolvedRoute, RouteError, RouteState,
    Router,
};
pub use history::{History, MemoryHistory};
pub use matcher::PathMatcher;
pub use query_string::{ParamPatch, QueryParams};
pub use table::{flatten, FlattenedRoute, RouteSpec, ViewLoaderFn, ViewRef};
