//! Client-Side Application Runtime Library

pub mod query;
pub mod router;
pub mod signal;

/// Error type produced by view loaders, query fetchers and mutations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[doc(hidden)]
pub use serde_json as __serde_json;

pub use query::{CacheStore, Mutation, MutationOptions, Query, QueryKey, QueryOptions};
pub use router::{History, MemoryHistory, RouteSpec, Router};
pub use signal::{Signal, Subscription};
