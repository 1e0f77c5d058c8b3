//! Reactive query cache.
//!
//! Data flows through three layers:
//!
//! ```text
//!   Query / Mutation        call-site state machines
//!        |
//!   CacheStore              shared entries keyed by serialized QueryKey
//!        |
//!   subscribers             notified on update and invalidation
//! ```
//!
//! Queries serve fresh cached data without fetching, share one
//! in-flight fetch per key, and refetch when their key is invalidated.
//! Mutations run writes and leave cache invalidation to their
//! `on_success` callbacks.

pub mod cache;
pub mod key;
pub mod mutation;
pub mod query;

pub use cache::{CacheEvent, CacheStore, CacheSubscription, FetchError};
pub use key::QueryKey;
pub use mutation::{Mutation, MutationOptions, MutationState};
pub use query::{Query, QueryOptions, QueryState, QueryStatus};
