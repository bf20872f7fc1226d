//! shopsync — client-side data synchronization core for a small-business
//! inventory and billing server.
//!
//! The crate keeps a local query cache consistent with the server of record
//! under concurrent, debounced, and optimistic writes:
//!
//! - [`api`]: typed REST client (pure transport)
//! - [`cache`]: normalized query cache with prefix invalidation
//! - [`query`]: poll-based cached query observers
//! - [`sync`]: optimistic mutation engine, invalidation graph, draft
//!   autosave, and the [`sync::SyncCore`] root facade
//!
//! UI layers (forms, dialogs, pages) are external collaborators: they render
//! from query observers and call mutation hooks, never touching the cache
//! directly.

pub mod api;
pub mod cache;
pub mod config;
pub mod debounce;
pub mod error;
pub mod logging;
pub mod query;
pub mod sync;

pub use api::ApiClient;
pub use cache::{ListFilters, QueryCache, QueryKey};
pub use config::Config;
pub use error::ApiError;
pub use query::CachedQuery;
pub use sync::{DraftAutosave, SyncCore, Tracked};
