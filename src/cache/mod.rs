//! Normalized query cache.
//!
//! The single source of truth for "last known server state", keyed by
//! structural `QueryKey`s:
//! - entries carry data, fetch time, and a staleness flag
//! - invalidation matches by key prefix so filtered variants are covered
//! - optimistic edits go through `patch` and are reversible via snapshots
//! - fetch tickets discard superseded responses

mod key;
mod store;

pub use key::{ListFilters, QueryKey};
pub use store::{CacheSnapshot, EntryInfo, FetchTicket, ObserverGuard, QueryCache};
