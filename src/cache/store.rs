//! The normalized query cache: last-known server state per query key.
//!
//! Entries are owned exclusively by this store and change only through the
//! defined transitions: fetch completion, invalidation, optimistic patch,
//! snapshot restore. Values are held as `serde_json::Value` so one store can
//! hold every resource type; typed access goes through `read`/`write`.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

use super::key::QueryKey;

/// Observable metadata of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryInfo {
  pub has_data: bool,
  pub is_stale: bool,
  pub fetched_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
struct Entry {
  data: Option<Value>,
  fetched_at: Option<DateTime<Utc>>,
  is_stale: bool,
  /// Highest fetch ticket that has written this entry.
  last_completed: u64,
}

/// Ticket identifying one fetch attempt; allocated when the fetch starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket(u64);

/// Snapshot of a set of entries, taken before an optimistic mutation and used
/// at most once to roll it back.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSnapshot {
  entries: Vec<(QueryKey, Option<SnapshotEntry>)>,
}

#[derive(Debug, Clone, PartialEq)]
struct SnapshotEntry {
  data: Option<Value>,
  fetched_at: Option<DateTime<Utc>>,
  is_stale: bool,
}

/// Process-wide keyed store for server-derived values.
///
/// Constructed explicitly by the application root and injected everywhere it
/// is needed; there is no global instance. No eviction beyond staleness
/// marking: at this scale an unbounded map is acceptable and entries live
/// until the store is dropped.
pub struct QueryCache {
  entries: Mutex<HashMap<QueryKey, Entry>>,
  observers: Mutex<HashMap<QueryKey, usize>>,
  tickets: AtomicU64,
  changes: broadcast::Sender<QueryKey>,
}

impl QueryCache {
  pub fn new() -> Self {
    let (changes, _) = broadcast::channel(256);
    Self {
      entries: Mutex::new(HashMap::new()),
      observers: Mutex::new(HashMap::new()),
      tickets: AtomicU64::new(0),
      changes,
    }
  }

  /// Read a typed value for `key`, if present.
  pub fn read<T: DeserializeOwned>(&self, key: &QueryKey) -> Option<T> {
    let value = self.read_value(key)?;
    match serde_json::from_value(value) {
      Ok(v) => Some(v),
      Err(err) => {
        tracing::error!(%key, %err, "cached value does not match requested type");
        None
      }
    }
  }

  /// Read the raw cached value for `key`.
  pub fn read_value(&self, key: &QueryKey) -> Option<Value> {
    let entries = self.lock_entries();
    entries.get(key).and_then(|e| e.data.clone())
  }

  /// Metadata for `key`, if an entry exists.
  pub fn entry_info(&self, key: &QueryKey) -> Option<EntryInfo> {
    let entries = self.lock_entries();
    entries.get(key).map(|e| EntryInfo {
      has_data: e.data.is_some(),
      is_stale: e.is_stale,
      fetched_at: e.fetched_at,
    })
  }

  /// Replace the data for `key`, marking it fresh and recording fetch time.
  pub fn write<T: Serialize>(&self, key: &QueryKey, data: &T) {
    match serde_json::to_value(data) {
      Ok(value) => self.write_value(key, value),
      Err(err) => tracing::error!(%key, %err, "failed to serialize cache entry"),
    }
  }

  pub fn write_value(&self, key: &QueryKey, value: Value) {
    {
      let mut entries = self.lock_entries();
      let entry = entries.entry(key.clone()).or_default();
      entry.data = Some(value);
      entry.fetched_at = Some(Utc::now());
      entry.is_stale = false;
    }
    self.notify(key);
  }

  /// Apply a pure updater to the current data without marking it fresh.
  ///
  /// Used for optimistic edits; reversibility comes from the snapshot the
  /// mutation engine takes before patching, not from the updater itself.
  pub fn patch(&self, key: &QueryKey, updater: impl FnOnce(Option<Value>) -> Option<Value>) {
    {
      let mut entries = self.lock_entries();
      let entry = entries.entry(key.clone()).or_default();
      entry.data = updater(entry.data.take());
    }
    self.notify(key);
  }

  /// Mark every entry whose key starts with `prefix` as stale.
  ///
  /// Returns the staled keys that are currently observed; those are also
  /// broadcast so active observers refetch eagerly. Unobserved entries stay
  /// stale until their next access.
  pub fn invalidate_prefix(&self, prefix: &QueryKey) -> Vec<QueryKey> {
    let staled: Vec<QueryKey> = {
      let mut entries = self.lock_entries();
      entries
        .iter_mut()
        .filter(|(key, _)| key.starts_with(prefix))
        .map(|(key, entry)| {
          entry.is_stale = true;
          key.clone()
        })
        .collect()
    };

    let observed: Vec<QueryKey> = {
      let observers = self.lock_observers();
      staled
        .into_iter()
        .filter(|key| observers.get(key).copied().unwrap_or(0) > 0)
        .collect()
    };

    for key in &observed {
      self.notify(key);
    }
    observed
  }

  /// Snapshot the full state of each listed entry (including absence).
  pub fn snapshot(&self, keys: &[QueryKey]) -> CacheSnapshot {
    let entries = self.lock_entries();
    CacheSnapshot {
      entries: keys
        .iter()
        .map(|key| {
          let snap = entries.get(key).map(|e| SnapshotEntry {
            data: e.data.clone(),
            fetched_at: e.fetched_at,
            is_stale: e.is_stale,
          });
          (key.clone(), snap)
        })
        .collect(),
    }
  }

  /// Restore every entry captured in `snapshot`, removing entries that were
  /// absent when it was taken. Fetch-ticket bookkeeping is not rolled back.
  pub fn restore(&self, snapshot: CacheSnapshot) {
    let keys: Vec<QueryKey> = {
      let mut entries = self.lock_entries();
      snapshot
        .entries
        .into_iter()
        .map(|(key, snap)| {
          match snap {
            Some(snap) => {
              let entry = entries.entry(key.clone()).or_default();
              entry.data = snap.data;
              entry.fetched_at = snap.fetched_at;
              entry.is_stale = snap.is_stale;
            }
            None => {
              entries.remove(&key);
            }
          }
          key
        })
        .collect()
    };

    for key in &keys {
      self.notify(key);
    }
  }

  /// Allocate a ticket for a fetch that is about to start.
  pub fn begin_fetch(&self) -> FetchTicket {
    FetchTicket(self.tickets.fetch_add(1, Ordering::SeqCst) + 1)
  }

  /// Write the result of a completed fetch.
  ///
  /// Returns false (and writes nothing) when a newer fetch for the same key
  /// already completed — a superseded response must not clobber fresher data.
  /// Comparing completed tickets rather than start order is what the
  /// interleaving requires: the later-started fetch may finish first.
  pub fn complete_fetch(&self, key: &QueryKey, ticket: FetchTicket, value: Value) -> bool {
    {
      let mut entries = self.lock_entries();
      let entry = entries.entry(key.clone()).or_default();
      if ticket.0 <= entry.last_completed {
        return false;
      }
      entry.last_completed = ticket.0;
      entry.data = Some(value);
      entry.fetched_at = Some(Utc::now());
      entry.is_stale = false;
    }
    self.notify(key);
    true
  }

  /// Subscribe to change notifications (one key per changed entry).
  pub fn subscribe(&self) -> broadcast::Receiver<QueryKey> {
    self.changes.subscribe()
  }

  /// Register an active observer for `key`; the guard deregisters on drop.
  pub fn observe(self: &Arc<Self>, key: &QueryKey) -> ObserverGuard {
    {
      let mut observers = self.lock_observers();
      *observers.entry(key.clone()).or_insert(0) += 1;
    }
    ObserverGuard {
      cache: Arc::clone(self),
      key: key.clone(),
    }
  }

  pub fn is_observed(&self, key: &QueryKey) -> bool {
    self.lock_observers().get(key).copied().unwrap_or(0) > 0
  }

  fn release_observer(&self, key: &QueryKey) {
    let mut observers = self.lock_observers();
    if let Some(count) = observers.get_mut(key) {
      *count = count.saturating_sub(1);
      if *count == 0 {
        observers.remove(key);
      }
    }
  }

  fn notify(&self, key: &QueryKey) {
    // No receivers is fine; nobody is watching yet.
    let _ = self.changes.send(key.clone());
  }

  fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<QueryKey, Entry>> {
    self.entries.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn lock_observers(&self) -> std::sync::MutexGuard<'_, HashMap<QueryKey, usize>> {
    self.observers.lock().unwrap_or_else(|e| e.into_inner())
  }
}

impl Default for QueryCache {
  fn default() -> Self {
    Self::new()
  }
}

/// Keeps a key registered as actively observed until dropped.
pub struct ObserverGuard {
  cache: Arc<QueryCache>,
  key: QueryKey,
}

impl Drop for ObserverGuard {
  fn drop(&mut self) {
    self.cache.release_observer(&self.key);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_write_then_read() {
    let cache = QueryCache::new();
    let key = QueryKey::root("products");
    cache.write(&key, &vec![1, 2, 3]);

    let data: Option<Vec<i32>> = cache.read(&key);
    assert_eq!(data, Some(vec![1, 2, 3]));

    let info = cache.entry_info(&key).unwrap();
    assert!(info.has_data);
    assert!(!info.is_stale);
    assert!(info.fetched_at.is_some());
  }

  #[test]
  fn test_prefix_invalidation_stales_filtered_variants() {
    let cache = QueryCache::new();
    let base = QueryKey::root("products");
    let filtered = QueryKey::root("products").with("q=shelf");
    let other = QueryKey::root("contacts");
    cache.write(&base, &json!([]));
    cache.write(&filtered, &json!([]));
    cache.write(&other, &json!([]));

    cache.invalidate_prefix(&base);

    assert!(cache.entry_info(&base).unwrap().is_stale);
    assert!(cache.entry_info(&filtered).unwrap().is_stale);
    assert!(!cache.entry_info(&other).unwrap().is_stale);
  }

  #[test]
  fn test_patch_does_not_mark_fresh() {
    let cache = QueryCache::new();
    let key = QueryKey::root("products");
    cache.write(&key, &json!([1]));
    cache.invalidate_prefix(&key);

    cache.patch(&key, |data| {
      let mut items = match data {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
      };
      items.push(json!(2));
      Some(Value::Array(items))
    });

    let info = cache.entry_info(&key).unwrap();
    assert!(info.is_stale, "patch must not clear staleness");
    assert_eq!(cache.read_value(&key), Some(json!([1, 2])));
  }

  #[test]
  fn test_snapshot_restore_round_trip() {
    let cache = QueryCache::new();
    let present = QueryKey::root("containers");
    let absent = QueryKey::root("contacts");
    cache.write(&present, &json!([{"id": 1}]));

    let before = cache.snapshot(&[present.clone(), absent.clone()]);

    cache.patch(&present, |_| Some(json!([{"id": 1}, {"id": 2}])));
    cache.write(&absent, &json!([{"id": 9}]));

    cache.restore(before.clone());

    assert_eq!(cache.read_value(&present), Some(json!([{"id": 1}])));
    assert_eq!(cache.read_value(&absent), None);
    assert!(cache.entry_info(&absent).is_none());
    // State after restore is exactly the snapshot state.
    assert_eq!(cache.snapshot(&[present, absent]), before);
  }

  #[test]
  fn test_superseded_fetch_is_discarded() {
    let cache = QueryCache::new();
    let key = QueryKey::root("products");

    let older = cache.begin_fetch();
    let newer = cache.begin_fetch();

    assert!(cache.complete_fetch(&key, newer, json!(["new"])));
    // The older response arrives after the newer already wrote the cache.
    assert!(!cache.complete_fetch(&key, older, json!(["old"])));
    assert_eq!(cache.read_value(&key), Some(json!(["new"])));
  }

  #[test]
  fn test_observer_counting() {
    let cache = Arc::new(QueryCache::new());
    let key = QueryKey::root("products");
    cache.write(&key, &json!([]));
    assert!(!cache.is_observed(&key));

    let guard = cache.observe(&key);
    assert!(cache.is_observed(&key));
    let eager = cache.invalidate_prefix(&key);
    assert_eq!(eager, vec![key.clone()]);

    drop(guard);
    assert!(!cache.is_observed(&key));
    assert!(cache.invalidate_prefix(&key).is_empty());
  }
}
