//! Cached query observer: a reactive `{data, is_loading, error}` view of one
//! cache entry.
//!
//! `CachedQuery<T>` hydrates from the cache on construction, fetches when the
//! entry is missing or stale, and delivers results through a channel drained
//! by `poll()` from the host's event loop. Successful fetches write through
//! the cache's ticket discipline, so a superseded response never clobbers a
//! newer one. A failed background refetch keeps the previous data visible and
//! sets `error` alongside it — observers never flicker to empty on a
//! transient failure.
//!
//! # Example
//!
//! ```ignore
//! let mut query = core.product_list(None);
//! query.ensure();
//!
//! // In the event loop tick
//! if query.poll() {
//!   // State changed, re-render from query.data() / query.error()
//! }
//! ```

use futures::future::BoxFuture;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::cache::{FetchTicket, ObserverGuard, QueryCache, QueryKey};
use crate::error::ApiError;

/// A factory function that creates futures for fetching data.
type FetcherFn<T> = Box<dyn Fn() -> BoxFuture<'static, Result<T, ApiError>> + Send + Sync>;

pub struct CachedQuery<T> {
  cache: Arc<QueryCache>,
  key: QueryKey,
  fetcher: FetcherFn<T>,
  data: Option<T>,
  error: Option<ApiError>,
  is_loading: bool,
  receiver: Option<mpsc::UnboundedReceiver<(FetchTicket, Result<T, ApiError>)>>,
  /// Keeps the key registered as observed while this query is alive.
  _observer: ObserverGuard,
}

impl<T> CachedQuery<T>
where
  T: Serialize + DeserializeOwned + Send + 'static,
{
  /// Create an observer for `key`, hydrating `data` from the cache.
  pub fn new<F, Fut>(cache: Arc<QueryCache>, key: QueryKey, fetcher: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
  {
    let observer = cache.observe(&key);
    let data = cache.read(&key);
    Self {
      cache,
      key,
      fetcher: Box::new(move || Box::pin(fetcher())),
      data,
      error: None,
      is_loading: false,
      receiver: None,
      _observer: observer,
    }
  }

  pub fn key(&self) -> &QueryKey {
    &self.key
  }

  pub fn data(&self) -> Option<&T> {
    self.data.as_ref()
  }

  pub fn error(&self) -> Option<&ApiError> {
    self.error.as_ref()
  }

  pub fn is_loading(&self) -> bool {
    self.is_loading
  }

  /// Fetch if the cache entry is missing or stale; no-op when fresh or a
  /// fetch is already in flight.
  pub fn ensure(&mut self) {
    if self.is_loading {
      return;
    }
    let fresh = self
      .cache
      .entry_info(&self.key)
      .map(|info| info.has_data && !info.is_stale)
      .unwrap_or(false);
    if !fresh {
      self.start_fetch();
    }
  }

  /// Force a refetch, dropping any in-flight result.
  pub fn refetch(&mut self) {
    self.receiver = None;
    self.start_fetch();
  }

  /// Drain the result channel. Returns true when observable state changed.
  pub fn poll(&mut self) -> bool {
    let receiver = match &mut self.receiver {
      Some(rx) => rx,
      None => return false,
    };

    match receiver.try_recv() {
      Ok((ticket, Ok(data))) => {
        self.is_loading = false;
        self.receiver = None;
        self.error = None;
        match serde_json::to_value(&data) {
          Ok(value) => {
            self.cache.complete_fetch(&self.key, ticket, value);
            // Read back: if this response was superseded, the cache holds the
            // newer result and that is what we must show.
            self.data = self.cache.read(&self.key);
          }
          Err(err) => {
            tracing::error!(key = %self.key, %err, "failed to serialize fetch result");
            self.data = Some(data);
          }
        }
        true
      }
      Ok((_, Err(error))) => {
        // Keep stale-but-present data; only the error changes.
        self.is_loading = false;
        self.receiver = None;
        self.error = Some(error);
        true
      }
      Err(mpsc::error::TryRecvError::Empty) => false,
      Err(mpsc::error::TryRecvError::Disconnected) => {
        self.is_loading = false;
        self.receiver = None;
        self.error = Some(ApiError::Network("query was cancelled".to_string()));
        true
      }
    }
  }

  /// Re-read `data` from the cache after an external write (an optimistic
  /// patch, another observer's fetch, a rollback). Call when the cache
  /// broadcasts a change for this key; if the entry went stale, this follows
  /// up with `ensure()`.
  pub fn refresh_from_cache(&mut self) {
    self.data = self.cache.read(&self.key);
    let stale = self
      .cache
      .entry_info(&self.key)
      .map(|info| info.is_stale)
      .unwrap_or(false);
    if stale {
      self.ensure();
    }
  }

  fn start_fetch(&mut self) {
    let (tx, rx) = mpsc::unbounded_channel();
    self.receiver = Some(rx);
    self.is_loading = true;

    let ticket = self.cache.begin_fetch();
    let future = (self.fetcher)();
    tokio::spawn(async move {
      let result = future.await;
      // Ignore send errors - receiver may have been dropped
      let _ = tx.send((ticket, result));
    });
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for CachedQuery<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CachedQuery")
      .field("key", &self.key)
      .field("data", &self.data)
      .field("is_loading", &self.is_loading)
      .field("error", &self.error)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  fn test_cache() -> Arc<QueryCache> {
    Arc::new(QueryCache::new())
  }

  #[tokio::test]
  async fn test_fetch_success_writes_cache() {
    let cache = test_cache();
    let key = QueryKey::root("products");
    let mut query = CachedQuery::new(cache.clone(), key.clone(), || async { Ok(vec![1, 2, 3]) });

    query.ensure();
    assert!(query.is_loading());

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(query.poll());
    assert_eq!(query.data(), Some(&vec![1, 2, 3]));
    assert!(!query.is_loading());
    assert_eq!(cache.read::<Vec<i32>>(&key), Some(vec![1, 2, 3]));
  }

  #[tokio::test]
  async fn test_failed_refetch_keeps_stale_data() {
    let cache = test_cache();
    let key = QueryKey::root("products");
    cache.write(&key, &vec![7]);
    cache.invalidate_prefix(&key);

    let mut query: CachedQuery<Vec<i32>> = CachedQuery::new(cache, key, || async {
      Err(ApiError::Network("unreachable".to_string()))
    });
    assert_eq!(query.data(), Some(&vec![7]));

    query.ensure();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(query.poll());

    // Data must not flicker to empty; the error is reported alongside.
    assert_eq!(query.data(), Some(&vec![7]));
    assert!(query.error().unwrap().is_network());
  }

  #[tokio::test]
  async fn test_ensure_skips_fresh_entry() {
    let cache = test_cache();
    let key = QueryKey::root("contacts");
    cache.write(&key, &vec![1]);

    let mut query: CachedQuery<Vec<i32>> = CachedQuery::new(cache, key, || async { Ok(vec![99]) });
    query.ensure();
    assert!(!query.is_loading(), "fresh entry must not refetch");
    assert_eq!(query.data(), Some(&vec![1]));
  }

  #[tokio::test]
  async fn test_ensure_while_loading_is_noop() {
    let cache = test_cache();
    let key = QueryKey::root("products");
    let mut query: CachedQuery<Vec<i32>> = CachedQuery::new(cache, key, || async {
      tokio::time::sleep(Duration::from_millis(100)).await;
      Ok(vec![1])
    });

    query.ensure();
    assert!(query.is_loading());
    query.ensure();
    assert!(query.is_loading());
  }

  #[tokio::test]
  async fn test_query_marks_key_observed() {
    let cache = test_cache();
    let key = QueryKey::root("products");
    let query: CachedQuery<Vec<i32>> =
      CachedQuery::new(cache.clone(), key.clone(), || async { Ok(vec![]) });
    assert!(cache.is_observed(&key));
    drop(query);
    assert!(!cache.is_observed(&key));
  }
}
