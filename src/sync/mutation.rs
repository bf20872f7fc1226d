//! Optimistic mutation engine.
//!
//! Each mutation invocation runs one strict sequence against the cache:
//! snapshot the affected entries, apply the optimistic patches, issue the
//! network call, then either commit (reconcile placeholders, invalidate
//! dependents) or roll back every snapshot so no partial patch stays visible.
//!
//! Mutations of different types may be pending at once; two mutations of the
//! same logical target are not coalesced — each runs its own cycle and the
//! last one to complete wins in the cache. That is an accepted tradeoff, not
//! a serializability guarantee.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::cache::{QueryCache, QueryKey};
use crate::error::ApiError;

use super::invalidation::{EntityChange, InvalidationGraph};

static NEXT_TEMP_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a temp id for an optimistic placeholder. Process-wide counter;
/// never derived from wall-clock time, so reconciliation cannot misfire under
/// clock skew or fast round-trips.
pub fn next_temp_id() -> u64 {
  NEXT_TEMP_ID.fetch_add(1, Ordering::SeqCst)
}

/// A list element that knows whether the server has confirmed it.
///
/// Placeholders are purged by tag and temp id, never by value equality —
/// an optimistic entity and its confirmed counterpart differ in most fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Tracked<T> {
  /// Locally synthesized, awaiting server confirmation.
  Optimistic { temp_id: u64, entity: T },
  /// Authoritative server state.
  Confirmed { entity: T },
}

impl<T> Tracked<T> {
  pub fn confirmed(entity: T) -> Self {
    Tracked::Confirmed { entity }
  }

  pub fn optimistic(temp_id: u64, entity: T) -> Self {
    Tracked::Optimistic { temp_id, entity }
  }

  pub fn entity(&self) -> &T {
    match self {
      Tracked::Optimistic { entity, .. } => entity,
      Tracked::Confirmed { entity } => entity,
    }
  }

  pub fn is_optimistic(&self) -> bool {
    matches!(self, Tracked::Optimistic { .. })
  }
}

/// Wrap a server list as confirmed entries for the cache.
pub fn confirm_all<T>(entities: Vec<T>) -> Vec<Tracked<T>> {
  entities.into_iter().map(Tracked::confirmed).collect()
}

/// One optimistic edit to one cache entry.
pub struct OptimisticStep {
  pub key: QueryKey,
  pub apply: Box<dyn FnOnce(Option<Value>) -> Option<Value> + Send>,
}

/// Everything a mutation declares up front: which entries it may touch,
/// the optimistic patches, how to reconcile on success, and which entity
/// changes feed the invalidation graph afterwards.
pub struct MutationPlan<T> {
  pub affected: Vec<QueryKey>,
  pub optimistic: Vec<OptimisticStep>,
  pub reconcile: Option<Box<dyn FnOnce(&QueryCache, &T) + Send>>,
  pub changes: Vec<EntityChange>,
}

impl<T> MutationPlan<T> {
  pub fn new(affected: Vec<QueryKey>) -> Self {
    Self {
      affected,
      optimistic: Vec::new(),
      reconcile: None,
      changes: Vec::new(),
    }
  }

  pub fn step(
    mut self,
    key: QueryKey,
    apply: impl FnOnce(Option<Value>) -> Option<Value> + Send + 'static,
  ) -> Self {
    self.optimistic.push(OptimisticStep {
      key,
      apply: Box::new(apply),
    });
    self
  }

  pub fn on_commit(mut self, reconcile: impl FnOnce(&QueryCache, &T) + Send + 'static) -> Self {
    self.reconcile = Some(Box::new(reconcile));
    self
  }

  pub fn changes(mut self, changes: Vec<EntityChange>) -> Self {
    self.changes = changes;
    self
  }
}

/// Runs mutations with snapshot/apply/commit/rollback semantics.
pub struct MutationEngine {
  cache: Arc<QueryCache>,
  graph: InvalidationGraph,
}

impl MutationEngine {
  pub fn new(cache: Arc<QueryCache>) -> Self {
    Self {
      cache,
      graph: InvalidationGraph,
    }
  }

  pub fn cache(&self) -> &Arc<QueryCache> {
    &self.cache
  }

  /// Execute one mutation: Pending on entry, Committed or RolledBack on exit.
  pub async fn run<T, Fut>(&self, plan: MutationPlan<T>, request: Fut) -> Result<T, ApiError>
  where
    Fut: Future<Output = Result<T, ApiError>>,
  {
    let snapshot = self.cache.snapshot(&plan.affected);
    for step in plan.optimistic {
      self.cache.patch(&step.key, step.apply);
    }

    match request.await {
      Ok(confirmed) => {
        if let Some(reconcile) = plan.reconcile {
          reconcile(&self.cache, &confirmed);
        }
        for change in &plan.changes {
          for key in self.graph.keys_for(change) {
            self.cache.invalidate_prefix(&key);
          }
        }
        Ok(confirmed)
      }
      Err(error) => {
        // Every snapshot restored before the error surfaces; the UI never
        // observes a half-rolled-back cache.
        self.cache.restore(snapshot);
        tracing::debug!(%error, "mutation rolled back");
        Err(error)
      }
    }
  }
}

// ============================================================================
// Value-level list patch helpers
// ============================================================================

fn items_of(data: Option<Value>) -> Vec<Value> {
  match data {
    Some(Value::Array(items)) => items,
    _ => Vec::new(),
  }
}

/// Append an optimistic placeholder to a tracked list.
pub fn append_placeholder<T: Serialize>(temp_id: u64, entity: &T) -> impl FnOnce(Option<Value>) -> Option<Value> + Send {
  let placeholder = json!({
    "kind": "optimistic",
    "temp_id": temp_id,
    "entity": serde_json::to_value(entity).unwrap_or(Value::Null),
  });
  move |data| {
    let mut items = items_of(data);
    items.push(placeholder);
    Some(Value::Array(items))
  }
}

/// Remove the entry whose entity has the given `id` field value.
pub fn remove_by_id(id: i64) -> impl FnOnce(Option<Value>) -> Option<Value> + Send {
  move |data| {
    let mut items = items_of(data);
    items.retain(|item| entity_id(item) != Some(id));
    Some(Value::Array(items))
  }
}

/// Shallow-merge `patch` into the entity with the given `id` field value.
pub fn merge_by_id(id: i64, patch: Value) -> impl FnOnce(Option<Value>) -> Option<Value> + Send {
  move |data| {
    let mut items = items_of(data);
    for item in &mut items {
      if entity_id(item) == Some(id) {
        if let (Some(Value::Object(entity)), Value::Object(fields)) =
          (item.get_mut("entity"), &patch)
        {
          for (k, v) in fields {
            entity.insert(k.clone(), v.clone());
          }
        }
        break;
      }
    }
    Some(Value::Array(items))
  }
}

/// Purge the placeholder with `temp_id` from the list at `key` and insert the
/// server-confirmed entity in its place.
pub fn confirm_into_list<T: Serialize>(cache: &QueryCache, key: &QueryKey, temp_id: u64, entity: &T) {
  let confirmed = json!({
    "kind": "confirmed",
    "entity": serde_json::to_value(entity).unwrap_or(Value::Null),
  });
  cache.patch(key, move |data| {
    let mut items = items_of(data);
    items.retain(|item| {
      !(item.get("kind").and_then(Value::as_str) == Some("optimistic")
        && item.get("temp_id").and_then(Value::as_u64) == Some(temp_id))
    });
    items.push(confirmed);
    Some(Value::Array(items))
  });
}

/// Shallow-merge `patch` into a plain cached object (a detail entry).
pub fn merge_object(patch: Value) -> impl FnOnce(Option<Value>) -> Option<Value> + Send {
  move |data| match data {
    Some(Value::Object(mut obj)) => {
      if let Value::Object(fields) = &patch {
        for (k, v) in fields {
          obj.insert(k.clone(), v.clone());
        }
      }
      Some(Value::Object(obj))
    }
    other => other,
  }
}

/// Drop an entry's data (an optimistic delete of a detail entry).
pub fn clear_entry() -> impl FnOnce(Option<Value>) -> Option<Value> + Send {
  |_| None
}

fn entity_id(item: &Value) -> Option<i64> {
  item.get("entity").and_then(|e| e.get("id")).and_then(Value::as_i64)
}

// ============================================================================
// Poll-based mutation handle
// ============================================================================

/// Observable state of a spawned mutation.
#[derive(Debug, Clone)]
pub enum MutationState<T> {
  Idle,
  Pending,
  Committed(T),
  Failed(ApiError),
}

/// A spawned mutation whose completion is observed by polling, for hosts that
/// render between event-loop ticks rather than awaiting the call inline.
pub struct MutationTask<T> {
  state: MutationState<T>,
  receiver: Option<mpsc::UnboundedReceiver<Result<T, ApiError>>>,
}

impl<T: Send + 'static> MutationTask<T> {
  pub fn idle() -> Self {
    Self {
      state: MutationState::Idle,
      receiver: None,
    }
  }

  /// Spawn `fut` and transition to Pending.
  pub fn spawn<Fut>(fut: Fut) -> Self
  where
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
  {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
      let _ = tx.send(fut.await);
    });
    Self {
      state: MutationState::Pending,
      receiver: Some(rx),
    }
  }

  pub fn state(&self) -> &MutationState<T> {
    &self.state
  }

  pub fn is_pending(&self) -> bool {
    matches!(self.state, MutationState::Pending)
  }

  pub fn error(&self) -> Option<&ApiError> {
    match &self.state {
      MutationState::Failed(e) => Some(e),
      _ => None,
    }
  }

  /// Returns true when the state changed.
  pub fn poll(&mut self) -> bool {
    let receiver = match &mut self.receiver {
      Some(rx) => rx,
      None => return false,
    };
    match receiver.try_recv() {
      Ok(Ok(value)) => {
        self.state = MutationState::Committed(value);
        self.receiver = None;
        true
      }
      Ok(Err(error)) => {
        self.state = MutationState::Failed(error);
        self.receiver = None;
        true
      }
      Err(mpsc::error::TryRecvError::Empty) => false,
      Err(mpsc::error::TryRecvError::Disconnected) => {
        self.state = MutationState::Failed(ApiError::Network("mutation was cancelled".to_string()));
        self.receiver = None;
        true
      }
    }
  }
}
