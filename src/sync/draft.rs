//! Draft autosave: debounced background persistence of in-progress
//! transaction forms.
//!
//! The controller keeps work alive across reloads without spamming the
//! network: changes are content-signed and debounced, the first successful
//! save creates the server draft and pins its id for the rest of the form
//! session, later saves update that id in place, and saves never overlap.
//! Autosave failures are logged and swallowed — a broken autosave must never
//! block the user from editing or submitting the real transaction.

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::api::types::{
  CreateDraftRequest, Draft, DraftPayload, TransactionKind, UpdateDraftRequest,
};
use crate::api::ApiClient;
use crate::debounce::Debouncer;
use crate::error::ApiError;

/// Transport seam for draft persistence, so the controller is testable
/// without sockets. `ApiClient` is the production implementation.
pub trait DraftTransport: Clone + Send + Sync + 'static {
  fn create_draft(
    &self,
    req: CreateDraftRequest,
  ) -> impl Future<Output = Result<Draft, ApiError>> + Send;

  fn update_draft(
    &self,
    id: i64,
    req: UpdateDraftRequest,
  ) -> impl Future<Output = Result<Draft, ApiError>> + Send;

  fn delete_draft(&self, id: i64) -> impl Future<Output = Result<(), ApiError>> + Send;
}

impl DraftTransport for ApiClient {
  fn create_draft(
    &self,
    req: CreateDraftRequest,
  ) -> impl Future<Output = Result<Draft, ApiError>> + Send {
    let client = self.clone();
    async move { ApiClient::create_draft(&client, &req).await }
  }

  fn update_draft(
    &self,
    id: i64,
    req: UpdateDraftRequest,
  ) -> impl Future<Output = Result<Draft, ApiError>> + Send {
    let client = self.clone();
    async move { ApiClient::update_draft(&client, id, &req).await }
  }

  fn delete_draft(&self, id: i64) -> impl Future<Output = Result<(), ApiError>> + Send {
    let client = self.clone();
    async move { ApiClient::delete_draft(&client, id).await }
  }
}

#[derive(Debug, Clone)]
pub struct AutosaveConfig {
  pub enabled: bool,
  /// Quiet period between the last change and the save it triggers.
  pub quiet_period: Duration,
}

impl Default for AutosaveConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      quiet_period: Duration::from_millis(3000),
    }
  }
}

#[derive(Debug, Default)]
struct AutosaveState {
  draft_id: Option<i64>,
  last_saved_signature: Option<String>,
  is_saving: bool,
  pending: Option<DraftPayload>,
}

/// One controller per open transaction form.
pub struct DraftAutosave<C: DraftTransport> {
  transport: C,
  kind: TransactionKind,
  config: AutosaveConfig,
  state: Arc<Mutex<AutosaveState>>,
  debouncer: Debouncer,
}

impl<C: DraftTransport> DraftAutosave<C> {
  pub fn new(transport: C, kind: TransactionKind) -> Self {
    Self::with_config(transport, kind, AutosaveConfig::default())
  }

  pub fn with_config(transport: C, kind: TransactionKind, config: AutosaveConfig) -> Self {
    let debouncer = Debouncer::new(config.quiet_period);
    Self {
      transport,
      kind,
      config,
      state: Arc::new(Mutex::new(AutosaveState::default())),
      debouncer,
    }
  }

  /// The durable server handle, once the first save has happened.
  pub fn current_draft_id(&self) -> Option<i64> {
    self.lock_state().draft_id
  }

  pub fn is_saving(&self) -> bool {
    self.lock_state().is_saving
  }

  /// Report a form-data change; schedules a debounced save when warranted.
  pub fn on_change(&self, payload: &DraftPayload) {
    if !self.config.enabled || !payload.has_meaningful_content() {
      return;
    }

    let signature = payload_signature(payload);
    {
      let mut state = self.lock_state();
      // Redundant writes suppressed, including ones from unrelated re-renders.
      if state.last_saved_signature.as_deref() == Some(signature.as_str()) {
        return;
      }
      state.pending = Some(payload.clone());
    }

    let transport = self.transport.clone();
    let kind = self.kind;
    let state = Arc::clone(&self.state);
    self
      .debouncer
      .schedule(async move { save_pending(transport, kind, state).await });
  }

  /// Persist the pending payload immediately, bypassing the debounce.
  pub async fn save_now(&self) {
    self.debouncer.cancel();
    save_pending(self.transport.clone(), self.kind, Arc::clone(&self.state)).await;
  }

  /// Teardown: cancel any pending timer, delete the server-side draft, and
  /// reset to first-save state. Used after successful submission or an
  /// explicit discard.
  pub async fn discard(&self) {
    self.debouncer.cancel();
    let draft_id = {
      let mut state = self.lock_state();
      state.pending = None;
      state.last_saved_signature = None;
      state.is_saving = false;
      state.draft_id.take()
    };

    if let Some(id) = draft_id {
      if let Err(err) = self.transport.delete_draft(id).await {
        tracing::warn!(draft_id = id, %err, "failed to delete draft on teardown");
      }
    }
  }

  fn lock_state(&self) -> std::sync::MutexGuard<'_, AutosaveState> {
    self.state.lock().unwrap_or_else(|e| e.into_inner())
  }
}

/// Clears `is_saving` when the save finishes or its future is dropped; a save
/// torn down mid-flight must not leave the single-flight gate shut forever.
struct InFlightGuard {
  state: Arc<Mutex<AutosaveState>>,
}

impl Drop for InFlightGuard {
  fn drop(&mut self) {
    self.state.lock().unwrap_or_else(|e| e.into_inner()).is_saving = false;
  }
}

async fn save_pending<C: DraftTransport>(
  transport: C,
  kind: TransactionKind,
  state: Arc<Mutex<AutosaveState>>,
) {
  // Single-flight: an attempt while a save is in flight is dropped, not
  // queued; the pending payload stays put for the next trigger.
  let (payload, draft_id) = {
    let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
    if state.is_saving {
      return;
    }
    let Some(payload) = state.pending.take() else {
      return;
    };
    state.is_saving = true;
    (payload, state.draft_id)
  };
  let _in_flight = InFlightGuard {
    state: Arc::clone(&state),
  };

  let signature = payload_signature(&payload);
  let result = match draft_id {
    Some(id) => {
      transport
        .update_draft(
          id,
          UpdateDraftRequest {
            name: None,
            data: Some(payload),
          },
        )
        .await
    }
    None => {
      transport
        .create_draft(CreateDraftRequest {
          kind,
          name: draft_name(kind),
          data: payload,
        })
        .await
    }
  };

  let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
  match result {
    Ok(draft) => {
      state.draft_id = Some(draft.id);
      state.last_saved_signature = Some(signature);
    }
    Err(err) => {
      // Swallowed: the form stays usable and the next change retries.
      tracing::warn!(%err, "draft autosave failed; will retry on next change");
    }
  }
}

/// Content signature: sha256 over the deterministic JSON serialization.
fn payload_signature(payload: &DraftPayload) -> String {
  let serialized = serde_json::to_string(payload).unwrap_or_default();
  let mut hasher = Sha256::new();
  hasher.update(serialized.as_bytes());
  hex::encode(hasher.finalize())
}

fn draft_name(kind: TransactionKind) -> String {
  format!("{} draft {}", kind.label(), Utc::now().format("%Y-%m-%d"))
}
