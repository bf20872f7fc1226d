//! Typed HTTP client for the inventory and billing server.
//!
//! Pure transport: translates method calls into requests, unwraps the
//! response envelope, and normalizes list shapes. It never touches the query
//! cache — reconciliation is the mutation engine's job.

use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use url::Url;

use crate::cache::ListFilters;
use crate::error::ApiError;

use super::types::{
  Contact, ContactPatch, Container, ContainerPatch, ContainerProduct, CreateDraftRequest, Draft,
  InventoryAnalytics, NewContact, NewContainer, NewProduct, NewTransaction, Product, ProductPatch,
  SetContainerProductsRequest, TransactionRecord, UpdateDraftRequest,
};
use super::wire::{self, Envelope, ListShape};

/// Callback fired when the server answers 401: clear credentials, go to
/// login. Fired once per failed request; the error still propagates.
pub type SessionGuard = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base: Url,
  token: Option<String>,
  on_unauthorized: Option<SessionGuard>,
}

impl ApiClient {
  pub fn new(base_url: &str) -> Result<Self, ApiError> {
    let mut base =
      Url::parse(base_url).map_err(|e| ApiError::Validation(format!("invalid base url: {e}")))?;
    // Joining relative paths needs a trailing slash on the base.
    if !base.path().ends_with('/') {
      base.set_path(&format!("{}/", base.path()));
    }

    Ok(Self {
      http: reqwest::Client::new(),
      base,
      token: None,
      on_unauthorized: None,
    })
  }

  pub fn with_token(mut self, token: impl Into<String>) -> Self {
    self.token = Some(token.into());
    self
  }

  pub fn with_session_guard(mut self, guard: SessionGuard) -> Self {
    self.on_unauthorized = Some(guard);
    self
  }

  // ==========================================================================
  // Products
  // ==========================================================================

  pub async fn list_products(&self, filters: Option<&ListFilters>) -> Result<Vec<Product>, ApiError> {
    self.get_list("products", filters).await
  }

  pub async fn get_product(&self, id: i64) -> Result<Product, ApiError> {
    self.request(Method::GET, &format!("products/{id}"), None::<&()>).await
  }

  pub async fn create_product(&self, new: &NewProduct) -> Result<Product, ApiError> {
    self.request(Method::POST, "products", Some(new)).await
  }

  pub async fn update_product(&self, id: i64, patch: &ProductPatch) -> Result<Product, ApiError> {
    self.request(Method::PUT, &format!("products/{id}"), Some(patch)).await
  }

  pub async fn delete_product(&self, id: i64) -> Result<(), ApiError> {
    self.request_ack(Method::DELETE, &format!("products/{id}"), None::<&()>).await
  }

  // ==========================================================================
  // Containers
  // ==========================================================================

  pub async fn list_containers(
    &self,
    filters: Option<&ListFilters>,
  ) -> Result<Vec<Container>, ApiError> {
    self.get_list("containers", filters).await
  }

  pub async fn get_container(&self, id: i64) -> Result<Container, ApiError> {
    self.request(Method::GET, &format!("containers/{id}"), None::<&()>).await
  }

  pub async fn create_container(&self, new: &NewContainer) -> Result<Container, ApiError> {
    self.request(Method::POST, "containers", Some(new)).await
  }

  pub async fn update_container(
    &self,
    id: i64,
    patch: &ContainerPatch,
  ) -> Result<Container, ApiError> {
    self.request(Method::PUT, &format!("containers/{id}"), Some(patch)).await
  }

  pub async fn delete_container(&self, id: i64) -> Result<(), ApiError> {
    self.request_ack(Method::DELETE, &format!("containers/{id}"), None::<&()>).await
  }

  // ==========================================================================
  // Contacts
  // ==========================================================================

  pub async fn list_contacts(&self, filters: Option<&ListFilters>) -> Result<Vec<Contact>, ApiError> {
    self.get_list("contacts", filters).await
  }

  pub async fn get_contact(&self, id: i64) -> Result<Contact, ApiError> {
    self.request(Method::GET, &format!("contacts/{id}"), None::<&()>).await
  }

  pub async fn create_contact(&self, new: &NewContact) -> Result<Contact, ApiError> {
    self.request(Method::POST, "contacts", Some(new)).await
  }

  pub async fn update_contact(&self, id: i64, patch: &ContactPatch) -> Result<Contact, ApiError> {
    self.request(Method::PUT, &format!("contacts/{id}"), Some(patch)).await
  }

  pub async fn delete_contact(&self, id: i64) -> Result<(), ApiError> {
    self.request_ack(Method::DELETE, &format!("contacts/{id}"), None::<&()>).await
  }

  // ==========================================================================
  // Transactions
  // ==========================================================================

  pub async fn list_transactions(
    &self,
    filters: Option<&ListFilters>,
  ) -> Result<Vec<TransactionRecord>, ApiError> {
    self.get_list("transactions", filters).await
  }

  pub async fn get_transaction(&self, id: i64) -> Result<TransactionRecord, ApiError> {
    self.request(Method::GET, &format!("transactions/{id}"), None::<&()>).await
  }

  pub async fn create_transaction(&self, new: &NewTransaction) -> Result<TransactionRecord, ApiError> {
    if new.items.is_empty() {
      return Err(ApiError::Validation(
        "a transaction needs at least one item".to_string(),
      ));
    }
    self.request(Method::POST, "transactions", Some(new)).await
  }

  // ==========================================================================
  // Inventory links & analytics
  // ==========================================================================

  pub async fn container_products(&self, container_id: i64) -> Result<Vec<ContainerProduct>, ApiError> {
    self.get_list(&format!("containers/{container_id}/products"), None).await
  }

  pub async fn product_containers(&self, product_id: i64) -> Result<Vec<ContainerProduct>, ApiError> {
    self.get_list(&format!("products/{product_id}/containers"), None).await
  }

  pub async fn product_total_quantity(&self, product_id: i64) -> Result<f64, ApiError> {
    self
      .request(Method::GET, &format!("products/{product_id}/total-quantity"), None::<&()>)
      .await
  }

  /// Assign quantities for a container's products; quantity 0 soft-removes
  /// the relationship.
  pub async fn set_container_products(
    &self,
    req: &SetContainerProductsRequest,
  ) -> Result<(), ApiError> {
    self.request_ack(Method::POST, "container-products", Some(req)).await
  }

  pub async fn inventory_analytics(&self) -> Result<InventoryAnalytics, ApiError> {
    self.request(Method::GET, "analytics/inventory", None::<&()>).await
  }

  // ==========================================================================
  // Drafts
  // ==========================================================================

  pub async fn list_drafts(&self) -> Result<Vec<Draft>, ApiError> {
    self.get_list("drafts", None).await
  }

  pub async fn create_draft(&self, req: &CreateDraftRequest) -> Result<Draft, ApiError> {
    self.request(Method::POST, "drafts", Some(req)).await
  }

  pub async fn update_draft(&self, id: i64, req: &UpdateDraftRequest) -> Result<Draft, ApiError> {
    self.request(Method::PUT, &format!("drafts/{id}"), Some(req)).await
  }

  pub async fn delete_draft(&self, id: i64) -> Result<(), ApiError> {
    self.request_ack(Method::DELETE, &format!("drafts/{id}"), None::<&()>).await
  }

  /// Fetch a draft with item product/container references hydrated to full
  /// objects server-side, avoiding N+1 client fetches.
  pub async fn get_complete_draft(&self, id: i64) -> Result<Draft, ApiError> {
    self.request(Method::GET, &format!("drafts/{id}/complete"), None::<&()>).await
  }

  // ==========================================================================
  // Request plumbing
  // ==========================================================================

  async fn get_list<T: DeserializeOwned>(
    &self,
    path: &str,
    filters: Option<&ListFilters>,
  ) -> Result<Vec<T>, ApiError> {
    let mut url = self.endpoint(path)?;
    if let Some(filters) = filters {
      let pairs = filters.to_query_pairs();
      if !pairs.is_empty() {
        url.query_pairs_mut().extend_pairs(pairs);
      }
    }

    let body = self.execute(self.http.request(Method::GET, url)).await?;
    let list: ListShape<T> = wire::parse_envelope(&body.bytes, body.status)?;
    Ok(list.into_vec())
  }

  async fn request<T: DeserializeOwned>(
    &self,
    method: Method,
    path: &str,
    body: Option<&impl Serialize>,
  ) -> Result<T, ApiError> {
    let response = self.send(method, path, body).await?;
    wire::parse_envelope(&response.bytes, response.status)
  }

  /// Request where only the envelope's success flag matters (deletes, acks).
  async fn request_ack(
    &self,
    method: Method,
    path: &str,
    body: Option<&impl Serialize>,
  ) -> Result<(), ApiError> {
    let response = self.send(method, path, body).await?;
    let envelope: Envelope<serde_json::Value> =
      serde_json::from_slice(&response.bytes).map_err(|e| ApiError::Decode(e.to_string()))?;
    if !envelope.success {
      return Err(ApiError::Http {
        status: response.status,
        detail: envelope
          .message
          .unwrap_or_else(|| "server rejected the request".to_string()),
      });
    }
    Ok(())
  }

  async fn send(
    &self,
    method: Method,
    path: &str,
    body: Option<&impl Serialize>,
  ) -> Result<RawResponse, ApiError> {
    let url = self.endpoint(path)?;
    let mut req = self.http.request(method, url);
    if let Some(body) = body {
      req = req.json(body);
    }
    self.execute(req).await
  }

  async fn execute(&self, mut req: reqwest::RequestBuilder) -> Result<RawResponse, ApiError> {
    if let Some(token) = &self.token {
      req = req.bearer_auth(token);
    }

    let response = req.send().await.map_err(ApiError::from)?;
    let status = response.status();
    let bytes = response.bytes().await.map_err(ApiError::from)?.to_vec();

    if status == StatusCode::UNAUTHORIZED {
      if let Some(guard) = &self.on_unauthorized {
        guard();
      }
    }

    if !status.is_success() {
      // Prefer the server's own message when the error body is enveloped.
      let detail = serde_json::from_slice::<Envelope<serde_json::Value>>(&bytes)
        .ok()
        .and_then(|e| e.message)
        .unwrap_or_else(|| {
          status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
        });
      return Err(ApiError::Http {
        status: status.as_u16(),
        detail,
      });
    }

    Ok(RawResponse {
      status: status.as_u16(),
      bytes,
    })
  }

  fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
    self
      .base
      .join(path.trim_start_matches('/'))
      .map_err(|e| ApiError::Validation(format!("invalid endpoint path {path}: {e}")))
  }
}

impl std::fmt::Debug for ApiClient {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ApiClient")
      .field("base", &self.base.as_str())
      .field("has_token", &self.token.is_some())
      .finish_non_exhaustive()
  }
}

struct RawResponse {
  status: u16,
  bytes: Vec<u8>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_base_url_gets_trailing_slash() {
    let client = ApiClient::new("http://localhost:4000/api").unwrap();
    let url = client.endpoint("products/7").unwrap();
    assert_eq!(url.as_str(), "http://localhost:4000/api/products/7");
  }

  #[test]
  fn test_invalid_base_url_is_validation_error() {
    let err = ApiClient::new("not a url").unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
  }

  #[tokio::test]
  async fn test_unroutable_host_is_network_error() {
    // Port 1 on loopback: connection refused, no response.
    let client = ApiClient::new("http://127.0.0.1:1/api").unwrap();
    let err = client.list_products(None).await.unwrap_err();
    assert!(err.is_network(), "expected Network, got {err:?}");
  }

  #[tokio::test]
  async fn test_unauthorized_fires_session_guard_once() {
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      let (mut socket, _) = listener.accept().await.unwrap();
      let mut buf = [0u8; 1024];
      let _ = socket.read(&mut buf).await;
      let body = r#"{"success": false, "message": "token expired"}"#;
      let response = format!(
        "HTTP/1.1 401 Unauthorized\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
      );
      let _ = socket.write_all(response.as_bytes()).await;
    });

    let fired = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&fired);
    let client = ApiClient::new(&format!("http://{addr}/api"))
      .unwrap()
      .with_token("stale-token")
      .with_session_guard(Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
      }));

    let err = client.list_products(None).await.unwrap_err();
    assert!(err.is_status(401), "expected 401, got {err:?}");
    match err {
      ApiError::Http { detail, .. } => assert_eq!(detail, "token expired"),
      other => panic!("expected Http error, got {other:?}"),
    }
    assert_eq!(fired.load(Ordering::SeqCst), 1, "guard must fire exactly once");
  }

  #[tokio::test]
  async fn test_local_validation_never_reaches_network() {
    let client = ApiClient::new("http://127.0.0.1:1/api").unwrap();
    let err = client
      .create_transaction(&NewTransaction {
        kind: super::super::types::TransactionKind::Sale,
        contact_id: Some(1),
        transaction_date: None,
        items: Vec::new(),
        tax_percent: 0.0,
        discount_amount: 0.0,
        paid_amount: 0.0,
        payment_method: None,
        notes: None,
      })
      .await
      .unwrap_err();
    // An empty item list is rejected locally, not as a network failure.
    assert!(matches!(err, ApiError::Validation(_)));
  }
}
