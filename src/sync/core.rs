//! `SyncCore`: the application root of the synchronization layer.
//!
//! Owns the injected query cache, the API client, and the mutation engine,
//! and exposes the hook surface UI layers consume: query hooks returning
//! `CachedQuery` observers, async mutation hooks with optimistic wiring, and
//! the draft autosave constructor. One `SyncCore` per application (or per
//! test harness, for isolation).

use serde_json::Value;
use std::sync::Arc;

use crate::api::types::{
  Contact, ContactPatch, Container, ContainerPatch, ContainerProduct, ContainerQuantity, Draft,
  InventoryAnalytics, NewContact, NewContainer, NewProduct, NewTransaction, Product, ProductPatch,
  SetContainerProductsRequest, TransactionKind, TransactionRecord,
};
use crate::api::ApiClient;
use crate::cache::{ListFilters, QueryCache, QueryKey};
use crate::error::ApiError;
use crate::query::CachedQuery;

use super::draft::{AutosaveConfig, DraftAutosave};
use super::invalidation::{resources::*, EntityChange};
use super::mutation::{
  append_placeholder, clear_entry, confirm_all, confirm_into_list, merge_by_id, merge_object,
  next_temp_id, remove_by_id, MutationEngine, MutationPlan, Tracked,
};

pub struct SyncCore {
  client: ApiClient,
  engine: MutationEngine,
  autosave: AutosaveConfig,
}

impl SyncCore {
  /// Build a core with a fresh cache.
  pub fn new(client: ApiClient) -> Self {
    Self::with_cache(client, Arc::new(QueryCache::new()))
  }

  /// Build a core around an existing cache instance (shared or per-test).
  pub fn with_cache(client: ApiClient, cache: Arc<QueryCache>) -> Self {
    Self {
      client,
      engine: MutationEngine::new(cache),
      autosave: AutosaveConfig::default(),
    }
  }

  pub fn with_autosave_config(mut self, autosave: AutosaveConfig) -> Self {
    self.autosave = autosave;
    self
  }

  pub fn cache(&self) -> &Arc<QueryCache> {
    self.engine.cache()
  }

  pub fn client(&self) -> &ApiClient {
    &self.client
  }

  // ==========================================================================
  // Query hooks
  // ==========================================================================

  pub fn product_list(&self, filters: Option<ListFilters>) -> CachedQuery<Vec<Tracked<Product>>> {
    let key = QueryKey::list(PRODUCTS, filters.as_ref());
    let client = self.client.clone();
    CachedQuery::new(Arc::clone(self.cache()), key, move || {
      let client = client.clone();
      let filters = filters.clone();
      async move { Ok(confirm_all(client.list_products(filters.as_ref()).await?)) }
    })
  }

  pub fn product(&self, id: i64) -> CachedQuery<Product> {
    let client = self.client.clone();
    CachedQuery::new(Arc::clone(self.cache()), QueryKey::detail(PRODUCTS, id), move || {
      let client = client.clone();
      async move { client.get_product(id).await }
    })
  }

  pub fn container_list(&self, filters: Option<ListFilters>) -> CachedQuery<Vec<Tracked<Container>>> {
    let key = QueryKey::list(CONTAINERS, filters.as_ref());
    let client = self.client.clone();
    CachedQuery::new(Arc::clone(self.cache()), key, move || {
      let client = client.clone();
      let filters = filters.clone();
      async move { Ok(confirm_all(client.list_containers(filters.as_ref()).await?)) }
    })
  }

  pub fn container(&self, id: i64) -> CachedQuery<Container> {
    let client = self.client.clone();
    CachedQuery::new(Arc::clone(self.cache()), QueryKey::detail(CONTAINERS, id), move || {
      let client = client.clone();
      async move { client.get_container(id).await }
    })
  }

  pub fn contact_list(&self, filters: Option<ListFilters>) -> CachedQuery<Vec<Tracked<Contact>>> {
    let key = QueryKey::list(CONTACTS, filters.as_ref());
    let client = self.client.clone();
    CachedQuery::new(Arc::clone(self.cache()), key, move || {
      let client = client.clone();
      let filters = filters.clone();
      async move { Ok(confirm_all(client.list_contacts(filters.as_ref()).await?)) }
    })
  }

  pub fn contact(&self, id: i64) -> CachedQuery<Contact> {
    let client = self.client.clone();
    CachedQuery::new(Arc::clone(self.cache()), QueryKey::detail(CONTACTS, id), move || {
      let client = client.clone();
      async move { client.get_contact(id).await }
    })
  }

  pub fn transaction_list(
    &self,
    filters: Option<ListFilters>,
  ) -> CachedQuery<Vec<TransactionRecord>> {
    let key = QueryKey::list(TRANSACTIONS, filters.as_ref());
    let client = self.client.clone();
    CachedQuery::new(Arc::clone(self.cache()), key, move || {
      let client = client.clone();
      let filters = filters.clone();
      async move { client.list_transactions(filters.as_ref()).await }
    })
  }

  /// Products stored in one container.
  pub fn container_products(&self, container_id: i64) -> CachedQuery<Vec<ContainerProduct>> {
    let key = QueryKey::detail(CONTAINERS, container_id).with("products");
    let client = self.client.clone();
    CachedQuery::new(Arc::clone(self.cache()), key, move || {
      let client = client.clone();
      async move { client.container_products(container_id).await }
    })
  }

  /// Containers holding one product.
  pub fn product_containers(&self, product_id: i64) -> CachedQuery<Vec<ContainerProduct>> {
    let key = QueryKey::detail(PRODUCTS, product_id).with("containers");
    let client = self.client.clone();
    CachedQuery::new(Arc::clone(self.cache()), key, move || {
      let client = client.clone();
      async move { client.product_containers(product_id).await }
    })
  }

  pub fn product_total_quantity(&self, product_id: i64) -> CachedQuery<f64> {
    let key = QueryKey::detail(PRODUCTS, product_id).with("total-quantity");
    let client = self.client.clone();
    CachedQuery::new(Arc::clone(self.cache()), key, move || {
      let client = client.clone();
      async move { client.product_total_quantity(product_id).await }
    })
  }

  pub fn inventory_analytics(&self) -> CachedQuery<InventoryAnalytics> {
    let client = self.client.clone();
    CachedQuery::new(Arc::clone(self.cache()), QueryKey::root(INVENTORY_ANALYTICS), move || {
      let client = client.clone();
      async move { client.inventory_analytics().await }
    })
  }

  pub fn drafts(&self) -> CachedQuery<Vec<Draft>> {
    let client = self.client.clone();
    CachedQuery::new(Arc::clone(self.cache()), QueryKey::root(DRAFTS), move || {
      let client = client.clone();
      async move { client.list_drafts().await }
    })
  }

  /// A draft with item references hydrated server-side.
  pub fn complete_draft(&self, id: i64) -> CachedQuery<Draft> {
    let key = QueryKey::detail(DRAFTS, id).with("complete");
    let client = self.client.clone();
    CachedQuery::new(Arc::clone(self.cache()), key, move || {
      let client = client.clone();
      async move { client.get_complete_draft(id).await }
    })
  }

  // ==========================================================================
  // Mutation hooks
  // ==========================================================================

  pub async fn create_product(&self, new: NewProduct) -> Result<Product, ApiError> {
    let list_key = QueryKey::root(PRODUCTS);
    let temp_id = next_temp_id();
    let placeholder = Product {
      id: 0,
      name: new.name.clone(),
      sku: new.sku.clone(),
      unit: new.unit.clone(),
      sale_price: new.sale_price,
      purchase_price: new.purchase_price,
      total_quantity: None,
      created_at: None,
      updated_at: None,
    };

    let commit_key = list_key.clone();
    let plan = MutationPlan::new(vec![list_key.clone()])
      .step(list_key, append_placeholder(temp_id, &placeholder))
      .on_commit(move |cache, confirmed: &Product| {
        confirm_into_list(cache, &commit_key, temp_id, confirmed);
      })
      .changes(vec![EntityChange::ProductWritten { id: None }]);

    self.engine.run(plan, self.client.create_product(&new)).await
  }

  pub async fn update_product(&self, id: i64, patch: ProductPatch) -> Result<Product, ApiError> {
    let list_key = QueryKey::root(PRODUCTS);
    let detail_key = QueryKey::detail(PRODUCTS, id);
    let fields = serde_json::to_value(&patch).unwrap_or(Value::Null);

    let plan = MutationPlan::new(vec![list_key.clone(), detail_key.clone()])
      .step(list_key, merge_by_id(id, fields.clone()))
      .step(detail_key, merge_object(fields))
      .changes(vec![EntityChange::ProductWritten { id: Some(id) }]);

    self.engine.run(plan, self.client.update_product(id, &patch)).await
  }

  pub async fn delete_product(&self, id: i64) -> Result<(), ApiError> {
    let list_key = QueryKey::root(PRODUCTS);
    let detail_key = QueryKey::detail(PRODUCTS, id);

    let plan = MutationPlan::new(vec![list_key.clone(), detail_key.clone()])
      .step(list_key, remove_by_id(id))
      .step(detail_key, clear_entry())
      .changes(vec![EntityChange::ProductWritten { id: Some(id) }]);

    self.engine.run(plan, self.client.delete_product(id)).await
  }

  pub async fn create_container(&self, new: NewContainer) -> Result<Container, ApiError> {
    let list_key = QueryKey::root(CONTAINERS);
    let temp_id = next_temp_id();
    let placeholder = Container {
      id: 0,
      name: new.name.clone(),
      container_type: new.container_type.clone(),
      location: new.location.clone(),
      created_at: None,
      updated_at: None,
    };

    let commit_key = list_key.clone();
    let plan = MutationPlan::new(vec![list_key.clone()])
      .step(list_key, append_placeholder(temp_id, &placeholder))
      .on_commit(move |cache, confirmed: &Container| {
        confirm_into_list(cache, &commit_key, temp_id, confirmed);
      })
      .changes(vec![EntityChange::ContainerWritten { id: None }]);

    self.engine.run(plan, self.client.create_container(&new)).await
  }

  pub async fn update_container(
    &self,
    id: i64,
    patch: ContainerPatch,
  ) -> Result<Container, ApiError> {
    let list_key = QueryKey::root(CONTAINERS);
    let detail_key = QueryKey::detail(CONTAINERS, id);
    let fields = serde_json::to_value(&patch).unwrap_or(Value::Null);

    let plan = MutationPlan::new(vec![list_key.clone(), detail_key.clone()])
      .step(list_key, merge_by_id(id, fields.clone()))
      .step(detail_key, merge_object(fields))
      .changes(vec![EntityChange::ContainerWritten { id: Some(id) }]);

    self.engine.run(plan, self.client.update_container(id, &patch)).await
  }

  pub async fn delete_container(&self, id: i64) -> Result<(), ApiError> {
    let list_key = QueryKey::root(CONTAINERS);
    let detail_key = QueryKey::detail(CONTAINERS, id);

    let plan = MutationPlan::new(vec![list_key.clone(), detail_key.clone()])
      .step(list_key, remove_by_id(id))
      .step(detail_key, clear_entry())
      .changes(vec![EntityChange::ContainerWritten { id: Some(id) }]);

    self.engine.run(plan, self.client.delete_container(id)).await
  }

  pub async fn create_contact(&self, new: NewContact) -> Result<Contact, ApiError> {
    let list_key = QueryKey::root(CONTACTS);
    let temp_id = next_temp_id();
    let placeholder = Contact {
      id: 0,
      name: new.name.clone(),
      contact_type: new.contact_type.clone(),
      phone: new.phone.clone(),
      email: new.email.clone(),
      balance: None,
      created_at: None,
      updated_at: None,
    };

    let commit_key = list_key.clone();
    let plan = MutationPlan::new(vec![list_key.clone()])
      .step(list_key, append_placeholder(temp_id, &placeholder))
      .on_commit(move |cache, confirmed: &Contact| {
        confirm_into_list(cache, &commit_key, temp_id, confirmed);
      })
      .changes(vec![EntityChange::ContactWritten { id: None }]);

    self.engine.run(plan, self.client.create_contact(&new)).await
  }

  pub async fn update_contact(&self, id: i64, patch: ContactPatch) -> Result<Contact, ApiError> {
    let list_key = QueryKey::root(CONTACTS);
    let detail_key = QueryKey::detail(CONTACTS, id);
    let fields = serde_json::to_value(&patch).unwrap_or(Value::Null);

    let plan = MutationPlan::new(vec![list_key.clone(), detail_key.clone()])
      .step(list_key, merge_by_id(id, fields.clone()))
      .step(detail_key, merge_object(fields))
      .changes(vec![EntityChange::ContactWritten { id: Some(id) }]);

    self.engine.run(plan, self.client.update_contact(id, &patch)).await
  }

  pub async fn delete_contact(&self, id: i64) -> Result<(), ApiError> {
    let list_key = QueryKey::root(CONTACTS);
    let detail_key = QueryKey::detail(CONTACTS, id);

    let plan = MutationPlan::new(vec![list_key.clone(), detail_key.clone()])
      .step(list_key, remove_by_id(id))
      .step(detail_key, clear_entry())
      .changes(vec![EntityChange::ContactWritten { id: Some(id) }]);

    self.engine.run(plan, self.client.delete_contact(id)).await
  }

  /// Assign quantities for a container's products. The container's product
  /// list is patched optimistically: quantity 0 removes the relationship,
  /// other quantities are set in place (or appended for new links).
  pub async fn set_container_products(
    &self,
    req: SetContainerProductsRequest,
  ) -> Result<(), ApiError> {
    let list_key = QueryKey::detail(CONTAINERS, req.container_id).with("products");
    let product_ids: Vec<i64> = req.items.iter().map(|i| i.product_id).collect();

    let plan = MutationPlan::new(vec![list_key.clone()])
      .step(
        list_key,
        container_quantities_updater(req.container_id, req.items.clone()),
      )
      .changes(vec![EntityChange::InventoryLinkSet {
        container_id: req.container_id,
        product_ids,
      }]);

    self.engine.run(plan, self.client.set_container_products(&req)).await
  }

  pub async fn create_transaction(
    &self,
    new: NewTransaction,
  ) -> Result<TransactionRecord, ApiError> {
    let product_ids: Vec<i64> = new.items.iter().map(|i| i.product_id).collect();
    let container_ids: Vec<i64> = new.items.iter().filter_map(|i| i.container_id).collect();

    // No optimistic list patch: totals, balances, and stock levels are all
    // server-derived, so the commit relies on invalidation alone.
    let plan = MutationPlan::new(Vec::new()).changes(vec![EntityChange::TransactionRecorded {
      contact_id: new.contact_id,
      product_ids,
      container_ids,
    }]);

    self.engine.run(plan, self.client.create_transaction(&new)).await
  }

  /// Autosave controller for one open transaction form.
  pub fn draft_autosave(&self, kind: TransactionKind) -> DraftAutosave<ApiClient> {
    DraftAutosave::with_config(self.client.clone(), kind, self.autosave.clone())
  }
}

/// Cache updater for a bulk quantity assignment on one container.
fn container_quantities_updater(
  container_id: i64,
  items: Vec<ContainerQuantity>,
) -> impl FnOnce(Option<Value>) -> Option<Value> + Send {
  move |data| {
    let mut rows = match data {
      Some(Value::Array(rows)) => rows,
      _ => Vec::new(),
    };

    for item in items {
      let existing = rows
        .iter()
        .position(|row| row.get("product_id").and_then(Value::as_i64) == Some(item.product_id));
      if item.quantity == 0.0 {
        if let Some(index) = existing {
          rows.remove(index);
        }
      } else if let Some(index) = existing {
        if let Some(obj) = rows[index].as_object_mut() {
          obj.insert("quantity".to_string(), item.quantity.into());
        }
      } else {
        rows.push(serde_json::json!({
          "product_id": item.product_id,
          "container_id": container_id,
          "quantity": item.quantity,
        }));
      }
    }

    Some(Value::Array(rows))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn offline_core() -> SyncCore {
    // Port 1 on loopback refuses connections, so every request fails with a
    // network error before reaching any server.
    let client = ApiClient::new("http://127.0.0.1:1/api").unwrap();
    SyncCore::new(client)
  }

  fn container(id: i64, name: &str) -> Container {
    Container {
      id,
      name: name.to_string(),
      container_type: Some("mixed".to_string()),
      location: None,
      created_at: None,
      updated_at: None,
    }
  }

  #[tokio::test]
  async fn test_offline_create_container_rolls_back_list() {
    let core = offline_core();
    let list_key = QueryKey::root(CONTAINERS);
    core
      .cache()
      .write(&list_key, &confirm_all(vec![container(1, "Rack-1")]));
    let before = core.cache().snapshot(&[list_key.clone()]);

    let err = core
      .create_container(NewContainer {
        name: "Shelf-A".to_string(),
        container_type: Some("mixed".to_string()),
        location: None,
      })
      .await
      .unwrap_err();

    assert!(err.is_network());
    // No "Shelf-A" placeholder lingers.
    assert_eq!(core.cache().snapshot(&[list_key.clone()]), before);
    let list: Vec<Tracked<Container>> = core.cache().read(&list_key).unwrap();
    assert!(list.iter().all(|item| item.entity().name != "Shelf-A"));
  }

  #[tokio::test]
  async fn test_offline_delete_product_rolls_back() {
    let core = offline_core();
    let list_key = QueryKey::root(PRODUCTS);
    let detail_key = QueryKey::detail(PRODUCTS, 2);
    let products = confirm_all(vec![
      Product {
        id: 2,
        name: "Nut".to_string(),
        sku: None,
        unit: None,
        sale_price: 0.2,
        purchase_price: None,
        total_quantity: None,
        created_at: None,
        updated_at: None,
      },
    ]);
    core.cache().write(&list_key, &products);
    core.cache().write(&detail_key, products[0].entity());
    let before = core.cache().snapshot(&[list_key.clone(), detail_key.clone()]);

    let err = core.delete_product(2).await.unwrap_err();
    assert!(err.is_network());
    assert_eq!(core.cache().snapshot(&[list_key, detail_key]), before);
  }

  #[test]
  fn test_quantity_zero_removes_relationship_row() {
    let cache = QueryCache::new();
    let key = QueryKey::detail(CONTAINERS, 3).with("products");
    cache.write(
      &key,
      &vec![
        ContainerProduct {
          product_id: 7,
          container_id: 3,
          quantity: 5.0,
          product_name: None,
          container_name: None,
        },
        ContainerProduct {
          product_id: 9,
          container_id: 3,
          quantity: 2.0,
          product_name: None,
          container_name: None,
        },
      ],
    );

    cache.patch(
      &key,
      container_quantities_updater(
        3,
        vec![
          ContainerQuantity {
            product_id: 7,
            quantity: 0.0,
          },
          ContainerQuantity {
            product_id: 9,
            quantity: 4.0,
          },
          ContainerQuantity {
            product_id: 11,
            quantity: 1.0,
          },
        ],
      ),
    );

    let rows: Vec<ContainerProduct> = cache.read(&key).unwrap();
    assert!(rows.iter().all(|row| row.product_id != 7));
    assert_eq!(
      rows.iter().find(|row| row.product_id == 9).unwrap().quantity,
      4.0
    );
    assert_eq!(
      rows.iter().find(|row| row.product_id == 11).unwrap().quantity,
      1.0
    );
  }

  #[tokio::test]
  async fn test_query_hooks_share_one_cache() {
    let core = offline_core();
    let key = QueryKey::root(CONTACTS);
    core.cache().write(
      &key,
      &confirm_all(vec![Contact {
        id: 4,
        name: "Mira".to_string(),
        contact_type: Some("customer".to_string()),
        phone: None,
        email: None,
        balance: Some(120.0),
        created_at: None,
        updated_at: None,
      }]),
    );

    let query = core.contact_list(None);
    let data = query.data().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0].entity().name, "Mira");
  }
}
