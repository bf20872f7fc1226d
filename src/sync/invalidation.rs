//! Dependent-query invalidation graph.
//!
//! One declarative table mapping "what a mutation changed" to "which cached
//! queries might now be wrong". Mutation hooks only declare `EntityChange`s;
//! nothing invalidates ad hoc at call sites, so new relations get added here
//! and nowhere else.
//!
//! Invalidation is deliberately coarse (whole collections, via key prefixes):
//! the server owns every derived field — balances, totals, stock levels — so
//! correctness beats minimizing refetches.

use crate::cache::QueryKey;

/// Resource names used as the leading query-key segment.
pub mod resources {
  pub const PRODUCTS: &str = "products";
  pub const CONTAINERS: &str = "containers";
  pub const CONTACTS: &str = "contacts";
  pub const TRANSACTIONS: &str = "transactions";
  pub const DRAFTS: &str = "drafts";
  pub const INVENTORY_ANALYTICS: &str = "inventory-analytics";
}

/// What a committed mutation changed, in entity terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityChange {
  /// A product was created, updated, or deleted.
  ProductWritten { id: Option<i64> },
  /// A container was created, updated, or deleted.
  ContainerWritten { id: Option<i64> },
  /// A contact was created, updated, or deleted.
  ContactWritten { id: Option<i64> },
  /// Quantities were assigned for a container-product relationship.
  InventoryLinkSet {
    container_id: i64,
    product_ids: Vec<i64>,
  },
  /// A sale or purchase was finalized.
  TransactionRecorded {
    contact_id: Option<i64>,
    product_ids: Vec<i64>,
    container_ids: Vec<i64>,
  },
  /// A draft was created, updated, or deleted.
  DraftWritten,
}

/// The rule table. Stateless; rules live in `keys_for`.
#[derive(Debug, Clone, Copy, Default)]
pub struct InvalidationGraph;

impl InvalidationGraph {
  /// Keys (used as prefixes) that must be staled for `change`.
  pub fn keys_for(&self, change: &EntityChange) -> Vec<QueryKey> {
    use resources::*;

    match change {
      EntityChange::ProductWritten { id } => collection_and_detail(PRODUCTS, *id),
      EntityChange::ContainerWritten { id } => collection_and_detail(CONTAINERS, *id),
      EntityChange::ContactWritten { id } => collection_and_detail(CONTACTS, *id),

      EntityChange::InventoryLinkSet {
        container_id,
        product_ids,
      } => {
        let mut keys = vec![
          QueryKey::detail(CONTAINERS, *container_id).with("products"),
          QueryKey::detail(CONTAINERS, *container_id),
          QueryKey::root(INVENTORY_ANALYTICS),
        ];
        for product_id in product_ids {
          keys.push(QueryKey::detail(PRODUCTS, *product_id).with("containers"));
          keys.push(QueryKey::detail(PRODUCTS, *product_id).with("total-quantity"));
        }
        keys
      }

      EntityChange::TransactionRecorded {
        contact_id,
        product_ids,
        container_ids,
      } => {
        let mut keys = vec![
          QueryKey::root(TRANSACTIONS),
          QueryKey::root(CONTACTS),
          QueryKey::root(INVENTORY_ANALYTICS),
        ];
        if let Some(contact_id) = contact_id {
          keys.push(QueryKey::detail(CONTACTS, *contact_id));
        }
        for product_id in product_ids {
          keys.push(QueryKey::detail(PRODUCTS, *product_id));
        }
        for container_id in container_ids {
          keys.push(QueryKey::detail(CONTAINERS, *container_id));
        }
        keys
      }

      EntityChange::DraftWritten => vec![QueryKey::root(DRAFTS)],
    }
  }
}

fn collection_and_detail(resource: &str, id: Option<i64>) -> Vec<QueryKey> {
  // The collection root is a prefix, so it also stales filtered variants.
  let mut keys = vec![QueryKey::root(resource)];
  if let Some(id) = id {
    keys.push(QueryKey::detail(resource, id));
  }
  keys
}

#[cfg(test)]
mod tests {
  use super::*;
  use resources::*;

  #[test]
  fn test_product_write_covers_list_and_detail() {
    let keys = InvalidationGraph.keys_for(&EntityChange::ProductWritten { id: Some(7) });
    assert!(keys.contains(&QueryKey::root(PRODUCTS)));
    assert!(keys.contains(&QueryKey::detail(PRODUCTS, 7)));
  }

  #[test]
  fn test_inventory_link_covers_both_sides_and_analytics() {
    let keys = InvalidationGraph.keys_for(&EntityChange::InventoryLinkSet {
      container_id: 3,
      product_ids: vec![7, 9],
    });
    assert!(keys.contains(&QueryKey::detail(CONTAINERS, 3).with("products")));
    assert!(keys.contains(&QueryKey::detail(CONTAINERS, 3)));
    assert!(keys.contains(&QueryKey::detail(PRODUCTS, 7).with("containers")));
    assert!(keys.contains(&QueryKey::detail(PRODUCTS, 7).with("total-quantity")));
    assert!(keys.contains(&QueryKey::detail(PRODUCTS, 9).with("containers")));
    assert!(keys.contains(&QueryKey::root(INVENTORY_ANALYTICS)));
  }

  #[test]
  fn test_transaction_covers_contact_balance_and_touched_entities() {
    let keys = InvalidationGraph.keys_for(&EntityChange::TransactionRecorded {
      contact_id: Some(4),
      product_ids: vec![7],
      container_ids: vec![3],
    });
    assert!(keys.contains(&QueryKey::root(TRANSACTIONS)));
    // Balance changed: both the contact detail and the contact list.
    assert!(keys.contains(&QueryKey::detail(CONTACTS, 4)));
    assert!(keys.contains(&QueryKey::root(CONTACTS)));
    assert!(keys.contains(&QueryKey::root(INVENTORY_ANALYTICS)));
    assert!(keys.contains(&QueryKey::detail(PRODUCTS, 7)));
    assert!(keys.contains(&QueryKey::detail(CONTAINERS, 3)));
  }
}
