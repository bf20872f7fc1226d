//! Domain types for the inventory and billing server.
//!
//! Entities use the server's snake_case field names; draft payloads use the
//! camelCase names the transaction form stores, since the server round-trips
//! the payload verbatim.

use serde::{Deserialize, Serialize};

/// A sellable/purchasable product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
  pub id: i64,
  pub name: String,
  #[serde(default)]
  pub sku: Option<String>,
  #[serde(default)]
  pub unit: Option<String>,
  #[serde(default)]
  pub sale_price: f64,
  #[serde(default)]
  pub purchase_price: Option<f64>,
  /// Total quantity across all containers; server-derived.
  #[serde(default)]
  pub total_quantity: Option<f64>,
  #[serde(default)]
  pub created_at: Option<String>,
  #[serde(default)]
  pub updated_at: Option<String>,
}

/// A storage container (shelf, bin, warehouse section).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
  pub id: i64,
  pub name: String,
  #[serde(rename = "type", default)]
  pub container_type: Option<String>,
  #[serde(default)]
  pub location: Option<String>,
  #[serde(default)]
  pub created_at: Option<String>,
  #[serde(default)]
  pub updated_at: Option<String>,
}

/// A customer or supplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
  pub id: i64,
  pub name: String,
  #[serde(rename = "type", default)]
  pub contact_type: Option<String>,
  #[serde(default)]
  pub phone: Option<String>,
  #[serde(default)]
  pub email: Option<String>,
  /// Outstanding balance; server-derived, never computed client-side.
  #[serde(default)]
  pub balance: Option<f64>,
  #[serde(default)]
  pub created_at: Option<String>,
  #[serde(default)]
  pub updated_at: Option<String>,
}

/// Direction of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
  Sale,
  Purchase,
}

impl TransactionKind {
  pub fn label(&self) -> &'static str {
    match self {
      TransactionKind::Sale => "Sale",
      TransactionKind::Purchase => "Purchase",
    }
  }
}

/// A finalized sale or purchase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
  pub id: i64,
  #[serde(rename = "type")]
  pub kind: TransactionKind,
  #[serde(default)]
  pub contact_id: Option<i64>,
  #[serde(default)]
  pub transaction_date: Option<String>,
  #[serde(default)]
  pub total: Option<f64>,
  #[serde(default)]
  pub paid_amount: Option<f64>,
  #[serde(default)]
  pub items: Vec<TransactionItem>,
  #[serde(default)]
  pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionItem {
  pub product_id: i64,
  #[serde(default)]
  pub container_id: Option<i64>,
  pub quantity: f64,
  pub unit_price: f64,
}

/// One product's presence in one container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerProduct {
  pub product_id: i64,
  pub container_id: i64,
  pub quantity: f64,
  #[serde(default)]
  pub product_name: Option<String>,
  #[serde(default)]
  pub container_name: Option<String>,
}

/// Server-computed inventory overview (stock value, low-stock counts, ...).
/// Kept opaque: the client renders it, never derives from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryAnalytics(pub serde_json::Value);

/// A persisted, not-yet-finalized transaction form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
  pub id: i64,
  #[serde(rename = "type")]
  pub kind: TransactionKind,
  pub name: String,
  pub data: DraftPayload,
  #[serde(default)]
  pub created_at: Option<String>,
  #[serde(default)]
  pub updated_at: Option<String>,
}

/// The transaction form contents persisted inside a draft.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftPayload {
  #[serde(default)]
  pub transaction_date: Option<String>,
  #[serde(default)]
  pub contact_id: Option<i64>,
  #[serde(default)]
  pub items: Vec<DraftItem>,
  #[serde(default)]
  pub tax_percent: f64,
  #[serde(default)]
  pub discount_amount: f64,
  #[serde(default)]
  pub paid_amount: f64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub payment_method: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub payment_reference: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub notes: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub display_mode: Option<String>,
}

impl DraftPayload {
  /// Whether the form holds anything worth persisting: a chosen contact, at
  /// least one item, or non-blank notes.
  pub fn has_meaningful_content(&self) -> bool {
    self.contact_id.is_some()
      || !self.items.is_empty()
      || self
        .notes
        .as_deref()
        .map(|n| !n.trim().is_empty())
        .unwrap_or(false)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftItem {
  pub product_id: i64,
  #[serde(default)]
  pub container_id: Option<i64>,
  pub quantity: f64,
  pub unit_price: f64,
}

// ============================================================================
// Write payloads
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sku: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub unit: Option<String>,
  pub sale_price: f64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub purchase_price: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductPatch {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sku: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub unit: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sale_price: Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub purchase_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewContainer {
  pub name: String,
  #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
  pub container_type: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub location: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerPatch {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
  pub container_type: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewContact {
  pub name: String,
  #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
  pub contact_type: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub phone: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub email: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactPatch {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
  pub contact_type: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub phone: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
  #[serde(rename = "type")]
  pub kind: TransactionKind,
  #[serde(default)]
  pub contact_id: Option<i64>,
  #[serde(default)]
  pub transaction_date: Option<String>,
  pub items: Vec<TransactionItem>,
  #[serde(default)]
  pub tax_percent: f64,
  #[serde(default)]
  pub discount_amount: f64,
  #[serde(default)]
  pub paid_amount: f64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub payment_method: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateDraftRequest {
  #[serde(rename = "type")]
  pub kind: TransactionKind,
  pub name: String,
  pub data: DraftPayload,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateDraftRequest {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub data: Option<DraftPayload>,
}

/// Bulk quantity assignment for one container.
/// Quantity 0 soft-removes the relationship server-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetContainerProductsRequest {
  pub container_id: i64,
  pub items: Vec<ContainerQuantity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerQuantity {
  pub product_id: i64,
  pub quantity: f64,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_draft_payload_meaningful_content() {
    let empty = DraftPayload::default();
    assert!(!empty.has_meaningful_content());

    let blank_notes = DraftPayload {
      notes: Some("   ".to_string()),
      ..Default::default()
    };
    assert!(!blank_notes.has_meaningful_content());

    let with_contact = DraftPayload {
      contact_id: Some(4),
      ..Default::default()
    };
    assert!(with_contact.has_meaningful_content());

    let with_item = DraftPayload {
      items: vec![DraftItem {
        product_id: 1,
        container_id: None,
        quantity: 2.0,
        unit_price: 9.5,
      }],
      ..Default::default()
    };
    assert!(with_item.has_meaningful_content());
  }

  #[test]
  fn test_draft_payload_uses_camel_case() {
    let payload = DraftPayload {
      transaction_date: Some("2025-04-01".to_string()),
      contact_id: Some(3),
      ..Default::default()
    };
    let json = serde_json::to_value(&payload).unwrap();
    assert!(json.get("transactionDate").is_some());
    assert!(json.get("contactId").is_some());
    assert!(json.get("transaction_date").is_none());
  }
}
