//! Serde-deserializable shapes matching server responses.
//!
//! These stay separate from domain types so the transport quirks (the
//! `{success, data}` envelope, paginated-vs-bare lists) never leak past the
//! client.

use serde::{de::DeserializeOwned, Deserialize};

use crate::error::ApiError;

/// Every endpoint wraps its result in this envelope.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
  #[serde(default)]
  pub success: bool,
  pub data: Option<T>,
  #[serde(default)]
  pub message: Option<String>,
}

impl<T> Envelope<T> {
  /// Unwrap the envelope, turning a rejecting `success: false` (or a missing
  /// body) into an `Http` error carrying the server's message.
  pub fn into_data(self, status: u16) -> Result<T, ApiError> {
    if !self.success {
      return Err(ApiError::Http {
        status,
        detail: self
          .message
          .unwrap_or_else(|| "server rejected the request".to_string()),
      });
    }
    self.data.ok_or_else(|| ApiError::Http {
      status,
      detail: "response envelope had no data".to_string(),
    })
  }
}

/// List endpoints return either a bare array or a paginated object; both
/// normalize to a plain `Vec`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ListShape<T> {
  Bare(Vec<T>),
  Paginated {
    items: Vec<T>,
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    page: Option<u64>,
  },
}

impl<T> ListShape<T> {
  pub fn into_vec(self) -> Vec<T> {
    match self {
      ListShape::Bare(items) => items,
      ListShape::Paginated { items, .. } => items,
    }
  }
}

/// Parse a response body as an enveloped value.
pub fn parse_envelope<T: DeserializeOwned>(body: &[u8], status: u16) -> Result<T, ApiError> {
  let envelope: Envelope<T> =
    serde_json::from_slice(body).map_err(|e| ApiError::Decode(e.to_string()))?;
  envelope.into_data(status)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::types::Product;

  #[test]
  fn test_envelope_unwrap() {
    let body = br#"{"success": true, "data": {"id": 1, "name": "Bolt", "sale_price": 0.5}}"#;
    let product: Product = parse_envelope(body, 200).unwrap();
    assert_eq!(product.id, 1);
    assert_eq!(product.name, "Bolt");
  }

  #[test]
  fn test_envelope_rejection_carries_message() {
    let body = br#"{"success": false, "message": "name already exists"}"#;
    let err = parse_envelope::<Product>(body, 200).unwrap_err();
    match err {
      ApiError::Http { status, detail } => {
        assert_eq!(status, 200);
        assert_eq!(detail, "name already exists");
      }
      other => panic!("expected Http error, got {other:?}"),
    }
  }

  #[test]
  fn test_bare_list_normalizes() {
    let body = br#"{"success": true, "data": [{"id": 1, "name": "Bolt", "sale_price": 0.5}]}"#;
    let list: ListShape<Product> = parse_envelope(body, 200).unwrap();
    assert_eq!(list.into_vec().len(), 1);
  }

  #[test]
  fn test_paginated_list_normalizes() {
    let body = br#"{
      "success": true,
      "data": {"items": [{"id": 1, "name": "Bolt", "sale_price": 0.5}], "total": 41, "page": 1}
    }"#;
    let list: ListShape<Product> = parse_envelope(body, 200).unwrap();
    assert_eq!(list.into_vec().len(), 1);
  }

  #[test]
  fn test_garbage_body_is_a_decode_error() {
    let err = parse_envelope::<Product>(b"<html>oops</html>", 200).unwrap_err();
    assert!(matches!(err, ApiError::Decode(_)));
  }
}
