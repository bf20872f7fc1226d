//! Error taxonomy for the synchronization core.

use thiserror::Error;

/// Errors surfaced by the remote resource client and everything built on it.
///
/// `Validation` never reaches the network; the other variants map a failed
/// request onto the stage it failed at: no response at all, a response with a
/// non-success status (or a rejecting envelope), or a body we could not parse.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
  /// The request produced no response (DNS failure, refused connection, timeout).
  #[error("network error: {0}")]
  Network(String),

  /// The server answered with a non-success status or a rejecting envelope.
  #[error("http {status}: {detail}")]
  Http { status: u16, detail: String },

  /// The response body could not be decoded into the expected shape.
  #[error("failed to decode response: {0}")]
  Decode(String),

  /// Local validation failure; the request was never sent.
  #[error("validation: {0}")]
  Validation(String),
}

impl ApiError {
  /// Whether this error came back with the given HTTP status.
  pub fn is_status(&self, status: u16) -> bool {
    matches!(self, ApiError::Http { status: s, .. } if *s == status)
  }

  pub fn is_network(&self) -> bool {
    matches!(self, ApiError::Network(_))
  }
}

impl From<reqwest::Error> for ApiError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_decode() {
      ApiError::Decode(err.to_string())
    } else if let Some(status) = err.status() {
      ApiError::Http {
        status: status.as_u16(),
        detail: err.to_string(),
      }
    } else {
      ApiError::Network(err.to_string())
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_status_predicate() {
    let err = ApiError::Http {
      status: 404,
      detail: "not found".to_string(),
    };
    assert!(err.is_status(404));
    assert!(!err.is_status(401));
    assert!(!err.is_network());
  }
}
