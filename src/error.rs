//! Typed error taxonomy for the API access layer.
//!
//! Every failure that leaves the dispatcher resolves to exactly one of these
//! variants. They are data, not control flow: callers match on the kind (or
//! on `status_code()`) to decide whether to retry, re-authenticate, or
//! surface a message.

use serde_json::Value;
use thiserror::Error;

/// Classified API failure.
///
/// `Clone` because coalesced callers share the same failure instance.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
  /// Transport-level failure: offline, DNS, connection refused, aborted.
  #[error("network error: {message}")]
  Network { message: String },

  /// The call's cancellation signal fired before a response arrived.
  #[error("request timed out")]
  Timeout,

  /// The server rejected the request as malformed (400), or the response
  /// body could not be decoded into the expected type.
  #[error("validation error: {message}")]
  Validation { message: String, body: Option<Value> },

  /// The server rejected the request as unauthenticated (401).
  #[error("authentication error: {message}")]
  Authentication { message: String, body: Option<Value> },

  /// Any other non-2xx response, carrying the server's status and body.
  #[error("server returned {status}: {message}")]
  Http {
    status: u16,
    message: String,
    body: Option<Value>,
  },
}

impl ApiError {
  /// The HTTP status code this error maps to.
  pub fn status_code(&self) -> u16 {
    match self {
      ApiError::Network { .. } => 503,
      ApiError::Timeout => 408,
      ApiError::Validation { .. } => 400,
      ApiError::Authentication { .. } => 401,
      ApiError::Http { status, .. } => *status,
    }
  }

  /// Classify a non-2xx response into a concrete error kind.
  pub fn from_response(status: u16, body: Value) -> Self {
    let message = response_message(&body, status);
    let body = if body.is_null() { None } else { Some(body) };

    match status {
      400 => ApiError::Validation { message, body },
      401 => ApiError::Authentication { message, body },
      408 => ApiError::Timeout,
      _ => ApiError::Http {
        status,
        message,
        body,
      },
    }
  }

  /// Whether this is a transport-level failure (as opposed to a response the
  /// server actually produced).
  pub fn is_network(&self) -> bool {
    matches!(self, ApiError::Network { .. })
  }
}

/// Pull a human-readable message out of a server error body.
fn response_message(body: &Value, status: u16) -> String {
  body
    .get("message")
    .or_else(|| body.get("error"))
    .and_then(Value::as_str)
    .map(String::from)
    .unwrap_or_else(|| format!("request failed with status {}", status))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_status_codes() {
    assert_eq!(
      ApiError::Network {
        message: "down".into()
      }
      .status_code(),
      503
    );
    assert_eq!(ApiError::Timeout.status_code(), 408);
    assert_eq!(
      ApiError::from_response(400, Value::Null).status_code(),
      400
    );
    assert_eq!(
      ApiError::from_response(401, Value::Null).status_code(),
      401
    );
    assert_eq!(
      ApiError::from_response(500, Value::Null).status_code(),
      500
    );
  }

  #[test]
  fn test_classification_uses_body_message() {
    let err = ApiError::from_response(400, json!({ "message": "name is required" }));
    match err {
      ApiError::Validation { message, body } => {
        assert_eq!(message, "name is required");
        assert!(body.is_some());
      }
      other => panic!("expected validation error, got {:?}", other),
    }
  }

  #[test]
  fn test_unknown_status_is_generic() {
    let err = ApiError::from_response(502, json!({ "error": "bad gateway" }));
    match err {
      ApiError::Http {
        status, message, ..
      } => {
        assert_eq!(status, 502);
        assert_eq!(message, "bad gateway");
      }
      other => panic!("expected generic http error, got {:?}", other),
    }
  }
}
