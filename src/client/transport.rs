//! Transport seam between the dispatcher and the actual HTTP stack.
//!
//! The dispatcher only sees the [`Transport`] trait; production uses the
//! reqwest-backed [`HttpTransport`], tests substitute mocks.

use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use serde_json::Value;

use super::request::Method;
use crate::error::ApiError;

/// A fully prepared outgoing request: absolute URL, final headers, JSON body.
#[derive(Debug, Clone)]
pub struct TransportRequest {
  pub method: Method,
  pub url: String,
  pub headers: Vec<(String, String)>,
  pub body: Option<Value>,
}

/// The raw response the transport produced, before classification.
#[derive(Debug, Clone)]
pub struct RawResponse {
  pub status: u16,
  pub body: Value,
}

impl RawResponse {
  /// Success discriminant. Response interceptors may rewrite the response
  /// but must preserve this for classification to stay correct.
  pub fn ok(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

/// One network exchange. Transport failures map to `ApiError::Network`;
/// HTTP-level errors come back as a `RawResponse` for the dispatcher to
/// classify.
pub trait Transport: Send + Sync {
  fn send(&self, request: TransportRequest) -> BoxFuture<'_, Result<RawResponse, ApiError>>;
}

/// reqwest-backed transport with cookies enabled.
pub struct HttpTransport {
  client: reqwest::Client,
}

impl HttpTransport {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .cookie_store(true)
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

impl Transport for HttpTransport {
  fn send(&self, request: TransportRequest) -> BoxFuture<'_, Result<RawResponse, ApiError>> {
    Box::pin(async move {
      let method = match request.method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
      };

      let mut builder = self.client.request(method, &request.url);
      for (name, value) in &request.headers {
        builder = builder.header(name, value);
      }
      if let Some(body) = &request.body {
        builder = builder.json(body);
      }

      let response = builder.send().await.map_err(|e| ApiError::Network {
        message: e.to_string(),
      })?;

      let status = response.status().as_u16();
      let bytes = response.bytes().await.map_err(|e| ApiError::Network {
        message: format!("failed to read response body: {}", e),
      })?;

      let body = decode_body(&bytes);

      Ok(RawResponse { status, body })
    })
  }
}

/// Decode a response body: empty bodies become null, non-JSON bodies are
/// kept verbatim as a string so error messages survive classification.
fn decode_body(bytes: &[u8]) -> Value {
  if bytes.is_empty() {
    return Value::Null;
  }
  serde_json::from_slice(bytes)
    .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_ok_discriminant() {
    assert!(RawResponse {
      status: 200,
      body: Value::Null
    }
    .ok());
    assert!(RawResponse {
      status: 204,
      body: Value::Null
    }
    .ok());
    assert!(!RawResponse {
      status: 404,
      body: Value::Null
    }
    .ok());
    assert!(!RawResponse {
      status: 500,
      body: Value::Null
    }
    .ok());
  }

  #[test]
  fn test_decode_body() {
    assert_eq!(decode_body(b""), Value::Null);
    assert_eq!(decode_body(b"{\"a\":1}"), serde_json::json!({ "a": 1 }));
    assert_eq!(
      decode_body(b"service unavailable"),
      Value::String("service unavailable".into())
    );
  }
}
