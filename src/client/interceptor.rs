//! Ordered transformation hooks for outgoing configuration, incoming
//! responses and classified errors.
//!
//! Interceptors are pure transformation steps. They never cache or queue;
//! those invariants stay centralized in the dispatcher.

use std::sync::{Arc, Mutex, MutexGuard};

use super::request::RequestConfig;
use super::transport::RawResponse;
use crate::cache::CacheStrategy;
use crate::error::ApiError;

pub type RequestInterceptor = Arc<dyn Fn(RequestConfig) -> RequestConfig + Send + Sync>;
pub type ResponseInterceptor = Arc<dyn Fn(RawResponse) -> RawResponse + Send + Sync>;
pub type ErrorInterceptor = Arc<dyn Fn(ApiError) -> ApiError + Send + Sync>;

/// Three independent chains, each applied in registration order.
pub struct Interceptors {
  request: Mutex<Vec<RequestInterceptor>>,
  response: Mutex<Vec<ResponseInterceptor>>,
  error: Mutex<Vec<ErrorInterceptor>>,
}

impl Interceptors {
  /// Empty chains.
  pub fn new() -> Self {
    Self {
      request: Mutex::new(Vec::new()),
      response: Mutex::new(Vec::new()),
      error: Mutex::new(Vec::new()),
    }
  }

  /// Chains pre-loaded with the default behavior:
  /// - attach a `Cache-Control: no-cache` header when the strategy is no-store
  /// - map transport aborts to a timeout error
  pub fn with_defaults() -> Self {
    let interceptors = Self::new();

    interceptors.add_request(Arc::new(|config: RequestConfig| {
      if config.strategy == Some(CacheStrategy::NoStore) {
        config.with_header("Cache-Control", "no-cache")
      } else {
        config
      }
    }));

    interceptors.add_error(Arc::new(|err: ApiError| match err {
      ApiError::Network { ref message } if message.contains("abort") => ApiError::Timeout,
      other => other,
    }));

    interceptors
  }

  pub fn add_request(&self, interceptor: RequestInterceptor) {
    lock(&self.request).push(interceptor);
  }

  pub fn add_response(&self, interceptor: ResponseInterceptor) {
    lock(&self.response).push(interceptor);
  }

  pub fn add_error(&self, interceptor: ErrorInterceptor) {
    lock(&self.error).push(interceptor);
  }

  pub fn apply_request(&self, config: RequestConfig) -> RequestConfig {
    let chain = lock(&self.request).clone();
    chain.iter().fold(config, |config, f| f(config))
  }

  pub fn apply_response(&self, response: RawResponse) -> RawResponse {
    let chain = lock(&self.response).clone();
    chain.iter().fold(response, |response, f| f(response))
  }

  pub fn apply_error(&self, err: ApiError) -> ApiError {
    let chain = lock(&self.error).clone();
    chain.iter().fold(err, |err, f| f(err))
  }
}

impl Default for Interceptors {
  fn default() -> Self {
    Self::new()
  }
}

fn lock<T>(mutex: &Mutex<Vec<T>>) -> MutexGuard<'_, Vec<T>> {
  match mutex.lock() {
    Ok(guard) => guard,
    Err(poisoned) => poisoned.into_inner(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_request_chain_runs_in_registration_order() {
    let interceptors = Interceptors::new();
    interceptors.add_request(Arc::new(|config: RequestConfig| {
      config.with_header("X-Trace", "first")
    }));
    interceptors.add_request(Arc::new(|config: RequestConfig| {
      config.with_header("X-Trace", "second")
    }));

    let config = interceptors.apply_request(RequestConfig::default());
    let values: Vec<&str> = config
      .headers
      .iter()
      .filter(|(name, _)| name == "X-Trace")
      .map(|(_, value)| value.as_str())
      .collect();
    assert_eq!(values, vec!["first", "second"]);
  }

  #[test]
  fn test_default_error_chain_maps_aborts_to_timeout() {
    let interceptors = Interceptors::with_defaults();

    let mapped = interceptors.apply_error(ApiError::Network {
      message: "request aborted".into(),
    });
    assert!(matches!(mapped, ApiError::Timeout));
    assert_eq!(mapped.status_code(), 408);

    // Genuine transport failures pass through untouched
    let untouched = interceptors.apply_error(ApiError::Network {
      message: "connection refused".into(),
    });
    assert_eq!(untouched.status_code(), 503);
  }

  #[test]
  fn test_default_request_chain_marks_no_store() {
    let interceptors = Interceptors::with_defaults();

    let config =
      interceptors.apply_request(RequestConfig::default().with_strategy(CacheStrategy::NoStore));
    assert!(config
      .headers
      .iter()
      .any(|(name, value)| name == "Cache-Control" && value == "no-cache"));
  }

  #[test]
  fn test_response_chain_preserves_discriminant() {
    let interceptors = Interceptors::new();
    interceptors.add_response(Arc::new(|mut response: RawResponse| {
      response.body = json!({ "wrapped": response.body });
      response
    }));

    let out = interceptors.apply_response(RawResponse {
      status: 200,
      body: json!([1, 2]),
    });
    assert!(out.ok());
    assert_eq!(out.body, json!({ "wrapped": [1, 2] }));
  }
}
