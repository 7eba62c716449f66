//! Deterministic cache key derivation.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Derive the cache key for a call from its method, endpoint and body.
///
/// The same derivation is used for both tiers, so a memory entry and its
/// durable counterpart always share a key.
pub fn cache_key(method: &str, endpoint: &str, body: Option<&Value>) -> String {
  let input = format!(
    "{}:{}:{}",
    method,
    endpoint,
    body.map(Value::to_string).unwrap_or_default()
  );

  // SHA256 hash for stable, fixed-length keys
  let mut hasher = Sha256::new();
  hasher.update(input.as_bytes());
  hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_key_is_deterministic() {
    let body = json!({ "servings": 4 });
    let a = cache_key("POST", "/recipes", Some(&body));
    let b = cache_key("POST", "/recipes", Some(&body));
    assert_eq!(a, b);
    assert_eq!(a.len(), 64);
  }

  #[test]
  fn test_key_varies_by_method_endpoint_and_body() {
    let body = json!({ "servings": 4 });
    let base = cache_key("GET", "/recipes", None);
    assert_ne!(base, cache_key("POST", "/recipes", None));
    assert_ne!(base, cache_key("GET", "/menus", None));
    assert_ne!(base, cache_key("GET", "/recipes", Some(&body)));
  }
}
