//! In-memory cache tier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// A timestamped response payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
  /// The cached response body
  pub data: Value,
  /// When the entry was written
  pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
  pub fn new(data: Value) -> Self {
    Self {
      data,
      cached_at: Utc::now(),
    }
  }
}

/// Volatile tier. All mutation happens inside short critical sections with
/// no await held across the lock.
#[derive(Default)]
pub struct MemoryTier {
  entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryTier {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, key: &str) -> Option<CacheEntry> {
    self.lock().get(key).cloned()
  }

  pub fn insert(&self, key: &str, entry: CacheEntry) {
    self.lock().insert(key.to_string(), entry);
  }

  pub fn remove(&self, key: &str) {
    self.lock().remove(key);
  }

  pub fn clear(&self) {
    self.lock().clear();
  }

  pub fn len(&self) -> usize {
    self.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().is_empty()
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
    match self.entries.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_insert_get_remove() {
    let tier = MemoryTier::new();
    assert!(tier.get("k").is_none());

    tier.insert("k", CacheEntry::new(json!({ "id": 1 })));
    assert_eq!(tier.get("k").unwrap().data, json!({ "id": 1 }));

    tier.remove("k");
    assert!(tier.get("k").is_none());
  }

  #[test]
  fn test_clear() {
    let tier = MemoryTier::new();
    tier.insert("a", CacheEntry::new(json!(1)));
    tier.insert("b", CacheEntry::new(json!(2)));
    assert_eq!(tier.len(), 2);

    tier.clear();
    assert!(tier.is_empty());
  }
}
