//! In-memory buffer for non-idempotent requests issued while offline.
//!
//! Entries live only in memory: they do not survive a process restart.
//! Callers needing guaranteed delivery must persist their own intent.

use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use super::request::{Method, RequestConfig};

/// A buffered call, replayed verbatim once connectivity returns.
#[derive(Debug, Clone)]
pub struct QueuedRequest {
  pub method: Method,
  pub endpoint: String,
  pub body: Option<Value>,
  pub config: RequestConfig,
}

#[derive(Default)]
pub struct OfflineQueue {
  entries: Mutex<VecDeque<QueuedRequest>>,
}

impl OfflineQueue {
  pub fn new() -> Self {
    Self::default()
  }

  /// Append to the tail. Used both for fresh offline calls and for replays
  /// that failed and get another chance on the next drain.
  ///
  /// A request carrying a queue key supersedes any buffered entry with the
  /// same key: only the latest version of a keyed mutation is replayed.
  pub fn push(&self, request: QueuedRequest) {
    let mut entries = self.lock();
    if let Some(key) = request.config.queue_key.as_deref() {
      entries.retain(|entry| entry.config.queue_key.as_deref() != Some(key));
    }
    entries.push_back(request);
  }

  /// Snapshot the current contents and clear the live queue. The drain
  /// replays the snapshot sequentially; failures re-enter via `push`.
  pub fn take_all(&self) -> Vec<QueuedRequest> {
    self.lock().drain(..).collect()
  }

  pub fn len(&self) -> usize {
    self.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().is_empty()
  }

  fn lock(&self) -> MutexGuard<'_, VecDeque<QueuedRequest>> {
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

  fn queued(endpoint: &str) -> QueuedRequest {
    QueuedRequest {
      method: Method::Post,
      endpoint: endpoint.to_string(),
      body: Some(json!({ "x": 1 })),
      config: RequestConfig::default(),
    }
  }

  #[test]
  fn test_fifo_order() {
    let queue = OfflineQueue::new();
    queue.push(queued("/a"));
    queue.push(queued("/b"));

    let drained = queue.take_all();
    assert_eq!(drained.len(), 2);
    assert_eq!(drained[0].endpoint, "/a");
    assert_eq!(drained[1].endpoint, "/b");
    assert!(queue.is_empty());
  }

  #[test]
  fn test_keyed_entries_supersede() {
    let queue = OfflineQueue::new();

    let mut keyed = queued("/sync");
    keyed.config.queue_key = Some("sync".to_string());
    queue.push(keyed.clone());

    let mut newer = keyed.clone();
    newer.body = Some(json!({ "x": 2 }));
    queue.push(newer);
    queue.push(queued("/other"));

    let drained = queue.take_all();
    assert_eq!(drained.len(), 2);
    assert_eq!(drained[0].body, Some(json!({ "x": 2 })));
  }

  #[test]
  fn test_failed_replay_reenters_at_tail() {
    let queue = OfflineQueue::new();
    queue.push(queued("/a"));
    queue.push(queued("/b"));

    let snapshot = queue.take_all();
    // "/a" fails replay and goes back to the live tail
    queue.push(snapshot[0].clone());
    queue.push(queued("/c"));

    let next = queue.take_all();
    assert_eq!(next[0].endpoint, "/a");
    assert_eq!(next[1].endpoint, "/c");
  }
}
