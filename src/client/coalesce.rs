//! Coalescing of concurrent identical in-flight calls.
//!
//! The first batchable caller for a cache key becomes the leader: it waits
//! out a short collection window, performs one network attempt and
//! broadcasts the outcome. Callers arriving inside the window become
//! followers and share the leader's result, success or classified error.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;

use crate::error::ApiError;

type SharedResult = Result<Value, ApiError>;

/// Role a caller gets when joining an in-flight key.
pub enum Slot {
  /// Performs the network attempt and must call `complete`.
  Leader(broadcast::Sender<SharedResult>),
  /// Awaits the leader's broadcast.
  Follower(broadcast::Receiver<SharedResult>),
}

pub struct RequestCoalescer {
  window: Duration,
  inflight: Mutex<HashMap<String, broadcast::Sender<SharedResult>>>,
}

impl RequestCoalescer {
  pub fn new(window: Duration) -> Self {
    Self {
      window,
      inflight: Mutex::new(HashMap::new()),
    }
  }

  /// Length of the collection window the leader waits before dispatching.
  pub fn window(&self) -> Duration {
    self.window
  }

  /// Join the in-flight set for a key.
  pub fn join(&self, key: &str) -> Slot {
    let mut inflight = self.lock();
    if let Some(tx) = inflight.get(key) {
      Slot::Follower(tx.subscribe())
    } else {
      let (tx, _rx) = broadcast::channel(1);
      inflight.insert(key.to_string(), tx.clone());
      Slot::Leader(tx)
    }
  }

  /// Publish the leader's outcome to every attached follower and retire the
  /// key so later calls start a fresh window.
  pub fn complete(&self, key: &str, tx: &broadcast::Sender<SharedResult>, result: SharedResult) {
    self.lock().remove(key);
    // Send after removal so a caller joining now becomes a new leader
    // instead of attaching to a finished flight. No receivers is fine:
    // the leader already holds its own copy of the result.
    let _ = tx.send(result);
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<String, broadcast::Sender<SharedResult>>> {
    match self.inflight.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    }
  }
}
