//! Per-call request configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::cache::CacheStrategy;
use crate::error::ApiError;

/// HTTP verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
  Get,
  Post,
  Put,
  Patch,
  Delete,
}

impl Method {
  pub fn as_str(self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Patch => "PATCH",
      Method::Delete => "DELETE",
    }
  }

  /// Only GETs are served from cache and exempt from offline queuing.
  pub fn is_get(self) -> bool {
    matches!(self, Method::Get)
  }
}

impl fmt::Display for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Scheduling hint for the embedding application. The dispatcher carries it
/// through interceptors but does not act on it itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
  Low,
  #[default]
  Normal,
  High,
}

/// Retry configuration applied as a decorator around each network attempt.
///
/// The dispatcher's timeout/cancellation race applies per attempt, so a
/// retried call gets a fresh timeout budget each time.
#[derive(Clone)]
pub struct RetryPolicy {
  pub max_retries: u32,
  pub retry_delay: Duration,
  pub should_retry: Arc<dyn Fn(&ApiError) -> bool + Send + Sync>,
}

impl RetryPolicy {
  /// No retries at all.
  pub fn none() -> Self {
    Self {
      max_retries: 0,
      retry_delay: Duration::from_millis(300),
      should_retry: Arc::new(|_| false),
    }
  }

  /// Retry transport failures and 5xx responses.
  pub fn transient(max_retries: u32, retry_delay: Duration) -> Self {
    Self {
      max_retries,
      retry_delay,
      should_retry: Arc::new(|err| err.is_network() || err.status_code() >= 500),
    }
  }
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self::none()
  }
}

impl fmt::Debug for RetryPolicy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RetryPolicy")
      .field("max_retries", &self.max_retries)
      .field("retry_delay", &self.retry_delay)
      .finish_non_exhaustive()
  }
}

/// Externally supplied cancellation signal.
///
/// Firing the token aborts the in-flight network operation; the resulting
/// failure routes through the error interceptors (mapped to a timeout by the
/// default chain). Cancellation has no effect once decoding has begun.
#[derive(Debug, Clone)]
pub struct CancelToken {
  tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
  pub fn new() -> Self {
    let (tx, _rx) = watch::channel(false);
    Self { tx: Arc::new(tx) }
  }

  /// Fire the signal. Idempotent.
  pub fn cancel(&self) {
    // send_replace updates the stored value even when no receiver is
    // currently subscribed; plain send would discard it
    self.tx.send_replace(true);
  }

  pub fn is_cancelled(&self) -> bool {
    *self.tx.borrow()
  }

  /// Resolve once the token fires. Resolves immediately if it already has.
  pub async fn cancelled(&self) {
    let mut rx = self.tx.subscribe();
    // wait_for checks the current value first, so a pre-fired token
    // resolves without waiting
    let _ = rx.wait_for(|cancelled| *cancelled).await;
  }
}

impl Default for CancelToken {
  fn default() -> Self {
    Self::new()
  }
}

/// Configuration for a single logical call.
///
/// `Clone` so queued replays and retries can reuse it verbatim.
#[derive(Debug, Clone)]
pub struct RequestConfig {
  /// Extra headers appended after the client-level defaults.
  pub headers: Vec<(String, String)>,
  /// Per-call timeout. `None` falls back to the client default (5s).
  pub timeout: Option<Duration>,
  /// Cache strategy. `None` picks the per-method default: cache-first for
  /// GET, no-store otherwise.
  pub strategy: Option<CacheStrategy>,
  pub priority: Priority,
  /// Opt this call into request coalescing.
  pub batch: bool,
  pub retry: RetryPolicy,
  /// Override for the offline-queue grouping key.
  pub queue_key: Option<String>,
  pub cancel: Option<CancelToken>,
}

impl Default for RequestConfig {
  fn default() -> Self {
    Self {
      headers: Vec::new(),
      timeout: None,
      strategy: None,
      priority: Priority::default(),
      batch: false,
      retry: RetryPolicy::default(),
      queue_key: None,
      cancel: None,
    }
  }
}

impl RequestConfig {
  pub fn with_strategy(mut self, strategy: CacheStrategy) -> Self {
    self.strategy = Some(strategy);
    self
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }

  pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_string(), value.to_string()));
    self
  }

  pub fn batched(mut self) -> Self {
    self.batch = true;
    self
  }

  pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
    self.cancel = Some(cancel);
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = RequestConfig::default();
    assert!(config.timeout.is_none());
    assert!(config.strategy.is_none());
    assert!(!config.batch);
    assert_eq!(config.retry.max_retries, 0);
  }

  #[tokio::test]
  async fn test_cancel_token_fires() {
    let token = CancelToken::new();
    assert!(!token.is_cancelled());

    let waiter = {
      let token = token.clone();
      tokio::spawn(async move { token.cancelled().await })
    };

    token.cancel();
    waiter.await.unwrap();
    assert!(token.is_cancelled());
  }

  #[tokio::test]
  async fn test_pre_fired_token_resolves_immediately() {
    let token = CancelToken::new();
    token.cancel();
    token.cancelled().await;
  }

  #[test]
  fn test_transient_retry_predicate() {
    let policy = RetryPolicy::transient(2, Duration::from_millis(10));
    assert!((policy.should_retry)(&ApiError::Network {
      message: "refused".into()
    }));
    assert!((policy.should_retry)(&ApiError::Http {
      status: 502,
      message: "bad gateway".into(),
      body: None,
    }));
    assert!(!(policy.should_retry)(&ApiError::Validation {
      message: "bad".into(),
      body: None,
    }));
  }
}
