//! Running request counters.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Snapshot of the collector's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RequestMetrics {
  pub request_count: u64,
  pub error_count: u64,
  /// Incremental mean over every completed call, in milliseconds.
  pub average_response_time_ms: f64,
}

impl RequestMetrics {
  /// Derived, never stored: `(request_count - error_count) / request_count`.
  pub fn success_rate(&self) -> f64 {
    if self.request_count == 0 {
      return 1.0;
    }
    (self.request_count - self.error_count) as f64 / self.request_count as f64
  }
}

#[derive(Default)]
pub struct MetricsCollector {
  inner: Mutex<RequestMetrics>,
}

impl MetricsCollector {
  pub fn new() -> Self {
    Self::default()
  }

  /// Record one completed call, success or failure.
  pub fn record(&self, duration: Duration, success: bool) {
    let mut metrics = self.lock();

    metrics.request_count += 1;
    if !success {
      metrics.error_count += 1;
    }

    let n = metrics.request_count as f64;
    let duration_ms = duration.as_secs_f64() * 1000.0;
    metrics.average_response_time_ms =
      (metrics.average_response_time_ms * (n - 1.0) + duration_ms) / n;
  }

  pub fn snapshot(&self) -> RequestMetrics {
    *self.lock()
  }

  fn lock(&self) -> MutexGuard<'_, RequestMetrics> {
    match self.inner.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_success_rate() {
    let collector = MetricsCollector::new();
    for i in 0..10 {
      collector.record(Duration::from_millis(10), i >= 3);
    }

    let metrics = collector.snapshot();
    assert_eq!(metrics.request_count, 10);
    assert_eq!(metrics.error_count, 3);
    assert!((metrics.success_rate() - 0.7).abs() < f64::EPSILON);
  }

  #[test]
  fn test_incremental_mean() {
    let collector = MetricsCollector::new();
    collector.record(Duration::from_millis(100), true);
    collector.record(Duration::from_millis(300), true);

    let metrics = collector.snapshot();
    assert!((metrics.average_response_time_ms - 200.0).abs() < 1e-9);
  }

  #[test]
  fn test_empty_collector() {
    let metrics = MetricsCollector::new().snapshot();
    assert_eq!(metrics.request_count, 0);
    assert_eq!(metrics.success_rate(), 1.0);
  }
}
