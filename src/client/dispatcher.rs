//! The dispatcher: orchestrates a single logical call end to end.
//!
//! Per call: request interceptors → offline check → strategy-dependent
//! cache read → timeout/cancel-guarded network attempt (with the retry
//! decorator) → response interceptors → classification → cache write →
//! metrics → typed result. The offline queue and connectivity monitor
//! intercept the network step while disconnected.

use color_eyre::{eyre::eyre, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

use super::coalesce::{RequestCoalescer, Slot};
use super::connectivity::ConnectivityMonitor;
use super::interceptor::{
  ErrorInterceptor, Interceptors, RequestInterceptor, ResponseInterceptor,
};
use super::metrics::{MetricsCollector, RequestMetrics};
use super::queue::{OfflineQueue, QueuedRequest};
use super::request::{Method, RequestConfig};
use super::transport::{HttpTransport, Transport, TransportRequest};
use crate::cache::{cache_key, CacheStore, CacheStrategy};
use crate::config::Config;
use crate::error::ApiError;

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);
const DEFAULT_BATCH_WINDOW: Duration = Duration::from_millis(25);

struct ClientInner {
  base_url: Url,
  token: Option<String>,
  transport: Arc<dyn Transport>,
  cache: CacheStore,
  queue: OfflineQueue,
  connectivity: Arc<ConnectivityMonitor>,
  interceptors: Interceptors,
  coalescer: RequestCoalescer,
  metrics: MetricsCollector,
  default_timeout: Duration,
}

/// The application-facing request service. Cheap to clone; all clones share
/// the same cache, queue, metrics and interceptor chains.
#[derive(Clone)]
pub struct ApiClient {
  inner: Arc<ClientInner>,
}

impl ApiClient {
  /// Build a client from loaded configuration, using the reqwest transport
  /// and the bearer token from the environment when present.
  ///
  /// Must be called from within a Tokio runtime: construction spawns the
  /// background task that replays the offline queue on reconnect.
  pub fn new(config: &Config) -> Result<Self> {
    let mut builder = Self::builder(&config.api.url)
      .with_default_timeout(Duration::from_millis(config.api.timeout_ms));

    if let Some(token) = Config::get_api_token() {
      builder = builder.with_token(token);
    }
    if let Some(path) = &config.cache.database {
      builder = builder.with_durable_path(path.clone());
    }

    builder.build()
  }

  pub fn builder(base_url: &str) -> ApiClientBuilder {
    ApiClientBuilder::new(base_url)
  }

  pub async fn get<T: DeserializeOwned>(
    &self,
    endpoint: &str,
    config: Option<RequestConfig>,
  ) -> Result<T, ApiError> {
    self
      .dispatch(Method::Get, endpoint, None, config.unwrap_or_default())
      .await
  }

  pub async fn post<T: DeserializeOwned>(
    &self,
    endpoint: &str,
    body: Option<Value>,
    config: Option<RequestConfig>,
  ) -> Result<T, ApiError> {
    self
      .dispatch(Method::Post, endpoint, body, config.unwrap_or_default())
      .await
  }

  pub async fn put<T: DeserializeOwned>(
    &self,
    endpoint: &str,
    body: Option<Value>,
    config: Option<RequestConfig>,
  ) -> Result<T, ApiError> {
    self
      .dispatch(Method::Put, endpoint, body, config.unwrap_or_default())
      .await
  }

  pub async fn patch<T: DeserializeOwned>(
    &self,
    endpoint: &str,
    body: Option<Value>,
    config: Option<RequestConfig>,
  ) -> Result<T, ApiError> {
    self
      .dispatch(Method::Patch, endpoint, body, config.unwrap_or_default())
      .await
  }

  pub async fn delete<T: DeserializeOwned>(
    &self,
    endpoint: &str,
    config: Option<RequestConfig>,
  ) -> Result<T, ApiError> {
    self
      .dispatch(Method::Delete, endpoint, None, config.unwrap_or_default())
      .await
  }

  /// Wipe both cache tiers.
  pub async fn clear_cache(&self) {
    self.inner.cache.clear().await;
  }

  /// Remove the cache entry for one specific call shape from both tiers.
  pub async fn clear_cache_entry(&self, method: Method, endpoint: &str, body: Option<&Value>) {
    let key = cache_key(method.as_str(), endpoint, body);
    self.inner.cache.remove(&key).await;
  }

  /// Sweep expired entries out of the durable tier.
  pub async fn purge_expired_cache(&self) {
    self.inner.cache.purge_expired().await;
  }

  pub fn request_metrics(&self) -> RequestMetrics {
    self.inner.metrics.snapshot()
  }

  /// Handle for the integration layer that owns the platform connectivity
  /// signal, and for anything that wants to observe transitions.
  pub fn connectivity(&self) -> Arc<ConnectivityMonitor> {
    Arc::clone(&self.inner.connectivity)
  }

  /// Number of requests currently buffered for replay.
  pub fn queue_len(&self) -> usize {
    self.inner.queue.len()
  }

  pub fn add_request_interceptor(&self, interceptor: RequestInterceptor) {
    self.inner.interceptors.add_request(interceptor);
  }

  pub fn add_response_interceptor(&self, interceptor: ResponseInterceptor) {
    self.inner.interceptors.add_response(interceptor);
  }

  pub fn add_error_interceptor(&self, interceptor: ErrorInterceptor) {
    self.inner.interceptors.add_error(interceptor);
  }

  async fn dispatch<T: DeserializeOwned>(
    &self,
    method: Method,
    endpoint: &str,
    body: Option<Value>,
    config: RequestConfig,
  ) -> Result<T, ApiError> {
    let value = self
      .dispatch_inner(method, endpoint, body, config, true)
      .await?;

    // Cancellation has no effect from this point on: the response is
    // already in hand and decoding is synchronous.
    serde_json::from_value(value).map_err(|e| ApiError::Validation {
      message: format!("failed to decode response body: {}", e),
      body: None,
    })
  }

  /// The per-call state machine. `queue_on_offline` is false during queue
  /// replay so a still-offline failure re-enters the queue exactly once,
  /// via the drain loop's tail push.
  async fn dispatch_inner(
    &self,
    method: Method,
    endpoint: &str,
    body: Option<Value>,
    config: RequestConfig,
    queue_on_offline: bool,
  ) -> Result<Value, ApiError> {
    let started = Instant::now();

    let config = self.inner.interceptors.apply_request(config);
    let strategy = config.strategy.unwrap_or(if method.is_get() {
      CacheStrategy::CacheFirst
    } else {
      CacheStrategy::NoStore
    });
    let key = cache_key(method.as_str(), endpoint, body.as_ref());

    // Offline non-GETs are never attempted: buffer and fail immediately.
    if !method.is_get() && !self.inner.connectivity.is_online() {
      if queue_on_offline {
        self.inner.queue.push(QueuedRequest {
          method,
          endpoint: endpoint.to_string(),
          body: body.clone(),
          config: config.clone(),
        });
        debug!(%method, endpoint, "offline, buffered for replay");
      }
      self.inner.metrics.record(started.elapsed(), false);
      return Err(self.inner.interceptors.apply_error(ApiError::Network {
        message: "device is offline, request queued for later".into(),
      }));
    }

    // A fresh cache hit short-circuits the network call entirely.
    if strategy.reads_before_network() {
      if let Some(hit) = self.inner.cache.get(&key, strategy).await {
        debug!(%method, endpoint, "served from cache");
        self.inner.metrics.record(started.elapsed(), true);
        return Ok(hit);
      }
    }

    let result = if config.batch && method.is_get() {
      self.coalesced_attempt(&key, method, endpoint, &body, &config).await
    } else {
      self.attempt_with_retry(method, endpoint, &body, &config).await
    };

    match result {
      Ok(value) => {
        self.inner.cache.set(&key, &value, strategy).await;
        self.inner.metrics.record(started.elapsed(), true);
        Ok(value)
      }
      Err(err) => {
        // Network-first degrades to the cached copy on any failure.
        if strategy.falls_back_on_failure() {
          if let Some(hit) = self.inner.cache.get(&key, strategy).await {
            debug!(%method, endpoint, "network failed, serving cached fallback");
            self.inner.metrics.record(started.elapsed(), true);
            return Ok(hit);
          }
        }
        self.inner.metrics.record(started.elapsed(), false);
        Err(self.inner.interceptors.apply_error(err))
      }
    }
  }

  /// Coalesce concurrent batchable calls sharing a cache key: the leader
  /// waits out the collection window, dispatches once, and every attached
  /// follower shares the outcome.
  async fn coalesced_attempt(
    &self,
    key: &str,
    method: Method,
    endpoint: &str,
    body: &Option<Value>,
    config: &RequestConfig,
  ) -> Result<Value, ApiError> {
    match self.inner.coalescer.join(key) {
      Slot::Leader(tx) => {
        tokio::time::sleep(self.inner.coalescer.window()).await;
        let result = self.attempt_with_retry(method, endpoint, body, config).await;
        self.inner.coalescer.complete(key, &tx, result.clone());
        result
      }
      Slot::Follower(mut rx) => match rx.recv().await {
        Ok(result) => result,
        Err(_) => Err(ApiError::Network {
          message: "coalesced request was dropped".into(),
        }),
      },
    }
  }

  /// Retry decorator around a single attempt. Composes with the
  /// timeout/cancel race rather than interfering: each attempt gets a
  /// fresh timeout budget.
  async fn attempt_with_retry(
    &self,
    method: Method,
    endpoint: &str,
    body: &Option<Value>,
    config: &RequestConfig,
  ) -> Result<Value, ApiError> {
    let retry = &config.retry;
    let mut attempt = 0u32;

    loop {
      match self.attempt(method, endpoint, body, config).await {
        Ok(value) => return Ok(value),
        Err(err) => {
          if attempt < retry.max_retries && (retry.should_retry)(&err) {
            attempt += 1;
            debug!(%method, endpoint, attempt, %err, "retrying after failure");
            tokio::time::sleep(retry.retry_delay).await;
            continue;
          }
          return Err(err);
        }
      }
    }
  }

  /// One network attempt, raced against the timeout and any external
  /// cancellation token. Abort failures carry an "aborted" marker that the
  /// default error chain maps to a timeout.
  async fn attempt(
    &self,
    method: Method,
    endpoint: &str,
    body: &Option<Value>,
    config: &RequestConfig,
  ) -> Result<Value, ApiError> {
    if !self.inner.connectivity.is_online() {
      return Err(ApiError::Network {
        message: "device is offline".into(),
      });
    }

    let url = self
      .inner
      .base_url
      .join(endpoint.trim_start_matches('/'))
      .map_err(|e| ApiError::Validation {
        message: format!("invalid endpoint {}: {}", endpoint, e),
        body: None,
      })?;

    let mut headers = Vec::new();
    if body.is_some() {
      headers.push(("Content-Type".to_string(), "application/json".to_string()));
    }
    if let Some(token) = &self.inner.token {
      headers.push(("Authorization".to_string(), format!("Bearer {}", token)));
    }
    headers.extend(config.headers.iter().cloned());

    let request = TransportRequest {
      method,
      url: url.to_string(),
      headers,
      body: body.clone(),
    };

    let timeout = config.timeout.unwrap_or(self.inner.default_timeout);
    let send = self.inner.transport.send(request);

    let response = if let Some(cancel) = &config.cancel {
      tokio::select! {
        response = send => response?,
        _ = tokio::time::sleep(timeout) => {
          return Err(abort_error("timeout"));
        }
        _ = cancel.cancelled() => {
          return Err(abort_error("cancelled"));
        }
      }
    } else {
      tokio::select! {
        response = send => response?,
        _ = tokio::time::sleep(timeout) => {
          return Err(abort_error("timeout"));
        }
      }
    };

    let response = self.inner.interceptors.apply_response(response);
    if response.ok() {
      Ok(response.body)
    } else {
      Err(ApiError::from_response(response.status, response.body))
    }
  }

  /// Replay the queued backlog sequentially through the full dispatch path.
  async fn drain_queue(&self) {
    let entries = self.inner.queue.take_all();
    if entries.is_empty() {
      return;
    }

    info!(count = entries.len(), "connectivity restored, draining offline queue");

    for entry in entries {
      let result = self
        .dispatch_inner(
          entry.method,
          &entry.endpoint,
          entry.body.clone(),
          entry.config.clone(),
          false,
        )
        .await;

      if let Err(err) = result {
        warn!(%err, endpoint = %entry.endpoint, "replay failed, re-queueing at tail");
        self.inner.queue.push(entry);
      }
    }
  }

  /// Background task that drains the queue once per offline→online
  /// transition. The subscription is taken before the task is spawned and
  /// delivers every edge in order, so a flip that happens before the task
  /// first runs (or between polls) is still observed. Holds only a weak
  /// handle so dropping the last client shuts it down.
  fn spawn_drain_task(&self) {
    let weak: Weak<ClientInner> = Arc::downgrade(&self.inner);
    let mut rx = self.inner.connectivity.subscribe();

    tokio::spawn(async move {
      while let Some(online) = rx.recv().await {
        if online {
          match weak.upgrade() {
            Some(inner) => ApiClient { inner }.drain_queue().await,
            None => break,
          }
        }
      }
    });
  }
}

/// Builder for [`ApiClient`]. The defaults match production use; tests
/// substitute a mock transport and tighter timings.
pub struct ApiClientBuilder {
  base_url: String,
  token: Option<String>,
  transport: Option<Arc<dyn Transport>>,
  default_timeout: Duration,
  cache_ttl: Option<chrono::Duration>,
  batch_window: Duration,
  durable_path: Option<PathBuf>,
  initially_online: bool,
}

impl ApiClientBuilder {
  pub fn new(base_url: &str) -> Self {
    Self {
      base_url: base_url.to_string(),
      token: None,
      transport: None,
      default_timeout: DEFAULT_TIMEOUT,
      cache_ttl: None,
      batch_window: DEFAULT_BATCH_WINDOW,
      durable_path: None,
      initially_online: true,
    }
  }

  pub fn with_token(mut self, token: String) -> Self {
    self.token = Some(token);
    self
  }

  pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
    self.transport = Some(transport);
    self
  }

  pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
    self.default_timeout = timeout;
    self
  }

  pub fn with_cache_ttl(mut self, ttl: chrono::Duration) -> Self {
    self.cache_ttl = Some(ttl);
    self
  }

  pub fn with_batch_window(mut self, window: Duration) -> Self {
    self.batch_window = window;
    self
  }

  pub fn with_durable_path(mut self, path: PathBuf) -> Self {
    self.durable_path = Some(path);
    self
  }

  pub fn initially_online(mut self, online: bool) -> Self {
    self.initially_online = online;
    self
  }

  /// Construct the client and spawn its queue-drain task.
  ///
  /// Must be called from within a Tokio runtime; calling it outside one
  /// panics when the drain task is spawned.
  pub fn build(self) -> Result<ApiClient> {
    let mut base = self.base_url;
    if !base.ends_with('/') {
      base.push('/');
    }
    let base_url =
      Url::parse(&base).map_err(|e| eyre!("Invalid base URL {}: {}", base, e))?;

    let transport = match self.transport {
      Some(transport) => transport,
      None => Arc::new(HttpTransport::new()?),
    };

    let mut cache = CacheStore::new();
    if let Some(path) = self.durable_path {
      cache = cache.with_durable_path(path);
    }
    if let Some(ttl) = self.cache_ttl {
      cache = cache.with_ttl(ttl);
    }

    let client = ApiClient {
      inner: Arc::new(ClientInner {
        base_url,
        token: self.token,
        transport,
        cache,
        queue: OfflineQueue::new(),
        connectivity: Arc::new(ConnectivityMonitor::new(self.initially_online)),
        interceptors: Interceptors::with_defaults(),
        coalescer: RequestCoalescer::new(self.batch_window),
        metrics: MetricsCollector::new(),
        default_timeout: self.default_timeout,
      }),
    };

    client.spawn_drain_task();
    Ok(client)
  }
}

fn abort_error(reason: &str) -> ApiError {
  ApiError::Network {
    message: format!("request aborted ({})", reason),
  }
}
