//! Resilient API access layer for the Larder recipe/menu application.
//!
//! Every UI component routes its HTTP calls through [`ApiClient`], which
//! turns unreliable, possibly-offline calls into a service with:
//!
//! - tiered caching (in-memory + durable SQLite) with a 5-minute TTL
//! - per-call timeout and external cancellation
//! - connectivity-aware queuing of offline mutations, replayed on reconnect
//! - pluggable request/response/error interceptor chains
//! - coalescing of concurrent identical calls
//! - running request metrics and a typed error taxonomy
//!
//! The client is an explicit, constructed service: build one at the
//! application root (from [`Config`] or via [`ApiClient::builder`]) and
//! inject it; there is no ambient global.
//!
//! ```no_run
//! use larder_client::{ApiClient, Config};
//!
//! # async fn run() -> color_eyre::Result<()> {
//! let config = Config::load(None)?;
//! let client = ApiClient::new(&config)?;
//!
//! let recipes: serde_json::Value = client.get("/recipes", None).await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod error;

pub use cache::{CacheStore, CacheStrategy};
pub use client::{
  ApiClient, ApiClientBuilder, CancelToken, ConnectivityMonitor, HttpTransport, Method, Priority,
  RawResponse, RequestConfig, RequestMetrics, RetryPolicy, Transport, TransportRequest,
};
pub use config::Config;
pub use error::ApiError;

/// Install a global tracing subscriber filtered by `RUST_LOG`.
///
/// Convenience for binaries and examples; applications with their own
/// subscriber should skip this. Safe to call more than once.
pub fn init_tracing() {
  use tracing_subscriber::EnvFilter;

  let _ = tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .try_init();
}
