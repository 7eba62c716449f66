//! The resilient request engine: dispatcher, interceptors, offline queue,
//! request coalescing and metrics.
//!
//! Every UI-facing call routes through [`ApiClient`], which turns unreliable
//! and possibly-offline HTTP calls into tiered-cached, timeout-guarded,
//! connectivity-aware operations with a typed error taxonomy.

mod coalesce;
mod connectivity;
mod dispatcher;
mod interceptor;
mod metrics;
mod queue;
mod request;
mod transport;

pub use connectivity::ConnectivityMonitor;
pub use dispatcher::{ApiClient, ApiClientBuilder};
pub use interceptor::{ErrorInterceptor, RequestInterceptor, ResponseInterceptor};
pub use metrics::RequestMetrics;
pub use queue::QueuedRequest;
pub use request::{CancelToken, Method, Priority, RequestConfig, RetryPolicy};
pub use transport::{HttpTransport, RawResponse, Transport, TransportRequest};
