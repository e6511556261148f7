//! Tsunagi Library
//!
//! Distributed-trace context propagation for HTTP requests and SQS/SNS
//! messaging, with a bridge from legacy `X-CorrelationId` GUIDs onto W3C
//! trace context.
//!
//! # Features
//!
//! - **W3C Trace Context**: `traceparent`, `tracestate` and `baggage` over any carrier
//! - **Messaging**: message attributes, batch entries and receive allow-lists
//! - **Signed Pipelines**: header injection runs after signing, outside the signature
//! - **Legacy Bridge**: GUID correlation ids adopted as trace ids when no native parent exists
//! - **Metrics**: Prometheus counters for extraction, bridging and injection (feature `metrics`)
//!
//! # Example
//!
//! ```
//! use hyper::{HeaderMap, Method};
//! use tsunagi::config::Config;
//!
//! let config = Config::default();
//! let tracer = config.request_tracer(config.span_factory());
//!
//! let mut headers = HeaderMap::new();
//! headers.insert("X-CorrelationId", "3fa85f64-5717-4562-b3fc-2c963f66afa6".parse().unwrap());
//!
//! let trace = tracer.begin(&Method::GET, "/orders", &headers);
//! assert_eq!(
//!     trace.span().context().trace_id.to_string(),
//!     "3fa85f6457174562b3fc2c963f66afa6"
//! );
//! ```

pub mod carrier;
pub mod config;
pub mod context;
pub mod correlation;
pub mod enrichment;
pub mod interceptors;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod pipeline;
pub mod propagation;
pub mod server;
pub mod telemetry;

// Re-export commonly used types
pub use config::Config;
pub use context::{PropagationContext, TraceContext};
pub use propagation::PropagationEngine;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
