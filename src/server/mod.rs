//! Inbound HTTP request tracing
//!
//! Hooks the hosting framework's "request started" point: the correlation
//! bridge runs once, then the server span starts and the handler runs inside
//! its propagation scope.

mod http_tracing;

pub use http_tracing::{RequestTrace, RequestTracer, REQUEST_ID_HEADER};
