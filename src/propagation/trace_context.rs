//! W3C Trace Context propagator
//!
//! Implements the [W3C Trace Context](https://www.w3.org/TR/trace-context/)
//! `traceparent` / `tracestate` pair.
//!
//! ## Headers
//!
//! - **traceparent**: `{version}-{trace-id}-{parent-id}-{trace-flags}`
//!   - Example: `00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01`
//! - **tracestate**: vendor list, carried opaquely
//!   - Example: `congo=t61rcWkgMzE,rojo=00f067aa0ba902b7`

use super::{set_if_absent, Propagator, TRACEPARENT, TRACESTATE};
use crate::carrier::Carrier;
use crate::context::{IdError, PropagationContext, SpanId, TraceContext, TraceFlags, TraceId};
use thiserror::Error;

/// Reasons a `traceparent` value is rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TraceParentError {
    #[error("expected 4 dash-separated fields, got {0}")]
    FieldCount(usize),

    #[error("invalid version field: {0}")]
    InvalidVersion(String),

    #[error("invalid trace id: {0}")]
    InvalidTraceId(IdError),

    #[error("invalid parent span id: {0}")]
    InvalidSpanId(IdError),

    #[error("invalid trace flags: {0}")]
    InvalidFlags(String),
}

/// Parse a `traceparent` value into a remote [`TraceContext`]
///
/// Version `00` must have exactly four fields. Higher versions may append
/// fields, which are ignored. Version `ff` is always invalid.
///
/// # Example
///
/// ```
/// use tsunagi::propagation::parse_traceparent;
///
/// let cx = parse_traceparent("00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01").unwrap();
/// assert_eq!(cx.span_id.to_string(), "b7ad6b7169203331");
/// assert!(cx.is_sampled());
/// assert!(cx.is_remote);
/// ```
pub fn parse_traceparent(value: &str) -> Result<TraceContext, TraceParentError> {
    let parts: Vec<&str> = value.trim().split('-').collect();
    if parts.len() < 4 {
        return Err(TraceParentError::FieldCount(parts.len()));
    }

    let version = parts[0];
    let version_valid = version.len() == 2
        && version.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        && version != "ff";
    if !version_valid {
        return Err(TraceParentError::InvalidVersion(version.to_string()));
    }

    if version == "00" && parts.len() != 4 {
        return Err(TraceParentError::FieldCount(parts.len()));
    }

    let trace_id = TraceId::from_hex(parts[1]).map_err(TraceParentError::InvalidTraceId)?;
    let span_id = SpanId::from_hex(parts[2]).map_err(TraceParentError::InvalidSpanId)?;

    let flags = parts[3];
    if flags.len() != 2 || !flags.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(TraceParentError::InvalidFlags(flags.to_string()));
    }
    let flags =
        u8::from_str_radix(flags, 16).map_err(|_| TraceParentError::InvalidFlags(flags.to_string()))?;

    Ok(TraceContext::new(trace_id, span_id, TraceFlags::new(flags), true))
}

/// Propagates `traceparent` and `tracestate`
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceContextPropagator;

impl TraceContextPropagator {
    pub fn new() -> Self {
        Self
    }
}

impl Propagator for TraceContextPropagator {
    fn extract(&self, carrier: &dyn Carrier, current: &PropagationContext) -> PropagationContext {
        let Some(traceparent) = carrier.get(TRACEPARENT) else {
            #[cfg(feature = "metrics")]
            crate::metrics::record_extraction("absent");
            return current.clone();
        };

        match parse_traceparent(traceparent) {
            Ok(trace) => {
                let trace_state = carrier.get(TRACESTATE).unwrap_or_default().trim();
                #[cfg(feature = "metrics")]
                crate::metrics::record_extraction("extracted");
                current.clone().with_trace(trace.with_trace_state(trace_state))
            }
            Err(e) => {
                tracing::debug!(
                    traceparent = %traceparent,
                    error = %e,
                    "Ignoring malformed traceparent"
                );
                #[cfg(feature = "metrics")]
                crate::metrics::record_extraction("malformed");
                current.clone()
            }
        }
    }

    fn inject(&self, cx: &PropagationContext, carrier: &mut dyn Carrier) {
        let Some(trace) = cx.valid_parent() else {
            return;
        };

        set_if_absent(carrier, TRACEPARENT, trace.to_traceparent());
        set_if_absent(carrier, TRACESTATE, trace.trace_state.clone());
    }

    fn fields(&self) -> Vec<&'static str> {
        vec![TRACEPARENT, TRACESTATE]
    }
}
