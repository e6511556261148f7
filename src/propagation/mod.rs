//! Propagation engine
//!
//! Extracts and injects [`PropagationContext`] over any [`Carrier`] using the
//! W3C well-known keys.
//!
//! # Guarantees
//!
//! - Extraction never mutates the carrier and never fails: a missing or
//!   malformed `traceparent` falls back to the caller's current context.
//! - Injection never overwrites a key that already holds a non-empty value,
//!   so retried middleware is idempotent.
//!
//! # Example
//!
//! ```
//! use tsunagi::carrier::{Carrier, MessageAttributes};
//! use tsunagi::context::PropagationContext;
//! use tsunagi::propagation::PropagationEngine;
//!
//! let engine = PropagationEngine::default();
//!
//! let mut attrs = MessageAttributes::new();
//! attrs.set(
//!     "traceparent",
//!     "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01".to_string(),
//! );
//!
//! let cx = engine.extract(&attrs, &PropagationContext::root());
//! let trace = cx.trace().unwrap();
//! assert_eq!(trace.trace_id.to_string(), "0af7651916cd43dd8448eb211c80319c");
//! assert!(trace.is_remote);
//! ```

mod baggage;
#[cfg(feature = "opentelemetry")]
pub mod otel;
mod trace_context;

pub use baggage::BaggagePropagator;
pub use trace_context::{parse_traceparent, TraceContextPropagator, TraceParentError};

use crate::carrier::Carrier;
use crate::context::{self, PropagationContext};
use std::fmt;
use std::sync::Arc;

/// Key carrying the W3C trace parent
pub const TRACEPARENT: &str = "traceparent";

/// Key carrying the W3C vendor trace state
pub const TRACESTATE: &str = "tracestate";

/// Key carrying W3C baggage
pub const BAGGAGE: &str = "baggage";

/// Pluggable extract/inject algorithm over a carrier
pub trait Propagator: Send + Sync + fmt::Debug {
    /// Read context from `carrier`, falling back to `current` for anything
    /// this propagator does not find or cannot parse
    fn extract(&self, carrier: &dyn Carrier, current: &PropagationContext) -> PropagationContext;

    /// Write `cx` into `carrier` without overwriting existing values
    fn inject(&self, cx: &PropagationContext, carrier: &mut dyn Carrier);

    /// Keys this propagator reads and writes
    fn fields(&self) -> Vec<&'static str>;
}

/// Write `value` under `key` unless the value is blank or the key already
/// holds a non-empty value. Returns true when the carrier was written.
pub fn set_if_absent(carrier: &mut dyn Carrier, key: &str, value: String) -> bool {
    if key.trim().is_empty() || value.trim().is_empty() {
        return false;
    }

    if carrier.get(key).is_some_and(|existing| !existing.is_empty()) {
        tracing::trace!(key = %key, "Carrier already holds key, not overwriting");
        #[cfg(feature = "metrics")]
        crate::metrics::record_injection_skipped("already_present");
        return false;
    }

    carrier.set(key, value);
    true
}

/// Runs several propagators in order
#[derive(Debug, Default)]
pub struct CompositePropagator {
    propagators: Vec<Box<dyn Propagator>>,
}

impl CompositePropagator {
    pub fn new(propagators: Vec<Box<dyn Propagator>>) -> Self {
        Self { propagators }
    }

    pub fn len(&self) -> usize {
        self.propagators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.propagators.is_empty()
    }
}

impl Propagator for CompositePropagator {
    fn extract(&self, carrier: &dyn Carrier, current: &PropagationContext) -> PropagationContext {
        self.propagators
            .iter()
            .fold(current.clone(), |cx, p| p.extract(carrier, &cx))
    }

    fn inject(&self, cx: &PropagationContext, carrier: &mut dyn Carrier) {
        for propagator in &self.propagators {
            propagator.inject(cx, carrier);
        }
    }

    fn fields(&self) -> Vec<&'static str> {
        self.propagators.iter().flat_map(|p| p.fields()).collect()
    }
}

/// Carrier-agnostic extract/inject front end
///
/// Cheap to clone; the propagator is shared read-only.
#[derive(Debug, Clone)]
pub struct PropagationEngine {
    propagator: Arc<dyn Propagator>,
}

impl PropagationEngine {
    pub fn new<P: Propagator + 'static>(propagator: P) -> Self {
        Self {
            propagator: Arc::new(propagator),
        }
    }

    pub fn from_arc(propagator: Arc<dyn Propagator>) -> Self {
        Self { propagator }
    }

    /// Extract from `carrier`, falling back to `current`
    pub fn extract(&self, carrier: &dyn Carrier, current: &PropagationContext) -> PropagationContext {
        self.propagator.extract(carrier, current)
    }

    /// Extract from `carrier`, falling back to this task's current context
    pub fn extract_current(&self, carrier: &dyn Carrier) -> PropagationContext {
        self.extract(carrier, &context::current())
    }

    /// Inject `cx` into `carrier`
    pub fn inject(&self, cx: &PropagationContext, carrier: &mut dyn Carrier) {
        self.propagator.inject(cx, carrier);
    }

    /// Inject this task's current context into `carrier`
    pub fn inject_current(&self, carrier: &mut dyn Carrier) {
        self.inject(&context::current(), carrier);
    }

    pub fn fields(&self) -> Vec<&'static str> {
        self.propagator.fields()
    }
}

impl Default for PropagationEngine {
    /// W3C trace context followed by W3C baggage
    fn default() -> Self {
        Self::new(CompositePropagator::new(vec![
            Box::new(TraceContextPropagator::new()),
            Box::new(BaggagePropagator::new()),
        ]))
    }
}
