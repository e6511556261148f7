//! OpenTelemetry propagator adapter
//!
//! Lets any [`opentelemetry::propagation::TextMapPropagator`] (Jaeger, B3,
//! the SDK's composite, ...) drive the engine, and exposes our carriers to
//! OpenTelemetry code as `Injector` / `Extractor`.
//!
//! ```
//! use opentelemetry_sdk::propagation::TraceContextPropagator;
//! use tsunagi::propagation::otel::OtelPropagator;
//! use tsunagi::propagation::PropagationEngine;
//!
//! let engine = PropagationEngine::new(OtelPropagator::new(TraceContextPropagator::new()));
//! assert_eq!(engine.fields(), vec!["traceparent", "tracestate"]);
//! ```

use super::Propagator;
use crate::carrier::Carrier;
use crate::context::{Baggage, PropagationContext, SpanId, TraceContext, TraceFlags, TraceId};
use opentelemetry::baggage::BaggageExt;
use opentelemetry::propagation::{Extractor, Injector, TextMapPropagator};
use opentelemetry::trace::{self as otel_trace, TraceContextExt};
use opentelemetry::{Context, KeyValue};
use std::fmt;
use std::str::FromStr;

/// Read-only view of a carrier for OpenTelemetry extractors
pub struct CarrierExtractor<'a>(pub &'a dyn Carrier);

impl Extractor for CarrierExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key)
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys()
    }
}

/// Write view of a carrier for OpenTelemetry injectors
///
/// Writes keep the "never overwrite" rule.
pub struct CarrierInjector<'a>(pub &'a mut dyn Carrier);

impl Injector for CarrierInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        super::set_if_absent(&mut *self.0, key, value);
    }
}

/// Convert our context into an OpenTelemetry [`Context`]
pub fn to_otel_context(cx: &PropagationContext) -> Context {
    let mut otel_cx = Context::new();

    if let Some(trace) = cx.valid_parent() {
        let trace_state = otel_trace::TraceState::from_str(&trace.trace_state).unwrap_or_default();
        let span_context = otel_trace::SpanContext::new(
            otel_trace::TraceId::from_bytes(trace.trace_id.as_u128().to_be_bytes()),
            otel_trace::SpanId::from_bytes(trace.span_id.as_u64().to_be_bytes()),
            otel_trace::TraceFlags::new(trace.flags.to_u8()),
            trace.is_remote,
            trace_state,
        );
        otel_cx = otel_cx.with_remote_span_context(span_context);
    }

    if !cx.baggage().is_empty() {
        let entries: Vec<KeyValue> = cx
            .baggage()
            .iter()
            .map(|(k, v)| KeyValue::new(k.to_string(), v.to_string()))
            .collect();
        otel_cx = otel_cx.with_baggage(entries);
    }

    otel_cx
}

/// Convert an OpenTelemetry [`Context`] back into ours
pub fn from_otel_context(otel_cx: &Context) -> PropagationContext {
    let span_context = otel_cx.span().span_context().clone();

    let trace = span_context.is_valid().then(|| {
        TraceContext::new(
            TraceId::new(u128::from_be_bytes(span_context.trace_id().to_bytes())),
            SpanId::new(u64::from_be_bytes(span_context.span_id().to_bytes())),
            TraceFlags::new(span_context.trace_flags().to_u8()),
            span_context.is_remote(),
        )
        .with_trace_state(span_context.trace_state().header())
    });

    let baggage: Baggage = otel_cx
        .baggage()
        .iter()
        .map(|(key, (value, _metadata))| (key.as_str().to_string(), value.as_str().into_owned()))
        .collect();

    PropagationContext::new(trace, baggage)
}

/// Drives the engine with an OpenTelemetry propagator
pub struct OtelPropagator<P> {
    inner: P,
}

impl<P: TextMapPropagator> OtelPropagator<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }
}

impl<P> fmt::Debug for OtelPropagator<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OtelPropagator")
            .field("inner", &std::any::type_name::<P>())
            .finish()
    }
}

impl<P> Propagator for OtelPropagator<P>
where
    P: TextMapPropagator + Send + Sync,
{
    fn extract(&self, carrier: &dyn Carrier, current: &PropagationContext) -> PropagationContext {
        let otel_current = to_otel_context(current);
        let extracted = self
            .inner
            .extract_with_context(&otel_current, &CarrierExtractor(carrier));
        let mut cx = from_otel_context(&extracted);

        // Keep a local current trace when the carrier had nothing usable
        if cx.trace().is_none() {
            if let Some(trace) = current.trace() {
                cx = cx.with_trace(trace.clone());
            }
        }

        cx
    }

    fn inject(&self, cx: &PropagationContext, carrier: &mut dyn Carrier) {
        self.inner
            .inject_context(&to_otel_context(cx), &mut CarrierInjector(carrier));
    }

    fn fields(&self) -> Vec<&'static str> {
        // FieldIter borrows from the propagator; the keys we know are static
        let known = [super::TRACEPARENT, super::TRACESTATE, super::BAGGAGE];
        self.inner
            .fields()
            .filter_map(|field| known.iter().copied().find(|k| *k == field))
            .collect()
    }
}
