//! Propagation Engine Tests
//!
//! These tests verify that:
//! - Valid traceparents survive an inject/extract round trip on every carrier
//! - Injection never overwrites keys that are already present
//! - Malformed input falls back to the current context

use hyper::HeaderMap;
use rand::Rng;
use tsunagi::carrier::{AttributeNames, Carrier, MessageAttributes};
use tsunagi::context::{self, Baggage, PropagationContext, SpanId, TraceContext, TraceFlags, TraceId};
use tsunagi::propagation::{parse_traceparent, PropagationEngine, TRACEPARENT, TRACESTATE};

fn random_context(rng: &mut impl Rng) -> TraceContext {
    let trace_id = TraceId::new(rng.random_range(1..=u128::MAX));
    let span_id = SpanId::new(rng.random_range(1..=u64::MAX));
    let flags = TraceFlags::new(rng.random_range(0..=1));
    TraceContext::new(trace_id, span_id, flags, false)
}

#[test]
fn test_random_traceparents_round_trip() {
    let mut rng = rand::rng();

    for _ in 0..500 {
        let trace = random_context(&mut rng);
        let parsed = parse_traceparent(&trace.to_traceparent()).unwrap();

        assert_eq!(parsed.trace_id, trace.trace_id);
        assert_eq!(parsed.span_id, trace.span_id);
        assert_eq!(parsed.flags, trace.flags);
        assert!(parsed.is_remote);
    }
}

#[test]
fn test_round_trip_through_every_carrier() {
    let engine = PropagationEngine::default();
    let mut rng = rand::rng();
    let trace = random_context(&mut rng).with_trace_state("rojo=00f067aa0ba902b7");
    let cx = PropagationContext::new(Some(trace.clone()), [("X-Tenant", "acme")].into_iter().collect());

    let mut headers = HeaderMap::new();
    engine.inject(&cx, &mut headers);
    let from_headers = engine.extract(&headers, &PropagationContext::root());

    let mut attrs = MessageAttributes::new();
    engine.inject(&cx, &mut attrs);
    let from_attrs = engine.extract(&attrs, &PropagationContext::root());

    for extracted in [from_headers, from_attrs] {
        let extracted_trace = extracted.trace().unwrap();
        assert_eq!(extracted_trace.trace_id, trace.trace_id);
        assert_eq!(extracted_trace.span_id, trace.span_id);
        assert_eq!(extracted_trace.trace_state, "rojo=00f067aa0ba902b7");
        assert_eq!(extracted.baggage().get("X-Tenant"), Some("acme"));
    }
}

#[test]
fn test_inject_never_overwrites_existing_values() {
    let engine = PropagationEngine::default();
    let existing = "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01";

    let mut headers = HeaderMap::new();
    headers.insert(TRACEPARENT, existing.parse().unwrap());
    headers.insert(TRACESTATE, "congo=t61rcWkgMzE".parse().unwrap());

    let cx = PropagationContext::root().with_trace(TraceContext::new_root(true).with_trace_state("rojo=1"));
    engine.inject(&cx, &mut headers);

    assert_eq!(Carrier::get(&headers, TRACEPARENT), Some(existing));
    assert_eq!(Carrier::get(&headers, TRACESTATE), Some("congo=t61rcWkgMzE"));
}

#[test]
fn test_inject_fills_empty_values() {
    let engine = PropagationEngine::default();
    let mut attrs = MessageAttributes::new();
    attrs.set(TRACEPARENT, String::new());

    let cx = PropagationContext::root().with_trace(TraceContext::new_root(true));
    engine.inject(&cx, &mut attrs);

    assert_eq!(attrs.get(TRACEPARENT), Some(cx.trace().unwrap().to_traceparent().as_str()));
}

#[test]
fn test_extract_does_not_mutate_carrier() {
    let engine = PropagationEngine::default();
    let mut headers = HeaderMap::new();
    headers.insert(TRACEPARENT, "not-a-traceparent".parse().unwrap());
    let before = headers.clone();

    let _ = engine.extract(&headers, &PropagationContext::root());
    assert_eq!(headers, before);
}

#[tokio::test]
async fn test_malformed_traceparent_falls_back_to_current() {
    let engine = PropagationEngine::default();
    let mut baggage = Baggage::new();
    baggage.insert("X-Region", "eu");
    let current = PropagationContext::new(Some(TraceContext::new_root(true)), baggage);

    let mut attrs = MessageAttributes::new();
    attrs.set(TRACEPARENT, "00-zz-zz-01".to_string());

    let extracted = context::scope(current.clone(), async { engine.extract_current(&attrs) }).await;
    assert_eq!(extracted, current);
}

#[test]
fn test_allow_list_gains_only_missing_names() {
    let engine = PropagationEngine::default();
    let cx = PropagationContext::root().with_trace(TraceContext::new_root(true));

    let mut all = AttributeNames::all();
    engine.inject(&cx, &mut all);
    assert_eq!(all, AttributeNames::all());

    let mut empty = AttributeNames::new();
    engine.inject(&cx, &mut empty);
    assert_eq!(empty.as_slice(), [TRACEPARENT.to_string()]);
}
