//! Propagation Performance Benchmarks
//!
//! Measures the per-call cost of extraction, injection and span creation,
//! which runs on every request and every message.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hyper::HeaderMap;
use tsunagi::carrier::{Carrier, MessageAttributes};
use tsunagi::context::{PropagationContext, SpanId, TraceContext, TraceFlags, TraceId};
use tsunagi::correlation::{CorrelationBridge, InflightParent, ParentSlot};
use tsunagi::propagation::PropagationEngine;
use tsunagi::telemetry::{Sampler, SpanFactory, SpanKind};

fn sample_context() -> PropagationContext {
    let trace = TraceContext::new(
        TraceId::from_hex("0af7651916cd43dd8448eb211c80319c").unwrap(),
        SpanId::from_hex("b7ad6b7169203331").unwrap(),
        TraceFlags::SAMPLED,
        false,
    )
    .with_trace_state("congo=t61rcWkgMzE");

    PropagationContext::new(Some(trace), [("X-Tenant", "acme")].into_iter().collect())
}

/// Benchmark extraction from HTTP headers and message attributes
fn bench_extract(c: &mut Criterion) {
    let engine = PropagationEngine::default();
    let cx = sample_context();

    let mut headers = HeaderMap::new();
    engine.inject(&cx, &mut headers);

    let mut attrs = MessageAttributes::new();
    engine.inject(&cx, &mut attrs);

    let mut group = c.benchmark_group("extract");

    group.bench_function("headers", |b| {
        b.iter(|| black_box(engine.extract(black_box(&headers), &PropagationContext::root())));
    });

    group.bench_function("message_attributes", |b| {
        b.iter(|| black_box(engine.extract(black_box(&attrs), &PropagationContext::root())));
    });

    let mut malformed = HeaderMap::new();
    malformed.insert("traceparent", "00-not-a-valid-traceparent-01".parse().unwrap());
    group.bench_function("malformed", |b| {
        b.iter(|| black_box(engine.extract(black_box(&malformed), &PropagationContext::root())));
    });

    group.finish();
}

/// Benchmark injection into fresh and already-populated carriers
fn bench_inject(c: &mut Criterion) {
    let engine = PropagationEngine::default();
    let cx = sample_context();

    let mut group = c.benchmark_group("inject");

    group.bench_function("headers", |b| {
        b.iter(|| {
            let mut headers = HeaderMap::new();
            engine.inject(black_box(&cx), &mut headers);
            black_box(headers);
        });
    });

    let mut populated = MessageAttributes::new();
    engine.inject(&cx, &mut populated);
    group.bench_function("message_attributes_present", |b| {
        b.iter(|| {
            let mut attrs = populated.clone();
            engine.inject(black_box(&cx), &mut attrs);
            black_box(attrs);
        });
    });

    group.finish();
}

/// Benchmark span creation under different samplers
fn bench_span_start(c: &mut Criterion) {
    let parent = sample_context();
    let mut group = c.benchmark_group("span_start");

    for (name, sampler) in [
        ("always_on", Sampler::AlwaysOn),
        ("always_off", Sampler::AlwaysOff),
        ("ratio_10", Sampler::TraceIdRatio(0.1)),
    ] {
        let factory = SpanFactory::with_sampler(sampler);
        group.bench_with_input(BenchmarkId::from_parameter(name), &factory, |b, factory| {
            b.iter(|| black_box(factory.start(SpanKind::Producer, "SendMessage send", &parent)));
        });
    }

    group.finish();
}

/// Benchmark the legacy correlation bridge
fn bench_correlation_bridge(c: &mut Criterion) {
    let bridge = CorrelationBridge::default();
    let mut headers = HeaderMap::new();
    Carrier::set(
        &mut headers,
        "X-CorrelationId",
        "3fa85f64-5717-4562-b3fc-2c963f66afa6".to_string(),
    );

    c.bench_function("correlation_bridge", |b| {
        b.iter(|| {
            let mut slot = ParentSlot::new(InflightParent::Absent);
            black_box(bridge.apply(black_box(&headers), &mut slot));
        });
    });
}

criterion_group!(
    benches,
    bench_extract,
    bench_inject,
    bench_span_start,
    bench_correlation_bridge
);
criterion_main!(benches);
