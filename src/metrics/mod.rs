//! Metrics module
//!
//! Prometheus counters for propagation outcomes. Every degraded path
//! (malformed parent, refused override, skipped injection) is counted here
//! so that trace completeness can be monitored without failing requests.

use lazy_static::lazy_static;
use prometheus::{register_counter_vec, CounterVec, Encoder, TextEncoder};

lazy_static! {
    // Extraction metrics
    pub static ref EXTRACTIONS_TOTAL: CounterVec = register_counter_vec!(
        "tsunagi_extractions_total",
        "traceparent extraction attempts by outcome",
        &["outcome"]  // "extracted", "absent" or "malformed"
    ).unwrap();

    // Correlation bridge metrics
    pub static ref CORRELATION_BRIDGE_TOTAL: CounterVec = register_counter_vec!(
        "tsunagi_correlation_bridge_total",
        "Legacy correlation id bridge decisions by outcome",
        &["outcome"]
    ).unwrap();

    // Span metrics
    pub static ref SPANS_STARTED_TOTAL: CounterVec = register_counter_vec!(
        "tsunagi_spans_started_total",
        "Spans started by kind and sampling decision",
        &["kind", "sampled"]
    ).unwrap();

    // Injection metrics
    pub static ref INJECTIONS_SKIPPED_TOTAL: CounterVec = register_counter_vec!(
        "tsunagi_injections_skipped_total",
        "Carrier writes that were skipped",
        &["reason"]  // "already_present" or "attribute_limit"
    ).unwrap();
}

/// Record the outcome of reading `traceparent` from a carrier
pub fn record_extraction(outcome: &str) {
    EXTRACTIONS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record a correlation bridge decision
pub fn record_bridge_outcome(outcome: &str) {
    CORRELATION_BRIDGE_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record a started span
pub fn record_span_started(kind: &str, sampled: bool) {
    let sampled = if sampled { "true" } else { "false" };
    SPANS_STARTED_TOTAL.with_label_values(&[kind, sampled]).inc();
}

/// Record a carrier write that did not happen
pub fn record_injection_skipped(reason: &str) {
    INJECTIONS_SKIPPED_TOTAL.with_label_values(&[reason]).inc();
}

/// Render the default registry in the Prometheus text format
///
/// Hosts expose this on their own scrape endpoint.
pub fn encode_text() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
