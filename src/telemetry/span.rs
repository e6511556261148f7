//! Spans and the factory that creates them
//!
//! A [`Span`] is owned by whoever started it and is closed when dropped, so
//! every exit path of the owning code (return, `?`, panic unwinding, or the
//! owning future being cancelled) ends it exactly once.
//!
//! # Semantic conventions
//!
//! | Tag | Description | Example |
//! |-----|-------------|---------|
//! | `messaging.system` | Messaging transport | `AmazonSQS` |
//! | `messaging.destination_kind` | Destination kind | `queue` |
//! | `messaging.sqs.message.id` | SQS message id | `059f36b4-...` |
//! | `messaging.sns.topic.arn` | SNS topic | `arn:aws:sns:...` |
//! | `http.method` | Request method | `GET` |
//! | `http.target` | Request path | `/orders/42` |

use super::sampling::Sampler;
use crate::context::{PropagationContext, SpanId, TraceContext, TraceFlags, TraceId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub const MESSAGING_SYSTEM: &str = "messaging.system";
pub const MESSAGING_DESTINATION_KIND: &str = "messaging.destination_kind";

/// Role of a span in its trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpanKind {
    /// Inbound request handling
    Server,
    /// Outbound publish/send
    Producer,
    /// Inbound message processing
    Consumer,
    Internal,
}

impl SpanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanKind::Server => "server",
            SpanKind::Producer => "producer",
            SpanKind::Consumer => "consumer",
            SpanKind::Internal => "internal",
        }
    }
}

impl fmt::Display for SpanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Messaging transport a span talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessagingSystem {
    Sqs,
    Sns,
}

impl MessagingSystem {
    /// Value of the `messaging.system` tag
    pub fn system_name(&self) -> &'static str {
        match self {
            MessagingSystem::Sqs => "AmazonSQS",
            MessagingSystem::Sns => "AmazonSNS",
        }
    }

    /// Short entity name used in consumer span names
    pub fn entity(&self) -> &'static str {
        match self {
            MessagingSystem::Sqs => "SQS",
            MessagingSystem::Sns => "SNS",
        }
    }
}

/// Final status of a span
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SpanStatus {
    #[default]
    Unset,
    Ok,
    Error(String),
}

/// A span after it was closed, as handed to [`SpanProcessor::on_end`]
#[derive(Debug, Clone)]
pub struct FinishedSpan {
    pub name: String,
    pub kind: SpanKind,
    pub context: TraceContext,
    /// `None` for roots and for continuations of a legacy correlation id
    pub parent_span_id: Option<SpanId>,
    pub tags: BTreeMap<String, String>,
    pub status: SpanStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl FinishedSpan {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn duration_ms(&self) -> i64 {
        (self.end_time - self.start_time).num_milliseconds()
    }
}

/// Receives span lifecycle events; the seam to an exporter
pub trait SpanProcessor: Send + Sync + fmt::Debug {
    fn on_start(&self, _name: &str, _kind: SpanKind, _context: &TraceContext) {}

    fn on_end(&self, span: FinishedSpan);
}

/// Emits one `tracing` event per finished span
#[derive(Debug, Default)]
pub struct LogSpanProcessor;

impl SpanProcessor for LogSpanProcessor {
    fn on_end(&self, span: FinishedSpan) {
        tracing::debug!(
            span.name = %span.name,
            span.kind = %span.kind,
            trace_id = %span.context.trace_id,
            span_id = %span.context.span_id,
            duration_ms = span.duration_ms(),
            status = ?span.status,
            "Span finished"
        );
    }
}

/// Keeps finished spans in memory
#[derive(Debug, Default)]
pub struct InMemorySpanProcessor {
    spans: Mutex<Vec<FinishedSpan>>,
}

impl InMemorySpanProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of spans finished so far, in completion order
    pub fn finished(&self) -> Vec<FinishedSpan> {
        self.spans.lock().clone()
    }

    pub fn clear(&self) {
        self.spans.lock().clear();
    }
}

impl SpanProcessor for InMemorySpanProcessor {
    fn on_end(&self, span: FinishedSpan) {
        self.spans.lock().push(span);
    }
}

struct Recording {
    processor: Arc<dyn SpanProcessor>,
    tags: BTreeMap<String, String>,
    status: SpanStatus,
    start_time: DateTime<Utc>,
    tracing_span: tracing::Span,
}

/// A timed unit of work
///
/// Unsampled spans are non-recording: tagging them is a silent no-op and
/// nothing reaches the processor, but [`Span::context`] still yields a
/// propagatable context with the sampled flag cleared.
pub struct Span {
    name: String,
    kind: SpanKind,
    context: TraceContext,
    parent_span_id: Option<SpanId>,
    recording: Option<Recording>,
}

impl Span {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SpanKind {
        self.kind
    }

    pub fn context(&self) -> &TraceContext {
        &self.context
    }

    pub fn parent_span_id(&self) -> Option<SpanId> {
        self.parent_span_id
    }

    /// `parent` with its trace replaced by this span's context
    pub fn propagation_context(&self, parent: &PropagationContext) -> PropagationContext {
        parent.clone().with_trace(self.context.clone())
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    /// Attach a tag; no-op on a non-recording span
    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        if let Some(recording) = self.recording.as_mut() {
            recording.tags.insert(key.into(), value.into());
        }
    }

    /// Attach a tag only when `value` is present and non-empty
    pub fn set_tag_opt(&mut self, key: &str, value: Option<&str>) {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            self.set_tag(key, value);
        }
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.recording
            .as_ref()
            .and_then(|r| r.tags.get(key))
            .map(String::as_str)
    }

    /// Mark the span failed
    pub fn set_error(&mut self, error: &dyn fmt::Display) {
        if let Some(recording) = self.recording.as_mut() {
            let message = error.to_string();
            recording.tracing_span.record("error", true);
            recording
                .tags
                .insert("error.message".to_string(), message.clone());
            recording.status = SpanStatus::Error(message);
        }
    }

    pub fn set_ok(&mut self) {
        if let Some(recording) = self.recording.as_mut() {
            if recording.status == SpanStatus::Unset {
                recording.status = SpanStatus::Ok;
            }
        }
    }

    /// The `tracing` span mirroring this span; disabled when not recording
    pub fn tracing_span(&self) -> tracing::Span {
        self.recording
            .as_ref()
            .map(|r| r.tracing_span.clone())
            .unwrap_or_else(tracing::Span::none)
    }

    /// Close the span now
    pub fn end(self) {
        drop(self);
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Span")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("context", &self.context)
            .field("recording", &self.is_recording())
            .finish()
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        let Some(recording) = self.recording.take() else {
            return;
        };

        recording.processor.on_end(FinishedSpan {
            name: std::mem::take(&mut self.name),
            kind: self.kind,
            context: self.context.clone(),
            parent_span_id: self.parent_span_id,
            tags: recording.tags,
            status: recording.status,
            start_time: recording.start_time,
            end_time: Utc::now(),
        });
    }
}

fn new_tracing_span(kind: SpanKind, name: &str, context: &TraceContext) -> tracing::Span {
    // `tracing` span names are static; the dynamic name goes into otel.name
    match kind {
        SpanKind::Server => tracing::info_span!(
            "server",
            otel.name = %name,
            otel.kind = "server",
            trace_id = %context.trace_id,
            span_id = %context.span_id,
            error = tracing::field::Empty,
        ),
        SpanKind::Producer => tracing::info_span!(
            "producer",
            otel.name = %name,
            otel.kind = "producer",
            trace_id = %context.trace_id,
            span_id = %context.span_id,
            error = tracing::field::Empty,
        ),
        SpanKind::Consumer => tracing::info_span!(
            "consumer",
            otel.name = %name,
            otel.kind = "consumer",
            trace_id = %context.trace_id,
            span_id = %context.span_id,
            error = tracing::field::Empty,
        ),
        SpanKind::Internal => tracing::info_span!(
            "internal",
            otel.name = %name,
            otel.kind = "internal",
            trace_id = %context.trace_id,
            span_id = %context.span_id,
            error = tracing::field::Empty,
        ),
    }
}

/// Creates spans under a sampler and hands them to a processor
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use tsunagi::context::PropagationContext;
/// use tsunagi::telemetry::{InMemorySpanProcessor, MessagingSystem, Sampler, SpanFactory, SpanKind};
///
/// let processor = Arc::new(InMemorySpanProcessor::new());
/// let factory = SpanFactory::new(Sampler::AlwaysOn, processor.clone());
///
/// let span = factory.start_messaging(
///     MessagingSystem::Sqs,
///     SpanKind::Consumer,
///     "SQS",
///     &PropagationContext::root(),
/// );
/// assert_eq!(span.name(), "SQS receive");
/// drop(span);
///
/// assert_eq!(processor.finished()[0].tag("messaging.system"), Some("AmazonSQS"));
/// ```
#[derive(Debug, Clone)]
pub struct SpanFactory {
    sampler: Sampler,
    processor: Arc<dyn SpanProcessor>,
}

impl SpanFactory {
    pub fn new(sampler: Sampler, processor: Arc<dyn SpanProcessor>) -> Self {
        Self { sampler, processor }
    }

    /// Factory logging finished spans through `tracing`
    pub fn with_sampler(sampler: Sampler) -> Self {
        Self::new(sampler, Arc::new(LogSpanProcessor))
    }

    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }

    /// Start a span as a child of `parent`'s trace, or as a new root
    pub fn start(&self, kind: SpanKind, name: impl Into<String>, parent: &PropagationContext) -> Span {
        let name = name.into();
        let parent_trace = parent.valid_parent();

        let trace_id = parent_trace
            .map(|p| p.trace_id)
            .unwrap_or_else(TraceId::random);
        let decision = self.sampler.should_sample(parent_trace, trace_id);
        let sampled = decision.is_sampled();

        let context = TraceContext::new(
            trace_id,
            SpanId::random(),
            TraceFlags::NOT_SAMPLED.with_sampled(sampled),
            false,
        )
        .with_trace_state(parent_trace.map(|p| p.trace_state.clone()).unwrap_or_default());

        let parent_span_id = parent_trace
            .filter(|p| !p.is_continuation())
            .map(|p| p.span_id);

        #[cfg(feature = "metrics")]
        crate::metrics::record_span_started(kind.as_str(), sampled);

        let recording = sampled.then(|| {
            self.processor.on_start(&name, kind, &context);
            Recording {
                processor: Arc::clone(&self.processor),
                tags: BTreeMap::new(),
                status: SpanStatus::Unset,
                start_time: Utc::now(),
                tracing_span: new_tracing_span(kind, &name, &context),
            }
        });

        tracing::trace!(
            name = %name,
            kind = %kind,
            trace_id = %context.trace_id,
            sampled = sampled,
            "Span started"
        );

        Span {
            name,
            kind,
            context,
            parent_span_id,
            recording,
        }
    }

    /// Start a messaging span named `"<entity> send"` or `"<entity> receive"`
    pub fn start_messaging(
        &self,
        system: MessagingSystem,
        kind: SpanKind,
        entity: &str,
        parent: &PropagationContext,
    ) -> Span {
        let name = match kind {
            SpanKind::Producer => format!("{} send", entity),
            SpanKind::Consumer => format!("{} receive", entity),
            _ => entity.to_string(),
        };

        let mut span = self.start(kind, name, parent);
        span.set_tag(MESSAGING_SYSTEM, system.system_name());
        span.set_tag(MESSAGING_DESTINATION_KIND, "queue");
        span
    }
}

impl Default for SpanFactory {
    fn default() -> Self {
        Self::with_sampler(Sampler::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory(sampler: Sampler) -> (SpanFactory, Arc<InMemorySpanProcessor>) {
        let processor = Arc::new(InMemorySpanProcessor::new());
        (SpanFactory::new(sampler, processor.clone()), processor)
    }

    #[test]
    fn test_root_span_has_fresh_trace() {
        let (factory, processor) = factory(Sampler::AlwaysOn);
        let span = factory.start(SpanKind::Internal, "work", &PropagationContext::root());

        assert!(span.context().is_valid());
        assert!(span.context().is_sampled());
        assert!(span.parent_span_id().is_none());
        drop(span);

        assert_eq!(processor.finished().len(), 1);
    }

    #[test]
    fn test_child_span_keeps_trace_id() {
        let (factory, processor) = factory(Sampler::AlwaysOn);
        let parent_trace = TraceContext::new_root(true).with_trace_state("rojo=1");
        let parent = PropagationContext::root().with_trace(parent_trace.clone());

        let span = factory.start(SpanKind::Producer, "Publish send", &parent);
        assert_eq!(span.context().trace_id, parent_trace.trace_id);
        assert_ne!(span.context().span_id, parent_trace.span_id);
        assert_eq!(span.context().trace_state, "rojo=1");
        span.end();

        let finished = processor.finished();
        assert_eq!(finished[0].parent_span_id, Some(parent_trace.span_id));
        assert!(!finished[0].context.is_remote);
    }

    #[test]
    fn test_continuation_parent_has_no_parent_span() {
        let (factory, _) = factory(Sampler::AlwaysOn);
        let parent = PropagationContext::root().with_trace(TraceContext::new(
            TraceId::new(0x3fa85f6457174562b3fc2c963f66afa6),
            SpanId::CONTINUATION,
            TraceFlags::SAMPLED,
            true,
        ));

        let span = factory.start(SpanKind::Server, "GET /", &parent);
        assert_eq!(span.context().trace_id.as_u128(), 0x3fa85f6457174562b3fc2c963f66afa6);
        assert!(span.parent_span_id().is_none());
    }

    #[test]
    fn test_unsampled_span_is_non_recording() {
        let (factory, processor) = factory(Sampler::AlwaysOff);
        let mut span = factory.start(SpanKind::Consumer, "SQS receive", &PropagationContext::root());

        span.set_tag("messaging.sqs.message_id", "abc");
        span.set_error(&"boom");

        assert!(!span.is_recording());
        assert!(span.tag("messaging.sqs.message_id").is_none());
        assert!(span.context().is_valid());
        assert!(!span.context().is_sampled());
        drop(span);

        assert!(processor.finished().is_empty());
    }

    #[test]
    fn test_start_messaging_names_and_tags() {
        let (factory, processor) = factory(Sampler::AlwaysOn);

        let producer = factory.start_messaging(
            MessagingSystem::Sns,
            SpanKind::Producer,
            "Publish",
            &PropagationContext::root(),
        );
        assert_eq!(producer.name(), "Publish send");
        assert_eq!(producer.tag(MESSAGING_SYSTEM), Some("AmazonSNS"));
        assert_eq!(producer.tag(MESSAGING_DESTINATION_KIND), Some("queue"));
        drop(producer);

        let consumer = factory.start_messaging(
            MessagingSystem::Sqs,
            SpanKind::Consumer,
            "SQS",
            &PropagationContext::root(),
        );
        assert_eq!(consumer.name(), "SQS receive");
        drop(consumer);

        assert_eq!(processor.finished().len(), 2);
    }

    #[test]
    fn test_error_status_reaches_processor() {
        let (factory, processor) = factory(Sampler::AlwaysOn);
        let mut span = factory.start(SpanKind::Internal, "work", &PropagationContext::root());
        span.set_error(&"queue does not exist");
        span.set_ok();
        drop(span);

        let finished = processor.finished();
        assert_eq!(
            finished[0].status,
            SpanStatus::Error("queue does not exist".to_string())
        );
        assert_eq!(finished[0].tag("error.message"), Some("queue does not exist"));
    }

    #[test]
    fn test_ratio_sampler_samples_fraction_of_roots() {
        const ROOTS: usize = 20_000;
        let factory = SpanFactory::with_sampler(Sampler::TraceIdRatio(0.25));

        let sampled = (0..ROOTS)
            .filter(|_| {
                factory
                    .start(SpanKind::Internal, "root", &PropagationContext::root())
                    .context()
                    .is_sampled()
            })
            .count();

        let observed = sampled as f64 / ROOTS as f64;
        assert!((observed - 0.25).abs() < 0.03, "sampled {} of roots", observed);
    }
}
