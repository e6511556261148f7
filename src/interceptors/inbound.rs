//! Inbound message instrumentation
//!
//! One consumer span per received message, parented to the context the
//! producer injected into the message attributes. Lambda SQS and SNS event
//! shapes deserialize directly into [`SqsEvent`] and [`SnsEvent`].

use crate::carrier::{Carrier, MessageAttributes};
use crate::context::{self, PropagationContext};
use crate::propagation::{PropagationEngine, TRACEPARENT, TRACESTATE};
use crate::telemetry::{MessagingSystem, Span, SpanFactory, SpanKind};
use hyper::HeaderMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use tracing::Instrument;

/// A received message that may carry trace context
pub trait InboundMessage {
    fn system(&self) -> MessagingSystem;

    fn message_attributes(&self) -> &MessageAttributes;

    /// Attach per-message metadata to the consumer span
    fn tag_span(&self, span: &mut Span);
}

/// Lambda SQS event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqsEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<SqsMessage>,
}

/// One SQS message of a Lambda event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqsMessage {
    pub message_id: String,
    #[serde(default)]
    pub receipt_handle: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(default)]
    pub message_attributes: MessageAttributes,
    #[serde(default)]
    pub event_source: Option<String>,
    #[serde(rename = "eventSourceARN", default)]
    pub event_source_arn: Option<String>,
    #[serde(default)]
    pub aws_region: Option<String>,
}

impl InboundMessage for SqsMessage {
    fn system(&self) -> MessagingSystem {
        MessagingSystem::Sqs
    }

    fn message_attributes(&self) -> &MessageAttributes {
        &self.message_attributes
    }

    fn tag_span(&self, span: &mut Span) {
        span.set_tag_opt("messaging.sqs.event.source", self.event_source.as_deref());
        span.set_tag_opt("messaging.sqs.event.source.arn", self.event_source_arn.as_deref());
        span.set_tag_opt("messaging.sqs.message.id", Some(self.message_id.as_str()));
        span.set_tag_opt("messaging.sqs.aws.region", self.aws_region.as_deref());
    }
}

/// Lambda SNS event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnsEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<SnsRecord>,
}

/// One SNS record of a Lambda event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SnsRecord {
    #[serde(default)]
    pub event_source: Option<String>,
    #[serde(default)]
    pub event_version: Option<String>,
    #[serde(default)]
    pub event_subscription_arn: Option<String>,
    pub sns: SnsMessage,
}

/// The notification inside an [`SnsRecord`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SnsMessage {
    pub message_id: String,
    #[serde(default)]
    pub topic_arn: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(rename = "Type", default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub message_attributes: MessageAttributes,
}

impl SnsMessage {
    /// String value of the attribute `key`
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.message_attributes.get(key)
    }
}

impl InboundMessage for SnsRecord {
    fn system(&self) -> MessagingSystem {
        MessagingSystem::Sns
    }

    fn message_attributes(&self) -> &MessageAttributes {
        &self.sns.message_attributes
    }

    fn tag_span(&self, span: &mut Span) {
        span.set_tag_opt("messaging.sns.event.source", self.event_source.as_deref());
        span.set_tag_opt("messaging.sns.event.version", self.event_version.as_deref());
        span.set_tag_opt(
            "messaging.sns.event.subscription.arn",
            self.event_subscription_arn.as_deref(),
        );
        span.set_tag_opt("messaging.sns.message.id", Some(self.sns.message_id.as_str()));
        span.set_tag_opt("messaging.sns.topic.arn", Some(self.sns.topic_arn.as_str()));
    }
}

/// Copy the trace attributes of an SNS notification into HTTP headers
///
/// Used when an SNS record is replayed as an HTTP request, so the request
/// tracer sees the publisher's context. Blank values are skipped.
pub fn copy_trace_attributes_to_headers(message: &SnsMessage, headers: &mut HeaderMap) {
    for key in [TRACEPARENT, TRACESTATE] {
        if let Some(value) = message.attribute(key).filter(|v| !v.trim().is_empty()) {
            Carrier::set(headers, key, value.to_string());
        }
    }
}

/// Starts consumer spans for received messages
#[derive(Debug, Clone)]
pub struct InboundInstrumentation {
    engine: PropagationEngine,
    factory: SpanFactory,
}

impl InboundInstrumentation {
    pub fn new(engine: PropagationEngine, factory: SpanFactory) -> Self {
        Self { engine, factory }
    }

    /// Parent context carried by `message`, falling back to `headers`
    fn extract<M: InboundMessage>(&self, message: &M, headers: Option<&HeaderMap>) -> PropagationContext {
        let current = context::current();
        let attributes = message.message_attributes();

        match headers {
            Some(headers) if attributes.get(TRACEPARENT).is_none() => {
                self.engine.extract(headers, &current)
            }
            _ => self.engine.extract(attributes, &current),
        }
    }

    /// Start the consumer span for `message`
    ///
    /// Returns the span and the context the message handler should run in.
    pub fn start<M: InboundMessage>(&self, message: &M) -> (Span, PropagationContext) {
        self.start_with_headers(message, None)
    }

    /// Like [`start`](Self::start), falling back to headers delivered
    /// alongside the message when its attributes carry no trace parent
    pub fn start_with_headers<M: InboundMessage>(
        &self,
        message: &M,
        headers: Option<&HeaderMap>,
    ) -> (Span, PropagationContext) {
        let extracted = self.extract(message, headers);
        let system = message.system();

        let mut span =
            self.factory
                .start_messaging(system, SpanKind::Consumer, system.entity(), &extracted);
        message.tag_span(&mut span);

        let cx = span.propagation_context(&extracted);
        (span, cx)
    }

    /// Run `handler` for one message inside its consumer span
    pub async fn process<M, Fut, T, E>(&self, message: &M, handler: Fut) -> Result<T, E>
    where
        M: InboundMessage,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let (mut span, cx) = self.start(message);

        let result = context::scope(cx, handler)
            .instrument(span.tracing_span())
            .await;

        match &result {
            Ok(_) => span.set_ok(),
            Err(e) => span.set_error(e),
        }

        result
    }

    /// Run `handler` for each message in order, one consumer span each
    pub async fn process_batch<'m, M, F, Fut, T, E>(
        &self,
        messages: &'m [M],
        mut handler: F,
    ) -> Vec<Result<T, E>>
    where
        M: InboundMessage,
        F: FnMut(&'m M) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let mut results = Vec::with_capacity(messages.len());
        for message in messages {
            results.push(self.process(message, handler(message)).await);
        }
        results
    }
}
