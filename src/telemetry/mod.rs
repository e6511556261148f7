//! Span creation, sampling and log output
//!
//! [`SpanFactory`] is the single place spans are created, for inbound
//! requests, outbound sends and inbound messages alike. Finished spans go to
//! a [`SpanProcessor`]; exporting them further is up to the host.

mod sampling;
mod span;
pub mod subscriber;

pub use sampling::{Sampler, SamplingDecision};
pub use span::{
    FinishedSpan, InMemorySpanProcessor, LogSpanProcessor, MessagingSystem, Span, SpanFactory,
    SpanKind, SpanProcessor, SpanStatus, MESSAGING_DESTINATION_KIND, MESSAGING_SYSTEM,
};
pub use subscriber::init_subscriber;

use thiserror::Error;

/// Errors that can occur while setting up log output
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),

    #[error("Failed to initialize subscriber: {0}")]
    SubscriberInit(String),
}
