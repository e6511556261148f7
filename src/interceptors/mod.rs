//! Pipeline interceptors
//!
//! Outbound calls are instrumented by two handlers registered on the client
//! [`Pipeline`]:
//!
//! - **Stage A** ([`AttributeInjectionHandler`]), outermost: starts the
//!   producer span and injects into message attributes, which are part of
//!   the message payload.
//! - **Stage B** ([`HeaderInjectionHandler`]), right after the signer (or
//!   the marshaller when requests are not signed): injects into the wire
//!   headers, outside the signature.
//!
//! Inbound messages go through [`InboundInstrumentation`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use tsunagi::interceptors::OutboundInstrumentation;
//! use tsunagi::pipeline::{HmacSigner, Pipeline, PipelineError, Transport, WireRequest, WireResponse};
//! use tsunagi::propagation::PropagationEngine;
//! use tsunagi::telemetry::{MessagingSystem, SpanFactory};
//!
//! struct NoopTransport;
//!
//! #[async_trait]
//! impl Transport for NoopTransport {
//!     async fn send(&self, _request: &WireRequest) -> Result<WireResponse, PipelineError> {
//!         Ok(WireResponse::new(hyper::StatusCode::OK, "{}"))
//!     }
//! }
//!
//! let signer = HmacSigner::new("AKID", "secret", "eu-west-1", "sqs");
//! let mut pipeline = Pipeline::signed(Arc::new(NoopTransport), signer);
//!
//! let instrumentation = OutboundInstrumentation::new(
//!     MessagingSystem::Sqs,
//!     PropagationEngine::default(),
//!     SpanFactory::default(),
//! );
//! assert!(instrumentation.customize(&mut pipeline).unwrap());
//! assert!(!instrumentation.customize(&mut pipeline).unwrap());
//!
//! assert_eq!(
//!     pipeline.handler_names(),
//!     vec!["TraceAttributeInjection", "Marshaller", "Signer", "TraceHeaderInjection"]
//! );
//! ```

mod attribute_stage;
mod header_stage;
mod inbound;

pub use attribute_stage::{AttributeInjectionHandler, ATTRIBUTE_STAGE};
pub use header_stage::{HeaderInjectionHandler, HEADER_STAGE};
pub use inbound::{
    copy_trace_attributes_to_headers, InboundInstrumentation, InboundMessage, SnsEvent, SnsMessage,
    SnsRecord, SqsEvent, SqsMessage,
};

use crate::pipeline::{Pipeline, PipelineError, MARSHALLER, SIGNER};
use crate::propagation::PropagationEngine;
use crate::telemetry::{MessagingSystem, SpanFactory};

/// Registers the outbound stages on a client pipeline
#[derive(Debug, Clone)]
pub struct OutboundInstrumentation {
    system: MessagingSystem,
    engine: PropagationEngine,
    factory: SpanFactory,
    inject_headers: bool,
}

impl OutboundInstrumentation {
    pub fn new(system: MessagingSystem, engine: PropagationEngine, factory: SpanFactory) -> Self {
        Self {
            system,
            engine,
            factory,
            inject_headers: true,
        }
    }

    /// Enable or disable Stage B, for transports that do not use HTTP headers
    pub fn with_header_injection(mut self, enabled: bool) -> Self {
        self.inject_headers = enabled;
        self
    }

    /// Add both stages to `pipeline`
    ///
    /// Returns `Ok(false)` without touching the pipeline when an attribute
    /// stage for the same messaging system is already registered.
    pub fn customize(&self, pipeline: &mut Pipeline) -> Result<bool, PipelineError> {
        if pipeline.contains_for(ATTRIBUTE_STAGE, self.system) {
            tracing::debug!(
                system = self.system.system_name(),
                "Pipeline already instrumented, skipping registration"
            );
            return Ok(false);
        }

        if self.inject_headers {
            let anchor = if pipeline.contains(SIGNER) {
                SIGNER
            } else {
                MARSHALLER
            };
            pipeline.add_handler_after(
                anchor,
                HeaderInjectionHandler::new(self.system, self.engine.clone()),
            )?;
        }

        pipeline.add_handler(AttributeInjectionHandler::new(
            self.system,
            self.engine.clone(),
            self.factory.clone(),
        ));

        tracing::debug!(
            system = self.system.system_name(),
            handlers = ?pipeline.handler_names(),
            "Pipeline instrumented"
        );
        Ok(true)
    }
}
