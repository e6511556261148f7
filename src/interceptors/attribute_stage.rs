//! Stage A: attribute injection and the producer span

use crate::context::{self, PropagationContext};
use crate::pipeline::{ExecutionContext, Next, PipelineError, PipelineHandler, WireResponse};
use crate::propagation::PropagationEngine;
use crate::telemetry::{MessagingSystem, SpanFactory, SpanKind};
use async_trait::async_trait;
use tracing::Instrument;

/// Name of the attribute stage handler
pub const ATTRIBUTE_STAGE: &str = "TraceAttributeInjection";

/// Outermost handler: starts the producer span and writes trace context into
/// the request's message attributes before anything is marshalled
#[derive(Debug, Clone)]
pub struct AttributeInjectionHandler {
    system: MessagingSystem,
    engine: PropagationEngine,
    factory: SpanFactory,
}

impl AttributeInjectionHandler {
    pub fn new(system: MessagingSystem, engine: PropagationEngine, factory: SpanFactory) -> Self {
        Self {
            system,
            engine,
            factory,
        }
    }
}

#[async_trait]
impl PipelineHandler for AttributeInjectionHandler {
    fn name(&self) -> &'static str {
        ATTRIBUTE_STAGE
    }

    fn messaging_system(&self) -> Option<MessagingSystem> {
        Some(self.system)
    }

    async fn invoke(
        &self,
        cx: &mut ExecutionContext,
        next: Next<'_>,
    ) -> Result<WireResponse, PipelineError> {
        if cx.request.system() != self.system {
            return next.run(cx).await;
        }

        let parent: PropagationContext = context::current();
        let mut span = self.factory.start_messaging(
            self.system,
            SpanKind::Producer,
            cx.request.operation(),
            &parent,
        );
        span.set_tag_opt("messaging.destination", cx.request.destination());

        let outbound = span.propagation_context(&parent);
        for carrier in cx.request.attribute_carriers() {
            self.engine.inject(&outbound, carrier);
        }
        cx.propagation = Some(outbound.clone());

        // The span closes when dropped, including when this future is cancelled
        let result = context::scope(outbound, next.run(cx))
            .instrument(span.tracing_span())
            .await;

        match &result {
            Ok(response) => {
                span.set_tag("http.status_code", response.status.as_str());
                span.set_ok();
            }
            Err(e) => {
                tracing::debug!(
                    operation = cx.request.operation(),
                    error = %e,
                    "Messaging call failed"
                );
                span.set_error(e);
            }
        }

        result
    }
}
