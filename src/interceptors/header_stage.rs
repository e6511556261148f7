//! Stage B: header injection after signing

use crate::context;
use crate::pipeline::{ExecutionContext, Next, PipelineError, PipelineHandler, WireResponse};
use crate::propagation::PropagationEngine;
use crate::telemetry::MessagingSystem;
use async_trait::async_trait;

/// Name of the header stage handler
pub const HEADER_STAGE: &str = "TraceHeaderInjection";

/// Writes trace context into the wire headers
///
/// Registered after the signer so the trace headers stay out of the
/// signature.
#[derive(Debug, Clone)]
pub struct HeaderInjectionHandler {
    system: MessagingSystem,
    engine: PropagationEngine,
}

impl HeaderInjectionHandler {
    pub fn new(system: MessagingSystem, engine: PropagationEngine) -> Self {
        Self { system, engine }
    }
}

#[async_trait]
impl PipelineHandler for HeaderInjectionHandler {
    fn name(&self) -> &'static str {
        HEADER_STAGE
    }

    fn messaging_system(&self) -> Option<MessagingSystem> {
        Some(self.system)
    }

    async fn invoke(
        &self,
        cx: &mut ExecutionContext,
        next: Next<'_>,
    ) -> Result<WireResponse, PipelineError> {
        if cx.request.system() == self.system {
            let outbound = cx.propagation.clone().unwrap_or_else(context::current);

            match cx.wire.as_mut() {
                Some(wire) => self.engine.inject(&outbound, &mut wire.headers),
                None => tracing::debug!("No wire request yet, skipping header injection"),
            }
        }

        next.run(cx).await
    }
}
