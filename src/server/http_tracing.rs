//! HTTP Request Tracing
//!
//! Server spans for inbound requests, following the HTTP semantic
//! conventions (`http.method`, `http.target`, `http.status_code`).

use crate::carrier::Carrier;
use crate::context::{self, PropagationContext};
use crate::correlation::{BridgeOutcome, CorrelationBridge, InflightParent, ParentSlot};
use crate::propagation::PropagationEngine;
use crate::telemetry::{Span, SpanFactory, SpanKind};
use hyper::{HeaderMap, Method, Request, Response};
use std::fmt;
use std::future::Future;
use tracing::Instrument;

/// Hierarchical request id header sent by non-W3C clients
pub const REQUEST_ID_HEADER: &str = "Request-Id";

/// Span and context of one traced request
#[derive(Debug)]
pub struct RequestTrace {
    span: Span,
    context: PropagationContext,
    bridge_outcome: BridgeOutcome,
}

impl RequestTrace {
    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn span_mut(&mut self) -> &mut Span {
        &mut self.span
    }

    /// Context the handler runs in; its trace is the server span
    pub fn context(&self) -> &PropagationContext {
        &self.context
    }

    pub fn bridge_outcome(&self) -> BridgeOutcome {
        self.bridge_outcome
    }

    pub fn into_parts(self) -> (Span, PropagationContext) {
        (self.span, self.context)
    }
}

/// Traces inbound HTTP requests
#[derive(Debug, Clone)]
pub struct RequestTracer {
    engine: PropagationEngine,
    bridge: CorrelationBridge,
    factory: SpanFactory,
}

impl RequestTracer {
    pub fn new(engine: PropagationEngine, bridge: CorrelationBridge, factory: SpanFactory) -> Self {
        Self {
            engine,
            bridge,
            factory,
        }
    }

    /// Classify the parent a request arrived with
    fn classify(headers: &HeaderMap, extracted: &PropagationContext) -> InflightParent {
        if let Some(native) = extracted.valid_parent() {
            return InflightParent::Native(native.clone());
        }

        match Carrier::get(headers, REQUEST_ID_HEADER).map(str::trim) {
            Some(request_id) if !request_id.is_empty() => {
                InflightParent::Foreign(request_id.to_string())
            }
            _ => InflightParent::Absent,
        }
    }

    /// Resolve the parent, bridge the legacy id once and start the server span
    pub fn begin(&self, method: &Method, path: &str, headers: &HeaderMap) -> RequestTrace {
        let extracted = self.engine.extract_current(headers);

        let mut slot = ParentSlot::new(Self::classify(headers, &extracted));
        let bridge_outcome = self.bridge.apply(headers, &mut slot);
        let parent = slot.to_propagation_context(extracted.baggage().clone());

        let mut span = self
            .factory
            .start(SpanKind::Server, format!("{} {}", method, path), &parent);
        slot.mark_started();

        span.set_tag("http.method", method.as_str());
        span.set_tag("http.target", path);

        let context = span.propagation_context(&parent);
        RequestTrace {
            span,
            context,
            bridge_outcome,
        }
    }

    /// Run `handler` for `request` inside the request's span and scope
    ///
    /// The span closes when the handler finishes or the returned future is
    /// dropped.
    pub async fn trace<B, R, E, F, Fut>(&self, request: Request<B>, handler: F) -> Result<Response<R>, E>
    where
        F: FnOnce(Request<B>) -> Fut,
        Fut: Future<Output = Result<Response<R>, E>>,
        E: fmt::Display,
    {
        let (mut span, cx) = self
            .begin(request.method(), request.uri().path(), request.headers())
            .into_parts();

        let result = context::scope(cx, handler(request))
            .instrument(span.tracing_span())
            .await;

        match &result {
            Ok(response) => {
                let status = response.status();
                span.set_tag("http.status_code", status.as_str());
                if status.is_server_error() {
                    span.set_error(&status);
                } else {
                    span.set_ok();
                }
            }
            Err(e) => span.set_error(e),
        }

        result
    }
}

impl Default for RequestTracer {
    fn default() -> Self {
        Self::new(
            PropagationEngine::default(),
            CorrelationBridge::default(),
            SpanFactory::default(),
        )
    }
}
