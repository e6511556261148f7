//! Messaging client pipeline
//!
//! A [`Pipeline`] is an ordered list of [`PipelineHandler`]s terminated by a
//! [`Transport`]. The first handler is the outermost: it sees the request
//! first and the response last.
//!
//! ```text
//! [0] TraceAttributeInjection   high-level request (attributes)
//! [1] Marshaller                 builds the WireRequest
//! [2] Signer                     signs the headers present now
//! [3] TraceHeaderInjection       wire headers, outside the signature
//!     Transport
//! ```

mod marshal;
mod request;
mod signer;

pub use marshal::{Marshaller, MARSHALLER};
pub use request::{
    MessagingRequest, PublishRequest, ReceiveMessageRequest, SendMessageBatchEntry,
    SendMessageBatchRequest, SendMessageRequest,
};
pub use signer::{parse_signed_headers, HmacSigner, SIGNER};

use crate::context::PropagationContext;
use crate::telemetry::MessagingSystem;
use async_trait::async_trait;
use bytes::Bytes;
use hyper::{HeaderMap, Method, StatusCode, Uri};
use std::sync::Arc;
use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Handler '{0}' is not registered")]
    HandlerNotFound(String),

    #[error("Request has not been marshalled before '{0}'")]
    NotMarshalled(&'static str),

    #[error("Failed to marshal request: {0}")]
    Marshal(#[from] serde_json::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to sign request: {0}")]
    Signing(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Service returned {status}: {message}")]
    Service { status: u16, message: String },
}

/// Marshalled request as sent on the wire
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Response as received from the wire
#[derive(Debug, Clone)]
pub struct WireResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl WireResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }
}

/// State shared by the handlers of one call
#[derive(Debug)]
pub struct ExecutionContext {
    /// The request as the application issued it
    pub request: MessagingRequest,
    pub endpoint: Uri,
    /// Set by the marshaller
    pub wire: Option<WireRequest>,
    /// Outbound context published by the attribute stage
    pub propagation: Option<PropagationContext>,
}

impl ExecutionContext {
    pub fn new(request: impl Into<MessagingRequest>, endpoint: Uri) -> Self {
        Self {
            request: request.into(),
            endpoint,
            wire: None,
            propagation: None,
        }
    }
}

/// One step of the pipeline
#[async_trait]
pub trait PipelineHandler: Send + Sync {
    /// Name used for ordering and duplicate detection
    fn name(&self) -> &'static str;

    /// Messaging system this handler is limited to, if any
    fn messaging_system(&self) -> Option<MessagingSystem> {
        None
    }

    /// Do this handler's work and call `next` to continue the pipeline
    async fn invoke(
        &self,
        cx: &mut ExecutionContext,
        next: Next<'_>,
    ) -> Result<WireResponse, PipelineError>;
}

/// Sends a marshalled request
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &WireRequest) -> Result<WireResponse, PipelineError>;
}

/// Remainder of the pipeline after the current handler
pub struct Next<'a> {
    handlers: &'a [Arc<dyn PipelineHandler>],
    transport: &'a dyn Transport,
}

impl<'a> Next<'a> {
    /// Run the remaining handlers, then the transport
    pub async fn run(self, cx: &mut ExecutionContext) -> Result<WireResponse, PipelineError> {
        match self.handlers.split_first() {
            Some((handler, rest)) => {
                let next = Next {
                    handlers: rest,
                    transport: self.transport,
                };
                handler.invoke(cx, next).await
            }
            None => {
                let wire = cx
                    .wire
                    .as_ref()
                    .ok_or(PipelineError::NotMarshalled("transport"))?;
                self.transport.send(wire).await
            }
        }
    }
}

/// Ordered handlers plus a transport
pub struct Pipeline {
    handlers: Vec<Arc<dyn PipelineHandler>>,
    transport: Arc<dyn Transport>,
}

impl Pipeline {
    /// Empty pipeline over `transport`
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            handlers: Vec::new(),
            transport,
        }
    }

    /// Marshaller followed by `signer`, the usual client layout
    pub fn signed(transport: Arc<dyn Transport>, signer: HmacSigner) -> Self {
        let mut pipeline = Self::new(transport);
        pipeline.push_handler(Marshaller);
        pipeline.push_handler(signer);
        pipeline
    }

    /// Handler names, outermost first
    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.iter().any(|h| h.name() == name)
    }

    /// True when a handler named `name` is registered for `system`
    pub fn contains_for(&self, name: &str, system: MessagingSystem) -> bool {
        self.handlers
            .iter()
            .any(|h| h.name() == name && h.messaging_system() == Some(system))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Add `handler` as the outermost handler
    pub fn add_handler<H: PipelineHandler + 'static>(&mut self, handler: H) {
        self.handlers.insert(0, Arc::new(handler));
    }

    /// Add `handler` as the innermost handler, just before the transport
    pub fn push_handler<H: PipelineHandler + 'static>(&mut self, handler: H) {
        self.handlers.push(Arc::new(handler));
    }

    /// Add `handler` directly inside the handler named `after`
    pub fn add_handler_after<H: PipelineHandler + 'static>(
        &mut self,
        after: &str,
        handler: H,
    ) -> Result<(), PipelineError> {
        let index = self
            .handlers
            .iter()
            .position(|h| h.name() == after)
            .ok_or_else(|| PipelineError::HandlerNotFound(after.to_string()))?;

        self.handlers.insert(index + 1, Arc::new(handler));
        Ok(())
    }

    /// Run `cx` through every handler and the transport
    pub async fn execute(&self, cx: &mut ExecutionContext) -> Result<WireResponse, PipelineError> {
        let next = Next {
            handlers: &self.handlers,
            transport: self.transport.as_ref(),
        };
        next.run(cx).await
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("handlers", &self.handler_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<WireRequest>>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, request: &WireRequest) -> Result<WireResponse, PipelineError> {
            self.sent.lock().push(request.clone());
            Ok(WireResponse::new(StatusCode::OK, "{}"))
        }
    }

    struct Named(&'static str);

    #[async_trait]
    impl PipelineHandler for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn invoke(
            &self,
            cx: &mut ExecutionContext,
            next: Next<'_>,
        ) -> Result<WireResponse, PipelineError> {
            next.run(cx).await
        }
    }

    fn endpoint() -> Uri {
        "https://sqs.eu-west-1.amazonaws.com/".parse().unwrap()
    }

    #[test]
    fn test_handler_ordering() {
        let mut pipeline = Pipeline::new(Arc::new(RecordingTransport::default()));
        pipeline.push_handler(Named("Marshaller"));
        pipeline.push_handler(Named("Signer"));
        pipeline.add_handler(Named("Outer"));
        pipeline.add_handler_after("Signer", Named("AfterSigner")).unwrap();

        assert_eq!(
            pipeline.handler_names(),
            vec!["Outer", "Marshaller", "Signer", "AfterSigner"]
        );
    }

    #[test]
    fn test_add_after_missing_handler_fails() {
        let mut pipeline = Pipeline::new(Arc::new(RecordingTransport::default()));
        let result = pipeline.add_handler_after("Signer", Named("AfterSigner"));

        assert!(matches!(result, Err(PipelineError::HandlerNotFound(name)) if name == "Signer"));
        assert!(pipeline.is_empty());
    }

    #[tokio::test]
    async fn test_execute_without_marshaller_fails() {
        let pipeline = Pipeline::new(Arc::new(RecordingTransport::default()));
        let mut cx = ExecutionContext::new(ReceiveMessageRequest::new("https://sqs/q"), endpoint());

        let result = pipeline.execute(&mut cx).await;
        assert!(matches!(result, Err(PipelineError::NotMarshalled("transport"))));
    }

    #[tokio::test]
    async fn test_execute_reaches_transport() {
        let transport = Arc::new(RecordingTransport::default());
        let mut pipeline = Pipeline::new(transport.clone());
        pipeline.push_handler(Marshaller);

        let mut cx = ExecutionContext::new(SendMessageRequest::new("https://sqs/q", "hi"), endpoint());
        let response = pipeline.execute(&mut cx).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(transport.sent.lock().len(), 1);
    }
}
