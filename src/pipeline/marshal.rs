//! Request marshaller
//!
//! Turns the high-level [`MessagingRequest`](super::MessagingRequest) into a
//! [`WireRequest`] using the AWS JSON 1.0 protocol.

use super::{ExecutionContext, Next, PipelineError, PipelineHandler, WireRequest, WireResponse};
use async_trait::async_trait;
use bytes::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE, HOST};
use hyper::{HeaderMap, Method};

/// Name of the marshaller handler
pub const MARSHALLER: &str = "Marshaller";

const JSON_CONTENT_TYPE: &str = "application/x-amz-json-1.0";
const AMZ_TARGET: &str = "x-amz-target";

/// Builds the wire request from the high-level request
#[derive(Debug, Clone, Copy, Default)]
pub struct Marshaller;

impl Marshaller {
    fn marshal(cx: &ExecutionContext) -> Result<WireRequest, PipelineError> {
        let body = serde_json::to_vec(&cx.request.payload()?)?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        headers.insert(
            AMZ_TARGET,
            HeaderValue::from_str(&cx.request.target())
                .map_err(|e| PipelineError::InvalidRequest(format!("invalid target: {}", e)))?,
        );
        if let Some(host) = cx.endpoint.host() {
            if let Ok(value) = HeaderValue::from_str(host) {
                headers.insert(HOST, value);
            }
        }

        Ok(WireRequest {
            method: Method::POST,
            uri: cx.endpoint.clone(),
            headers,
            body: Bytes::from(body),
        })
    }
}

#[async_trait]
impl PipelineHandler for Marshaller {
    fn name(&self) -> &'static str {
        MARSHALLER
    }

    async fn invoke(
        &self,
        cx: &mut ExecutionContext,
        next: Next<'_>,
    ) -> Result<WireResponse, PipelineError> {
        cx.wire = Some(Self::marshal(cx)?);
        tracing::trace!(operation = cx.request.operation(), "Request marshalled");
        next.run(cx).await
    }
}
