//! High-level messaging requests
//!
//! The closed set of request kinds the interceptors know how to carry trace
//! context on. Field names serialize in the AWS JSON protocol shape.

use crate::carrier::{AttributeNames, Carrier, MessageAttributes};
use crate::telemetry::MessagingSystem;
use serde::{Deserialize, Serialize};

/// SNS `Publish`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PublishRequest {
    pub topic_arn: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "MessageAttributes::is_empty")]
    pub message_attributes: MessageAttributes,
}

impl PublishRequest {
    pub fn new(topic_arn: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            topic_arn: topic_arn.into(),
            message: message.into(),
            subject: None,
            message_attributes: MessageAttributes::new(),
        }
    }
}

/// SQS `SendMessage`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SendMessageRequest {
    pub queue_url: String,
    pub message_body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_seconds: Option<u32>,
    #[serde(default, skip_serializing_if = "MessageAttributes::is_empty")]
    pub message_attributes: MessageAttributes,
}

impl SendMessageRequest {
    pub fn new(queue_url: impl Into<String>, message_body: impl Into<String>) -> Self {
        Self {
            queue_url: queue_url.into(),
            message_body: message_body.into(),
            delay_seconds: None,
            message_attributes: MessageAttributes::new(),
        }
    }
}

/// One entry of an SQS `SendMessageBatch`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SendMessageBatchEntry {
    pub id: String,
    pub message_body: String,
    #[serde(default, skip_serializing_if = "MessageAttributes::is_empty")]
    pub message_attributes: MessageAttributes,
}

impl SendMessageBatchEntry {
    pub fn new(id: impl Into<String>, message_body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            message_body: message_body.into(),
            message_attributes: MessageAttributes::new(),
        }
    }
}

/// SQS `SendMessageBatch`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SendMessageBatchRequest {
    pub queue_url: String,
    pub entries: Vec<SendMessageBatchEntry>,
}

/// SQS `ReceiveMessage`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReceiveMessageRequest {
    pub queue_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_number_of_messages: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_time_seconds: Option<u32>,
    #[serde(default, skip_serializing_if = "AttributeNames::is_empty")]
    pub message_attribute_names: AttributeNames,
}

impl ReceiveMessageRequest {
    pub fn new(queue_url: impl Into<String>) -> Self {
        Self {
            queue_url: queue_url.into(),
            max_number_of_messages: None,
            wait_time_seconds: None,
            message_attribute_names: AttributeNames::new(),
        }
    }
}

/// A request as the application issued it, before marshalling
#[derive(Debug, Clone, PartialEq)]
pub enum MessagingRequest {
    Publish(PublishRequest),
    SendMessage(SendMessageRequest),
    SendMessageBatch(SendMessageBatchRequest),
    ReceiveMessage(ReceiveMessageRequest),
    /// Any other operation; carries no trace context
    Other {
        system: MessagingSystem,
        operation: String,
        payload: serde_json::Value,
    },
}

impl MessagingRequest {
    /// Operation name, e.g. `SendMessage`
    pub fn operation(&self) -> &str {
        match self {
            MessagingRequest::Publish(_) => "Publish",
            MessagingRequest::SendMessage(_) => "SendMessage",
            MessagingRequest::SendMessageBatch(_) => "SendMessageBatch",
            MessagingRequest::ReceiveMessage(_) => "ReceiveMessage",
            MessagingRequest::Other { operation, .. } => operation,
        }
    }

    pub fn system(&self) -> MessagingSystem {
        match self {
            MessagingRequest::Publish(_) => MessagingSystem::Sns,
            MessagingRequest::SendMessage(_)
            | MessagingRequest::SendMessageBatch(_)
            | MessagingRequest::ReceiveMessage(_) => MessagingSystem::Sqs,
            MessagingRequest::Other { system, .. } => *system,
        }
    }

    /// Queue URL or topic ARN the request targets
    pub fn destination(&self) -> Option<&str> {
        match self {
            MessagingRequest::Publish(r) => Some(&r.topic_arn),
            MessagingRequest::SendMessage(r) => Some(&r.queue_url),
            MessagingRequest::SendMessageBatch(r) => Some(&r.queue_url),
            MessagingRequest::ReceiveMessage(r) => Some(&r.queue_url),
            MessagingRequest::Other { .. } => None,
        }
    }

    /// `x-amz-target` value, e.g. `AmazonSQS.SendMessage`
    pub fn target(&self) -> String {
        format!("{}.{}", self.system().system_name(), self.operation())
    }

    /// Carriers trace context is injected into for this request kind
    ///
    /// Empty for operations that carry no message metadata.
    pub fn attribute_carriers(&mut self) -> Vec<&mut dyn Carrier> {
        match self {
            MessagingRequest::Publish(r) => vec![&mut r.message_attributes as &mut dyn Carrier],
            MessagingRequest::SendMessage(r) => vec![&mut r.message_attributes as &mut dyn Carrier],
            MessagingRequest::SendMessageBatch(r) => r
                .entries
                .iter_mut()
                .map(|entry| &mut entry.message_attributes as &mut dyn Carrier)
                .collect(),
            MessagingRequest::ReceiveMessage(r) => {
                vec![&mut r.message_attribute_names as &mut dyn Carrier]
            }
            MessagingRequest::Other { .. } => Vec::new(),
        }
    }

    /// JSON body of the request
    pub fn payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            MessagingRequest::Publish(r) => serde_json::to_value(r),
            MessagingRequest::SendMessage(r) => serde_json::to_value(r),
            MessagingRequest::SendMessageBatch(r) => serde_json::to_value(r),
            MessagingRequest::ReceiveMessage(r) => serde_json::to_value(r),
            MessagingRequest::Other { payload, .. } => Ok(payload.clone()),
        }
    }
}

impl From<PublishRequest> for MessagingRequest {
    fn from(request: PublishRequest) -> Self {
        MessagingRequest::Publish(request)
    }
}

impl From<SendMessageRequest> for MessagingRequest {
    fn from(request: SendMessageRequest) -> Self {
        MessagingRequest::SendMessage(request)
    }
}

impl From<SendMessageBatchRequest> for MessagingRequest {
    fn from(request: SendMessageBatchRequest) -> Self {
        MessagingRequest::SendMessageBatch(request)
    }
}

impl From<ReceiveMessageRequest> for MessagingRequest {
    fn from(request: ReceiveMessageRequest) -> Self {
        MessagingRequest::ReceiveMessage(request)
    }
}
