//! Message attribute carrier
//!
//! SQS and SNS carry user metadata as typed message attributes. Trace context
//! always travels as `String` attributes.

use super::Carrier;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Data type tag used for every attribute written by this crate
pub const STRING_DATA_TYPE: &str = "String";

/// A single typed message attribute
///
/// Serializes in the AWS JSON protocol shape (`DataType` / `StringValue`) and
/// also accepts the Lambda event shapes: SQS (`dataType` / `stringValue`) and
/// SNS (`Type` / `Value`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageAttributeValue {
    #[serde(rename = "DataType", alias = "dataType", alias = "Type")]
    pub data_type: String,

    #[serde(
        rename = "StringValue",
        alias = "stringValue",
        alias = "Value",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub string_value: Option<String>,
}

impl MessageAttributeValue {
    /// A `String` attribute
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            data_type: STRING_DATA_TYPE.to_string(),
            string_value: Some(value.into()),
        }
    }
}

/// Message attributes of one message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageAttributes(HashMap<String, MessageAttributeValue>);

impl MessageAttributes {
    /// SQS and SNS reject messages with more attributes than this
    pub const MAX_ATTRIBUTES: usize = 10;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: MessageAttributeValue) {
        self.0.insert(key.into(), value);
    }

    /// The raw attribute, whatever its data type
    pub fn attribute(&self, key: &str) -> Option<&MessageAttributeValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MessageAttributeValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, MessageAttributeValue)> for MessageAttributes {
    fn from_iter<I: IntoIterator<Item = (String, MessageAttributeValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Carrier for MessageAttributes {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|attr| attr.string_value.as_deref())
    }

    fn set(&mut self, key: &str, value: String) {
        if !self.0.contains_key(key) && self.0.len() >= Self::MAX_ATTRIBUTES {
            tracing::debug!(
                key = %key,
                limit = Self::MAX_ATTRIBUTES,
                "Message attribute limit reached, not adding trace attribute"
            );
            #[cfg(feature = "metrics")]
            crate::metrics::record_injection_skipped("attribute_limit");
            return;
        }

        self.0
            .insert(key.to_string(), MessageAttributeValue::string(value));
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_unwraps_string_value() {
        let mut attrs = MessageAttributes::new();
        attrs.insert("traceparent", MessageAttributeValue::string("00-abc"));

        assert_eq!(attrs.get("traceparent"), Some("00-abc"));
        assert_eq!(attrs.get("missing"), None);
    }

    #[test]
    fn test_set_writes_string_attribute() {
        let mut attrs = MessageAttributes::new();
        attrs.set("tracestate", "congo=t61rcWkgMzE".to_string());

        let attr = attrs.attribute("tracestate").unwrap();
        assert_eq!(attr.data_type, "String");
        assert_eq!(attr.string_value.as_deref(), Some("congo=t61rcWkgMzE"));
    }

    #[test]
    fn test_set_respects_attribute_limit() {
        let mut attrs: MessageAttributes = (0..MessageAttributes::MAX_ATTRIBUTES)
            .map(|i| (format!("attr-{}", i), MessageAttributeValue::string("x")))
            .collect();

        attrs.set("traceparent", "00-abc".to_string());
        assert_eq!(attrs.len(), MessageAttributes::MAX_ATTRIBUTES);
        assert!(!attrs.contains_key("traceparent"));

        // Replacing an existing key is still allowed at the limit
        attrs.set("attr-0", "y".to_string());
        assert_eq!(attrs.get("attr-0"), Some("y"));
    }

    #[test]
    fn test_deserialize_sqs_event_shape() {
        let json = r#"{
            "traceparent": {
                "stringValue": "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01",
                "stringListValues": [],
                "binaryListValues": [],
                "dataType": "String"
            }
        }"#;

        let attrs: MessageAttributes = serde_json::from_str(json).unwrap();
        assert_eq!(
            attrs.get("traceparent"),
            Some("00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01")
        );
    }

    #[test]
    fn test_deserialize_sns_event_shape() {
        let json = r#"{ "tracestate": { "Type": "String", "Value": "rojo=00f067aa0ba902b7" } }"#;

        let attrs: MessageAttributes = serde_json::from_str(json).unwrap();
        assert_eq!(attrs.get("tracestate"), Some("rojo=00f067aa0ba902b7"));
    }

    #[test]
    fn test_serialize_aws_json_shape() {
        let mut attrs = MessageAttributes::new();
        attrs.set("traceparent", "00-abc".to_string());

        let value = serde_json::to_value(&attrs).unwrap();
        assert_eq!(value["traceparent"]["DataType"], "String");
        assert_eq!(value["traceparent"]["StringValue"], "00-abc");
    }
}
