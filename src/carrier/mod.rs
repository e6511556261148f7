//! Carrier adapters
//!
//! A carrier is the transport-specific key/value surface that trace context
//! is read from and written to. Three shapes are supported:
//!
//! | Carrier | Used for | `get` | `set` |
//! |---------|----------|-------|-------|
//! | [`hyper::HeaderMap`] | HTTP requests, signed wire requests | first value, case-insensitive | replace header |
//! | [`MessageAttributes`] | SQS/SNS message attributes | unwraps the string payload | add `String` attribute |
//! | [`AttributeNames`] | `ReceiveMessage` attribute allow-list | listed name or `"All"` | request the name back |
//!
//! All three implement [`Carrier`], so the propagation engine never needs to
//! know which transport it is working with.

mod attribute_names;
mod header;
mod message_attributes;

pub use attribute_names::{AttributeNames, ALL_ATTRIBUTES};
pub use message_attributes::{MessageAttributeValue, MessageAttributes, STRING_DATA_TYPE};

/// Uniform read/write surface over a transport's key/value metadata
pub trait Carrier {
    /// Get the value stored under `key`, if any
    fn get(&self, key: &str) -> Option<&str>;

    /// Store `value` under `key`
    ///
    /// Carriers may refuse a write they cannot represent; callers that need
    /// the "never overwrite" guarantee go through
    /// [`crate::propagation::set_if_absent`].
    fn set(&mut self, key: &str, value: String);

    /// Keys currently present on the carrier
    fn keys(&self) -> Vec<&str>;
}
