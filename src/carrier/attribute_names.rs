//! Attribute-name allow-list carrier
//!
//! `ReceiveMessage` only returns the message attributes that were asked for.
//! "Injecting" into this carrier therefore means requesting the trace
//! attribute names back, not writing values.

use super::Carrier;
use serde::{Deserialize, Serialize};

/// Allow-list entry that requests every attribute
pub const ALL_ATTRIBUTES: &str = "All";

/// Message attribute names requested by a receive call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeNames(Vec<String>);

impl AttributeNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// An allow-list requesting every attribute
    pub fn all() -> Self {
        Self(vec![ALL_ATTRIBUTES.to_string()])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|n| n == name)
    }

    pub fn requests_all(&self) -> bool {
        self.contains(ALL_ATTRIBUTES)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl<S: Into<String>> FromIterator<S> for AttributeNames {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl Carrier for AttributeNames {
    /// A name counts as present when it, or `"All"`, is already requested
    fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|n| n.as_str() == key || n.as_str() == ALL_ATTRIBUTES)
            .map(String::as_str)
    }

    fn set(&mut self, key: &str, _value: String) {
        if !self.contains(key) && !self.requests_all() {
            self.0.push(key.to_string());
        }
    }

    fn keys(&self) -> Vec<&str> {
        self.0.iter().map(String::as_str).collect()
    }
}
