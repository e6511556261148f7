//! W3C Baggage propagator
//!
//! Carries user-defined key/value pairs in the `baggage` key:
//! `key1=value1,key2=value2;property`. Values are percent-encoded; member
//! properties are not retained.

use super::{set_if_absent, Propagator, BAGGAGE};
use crate::carrier::Carrier;
use crate::context::{Baggage, PropagationContext};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

/// Maximum number of members written or read
pub const MAX_MEMBERS: usize = 180;

/// Maximum length of the serialized `baggage` value in bytes
pub const MAX_BAGGAGE_LEN: usize = 8192;

/// Characters that must be escaped inside a baggage key or value
const BAGGAGE_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b',')
    .add(b';')
    .add(b'=')
    .add(b'\\')
    .add(b'%');

fn decode(raw: &str) -> Option<String> {
    percent_decode_str(raw.trim())
        .decode_utf8()
        .ok()
        .map(|s| s.into_owned())
}

/// Parse a `baggage` value, skipping malformed members
fn parse_baggage(value: &str) -> Baggage {
    let mut baggage = Baggage::new();

    for member in value.split(',').take(MAX_MEMBERS) {
        let pair = member.split(';').next().unwrap_or_default();
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };

        match (decode(key), decode(value)) {
            (Some(key), Some(value)) if !key.is_empty() => {
                baggage.insert(key, value);
            }
            _ => {
                tracing::trace!(member = %member, "Skipping malformed baggage member");
            }
        }
    }

    baggage
}

/// Serialize baggage, dropping members that would exceed the limits
fn format_baggage(baggage: &Baggage) -> String {
    let mut out = String::new();

    for (count, (key, value)) in baggage.iter().enumerate() {
        if count >= MAX_MEMBERS {
            break;
        }

        let member = format!(
            "{}={}",
            utf8_percent_encode(key, BAGGAGE_ENCODE_SET),
            utf8_percent_encode(value, BAGGAGE_ENCODE_SET)
        );

        let separator = usize::from(!out.is_empty());
        if out.len() + separator + member.len() > MAX_BAGGAGE_LEN {
            tracing::debug!(key = %key, "Baggage length limit reached, dropping member");
            continue;
        }

        if separator == 1 {
            out.push(',');
        }
        out.push_str(&member);
    }

    out
}

/// Propagates the `baggage` key
#[derive(Debug, Clone, Copy, Default)]
pub struct BaggagePropagator;

impl BaggagePropagator {
    pub fn new() -> Self {
        Self
    }
}

impl Propagator for BaggagePropagator {
    fn extract(&self, carrier: &dyn Carrier, current: &PropagationContext) -> PropagationContext {
        match carrier.get(BAGGAGE).map(parse_baggage) {
            Some(baggage) if !baggage.is_empty() => current.clone().with_baggage(baggage),
            _ => current.clone(),
        }
    }

    fn inject(&self, cx: &PropagationContext, carrier: &mut dyn Carrier) {
        if cx.baggage().is_empty() {
            return;
        }

        set_if_absent(carrier, BAGGAGE, format_baggage(cx.baggage()));
    }

    fn fields(&self) -> Vec<&'static str> {
        vec![BAGGAGE]
    }
}
