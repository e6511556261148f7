//! Legacy correlation id bridge
//!
//! Services that predate W3C trace context send an `X-CorrelationId` GUID.
//! During migration the bridge maps that GUID onto a trace parent, so the
//! old and new worlds end up in the same trace:
//!
//! | In-flight parent | Result |
//! |------------------|--------|
//! | none | adopt the GUID as trace id, sentinel span id |
//! | foreign (e.g. hierarchical `Request-Id`) | try to override; on failure continue parentless |
//! | native `traceparent` | keep native, ignore the GUID |
//!
//! The bridge only reads the legacy header, runs at most once per request
//! and must run before the request span starts.

use crate::carrier::Carrier;
use crate::context::{Baggage, PropagationContext, SpanId, TraceContext, TraceFlags, TraceId};
use thiserror::Error;
use uuid::Uuid;

/// Default legacy header
pub const CORRELATION_ID_HEADER: &str = "X-CorrelationId";

/// Errors raised when changing a request's parent
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("request span already started; its parent can no longer change")]
    SpanStarted,

    #[error("native parent in trace {0} cannot be overridden")]
    NativeParent(TraceId),
}

/// Legacy GUID identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Parse any GUID text form; `None` when malformed or nil
    ///
    /// ```
    /// use tsunagi::correlation::CorrelationId;
    ///
    /// let id = CorrelationId::parse(" {3FA85F64-5717-4562-B3FC-2C963F66AFA6} ").unwrap();
    /// assert_eq!(id.trace_id().to_string(), "3fa85f6457174562b3fc2c963f66afa6");
    ///
    /// assert!(CorrelationId::parse("00000000-0000-0000-0000-000000000000").is_none());
    /// assert!(CorrelationId::parse("not-a-guid").is_none());
    /// ```
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        // Hyphenated, simple and braced forms only
        if value.get(..4).is_some_and(|prefix| prefix.eq_ignore_ascii_case("urn:")) {
            return None;
        }

        Uuid::parse_str(value)
            .ok()
            .filter(|id| !id.is_nil())
            .map(Self)
    }

    /// Read and parse `name` from `carrier`
    pub fn from_carrier(carrier: &dyn Carrier, name: &str) -> Option<Self> {
        carrier.get(name).and_then(Self::parse)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// The GUID's 128 bits as a trace id
    pub fn trace_id(&self) -> TraceId {
        TraceId::new(self.0.as_u128())
    }

    /// Remote, sampled parent continuing the legacy trace
    pub fn to_trace_context(&self) -> TraceContext {
        TraceContext::new(
            self.trace_id(),
            SpanId::CONTINUATION,
            TraceFlags::SAMPLED,
            true,
        )
    }
}

/// Parent of a request before its span starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InflightParent {
    Absent,
    /// A valid W3C parent
    Native(TraceContext),
    /// A parent id in a format other than W3C
    Foreign(String),
}

/// Per-request record of the in-flight parent
#[derive(Debug, Clone)]
pub struct ParentSlot {
    parent: InflightParent,
    started: bool,
    bridged: bool,
}

impl ParentSlot {
    pub fn new(parent: InflightParent) -> Self {
        Self {
            parent,
            started: false,
            bridged: false,
        }
    }

    pub fn parent(&self) -> &InflightParent {
        &self.parent
    }

    pub fn native_parent(&self) -> Option<&TraceContext> {
        match &self.parent {
            InflightParent::Native(cx) => Some(cx),
            _ => None,
        }
    }

    /// Replace a missing or foreign parent
    pub fn override_parent(&mut self, trace: TraceContext) -> Result<(), BridgeError> {
        if self.started {
            return Err(BridgeError::SpanStarted);
        }
        if let InflightParent::Native(native) = &self.parent {
            return Err(BridgeError::NativeParent(native.trace_id));
        }

        self.parent = InflightParent::Native(trace);
        Ok(())
    }

    /// Drop a parent that cannot be used
    pub fn clear(&mut self) {
        if !matches!(self.parent, InflightParent::Native(_)) {
            self.parent = InflightParent::Absent;
        }
    }

    /// Record that the request span has started
    ///
    /// Hosts that start the span before the bridge runs call this first;
    /// the bridge then refuses to override and degrades to no parent.
    pub fn mark_started(&mut self) {
        self.started = true;
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_bridged(&self) -> bool {
        self.bridged
    }

    /// Parent to start the request span under, carrying `baggage`
    pub fn to_propagation_context(&self, baggage: Baggage) -> PropagationContext {
        PropagationContext::new(self.native_parent().cloned(), baggage)
    }
}

/// What the bridge did for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeOutcome {
    Disabled,
    /// Header missing, malformed or nil
    NoCorrelationId,
    /// No parent existed; the legacy id became the parent
    Adopted(TraceId),
    /// A foreign parent was replaced by the legacy id
    Overridden(TraceId),
    /// A foreign parent could not be replaced; continuing parentless
    OverrideFailed,
    /// No parent existed but the span had already started
    Refused,
    /// A native parent won over the legacy id
    NativeKept,
    /// The bridge already ran for this request
    AlreadyApplied,
}

impl BridgeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeOutcome::Disabled => "disabled",
            BridgeOutcome::NoCorrelationId => "no_correlation_id",
            BridgeOutcome::Adopted(_) => "adopted",
            BridgeOutcome::Overridden(_) => "overridden",
            BridgeOutcome::OverrideFailed => "override_failed",
            BridgeOutcome::Refused => "refused",
            BridgeOutcome::NativeKept => "native_kept",
            BridgeOutcome::AlreadyApplied => "already_applied",
        }
    }
}

/// Maps a legacy correlation header onto the request's trace parent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationBridge {
    header: String,
    enabled: bool,
}

impl CorrelationBridge {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            enabled: true,
        }
    }

    pub fn disabled() -> Self {
        Self {
            header: CORRELATION_ID_HEADER.to_string(),
            enabled: false,
        }
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Apply the merge policy once for the request owning `slot`
    ///
    /// Never fails: every refusal degrades to a weaker parent.
    pub fn apply(&self, carrier: &dyn Carrier, slot: &mut ParentSlot) -> BridgeOutcome {
        if slot.bridged {
            return BridgeOutcome::AlreadyApplied;
        }
        slot.bridged = true;

        let outcome = self.merge(carrier, slot);

        tracing::debug!(
            header = %self.header,
            outcome = outcome.as_str(),
            "Correlation bridge applied"
        );
        #[cfg(feature = "metrics")]
        crate::metrics::record_bridge_outcome(outcome.as_str());

        outcome
    }

    fn merge(&self, carrier: &dyn Carrier, slot: &mut ParentSlot) -> BridgeOutcome {
        if !self.enabled {
            return BridgeOutcome::Disabled;
        }

        let Some(correlation_id) = CorrelationId::from_carrier(carrier, &self.header) else {
            return BridgeOutcome::NoCorrelationId;
        };
        let trace_id = correlation_id.trace_id();

        match slot.parent() {
            InflightParent::Native(_) => BridgeOutcome::NativeKept,
            InflightParent::Absent => match slot.override_parent(correlation_id.to_trace_context()) {
                Ok(()) => BridgeOutcome::Adopted(trace_id),
                Err(e) => {
                    tracing::debug!(error = %e, "Could not adopt legacy correlation id");
                    BridgeOutcome::Refused
                }
            },
            InflightParent::Foreign(foreign) => {
                let foreign = foreign.clone();
                match slot.override_parent(correlation_id.to_trace_context()) {
                    Ok(()) => BridgeOutcome::Overridden(trace_id),
                    Err(e) => {
                        tracing::debug!(
                            foreign_parent = %foreign,
                            error = %e,
                            "Could not override foreign parent, continuing without one"
                        );
                        slot.clear();
                        BridgeOutcome::OverrideFailed
                    }
                }
            }
        }
    }
}

impl Default for CorrelationBridge {
    fn default() -> Self {
        Self::new(CORRELATION_ID_HEADER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::HeaderMap;

    fn headers(correlation_id: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-correlationid", correlation_id.parse().unwrap());
        headers
    }

    #[test]
    fn test_parse_accepts_guid_forms() {
        let expected = "3fa85f6457174562b3fc2c963f66afa6";
        for form in [
            "3fa85f64-5717-4562-b3fc-2c963f66afa6",
            "3FA85F6457174562B3FC2C963F66AFA6",
            "{3fa85f64-5717-4562-b3fc-2c963f66afa6}",
        ] {
            let id = CorrelationId::parse(form).unwrap();
            assert_eq!(id.trace_id().to_string(), expected, "form {}", form);
        }
    }

    #[test]
    fn test_parse_rejects_urn_form() {
        assert!(CorrelationId::parse("urn:uuid:3fa85f64-5717-4562-b3fc-2c963f66afa6").is_none());
        assert!(CorrelationId::parse("URN:UUID:3fa85f64-5717-4562-b3fc-2c963f66afa6").is_none());
    }

    #[test]
    fn test_absent_parent_adopts_legacy_id() {
        let mut slot = ParentSlot::new(InflightParent::Absent);
        let outcome = CorrelationBridge::default().apply(
            &headers("3fa85f64-5717-4562-b3fc-2c963f66afa6"),
            &mut slot,
        );

        assert!(matches!(outcome, BridgeOutcome::Adopted(_)));
        let parent = slot.native_parent().unwrap();
        assert_eq!(parent.trace_id.to_string(), "3fa85f6457174562b3fc2c963f66afa6");
        assert_eq!(parent.span_id.to_string(), "ffffffffffffffff");
        assert!(parent.is_sampled());
        assert!(parent.is_remote);
    }

    #[test]
    fn test_nil_guid_is_ignored() {
        let mut slot = ParentSlot::new(InflightParent::Absent);
        let outcome = CorrelationBridge::default().apply(
            &headers("00000000-0000-0000-0000-000000000000"),
            &mut slot,
        );

        assert_eq!(outcome, BridgeOutcome::NoCorrelationId);
        assert_eq!(slot.parent(), &InflightParent::Absent);
    }

    #[test]
    fn test_native_parent_wins() {
        let native = TraceContext::new_root(true);
        let mut slot = ParentSlot::new(InflightParent::Native(native.clone()));

        let outcome = CorrelationBridge::default().apply(
            &headers("3fa85f64-5717-4562-b3fc-2c963f66afa6"),
            &mut slot,
        );

        assert_eq!(outcome, BridgeOutcome::NativeKept);
        assert_eq!(slot.native_parent(), Some(&native));
    }

    #[test]
    fn test_foreign_parent_is_overridden() {
        let mut slot = ParentSlot::new(InflightParent::Foreign("|abc.1.".to_string()));
        let outcome = CorrelationBridge::default().apply(
            &headers("3fa85f64-5717-4562-b3fc-2c963f66afa6"),
            &mut slot,
        );

        assert!(matches!(outcome, BridgeOutcome::Overridden(_)));
        assert!(slot.native_parent().unwrap().is_continuation());
    }

    #[test]
    fn test_failed_override_continues_parentless() {
        let mut slot = ParentSlot::new(InflightParent::Foreign("|abc.1.".to_string()));
        slot.mark_started();

        let outcome = CorrelationBridge::default().apply(
            &headers("3fa85f64-5717-4562-b3fc-2c963f66afa6"),
            &mut slot,
        );

        assert_eq!(outcome, BridgeOutcome::OverrideFailed);
        assert_eq!(slot.parent(), &InflightParent::Absent);
    }

    #[test]
    fn test_bridge_runs_once() {
        let bridge = CorrelationBridge::default();
        let mut slot = ParentSlot::new(InflightParent::Absent);
        let carrier = headers("3fa85f64-5717-4562-b3fc-2c963f66afa6");

        bridge.apply(&carrier, &mut slot);
        assert_eq!(bridge.apply(&carrier, &mut slot), BridgeOutcome::AlreadyApplied);
    }

    #[test]
    fn test_disabled_bridge_does_nothing() {
        let mut slot = ParentSlot::new(InflightParent::Absent);
        let outcome = CorrelationBridge::disabled().apply(
            &headers("3fa85f64-5717-4562-b3fc-2c963f66afa6"),
            &mut slot,
        );

        assert_eq!(outcome, BridgeOutcome::Disabled);
        assert!(slot.native_parent().is_none());
    }

    #[test]
    fn test_override_refused_for_native_parent() {
        let native = TraceContext::new_root(true);
        let mut slot = ParentSlot::new(InflightParent::Native(native.clone()));

        assert_eq!(
            slot.override_parent(TraceContext::new_root(true)),
            Err(BridgeError::NativeParent(native.trace_id))
        );
    }
}
