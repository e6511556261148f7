//! Trace context data model
//!
//! Identifiers, flags and the [`PropagationContext`] that flows through
//! extraction and injection, plus the task-scoped "current" context.
//!
//! # Scoping
//!
//! The current context lives in a `tokio::task_local!`, so it follows one
//! logical call chain and never leaks across concurrently handled requests.
//!
//! ```
//! use tsunagi::context::{self, PropagationContext, TraceContext};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let parent = PropagationContext::root().with_trace(TraceContext::new_root(true));
//!
//! context::scope(parent.clone(), async {
//!     assert_eq!(context::current(), parent);
//! })
//! .await;
//!
//! assert!(context::current().trace().is_none());
//! # }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use thiserror::Error;
use tokio::task_local;

task_local! {
    static CURRENT_CONTEXT: PropagationContext;
}

/// Errors raised when parsing trace or span identifiers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("expected {expected} hex digits, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("identifier contains non-hex or uppercase characters: {0}")]
    InvalidDigit(String),

    #[error("identifier must not be all zeroes")]
    AllZero,
}

/// Parse exactly `digits` lowercase hex characters into an integer.
fn parse_lower_hex(value: &str, digits: usize) -> Result<u128, IdError> {
    if value.len() != digits {
        return Err(IdError::Length {
            expected: digits,
            actual: value.len(),
        });
    }

    if !value
        .bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        return Err(IdError::InvalidDigit(value.to_string()));
    }

    u128::from_str_radix(value, 16).map_err(|_| IdError::InvalidDigit(value.to_string()))
}

/// 128-bit trace identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TraceId(u128);

impl TraceId {
    /// The all-zero trace id, never valid on the wire
    pub const INVALID: TraceId = TraceId(0);

    pub const fn new(value: u128) -> Self {
        Self(value)
    }

    /// Generate a random, valid trace id
    pub fn random() -> Self {
        loop {
            let value = rand::random::<u128>();
            if value != 0 {
                return Self(value);
            }
        }
    }

    /// Parse 32 lowercase hex digits
    pub fn from_hex(value: &str) -> Result<Self, IdError> {
        match parse_lower_hex(value, 32)? {
            0 => Err(IdError::AllZero),
            id => Ok(Self(id)),
        }
    }

    pub const fn as_u128(&self) -> u128 {
        self.0
    }

    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TraceId({})", self)
    }
}

/// 64-bit span identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SpanId(u64);

impl SpanId {
    /// The all-zero span id, never valid on the wire
    pub const INVALID: SpanId = SpanId(0);

    /// Marks a trace continuation that has no real parent span
    /// (`ffffffffffffffff`), used when a trace id is adopted from a
    /// legacy correlation id.
    pub const CONTINUATION: SpanId = SpanId(u64::MAX);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Generate a random span id that is neither zero nor the continuation sentinel
    pub fn random() -> Self {
        loop {
            let value = rand::random::<u64>();
            if value != 0 && value != u64::MAX {
                return Self(value);
            }
        }
    }

    /// Parse 16 lowercase hex digits
    pub fn from_hex(value: &str) -> Result<Self, IdError> {
        match parse_lower_hex(value, 16)? as u64 {
            0 => Err(IdError::AllZero),
            id => Ok(Self(id)),
        }
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::Debug for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpanId({})", self)
    }
}

/// W3C trace flags (bit 0 = sampled)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct TraceFlags(u8);

impl TraceFlags {
    pub const NOT_SAMPLED: TraceFlags = TraceFlags(0x00);
    pub const SAMPLED: TraceFlags = TraceFlags(0x01);

    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    pub fn is_sampled(&self) -> bool {
        (self.0 & 0x01) != 0
    }

    /// Set or clear the sampled bit, keeping the other bits
    pub fn with_sampled(self, sampled: bool) -> Self {
        if sampled {
            Self(self.0 | 0x01)
        } else {
            Self(self.0 & !0x01)
        }
    }

    pub const fn to_u8(self) -> u8 {
        self.0
    }
}

/// Position in a distributed call tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub flags: TraceFlags,
    /// Raw `tracestate` value; empty when none was received
    pub trace_state: String,
    /// True when the context was received from another process
    pub is_remote: bool,
}

impl TraceContext {
    pub fn new(trace_id: TraceId, span_id: SpanId, flags: TraceFlags, is_remote: bool) -> Self {
        Self {
            trace_id,
            span_id,
            flags,
            trace_state: String::new(),
            is_remote,
        }
    }

    /// A fresh local root: new trace id, new span id
    pub fn new_root(sampled: bool) -> Self {
        Self::new(
            TraceId::random(),
            SpanId::random(),
            TraceFlags::NOT_SAMPLED.with_sampled(sampled),
            false,
        )
    }

    /// A local child in the same trace, inheriting flags and trace state
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: SpanId::random(),
            flags: self.flags,
            trace_state: self.trace_state.clone(),
            is_remote: false,
        }
    }

    pub fn with_trace_state(mut self, trace_state: impl Into<String>) -> Self {
        self.trace_state = trace_state.into();
        self
    }

    pub fn with_flags(mut self, flags: TraceFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn is_valid(&self) -> bool {
        self.trace_id.is_valid() && self.span_id.is_valid()
    }

    pub fn is_sampled(&self) -> bool {
        self.flags.is_sampled()
    }

    /// True when the span id is the continuation sentinel
    pub fn is_continuation(&self) -> bool {
        self.span_id == SpanId::CONTINUATION
    }

    /// Format as a version 00 `traceparent` value
    pub fn to_traceparent(&self) -> String {
        format!(
            "00-{}-{}-{:02x}",
            self.trace_id,
            self.span_id,
            self.flags.to_u8()
        )
    }
}

/// Opaque key/value metadata propagated alongside the trace
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Baggage(BTreeMap<String, String>);

impl Baggage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Baggage {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Unit passed through extract and inject: trace position plus baggage
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PropagationContext {
    trace: Option<TraceContext>,
    baggage: Baggage,
}

impl PropagationContext {
    pub fn new(trace: Option<TraceContext>, baggage: Baggage) -> Self {
        Self { trace, baggage }
    }

    /// No trace, no baggage
    pub fn root() -> Self {
        Self::default()
    }

    pub fn with_trace(mut self, trace: TraceContext) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn without_trace(mut self) -> Self {
        self.trace = None;
        self
    }

    pub fn with_baggage(mut self, baggage: Baggage) -> Self {
        self.baggage = baggage;
        self
    }

    pub fn trace(&self) -> Option<&TraceContext> {
        self.trace.as_ref()
    }

    pub fn baggage(&self) -> &Baggage {
        &self.baggage
    }

    pub fn baggage_mut(&mut self) -> &mut Baggage {
        &mut self.baggage
    }

    /// The trace context, if it is one that may be used as a parent
    pub fn valid_parent(&self) -> Option<&TraceContext> {
        self.trace.as_ref().filter(|t| t.is_valid())
    }
}

/// Current propagation context of this task, or a root context outside any scope
pub fn current() -> PropagationContext {
    CURRENT_CONTEXT
        .try_with(|cx| cx.clone())
        .unwrap_or_default()
}

/// Run `future` with `cx` as the current context
pub async fn scope<F, T>(cx: PropagationContext, future: F) -> T
where
    F: Future<Output = T>,
{
    CURRENT_CONTEXT.scope(cx, future).await
}

/// Run `f` synchronously with `cx` as the current context
pub fn sync_scope<F, T>(cx: PropagationContext, f: F) -> T
where
    F: FnOnce() -> T,
{
    CURRENT_CONTEXT.sync_scope(cx, f)
}
