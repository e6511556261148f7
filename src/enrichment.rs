//! Log enrichment filters
//!
//! Decides which baggage entries and span tags a log enricher may attach to
//! log lines. The propagation core never looks at baggage content; the
//! filtering lives here and only ever reads the context.
//!
//! ```
//! use std::collections::BTreeMap;
//! use tsunagi::context::{Baggage, PropagationContext};
//! use tsunagi::enrichment::EnrichmentFilter;
//!
//! let baggage: Baggage = [("X-Tenant", "acme"), ("session", "secret")].into_iter().collect();
//! let cx = PropagationContext::root().with_baggage(baggage);
//!
//! let fields = EnrichmentFilter::default().fields(&cx, &BTreeMap::new());
//! assert_eq!(fields, vec![("X-Tenant".to_string(), "acme".to_string())]);
//! ```

use crate::context::{self, PropagationContext};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Default prefix of baggage keys that may be logged
pub const DEFAULT_BAGGAGE_PREFIX: &str = "X-";

/// Predicate over a baggage or tag key
pub type KeyPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Enrichment filter errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnrichmentError {
    #[error("At least one of the baggage or tag predicates must be set")]
    NoPredicate,
}

/// Case-insensitive prefix match on any of `prefixes`
pub fn prefix_predicate<I, S>(prefixes: I) -> KeyPredicate
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let prefixes: Vec<String> = prefixes
        .into_iter()
        .map(|p| p.into().to_ascii_lowercase())
        .collect();

    Arc::new(move |key: &str| {
        let key = key.to_ascii_lowercase();
        prefixes.iter().any(|p| key.starts_with(p.as_str()))
    })
}

/// Accepts every key
pub fn any_key() -> KeyPredicate {
    Arc::new(|_: &str| true)
}

/// Baggage and tag filters for log enrichment
///
/// `None` for a predicate means that source is never surfaced.
#[derive(Clone)]
pub struct EnrichmentFilter {
    baggage: Option<KeyPredicate>,
    tags: Option<KeyPredicate>,
}

impl EnrichmentFilter {
    pub fn new(
        baggage: Option<KeyPredicate>,
        tags: Option<KeyPredicate>,
    ) -> Result<Self, EnrichmentError> {
        if baggage.is_none() && tags.is_none() {
            return Err(EnrichmentError::NoPredicate);
        }

        Ok(Self { baggage, tags })
    }

    /// Build from configured baggage prefixes and the tag switch
    pub fn from_prefixes(prefixes: &[String], include_tags: bool) -> Result<Self, EnrichmentError> {
        let baggage = (!prefixes.is_empty()).then(|| prefix_predicate(prefixes.iter().cloned()));
        let tags = include_tags.then(any_key);
        Self::new(baggage, tags)
    }

    pub fn allows_baggage(&self, key: &str) -> bool {
        self.baggage.as_ref().is_some_and(|p| p(key))
    }

    pub fn allows_tag(&self, key: &str) -> bool {
        self.tags.as_ref().is_some_and(|p| p(key))
    }

    /// Fields to attach: allowed baggage entries, then allowed tags
    pub fn fields(
        &self,
        cx: &PropagationContext,
        tags: &BTreeMap<String, String>,
    ) -> Vec<(String, String)> {
        let baggage = cx
            .baggage()
            .iter()
            .filter(|(key, _)| self.allows_baggage(key))
            .map(|(key, value)| (key.to_string(), value.to_string()));

        let tags = tags
            .iter()
            .filter(|(key, _)| self.allows_tag(key))
            .map(|(key, value)| (key.clone(), value.clone()));

        baggage.chain(tags).collect()
    }

    /// [`fields`](Self::fields) for this task's current context
    pub fn current_fields(&self, tags: &BTreeMap<String, String>) -> Vec<(String, String)> {
        self.fields(&context::current(), tags)
    }
}

impl Default for EnrichmentFilter {
    /// Baggage keys starting with `X-`, every tag
    fn default() -> Self {
        Self {
            baggage: Some(prefix_predicate([DEFAULT_BAGGAGE_PREFIX])),
            tags: Some(any_key()),
        }
    }
}

impl fmt::Debug for EnrichmentFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnrichmentFilter")
            .field("baggage", &self.baggage.is_some())
            .field("tags", &self.tags.is_some())
            .finish()
    }
}
