//! Configuration module
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation, and builds the runtime
//! components (propagation engine, sampler, bridge, enrichment filter) from
//! them.
//!
//! # Example
//!
//! ```yaml
//! service_name: "${SERVICE_NAME:-orders-api}"
//! propagation:
//!   propagators: ["tracecontext", "baggage"]
//! correlation:
//!   enabled: true
//!   header: "X-CorrelationId"
//! sampling:
//!   strategy: "parent_based"
//!   ratio: 1.0
//! messaging:
//!   inject_http_headers: true
//! logging:
//!   level: "info"
//!   format: "json"
//! enrichment:
//!   baggage_prefixes: ["X-"]
//!   include_tags: true
//! ```

use crate::correlation::{CorrelationBridge, CORRELATION_ID_HEADER};
use crate::enrichment::{EnrichmentError, EnrichmentFilter, DEFAULT_BAGGAGE_PREFIX};
use crate::propagation::{
    BaggagePropagator, CompositePropagator, PropagationEngine, Propagator, TraceContextPropagator,
};
use crate::interceptors::{InboundInstrumentation, OutboundInstrumentation};
use crate::server::RequestTracer;
use crate::telemetry::{MessagingSystem, Sampler, SpanFactory};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in a string.
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - Simple expansion, keeps placeholder if var not found
/// - `${VAR_NAME:-default}` - Expansion with default value
///
/// Variable names must start with a letter or underscore and contain only
/// uppercase letters, digits, and underscores.
pub(crate) fn expand_env_vars(s: &str) -> String {
    lazy_static::lazy_static! {
        static ref ENV_VAR: regex_lite::Regex =
            regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").unwrap();
    }

    let mut last_match = 0;
    let mut result = String::with_capacity(s.len());

    for cap in ENV_VAR.captures_iter(s) {
        let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };

        result.push_str(&s[last_match..full_match.start()]);

        let value = match std::env::var(var_name.as_str()) {
            Ok(val) => val,
            Err(_) => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                // No env var and no default. Keep the original placeholder.
                None => full_match.as_str().to_string(),
            },
        };
        result.push_str(&value);

        last_match = full_match.end();
    }

    result.push_str(&s[last_match..]);
    result
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl From<EnrichmentError> for ConfigError {
    fn from(e: EnrichmentError) -> Self {
        ConfigError::ValidationError(e.to_string())
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default)]
    pub propagation: PropagationConfig,
    #[serde(default)]
    pub correlation: CorrelationConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub messaging: MessagingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            propagation: PropagationConfig::default(),
            correlation: CorrelationConfig::default(),
            sampling: SamplingConfig::default(),
            messaging: MessagingConfig::default(),
            logging: LoggingConfig::default(),
            enrichment: EnrichmentConfig::default(),
        }
    }
}

fn default_service_name() -> String {
    "tsunagi".to_string()
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "Service name cannot be empty".into(),
            ));
        }

        if self.propagation.propagators.is_empty() {
            return Err(ConfigError::ValidationError(
                "At least one propagator must be configured".into(),
            ));
        }
        for name in &self.propagation.propagators {
            match name.as_str() {
                "tracecontext" | "baggage" => {}
                _ => {
                    return Err(ConfigError::ValidationError(format!(
                        "Invalid propagator '{}': must be 'tracecontext' or 'baggage'",
                        name
                    )))
                }
            }
        }

        if self.correlation.enabled && self.correlation.header.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "Correlation header cannot be empty when the bridge is enabled".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.sampling.ratio) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid sampling ratio {}: must be between 0.0 and 1.0",
                self.sampling.ratio
            )));
        }

        match self.sampling.strategy.as_str() {
            "always" | "never" | "ratio" | "parent_based" => {}
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid sampling strategy '{}': must be 'always', 'never', 'ratio', or 'parent_based'",
                    self.sampling.strategy
                )))
            }
        }

        if self.enrichment.baggage_prefixes.is_empty() && !self.enrichment.include_tags {
            return Err(ConfigError::ValidationError(
                "Enrichment needs at least one baggage prefix or include_tags".into(),
            ));
        }

        Ok(())
    }

    /// Propagation engine running the configured propagators in order
    pub fn propagation_engine(&self) -> PropagationEngine {
        let propagators: Vec<Box<dyn Propagator>> = self
            .propagation
            .propagators
            .iter()
            .filter_map(|name| match name.as_str() {
                "tracecontext" => Some(Box::new(TraceContextPropagator::new()) as Box<dyn Propagator>),
                "baggage" => Some(Box::new(BaggagePropagator::new()) as Box<dyn Propagator>),
                other => {
                    tracing::warn!(propagator = %other, "Ignoring unknown propagator");
                    None
                }
            })
            .collect();

        PropagationEngine::new(CompositePropagator::new(propagators))
    }

    /// Sampler for the configured strategy
    pub fn sampler(&self) -> Sampler {
        match self.sampling.strategy.as_str() {
            "never" => Sampler::AlwaysOff,
            "ratio" => Sampler::TraceIdRatio(self.sampling.ratio),
            "parent_based" => {
                Sampler::ParentBased(Box::new(Sampler::TraceIdRatio(self.sampling.ratio)))
            }
            _ => Sampler::AlwaysOn,
        }
    }

    pub fn correlation_bridge(&self) -> CorrelationBridge {
        if self.correlation.enabled {
            CorrelationBridge::new(self.correlation.header.clone())
        } else {
            CorrelationBridge::disabled()
        }
    }

    pub fn enrichment_filter(&self) -> Result<EnrichmentFilter, ConfigError> {
        Ok(EnrichmentFilter::from_prefixes(
            &self.enrichment.baggage_prefixes,
            self.enrichment.include_tags,
        )?)
    }

    /// Span factory with the configured sampler, logging finished spans
    pub fn span_factory(&self) -> SpanFactory {
        SpanFactory::with_sampler(self.sampler())
    }

    pub fn request_tracer(&self, factory: SpanFactory) -> RequestTracer {
        RequestTracer::new(self.propagation_engine(), self.correlation_bridge(), factory)
    }

    pub fn outbound_instrumentation(
        &self,
        system: MessagingSystem,
        factory: SpanFactory,
    ) -> OutboundInstrumentation {
        OutboundInstrumentation::new(system, self.propagation_engine(), factory)
            .with_header_injection(self.messaging.inject_http_headers)
    }

    pub fn inbound_instrumentation(&self, factory: SpanFactory) -> InboundInstrumentation {
        InboundInstrumentation::new(self.propagation_engine(), factory)
    }
}

/// Propagator selection
///
/// # Propagators
/// - `tracecontext` - W3C `traceparent` / `tracestate`
/// - `baggage` - W3C `baggage`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropagationConfig {
    #[serde(default = "default_propagators")]
    pub propagators: Vec<String>,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            propagators: default_propagators(),
        }
    }
}

fn default_propagators() -> Vec<String> {
    vec!["tracecontext".to_string(), "baggage".to_string()]
}

/// Legacy correlation id bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationConfig {
    /// Default: true
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Header carrying the legacy GUID. Default: "X-CorrelationId"
    #[serde(default = "default_correlation_header")]
    pub header: String,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            header: default_correlation_header(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_correlation_header() -> String {
    CORRELATION_ID_HEADER.to_string()
}

/// Trace sampling configuration.
///
/// # Sampling Strategies
/// - `always` - Sample all traces
/// - `never` - Sample no traces
/// - `ratio` - Sample a fraction of traces based on `ratio`
/// - `parent_based` - Respect the parent's decision, `ratio` for roots (default)
///
/// # Example
///
/// ```yaml
/// sampling:
///   strategy: "ratio"
///   ratio: 0.1  # Sample 10% of traces
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    #[serde(default = "default_sampling_strategy")]
    pub strategy: String,

    /// Sampling ratio (0.0 to 1.0). Default: 1.0
    #[serde(default = "default_sampling_ratio")]
    pub ratio: f64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            strategy: default_sampling_strategy(),
            ratio: default_sampling_ratio(),
        }
    }
}

fn default_sampling_strategy() -> String {
    "parent_based".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

/// Outbound messaging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingConfig {
    /// Inject trace headers into signed wire requests. Default: true
    #[serde(default = "default_true")]
    pub inject_http_headers: bool,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            inject_http_headers: true,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Log output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when RUST_LOG is unset. Default: "info"
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Log enrichment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Baggage key prefixes that may be logged (case-insensitive). Default: ["X-"]
    #[serde(default = "default_baggage_prefixes")]
    pub baggage_prefixes: Vec<String>,

    /// Log span tags. Default: true
    #[serde(default = "default_true")]
    pub include_tags: bool,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            baggage_prefixes: default_baggage_prefixes(),
            include_tags: true,
        }
    }
}

fn default_baggage_prefixes() -> Vec<String> {
    vec![DEFAULT_BAGGAGE_PREFIX.to_string()]
}
