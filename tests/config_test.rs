//! Configuration Tests
//!
//! These tests verify that:
//! - YAML files load with environment variable expansion
//! - Invalid values are rejected at load time
//! - The builders produce components matching the file

use serial_test::serial;
use std::io::Write;
use tempfile::NamedTempFile;
use tsunagi::config::{Config, ConfigError, LogFormat};
use tsunagi::telemetry::Sampler;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn test_full_config_with_env_expansion() {
    std::env::set_var("TSUNAGI_SERVICE", "orders-api");
    std::env::set_var("TSUNAGI_SAMPLING_RATIO", "0.5");

    let file = write_config(
        r#"
service_name: "${TSUNAGI_SERVICE}"
propagation:
  propagators: ["tracecontext", "baggage"]
correlation:
  enabled: true
  header: "${TSUNAGI_CORRELATION_HEADER:-X-Legacy-Id}"
sampling:
  strategy: "ratio"
  ratio: ${TSUNAGI_SAMPLING_RATIO}
messaging:
  inject_http_headers: false
logging:
  level: "debug"
  format: "json"
enrichment:
  baggage_prefixes: ["X-", "tenant"]
  include_tags: false
"#,
    );

    let config = Config::load(file.path()).unwrap();

    assert_eq!(config.service_name, "orders-api");
    assert_eq!(config.correlation.header, "X-Legacy-Id");
    assert_eq!(config.correlation_bridge().header(), "X-Legacy-Id");
    assert_eq!(config.sampler(), Sampler::TraceIdRatio(0.5));
    assert!(!config.messaging.inject_http_headers);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, LogFormat::Json);

    let filter = config.enrichment_filter().unwrap();
    assert!(filter.allows_baggage("Tenant-Id"));
    assert!(!filter.allows_baggage("user"));
    assert!(!filter.allows_tag("http.method"));

    std::env::remove_var("TSUNAGI_SERVICE");
    std::env::remove_var("TSUNAGI_SAMPLING_RATIO");
}

#[test]
fn test_minimal_config_uses_defaults() {
    let file = write_config("service_name: billing\n");
    let config = Config::load(file.path()).unwrap();

    assert!(config.correlation.enabled);
    assert_eq!(config.correlation.header, "X-CorrelationId");
    assert_eq!(config.propagation.propagators, vec!["tracecontext", "baggage"]);
    assert_eq!(config.logging.format, LogFormat::Pretty);
    assert_eq!(
        config.propagation_engine().fields(),
        vec!["traceparent", "tracestate", "baggage"]
    );
}

#[test]
fn test_invalid_values_are_rejected() {
    let cases = [
        "service_name: \"\"\n",
        "propagation:\n  propagators: [\"b3\"]\n",
        "propagation:\n  propagators: []\n",
        "sampling:\n  ratio: -0.1\n",
        "sampling:\n  strategy: \"sometimes\"\n",
        "correlation:\n  header: \" \"\n",
        "enrichment:\n  baggage_prefixes: []\n  include_tags: false\n",
    ];

    for case in cases {
        let file = write_config(case);
        let result = Config::load(file.path());
        assert!(
            matches!(result, Err(ConfigError::ValidationError(_))),
            "expected {:?} to be rejected",
            case
        );
    }
}

#[test]
fn test_malformed_yaml_is_a_parse_error() {
    let file = write_config("sampling: [unclosed\n");
    assert!(matches!(Config::load(file.path()), Err(ConfigError::ParseError(_))));
}

#[test]
fn test_disabled_correlation_bridge() {
    let file = write_config("correlation:\n  enabled: false\n  header: \"\"\n");
    let config = Config::load(file.path()).unwrap();
    assert!(!config.correlation_bridge().is_enabled());
}
