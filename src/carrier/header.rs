//! HTTP header carrier

use super::Carrier;
use hyper::header::{HeaderName, HeaderValue};
use hyper::HeaderMap;

impl Carrier for HeaderMap {
    fn get(&self, key: &str) -> Option<&str> {
        // HeaderMap lookups are case-insensitive and return the first value
        HeaderMap::get(self, key).and_then(|value| value.to_str().ok())
    }

    fn set(&mut self, key: &str, value: String) {
        let name = match HeaderName::from_bytes(key.as_bytes()) {
            Ok(name) => name,
            Err(e) => {
                tracing::debug!(key = %key, error = %e, "Dropping header with invalid name");
                return;
            }
        };

        match HeaderValue::from_str(&value) {
            Ok(value) => {
                self.insert(name, value);
            }
            Err(e) => {
                tracing::debug!(key = %key, error = %e, "Dropping header with invalid value");
            }
        }
    }

    fn keys(&self) -> Vec<&str> {
        HeaderMap::keys(self).map(HeaderName::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert("traceparent", HeaderValue::from_static("00-abc"));

        assert_eq!(Carrier::get(&headers, "TraceParent"), Some("00-abc"));
        assert_eq!(Carrier::get(&headers, "traceparent"), Some("00-abc"));
        assert_eq!(Carrier::get(&headers, "tracestate"), None);
    }

    #[test]
    fn test_get_returns_first_value() {
        let mut headers = HeaderMap::new();
        headers.append("tracestate", HeaderValue::from_static("first=1"));
        headers.append("tracestate", HeaderValue::from_static("second=2"));

        assert_eq!(Carrier::get(&headers, "tracestate"), Some("first=1"));
    }

    #[test]
    fn test_set_drops_invalid_values() {
        let mut headers = HeaderMap::new();
        Carrier::set(&mut headers, "traceparent", "bad\nvalue".to_string());
        Carrier::set(&mut headers, "bad header", "value".to_string());

        assert!(headers.is_empty());
    }

    #[test]
    fn test_keys_lists_lowercase_names() {
        let mut headers = HeaderMap::new();
        Carrier::set(&mut headers, "TraceParent", "00-abc".to_string());

        assert_eq!(Carrier::keys(&headers), vec!["traceparent"]);
    }
}
