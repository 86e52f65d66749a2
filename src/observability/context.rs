//! Request-scoped context carrier.
//!
//! # Responsibilities
//! - Carry inbound metadata (HTTP headers or RPC metadata) for one request
//! - Carry the active span as an OpenTelemetry context (the telemetry token)
//! - Carry the caller-supplied deadline unchanged through every layer
//!
//! # Design Decisions
//! - Cheap to clone: metadata is shared behind an `Arc`
//! - Immutable: `with_*` methods return a new context, never mutate in place
//! - Metadata keys are case-insensitive, like HTTP/2 headers

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use opentelemetry::propagation::Extractor;

/// Metadata key holding the inbound request id.
pub const REQUEST_ID_KEY: &str = "x-request-id";

/// Metadata key holding the client address forwarded by the gateway.
pub const CLIENT_IP_KEY: &str = "x-client-ip";

/// Context value threaded through a single request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    metadata: Arc<HeaderMap>,
    otel: opentelemetry::Context,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// An empty context with no metadata, no span and no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from inbound headers.
    ///
    /// A W3C `traceparent` header, when present, becomes the remote parent of
    /// any span started from this context.
    pub fn from_headers(headers: HeaderMap) -> Self {
        let otel = opentelemetry::global::get_text_map_propagator(|propagator| {
            propagator.extract(&MetadataExtractor(&headers))
        });
        Self {
            metadata: Arc::new(headers),
            otel,
            deadline: None,
        }
    }

    /// Return a copy carrying one more metadata pair.
    ///
    /// Keys or values that are not valid header text are ignored.
    pub fn with_metadata(&self, key: &str, value: &str) -> Self {
        let mut metadata = (*self.metadata).clone();
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            metadata.append(name, value);
        }
        Self {
            metadata: Arc::new(metadata),
            ..self.clone()
        }
    }

    /// Return a copy bounded by `deadline`.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            ..self.clone()
        }
    }

    /// Return a copy bounded by `now + timeout`, keeping an earlier deadline.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        self.with_deadline(deadline)
    }

    /// Return a copy whose active span is carried by `otel`.
    pub fn with_otel_context(&self, otel: opentelemetry::Context) -> Self {
        Self {
            otel,
            ..self.clone()
        }
    }

    pub fn metadata(&self) -> &HeaderMap {
        &self.metadata
    }

    /// First metadata value under `key`, if it is valid UTF-8.
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.to_str().ok())
    }

    /// Request id from inbound metadata, or `None` when absent or empty.
    pub fn request_id(&self) -> Option<&str> {
        self.metadata_value(REQUEST_ID_KEY).filter(|id| !id.is_empty())
    }

    pub fn otel_context(&self) -> &opentelemetry::Context {
        &self.otel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Metadata rendered as a JSON object for log entries.
    pub fn metadata_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for key in self.metadata.keys() {
            let values: Vec<serde_json::Value> = self
                .metadata
                .get_all(key)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .map(|v| serde_json::Value::String(v.to_string()))
                .collect();
            map.insert(key.as_str().to_string(), serde_json::Value::Array(values));
        }
        serde_json::Value::Object(map)
    }
}

struct MetadataExtractor<'a>(&'a HeaderMap);

impl Extractor for MetadataExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|k| k.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_lookup_is_case_insensitive() {
        let ctx = RequestContext::new().with_metadata("customKey", "customValue");
        assert_eq!(ctx.metadata_value("customkey"), Some("customValue"));
        assert_eq!(ctx.metadata_value("CUSTOMKEY"), Some("customValue"));
    }

    #[test]
    fn empty_request_id_is_absent() {
        let ctx = RequestContext::new().with_metadata(REQUEST_ID_KEY, "");
        assert_eq!(ctx.request_id(), None);

        let ctx = ctx.with_metadata(REQUEST_ID_KEY, "abc");
        // First value wins, and it is empty.
        assert_eq!(ctx.request_id(), None);

        let ctx = RequestContext::new().with_metadata(REQUEST_ID_KEY, "abc");
        assert_eq!(ctx.request_id(), Some("abc"));
    }

    #[test]
    fn with_metadata_does_not_touch_original() {
        let original = RequestContext::new();
        let derived = original.with_metadata("k", "v");
        assert!(original.metadata().is_empty());
        assert_eq!(derived.metadata().len(), 1);
    }

    #[test]
    fn with_timeout_keeps_earlier_deadline() {
        let ctx = RequestContext::new().with_timeout(Duration::from_millis(10));
        let first = ctx.deadline().unwrap();
        let later = ctx.with_timeout(Duration::from_secs(60));
        assert_eq!(later.deadline(), Some(first));
    }

    #[test]
    fn metadata_json_groups_values() {
        let ctx = RequestContext::new()
            .with_metadata("a", "1")
            .with_metadata("a", "2");
        assert_eq!(ctx.metadata_json(), serde_json::json!({ "a": ["1", "2"] }));
    }
}
