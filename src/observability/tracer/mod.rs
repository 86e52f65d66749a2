//! Distributed tracing support.
//!
//! # Responsibilities
//! - Start and end spans around units of work
//! - Expose trace/span identifiers for log correlation
//! - Export spans to an OTLP collector
//!
//! # Design Decisions
//! - The active span travels inside [`RequestContext`], never in thread-locals
//! - A disabled tracer is a terminal no-op state, not an error
//! - Export failures never reach the request path

pub mod otlp;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use otlp::{OtlpTracer, TracerState};

use crate::observability::{global, RequestContext, TelemetryError};

/// Span capability shared by every tracer backend.
pub trait Tracer: Send + Sync {
    /// Start a child of the span active in `ctx` and return a context carrying it.
    fn start_span(&self, ctx: &RequestContext, name: &str) -> RequestContext;

    /// End the span active in `ctx`. Ending twice is a no-op.
    fn end_span(&self, ctx: &RequestContext);

    /// Hex trace id of the span in `ctx`, or an empty string.
    fn trace_id(&self, ctx: &RequestContext) -> String;

    /// Hex span id of the span in `ctx`, or an empty string.
    fn span_id(&self, ctx: &RequestContext) -> String;
}

/// Tracing backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TracerProvider {
    #[default]
    Otlp,
    Jaeger,
    Datadog,
}

impl TracerProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            TracerProvider::Otlp => "otlp",
            TracerProvider::Jaeger => "jaeger",
            TracerProvider::Datadog => "datadog",
        }
    }
}

impl fmt::Display for TracerProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TracerProvider {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "otlp" => Ok(TracerProvider::Otlp),
            "jaeger" => Ok(TracerProvider::Jaeger),
            "datadog" => Ok(TracerProvider::Datadog),
            _ => Err(TelemetryError::InvalidProvider(s.to_string())),
        }
    }
}

impl TryFrom<String> for TracerProvider {
    type Error = TelemetryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TracerProvider> for String {
    fn from(provider: TracerProvider) -> Self {
        provider.as_str().to_string()
    }
}

/// Configuration for exactly one tracer instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TracerConfig {
    pub provider: TracerProvider,
    pub service_name: String,
    /// Collector address, `host:port` or a full `http(s)://` URL.
    pub collector_address: String,
    /// Plaintext connection to the collector instead of TLS.
    pub insecure: bool,
    pub enabled: bool,
}

/// Every concrete tracer backend. Adding a backend means adding a variant.
#[derive(Debug)]
pub enum TracerBackend {
    Otlp(OtlpTracer),
}

impl TracerBackend {
    /// Backend installed when the tracer slot is read before configuration.
    pub fn fallback() -> Self {
        TracerBackend::Otlp(OtlpTracer::disabled())
    }

    /// Flush pending spans and release the exporter.
    pub fn shutdown(&self) {
        match self {
            TracerBackend::Otlp(t) => t.shutdown(),
        }
    }
}

impl Tracer for TracerBackend {
    fn start_span(&self, ctx: &RequestContext, name: &str) -> RequestContext {
        match self {
            TracerBackend::Otlp(t) => t.start_span(ctx, name),
        }
    }

    fn end_span(&self, ctx: &RequestContext) {
        match self {
            TracerBackend::Otlp(t) => t.end_span(ctx),
        }
    }

    fn trace_id(&self, ctx: &RequestContext) -> String {
        match self {
            TracerBackend::Otlp(t) => t.trace_id(ctx),
        }
    }

    fn span_id(&self, ctx: &RequestContext) -> String {
        match self {
            TracerBackend::Otlp(t) => t.span_id(ctx),
        }
    }
}

/// Build the configured tracer, initialize it, install it globally and return
/// the active one.
///
/// Unknown or unimplemented providers are configuration errors. Exporter
/// failures are not: the tracer is logged and installed as disabled so startup
/// continues without tracing.
pub fn tracer_factory(config: &TracerConfig) -> Result<Arc<TracerBackend>, TelemetryError> {
    let backend = match config.provider {
        TracerProvider::Otlp => {
            let mut tracer = OtlpTracer::new(config.clone());
            if let Err(e) = tracer.init() {
                tracing::error!(
                    error = %e,
                    collector = %config.collector_address,
                    "Tracer initialization failed, continuing with tracing disabled"
                );
                tracer = OtlpTracer::disabled();
            }
            TracerBackend::Otlp(tracer)
        }
        TracerProvider::Jaeger => return Err(TelemetryError::NotImplemented("jaeger")),
        TracerProvider::Datadog => return Err(TelemetryError::NotImplemented("datadog")),
    };

    global::set_tracer(backend);
    Ok(global::tracer())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_parsing() {
        assert_eq!("OTLP".parse::<TracerProvider>().unwrap(), TracerProvider::Otlp);
        assert!(matches!(
            "zipkin".parse::<TracerProvider>(),
            Err(TelemetryError::InvalidProvider(p)) if p == "zipkin"
        ));
    }

    #[test]
    fn unimplemented_providers_fail() {
        for (provider, name) in [(TracerProvider::Jaeger, "jaeger"), (TracerProvider::Datadog, "datadog")] {
            let config = TracerConfig {
                provider,
                ..Default::default()
            };
            match tracer_factory(&config) {
                Err(TelemetryError::NotImplemented(n)) => assert_eq!(n, name),
                other => panic!("expected NotImplemented, got {other:?}"),
            }
        }
    }

    #[test]
    fn exporter_failure_degrades_to_disabled() {
        let config = TracerConfig {
            service_name: "svc".to_string(),
            collector_address: String::new(),
            enabled: true,
            ..Default::default()
        };
        let tracer = tracer_factory(&config).unwrap();
        match &*tracer {
            TracerBackend::Otlp(t) => assert_eq!(t.state(), TracerState::Disabled),
        }
        let ctx = tracer.start_span(&RequestContext::new(), "op");
        assert_eq!(tracer.trace_id(&ctx), "");
    }
}
