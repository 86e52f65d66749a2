//! OTLP span export over gRPC.

use std::fmt;

use opentelemetry::global;
use opentelemetry::trace::{TraceContextExt, Tracer as _, TracerProvider as _};
use opentelemetry::KeyValue;
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider};
use opentelemetry_sdk::Resource;

use super::{Tracer, TracerConfig};
use crate::observability::{RequestContext, TelemetryError};

/// Instrumentation scope name attached to every span.
const INSTRUMENTATION_SCOPE: &str = "random-service";

/// Lifecycle of an [`OtlpTracer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracerState {
    Uninitialized,
    Ready,
    /// Terminal no-op state.
    Disabled,
}

pub struct OtlpTracer {
    config: TracerConfig,
    state: TracerState,
    provider: Option<SdkTracerProvider>,
    tracer: Option<opentelemetry_sdk::trace::Tracer>,
}

impl fmt::Debug for OtlpTracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OtlpTracer")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish()
    }
}

impl OtlpTracer {
    pub fn new(config: TracerConfig) -> Self {
        Self {
            config,
            state: TracerState::Uninitialized,
            provider: None,
            tracer: None,
        }
    }

    /// A tracer that never records anything.
    pub fn disabled() -> Self {
        Self {
            state: TracerState::Disabled,
            ..Self::new(TracerConfig::default())
        }
    }

    /// A ready tracer backed by an already-built SDK provider.
    ///
    /// The provider is not installed globally; only the propagator is.
    pub fn with_provider(config: TracerConfig, provider: SdkTracerProvider) -> Self {
        let mut tracer = Self::new(config);
        if tracer.config.enabled {
            tracer.install(provider);
        } else {
            tracer.state = TracerState::Disabled;
        }
        tracer
    }

    pub fn state(&self) -> TracerState {
        self.state
    }

    pub fn config(&self) -> &TracerConfig {
        &self.config
    }

    /// Connect the exporter and install the process-wide trace provider.
    ///
    /// Returns immediately when tracing is disabled. Calling it again once
    /// ready is a no-op.
    pub fn init(&mut self) -> Result<(), TelemetryError> {
        if !self.config.enabled {
            self.state = TracerState::Disabled;
            return Ok(());
        }
        if self.state != TracerState::Uninitialized {
            return Ok(());
        }

        let resource = build_resource(&self.config.service_name)?;
        let endpoint = collector_endpoint(&self.config)?;

        let exporter = SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint.clone())
            .build()
            .map_err(|e| TelemetryError::ExporterInit(e.to_string()))?;

        let provider = SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .with_resource(resource)
            .with_sampler(Sampler::AlwaysOn)
            .build();

        global::set_tracer_provider(provider.clone());
        self.install(provider);

        tracing::info!(
            service = %self.config.service_name,
            endpoint = %endpoint,
            "Tracer initialized"
        );
        Ok(())
    }

    fn install(&mut self, provider: SdkTracerProvider) {
        global::set_text_map_propagator(TraceContextPropagator::new());
        self.tracer = Some(provider.tracer(INSTRUMENTATION_SCOPE));
        self.provider = Some(provider);
        self.state = TracerState::Ready;
    }

    /// Flush buffered spans and stop the exporter.
    pub fn shutdown(&self) {
        if let Some(provider) = &self.provider {
            if let Err(e) = provider.shutdown() {
                tracing::warn!(error = %e, "Tracer shutdown failed");
            }
        }
    }

    fn ready_tracer(&self) -> Option<&opentelemetry_sdk::trace::Tracer> {
        match self.state {
            TracerState::Ready => self.tracer.as_ref(),
            _ => None,
        }
    }
}

impl Tracer for OtlpTracer {
    fn start_span(&self, ctx: &RequestContext, name: &str) -> RequestContext {
        let Some(tracer) = self.ready_tracer() else {
            return ctx.clone();
        };
        let parent = ctx.otel_context();
        let span = tracer.start_with_context(name.to_string(), parent);
        ctx.with_otel_context(parent.with_span(span))
    }

    fn end_span(&self, ctx: &RequestContext) {
        if self.ready_tracer().is_some() {
            ctx.otel_context().span().end();
        }
    }

    fn trace_id(&self, ctx: &RequestContext) -> String {
        if self.ready_tracer().is_none() {
            return String::new();
        }
        let span = ctx.otel_context().span();
        let span_context = span.span_context();
        if span_context.is_valid() {
            span_context.trace_id().to_string()
        } else {
            String::new()
        }
    }

    fn span_id(&self, ctx: &RequestContext) -> String {
        if self.ready_tracer().is_none() {
            return String::new();
        }
        let span = ctx.otel_context().span();
        let span_context = span.span_context();
        if span_context.is_valid() {
            span_context.span_id().to_string()
        } else {
            String::new()
        }
    }
}

fn build_resource(service_name: &str) -> Result<Resource, TelemetryError> {
    if service_name.trim().is_empty() {
        return Err(TelemetryError::ResourceBuild(
            "service.name must not be empty".to_string(),
        ));
    }
    Ok(Resource::builder_empty()
        .with_attributes([
            KeyValue::new("service.name", service_name.to_string()),
            KeyValue::new("library.language", "rust"),
        ])
        .build())
}

/// Collector URL with a scheme chosen by `insecure` when none is given.
fn collector_endpoint(config: &TracerConfig) -> Result<String, TelemetryError> {
    let address = config.collector_address.trim();
    if address.is_empty() {
        return Err(TelemetryError::ExporterInit(
            "collector address is empty".to_string(),
        ));
    }
    let endpoint = if address.contains("://") {
        address.to_string()
    } else if config.insecure {
        format!("http://{address}")
    } else {
        format!("https://{address}")
    };
    url::Url::parse(&endpoint)
        .map_err(|e| TelemetryError::ExporterInit(format!("{endpoint}: {e}")))?;
    Ok(endpoint)
}
