//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider};
use random_service::observability::logging::CapturedLogs;
use random_service::observability::metrics::{descriptor, PrometheusMetrics};
use random_service::observability::tracer::{OtlpTracer, TracerConfig};
use random_service::observability::{Logger, LoggerConfig, MetricsBackend, Telemetry, TracerBackend};
use tokio::net::TcpListener;

/// Telemetry with the default descriptors, a disabled tracer and captured logs.
pub fn telemetry() -> (Telemetry, CapturedLogs) {
    telemetry_with_tracer(TracerBackend::fallback())
}

/// Same as [`telemetry`] but spans are exported to memory.
pub fn traced_telemetry() -> (Telemetry, CapturedLogs, InMemorySpanExporter) {
    let exporter = InMemorySpanExporter::default();
    let provider = SdkTracerProvider::builder()
        .with_simple_exporter(exporter.clone())
        .build();
    let config = TracerConfig {
        service_name: "random-service-test".into(),
        enabled: true,
        ..Default::default()
    };
    let tracer = TracerBackend::Otlp(OtlpTracer::with_provider(config, provider));
    let (telemetry, logs) = telemetry_with_tracer(tracer);
    (telemetry, logs, exporter)
}

fn telemetry_with_tracer(tracer: TracerBackend) -> (Telemetry, CapturedLogs) {
    let metrics = PrometheusMetrics::new(&descriptor::default_metrics()).unwrap();
    let (logger, logs) = Logger::capture(&LoggerConfig::default());
    let telemetry = Telemetry::new(
        Arc::new(tracer),
        Arc::new(MetricsBackend::Prometheus(metrics)),
        Arc::new(logger),
    );
    (telemetry, logs)
}

/// Value of one series in a text exposition, matched on exact labels in order.
pub fn sample(rendered: &str, series: &str, labels: &[(&str, &str)]) -> Option<f64> {
    let prefix = if labels.is_empty() {
        format!("{series} ")
    } else {
        let pairs: Vec<String> = labels.iter().map(|(k, v)| format!("{k}=\"{v}\"")).collect();
        format!("{series}{{{}}} ", pairs.join(","))
    };
    rendered
        .lines()
        .find(|line| line.starts_with(&prefix))
        .and_then(|line| line.rsplit(' ').next())
        .and_then(|value| value.parse().ok())
}

/// Bind an ephemeral local port.
pub async fn local_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}
