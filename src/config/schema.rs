//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::observability::logging::LoggerConfig;
use crate::observability::metrics::{descriptor, MetricDescriptor, MetricsConfig, MetricsProvider};
use crate::observability::tracer::{TracerConfig, TracerProvider};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Gateway listener and timeouts.
    pub server: ServerConfig,

    /// Request logger settings.
    pub logs: LoggerConfig,

    /// Metrics registry and exposition settings.
    pub metrics: MetricsSettings,

    /// Span export settings.
    pub tracing: TracingSettings,
}

/// Gateway server configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    /// Service name, also the default tracing service name.
    pub name: String,

    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Whole-request timeout applied by the HTTP stack.
    pub request_timeout_secs: u64,

    /// Deadline for each call into the random service.
    pub rpc_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "random-service".to_string(),
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
            rpc_timeout_ms: 1000,
        }
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct MetricsSettings {
    pub provider: MetricsProvider,

    /// Serve the exposition endpoint.
    pub enabled: bool,

    /// Exposition endpoint bind address.
    pub bind_address: String,

    /// Metric definitions. Empty means the default HTTP and RPC sets.
    pub descriptors: Vec<MetricDescriptor>,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            provider: MetricsProvider::Prometheus,
            enabled: true,
            bind_address: "0.0.0.0:9090".to_string(),
            descriptors: Vec::new(),
        }
    }
}

impl MetricsSettings {
    pub fn effective_descriptors(&self) -> Vec<MetricDescriptor> {
        if self.descriptors.is_empty() {
            descriptor::default_metrics()
        } else {
            self.descriptors.clone()
        }
    }

    pub fn to_metrics_config(&self) -> MetricsConfig {
        MetricsConfig {
            provider: self.provider,
            metrics: self.effective_descriptors(),
        }
    }
}

/// Tracing configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct TracingSettings {
    pub provider: TracerProvider,

    pub enabled: bool,

    /// Resource `service.name`. Falls back to `server.name` when empty.
    pub service_name: String,

    /// Collector address, `host:port` or a full URL.
    pub collector_url: String,

    /// Plaintext gRPC to the collector.
    pub insecure: bool,
}

impl Default for TracingSettings {
    fn default() -> Self {
        Self {
            provider: TracerProvider::Otlp,
            enabled: false,
            service_name: String::new(),
            collector_url: "localhost:4317".to_string(),
            insecure: true,
        }
    }
}

impl TracingSettings {
    pub fn to_tracer_config(&self, default_service_name: &str) -> TracerConfig {
        let service_name = if self.service_name.is_empty() {
            default_service_name.to_string()
        } else {
            self.service_name.clone()
        };
        TracerConfig {
            provider: self.provider,
            service_name,
            collector_address: self.collector_url.clone(),
            insecure: self.insecure,
            enabled: self.enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(
            config.metrics.to_metrics_config().metrics.len(),
            descriptor::default_metrics().len()
        );
    }

    #[test]
    fn tracing_service_name_falls_back_to_server_name() {
        let settings = TracingSettings::default();
        assert_eq!(settings.to_tracer_config("gateway").service_name, "gateway");

        let named = TracingSettings {
            service_name: "custom".to_string(),
            ..Default::default()
        };
        assert_eq!(named.to_tracer_config("gateway").service_name, "custom");
    }

    #[test]
    fn provider_names_are_case_insensitive() {
        let config: AppConfig = toml::from_str(
            r#"
            [metrics]
            provider = "Prometheus"
            [tracing]
            provider = "OTLP"
            "#,
        )
        .unwrap();
        assert_eq!(config.metrics.provider, MetricsProvider::Prometheus);
        assert_eq!(config.tracing.provider, TracerProvider::Otlp);

        let err = toml::from_str::<AppConfig>("[tracing]\nprovider = \"zipkin\"").unwrap_err();
        assert!(err.to_string().contains("invalid provider"));
    }
}
