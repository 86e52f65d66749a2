//! Metrics collection and exposition.
//!
//! # Data Flow
//! ```text
//! MetricsConfig { provider, metrics[] }
//!     → metrics_factory (dispatch on provider)
//!     → PrometheusMetrics (register descriptors + build_info)
//!     → installed in the global metrics slot
//!
//! Per request:
//!     interceptor/middleware → is_registered? → counter/gauge/histogram update
//!
//! Scrape:
//!     GET /metrics → exposition.rs → render()
//! ```
//!
//! # Design Decisions
//! - Metric names are fixed at construction; the registry is immutable after
//! - Call sites check `is_registered` first so a missing metric is a silent skip
//! - Updates are atomic operations on handles owned by the recorder

pub mod descriptor;
pub mod exposition;
pub mod prometheus;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use descriptor::{MetricDescriptor, MetricKind};
pub use prometheus::{MetricRegistryBuilder, PrometheusMetrics};

use crate::observability::{global, TelemetryError};

/// Recording capability shared by every metrics backend.
pub trait MetricsSink: Send + Sync {
    /// Pure lookup by descriptor name.
    fn is_registered(&self, name: &str) -> bool;

    fn counter_add(&self, name: &str, value: u64, label_values: &[&str]) -> Result<(), TelemetryError>;

    fn gauge_set(&self, name: &str, value: f64, label_values: &[&str]) -> Result<(), TelemetryError>;

    fn gauge_add(&self, name: &str, value: f64, label_values: &[&str]) -> Result<(), TelemetryError>;

    fn histogram_observe(
        &self,
        name: &str,
        value: f64,
        label_values: &[&str],
    ) -> Result<(), TelemetryError>;

    /// Text exposition of every registered collector.
    fn render(&self) -> String;
}

/// Metrics backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MetricsProvider {
    #[default]
    Prometheus,
    Datadog,
}

impl MetricsProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricsProvider::Prometheus => "prometheus",
            MetricsProvider::Datadog => "datadog",
        }
    }
}

impl fmt::Display for MetricsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricsProvider {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "prometheus" => Ok(MetricsProvider::Prometheus),
            "datadog" => Ok(MetricsProvider::Datadog),
            _ => Err(TelemetryError::InvalidProvider(s.to_string())),
        }
    }
}

impl TryFrom<String> for MetricsProvider {
    type Error = TelemetryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MetricsProvider> for String {
    fn from(provider: MetricsProvider) -> Self {
        provider.as_str().to_string()
    }
}

/// Configuration consumed by [`metrics_factory`].
#[derive(Debug, Clone, Default)]
pub struct MetricsConfig {
    pub provider: MetricsProvider,
    pub metrics: Vec<MetricDescriptor>,
}

/// Every concrete metrics backend. Adding a backend means adding a variant.
#[derive(Debug)]
pub enum MetricsBackend {
    Prometheus(PrometheusMetrics),
}

impl MetricsBackend {
    /// Backend installed when the metrics slot is read before configuration.
    pub fn fallback() -> Self {
        MetricsBackend::Prometheus(PrometheusMetrics::empty())
    }

    /// Periodic maintenance for backends that need it.
    pub fn run_upkeep(&self) {
        match self {
            MetricsBackend::Prometheus(p) => p.run_upkeep(),
        }
    }
}

impl MetricsSink for MetricsBackend {
    fn is_registered(&self, name: &str) -> bool {
        match self {
            MetricsBackend::Prometheus(p) => p.is_registered(name),
        }
    }

    fn counter_add(&self, name: &str, value: u64, label_values: &[&str]) -> Result<(), TelemetryError> {
        match self {
            MetricsBackend::Prometheus(p) => p.counter_add(name, value, label_values),
        }
    }

    fn gauge_set(&self, name: &str, value: f64, label_values: &[&str]) -> Result<(), TelemetryError> {
        match self {
            MetricsBackend::Prometheus(p) => p.gauge_set(name, value, label_values),
        }
    }

    fn gauge_add(&self, name: &str, value: f64, label_values: &[&str]) -> Result<(), TelemetryError> {
        match self {
            MetricsBackend::Prometheus(p) => p.gauge_add(name, value, label_values),
        }
    }

    fn histogram_observe(
        &self,
        name: &str,
        value: f64,
        label_values: &[&str],
    ) -> Result<(), TelemetryError> {
        match self {
            MetricsBackend::Prometheus(p) => p.histogram_observe(name, value, label_values),
        }
    }

    fn render(&self) -> String {
        match self {
            MetricsBackend::Prometheus(p) => p.render(),
        }
    }
}

/// Build the configured backend, install it globally and return the active one.
pub fn metrics_factory(config: &MetricsConfig) -> Result<Arc<MetricsBackend>, TelemetryError> {
    let backend = match config.provider {
        MetricsProvider::Prometheus => MetricsBackend::Prometheus(PrometheusMetrics::new(&config.metrics)?),
        MetricsProvider::Datadog => return Err(TelemetryError::NotImplemented("datadog")),
    };

    global::set_metrics(backend);
    Ok(global::metrics())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_parsing() {
        assert_eq!("PROMETHEUS".parse::<MetricsProvider>().unwrap(), MetricsProvider::Prometheus);
        assert!(matches!(
            "statsd".parse::<MetricsProvider>(),
            Err(TelemetryError::InvalidProvider(p)) if p == "statsd"
        ));
    }

    #[test]
    fn datadog_is_not_implemented() {
        let config = MetricsConfig {
            provider: MetricsProvider::Datadog,
            metrics: descriptor::http_metrics(),
        };
        assert!(matches!(
            metrics_factory(&config),
            Err(TelemetryError::NotImplemented("datadog"))
        ));
    }
}
