//! Injected telemetry handle.
//!
//! Bundles the active tracer, metrics backend and logger so instrumentation
//! layers receive them explicitly instead of reading global state per request.

use std::fmt;
use std::sync::Arc;

use super::global;
use super::logging::Logger;
use super::metrics::{MetricsBackend, MetricsSink};
use super::tracer::TracerBackend;
use super::TelemetryError;

#[derive(Clone)]
pub struct Telemetry {
    tracer: Arc<TracerBackend>,
    metrics: Arc<MetricsBackend>,
    logger: Arc<Logger>,
}

impl fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telemetry")
            .field("tracer", &self.tracer)
            .field("metrics", &self.metrics)
            .field("logger", &self.logger)
            .finish()
    }
}

impl Telemetry {
    pub fn new(tracer: Arc<TracerBackend>, metrics: Arc<MetricsBackend>, logger: Arc<Logger>) -> Self {
        Self {
            tracer,
            metrics,
            logger,
        }
    }

    /// Snapshot of whatever the global slots hold right now.
    pub fn from_global() -> Self {
        Self::new(global::tracer(), global::metrics(), global::logger())
    }

    pub fn tracer(&self) -> &Arc<TracerBackend> {
        &self.tracer
    }

    pub fn metrics(&self) -> &Arc<MetricsBackend> {
        &self.metrics
    }

    pub fn logger(&self) -> &Arc<Logger> {
        &self.logger
    }

    /// Add to a counter if it is registered.
    pub fn count(&self, name: &str, value: u64, label_values: &[&str]) {
        if self.metrics.is_registered(name) {
            self.report(name, self.metrics.counter_add(name, value, label_values));
        }
    }

    /// Observe a histogram sample if it is registered.
    pub fn observe(&self, name: &str, value: f64, label_values: &[&str]) {
        if self.metrics.is_registered(name) {
            self.report(name, self.metrics.histogram_observe(name, value, label_values));
        }
    }

    /// Increment an in-flight gauge, returning a guard that decrements the
    /// same series on drop. `None` when the gauge is not registered.
    pub fn in_flight(&self, name: &str, label_values: &[&str]) -> Option<InFlightGuard> {
        if !self.metrics.is_registered(name) {
            return None;
        }
        match self.metrics.gauge_add(name, 1.0, label_values) {
            Ok(()) => Some(InFlightGuard {
                metrics: self.metrics.clone(),
                logger: self.logger.clone(),
                name: name.to_string(),
                label_values: label_values.iter().map(|v| v.to_string()).collect(),
            }),
            Err(e) => {
                self.report(name, Err(e));
                None
            }
        }
    }

    fn report(&self, name: &str, result: Result<(), TelemetryError>) {
        if let Err(e) = result {
            self.logger
                .warn(format_args!("failed to record metric {name}: {e}"));
        }
    }
}

/// Holds one unit of an in-flight gauge.
#[must_use = "dropping the guard immediately decrements the gauge"]
pub struct InFlightGuard {
    metrics: Arc<MetricsBackend>,
    logger: Arc<Logger>,
    name: String,
    label_values: Vec<String>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let labels: Vec<&str> = self.label_values.iter().map(String::as_str).collect();
        if let Err(e) = self.metrics.gauge_add(&self.name, -1.0, &labels) {
            self.logger
                .warn(format_args!("failed to release in-flight gauge {}: {e}", self.name));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::logging::CapturedLogs;
    use crate::observability::metrics::{MetricDescriptor, PrometheusMetrics};

    fn telemetry() -> (Telemetry, CapturedLogs) {
        let metrics = PrometheusMetrics::new(&[
            MetricDescriptor::counter("jobs_total", "", "", &["queue"]),
            MetricDescriptor::gauge("jobs_inflight", "", "", &["queue"]),
        ])
        .unwrap();
        let (logger, logs) = Logger::capture(&Default::default());
        (
            Telemetry::new(
                Arc::new(TracerBackend::fallback()),
                Arc::new(MetricsBackend::Prometheus(metrics)),
                Arc::new(logger),
            ),
            logs,
        )
    }

    fn gauge_value(telemetry: &Telemetry) -> Option<f64> {
        telemetry
            .metrics()
            .render()
            .lines()
            .find(|l| l.starts_with("jobs_inflight{queue=\"a\"}"))
            .and_then(|l| l.rsplit(' ').next())
            .and_then(|v| v.parse().ok())
    }

    #[test]
    fn unregistered_metric_is_skipped_silently() {
        let (telemetry, logs) = telemetry();
        telemetry.count("missing_total", 1, &["a"]);
        telemetry.observe("missing_seconds", 0.1, &[]);
        assert!(telemetry.in_flight("missing_inflight", &[]).is_none());
        assert!(logs.is_empty());
    }

    #[test]
    fn recording_errors_are_logged_not_raised() {
        let (telemetry, logs) = telemetry();
        telemetry.count("jobs_total", 1, &[]);
        telemetry.observe("jobs_total", 1.0, &["a"]);

        let entries = logs.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e["level"] == "warn"));
    }

    #[test]
    fn in_flight_guard_restores_gauge() {
        let (telemetry, _logs) = telemetry();
        {
            let _outer = telemetry.in_flight("jobs_inflight", &["a"]).unwrap();
            let _inner = telemetry.in_flight("jobs_inflight", &["a"]).unwrap();
            assert_eq!(gauge_value(&telemetry), Some(2.0));
        }
        assert_eq!(gauge_value(&telemetry), Some(0.0));
    }

    #[test]
    fn in_flight_guard_released_on_panic() {
        let (telemetry, _logs) = telemetry();
        let cloned = telemetry.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = cloned.in_flight("jobs_inflight", &["a"]);
            panic!("handler failed");
        }));
        assert!(result.is_err());
        assert_eq!(gauge_value(&telemetry), Some(0.0));
    }
}
