//! Pull-based metrics backend on top of `metrics-exporter-prometheus`.
//!
//! Each `PrometheusMetrics` owns a private recorder rather than installing a
//! process-global one, so several registries (and tests) can coexist.

use std::collections::HashMap;

use metrics::{Key, Label, Metadata, Recorder};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

use super::descriptor::{MetricDescriptor, MetricKind};
use super::MetricsSink;
use crate::observability::TelemetryError;

/// Name of the build information gauge registered with every registry.
pub const BUILD_INFO: &str = "build_info";

static METADATA: Metadata<'static> =
    Metadata::new(module_path!(), metrics::Level::INFO, Some(module_path!()));

/// Collects descriptors and builds a [`PrometheusMetrics`].
#[derive(Debug, Default)]
pub struct MetricRegistryBuilder {
    descriptors: Vec<MetricDescriptor>,
}

impl MetricRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a descriptor, rejecting duplicate names, colliding exposed series
    /// and histograms without usable buckets.
    pub fn register(&mut self, descriptor: MetricDescriptor) -> Result<&mut Self, TelemetryError> {
        let full_name = descriptor.full_name();
        let taken = full_name == BUILD_INFO
            || self
                .descriptors
                .iter()
                .any(|d| d.name == descriptor.name || d.full_name() == full_name);
        if taken {
            return Err(TelemetryError::DuplicateMetricName(descriptor.name));
        }
        if descriptor.kind == MetricKind::Histogram {
            if descriptor.buckets.is_empty() {
                return Err(TelemetryError::EmptyHistogramBuckets(descriptor.name));
            }
            if let Some(reason) = descriptor.bucket_problem() {
                return Err(TelemetryError::InvalidBuckets {
                    name: descriptor.name,
                    reason: reason.to_string(),
                });
            }
        }
        self.descriptors.push(descriptor);
        Ok(self)
    }

    pub fn build(self) -> Result<PrometheusMetrics, TelemetryError> {
        let mut builder = PrometheusBuilder::new();
        for descriptor in self.descriptors.iter().filter(|d| d.kind == MetricKind::Histogram) {
            builder = builder
                .set_buckets_for_metric(Matcher::Full(descriptor.full_name()), &descriptor.buckets)
                .map_err(|e| TelemetryError::InvalidBuckets {
                    name: descriptor.name.clone(),
                    reason: e.to_string(),
                })?;
        }
        let recorder = builder.build_recorder();
        let handle = recorder.handle();

        let mut collectors = HashMap::with_capacity(self.descriptors.len());
        for descriptor in self.descriptors {
            let full_name = descriptor.full_name();
            let help = metrics::SharedString::from(descriptor.description.clone());
            match descriptor.kind {
                MetricKind::Counter => recorder.describe_counter(full_name.clone().into(), None, help),
                MetricKind::Gauge => recorder.describe_gauge(full_name.clone().into(), None, help),
                MetricKind::Histogram => {
                    recorder.describe_histogram(full_name.clone().into(), None, help)
                }
            }
            collectors.insert(descriptor.name.clone(), Collector { descriptor, full_name });
        }

        let build_info = Key::from_parts(
            BUILD_INFO,
            vec![
                Label::new("name", env!("CARGO_PKG_NAME")),
                Label::new("version", env!("CARGO_PKG_VERSION")),
            ],
        );
        recorder.describe_gauge(
            BUILD_INFO.into(),
            None,
            "A metric with a constant '1' value labeled by crate name and version.".into(),
        );
        recorder.register_gauge(&build_info, &METADATA).set(1.0);

        Ok(PrometheusMetrics {
            recorder,
            handle,
            collectors,
        })
    }
}

#[derive(Debug)]
struct Collector {
    descriptor: MetricDescriptor,
    full_name: String,
}

/// Registry of live collectors plus the recorder that backs them.
///
/// The set of names is fixed at construction; updates go through atomic
/// handles inside the recorder and are safe from any number of threads.
pub struct PrometheusMetrics {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
    collectors: HashMap<String, Collector>,
}

impl std::fmt::Debug for PrometheusMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusMetrics")
            .field("collectors", &self.collectors.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PrometheusMetrics {
    /// Register every descriptor and build the registry.
    pub fn new(descriptors: &[MetricDescriptor]) -> Result<Self, TelemetryError> {
        let mut builder = MetricRegistryBuilder::new();
        for descriptor in descriptors {
            builder.register(descriptor.clone())?;
        }
        builder.build()
    }

    /// Registry with only the build information collector.
    pub fn empty() -> Self {
        PrometheusMetrics::new(&[]).unwrap_or_else(|_| unreachable!("no descriptors to reject"))
    }

    pub fn handle(&self) -> PrometheusHandle {
        self.handle.clone()
    }

    /// Drain histogram samples into their buckets; run periodically.
    pub fn run_upkeep(&self) {
        self.handle.run_upkeep();
    }

    pub fn descriptor(&self, name: &str) -> Option<&MetricDescriptor> {
        self.collectors.get(name).map(|c| &c.descriptor)
    }

    fn key_for(
        &self,
        name: &str,
        kind: MetricKind,
        label_values: &[&str],
    ) -> Result<Key, TelemetryError> {
        let collector = self
            .collectors
            .get(name)
            .ok_or_else(|| TelemetryError::MetricNotFound(name.to_string()))?;
        let descriptor = &collector.descriptor;

        if descriptor.kind != kind {
            return Err(TelemetryError::WrongMetricKind {
                name: name.to_string(),
                expected: kind,
                actual: descriptor.kind,
            });
        }
        if descriptor.labels.len() != label_values.len() {
            return Err(TelemetryError::LabelArityMismatch {
                name: name.to_string(),
                expected: descriptor.labels.len(),
                actual: label_values.len(),
            });
        }

        let labels: Vec<Label> = descriptor
            .labels
            .iter()
            .zip(label_values)
            .map(|(key, value)| Label::new(key.clone(), value.to_string()))
            .collect();
        Ok(Key::from_parts(collector.full_name.clone(), labels))
    }
}

impl MetricsSink for PrometheusMetrics {
    fn is_registered(&self, name: &str) -> bool {
        self.collectors.contains_key(name)
    }

    fn counter_add(&self, name: &str, value: u64, label_values: &[&str]) -> Result<(), TelemetryError> {
        let key = self.key_for(name, MetricKind::Counter, label_values)?;
        self.recorder.register_counter(&key, &METADATA).increment(value);
        Ok(())
    }

    fn gauge_set(&self, name: &str, value: f64, label_values: &[&str]) -> Result<(), TelemetryError> {
        let key = self.key_for(name, MetricKind::Gauge, label_values)?;
        self.recorder.register_gauge(&key, &METADATA).set(value);
        Ok(())
    }

    fn gauge_add(&self, name: &str, value: f64, label_values: &[&str]) -> Result<(), TelemetryError> {
        let key = self.key_for(name, MetricKind::Gauge, label_values)?;
        let gauge = self.recorder.register_gauge(&key, &METADATA);
        if value >= 0.0 {
            gauge.increment(value);
        } else {
            gauge.decrement(-value);
        }
        Ok(())
    }

    fn histogram_observe(
        &self,
        name: &str,
        value: f64,
        label_values: &[&str],
    ) -> Result<(), TelemetryError> {
        let key = self.key_for(name, MetricKind::Histogram, label_values)?;
        self.recorder.register_histogram(&key, &METADATA).record(value);
        Ok(())
    }

    fn render(&self) -> String {
        self.handle.render()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::metrics::descriptor;

    fn sample(rendered: &str, series: &str, labels: &[&str]) -> Option<f64> {
        rendered
            .lines()
            .filter(|line| !line.starts_with('#'))
            .filter(|line| {
                line.strip_prefix(series)
                    .is_some_and(|rest| rest.starts_with('{') || rest.starts_with(' '))
            })
            .find(|line| labels.iter().all(|l| line.contains(l)))
            .and_then(|line| line.rsplit(' ').next())
            .and_then(|v| v.parse().ok())
    }

    fn jobs() -> Vec<MetricDescriptor> {
        vec![
            MetricDescriptor::counter("jobs_total", "worker", "Jobs processed.", &["queue", "status"]),
            MetricDescriptor::gauge("jobs_running", "worker", "Jobs in flight.", &["queue"]),
            MetricDescriptor::histogram(
                "job_seconds",
                "worker",
                "Job latency.",
                &["queue"],
                &[0.1, 0.5, 1.0, 5.0],
            ),
        ]
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let mut descriptors = jobs();
        descriptors.push(MetricDescriptor::gauge("jobs_total", "other", "", &[]));
        assert!(matches!(
            PrometheusMetrics::new(&descriptors),
            Err(TelemetryError::DuplicateMetricName(name)) if name == "jobs_total"
        ));
    }

    #[test]
    fn colliding_series_name_is_rejected() {
        let descriptors = [
            MetricDescriptor::counter("request_total", "http", "", &[]),
            MetricDescriptor::counter("http_request_total", "", "", &[]),
        ];
        assert!(matches!(
            PrometheusMetrics::new(&descriptors),
            Err(TelemetryError::DuplicateMetricName(name)) if name == "http_request_total"
        ));

        let mut descriptors = jobs();
        descriptors.push(MetricDescriptor::gauge("total", "worker_jobs", "", &[]));
        assert!(matches!(
            PrometheusMetrics::new(&descriptors),
            Err(TelemetryError::DuplicateMetricName(name)) if name == "total"
        ));

        let descriptors = [MetricDescriptor::gauge("info", "build", "", &[])];
        assert!(matches!(
            PrometheusMetrics::new(&descriptors),
            Err(TelemetryError::DuplicateMetricName(_))
        ));
    }

    #[test]
    fn unordered_buckets_are_rejected() {
        let descriptors = [MetricDescriptor::histogram("latency", "", "", &[], &[1.0, 0.5, 2.0])];
        assert!(matches!(
            PrometheusMetrics::new(&descriptors),
            Err(TelemetryError::InvalidBuckets { name, .. }) if name == "latency"
        ));
    }

    #[test]
    fn histogram_without_buckets_is_rejected() {
        let descriptors = [MetricDescriptor::histogram("latency", "", "", &[], &[])];
        assert!(matches!(
            PrometheusMetrics::new(&descriptors),
            Err(TelemetryError::EmptyHistogramBuckets(name)) if name == "latency"
        ));
    }

    #[test]
    fn is_registered_reflects_descriptors() {
        let metrics = PrometheusMetrics::new(&jobs()).unwrap();
        assert!(metrics.is_registered("jobs_total"));
        assert!(!metrics.is_registered("worker_jobs_total"));
        assert!(!metrics.is_registered("missing"));
    }

    #[test]
    fn unknown_metric_leaves_no_trace() {
        let metrics = PrometheusMetrics::new(&jobs()).unwrap();
        let before = metrics.render();
        assert!(matches!(
            metrics.counter_add("missing", 1, &[]),
            Err(TelemetryError::MetricNotFound(_))
        ));
        assert_eq!(metrics.render(), before);
    }

    #[test]
    fn wrong_kind_and_arity_are_rejected() {
        let metrics = PrometheusMetrics::new(&jobs()).unwrap();
        assert!(matches!(
            metrics.histogram_observe("jobs_total", 1.0, &["a", "ok"]),
            Err(TelemetryError::WrongMetricKind { expected: MetricKind::Histogram, actual: MetricKind::Counter, .. })
        ));
        assert!(matches!(
            metrics.counter_add("jobs_total", 1, &["a"]),
            Err(TelemetryError::LabelArityMismatch { expected: 2, actual: 1, .. })
        ));
    }

    #[test]
    fn counter_and_gauge_are_exposed() {
        let metrics = PrometheusMetrics::new(&jobs()).unwrap();
        metrics.counter_add("jobs_total", 2, &["emails", "ok"]).unwrap();
        metrics.counter_add("jobs_total", 1, &["emails", "ok"]).unwrap();
        metrics.gauge_add("jobs_running", 3.0, &["emails"]).unwrap();
        metrics.gauge_add("jobs_running", -1.0, &["emails"]).unwrap();

        let rendered = metrics.render();
        assert_eq!(
            sample(&rendered, "worker_jobs_total", &[r#"queue="emails""#, r#"status="ok""#]),
            Some(3.0)
        );
        assert_eq!(sample(&rendered, "worker_jobs_running", &[r#"queue="emails""#]), Some(2.0));
        assert!(rendered.contains("# HELP worker_jobs_total Jobs processed."));

        metrics.gauge_set("jobs_running", 0.0, &["emails"]).unwrap();
        assert_eq!(
            sample(&metrics.render(), "worker_jobs_running", &[r#"queue="emails""#]),
            Some(0.0)
        );
    }

    #[test]
    fn histogram_observation_lands_in_cumulative_buckets() {
        let metrics = PrometheusMetrics::new(&jobs()).unwrap();
        metrics.histogram_observe("job_seconds", 0.3, &["emails"]).unwrap();

        let rendered = metrics.render();
        let bucket = |le: &str| {
            sample(&rendered, "worker_job_seconds_bucket", &[&format!(r#"le="{le}""#)])
        };
        assert_eq!(bucket("0.1"), Some(0.0));
        assert_eq!(bucket("0.5"), Some(1.0));
        assert_eq!(bucket("1"), Some(1.0));
        assert_eq!(bucket("+Inf"), Some(1.0));
        assert_eq!(sample(&rendered, "worker_job_seconds_count", &[]), Some(1.0));
    }

    #[test]
    fn build_info_is_always_present() {
        let rendered = PrometheusMetrics::empty().render();
        assert_eq!(sample(&rendered, BUILD_INFO, &[r#"name="random-service""#]), Some(1.0));
    }

    #[test]
    fn build_info_name_is_reserved() {
        let descriptors = [MetricDescriptor::gauge(BUILD_INFO, "", "", &[])];
        assert!(matches!(
            PrometheusMetrics::new(&descriptors),
            Err(TelemetryError::DuplicateMetricName(_))
        ));
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let metrics = std::sync::Arc::new(PrometheusMetrics::new(&descriptor::http_metrics()).unwrap());
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let metrics = metrics.clone();
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        metrics
                            .counter_add(descriptor::HTTP_REQUEST_TOTAL, 1, &["/x", "200"])
                            .unwrap();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(
            sample(&metrics.render(), "http_request_total", &[r#"path="/x""#]),
            Some(2000.0)
        );
    }
}
