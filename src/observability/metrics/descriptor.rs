//! Metric descriptors and the default HTTP/RPC descriptor sets.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::observability::TelemetryError;

/// Label carrying the HTTP route or RPC status.
pub const PATH: &str = "path";
pub const STATUS: &str = "status";
pub const GRPC_TYPE: &str = "grpc_type";
pub const GRPC_SERVICE: &str = "grpc_service";
pub const GRPC_METHOD: &str = "grpc_method";

pub const HTTP_SUBSYSTEM: &str = "http";
pub const GRPC_SUBSYSTEM: &str = "grpc";

pub const HTTP_REQUEST_DURATION_SECONDS: &str = "request_duration_seconds";
pub const HTTP_REQUEST_TOTAL: &str = "request_total";
pub const HTTP_REQUEST_INFLIGHT: &str = "request_inflight";
pub const HTTP_REQUEST_SIZE_BYTES: &str = "request_size_bytes";
pub const HTTP_RESPONSE_SIZE_BYTES: &str = "response_size_bytes";

pub const GRPC_SERVER_STARTED_TOTAL: &str = "server_started_total";
pub const GRPC_SERVER_HANDLED_TOTAL: &str = "server_handled_total";
pub const GRPC_SERVER_HANDLING_SECONDS: &str = "server_handling_seconds";
pub const GRPC_SERVER_INFLIGHT: &str = "server_inflight";
pub const GRPC_SERVER_MSG_RECEIVED_TOTAL: &str = "server_msg_received_total";
pub const GRPC_SERVER_MSG_SENT_TOTAL: &str = "server_msg_sent_total";

const KIB: f64 = 1024.0;
const MIB: f64 = 1024.0 * 1024.0;

/// Latency buckets in seconds.
pub const LATENCY_BUCKETS: [f64; 11] = [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Payload size buckets, 1KiB through 10MiB.
pub const SIZE_BUCKETS: [f64; 10] = [
    KIB,
    2.0 * KIB,
    5.0 * KIB,
    10.0 * KIB,
    100.0 * KIB,
    500.0 * KIB,
    MIB,
    2.5 * MIB,
    5.0 * MIB,
    10.0 * MIB,
];

/// Collector kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "counter" => Ok(MetricKind::Counter),
            "gauge" => Ok(MetricKind::Gauge),
            "histogram" => Ok(MetricKind::Histogram),
            _ => Err(TelemetryError::UnsupportedMetricKind(s.to_string())),
        }
    }
}

impl TryFrom<String> for MetricKind {
    type Error = TelemetryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MetricKind> for String {
    fn from(kind: MetricKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Named metric definition.
///
/// `buckets` is required and non-empty for histograms and ignored otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDescriptor {
    pub name: String,
    pub kind: MetricKind,
    #[serde(default)]
    pub subsystem: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub buckets: Vec<f64>,
}

impl MetricDescriptor {
    pub fn counter(name: &str, subsystem: &str, description: &str, labels: &[&str]) -> Self {
        Self::new(name, MetricKind::Counter, subsystem, description, labels, &[])
    }

    pub fn gauge(name: &str, subsystem: &str, description: &str, labels: &[&str]) -> Self {
        Self::new(name, MetricKind::Gauge, subsystem, description, labels, &[])
    }

    pub fn histogram(
        name: &str,
        subsystem: &str,
        description: &str,
        labels: &[&str],
        buckets: &[f64],
    ) -> Self {
        Self::new(name, MetricKind::Histogram, subsystem, description, labels, buckets)
    }

    fn new(
        name: &str,
        kind: MetricKind,
        subsystem: &str,
        description: &str,
        labels: &[&str],
        buckets: &[f64],
    ) -> Self {
        Self {
            name: name.to_string(),
            kind,
            subsystem: subsystem.to_string(),
            description: description.to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            buckets: buckets.to_vec(),
        }
    }

    /// Exposed series name: `<subsystem>_<name>`, or `name` without a subsystem.
    pub fn full_name(&self) -> String {
        if self.subsystem.is_empty() {
            self.name.clone()
        } else {
            format!("{}_{}", self.subsystem, self.name)
        }
    }

    /// Why `buckets` cannot serve as histogram boundaries, if they cannot.
    pub fn bucket_problem(&self) -> Option<&'static str> {
        if self.buckets.iter().any(|b| !b.is_finite()) {
            return Some("boundaries must be finite");
        }
        if self.buckets.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Some("boundaries must be strictly ascending");
        }
        None
    }
}

/// Default HTTP server descriptors.
pub fn http_metrics() -> Vec<MetricDescriptor> {
    vec![
        MetricDescriptor::histogram(
            HTTP_REQUEST_DURATION_SECONDS,
            HTTP_SUBSYSTEM,
            "Histogram metric that measures the duration of the request in seconds.",
            &[PATH, STATUS],
            &LATENCY_BUCKETS,
        ),
        MetricDescriptor::counter(
            HTTP_REQUEST_TOTAL,
            HTTP_SUBSYSTEM,
            "Counter metric that measures the total number of requests.",
            &[PATH, STATUS],
        ),
        MetricDescriptor::gauge(
            HTTP_REQUEST_INFLIGHT,
            HTTP_SUBSYSTEM,
            "Gauge metric that measures the number of requests currently in progress.",
            &[PATH],
        ),
        MetricDescriptor::histogram(
            HTTP_REQUEST_SIZE_BYTES,
            HTTP_SUBSYSTEM,
            "Histogram metric that measures the size of the request in bytes.",
            &[PATH],
            &SIZE_BUCKETS,
        ),
        MetricDescriptor::histogram(
            HTTP_RESPONSE_SIZE_BYTES,
            HTTP_SUBSYSTEM,
            "Histogram metric that measures the size of the response in bytes.",
            &[PATH],
            &SIZE_BUCKETS,
        ),
    ]
}

/// Default unary RPC server descriptors.
pub fn grpc_metrics() -> Vec<MetricDescriptor> {
    vec![
        MetricDescriptor::counter(
            GRPC_SERVER_STARTED_TOTAL,
            GRPC_SUBSYSTEM,
            "Total number of RPCs started on the server.",
            &[GRPC_TYPE, GRPC_SERVICE, GRPC_METHOD],
        ),
        MetricDescriptor::counter(
            GRPC_SERVER_HANDLED_TOTAL,
            GRPC_SUBSYSTEM,
            "Total number of RPCs completed on the server, regardless of success or failure.",
            &[GRPC_TYPE, GRPC_SERVICE, GRPC_METHOD, STATUS],
        ),
        MetricDescriptor::histogram(
            GRPC_SERVER_HANDLING_SECONDS,
            GRPC_SUBSYSTEM,
            "Histogram of response latency of RPCs handled by the server, in seconds.",
            &[GRPC_TYPE, GRPC_SERVICE, GRPC_METHOD, STATUS],
            &LATENCY_BUCKETS,
        ),
        MetricDescriptor::gauge(
            GRPC_SERVER_INFLIGHT,
            GRPC_SUBSYSTEM,
            "Number of RPCs currently being handled by the server.",
            &[GRPC_SERVICE, GRPC_METHOD],
        ),
        MetricDescriptor::counter(
            GRPC_SERVER_MSG_RECEIVED_TOTAL,
            GRPC_SUBSYSTEM,
            "Total number of RPC messages received on the server.",
            &[GRPC_TYPE, GRPC_SERVICE, GRPC_METHOD],
        ),
        MetricDescriptor::counter(
            GRPC_SERVER_MSG_SENT_TOTAL,
            GRPC_SUBSYSTEM,
            "Total number of RPC messages sent by the server.",
            &[GRPC_TYPE, GRPC_SERVICE, GRPC_METHOD],
        ),
    ]
}

/// HTTP and RPC descriptors together.
pub fn default_metrics() -> Vec<MetricDescriptor> {
    let mut all = http_metrics();
    all.extend(grpc_metrics());
    all
}
