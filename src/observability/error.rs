//! Errors produced by the observability subsystem.
//!
//! Configuration errors surface at factory time. Instrumentation errors are
//! returned to the call site, which logs them and carries on; they never reach
//! a business response.

use thiserror::Error;

use crate::observability::metrics::MetricKind;

/// Error type for telemetry construction and instrumentation.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("duplicate metric name: \"{0}\"")]
    DuplicateMetricName(String),

    #[error("empty histogram buckets for metric \"{0}\"")]
    EmptyHistogramBuckets(String),

    #[error("unsupported metric kind: \"{0}\"")]
    UnsupportedMetricKind(String),

    #[error("invalid histogram buckets for metric \"{name}\": {reason}")]
    InvalidBuckets { name: String, reason: String },

    #[error("metric does not exist: \"{0}\"")]
    MetricNotFound(String),

    #[error("metric \"{name}\" is a {actual}, not a {expected}")]
    WrongMetricKind {
        name: String,
        expected: MetricKind,
        actual: MetricKind,
    },

    #[error("metric \"{name}\" expects {expected} label values, got {actual}")]
    LabelArityMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("failed to initialize span exporter: {0}")]
    ExporterInit(String),

    #[error("failed to build trace resource: {0}")]
    ResourceBuild(String),

    #[error("{0} provider not implemented yet")]
    NotImplemented(&'static str),

    #[error("invalid provider: \"{0}\"")]
    InvalidProvider(String),

    #[error("metrics exposition server failed: {0}")]
    Exposition(#[from] std::io::Error),
}
