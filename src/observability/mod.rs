//! Observability subsystem: tracing, metrics and structured logging.
//!
//! # Data Flow
//! ```text
//! Startup (composition root):
//!     tracer_factory  → TracerBackend  ─┐
//!     metrics_factory → MetricsBackend ─┼→ global slots → Telemetry handle
//!     logger_factory  → Logger         ─┘
//!
//! Per request (HTTP middleware / RPC interceptor):
//!     Telemetry
//!         → start span, in-flight +1
//!         → handler
//!         → status classification
//!         → counters/histograms, one log entry, end span, in-flight -1
//!
//! Background:
//!     exposition server → GET /metrics, GET /healthz
//! ```
//!
//! # Design Decisions
//! - Backends are closed enums behind one capability trait per concern
//! - Telemetry failures are logged and never alter a business response
//! - Global slots are a fallback; request paths get an injected `Telemetry`

pub mod context;
pub mod error;
pub mod global;
pub mod logging;
pub mod metrics;
pub mod telemetry;
pub mod tracer;

pub use self::context::RequestContext;
pub use self::error::TelemetryError;
pub use self::logging::{logger_factory, Logger, LoggerConfig};
pub use self::metrics::{metrics_factory, MetricsBackend, MetricsConfig, MetricsSink};
pub use self::telemetry::{InFlightGuard, Telemetry};
pub use self::tracer::{tracer_factory, Tracer, TracerBackend, TracerConfig};
