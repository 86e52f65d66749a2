//! Process-wide slots for the active tracer, metrics and logger.
//!
//! Request paths should receive a [`Telemetry`](super::Telemetry) handle by
//! injection. These slots exist for the composition root and for code that has
//! no handle: each one lazily installs a default instance on first read.
//!
//! # Design Decisions
//! - Reads are a single atomic load once a value is installed
//! - The default is built at most once, through a `OnceLock`
//! - Installation of the default is a compare-and-swap, so a concurrent
//!   `set` always wins over it

use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwapOption;

use super::logging::{Logger, LoggerConfig};
use super::metrics::MetricsBackend;
use super::tracer::TracerBackend;

/// Holder of one active instance of `T`.
pub struct GlobalSlot<T> {
    label: &'static str,
    active: ArcSwapOption<T>,
    fallback: OnceLock<Arc<T>>,
    make_default: fn() -> T,
}

impl<T> GlobalSlot<T> {
    pub const fn new(label: &'static str, make_default: fn() -> T) -> Self {
        Self {
            label,
            active: ArcSwapOption::const_empty(),
            fallback: OnceLock::new(),
            make_default,
        }
    }

    /// The active instance, installing the default when the slot is empty.
    pub fn get(&self) -> Arc<T> {
        if let Some(active) = self.active.load_full() {
            return active;
        }

        let fallback = self
            .fallback
            .get_or_init(|| Arc::new((self.make_default)()))
            .clone();
        let previous = self
            .active
            .compare_and_swap(&None::<Arc<T>>, Some(fallback.clone()));
        match &*previous {
            Some(winner) => winner.clone(),
            None => {
                tracing::info!(slot = self.label, "No {} configured, using default", self.label);
                fallback
            }
        }
    }

    /// Replace the active instance unconditionally.
    pub fn set(&self, value: T) {
        self.set_arc(Arc::new(value));
    }

    pub fn set_arc(&self, value: Arc<T>) {
        self.active.store(Some(value));
    }

    /// Empty the slot. The next `get` reinstalls the default.
    pub fn reset(&self) {
        self.active.store(None);
    }

    pub fn is_set(&self) -> bool {
        self.active.load().is_some()
    }
}

static TRACER: GlobalSlot<TracerBackend> = GlobalSlot::new("tracer", TracerBackend::fallback);
static METRICS: GlobalSlot<MetricsBackend> = GlobalSlot::new("metrics", MetricsBackend::fallback);
static LOGGER: GlobalSlot<Logger> = GlobalSlot::new("logger", default_logger);

fn default_logger() -> Logger {
    Logger::new(&LoggerConfig::default())
}

pub fn tracer() -> Arc<TracerBackend> {
    TRACER.get()
}

pub fn set_tracer(tracer: TracerBackend) {
    TRACER.set(tracer);
}

pub fn reset_tracer() {
    TRACER.reset();
}

pub fn metrics() -> Arc<MetricsBackend> {
    METRICS.get()
}

pub fn set_metrics(metrics: MetricsBackend) {
    METRICS.set(metrics);
}

pub fn reset_metrics() {
    METRICS.reset();
}

pub fn logger() -> Arc<Logger> {
    LOGGER.get()
}

pub fn set_logger(logger: Logger) {
    LOGGER.set(logger);
}

pub fn reset_logger() {
    LOGGER.reset();
}
