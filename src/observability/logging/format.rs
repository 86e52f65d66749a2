//! One JSON object per event with the fixed entry keys.
//!
//! Request entries and the crate's own `tracing` diagnostics share this
//! format. Request entries carry their logger name, caller and derived
//! fields as event fields; diagnostics fall back to the event target and
//! callsite.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error;
use std::fmt;

use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::{FormatTime, SystemTime};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

use super::LogLevel;

/// Target of events emitted by [`super::Logger`].
pub(crate) const ENTRY_TARGET: &str = "request_log";

pub(crate) const SEVERITY_FIELD: &str = "severity";
pub(crate) const LOGGER_FIELD: &str = "logger";
pub(crate) const CALLER_FIELD: &str = "caller";
/// Pre-serialized JSON object merged into the entry.
pub(crate) const FIELDS_FIELD: &str = "fields";

pub(crate) struct JsonEntryFormat<T = SystemTime> {
    stacktrace_level: LogLevel,
    timer: T,
}

impl JsonEntryFormat {
    pub(crate) fn new(stacktrace_level: LogLevel) -> Self {
        Self {
            stacktrace_level,
            timer: SystemTime,
        }
    }
}

impl<S, N, T> FormatEvent<S, N> for JsonEntryFormat<T>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
    T: FormatTime,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();
        let mut visitor = EntryVisitor::default();
        event.record(&mut visitor);

        let level = visitor
            .severity
            .as_deref()
            .and_then(LogLevel::from_name)
            .unwrap_or_else(|| from_tracing_level(*meta.level()));

        let mut ts = String::new();
        self.timer.format_time(&mut Writer::new(&mut ts))?;

        let mut entry = visitor.fields;
        entry.insert("ts".to_string(), ts.into());
        entry.insert("level".to_string(), level.as_str().into());

        let logger = visitor.logger.filter(|name| !name.is_empty()).or_else(|| {
            (meta.target() != ENTRY_TARGET).then(|| meta.target().to_string())
        });
        if let Some(logger) = logger {
            entry.insert("logger".to_string(), logger.into());
        }

        let caller = visitor.caller.or_else(|| match (meta.file(), meta.line()) {
            (Some(file), Some(line)) => Some(format!("{file}:{line}")),
            _ => None,
        });
        if let Some(caller) = caller {
            entry.insert("caller".to_string(), caller.into());
        }

        entry.insert("msg".to_string(), visitor.message.unwrap_or_default().into());

        if level >= self.stacktrace_level {
            let backtrace = Backtrace::capture();
            if backtrace.status() == BacktraceStatus::Captured {
                entry.insert("stacktrace".to_string(), backtrace.to_string().into());
            }
        }

        let line = serde_json::to_string(&Value::Object(entry)).map_err(|_| fmt::Error)?;
        writeln!(writer, "{line}")
    }
}

fn from_tracing_level(level: Level) -> LogLevel {
    match level {
        Level::TRACE | Level::DEBUG => LogLevel::Debug,
        Level::INFO => LogLevel::Info,
        Level::WARN => LogLevel::Warn,
        Level::ERROR => LogLevel::Error,
    }
}

#[derive(Default)]
struct EntryVisitor {
    message: Option<String>,
    severity: Option<String>,
    logger: Option<String>,
    caller: Option<String>,
    fields: Map<String, Value>,
}

impl EntryVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        self.fields.insert(field.name().to_string(), value);
    }
}

impl Visit for EntryVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = Some(value.to_string()),
            SEVERITY_FIELD => self.severity = Some(value.to_string()),
            LOGGER_FIELD => self.logger = Some(value.to_string()),
            CALLER_FIELD => self.caller = Some(value.to_string()),
            FIELDS_FIELD => {
                if let Ok(Value::Object(map)) = serde_json::from_str(value) {
                    self.fields.extend(map);
                }
            }
            _ => self.insert(field, value.into()),
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, value.into());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn Error + 'static)) {
        self.insert(field, value.to_string().into());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{value:?}"));
        } else {
            self.insert(field, format!("{value:?}").into());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracing_levels_fold_into_entry_levels() {
        assert_eq!(from_tracing_level(Level::TRACE), LogLevel::Debug);
        assert_eq!(from_tracing_level(Level::WARN), LogLevel::Warn);
        assert_eq!(from_tracing_level(Level::ERROR), LogLevel::Error);
    }
}
