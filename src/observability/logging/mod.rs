//! Structured request logging.
//!
//! # Data Flow
//! ```text
//! LoggerConfig { level, development, path, additional_fields }
//!     → logger_factory → Logger (stderr + optional rolling file)
//!     → installed in the global logger slot
//!
//! Per request:
//!     logger.with(&ctx)
//!         + request_id  (inbound metadata)
//!         + trace_id / span_id (active tracer)
//!         + additional fields (metadata lookups)
//!     → .info(..) / .error(..) → one JSON line per entry
//! ```
//!
//! # Design Decisions
//! - Loggers are immutable; every `with*` returns a new value
//! - Fixed keys: `ts`, `level`, `logger`, `caller`, `msg`, `stacktrace`
//! - Entries are `tracing` events rendered by a JSON `FormatEvent`
//! - Writes happen on background threads, never blocking the request
//! - The crate's own `tracing` diagnostics go through the same subscriber

mod format;
pub mod sink;

use std::fmt;
use std::panic::Location;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::dispatcher::SetGlobalDefaultError;
use tracing::{Dispatch, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::{Directive, LevelFilter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer};

use self::format::{JsonEntryFormat, ENTRY_TARGET};
use self::sink::LogSink;
use crate::observability::tracer::{Tracer, TracerBackend};
use crate::observability::{global, RequestContext, TelemetryError};

/// Severity, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    DPanic,
    Panic,
    Fatal,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::DPanic => "dpanic",
            LogLevel::Panic => "panic",
            LogLevel::Fatal => "fatal",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            "dpanic" => Some(LogLevel::DPanic),
            "panic" => Some(LogLevel::Panic),
            "fatal" => Some(LogLevel::Fatal),
            _ => None,
        }
    }

    /// Unrecognized names fall back to `debug`.
    pub fn parse_lenient(name: &str) -> Self {
        Self::from_name(name).unwrap_or(LogLevel::Debug)
    }

    /// Closest `tracing` filter. The panic levels all map to `ERROR`.
    pub fn level_filter(&self) -> LevelFilter {
        match self {
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            _ => LevelFilter::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logger backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LoggerProvider {
    #[default]
    Json,
}

impl LoggerProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoggerProvider::Json => "json",
        }
    }
}

impl FromStr for LoggerProvider {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LoggerProvider::Json),
            _ => Err(TelemetryError::InvalidProvider(s.to_string())),
        }
    }
}

impl TryFrom<String> for LoggerProvider {
    type Error = TelemetryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LoggerProvider> for String {
    fn from(provider: LoggerProvider) -> Self {
        provider.as_str().to_string()
    }
}

/// A log field whose value is read from request metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalField {
    /// Key written into the log entry.
    pub field_name: String,
    /// Metadata key the value is read from.
    pub value_from: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub provider: LoggerProvider,

    /// Attach stack traces from `warn` instead of `error`.
    pub development: bool,

    /// Minimum level. Unrecognized values mean `debug`.
    pub level: String,

    /// Directory for the rolling `app.log` file. Standard error only when unset.
    pub path: Option<PathBuf>,

    pub additional_fields: Vec<AdditionalField>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            provider: LoggerProvider::Json,
            development: false,
            level: "info".to_string(),
            path: None,
            additional_fields: Vec::new(),
        }
    }
}

struct LoggerCore {
    dispatch: Dispatch,
    level: LogLevel,
    additional_fields: Vec<AdditionalField>,
    _guards: Vec<WorkerGuard>,
}

/// Structured JSON logger.
///
/// Cheap to clone. Derived loggers share the subscriber and writers of
/// their parent.
#[derive(Clone)]
pub struct Logger {
    core: Arc<LoggerCore>,
    name: Arc<str>,
    fields: Arc<Map<String, Value>>,
    tracer: Option<Arc<TracerBackend>>,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name)
            .field("level", &self.core.level)
            .field("fields", &self.fields)
            .finish()
    }
}

/// Handle to the entries written by a [`Logger::capture`] logger.
#[derive(Clone)]
pub struct CapturedLogs {
    lines: Arc<Mutex<Vec<String>>>,
}

impl CapturedLogs {
    /// Every entry written so far, parsed.
    pub fn entries(&self) -> Vec<Value> {
        self.lines
            .lock()
            .map(|lines| {
                lines
                    .iter()
                    .filter_map(|line| serde_json::from_str(line).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Logger {
    /// Build a logger writing to standard error and, if configured, a rolling file.
    ///
    /// `RUST_LOG` narrows the crate's own diagnostics; request entries follow
    /// the configured level only.
    ///
    /// # Panics
    /// If the configured log directory cannot be created.
    pub fn new(config: &LoggerConfig) -> Self {
        let level = LogLevel::parse_lenient(&config.level);
        let filter = EnvFilter::builder()
            .with_default_directive(level.level_filter().into())
            .from_env_lossy();
        Self::build(config, level, filter, LogSink::stderr_and_file(config.path.as_deref()))
    }

    /// Build a logger that keeps its output in memory.
    pub fn capture(config: &LoggerConfig) -> (Self, CapturedLogs) {
        let level = LogLevel::parse_lenient(&config.level);
        let filter = EnvFilter::builder()
            .with_default_directive(level.level_filter().into())
            .parse_lossy("");
        let (sink, lines) = LogSink::memory();
        (Self::build(config, level, filter, sink), CapturedLogs { lines })
    }

    fn build(config: &LoggerConfig, level: LogLevel, filter: EnvFilter, sink: LogSink) -> Self {
        let stacktrace_level = if config.development {
            LogLevel::Warn
        } else {
            LogLevel::Error
        };
        let filter = match format!("{ENTRY_TARGET}=trace").parse::<Directive>() {
            Ok(directive) => filter.add_directive(directive),
            Err(_) => filter,
        };
        let layer = tracing_subscriber::fmt::layer()
            .event_format(JsonEntryFormat::new(stacktrace_level))
            .with_writer(sink.writer)
            .with_filter(filter);
        let dispatch = Dispatch::new(tracing_subscriber::registry().with(layer));

        Self {
            core: Arc::new(LoggerCore {
                dispatch,
                level,
                additional_fields: config.additional_fields.clone(),
                _guards: sink.guards,
            }),
            name: Arc::from(""),
            fields: Arc::new(Map::new()),
            tracer: None,
        }
    }

    pub fn level(&self) -> LogLevel {
        self.core.level
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        level >= self.core.level
    }

    /// Subscriber behind this logger, for routing `tracing` diagnostics
    /// into the same writers.
    pub fn dispatch(&self) -> &Dispatch {
        &self.core.dispatch
    }

    /// Make this logger's subscriber the process-wide `tracing` default.
    pub fn install_global_default(&self) -> Result<(), SetGlobalDefaultError> {
        tracing::dispatcher::set_global_default(self.core.dispatch.clone())
    }

    /// Derived logger with the `logger` key set.
    pub fn named(&self, name: &str) -> Self {
        Self {
            name: Arc::from(name),
            ..self.clone()
        }
    }

    /// Derived logger that reads trace ids from `tracer` instead of the global one.
    pub fn with_tracer(&self, tracer: Arc<TracerBackend>) -> Self {
        Self {
            tracer: Some(tracer),
            ..self.clone()
        }
    }

    /// Derived logger carrying extra fields on every entry.
    pub fn with_fields<I, K, V>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut merged = (*self.fields).clone();
        for (key, value) in fields {
            merged.insert(key.into(), value.into());
        }
        Self {
            fields: Arc::new(merged),
            ..self.clone()
        }
    }

    /// Derived logger enriched from `ctx`: request id, trace and span ids,
    /// and the configured additional fields. Empty values are skipped.
    ///
    /// Returns a plain clone when nothing was found.
    pub fn with(&self, ctx: &RequestContext) -> Self {
        let mut found: Vec<(String, Value)> = Vec::new();

        if let Some(request_id) = ctx.request_id() {
            found.push(("request_id".to_string(), request_id.into()));
        }

        let tracer = self.tracer.clone().unwrap_or_else(global::tracer);
        let trace_id = tracer.trace_id(ctx);
        if !trace_id.is_empty() {
            found.push(("trace_id".to_string(), trace_id.into()));
        }
        let span_id = tracer.span_id(ctx);
        if !span_id.is_empty() {
            found.push(("span_id".to_string(), span_id.into()));
        }

        for field in &self.core.additional_fields {
            if let Some(value) = ctx.metadata_value(&field.value_from).filter(|v| !v.is_empty()) {
                found.push((field.field_name.clone(), value.into()));
            }
        }

        if found.is_empty() {
            return self.clone();
        }
        self.with_fields(found)
    }

    #[track_caller]
    pub fn debug(&self, msg: impl fmt::Display) {
        self.log(LogLevel::Debug, &msg, Location::caller());
    }

    #[track_caller]
    pub fn info(&self, msg: impl fmt::Display) {
        self.log(LogLevel::Info, &msg, Location::caller());
    }

    #[track_caller]
    pub fn warn(&self, msg: impl fmt::Display) {
        self.log(LogLevel::Warn, &msg, Location::caller());
    }

    #[track_caller]
    pub fn error(&self, msg: impl fmt::Display) {
        self.log(LogLevel::Error, &msg, Location::caller());
    }

    fn log(&self, level: LogLevel, msg: &dyn fmt::Display, caller: &Location<'_>) {
        if !self.enabled(level) {
            return;
        }

        let severity = level.as_str();
        let name: &str = &self.name;
        let caller = format!("{}:{}", caller.file(), caller.line());
        let fields = if self.fields.is_empty() {
            String::new()
        } else {
            serde_json::to_string(&*self.fields).unwrap_or_default()
        };

        macro_rules! emit {
            ($level:expr) => {
                tracing::event!(
                    target: ENTRY_TARGET,
                    $level,
                    severity = severity,
                    logger = name,
                    caller = caller.as_str(),
                    fields = fields.as_str(),
                    "{}",
                    msg
                )
            };
        }

        tracing::dispatcher::with_default(&self.core.dispatch, || match level {
            LogLevel::Debug => emit!(Level::DEBUG),
            LogLevel::Info => emit!(Level::INFO),
            LogLevel::Warn => emit!(Level::WARN),
            LogLevel::Error | LogLevel::DPanic | LogLevel::Panic | LogLevel::Fatal => {
                emit!(Level::ERROR)
            }
        });
    }
}

/// Build the configured logger, install it globally and return the active one.
pub fn logger_factory(config: &LoggerConfig) -> Result<Arc<Logger>, TelemetryError> {
    let logger = match config.provider {
        LoggerProvider::Json => Logger::new(config),
    };
    global::set_logger(logger);
    Ok(global::logger())
}
