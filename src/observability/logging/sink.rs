//! Writers behind the log subscriber.
//!
//! The fmt layer renders each entry into one buffer and hands it to the
//! writer with a single `write_all`, so concurrent entries never interleave
//! mid-record.

use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::fmt::MakeWriter;

/// File name prefix of the rolling log file.
pub const LOG_FILE_PREFIX: &str = "app";
pub const LOG_FILE_SUFFIX: &str = "log";
/// Rotated files kept on disk, the active file included.
pub const MAX_LOG_FILES: usize = 3;

pub(crate) struct LogSink {
    pub(crate) writer: BoxMakeWriter,
    /// Flush the background writers on drop.
    pub(crate) guards: Vec<WorkerGuard>,
}

impl LogSink {
    /// Standard error, plus a daily-rolling file in `dir` when given.
    ///
    /// # Panics
    /// If `dir` cannot be created or the file appender cannot be opened.
    /// A bad log path is an operator error and is reported at boot.
    pub(crate) fn stderr_and_file(dir: Option<&Path>) -> Self {
        let (stderr, guard) = tracing_appender::non_blocking(io::stderr());
        let mut guards = vec![guard];

        let writer = match dir {
            Some(dir) => {
                if !dir.exists() {
                    if let Err(e) = std::fs::create_dir_all(dir) {
                        panic!("failed to create log directory {}: {e}", dir.display());
                    }
                }
                let appender = match RollingFileAppender::builder()
                    .rotation(Rotation::DAILY)
                    .filename_prefix(LOG_FILE_PREFIX)
                    .filename_suffix(LOG_FILE_SUFFIX)
                    .max_log_files(MAX_LOG_FILES)
                    .build(dir)
                {
                    Ok(appender) => appender,
                    Err(e) => panic!("failed to open log file in {}: {e}", dir.display()),
                };
                let (file, guard) = tracing_appender::non_blocking(appender);
                guards.push(guard);
                BoxMakeWriter::new(stderr.and(file))
            }
            None => BoxMakeWriter::new(stderr),
        };

        Self { writer, guards }
    }

    /// In-memory capture; each rendered line lands in the returned buffer.
    pub(crate) fn memory() -> (Self, Arc<Mutex<Vec<String>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let writer = MemoryWriter {
            lines: lines.clone(),
        };
        (
            Self {
                writer: BoxMakeWriter::new(writer),
                guards: Vec::new(),
            },
            lines,
        )
    }
}

#[derive(Clone)]
struct MemoryWriter {
    lines: Arc<Mutex<Vec<String>>>,
}

impl io::Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        if let Ok(mut lines) = self.lines.lock() {
            lines.extend(
                text.lines()
                    .filter(|line| !line.is_empty())
                    .map(str::to_string),
            );
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for MemoryWriter {
    type Writer = MemoryWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
