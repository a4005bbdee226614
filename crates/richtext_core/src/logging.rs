//! Injected logging capability for the bus, the manager and plugin handlers
//!
//! Nothing in the core writes to a process-wide sink directly. The bus is
//! constructed with an `Arc<dyn DispatchLogger>`; [`TracingLogger`] forwards to
//! `tracing`, tests swap in a recorder.

use std::fmt;

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(s)
    }
}

/// A single structured log line
#[derive(Debug, Clone, Copy)]
pub struct LogRecord<'a> {
    pub level: LogLevel,
    /// Who is speaking: a plugin name, or `"bus"` / `"manager"`
    pub source: &'a str,
    /// Event being dispatched, when there is one
    pub event: Option<&'a str>,
    pub message: &'a str,
}

/// Sink for structured log records
pub trait DispatchLogger: Send + Sync {
    fn log(&self, record: &LogRecord<'_>);

    fn debug(&self, source: &str, event: Option<&str>, message: &str) {
        self.log(&LogRecord { level: LogLevel::Debug, source, event, message });
    }

    fn info(&self, source: &str, event: Option<&str>, message: &str) {
        self.log(&LogRecord { level: LogLevel::Info, source, event, message });
    }

    fn warn(&self, source: &str, event: Option<&str>, message: &str) {
        self.log(&LogRecord { level: LogLevel::Warn, source, event, message });
    }

    fn error(&self, source: &str, event: Option<&str>, message: &str) {
        self.log(&LogRecord { level: LogLevel::Error, source, event, message });
    }
}

/// Default logger forwarding every record to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl TracingLogger {
    pub fn new() -> Self {
        Self
    }
}

impl DispatchLogger for TracingLogger {
    fn log(&self, record: &LogRecord<'_>) {
        let source = record.source;
        let event = record.event.unwrap_or("-");
        let message = record.message;
        match record.level {
            LogLevel::Trace => tracing::trace!(source, event, "{}", message),
            LogLevel::Debug => tracing::debug!(source, event, "{}", message),
            LogLevel::Info => tracing::info!(source, event, "{}", message),
            LogLevel::Warn => tracing::warn!(source, event, "{}", message),
            LogLevel::Error => tracing::error!(source, event, "{}", message),
        }
    }
}

/// Logger that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogger;

impl DispatchLogger for NullLogger {
    fn log(&self, _record: &LogRecord<'_>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering_and_display() {
        assert!(LogLevel::Warn > LogLevel::Info);
        assert!(LogLevel::Error > LogLevel::Warn);
        assert_eq!(LogLevel::Warn.to_string(), "warn");
    }

    #[test_log::test]
    fn test_tracing_logger_accepts_all_levels() {
        let logger = TracingLogger::new();
        logger.debug("bus", Some("BOLD_CLICKED"), "debug line");
        logger.info("bus", None, "info line");
        logger.warn("bold", Some("BOLD_CLICKED"), "warn line");
        logger.error("bold", None, "error line");
    }
}
