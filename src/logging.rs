//! Structured logging for roam test runs
//!
//! This module provides:
//! - Leveled, structured log entries with per-session context
//! - Console, JSON and compact output
//! - Roam event logging (ramp steps, BSSID transitions, captures, verdicts)
//! - Error event logging with correlation IDs

use crate::error::{AppError, Result};
use crate::models::{Config, RoamAttempt, TransitionPair};
use crate::types::{MacAddr, StationId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Log level enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    /// Most detailed: every station read
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    /// Something failed but the run continues
    Error = 4,
    /// The run cannot continue
    Fatal = 5,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }

    /// ANSI color code for console output
    pub fn color_code(&self) -> &'static str {
        match self {
            LogLevel::Trace => "\x1b[37m",
            LogLevel::Debug => "\x1b[36m",
            LogLevel::Info => "\x1b[32m",
            LogLevel::Warn => "\x1b[33m",
            LogLevel::Error => "\x1b[31m",
            LogLevel::Fatal => "\x1b[35m",
        }
    }

    pub fn reset_code() -> &'static str {
        "\x1b[0m"
    }
}

impl std::str::FromStr for LogLevel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "TRACE" => Ok(LogLevel::Trace),
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            "FATAL" => Ok(LogLevel::Fatal),
            _ => Err(AppError::parse(format!("Invalid log level: {}", s))),
        }
    }
}

/// One structured log record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    /// Logger name/component
    pub logger: String,
    /// Correlation ID for tracking related events
    pub correlation_id: Option<String>,
    pub fields: HashMap<String, serde_json::Value>,
    pub thread_id: Option<String>,
    pub location: Option<LogLocation>,
}

/// Source code location information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLocation {
    pub file: String,
    pub line: u32,
    pub module: Option<String>,
}

/// Logger with multiple output formats
pub struct Logger {
    min_level: LogLevel,
    use_color: bool,
    include_location: bool,
    format: LogFormat,
    name: String,
    context: Arc<RwLock<LogContext>>,
}

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogFormat {
    /// Human-readable console format
    Console,
    /// One JSON object per line
    Json,
    /// Compact single-line format
    Compact,
}

/// Shared logging context for correlation and session tracking
#[derive(Debug, Default)]
struct LogContext {
    session_id: Option<String>,
    current_correlation_id: Option<String>,
    context_fields: HashMap<String, serde_json::Value>,
}

/// Logger for the events of a roam iteration
pub struct RoamEventLogger {
    logger: Logger,
}

/// Error event logger with enhanced context
pub struct ErrorEventLogger {
    logger: Logger,
}

impl Logger {
    pub fn new(name: String) -> Self {
        Self {
            min_level: LogLevel::Info,
            use_color: true,
            include_location: false,
            format: LogFormat::Console,
            name,
            context: Arc::new(RwLock::new(LogContext::default())),
        }
    }

    /// Level and format follow the debug/verbose flags
    pub fn with_config(name: String, config: &Config) -> Self {
        let min_level = if config.debug {
            LogLevel::Debug
        } else if config.verbose {
            LogLevel::Info
        } else {
            LogLevel::Warn
        };

        Self {
            min_level,
            use_color: config.enable_color,
            include_location: config.debug,
            format: if config.debug { LogFormat::Json } else { LogFormat::Console },
            name,
            context: Arc::new(RwLock::new(LogContext::default())),
        }
    }

    pub async fn set_session_id(&self, session_id: String) {
        let mut context = self.context.write().await;
        context.session_id = Some(session_id);
    }

    /// Add a field to every subsequent entry
    pub async fn add_context_field<T: Serialize>(&self, key: String, value: T) {
        if let Ok(json_value) = serde_json::to_value(value) {
            let mut context = self.context.write().await;
            context.context_fields.insert(key, json_value);
        }
    }

    /// Start a correlated operation
    pub async fn start_operation(&self, operation_name: &str) -> String {
        let correlation_id = Uuid::new_v4().to_string();
        {
            let mut context = self.context.write().await;
            context.current_correlation_id = Some(correlation_id.clone());
        }

        self.info(&format!("Started operation: {}", operation_name))
            .correlation_id(&correlation_id)
            .field("operation", operation_name)
            .field("operation_type", "start")
            .log()
            .await;

        correlation_id
    }

    pub async fn end_operation(&self, correlation_id: &str, operation_name: &str, success: bool) {
        self.info(&format!("Completed operation: {} (success: {})", operation_name, success))
            .correlation_id(correlation_id)
            .field("operation", operation_name)
            .field("operation_type", "end")
            .field("success", success)
            .log()
            .await;

        let mut context = self.context.write().await;
        if context.current_correlation_id.as_deref() == Some(correlation_id) {
            context.current_correlation_id = None;
        }
    }

    pub fn log(&self, level: LogLevel, message: &str) -> LogEntryBuilder {
        LogEntryBuilder::new(self, level, message.to_string())
    }

    pub fn debug(&self, message: &str) -> LogEntryBuilder {
        self.log(LogLevel::Debug, message)
    }

    pub fn info(&self, message: &str) -> LogEntryBuilder {
        self.log(LogLevel::Info, message)
    }

    pub fn warn(&self, message: &str) -> LogEntryBuilder {
        self.log(LogLevel::Warn, message)
    }

    pub fn error(&self, message: &str) -> LogEntryBuilder {
        self.log(LogLevel::Error, message)
    }

    pub fn would_log(&self, level: LogLevel) -> bool {
        level >= self.min_level
    }

    async fn write_entry(&self, mut entry: LogEntry) {
        if entry.level < self.min_level {
            return;
        }

        let context = self.context.read().await;
        if let Some(session_id) = &context.session_id {
            entry.fields.insert("session_id".to_string(), serde_json::Value::String(session_id.clone()));
        }
        if entry.correlation_id.is_none() {
            entry.correlation_id = context.current_correlation_id.clone();
        }
        for (key, value) in &context.context_fields {
            entry.fields.insert(key.clone(), value.clone());
        }
        drop(context);

        let output = match self.format {
            LogFormat::Console => self.format_console(&entry),
            LogFormat::Json => self.format_json(&entry),
            LogFormat::Compact => self.format_compact(&entry),
        };

        // stdout carries the report
        let _ = writeln!(io::stderr(), "{}", output);
    }

    fn format_console(&self, entry: &LogEntry) -> String {
        let timestamp = entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f");
        let level_str = entry.level.as_str();

        let formatted_level = if self.use_color {
            format!("{}{:>5}{}", entry.level.color_code(), level_str, LogLevel::reset_code())
        } else {
            format!("{:>5}", level_str)
        };

        let mut output = format!("{} {} [{}] {}", timestamp, formatted_level, entry.logger, entry.message);

        if let Some(correlation_id) = &entry.correlation_id {
            let short: String = correlation_id.chars().take(8).collect();
            output.push_str(&format!(" [{}]", short));
        }

        if !entry.fields.is_empty() {
            let mut fields: Vec<String> = entry.fields.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            fields.sort();
            output.push_str(&format!(" {{{}}}", fields.join(", ")));
        }

        if self.include_location {
            if let Some(location) = &entry.location {
                output.push_str(&format!(" @ {}:{}", location.file, location.line));
            }
        }

        output
    }

    fn format_json(&self, entry: &LogEntry) -> String {
        match serde_json::to_string(entry) {
            Ok(json) => json,
            Err(_) => serde_json::json!({
                "error": "Failed to serialize log entry",
                "message": entry.message,
            })
            .to_string(),
        }
    }

    fn format_compact(&self, entry: &LogEntry) -> String {
        let timestamp = entry.timestamp.format("%H:%M:%S");
        format!(
            "{} {} {}: {}",
            timestamp,
            entry.level.as_str().chars().next().unwrap_or('?'),
            entry.logger,
            entry.message
        )
    }
}

/// Builder for log entries
pub struct LogEntryBuilder<'a> {
    logger: &'a Logger,
    entry: LogEntry,
}

impl<'a> LogEntryBuilder<'a> {
    fn new(logger: &'a Logger, level: LogLevel, message: String) -> Self {
        Self {
            logger,
            entry: LogEntry {
                timestamp: Utc::now(),
                level,
                message,
                logger: logger.name.clone(),
                correlation_id: None,
                fields: HashMap::new(),
                thread_id: std::thread::current().name().map(String::from),
                location: None,
            },
        }
    }

    pub fn correlation_id(mut self, id: &str) -> Self {
        self.entry.correlation_id = Some(id.to_string());
        self
    }

    pub fn field<T: Serialize>(mut self, key: &str, value: T) -> Self {
        if let Ok(json_value) = serde_json::to_value(value) {
            self.entry.fields.insert(key.to_string(), json_value);
        }
        self
    }

    pub fn location(mut self, file: &str, line: u32, module: Option<&str>) -> Self {
        self.entry.location = Some(LogLocation {
            file: file.to_string(),
            line,
            module: module.map(String::from),
        });
        self
    }

    /// Attach the measured and classified fields of an attempt
    pub fn attempt(self, attempt: &RoamAttempt) -> Self {
        self.field("iteration", attempt.iteration)
            .field("pair", attempt.pair.to_string())
            .field("station", attempt.station.to_string())
            .field("bssid_before", attempt.bssid_before)
            .field("bssid_after", attempt.bssid_after)
            .field("latency_ms", attempt.latency_ms)
            .field("signal_dbm", attempt.signal_dbm)
            .field("verdict", attempt.verdict.to_string())
    }

    pub fn error_info(self, error: &AppError) -> Self {
        self.field("error_category", error.category())
            .field("error_recoverable", error.is_recoverable())
            .field("error_exit_code", error.exit_code())
    }

    pub async fn log(self) {
        self.logger.write_entry(self.entry).await;
    }
}

impl RoamEventLogger {
    pub fn new(config: &Config) -> Self {
        Self {
            logger: Logger::with_config("ROAM".to_string(), config),
        }
    }

    pub fn from_logger(logger: Logger) -> Self {
        Self { logger }
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub async fn log_iteration_start(&self, iteration: u32, pair: TransitionPair, stations: usize) -> String {
        let correlation_id = self.logger.start_operation(&format!("iteration {} ({})", iteration, pair)).await;
        self.logger
            .info(&format!("Iteration {} {}: {} station(s)", iteration, pair, stations))
            .correlation_id(&correlation_id)
            .field("iteration", iteration)
            .field("pair", pair.to_string())
            .field("stations", stations)
            .log()
            .await;
        correlation_id
    }

    pub async fn log_iteration_end(&self, correlation_id: &str, iteration: u32, passed: usize, attempts: usize) {
        self.logger
            .end_operation(correlation_id, &format!("iteration {}", iteration), passed == attempts)
            .await;
    }

    pub async fn log_step(&self, step: usize, active_value: u16, passive_value: u16) {
        self.logger
            .debug(&format!("Ramp step {}: active={} passive={}", step, active_value, passive_value))
            .field("step", step)
            .field("active", active_value)
            .field("passive", passive_value)
            .log()
            .await;
    }

    pub async fn log_snapshot(&self, phase: &str, station: &StationId, bssid: Option<MacAddr>) {
        self.logger
            .debug(&format!(
                "{} {}: {}",
                phase,
                station,
                bssid.map_or_else(|| "not associated".to_string(), |b| b.to_string())
            ))
            .field("phase", phase)
            .field("station", station.to_string())
            .field("bssid", bssid)
            .log()
            .await;
    }

    pub async fn log_transition(&self, station: &StationId, before: MacAddr, after: MacAddr, step: usize) {
        self.logger
            .info(&format!("{} roamed {} -> {} at step {}", station, before, after, step))
            .field("station", station.to_string())
            .field("bssid_before", before)
            .field("bssid_after", after)
            .field("step", step)
            .log()
            .await;
    }

    pub async fn log_convergence(&self, target: MacAddr, converged: bool, off_target: usize) {
        let level = if converged { LogLevel::Debug } else { LogLevel::Warn };
        let message = if converged {
            format!("Stations converged on {}", target)
        } else {
            format!("{} station(s) not on {}; ramping anyway", off_target, target)
        };
        self.logger
            .log(level, &message)
            .field("target", target)
            .field("converged", converged)
            .field("off_target", off_target)
            .log()
            .await;
    }

    /// A read failed or timed out; the station is skipped for this poll
    pub async fn log_station_skipped(&self, station: &StationId, error: &AppError) {
        self.logger
            .warn(&format!("Skipping {} for this poll: {}", station, error))
            .field("station", station.to_string())
            .error_info(error)
            .log()
            .await;
    }

    /// Logged once per station
    pub async fn log_station_removed(&self, station: &StationId) {
        self.logger
            .warn(&format!("{} no longer exists; removed from the test", station))
            .field("station", station.to_string())
            .log()
            .await;
    }

    pub async fn log_capture(&self, event: &str, path: &Path) {
        self.logger
            .debug(&format!("Capture {}: {}", event, path.display()))
            .field("capture_event", event)
            .field("path", path.display().to_string())
            .log()
            .await;
    }

    /// Capture problems degrade classification; the iteration goes on
    pub async fn log_capture_failed(&self, stage: &str, error: &AppError) {
        self.logger
            .warn(&format!("Capture {} failed: {}", stage, error))
            .field("capture_event", stage)
            .error_info(error)
            .log()
            .await;
    }

    pub async fn log_verdict(&self, attempt: &RoamAttempt) {
        let level = if attempt.is_pass() { LogLevel::Info } else { LogLevel::Warn };
        self.logger
            .log(level, &format!("{} iteration {}: {}", attempt.station, attempt.iteration, attempt.verdict))
            .attempt(attempt)
            .log()
            .await;
    }

    pub async fn log_iteration_aborted(&self, iteration: u32, error: &AppError) {
        self.logger
            .error(&format!("Iteration {} aborted: {}", iteration, error))
            .field("iteration", iteration)
            .error_info(error)
            .log()
            .await;
    }
}

impl ErrorEventLogger {
    pub fn new(config: &Config) -> Self {
        Self {
            logger: Logger::with_config("ERR".to_string(), config),
        }
    }

    /// Log an application error with full context
    pub async fn log_error(&self, error: &AppError, context: Option<&str>, correlation_id: Option<&str>) {
        let message = if let Some(ctx) = context {
            format!("{}: {}", ctx, error)
        } else {
            error.to_string()
        };

        let mut builder = self.logger.error(&message).error_info(error);

        if let Some(id) = correlation_id {
            builder = builder.correlation_id(id);
        }

        if let Some(ctx) = context {
            builder = builder.field("context", ctx);
        }

        builder.log().await;
    }
}

/// Creates loggers sharing one session ID
pub struct LoggerFactory {
    config: Config,
    session_id: String,
}

impl LoggerFactory {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            session_id: Uuid::new_v4().to_string(),
        }
    }

    pub async fn create_logger(&self, name: &str) -> Logger {
        let logger = Logger::with_config(name.to_string(), &self.config);
        logger.set_session_id(self.session_id.clone()).await;
        logger
    }

    pub async fn create_roam_logger(&self) -> RoamEventLogger {
        RoamEventLogger::from_logger(self.create_logger("ROAM").await)
    }

    pub fn create_error_logger(&self) -> ErrorEventLogger {
        ErrorEventLogger::new(&self.config)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

/// Convenience macros for logging with location information
#[macro_export]
macro_rules! log_debug {
    ($logger:expr, $($arg:tt)*) => {
        $logger.debug(&format!($($arg)*))
            .location(file!(), line!(), Some(module_path!()))
            .log()
            .await
    };
}

#[macro_export]
macro_rules! log_info {
    ($logger:expr, $($arg:tt)*) => {
        $logger.info(&format!($($arg)*))
            .location(file!(), line!(), Some(module_path!()))
            .log()
            .await
    };
}

#[macro_export]
macro_rules! log_warn {
    ($logger:expr, $($arg:tt)*) => {
        $logger.warn(&format!($($arg)*))
            .location(file!(), line!(), Some(module_path!()))
            .log()
            .await
    };
}
