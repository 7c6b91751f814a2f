//! Error handling for the roam timing tester

use thiserror::Error;

/// Error categories raised by the roam orchestration engine
#[derive(Error, Debug, Clone)]
pub enum AppError {
    /// Configuration errors, always detected before hardware is touched
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation errors for individual values (MACs, module ids, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Parsing errors (capture files, JSON payloads, numbers)
    #[error("Parsing error: {0}")]
    Parse(String),

    /// I/O errors (file operations, process spawning)
    #[error("I/O error: {0}")]
    Io(String),

    /// HTTP errors talking to the test manager
    #[error("HTTP request error: {0}")]
    Http(String),

    /// Station telemetry query failed for this poll
    #[error("Telemetry error: {0}")]
    Telemetry(String),

    /// Attenuator rejected a commanded value
    #[error("Hardware error: {0}")]
    Hardware(String),

    /// Sniffer failed to start, stop, or deliver its artifact
    #[error("Capture error: {0}")]
    Capture(String),

    /// A bounded wait ran out of attempts
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// The run was stopped between iterations
    #[error("Run cancelled: {0}")]
    Cancelled(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    /// Create a new parsing error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse(message.into())
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io(message.into())
    }

    /// Create a new HTTP error
    pub fn http<S: Into<String>>(message: S) -> Self {
        Self::Http(message.into())
    }

    /// Create a new telemetry error
    pub fn telemetry<S: Into<String>>(message: S) -> Self {
        Self::Telemetry(message.into())
    }

    /// Create a new hardware error
    pub fn hardware<S: Into<String>>(message: S) -> Self {
        Self::Hardware(message.into())
    }

    /// Create a new capture error
    pub fn capture<S: Into<String>>(message: S) -> Self {
        Self::Capture(message.into())
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout(message.into())
    }

    /// Create a new cancellation error
    pub fn cancelled<S: Into<String>>(message: S) -> Self {
        Self::Cancelled(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Get error category for logging and reporting
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG",
            Self::Validation(_) => "VALIDATION",
            Self::Parse(_) => "PARSE",
            Self::Io(_) => "IO",
            Self::Http(_) => "HTTP",
            Self::Telemetry(_) => "TELEMETRY",
            Self::Hardware(_) => "HARDWARE",
            Self::Capture(_) => "CAPTURE",
            Self::Timeout(_) => "TIMEOUT",
            Self::Cancelled(_) => "CANCELLED",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Whether the run loop may continue after this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Telemetry(_) | Self::Capture(_) | Self::Timeout(_) | Self::Hardware(_) => true,
            Self::Config(_) | Self::Validation(_) | Self::Parse(_) => false,
            Self::Io(_) | Self::Cancelled(_) | Self::Internal(_) => false,
        }
    }

    /// Get user-friendly error message with suggestions
    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::Config(msg) => {
                format!("Configuration problem: {}\n\nSuggestion: Check your .env file or command line arguments. At least two attenuator module groups are required.", msg)
            }
            Self::Validation(msg) => {
                format!("Invalid input: {}\n\nSuggestion: Check the format of MAC addresses, station ids (shelf.resource.port) and module lists.", msg)
            }
            Self::Parse(msg) => {
                format!("Failed to parse data: {}\n\nSuggestion: The capture file may be truncated or use an unsupported link type.", msg)
            }
            Self::Io(msg) => {
                format!("File operation failed: {}\n\nSuggestion: Check file permissions and disk space in the capture and report directories.", msg)
            }
            Self::Http(msg) => {
                format!("Test manager request failed: {}\n\nSuggestion: Verify the manager URL and that its JSON API is reachable.", msg)
            }
            Self::Telemetry(msg) => {
                format!("Station query failed: {}\n\nSuggestion: The station may be down or re-associating; it will be retried on the next poll.", msg)
            }
            Self::Hardware(msg) => {
                format!("Attenuator command rejected: {}\n\nSuggestion: Check the attenuator serial, module indexes and maximum attenuation.", msg)
            }
            Self::Capture(msg) => {
                format!("Packet capture failed: {}\n\nSuggestion: Check that tshark is installed and the monitor radio supports the configured channel.", msg)
            }
            Self::Timeout(msg) => {
                format!("Wait timed out: {}\n\nSuggestion: Increase --query-timeout or the settle time.", msg)
            }
            Self::Cancelled(msg) => {
                format!("Run cancelled: {}\n\nResults collected so far were kept.", msg)
            }
            Self::Internal(msg) => {
                format!("Internal error: {}\n\nThis is likely a bug. Please report this issue with the error details.", msg)
            }
        }
    }

    /// Get exit code for this error type
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Validation(_) | Self::Parse(_) => 1,
            Self::Http(_) | Self::Telemetry(_) => 2,
            Self::Timeout(_) => 3,
            Self::Hardware(_) => 4,
            Self::Io(_) | Self::Capture(_) => 5,
            Self::Cancelled(_) => 130,
            Self::Internal(_) => 99,
        }
    }

    /// Format error for console display with color coding
    pub fn format_for_console(&self, use_color: bool) -> String {
        let category = self.category();
        let message = self.to_string();

        if use_color {
            use colored::Colorize;
            match self {
                Self::Config(_) | Self::Validation(_) | Self::Parse(_) => {
                    format!("[{}] {}", category.red().bold(), message.red())
                }
                Self::Http(_) | Self::Telemetry(_) => {
                    format!("[{}] {}", category.yellow().bold(), message.yellow())
                }
                Self::Timeout(_) | Self::Cancelled(_) => {
                    format!("[{}] {}", category.blue().bold(), message.blue())
                }
                Self::Hardware(_) => {
                    format!("[{}] {}", category.magenta().bold(), message.magenta())
                }
                Self::Io(_) | Self::Capture(_) => {
                    format!("[{}] {}", category.cyan().bold(), message.cyan())
                }
                Self::Internal(_) => {
                    format!("[{}] {}", category.bright_red().bold(), message.bright_red())
                }
            }
        } else {
            format!("[{}] {}", category, message)
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::io(error.to_string())
    }
}

impl From<url::ParseError> for AppError {
    fn from(error: url::ParseError) -> Self {
        Self::config(format!("URL parse error: {}", error))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::parse(format!("JSON parse error: {}", error))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::timeout(error.to_string())
        } else {
            Self::http(error.to_string())
        }
    }
}

impl From<pcap_file::PcapError> for AppError {
    fn from(error: pcap_file::PcapError) -> Self {
        Self::parse(format!("Capture file error: {}", error))
    }
}

impl From<dotenv::Error> for AppError {
    fn from(error: dotenv::Error) -> Self {
        Self::config(format!("Environment file error: {}", error))
    }
}

impl From<std::num::ParseIntError> for AppError {
    fn from(error: std::num::ParseIntError) -> Self {
        Self::parse(format!("Integer parse error: {}", error))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::internal(error.to_string())
    }
}

/// Custom Result type for the application
pub type Result<T> = std::result::Result<T, AppError>;

/// Error context trait for adding context to errors
pub trait ErrorContext<T> {
    /// Add context to an error, keeping its category
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;

    /// Add static context to an error
    fn context(self, message: &'static str) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<AppError>,
{
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let context = f();
            match e.into() {
                AppError::Config(m) => AppError::Config(format!("{}: {}", context, m)),
                AppError::Validation(m) => AppError::Validation(format!("{}: {}", context, m)),
                AppError::Parse(m) => AppError::Parse(format!("{}: {}", context, m)),
                AppError::Io(m) => AppError::Io(format!("{}: {}", context, m)),
                AppError::Http(m) => AppError::Http(format!("{}: {}", context, m)),
                AppError::Telemetry(m) => AppError::Telemetry(format!("{}: {}", context, m)),
                AppError::Hardware(m) => AppError::Hardware(format!("{}: {}", context, m)),
                AppError::Capture(m) => AppError::Capture(format!("{}: {}", context, m)),
                AppError::Timeout(m) => AppError::Timeout(format!("{}: {}", context, m)),
                AppError::Cancelled(m) => AppError::Cancelled(format!("{}: {}", context, m)),
                AppError::Internal(m) => AppError::Internal(format!("{}: {}", context, m)),
            }
        })
    }

    fn context(self, message: &'static str) -> Result<T> {
        self.with_context(|| message.to_string())
    }
}

/// Error reporter for user-facing error output
pub struct ErrorReporter {
    pub use_color: bool,
    pub verbose: bool,
}

impl ErrorReporter {
    /// Create a new error reporter
    pub fn new(use_color: bool, verbose: bool) -> Self {
        Self { use_color, verbose }
    }

    /// Report an error to the user
    pub fn report_error(&self, error: &AppError) {
        eprintln!("{}", error.format_for_console(self.use_color));

        if self.verbose {
            eprintln!();
            eprintln!("{}", error.user_friendly_message());
        }
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}
