//! Logging setup for hosts that do not install their own subscriber
//!
//! The library itself only emits `tracing` events. Applications and test
//! binaries that want to see them can call one of the initializers here.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Standard tracing filter (e.g. "warn,hipmem=debug")
//! - `HIPMEM_LOG_LEVEL`: Simple log level (error, warn, info, debug, trace)
//! - `HIPMEM_LOG_FORMAT`: Output format ("human" or "json")
//! - `HIPMEM_LOG_FILE`: Optional file receiving a JSON copy of every event

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing::Subscriber;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

static TRACING_INITIALIZED: OnceCell<()> = OnceCell::new();

const LOG_LEVEL_ENV: &str = "HIPMEM_LOG_LEVEL";
const LOG_FORMAT_ENV: &str = "HIPMEM_LOG_FORMAT";
const LOG_FILE_ENV: &str = "HIPMEM_LOG_FILE";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter: {0}")]
    InvalidFilter(String),

    #[error("failed to create log directory: {0}")]
    DirectoryCreationFailed(String),

    #[error("failed to open log file: {0}")]
    FileOpenFailed(String),

    /// Another global subscriber was installed first
    #[error("failed to install subscriber: {0}")]
    InstallFailed(String),
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    pub fn as_filter_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Console output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

impl LogFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "human" | "pretty" | "console" => Some(LogFormat::Human),
            "json" | "structured" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    /// Include file and line of each event on the console
    pub with_file_info: bool,
    /// Emit an event when a span closes
    pub with_span_events: bool,
    pub log_file: Option<PathBuf>,
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_file_info(mut self, with_file_info: bool) -> Self {
        self.with_file_info = with_file_info;
        self
    }

    pub fn with_span_events(mut self, with_span_events: bool) -> Self {
        self.with_span_events = with_span_events;
        self
    }

    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    /// Read `HIPMEM_LOG_LEVEL`, `HIPMEM_LOG_FORMAT` and `HIPMEM_LOG_FILE`.
    /// Unset or unparsable values keep their defaults.
    pub fn from_env() -> Self {
        let mut config = Self::new();
        if let Some(level) = std::env::var(LOG_LEVEL_ENV)
            .ok()
            .and_then(|s| LogLevel::from_str(&s))
        {
            config.level = level;
        }
        if let Some(format) = std::env::var(LOG_FORMAT_ENV)
            .ok()
            .and_then(|s| LogFormat::from_str(&s))
        {
            config.format = format;
        }
        config.log_file = std::env::var_os(LOG_FILE_ENV).map(PathBuf::from);
        config
    }
}

/// Initialize logging from the environment, ignoring failures.
///
/// Idempotent: only the first call in a process installs a subscriber.
pub fn init_logging_default() {
    init_logging_from_env().ok();
}

/// Initialize logging from the environment.
///
/// Idempotent. Errors are only reported by the call that performs the
/// installation.
pub fn init_logging_from_env() -> Result<(), LoggingError> {
    let mut result = Ok(());
    TRACING_INITIALIZED.get_or_init(|| {
        result = install(&LoggingConfig::from_env());
    });
    result
}

/// Initialize logging with an explicit configuration. Idempotent.
pub fn init_with_config(config: &LoggingConfig) {
    TRACING_INITIALIZED.get_or_init(|| {
        if let Err(err) = install(config) {
            eprintln!("hipmem: logging not initialized: {}", err);
        }
    });
}

pub fn is_initialized() -> bool {
    TRACING_INITIALIZED.get().is_some()
}

fn install(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = build_env_filter(config.level)?;
    let file = config.log_file.as_deref().map(open_log_file).transpose()?;

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer(config))
        .with(file.map(|file| file_layer(config, file)))
        .try_init()
        .map_err(|e| LoggingError::InstallFailed(e.to_string()))
}

fn console_layer<S>(config: &LoggingConfig) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let layer = fmt::layer()
        .with_file(config.with_file_info)
        .with_line_number(config.with_file_info)
        .with_span_events(span_events(config.with_span_events));

    match config.format {
        LogFormat::Json => layer.json().with_target(false).boxed(),
        LogFormat::Human => layer.with_target(true).boxed(),
    }
}

// The file copy is always JSON with source locations
fn file_layer<S>(config: &LoggingConfig, file: File) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .json()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events(config.with_span_events))
        .boxed()
}

fn open_log_file(path: &Path) -> Result<File, LoggingError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| LoggingError::DirectoryCreationFailed(e.to_string()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| LoggingError::FileOpenFailed(e.to_string()))
}

fn span_events(enabled: bool) -> FmtSpan {
    if enabled {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    }
}

/// `RUST_LOG` wins over the configured level
fn build_env_filter(level: LogLevel) -> Result<EnvFilter, LoggingError> {
    match std::env::var("RUST_LOG") {
        Ok(rust_log) => {
            EnvFilter::try_new(rust_log).map_err(|e| LoggingError::InvalidFilter(e.to_string()))
        }
        Err(_) => Ok(EnvFilter::new(level.as_filter_str())),
    }
}
