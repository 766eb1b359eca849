//! Tracing setup.
//!
//! Structured, async-aware logging built on `tracing` and `tracing-subscriber`:
//! - Structured events with per-actor spans (`actor{name=...}`)
//! - Multiple output formats (pretty, compact, JSON)
//! - Environment-based filtering (`RUST_LOG` overrides the configured level)
//!
//! # Example
//! ```no_run
//! use daq_actors::{config::RuntimeConfig, logging};
//! use tracing::info;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RuntimeConfig::load()?;
//! logging::init_from_config(&config)?;
//!
//! info!("Application started");
//! # Ok(())
//! # }
//! ```

use crate::config::RuntimeConfig;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Output format for tracing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Pretty-printed format with colors (for development)
    Pretty,
    /// Compact format without colors (for production)
    Compact,
    /// JSON format for structured logging (for log aggregation)
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "Invalid log format '{other}'. Must be one of: pretty, compact, json"
            )),
        }
    }
}

/// Tracing configuration options
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: Level,
    /// Output format
    pub format: OutputFormat,
    /// Whether to include span events (NEW, CLOSE)
    pub with_span_events: bool,
    /// Whether to include file and line numbers
    pub with_file_and_line: bool,
    /// Whether to enable ANSI colors (only for Pretty format)
    pub with_ansi: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: OutputFormat::Compact,
            with_span_events: false,
            with_file_and_line: false,
            with_ansi: true,
        }
    }
}

impl TracingConfig {
    /// Create tracing config from the runtime configuration
    pub fn from_config(config: &RuntimeConfig) -> Result<Self, String> {
        let level = parse_log_level(&config.application.log_level)?;
        Ok(Self {
            level,
            ..Default::default()
        })
    }

    /// Create tracing config with custom settings
    pub fn new(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Set output format
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Enable or disable span events
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.with_span_events = enabled;
        self
    }

    /// Enable or disable ANSI colors
    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.with_ansi = enabled;
        self
    }
}

/// Initialize tracing from the runtime configuration
pub fn init_from_config(config: &RuntimeConfig) -> Result<(), String> {
    init(TracingConfig::from_config(config)?)
}

/// Initialize tracing with custom configuration
///
/// Idempotent: if a global subscriber is already installed this returns `Ok(())`,
/// which keeps it safe to call from tests and libraries.
pub fn init(config: TracingConfig) -> Result<(), String> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str().to_lowercase()));

    let span_events = if config.with_span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let layer = match config.format {
        OutputFormat::Pretty => fmt::layer()
            .pretty()
            .with_span_events(span_events)
            .with_file(config.with_file_and_line)
            .with_line_number(config.with_file_and_line)
            .with_ansi(config.with_ansi)
            .with_filter(env_filter)
            .boxed(),
        OutputFormat::Compact => fmt::layer()
            .compact()
            .with_span_events(span_events)
            .with_file(config.with_file_and_line)
            .with_line_number(config.with_file_and_line)
            .with_ansi(false)
            .with_filter(env_filter)
            .boxed(),
        OutputFormat::Json => fmt::layer()
            .json()
            .with_span_events(span_events)
            .with_file(config.with_file_and_line)
            .with_line_number(config.with_file_and_line)
            .with_filter(env_filter)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .or_else(|e| {
            // Already initialized: expected in tests and embedded use.
            if e.to_string().contains("a global default trace dispatcher has already been set") {
                Ok(())
            } else {
                Err(format!("Failed to initialize tracing: {}", e))
            }
        })
}

/// Parse log level string into tracing Level
fn parse_log_level(level: &str) -> Result<Level, String> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(format!(
            "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
            level
        )),
    }
}
