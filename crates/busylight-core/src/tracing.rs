//! Logging setup shared by the daemon and the CLI.
//!
//! The daemon logs timestamped compact lines, either to stderr or to the file
//! named in its configuration. `RUST_LOG` always takes precedence over the
//! configured level.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, fmt::writer::BoxMakeWriter, prelude::*};

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("failed to parse env filter: {0}")]
    EnvFilter(#[from] tracing_subscriber::filter::ParseError),

    #[error("failed to open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingOutputFormat {
    /// Multi-line human format.
    Pretty,
    /// Single-line human format.
    #[default]
    Compact,
    /// One JSON object per line.
    Json,
}

/// Options for [`init_tracing`].
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Level used for the `busylight` target when `RUST_LOG` is unset.
    pub default_level: Level,
    pub output_format: TracingOutputFormat,
    /// Include source file and line.
    pub include_location: bool,
    pub include_timestamp: bool,
    /// Explicit filter directive, bypassing both `RUST_LOG` and `default_level`.
    pub env_filter: Option<String>,
    /// Append to this file instead of writing to stderr.
    pub log_file: Option<PathBuf>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_level: Level::WARN,
            output_format: TracingOutputFormat::Compact,
            include_location: false,
            include_timestamp: false,
            env_filter: None,
            log_file: None,
        }
    }
}

impl TracingConfig {
    /// Verbose settings for `--debug` CLI runs.
    #[must_use]
    pub fn cli_debug() -> Self {
        Self {
            default_level: Level::DEBUG,
            include_location: true,
            ..Self::default()
        }
    }

    /// Settings for the long-running daemon.
    #[must_use]
    pub fn daemon() -> Self {
        Self {
            default_level: Level::INFO,
            output_format: TracingOutputFormat::Compact,
            include_location: false,
            include_timestamp: true,
            env_filter: None,
            log_file: None,
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingOutputFormat) -> Self {
        self.output_format = format;
        self
    }

    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    #[must_use]
    pub fn with_log_file(mut self, path: Option<PathBuf>) -> Self {
        self.log_file = path;
        self
    }

    fn filter(&self) -> Result<EnvFilter, TracingError> {
        if let Some(ref directive) = self.env_filter {
            return Ok(EnvFilter::try_new(directive)?);
        }
        Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("busylight={}", self.default_level))))
    }

    fn writer(&self) -> Result<BoxMakeWriter, TracingError> {
        match self.log_file {
            Some(ref path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|source| TracingError::LogFile {
                        path: path.clone(),
                        source,
                    })?;
                Ok(BoxMakeWriter::new(Mutex::new(file)))
            }
            None => Ok(BoxMakeWriter::new(std::io::stderr)),
        }
    }
}

/// Installs the global subscriber. Call once, early in `main`.
///
/// # Errors
///
/// Fails if a subscriber is already installed, the filter directive does not
/// parse, or the log file cannot be opened for appending.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let env_filter = config.filter()?;
    let writer = config.writer()?;
    let ansi = config.log_file.is_none();

    let layer = match config.output_format {
        TracingOutputFormat::Pretty => fmt::layer()
            .pretty()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .boxed(),
        TracingOutputFormat::Compact => {
            let layer = fmt::layer()
                .compact()
                .with_writer(writer)
                .with_ansi(ansi)
                .with_file(config.include_location)
                .with_line_number(config.include_location);
            if config.include_timestamp {
                layer.boxed()
            } else {
                layer.without_time().boxed()
            }
        }
        TracingOutputFormat::Json => fmt::layer()
            .json()
            .with_writer(writer)
            .with_ansi(false)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(env_filter).with(layer);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
