//! Observability - 構造化ログの初期化
//!
//! Output formats:
//! - `json`: machine-readable, one object per line
//! - `pretty`: multi-line with colors, for development
//! - `compact`: single line with colors, the default
//!
//! `RUST_LOG`, when set, replaces the configured level directive. Logs go to
//! stderr; stdout belongs to command output.

use std::env;

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::{LogFormat, LoggingConfig};

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log filter `{directive}`: {source}")]
    InvalidFilter {
        directive: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized,
}

/// Filter from `RUST_LOG` if set, otherwise from the configured level.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    let directive = env::var("RUST_LOG").unwrap_or_else(|_| config.level.clone());
    EnvFilter::try_new(&directive).map_err(|source| LoggingError::InvalidFilter {
        directive,
        source,
    })
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = build_filter(config)?;
    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match config.format {
        LogFormat::Json => subscriber
            .with(fmt::layer().with_writer(std::io::stderr).json().with_current_span(false))
            .try_init(),
        LogFormat::Pretty => subscriber
            .with(fmt::layer().with_writer(std::io::stderr).pretty().with_ansi(true))
            .try_init(),
        LogFormat::Compact => subscriber
            .with(fmt::layer().with_writer(std::io::stderr).compact().with_ansi(true).with_target(false))
            .try_init(),
    };
    installed.map_err(|_| LoggingError::AlreadyInitialized)
}
