// ABOUTME: Logging configuration and structured logging setup for observability
// ABOUTME: Configures log levels, formatters, and output destinations
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 TableChat Contributors

//! Production-ready logging configuration with structured output

use std::env;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::errors::{AppError, AppResult};

/// Output format for log records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable multi-line output for development
    Pretty,
    /// Single-line compact output
    Compact,
    /// Newline-delimited JSON for log aggregation
    Json,
}

impl LogFormat {
    fn from_env() -> Self {
        match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => Self::Json,
            Ok("compact") => Self::Compact,
            _ => Self::Pretty,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level filter directive (e.g. `info`, `tablechat=debug,info`)
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl LoggingConfig {
    /// Load logging configuration from `RUST_LOG` / `LOG_FORMAT`
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_owned()),
            format: LogFormat::from_env(),
        }
    }
}

/// Initialize the global tracing subscriber from environment variables
///
/// # Errors
///
/// Returns an error if a subscriber is already installed or the filter
/// directive cannot be parsed.
pub fn init_from_env() -> AppResult<()> {
    let config = LoggingConfig::from_env();
    init(&config)
}

/// Initialize the global tracing subscriber with an explicit configuration
///
/// # Errors
///
/// Returns an error if a subscriber is already installed or the filter
/// directive cannot be parsed.
pub fn init(config: &LoggingConfig) -> AppResult<()> {
    let filter = EnvFilter::try_new(&config.level)
        .map_err(|e| AppError::config(format!("Invalid log filter '{}': {e}", config.level)))?;

    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        LogFormat::Compact => registry
            .with(tracing_subscriber::fmt::layer().compact())
            .try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };

    result.map_err(|e| AppError::config(format!("Failed to install subscriber: {e}")))
}
