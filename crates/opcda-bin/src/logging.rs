// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Logging initialization.

use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::LogFormat;
use crate::error::{BinError, BinResult};

/// Initializes the global subscriber.
///
/// `RUST_LOG` takes precedence over `level` when set.
pub fn init_logging(level: &str, format: LogFormat) -> BinResult<()> {
    let filter = build_filter(level)?;
    let registry = tracing_subscriber::registry().with(filter);
    let is_terminal = std::io::IsTerminal::is_terminal(&std::io::stdout());

    let result = match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true).with_ansi(is_terminal))
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_target(false).with_ansi(is_terminal))
            .try_init(),
    };

    result.map_err(|e| BinError::init(format!("failed to install subscriber: {}", e)))
}

fn build_filter(level: &str) -> BinResult<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let level = parse_level(level);
    EnvFilter::try_new(format!("{},tokio=info", level.as_str().to_lowercase()))
        .map_err(|e| BinError::init(format!("invalid log filter: {}", e)))
}

/// Parses a log level string, falling back to `INFO`.
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}
