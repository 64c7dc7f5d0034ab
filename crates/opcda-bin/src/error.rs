// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for the `opcda` binary.

use thiserror::Error;

/// Result type alias for binary operations.
pub type BinResult<T> = Result<T, BinError>;

/// Errors surfaced by the `opcda` binary.
#[derive(Debug, Error)]
pub enum BinError {
    /// Configuration rejected by a command.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Startup failure.
    #[error("Initialization error: {0}")]
    Initialization(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Config loading error.
    #[error("Config error: {0}")]
    Config(#[from] opcda_config::ConfigError),

    /// Client error.
    #[error("Client error: {0}")]
    Client(#[from] opcda_core::OpcDaError),
}

impl BinError {
    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates an initialization error.
    pub fn init(msg: impl Into<String>) -> Self {
        Self::Initialization(msg.into())
    }

    /// Returns the process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) | Self::Config(_) => 1,
            Self::Initialization(_) => 2,
            Self::Io(_) => 4,
            Self::Client(_) => 7,
        }
    }
}

impl From<std::io::Error> for BinError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Prints an error and its cause chain to stderr.
pub fn report_error(error: &BinError) {
    eprintln!("Error: {}", error);

    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        eprintln!("  Caused by: {}", cause);
        source = cause.source();
    }
}

/// Reports an error and exits with its code.
pub fn report_error_and_exit(error: BinError) -> ! {
    report_error(&error);
    std::process::exit(error.exit_code())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(BinError::config("x").exit_code(), 1);
        assert_eq!(BinError::init("x").exit_code(), 2);
        assert_eq!(BinError::from(opcda_config::ConfigError::duplicate_connection("a")).exit_code(), 1);
        assert_eq!(BinError::from(opcda_core::OpcDaError::not_connected()).exit_code(), 7);
    }

    #[test]
    fn test_display() {
        let err = BinError::config("2 warning(s)");
        assert_eq!(err.to_string(), "Configuration error: 2 warning(s)");
    }
}
