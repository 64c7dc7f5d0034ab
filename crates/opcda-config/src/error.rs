// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to parse configuration file.
    #[error("Failed to parse config file '{path}': {message}")]
    Parse {
        /// Path to the configuration file.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Validation failed for '{field}': {message}")]
    Validation {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// File I/O error.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        /// Path to the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// File not found.
    #[error("File not found: {path}")]
    FileNotFound {
        /// The path that was not found.
        path: PathBuf,
    },

    /// Duplicate connection name.
    #[error("Duplicate connection name: {name}")]
    DuplicateConnection {
        /// The duplicated name.
        name: String,
    },

    /// Duplicate engine name within a connection.
    #[error("Duplicate engine '{engine}' in connection '{connection}'")]
    DuplicateEngine {
        /// Connection name.
        connection: String,
        /// The duplicated engine name.
        engine: String,
    },

    /// Duplicate item id within an engine.
    #[error("Duplicate item '{item_id}' in engine '{engine}'")]
    DuplicateItem {
        /// Engine name.
        engine: String,
        /// The duplicated item id.
        item_id: String,
    },

    /// Value out of range.
    #[error("Value out of range for '{field}': {value} (expected {min}..{max})")]
    OutOfRange {
        /// The field name.
        field: String,
        /// The actual value.
        value: String,
        /// Minimum value.
        min: String,
        /// Maximum value.
        max: String,
    },

    /// Invalid environment variable value.
    #[error("Invalid environment variable value for '{name}': {message}")]
    InvalidEnvVar {
        /// The environment variable name.
        name: String,
        /// Error message.
        message: String,
    },

    /// Unsupported configuration format.
    #[error("Unsupported configuration format: {format}")]
    UnsupportedFormat {
        /// The unsupported format.
        format: String,
    },

    /// Serialization error.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message.
        message: String,
    },
}

impl ConfigError {
    /// Creates a parse error.
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a file not found error.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Creates a duplicate connection error.
    pub fn duplicate_connection(name: impl Into<String>) -> Self {
        Self::DuplicateConnection { name: name.into() }
    }

    /// Creates a duplicate engine error.
    pub fn duplicate_engine(connection: impl Into<String>, engine: impl Into<String>) -> Self {
        Self::DuplicateEngine {
            connection: connection.into(),
            engine: engine.into(),
        }
    }

    /// Creates a duplicate item error.
    pub fn duplicate_item(engine: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self::DuplicateItem {
            engine: engine.into(),
            item_id: item_id.into(),
        }
    }

    /// Creates an out of range error.
    pub fn out_of_range<T: std::fmt::Display>(field: impl Into<String>, value: T, min: T, max: T) -> Self {
        Self::OutOfRange {
            field: field.into(),
            value: value.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        }
    }

    /// Creates an invalid environment variable error.
    pub fn invalid_env_var(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEnvVar {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates an unsupported format error.
    pub fn unsupported_format(format: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    /// Creates a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a validation-type error.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::DuplicateConnection { .. }
                | Self::DuplicateEngine { .. }
                | Self::DuplicateItem { .. }
                | Self::OutOfRange { .. }
        )
    }

    /// Returns `true` if this is an I/O-type error.
    pub fn is_io_error(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::FileNotFound { .. })
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(ConfigError::duplicate_connection("a").is_validation_error());
        assert!(ConfigError::out_of_range("x", 1, 2, 3).is_validation_error());
        assert!(ConfigError::file_not_found("/x").is_io_error());
        assert!(!ConfigError::serialization("bad").is_validation_error());
    }

    #[test]
    fn test_error_display() {
        let err = ConfigError::duplicate_engine("plant", "fast");
        assert_eq!(err.to_string(), "Duplicate engine 'fast' in connection 'plant'");
    }
}
