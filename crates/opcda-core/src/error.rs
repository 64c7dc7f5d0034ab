// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC DA client error types.
//!
//! # Error Categories
//!
//! ```text
//! OpcDaError
//! ├── Connection    - Server handle and transport failures
//! ├── Item          - Per-item add/remove failures
//! ├── Group         - Group creation and state changes
//! ├── Operation     - Read/write operation failures
//! ├── Configuration - Invalid settings
//! └── Timeout       - Operations that did not complete in time
//! ```
//!
//! Per-item result codes reported by the server are carried as
//! [`ErrorCode`](crate::types::ErrorCode) values inside the error variants.
//! The diagnostic code returned by [`OpcDaError::diagnostic_code`] is a
//! separate `DA-XXYY` identifier for logs and metrics.
//!
//! # Examples
//!
//! ```
//! use opcda_core::error::{OpcDaError, ConnectionError};
//!
//! let error = OpcDaError::connection(ConnectionError::lost("rpc channel closed"));
//! assert!(error.is_connection_loss());
//! assert!(error.is_retryable());
//! ```

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tracing::Level;

use crate::types::{ErrorCode, ItemId};

/// Result type alias for OPC DA operations.
pub type OpcDaResult<T> = Result<T, OpcDaError>;

// =============================================================================
// OpcDaError - Main Error Type
// =============================================================================

/// The main error type for OPC DA client operations.
#[derive(Debug, Error)]
pub enum OpcDaError {
    /// Connection-related errors.
    #[error("{0}")]
    Connection(#[from] ConnectionError),

    /// Per-item errors.
    #[error("{0}")]
    Item(#[from] ItemError),

    /// Group errors.
    #[error("{0}")]
    Group(#[from] GroupError),

    /// Read/write operation errors.
    #[error("{0}")]
    Operation(#[from] OperationError),

    /// Configuration errors.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// Timeout errors.
    #[error("{0}")]
    Timeout(#[from] TimeoutError),
}

impl OpcDaError {
    // =========================================================================
    // Factory Methods
    // =========================================================================

    /// Creates a connection error.
    #[inline]
    pub fn connection(error: ConnectionError) -> Self {
        Self::Connection(error)
    }

    /// Creates an item error.
    #[inline]
    pub fn item(error: ItemError) -> Self {
        Self::Item(error)
    }

    /// Creates a group error.
    #[inline]
    pub fn group(error: GroupError) -> Self {
        Self::Group(error)
    }

    /// Creates an operation error.
    #[inline]
    pub fn operation(error: OperationError) -> Self {
        Self::Operation(error)
    }

    /// Creates a configuration error.
    #[inline]
    pub fn configuration(error: ConfigurationError) -> Self {
        Self::Configuration(error)
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(error: TimeoutError) -> Self {
        Self::Timeout(error)
    }

    // =========================================================================
    // Convenience Factory Methods
    // =========================================================================

    /// Creates a not connected error.
    pub fn not_connected() -> Self {
        Self::Connection(ConnectionError::NotConnected)
    }

    /// Creates a connection lost error.
    pub fn connection_lost(reason: impl Into<String>) -> Self {
        Self::Connection(ConnectionError::lost(reason))
    }

    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Connection(ConnectionError::transport(message))
    }

    /// Creates an item-not-realized error.
    pub fn not_realized(item_id: impl Into<ItemId>) -> Self {
        Self::Item(ItemError::NotRealized {
            item_id: item_id.into(),
        })
    }

    /// Creates a write failed error.
    pub fn write_failed(item_id: impl Into<ItemId>, code: ErrorCode) -> Self {
        Self::Operation(OperationError::WriteFailed {
            item_id: item_id.into(),
            code,
        })
    }

    /// Creates a read failed error.
    pub fn read_failed(message: impl Into<String>) -> Self {
        Self::Operation(OperationError::ReadFailed {
            message: message.into(),
        })
    }

    // =========================================================================
    // Error Properties
    // =========================================================================

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(e) => e.is_retryable(),
            Self::Item(e) => e.is_retryable(),
            Self::Group(_) => true,
            Self::Operation(e) => e.is_retryable(),
            Self::Timeout(_) => true,
            Self::Configuration(_) => false,
        }
    }

    /// Returns `true` if this error means the connection to the server is
    /// unusable and must be re-established.
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout(_))
    }

    /// Returns the suggested retry delay for this error.
    pub fn suggested_retry_delay(&self) -> Option<Duration> {
        if !self.is_retryable() {
            return None;
        }
        match self {
            Self::Connection(_) => Some(Duration::from_secs(5)),
            Self::Timeout(e) => Some(e.duration()),
            _ => Some(Duration::from_secs(1)),
        }
    }

    /// Returns the severity level of this error.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Connection(_) => ErrorSeverity::Error,
            Self::Item(_) => ErrorSeverity::Warning,
            Self::Group(_) => ErrorSeverity::Error,
            Self::Operation(e) => e.severity(),
            Self::Timeout(_) => ErrorSeverity::Warning,
            Self::Configuration(_) => ErrorSeverity::Critical,
        }
    }

    /// Returns the error category for logging and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Item(_) => "item",
            Self::Group(_) => "group",
            Self::Operation(_) => "operation",
            Self::Configuration(_) => "configuration",
            Self::Timeout(_) => "timeout",
        }
    }

    /// Returns the structured diagnostic code for this error.
    pub fn diagnostic_code(&self) -> DiagnosticCode {
        match self {
            Self::Connection(e) => DiagnosticCode::new(1, e.code()),
            Self::Item(e) => DiagnosticCode::new(2, e.code()),
            Self::Group(e) => DiagnosticCode::new(3, e.code()),
            Self::Operation(e) => DiagnosticCode::new(4, e.code()),
            Self::Configuration(_) => DiagnosticCode::new(5, 1),
            Self::Timeout(_) => DiagnosticCode::new(6, 1),
        }
    }

    /// Returns the server-reported result code, if the error carries one.
    pub fn server_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Item(ItemError::AddFailed { code, .. }) => Some(*code),
            Self::Operation(OperationError::WriteFailed { code, .. }) => Some(*code),
            _ => None,
        }
    }

    /// Returns recovery hints for this error.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::Connection(_) => vec![
                "Check that the OPC DA server is running",
                "Verify host name and server program id",
                "The reconnect controller retries automatically",
            ],
            Self::Item(ItemError::AddFailed { .. }) => vec![
                "Verify the item id exists in the server address space",
                "Check the item access path",
            ],
            Self::Item(_) => vec!["Add the item to an active engine first"],
            Self::Group(_) => vec!["Check server group limits and update rate"],
            Self::Operation(OperationError::ReadOnly { .. }) => {
                vec!["Enable writes on the engine settings"]
            }
            Self::Operation(_) => vec![
                "Check the item access rights",
                "Verify the value type matches the item's canonical type",
            ],
            Self::Configuration(_) => vec!["Review the configuration file"],
            Self::Timeout(_) => vec!["Increase the timeout or check network latency"],
        }
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            Self::Connection(_) => "The connection to the OPC DA server is unavailable.".into(),
            Self::Item(e) => format!("Item problem: {}", e),
            Self::Group(_) => "The server rejected a group operation.".into(),
            Self::Operation(e) => format!("Operation failed: {}", e),
            Self::Configuration(e) => format!("Invalid configuration: {}", e),
            Self::Timeout(_) => "The server did not respond in time.".into(),
        }
    }

    /// Returns the tracing level for this error.
    pub fn tracing_level(&self) -> Level {
        self.severity().to_tracing_level()
    }

    /// Logs this error with appropriate level and context.
    pub fn log(&self, context: &str) {
        let code = self.diagnostic_code();

        match self.tracing_level() {
            Level::ERROR => tracing::error!(
                error_code = %code,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
            Level::WARN => tracing::warn!(
                error_code = %code,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
            _ => tracing::debug!(
                error_code = %code,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
        }
    }
}

// =============================================================================
// ConnectionError
// =============================================================================

/// Connection-related errors.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The server handle is not connected.
    #[error("Not connected to OPC DA server")]
    NotConnected,

    /// Connecting to the server failed.
    #[error("Failed to connect to '{target}': {reason}")]
    ConnectFailed {
        /// Host and server id.
        target: String,
        /// Reason.
        reason: String,
    },

    /// The connection dropped.
    #[error("Connection lost: {reason}")]
    Lost {
        /// Reason.
        reason: String,
    },

    /// The remote object channel reported a failure.
    #[error("Transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
    },

    /// The server handle has been disposed.
    #[error("Server handle disposed")]
    Disposed,
}

impl ConnectionError {
    /// Creates a connect failed error.
    pub fn connect_failed(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConnectFailed {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Creates a connection lost error.
    pub fn lost(reason: impl Into<String>) -> Self {
        Self::Lost {
            reason: reason.into(),
        }
    }

    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Disposed)
    }

    fn code(&self) -> u8 {
        match self {
            Self::NotConnected => 1,
            Self::ConnectFailed { .. } => 2,
            Self::Lost { .. } => 3,
            Self::Transport { .. } => 4,
            Self::Disposed => 5,
        }
    }
}

// =============================================================================
// ItemError
// =============================================================================

/// Per-item errors.
#[derive(Debug, Error)]
pub enum ItemError {
    /// The server rejected the item when adding it to a group.
    #[error("Failed to add item '{item_id}': {code}")]
    AddFailed {
        /// Item id.
        item_id: ItemId,
        /// Server result code.
        code: ErrorCode,
    },

    /// The item is not currently realized on the server.
    #[error("Item '{item_id}' is not realized")]
    NotRealized {
        /// Item id.
        item_id: ItemId,
    },

    /// The item id is invalid.
    #[error("Invalid item id '{item_id}': {reason}")]
    InvalidId {
        /// Item id.
        item_id: String,
        /// Reason.
        reason: String,
    },
}

impl ItemError {
    /// Creates an add failed error.
    pub fn add_failed(item_id: impl Into<ItemId>, code: ErrorCode) -> Self {
        Self::AddFailed {
            item_id: item_id.into(),
            code,
        }
    }

    /// Creates an invalid id error.
    pub fn invalid_id(item_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidId {
            item_id: item_id.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NotRealized { .. })
    }

    fn code(&self) -> u8 {
        match self {
            Self::AddFailed { .. } => 1,
            Self::NotRealized { .. } => 2,
            Self::InvalidId { .. } => 3,
        }
    }
}

// =============================================================================
// GroupError
// =============================================================================

/// Group errors.
#[derive(Debug, Error)]
pub enum GroupError {
    /// Group creation failed.
    #[error("Failed to create group '{name}': {reason}")]
    CreateFailed {
        /// Group name.
        name: String,
        /// Reason.
        reason: String,
    },

    /// Changing group state failed.
    #[error("Failed to set state of group '{name}': {reason}")]
    StateChangeFailed {
        /// Group name.
        name: String,
        /// Reason.
        reason: String,
    },

    /// No group is currently active.
    #[error("No active group")]
    NotActive,
}

impl GroupError {
    /// Creates a create failed error.
    pub fn create_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CreateFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    fn code(&self) -> u8 {
        match self {
            Self::CreateFailed { .. } => 1,
            Self::StateChangeFailed { .. } => 2,
            Self::NotActive => 3,
        }
    }
}

// =============================================================================
// OperationError
// =============================================================================

/// Read/write operation errors.
#[derive(Debug, Error)]
pub enum OperationError {
    /// A batched read failed as a whole.
    #[error("Read failed: {message}")]
    ReadFailed {
        /// Error message.
        message: String,
    },

    /// The server rejected a write.
    #[error("Write to '{item_id}' failed: {code}")]
    WriteFailed {
        /// Item id.
        item_id: ItemId,
        /// Server result code.
        code: ErrorCode,
    },

    /// Writes are not enabled for this engine.
    #[error("Engine '{engine}' is read-only")]
    ReadOnly {
        /// Engine name.
        engine: String,
    },

    /// The server returned a result set that does not match the request.
    #[error("Result count mismatch: expected {expected}, got {actual}")]
    ResultMismatch {
        /// Expected count.
        expected: usize,
        /// Actual count.
        actual: usize,
    },
}

impl OperationError {
    /// Creates a read-only error.
    pub fn read_only(engine: impl Into<String>) -> Self {
        Self::ReadOnly {
            engine: engine.into(),
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ReadFailed { .. })
    }

    /// Returns the severity level of this error.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::ReadOnly { .. } => ErrorSeverity::Info,
            Self::WriteFailed { .. } => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }

    fn code(&self) -> u8 {
        match self {
            Self::ReadFailed { .. } => 1,
            Self::WriteFailed { .. } => 2,
            Self::ReadOnly { .. } => 3,
            Self::ResultMismatch { .. } => 4,
        }
    }
}

// =============================================================================
// ConfigurationError
// =============================================================================

/// Invalid settings.
#[derive(Debug, Error)]
#[error("Invalid value for '{field}': {reason}")]
pub struct ConfigurationError {
    /// Field name.
    pub field: String,
    /// Reason.
    pub reason: String,
}

impl ConfigurationError {
    /// Creates a configuration error.
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// TimeoutError
// =============================================================================

/// Operation timeout.
#[derive(Debug, Error)]
#[error("{operation} timed out after {duration:?}")]
pub struct TimeoutError {
    /// Operation name.
    pub operation: String,
    /// Elapsed duration.
    pub duration: Duration,
}

impl TimeoutError {
    /// Creates a timeout error.
    pub fn new(operation: impl Into<String>, duration: Duration) -> Self {
        Self {
            operation: operation.into(),
            duration,
        }
    }

    /// Returns the timeout duration.
    #[inline]
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

// =============================================================================
// ErrorSeverity
// =============================================================================

/// Error severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    /// Informational - no action required.
    Info,
    /// Warning - action may be required.
    Warning,
    /// Error - action required, but recoverable.
    Error,
    /// Critical - immediate action required.
    Critical,
}

impl ErrorSeverity {
    /// Converts to tracing level.
    pub fn to_tracing_level(self) -> Level {
        match self {
            Self::Info => Level::INFO,
            Self::Warning => Level::WARN,
            Self::Error | Self::Critical => Level::ERROR,
        }
    }

    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// DiagnosticCode
// =============================================================================

/// Structured diagnostic code.
///
/// Format: `DA-XXYY` where XX is the category and YY the specific error.
///
/// Categories:
/// - 1: Connection
/// - 2: Item
/// - 3: Group
/// - 4: Operation
/// - 5: Configuration
/// - 6: Timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagnosticCode {
    /// Category.
    pub category: u8,
    /// Specific error within the category.
    pub code: u8,
}

impl DiagnosticCode {
    /// Creates a diagnostic code.
    pub const fn new(category: u8, code: u8) -> Self {
        Self { category, code }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DA-{:02}{:02}", self.category, self.code)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_errors_are_connection_loss() {
        let err = OpcDaError::connection_lost("socket closed");
        assert!(err.is_connection_loss());
        assert!(err.is_retryable());
        assert_eq!(err.category(), "connection");
        assert_eq!(err.severity(), ErrorSeverity::Error);
        assert_eq!(err.diagnostic_code().to_string(), "DA-0103");

        let timeout = OpcDaError::timeout(TimeoutError::new("read", Duration::from_secs(3)));
        assert!(timeout.is_connection_loss());
        assert_eq!(timeout.suggested_retry_delay(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_item_errors_are_not_connection_loss() {
        let err = OpcDaError::item(ItemError::add_failed("Bad.Tag", ErrorCode::OPC_E_UNKNOWNITEMID));
        assert!(!err.is_connection_loss());
        assert!(!err.is_retryable());
        assert_eq!(err.server_code(), Some(ErrorCode::OPC_E_UNKNOWNITEMID));
        assert!(err.to_string().contains("Bad.Tag"));
    }

    #[test]
    fn test_write_failed() {
        let err = OpcDaError::write_failed("Tag.1", ErrorCode::OPC_E_BADRIGHTS);
        assert_eq!(err.server_code(), Some(ErrorCode::OPC_E_BADRIGHTS));
        assert_eq!(err.severity(), ErrorSeverity::Warning);
        assert_eq!(err.diagnostic_code(), DiagnosticCode::new(4, 2));
        assert!(!err.recovery_hints().is_empty());
    }

    #[test]
    fn test_read_only() {
        let err = OpcDaError::operation(OperationError::read_only("plant"));
        assert_eq!(err.severity(), ErrorSeverity::Info);
        assert_eq!(err.tracing_level(), Level::INFO);
        assert!(err.user_message().contains("read-only"));
    }

    #[test]
    fn test_configuration_not_retryable() {
        let err = OpcDaError::configuration(ConfigurationError::new("update_period", "must be > 0"));
        assert!(!err.is_retryable());
        assert_eq!(err.suggested_retry_delay(), None);
        assert_eq!(err.severity(), ErrorSeverity::Critical);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(ErrorSeverity::Critical > ErrorSeverity::Error);
        assert!(ErrorSeverity::Warning > ErrorSeverity::Info);
        assert_eq!(ErrorSeverity::Warning.to_string(), "warning");
    }
}
