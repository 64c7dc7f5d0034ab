// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Core types for the OPC DA client.
//!
//! This crate holds everything shared between the client engine and the
//! transport that talks to the server:
//!
//! - [`types`]: item identifiers, values, quality and per-item result codes
//! - [`error`]: the [`OpcDaError`] hierarchy
//! - [`channel`]: the traits a transport implements ([`RemoteServer`],
//!   [`RemoteGroup`], [`GroupEventSink`])
//!
//! # Error Handling
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

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod channel;
pub mod error;
pub mod types;

pub use channel::{
    ConnectionStateListener, DataChangeBatch, EventHandle, GroupEventSink, ItemAddResult,
    ItemDefinition, ItemValueResult, ListenerId, RemoteGroup, RemoteServer, WriteCompleteBatch,
    WriteResult,
};
pub use error::{
    ConfigurationError, ConnectionError, DiagnosticCode, ErrorSeverity, GroupError, ItemError,
    OpcDaError, OpcDaResult, OperationError, TimeoutError,
};
pub use types::{
    ClientHandle, DataSource, ErrorCode, ItemId, ItemState, Quality, QualityStatus, ServerHandle,
    Variant,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
