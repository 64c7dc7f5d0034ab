// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Remote object channel boundary.
//!
//! The client engine never speaks the wire protocol itself. Everything it
//! needs from the server is expressed by the traits in this module, which
//! are implemented by a transport crate (or by a mock in tests).
//!
//! ```text
//! ┌──────────────────┐  add_group   ┌──────────────────┐
//! │   RemoteServer   │─────────────►│   RemoteGroup    │
//! │ connect/dispose  │              │ add/read/write   │
//! └────────┬─────────┘              └────────┬─────────┘
//!          │ connection_state_changed        │ data_change / read_complete
//!          ▼                                 ▼
//! ┌──────────────────────────┐      ┌──────────────────┐
//! │ ConnectionStateListener  │      │  GroupEventSink  │
//! └──────────────────────────┘      └──────────────────┘
//! ```
//!
//! # Result alignment
//!
//! Batched calls (`add_items`, `remove_items`, `read`, `write`) return one
//! entry per input, in input order. A failed entry is reported through its
//! [`ErrorCode`]; an `Err` return means the whole call failed at the
//! transport level.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::OpcDaResult;
use crate::types::{ClientHandle, DataSource, ErrorCode, ItemId, ItemState, Quality, ServerHandle, Variant};

// =============================================================================
// Item records
// =============================================================================

/// Request to add one item to a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDefinition {
    /// Server-side item id.
    pub item_id: ItemId,
    /// Client handle reported back in events.
    pub client_handle: ClientHandle,
    /// Whether the item is active once added.
    pub active: bool,
    /// Optional access path.
    pub access_path: Option<String>,
}

impl ItemDefinition {
    /// Creates an active item definition without access path.
    pub fn new(item_id: ItemId, client_handle: ClientHandle) -> Self {
        Self {
            item_id,
            client_handle,
            active: true,
            access_path: None,
        }
    }
}

/// Per-item result of an `add_items` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemAddResult {
    /// Server handle, meaningful only when `error_code` is a success.
    pub server_handle: ServerHandle,
    /// Result code.
    pub error_code: ErrorCode,
}

impl ItemAddResult {
    /// Creates a successful result.
    pub fn ok(server_handle: ServerHandle) -> Self {
        Self {
            server_handle,
            error_code: ErrorCode::S_OK,
        }
    }

    /// Creates a failed result.
    pub fn failed(error_code: ErrorCode) -> Self {
        Self {
            server_handle: ServerHandle(0),
            error_code,
        }
    }

    /// Returns `true` if the item was added.
    #[inline]
    pub fn is_success(&self) -> bool {
        self.error_code.is_success()
    }
}

// =============================================================================
// Event batches
// =============================================================================

/// One per-item entry of a data-change or read-complete notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemValueResult {
    /// Client handle of the item.
    pub client_handle: ClientHandle,
    /// Per-item result code.
    pub error_code: ErrorCode,
    /// Value.
    pub value: Variant,
    /// Timestamp.
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,
    /// Quality.
    pub quality: Quality,
}

impl ItemValueResult {
    /// Converts the entry into an [`ItemState`].
    pub fn to_state(&self) -> ItemState {
        ItemState::new(self.error_code, self.value.clone(), self.timestamp, self.quality)
    }
}

/// Asynchronous data-change or read-complete notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataChangeBatch {
    /// Transaction id (0 for unsolicited data changes).
    pub transaction_id: u32,
    /// Worst quality across the batch.
    pub master_quality: ErrorCode,
    /// Worst error across the batch.
    pub master_error: ErrorCode,
    /// Per-item entries.
    pub results: Vec<ItemValueResult>,
}

impl DataChangeBatch {
    /// Creates an unsolicited batch with success master codes.
    pub fn new(results: Vec<ItemValueResult>) -> Self {
        Self {
            transaction_id: 0,
            master_quality: ErrorCode::S_OK,
            master_error: ErrorCode::S_OK,
            results,
        }
    }
}

/// Per-item write-complete entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResult {
    /// Client handle of the item.
    pub client_handle: ClientHandle,
    /// Result code.
    pub error_code: ErrorCode,
}

/// Asynchronous write-complete notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteCompleteBatch {
    /// Transaction id.
    pub transaction_id: u32,
    /// Worst error across the batch.
    pub master_error: ErrorCode,
    /// Per-item entries.
    pub results: Vec<WriteResult>,
}

// =============================================================================
// Listener identifiers
// =============================================================================

/// Registration token returned by [`RemoteServer::add_state_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

// =============================================================================
// Traits
// =============================================================================

/// Receiver for asynchronous group notifications.
///
/// Implementations may be called concurrently from channel delivery tasks.
#[async_trait]
pub trait GroupEventSink: Send + Sync {
    /// Called when subscribed items changed.
    async fn data_change(&self, batch: DataChangeBatch);

    /// Called when an asynchronous read or refresh completed.
    async fn read_complete(&self, batch: DataChangeBatch);

    /// Called when an asynchronous write completed.
    async fn write_complete(&self, batch: WriteCompleteBatch);

    /// Called when an asynchronous operation was cancelled.
    async fn cancel_complete(&self, transaction_id: u32);
}

/// Handle to an attached [`GroupEventSink`].
#[async_trait]
pub trait EventHandle: Send + Sync {
    /// Stops event delivery to the sink.
    async fn detach(&self) -> OpcDaResult<()>;
}

/// Server-side group of items sharing an update rate.
#[async_trait]
pub trait RemoteGroup: Send + Sync {
    /// Returns the group name.
    fn name(&self) -> &str;

    /// Adds items. Returns one result per definition, in order.
    async fn add_items(&self, items: &[ItemDefinition]) -> OpcDaResult<Vec<ItemAddResult>>;

    /// Removes items. Returns one result per handle, in order.
    async fn remove_items(&self, handles: &[ServerHandle]) -> OpcDaResult<Vec<ErrorCode>>;

    /// Changes the active flag and optionally the update rate.
    async fn set_state(&self, active: bool, update_rate: Option<Duration>) -> OpcDaResult<()>;

    /// Synchronously reads items. Returns one state per handle, in order.
    async fn read(&self, source: DataSource, handles: &[ServerHandle]) -> OpcDaResult<Vec<ItemState>>;

    /// Synchronously writes items. Returns one result per entry, in order.
    async fn write(&self, values: &[(ServerHandle, Variant)]) -> OpcDaResult<Vec<ErrorCode>>;

    /// Attaches an event sink.
    async fn attach(&self, sink: Arc<dyn GroupEventSink>) -> OpcDaResult<Box<dyn EventHandle>>;

    /// Requests an asynchronous refresh of all active items.
    ///
    /// Results arrive through [`GroupEventSink::read_complete`].
    async fn refresh(&self, source: DataSource) -> OpcDaResult<()>;

    /// Removes the group from the server.
    async fn remove(&self) -> OpcDaResult<()>;
}

/// Observer of connection state transitions.
///
/// Called synchronously from the thread that observed the transition;
/// implementations must not block.
pub trait ConnectionStateListener: Send + Sync {
    /// Called with `true` after a connection is established and `false`
    /// after it is lost or closed.
    fn connection_state_changed(&self, connected: bool);
}

/// Handle to one remote OPC DA server.
#[async_trait]
pub trait RemoteServer: Send + Sync {
    /// Returns a display name (host and server id).
    fn name(&self) -> &str;

    /// Establishes the connection.
    async fn connect(&self) -> OpcDaResult<()>;

    /// Closes the connection.
    async fn disconnect(&self) -> OpcDaResult<()>;

    /// Tears down the connection after a failure.
    ///
    /// Listeners observe `connection_state_changed(false)`.
    async fn dispose(&self) -> OpcDaResult<()> {
        self.disconnect().await
    }

    /// Returns `true` while connected.
    fn is_connected(&self) -> bool;

    /// Creates a group on the server.
    async fn add_group(
        &self,
        name: &str,
        active: bool,
        update_rate: Duration,
    ) -> OpcDaResult<Arc<dyn RemoteGroup>>;

    /// Registers a connection state listener.
    fn add_state_listener(&self, listener: Arc<dyn ConnectionStateListener>) -> ListenerId;

    /// Deregisters a listener. Returns `false` if it was not registered.
    fn remove_state_listener(&self, id: ListenerId) -> bool;
}
