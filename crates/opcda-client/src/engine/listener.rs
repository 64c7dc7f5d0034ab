// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Application-facing callbacks.
//!
//! - [`ItemCallback`]: receives per-item state changes
//! - [`AccessStateListener`]: receives engine activation and error events
//!
//! Both are invoked synchronously from the task that produced the update and
//! never while the engine holds its item lock. Long-running work belongs in
//! a channel consumer such as the one fed by [`ChannelCallback`].

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use opcda_core::{ItemId, ItemState, OpcDaError};

// =============================================================================
// ItemCallback
// =============================================================================

/// Receiver of item state changes.
pub trait ItemCallback: Send + Sync {
    /// Called once per distinct observed state of the item.
    fn on_update(&self, item_id: &ItemId, state: &ItemState);
}

impl<F> ItemCallback for F
where
    F: Fn(&ItemId, &ItemState) + Send + Sync,
{
    fn on_update(&self, item_id: &ItemId, state: &ItemState) {
        self(item_id, state)
    }
}

/// One item update forwarded over a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemUpdate {
    /// Item id.
    pub item_id: ItemId,
    /// New state.
    pub state: ItemState,
}

/// A channel-based callback implementation.
#[derive(Debug, Clone)]
pub struct ChannelCallback {
    sender: mpsc::Sender<ItemUpdate>,
}

impl ChannelCallback {
    /// Creates a new channel callback.
    pub fn new(sender: mpsc::Sender<ItemUpdate>) -> Self {
        Self { sender }
    }

    /// Creates a new channel callback with a receiver.
    pub fn with_channel(capacity: usize) -> (Self, mpsc::Receiver<ItemUpdate>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

impl ItemCallback for ChannelCallback {
    fn on_update(&self, item_id: &ItemId, state: &ItemState) {
        let update = ItemUpdate {
            item_id: item_id.clone(),
            state: state.clone(),
        };
        if let Err(mpsc::error::TrySendError::Full(update)) = self.sender.try_send(update) {
            tracing::warn!(item_id = %update.item_id, "Update channel full, dropping update");
        }
    }
}

// =============================================================================
// AccessStateListener
// =============================================================================

/// Observer of engine lifecycle and error events.
pub trait AccessStateListener: Send + Sync {
    /// Called after the engine became active or inactive.
    fn state_changed(&self, _active: bool) {}

    /// Called when a connection-level error occurred.
    fn error_occurred(&self, _error: &OpcDaError) {}

    /// Called when polling recovered after an error.
    fn error_cleared(&self) {}
}
