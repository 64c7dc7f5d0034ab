// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Client-side view of a server group.
//!
//! A [`Group`] wraps a [`RemoteGroup`] and owns the client-handle
//! allocation for the items added through it. It keeps the item-id and
//! client-handle maps in step so that asynchronous results, which carry
//! only a client handle, can be correlated back to an [`Item`].
//!
//! ```text
//!  ItemId ──► Item { client_handle, server_handle } ◄── ClientHandle
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use opcda_core::{
    ClientHandle, DataSource, ErrorCode, EventHandle, GroupEventSink, ItemAddResult,
    ItemDefinition, ItemError, ItemId, ItemState, OpcDaError, OpcDaResult, OperationError,
    RemoteGroup, ServerHandle, Variant,
};

// =============================================================================
// Item
// =============================================================================

/// One realized process variable.
#[derive(Clone)]
pub struct Item {
    group: Arc<dyn RemoteGroup>,
    item_id: ItemId,
    client_handle: ClientHandle,
    server_handle: ServerHandle,
}

impl Item {
    /// Returns the item id.
    #[inline]
    pub fn item_id(&self) -> &ItemId {
        &self.item_id
    }

    /// Returns the client handle.
    #[inline]
    pub fn client_handle(&self) -> ClientHandle {
        self.client_handle
    }

    /// Returns the server handle.
    #[inline]
    pub fn server_handle(&self) -> ServerHandle {
        self.server_handle
    }

    /// Writes a value synchronously and returns the per-item result code.
    pub async fn write(&self, value: Variant) -> OpcDaResult<ErrorCode> {
        let results = self.group.write(&[(self.server_handle, value)]).await?;
        results.first().copied().ok_or_else(|| {
            OpcDaError::operation(OperationError::ResultMismatch {
                expected: 1,
                actual: 0,
            })
        })
    }
}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Item")
            .field("item_id", &self.item_id)
            .field("client_handle", &self.client_handle)
            .field("server_handle", &self.server_handle)
            .field("group", &self.group.name())
            .finish()
    }
}

/// Items are equal when they are the same entry of the same group.
impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        self.item_id == other.item_id
            && self.client_handle == other.client_handle
            && self.server_handle == other.server_handle
            && Arc::as_ptr(&self.group).cast::<()>() == Arc::as_ptr(&other.group).cast::<()>()
    }
}

impl Eq for Item {}

// =============================================================================
// AddItemsOutcome
// =============================================================================

/// Mixed result of adding several items.
#[derive(Debug, Default)]
pub struct AddItemsOutcome {
    /// Items the server accepted.
    pub added: Vec<Item>,
    /// Items the server rejected, with their result codes.
    pub failed: Vec<(ItemId, ErrorCode)>,
}

impl AddItemsOutcome {
    /// Returns `true` if every item was added.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

// =============================================================================
// Group
// =============================================================================

#[derive(Default)]
struct GroupItems {
    by_id: HashMap<ItemId, Item>,
    by_handle: HashMap<ClientHandle, ItemId>,
}

impl GroupItems {
    fn insert(&mut self, item: Item) {
        self.by_handle.insert(item.client_handle, item.item_id.clone());
        self.by_id.insert(item.item_id.clone(), item);
    }

    fn remove(&mut self, item_id: &ItemId) -> Option<Item> {
        let item = self.by_id.remove(item_id)?;
        self.by_handle.remove(&item.client_handle);
        Some(item)
    }
}

/// Server group plus the client-side item maps.
pub struct Group {
    remote: Arc<dyn RemoteGroup>,
    update_rate: Duration,
    next_handle: AtomicU32,
    items: RwLock<GroupItems>,
}

impl Group {
    /// Wraps a remote group.
    pub fn new(remote: Arc<dyn RemoteGroup>, update_rate: Duration) -> Self {
        Self {
            remote,
            update_rate,
            next_handle: AtomicU32::new(1),
            items: RwLock::new(GroupItems::default()),
        }
    }

    /// Returns the group name.
    pub fn name(&self) -> &str {
        self.remote.name()
    }

    /// Returns the update rate requested at creation.
    pub fn update_rate(&self) -> Duration {
        self.update_rate
    }

    /// Returns the number of items currently in the group.
    pub fn len(&self) -> usize {
        self.items.read().by_id.len()
    }

    /// Returns `true` if the group holds no items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up an item by its client handle.
    pub fn find_by_client_handle(&self, handle: ClientHandle) -> Option<Item> {
        let items = self.items.read();
        let id = items.by_handle.get(&handle)?;
        items.by_id.get(id).cloned()
    }

    /// Looks up an item by id.
    pub fn find(&self, item_id: &ItemId) -> Option<Item> {
        self.items.read().by_id.get(item_id).cloned()
    }

    fn allocate_handle(&self) -> ClientHandle {
        ClientHandle(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    /// Adds items to the server group.
    ///
    /// The server may accept some items and reject others; both sets are
    /// reported in the outcome. `Err` means the whole call failed.
    pub async fn add_items(&self, item_ids: &[ItemId]) -> OpcDaResult<AddItemsOutcome> {
        if item_ids.is_empty() {
            return Ok(AddItemsOutcome::default());
        }

        let definitions: Vec<ItemDefinition> = item_ids
            .iter()
            .map(|id| ItemDefinition::new(id.clone(), self.allocate_handle()))
            .collect();

        let results = self.remote.add_items(&definitions).await?;
        if results.len() != definitions.len() {
            return Err(OpcDaError::operation(OperationError::ResultMismatch {
                expected: definitions.len(),
                actual: results.len(),
            }));
        }

        let mut outcome = AddItemsOutcome::default();
        let mut items = self.items.write();
        for (definition, result) in definitions.into_iter().zip(results) {
            let ItemAddResult {
                server_handle,
                error_code,
            } = result;
            if error_code.is_failure() {
                outcome.failed.push((definition.item_id, error_code));
                continue;
            }
            let item = Item {
                group: Arc::clone(&self.remote),
                item_id: definition.item_id,
                client_handle: definition.client_handle,
                server_handle,
            };
            items.insert(item.clone());
            outcome.added.push(item);
        }
        Ok(outcome)
    }

    /// Adds a single item, turning a per-item rejection into an error.
    pub async fn add_item(&self, item_id: &ItemId) -> OpcDaResult<Item> {
        let mut outcome = self.add_items(std::slice::from_ref(item_id)).await?;
        if let Some((id, code)) = outcome.failed.pop() {
            return Err(OpcDaError::item(ItemError::add_failed(id, code)));
        }
        outcome.added.pop().ok_or_else(|| {
            OpcDaError::operation(OperationError::ResultMismatch {
                expected: 1,
                actual: 0,
            })
        })
    }

    /// Removes items from the server group.
    ///
    /// The client-side maps are updated before the remote call, so a late
    /// event for a removed item no longer correlates. Per-item failures are
    /// logged.
    pub async fn remove_items(&self, item_ids: &[ItemId]) -> OpcDaResult<()> {
        let removed: Vec<Item> = {
            let mut items = self.items.write();
            item_ids.iter().filter_map(|id| items.remove(id)).collect()
        };
        if removed.is_empty() {
            return Ok(());
        }

        let handles: Vec<ServerHandle> = removed.iter().map(Item::server_handle).collect();
        let results = self.remote.remove_items(&handles).await?;
        for (item, code) in removed.iter().zip(results) {
            if code.is_failure() {
                tracing::debug!(
                    group = %self.name(),
                    item_id = %item.item_id,
                    error = %code,
                    "Server rejected item removal"
                );
            }
        }
        Ok(())
    }

    /// Removes every item from the server group.
    pub async fn clear(&self) -> OpcDaResult<()> {
        let ids: Vec<ItemId> = self.items.read().by_id.keys().cloned().collect();
        self.remove_items(&ids).await
    }

    /// Activates or deactivates the group at its update rate.
    pub async fn set_active(&self, active: bool) -> OpcDaResult<()> {
        self.remote.set_state(active, Some(self.update_rate)).await
    }

    /// Reads the given items in one batch.
    pub async fn read(&self, source: DataSource, items: &[Item]) -> OpcDaResult<Vec<(Item, ItemState)>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let handles: Vec<ServerHandle> = items.iter().map(Item::server_handle).collect();
        let states = self.remote.read(source, &handles).await?;
        if states.len() != items.len() {
            return Err(OpcDaError::operation(OperationError::ResultMismatch {
                expected: items.len(),
                actual: states.len(),
            }));
        }
        Ok(items.iter().cloned().zip(states).collect())
    }

    /// Attaches an event sink.
    pub async fn attach(&self, sink: Arc<dyn GroupEventSink>) -> OpcDaResult<Box<dyn EventHandle>> {
        self.remote.attach(sink).await
    }

    /// Requests an asynchronous refresh.
    pub async fn refresh(&self, source: DataSource) -> OpcDaResult<()> {
        self.remote.refresh(source).await
    }

    /// Removes the group from the server.
    pub async fn remove(&self) -> OpcDaResult<()> {
        {
            let mut items = self.items.write();
            items.by_id.clear();
            items.by_handle.clear();
        }
        self.remote.remove().await
    }
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.name())
            .field("update_rate", &self.update_rate)
            .field("items", &self.len())
            .finish()
    }
}
