// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Mock Implementations
//!
//! In-process stand-ins for the remote server channel.
//!
//! ```text
//! MockServer ──add_group──► MockGroup ──attach──► GroupEventSink (engine)
//!     │                         │
//!     └──── ServerState ◄───────┘   shared values, failure switches
//! ```
//!
//! Connection notifications are delivered synchronously from the call that
//! caused them (`connect`, `disconnect`, `dispose`, `drop_connection`), with
//! the listener list copied out of the lock first.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use opcda_client::{AccessStateListener, Clock, ItemCallback, SystemClock};
use opcda_core::{
    ClientHandle, ConnectionStateListener, DataChangeBatch, DataSource, ErrorCode, EventHandle,
    GroupEventSink, ItemAddResult, ItemDefinition, ItemId, ItemState, ItemValueResult,
    ListenerId, OpcDaError, OpcDaResult, Quality, RemoteGroup, RemoteServer, ServerHandle,
    Variant,
};

// =============================================================================
// Server state
// =============================================================================

/// State shared by a mock server and its groups.
#[derive(Debug)]
struct ServerState {
    clock: Arc<dyn Clock>,
    values: Mutex<HashMap<ItemId, ItemState>>,
    unknown_items: Mutex<HashSet<ItemId>>,
    write_failures: Mutex<HashMap<ItemId, ErrorCode>>,
    fail_reads: AtomicBool,
    fail_add_items: AtomicBool,
    fail_writes: AtomicBool,
    read_delay: Mutex<Option<Duration>>,
    write_delay: Mutex<Option<Duration>>,
    read_count: AtomicU64,
}

impl ServerState {
    fn state_of(&self, item_id: &ItemId) -> ItemState {
        self.values.lock().get(item_id).cloned().unwrap_or_default()
    }
}

// =============================================================================
// MockServer
// =============================================================================

/// Scriptable [`RemoteServer`].
pub struct MockServer {
    name: String,
    state: Arc<ServerState>,
    connected: AtomicBool,
    listeners: Mutex<Vec<(ListenerId, Arc<dyn ConnectionStateListener>)>>,
    next_listener: AtomicU64,
    groups: Mutex<Vec<Arc<MockGroup>>>,
    connect_failures: AtomicU32,
    fail_add_group: AtomicBool,
    keep_alive_on_dispose: AtomicBool,
    connect_count: AtomicU64,
    disconnect_count: AtomicU64,
    dispose_count: AtomicU64,
}

impl MockServer {
    /// Creates a disconnected server using the system clock.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::with_clock(name, Arc::new(SystemClock))
    }

    /// Creates a disconnected server whose writes are stamped by `clock`.
    pub fn with_clock(name: impl Into<String>, clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            state: Arc::new(ServerState {
                clock,
                values: Mutex::new(HashMap::new()),
                unknown_items: Mutex::new(HashSet::new()),
                write_failures: Mutex::new(HashMap::new()),
                fail_reads: AtomicBool::new(false),
                fail_add_items: AtomicBool::new(false),
                fail_writes: AtomicBool::new(false),
                read_delay: Mutex::new(None),
                write_delay: Mutex::new(None),
                read_count: AtomicU64::new(0),
            }),
            connected: AtomicBool::new(false),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
            groups: Mutex::new(Vec::new()),
            connect_failures: AtomicU32::new(0),
            fail_add_group: AtomicBool::new(false),
            keep_alive_on_dispose: AtomicBool::new(false),
            connect_count: AtomicU64::new(0),
            disconnect_count: AtomicU64::new(0),
            dispose_count: AtomicU64::new(0),
        })
    }

    // =========================================================================
    // Scripting
    // =========================================================================

    /// Sets a good value stamped with the server clock.
    pub fn set_value(&self, item_id: impl Into<ItemId>, value: impl Into<Variant>) {
        let state = ItemState::good(value, self.state.clock.now());
        self.set_state(item_id, state);
    }

    /// Sets the full state of an item.
    pub fn set_state(&self, item_id: impl Into<ItemId>, state: ItemState) {
        self.state.values.lock().insert(item_id.into(), state);
    }

    /// Returns the stored state of an item.
    pub fn state_of(&self, item_id: impl Into<ItemId>) -> ItemState {
        self.state.state_of(&item_id.into())
    }

    /// Makes the server reject an item id on add.
    pub fn reject_item(&self, item_id: impl Into<ItemId>) {
        self.state.unknown_items.lock().insert(item_id.into());
    }

    /// Makes writes to an item fail with `code`.
    pub fn fail_write_of(&self, item_id: impl Into<ItemId>, code: ErrorCode) {
        self.state.write_failures.lock().insert(item_id.into(), code);
    }

    /// Makes the next `count` connect calls fail.
    pub fn fail_connects(&self, count: u32) {
        self.connect_failures.store(count, Ordering::SeqCst);
    }

    /// Makes every read fail at the transport level.
    pub fn fail_reads(&self, fail: bool) {
        self.state.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Makes every `add_items` call fail at the transport level.
    pub fn fail_add_items(&self, fail: bool) {
        self.state.fail_add_items.store(fail, Ordering::SeqCst);
    }

    /// Makes every write fail at the transport level.
    pub fn fail_writes(&self, fail: bool) {
        self.state.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes `add_group` fail.
    pub fn fail_add_group(&self, fail: bool) {
        self.fail_add_group.store(fail, Ordering::SeqCst);
    }

    /// Delays every read by `delay`.
    pub fn set_read_delay(&self, delay: Option<Duration>) {
        *self.state.read_delay.lock() = delay;
    }

    /// Delays the reply of every write by `delay`. The write itself is
    /// applied before the delay.
    pub fn set_write_delay(&self, delay: Option<Duration>) {
        *self.state.write_delay.lock() = delay;
    }

    /// When set, `dispose` is counted but leaves the connection up.
    pub fn keep_alive_on_dispose(&self, keep: bool) {
        self.keep_alive_on_dispose.store(keep, Ordering::SeqCst);
    }

    /// Simulates a connection loss detected by the channel.
    pub fn drop_connection(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.notify(false);
        }
    }

    /// Simulates a connection established outside any controller.
    pub fn force_connected(&self) {
        if !self.connected.swap(true, Ordering::SeqCst) {
            self.notify(true);
        }
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Returns every group created so far, including removed ones.
    pub fn groups(&self) -> Vec<Arc<MockGroup>> {
        self.groups.lock().clone()
    }

    /// Returns the most recently created group.
    pub fn last_group(&self) -> Option<Arc<MockGroup>> {
        self.groups.lock().last().cloned()
    }

    /// Returns the number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Returns the number of connect calls.
    pub fn connect_count(&self) -> u64 {
        self.connect_count.load(Ordering::SeqCst)
    }

    /// Returns the number of disconnect calls.
    pub fn disconnect_count(&self) -> u64 {
        self.disconnect_count.load(Ordering::SeqCst)
    }

    /// Returns the number of dispose calls.
    pub fn dispose_count(&self) -> u64 {
        self.dispose_count.load(Ordering::SeqCst)
    }

    /// Returns the number of read calls across all groups.
    pub fn read_count(&self) -> u64 {
        self.state.read_count.load(Ordering::SeqCst)
    }

    fn notify(&self, connected: bool) {
        let listeners: Vec<Arc<dyn ConnectionStateListener>> =
            self.listeners.lock().iter().map(|(_, l)| Arc::clone(l)).collect();
        for listener in listeners {
            listener.connection_state_changed(connected);
        }
    }
}

impl std::fmt::Debug for MockServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockServer")
            .field("name", &self.name)
            .field("connected", &self.is_connected())
            .field("listeners", &self.listener_count())
            .field("groups", &self.groups.lock().len())
            .finish()
    }
}

#[async_trait]
impl RemoteServer for MockServer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> OpcDaResult<()> {
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        let remaining = self.connect_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.connect_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(OpcDaError::connection(opcda_core::ConnectionError::connect_failed(
                self.name.clone(),
                "scripted failure",
            )));
        }
        self.force_connected();
        Ok(())
    }

    async fn disconnect(&self) -> OpcDaResult<()> {
        self.disconnect_count.fetch_add(1, Ordering::SeqCst);
        self.drop_connection();
        Ok(())
    }

    async fn dispose(&self) -> OpcDaResult<()> {
        self.dispose_count.fetch_add(1, Ordering::SeqCst);
        if !self.keep_alive_on_dispose.load(Ordering::SeqCst) {
            self.drop_connection();
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn add_group(
        &self,
        name: &str,
        active: bool,
        update_rate: Duration,
    ) -> OpcDaResult<Arc<dyn RemoteGroup>> {
        if !self.is_connected() {
            return Err(OpcDaError::not_connected());
        }
        if self.fail_add_group.load(Ordering::SeqCst) {
            return Err(OpcDaError::group(opcda_core::GroupError::create_failed(
                name,
                "scripted failure",
            )));
        }
        let group = Arc::new(MockGroup::new(name, active, update_rate, Arc::clone(&self.state)));
        self.groups.lock().push(Arc::clone(&group));
        Ok(group)
    }

    fn add_state_listener(&self, listener: Arc<dyn ConnectionStateListener>) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst));
        self.listeners.lock().push((id, listener));
        id
    }

    fn remove_state_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }
}

// =============================================================================
// MockGroup
// =============================================================================

/// A recorded call on a [`MockGroup`].
#[derive(Debug, Clone, PartialEq)]
pub enum GroupCall {
    /// `add_items` with the requested ids.
    AddItems(Vec<ItemId>),
    /// `remove_items` with the number of handles.
    RemoveItems(usize),
    /// `set_state` with the active flag.
    SetState(bool),
    /// `read` with the number of handles.
    Read(usize),
    /// `write` with the written ids.
    Write(Vec<ItemId>),
    /// `attach`.
    Attach,
    /// `EventHandle::detach`.
    Detach,
    /// `refresh`.
    Refresh(DataSource),
    /// `remove`.
    Remove,
}

type SinkSlot = Arc<Mutex<Option<Arc<dyn GroupEventSink>>>>;

/// Scriptable [`RemoteGroup`] created by [`MockServer::add_group`].
pub struct MockGroup {
    name: String,
    state: Arc<ServerState>,
    active: AtomicBool,
    update_rate: Mutex<Duration>,
    items: Mutex<HashMap<ServerHandle, ItemDefinition>>,
    next_handle: AtomicU32,
    sink: SinkSlot,
    calls: Arc<Mutex<Vec<GroupCall>>>,
    removed: AtomicBool,
}

impl MockGroup {
    fn new(name: &str, active: bool, update_rate: Duration, state: Arc<ServerState>) -> Self {
        Self {
            name: name.to_string(),
            state,
            active: AtomicBool::new(active),
            update_rate: Mutex::new(update_rate),
            items: Mutex::new(HashMap::new()),
            next_handle: AtomicU32::new(100),
            sink: Arc::new(Mutex::new(None)),
            calls: Arc::new(Mutex::new(Vec::new())),
            removed: AtomicBool::new(false),
        }
    }

    /// Returns the recorded calls.
    pub fn calls(&self) -> Vec<GroupCall> {
        self.calls.lock().clone()
    }

    /// Returns `true` if a call matching `predicate` was recorded.
    pub fn was_called(&self, predicate: impl Fn(&GroupCall) -> bool) -> bool {
        self.calls.lock().iter().any(predicate)
    }

    /// Returns the ids currently added to the group, sorted.
    pub fn item_ids(&self) -> Vec<ItemId> {
        let mut ids: Vec<ItemId> = self.items.lock().values().map(|d| d.item_id.clone()).collect();
        ids.sort();
        ids
    }

    /// Returns the client handle the engine assigned to an item.
    pub fn client_handle_of(&self, item_id: &str) -> Option<ClientHandle> {
        self.items
            .lock()
            .values()
            .find(|d| d.item_id.as_str() == item_id)
            .map(|d| d.client_handle)
    }

    /// Returns `true` while an event sink is attached.
    pub fn has_sink(&self) -> bool {
        self.sink.lock().is_some()
    }

    /// Returns `true` once the group was removed.
    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::SeqCst)
    }

    /// Returns the group's active flag.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Returns the group's update rate.
    pub fn update_rate(&self) -> Duration {
        *self.update_rate.lock()
    }

    /// Stores new values and pushes them as one data-change batch.
    ///
    /// Ids not in the group are skipped.
    pub async fn emit_values(&self, updates: &[(&str, Variant)]) {
        let mut results = Vec::new();
        for (id, value) in updates {
            let state = ItemState::good(value.clone(), self.state.clock.now());
            self.state.values.lock().insert(ItemId::new(*id), state.clone());
            if let Some(handle) = self.client_handle_of(id) {
                results.push(value_result(handle, &state));
            }
        }
        self.emit(DataChangeBatch::new(results)).await;
    }

    /// Pushes a raw data-change batch to the attached sink.
    pub async fn emit(&self, batch: DataChangeBatch) {
        let sink = self.sink.lock().clone();
        if let Some(sink) = sink {
            sink.data_change(batch).await;
        }
    }

    fn record(&self, call: GroupCall) {
        self.calls.lock().push(call);
    }

    fn lookup(&self, handle: &ServerHandle) -> Option<ItemDefinition> {
        self.items.lock().get(handle).cloned()
    }
}

fn value_result(handle: ClientHandle, state: &ItemState) -> ItemValueResult {
    ItemValueResult {
        client_handle: handle,
        error_code: state.error_code,
        value: state.value.clone(),
        timestamp: state.timestamp,
        quality: state.quality,
    }
}

impl std::fmt::Debug for MockGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockGroup")
            .field("name", &self.name)
            .field("items", &self.items.lock().len())
            .field("removed", &self.is_removed())
            .finish()
    }
}

#[async_trait]
impl RemoteGroup for MockGroup {
    fn name(&self) -> &str {
        &self.name
    }

    async fn add_items(&self, items: &[ItemDefinition]) -> OpcDaResult<Vec<ItemAddResult>> {
        self.record(GroupCall::AddItems(items.iter().map(|d| d.item_id.clone()).collect()));
        if self.state.fail_add_items.load(Ordering::SeqCst) {
            return Err(OpcDaError::transport("add_items failed"));
        }

        let unknown = self.state.unknown_items.lock().clone();
        let mut results = Vec::with_capacity(items.len());
        for definition in items {
            if unknown.contains(&definition.item_id) {
                results.push(ItemAddResult::failed(ErrorCode::OPC_E_UNKNOWNITEMID));
                continue;
            }
            let handle = ServerHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
            self.items.lock().insert(handle, definition.clone());
            results.push(ItemAddResult::ok(handle));
        }
        Ok(results)
    }

    async fn remove_items(&self, handles: &[ServerHandle]) -> OpcDaResult<Vec<ErrorCode>> {
        self.record(GroupCall::RemoveItems(handles.len()));
        let mut items = self.items.lock();
        Ok(handles
            .iter()
            .map(|h| match items.remove(h) {
                Some(_) => ErrorCode::S_OK,
                None => ErrorCode::OPC_E_INVALIDHANDLE,
            })
            .collect())
    }

    async fn set_state(&self, active: bool, update_rate: Option<Duration>) -> OpcDaResult<()> {
        self.record(GroupCall::SetState(active));
        self.active.store(active, Ordering::SeqCst);
        if let Some(rate) = update_rate {
            *self.update_rate.lock() = rate;
        }
        Ok(())
    }

    async fn read(&self, _source: DataSource, handles: &[ServerHandle]) -> OpcDaResult<Vec<ItemState>> {
        self.record(GroupCall::Read(handles.len()));
        self.state.read_count.fetch_add(1, Ordering::SeqCst);

        let delay = *self.state.read_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.state.fail_reads.load(Ordering::SeqCst) {
            return Err(OpcDaError::connection_lost("read failed"));
        }

        Ok(handles
            .iter()
            .map(|h| match self.lookup(h) {
                Some(definition) => self.state.state_of(&definition.item_id),
                None => ItemState::failed(ErrorCode::OPC_E_INVALIDHANDLE),
            })
            .collect())
    }

    async fn write(&self, values: &[(ServerHandle, Variant)]) -> OpcDaResult<Vec<ErrorCode>> {
        let mut ids = Vec::with_capacity(values.len());
        let mut codes = Vec::with_capacity(values.len());
        for (handle, value) in values {
            let Some(definition) = self.lookup(handle) else {
                codes.push(ErrorCode::OPC_E_INVALIDHANDLE);
                continue;
            };
            ids.push(definition.item_id.clone());
            if let Some(code) = self.state.write_failures.lock().get(&definition.item_id) {
                codes.push(*code);
                continue;
            }
            codes.push(ErrorCode::S_OK);
            if !self.state.fail_writes.load(Ordering::SeqCst) {
                let state = ItemState::new(
                    ErrorCode::S_OK,
                    value.clone(),
                    Some(self.state.clock.now()),
                    Quality::GOOD,
                );
                self.state.values.lock().insert(definition.item_id, state);
            }
        }
        self.record(GroupCall::Write(ids));

        let delay = *self.state.write_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.state.fail_writes.load(Ordering::SeqCst) {
            return Err(OpcDaError::connection_lost("write failed"));
        }
        Ok(codes)
    }

    async fn attach(&self, sink: Arc<dyn GroupEventSink>) -> OpcDaResult<Box<dyn EventHandle>> {
        self.record(GroupCall::Attach);
        *self.sink.lock() = Some(sink);
        Ok(Box::new(MockEventHandle {
            sink: Arc::clone(&self.sink),
            calls: Arc::clone(&self.calls),
        }))
    }

    async fn refresh(&self, source: DataSource) -> OpcDaResult<()> {
        self.record(GroupCall::Refresh(source));
        let results: Vec<ItemValueResult> = {
            let items = self.items.lock();
            items
                .values()
                .map(|d| value_result(d.client_handle, &self.state.state_of(&d.item_id)))
                .collect()
        };
        let sink = self.sink.lock().clone();
        if let Some(sink) = sink {
            let mut batch = DataChangeBatch::new(results);
            batch.transaction_id = 1;
            sink.read_complete(batch).await;
        }
        Ok(())
    }

    async fn remove(&self) -> OpcDaResult<()> {
        self.record(GroupCall::Remove);
        self.removed.store(true, Ordering::SeqCst);
        self.items.lock().clear();
        Ok(())
    }
}

struct MockEventHandle {
    sink: SinkSlot,
    calls: Arc<Mutex<Vec<GroupCall>>>,
}

#[async_trait]
impl EventHandle for MockEventHandle {
    async fn detach(&self) -> OpcDaResult<()> {
        self.calls.lock().push(GroupCall::Detach);
        *self.sink.lock() = None;
        Ok(())
    }
}

// =============================================================================
// Recorders
// =============================================================================

/// Item callback that records every update.
#[derive(Debug, Clone, Default)]
pub struct RecordingCallback {
    updates: Arc<Mutex<Vec<(ItemId, ItemState)>>>,
}

impl RecordingCallback {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all recorded updates.
    pub fn updates(&self) -> Vec<(ItemId, ItemState)> {
        self.updates.lock().clone()
    }

    /// Returns the number of recorded updates.
    pub fn count(&self) -> usize {
        self.updates.lock().len()
    }

    /// Returns the number of updates for one item.
    pub fn count_for(&self, item_id: &str) -> usize {
        self.updates.lock().iter().filter(|(id, _)| id.as_str() == item_id).count()
    }

    /// Returns the values delivered for one item, in order.
    pub fn values_for(&self, item_id: &str) -> Vec<Variant> {
        self.updates
            .lock()
            .iter()
            .filter(|(id, _)| id.as_str() == item_id)
            .map(|(_, s)| s.value.clone())
            .collect()
    }

    /// Returns the last state delivered for one item.
    pub fn last_for(&self, item_id: &str) -> Option<ItemState> {
        self.updates
            .lock()
            .iter()
            .rev()
            .find(|(id, _)| id.as_str() == item_id)
            .map(|(_, s)| s.clone())
    }
}

impl ItemCallback for RecordingCallback {
    fn on_update(&self, item_id: &ItemId, state: &ItemState) {
        self.updates.lock().push((item_id.clone(), state.clone()));
    }
}

/// State listener that records engine notifications.
#[derive(Debug, Default)]
pub struct RecordingStateListener {
    transitions: Mutex<Vec<bool>>,
    errors: Mutex<Vec<String>>,
    cleared: AtomicU64,
}

impl RecordingStateListener {
    /// Creates an empty recorder.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns the active-flag transitions.
    pub fn transitions(&self) -> Vec<bool> {
        self.transitions.lock().clone()
    }

    /// Returns the reported error messages.
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }

    /// Returns how often an error was reported as cleared.
    pub fn cleared_count(&self) -> u64 {
        self.cleared.load(Ordering::SeqCst)
    }
}

impl AccessStateListener for RecordingStateListener {
    fn state_changed(&self, active: bool) {
        self.transitions.lock().push(active);
    }

    fn error_occurred(&self, error: &OpcDaError) {
        self.errors.lock().push(error.to_string());
    }

    fn error_cleared(&self) {
        self.cleared.fetch_add(1, Ordering::SeqCst);
    }
}
