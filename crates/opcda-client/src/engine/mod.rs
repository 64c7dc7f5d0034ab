// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Subscription and data-delivery engine.
//!
//! # Lifecycle
//!
//! ```text
//!            bind()                 connected=true
//! Unbound ──────────► Bound-Inactive ──────────────► Bound-Active
//!    ▲                    │    ▲                         │
//!    └────── unbind() ────┘    └──── connected=false ────┘
//! ```
//!
//! Connection notifications from the server are queued to a lifecycle
//! worker task, one per bound engine, which runs `start`/`stop` in order.
//!
//! # Item flow
//!
//! ```text
//! add_item ─► desired ─► realize ─► realized ─► poll / event ─► dispatch ─► callback
//!                                                     write ──►────┘
//! ```
//!
//! Every update passes through a single change-detection step: the first
//! state after (re)subscription is always delivered, later states only when
//! they differ from the cached one. Callbacks of one engine run one at a
//! time, in the order their states entered the cache.

mod event;
mod listener;
mod polling;
mod registry;
mod strategy;

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use opcda_core::{
    ConnectionStateListener, ErrorCode, ItemError, ItemId, ItemState, ListenerId, OpcDaError,
    OpcDaResult, OperationError, Quality, RemoteServer, Variant,
};

pub use listener::{AccessStateListener, ChannelCallback, ItemCallback, ItemUpdate};

use crate::clock::{Clock, SystemClock};
use crate::group::{Group, Item};
use crate::settings::{DeliveryMode, EngineSettings};
use registry::{Generation, ItemRegistry};
use strategy::DeliveryStrategy;

// =============================================================================
// AccessEngine
// =============================================================================

/// Keeps a set of desired items subscribed on a server and delivers their
/// state changes to callbacks.
///
/// Cloning is cheap; clones share the same engine.
///
/// # Example
///
/// ```rust,ignore
/// let engine = AccessEngine::builder(server.clone())
///     .settings(EngineSettings::polling("plant").with_update_period(Duration::from_millis(500)))
///     .build()?;
///
/// engine.add_item("Random.Int4", |id: &ItemId, state: &ItemState| {
///     println!("{id} = {}", state.value);
/// }).await?;
/// engine.bind().await;
/// ```
#[derive(Clone)]
pub struct AccessEngine {
    core: Arc<EngineCore>,
}

impl AccessEngine {
    /// Creates an engine with the given settings and the system clock.
    pub fn new(server: Arc<dyn RemoteServer>, settings: EngineSettings) -> OpcDaResult<Self> {
        Self::builder(server).settings(settings).build()
    }

    /// Creates a builder.
    pub fn builder(server: Arc<dyn RemoteServer>) -> AccessEngineBuilder {
        AccessEngineBuilder::new(server)
    }

    /// Returns the engine name.
    pub fn name(&self) -> &str {
        &self.core.settings.name
    }

    /// Returns the engine settings.
    pub fn settings(&self) -> &EngineSettings {
        &self.core.settings
    }

    /// Returns the delivery mode.
    pub fn mode(&self) -> DeliveryMode {
        self.core.strategy.mode()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Registers for connection state notifications.
    ///
    /// Starts the engine right away if the server is already connected.
    /// Calling `bind` on a bound engine does nothing.
    pub async fn bind(&self) {
        self.core.bind().await;
    }

    /// Stops the engine if active and deregisters from the server.
    pub async fn unbind(&self) {
        self.core.unbind().await;
    }

    /// Creates the server group and realizes all desired items.
    ///
    /// Normally driven by connection notifications after [`bind`](Self::bind).
    pub async fn start(&self) -> OpcDaResult<()> {
        self.core.start().await
    }

    /// Unrealizes all items and removes the server group.
    pub async fn stop(&self) {
        self.core.stop().await;
    }

    // =========================================================================
    // Items
    // =========================================================================

    /// Adds an item to the desired set.
    ///
    /// Adding an id that is already desired does nothing. While active the
    /// item is realized immediately; a server rejection is logged and the
    /// item stays desired.
    pub async fn add_item<C>(&self, item_id: impl Into<ItemId>, callback: C) -> OpcDaResult<()>
    where
        C: ItemCallback + 'static,
    {
        self.core.add_item(item_id.into(), Arc::new(callback)).await
    }

    /// Adds an item with a shared callback.
    pub async fn add_item_shared(
        &self,
        item_id: impl Into<ItemId>,
        callback: Arc<dyn ItemCallback>,
    ) -> OpcDaResult<()> {
        self.core.add_item(item_id.into(), callback).await
    }

    /// Removes an item. Returns `false` if it was not desired.
    pub async fn remove_item(&self, item_id: impl Into<ItemId>) -> bool {
        self.core.remove_item(&item_id.into()).await
    }

    /// Writes a value to a realized item.
    ///
    /// On success the written value is delivered to the item's callback
    /// through the usual change detection.
    pub async fn write(&self, item_id: impl Into<ItemId>, value: impl Into<Variant>) -> OpcDaResult<()> {
        self.core.write(&item_id.into(), value.into()).await
    }

    /// Registers a state listener.
    pub fn add_state_listener(&self, listener: Arc<dyn AccessStateListener>) {
        self.core.listeners.write().push(listener);
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Returns `true` while bound.
    pub fn is_bound(&self) -> bool {
        self.core.binding.lock().is_some()
    }

    /// Returns `true` while active.
    pub fn is_active(&self) -> bool {
        self.core.is_active()
    }

    /// Returns the desired item ids, sorted.
    pub fn desired_items(&self) -> Vec<ItemId> {
        let mut ids = self.core.registry.lock().desired_ids();
        ids.sort();
        ids
    }

    /// Returns the realized item ids, sorted.
    pub fn realized_items(&self) -> Vec<ItemId> {
        let mut ids = self.core.registry.lock().realized_ids();
        ids.sort();
        ids
    }

    /// Returns the last dispatched state of a realized item.
    pub fn cached_state(&self, item_id: &ItemId) -> Option<ItemState> {
        self.core.registry.lock().cached_state(item_id)
    }

    /// Returns the current server group, if active.
    pub fn group(&self) -> Option<Arc<Group>> {
        self.core.current_group()
    }

    /// Subscribes to changes of the active flag.
    pub fn subscribe_active(&self) -> watch::Receiver<bool> {
        self.core.active.subscribe()
    }
}

impl fmt::Debug for AccessEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessEngine")
            .field("name", &self.name())
            .field("mode", &self.mode())
            .field("bound", &self.is_bound())
            .field("active", &self.is_active())
            .finish()
    }
}

// =============================================================================
// AccessEngineBuilder
// =============================================================================

/// Builder for [`AccessEngine`].
pub struct AccessEngineBuilder {
    server: Arc<dyn RemoteServer>,
    settings: EngineSettings,
    clock: Arc<dyn Clock>,
    listeners: Vec<Arc<dyn AccessStateListener>>,
}

impl AccessEngineBuilder {
    /// Creates a builder with default settings.
    pub fn new(server: Arc<dyn RemoteServer>) -> Self {
        Self {
            server,
            settings: EngineSettings::default(),
            clock: Arc::new(SystemClock),
            listeners: Vec::new(),
        }
    }

    /// Sets the engine settings.
    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the clock used to timestamp written values.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Adds a state listener.
    pub fn state_listener(mut self, listener: Arc<dyn AccessStateListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Builds the engine.
    pub fn build(self) -> OpcDaResult<AccessEngine> {
        self.settings.validate()?;
        let (active, _) = watch::channel(false);
        let core = EngineCore {
            strategy: strategy::for_settings(&self.settings),
            settings: self.settings,
            server: self.server,
            clock: self.clock,
            registry: Mutex::new(ItemRegistry::default()),
            delivery: Mutex::new(()),
            lifecycle: tokio::sync::Mutex::new(()),
            group: RwLock::new(None),
            active,
            listeners: RwLock::new(self.listeners),
            binding: Mutex::new(None),
        };
        Ok(AccessEngine {
            core: Arc::new(core),
        })
    }
}

// =============================================================================
// EngineCore
// =============================================================================

struct Binding {
    listener_id: ListenerId,
    cancel: CancellationToken,
    worker: JoinHandle<()>,
}

/// Shared engine state.
pub(crate) struct EngineCore {
    settings: EngineSettings,
    server: Arc<dyn RemoteServer>,
    clock: Arc<dyn Clock>,
    strategy: Box<dyn DeliveryStrategy>,
    /// Item maps. Never held across an await or a callback.
    registry: Mutex<ItemRegistry>,
    /// Held from change detection through the callback, so callbacks see
    /// states in cache order.
    delivery: Mutex<()>,
    /// Serializes start/stop.
    lifecycle: tokio::sync::Mutex<()>,
    /// Current group; `Some` exactly while active.
    group: RwLock<Option<Arc<Group>>>,
    active: watch::Sender<bool>,
    listeners: RwLock<Vec<Arc<dyn AccessStateListener>>>,
    binding: Mutex<Option<Binding>>,
}

impl EngineCore {
    pub(crate) fn name(&self) -> &str {
        &self.settings.name
    }

    pub(crate) fn is_active(&self) -> bool {
        self.group.read().is_some()
    }

    fn current_group(&self) -> Option<Arc<Group>> {
        self.group.read().clone()
    }

    // =========================================================================
    // Binding
    // =========================================================================

    async fn bind(self: &Arc<Self>) {
        {
            let mut binding = self.binding.lock();
            if binding.is_some() {
                return;
            }
            let (tx, rx) = mpsc::unbounded_channel();
            let listener_id = self
                .server
                .add_state_listener(Arc::new(EngineConnectionListener { tx }));
            let cancel = CancellationToken::new();
            let worker = tokio::spawn(lifecycle_worker(Arc::downgrade(self), rx, cancel.clone()));
            *binding = Some(Binding {
                listener_id,
                cancel,
                worker,
            });
        }

        tracing::info!(engine = %self.name(), server = %self.server.name(), "Engine bound");

        if self.server.is_connected() {
            self.start_or_fail().await;
        }
    }

    async fn unbind(self: &Arc<Self>) {
        let Some(binding) = self.binding.lock().take() else {
            return;
        };

        binding.cancel.cancel();
        if let Err(e) = binding.worker.await {
            if e.is_panic() {
                tracing::error!(engine = %self.name(), "Lifecycle worker panicked");
            }
        }

        self.stop().await;
        self.server.remove_state_listener(binding.listener_id);
        tracing::info!(engine = %self.name(), "Engine unbound");
    }

    async fn on_connection_state(self: &Arc<Self>, connected: bool) {
        tracing::debug!(engine = %self.name(), connected, "Connection state changed");
        if connected {
            if !self.is_active() {
                self.start_or_fail().await;
            }
        } else if self.is_active() {
            self.stop().await;
        }
    }

    async fn start_or_fail(self: &Arc<Self>) {
        if let Err(e) = self.start().await {
            self.handle_error(&e).await;
        }
    }

    // =========================================================================
    // Start / Stop
    // =========================================================================

    async fn start(self: &Arc<Self>) -> OpcDaResult<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.is_active() {
            return Ok(());
        }

        // Activated below once the initial items are added.
        let remote = self
            .server
            .add_group(
                self.settings.effective_group_name(),
                false,
                self.settings.update_period,
            )
            .await?;
        let group = Arc::new(Group::new(remote, self.settings.update_period));

        *self.group.write() = Some(Arc::clone(&group));
        self.set_active(true);
        tracing::info!(
            engine = %self.name(),
            group = %group.name(),
            mode = %self.strategy.mode(),
            update_period_ms = group.update_rate().as_millis() as u64,
            "Engine started"
        );

        self.realize_all(&group).await;
        group.set_active(true).await?;
        self.strategy.on_start(self, &group).await
    }

    async fn stop(self: &Arc<Self>) {
        let _lifecycle = self.lifecycle.lock().await;
        let Some(group) = self.current_group() else {
            return;
        };

        self.strategy.on_stop(self, &group).await;
        self.unrealize_all(&group).await;

        *self.group.write() = None;
        self.set_active(false);

        if let Err(e) = group.remove().await {
            tracing::debug!(
                engine = %self.name(),
                group = %group.name(),
                error = %e,
                "Failed to remove group"
            );
        }
        tracing::info!(engine = %self.name(), "Engine stopped");
    }

    fn set_active(&self, active: bool) {
        self.active.send_replace(active);
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            if panic::catch_unwind(AssertUnwindSafe(|| listener.state_changed(active))).is_err() {
                tracing::error!(engine = %self.name(), "State listener panicked");
            }
        }
    }

    // =========================================================================
    // Realization
    // =========================================================================

    async fn realize_all(&self, group: &Group) {
        let (ids, generation) = self.registry.lock().begin_realize_all();
        if ids.is_empty() {
            return;
        }
        self.realize(group, ids, generation).await;
    }

    async fn realize(&self, group: &Group, ids: Vec<ItemId>, generation: Generation) {
        match group.add_items(&ids).await {
            Ok(outcome) => {
                for (item_id, code) in &outcome.failed {
                    let error = OpcDaError::item(ItemError::add_failed(item_id.clone(), *code));
                    error.log(self.name());
                }
                let failed = outcome.failed.len();
                let orphans = self
                    .registry
                    .lock()
                    .complete_realize(generation, &ids, outcome.added);
                let realized = ids.len() - failed - orphans.len();
                self.discard(group, orphans).await;
                tracing::debug!(engine = %self.name(), realized, failed, "Items realized");
            }
            Err(e) => {
                self.registry.lock().cancel_realize(generation, &ids);
                e.log(self.name());
            }
        }
    }

    /// Removes items the server added after they stopped being wanted.
    async fn discard(&self, group: &Group, orphans: Vec<Item>) {
        if orphans.is_empty() {
            return;
        }
        let ids: Vec<ItemId> = orphans.iter().map(|item| item.item_id().clone()).collect();
        if let Err(e) = group.remove_items(&ids).await {
            tracing::debug!(engine = %self.name(), error = %e, "Failed to discard items");
        }
    }

    async fn unrealize_all(&self, group: &Group) {
        let items = self.registry.lock().unrealize_all();
        if let Err(e) = group.clear().await {
            tracing::debug!(
                engine = %self.name(),
                items = items.len(),
                error = %e,
                "Failed to clear group items"
            );
        }
    }

    // =========================================================================
    // Items
    // =========================================================================

    async fn add_item(&self, item_id: ItemId, callback: Arc<dyn ItemCallback>) -> OpcDaResult<()> {
        if item_id.is_empty() {
            return Err(OpcDaError::item(ItemError::invalid_id(
                item_id.as_str(),
                "item id cannot be empty",
            )));
        }

        let generation = {
            let mut registry = self.registry.lock();
            if !registry.desire(item_id.clone(), callback) {
                return Ok(());
            }
            if self.is_active() {
                registry.begin_realize(&item_id)
            } else {
                None
            }
        };
        tracing::debug!(engine = %self.name(), item_id = %item_id, "Item added");

        let Some(generation) = generation else {
            return Ok(());
        };
        match self.current_group() {
            Some(group) => self.realize(&group, vec![item_id], generation).await,
            None => self.registry.lock().cancel_realize(generation, &[item_id]),
        }
        Ok(())
    }

    async fn remove_item(&self, item_id: &ItemId) -> bool {
        let (was_desired, item) = self.registry.lock().remove(item_id);
        if !was_desired {
            return false;
        }

        if let (Some(item), Some(group)) = (item, self.current_group()) {
            if let Err(e) = group.remove_items(std::slice::from_ref(item.item_id())).await {
                tracing::warn!(
                    engine = %self.name(),
                    item_id = %item_id,
                    error = %e,
                    "Failed to remove item from group"
                );
            }
        }
        tracing::debug!(engine = %self.name(), item_id = %item_id, "Item removed");
        true
    }

    async fn write(&self, item_id: &ItemId, value: Variant) -> OpcDaResult<()> {
        if !self.settings.writable {
            return Err(OpcDaError::operation(OperationError::read_only(self.name())));
        }

        let item = self
            .registry
            .lock()
            .realized_item(item_id)
            .ok_or_else(|| OpcDaError::not_realized(item_id.clone()))?;

        let code = match item.write(value.clone()).await {
            Ok(code) => code,
            Err(e) => {
                if e.is_connection_loss() {
                    self.handle_error(&e).await;
                }
                return Err(e);
            }
        };

        if code.is_failure() {
            let error = OpcDaError::write_failed(item_id.clone(), code);
            error.log(self.name());
            return Err(error);
        }

        let state = ItemState::new(ErrorCode::S_OK, value, Some(self.clock.now()), Quality::GOOD);
        self.dispatch(&item, state);
        Ok(())
    }

    // =========================================================================
    // Dispatch and errors
    // =========================================================================

    /// Single delivery path for polled, pushed and written states.
    ///
    /// Deliveries of one engine are serialized: a callback never runs
    /// concurrently with another callback of the same engine.
    pub(crate) fn dispatch(&self, item: &Item, state: ItemState) {
        let _delivery = self.delivery.lock();
        let callback = self.registry.lock().observe(item, &state);
        let Some(callback) = callback else {
            return;
        };

        tracing::trace!(engine = %self.name(), item_id = %item.item_id(), state = %state, "Dispatching update");
        if panic::catch_unwind(AssertUnwindSafe(|| callback.on_update(item.item_id(), &state))).is_err() {
            tracing::error!(
                engine = %self.name(),
                item_id = %item.item_id(),
                "Item callback panicked"
            );
        }
    }

    /// Returns a snapshot of the realized items.
    pub(crate) fn realized_snapshot(&self) -> Vec<Item> {
        self.registry.lock().realized_items()
    }

    /// Reports a connection-level error and disposes the server handle.
    ///
    /// The resulting disconnect notification stops this engine and hands
    /// recovery to whoever drives reconnection.
    pub(crate) async fn handle_error(&self, error: &OpcDaError) {
        error.log(self.name());

        let listeners = self.listeners.read().clone();
        for listener in listeners {
            if panic::catch_unwind(AssertUnwindSafe(|| listener.error_occurred(error))).is_err() {
                tracing::error!(engine = %self.name(), "State listener panicked");
            }
        }

        tracing::warn!(engine = %self.name(), server = %self.server.name(), "Disposing server connection");
        if let Err(e) = self.server.dispose().await {
            tracing::warn!(engine = %self.name(), error = %e, "Failed to dispose server connection");
        }
    }

    pub(crate) fn notify_error_cleared(&self) {
        tracing::info!(engine = %self.name(), "Error condition cleared");
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            if panic::catch_unwind(AssertUnwindSafe(|| listener.error_cleared())).is_err() {
                tracing::error!(engine = %self.name(), "State listener panicked");
            }
        }
    }
}

// =============================================================================
// Connection listener
// =============================================================================

struct EngineConnectionListener {
    tx: mpsc::UnboundedSender<bool>,
}

impl ConnectionStateListener for EngineConnectionListener {
    fn connection_state_changed(&self, connected: bool) {
        // The worker is gone once the engine is unbound.
        let _ = self.tx.send(connected);
    }
}

async fn lifecycle_worker(
    core: Weak<EngineCore>,
    mut rx: mpsc::UnboundedReceiver<bool>,
    cancel: CancellationToken,
) {
    loop {
        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            message = rx.recv() => match message {
                Some(connected) => connected,
                None => break,
            },
        };
        let Some(core) = core.upgrade() else {
            break;
        };
        core.on_connection_state(connected).await;
    }
}
