// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Automatic reconnection.
//!
//! # State machine
//!
//! ```text
//!                 connect()
//!   Disabled ─────────────────► Disconnected ◄──────────────┐
//!      ▲                          │      ▲                  │ connect failed
//!      │ disconnect()             │      │ connected=false  │
//!      │ (from any state)         ▼      │                  │
//!      │                       Waiting ──┼──► Connecting ───┘
//!      │                                 │        │
//!      │                                 │        │ connected=true
//!      │                                 │        ▼
//!      └─────────────────────────────────┴── Connected
//! ```
//!
//! Each attempt runs on its own task; at most one attempt is in flight.
//! A failed attempt is retried after the configured delay for as long as
//! the connection is requested. `Connected` is only entered through the
//! server's connection state notification, never because `connect()`
//! returned.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use opcda_core::{ConnectionStateListener, ListenerId, RemoteServer};

use crate::settings::ReconnectSettings;

const STATE_CHANNEL_CAPACITY: usize = 64;

// =============================================================================
// ReconnectState
// =============================================================================

/// State of a [`ReconnectController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectState {
    /// No connection requested.
    #[default]
    Disabled,
    /// Connection requested but not established.
    Disconnected,
    /// Waiting for the delay before the next attempt.
    Waiting,
    /// A connect call is in progress.
    Connecting,
    /// The server reported the connection as established.
    Connected,
}

impl ReconnectState {
    /// Returns `true` if a connection is requested.
    #[inline]
    pub const fn is_requested(&self) -> bool {
        !matches!(self, Self::Disabled)
    }

    /// Returns `true` when connected.
    #[inline]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ReconnectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "Disabled"),
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Waiting => write!(f, "Waiting"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}

// =============================================================================
// ReconnectController
// =============================================================================

/// Keeps a server connected while a connection is requested.
///
/// Cloning is cheap; clones share the same controller.
#[derive(Clone)]
pub struct ReconnectController {
    inner: Arc<Inner>,
}

struct StateCell {
    state: ReconnectState,
    /// Cancelled when the current connection request is withdrawn.
    request: CancellationToken,
}

struct Inner {
    server: Arc<dyn RemoteServer>,
    delay: Duration,
    cell: Mutex<StateCell>,
    events: broadcast::Sender<ReconnectState>,
    running: AtomicBool,
    listener_id: Mutex<Option<ListenerId>>,
    runtime: Handle,
}

impl ReconnectController {
    /// Creates a controller and registers it with the server.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn new(server: Arc<dyn RemoteServer>, settings: ReconnectSettings) -> Self {
        let (events, _) = broadcast::channel(STATE_CHANNEL_CAPACITY);
        let delay = ReconnectSettings::new(settings.delay).delay;
        let inner = Arc::new(Inner {
            server,
            delay,
            cell: Mutex::new(StateCell {
                state: ReconnectState::Disabled,
                request: CancellationToken::new(),
            }),
            events,
            running: AtomicBool::new(false),
            listener_id: Mutex::new(None),
            runtime: Handle::current(),
        });

        let listener = Arc::new(ControllerListener {
            inner: Arc::downgrade(&inner),
        });
        let id = inner.server.add_state_listener(listener);
        *inner.listener_id.lock() = Some(id);

        Self { inner }
    }

    /// Returns the current state.
    pub fn state(&self) -> ReconnectState {
        self.inner.cell.lock().state
    }

    /// Subscribes to state transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<ReconnectState> {
        self.inner.events.subscribe()
    }

    /// Returns the delay between attempts.
    pub fn delay(&self) -> Duration {
        self.inner.delay
    }

    /// Returns the server handle.
    pub fn server(&self) -> &Arc<dyn RemoteServer> {
        &self.inner.server
    }

    /// Requests a connection and starts an attempt immediately.
    ///
    /// Does nothing if a connection is already requested.
    pub fn connect(&self) {
        {
            let mut cell = self.inner.cell.lock();
            if cell.state.is_requested() {
                return;
            }
            cell.request = CancellationToken::new();
            self.inner.transition(&mut cell, ReconnectState::Disconnected);
        }
        tracing::info!(server = %self.inner.server.name(), "Connection requested");
        self.inner.trigger_reconnect(false);
    }

    /// Withdraws the connection request and disconnects.
    ///
    /// A pending attempt is abandoned. Does nothing if no connection is
    /// requested.
    pub async fn disconnect(&self) {
        let request = {
            let mut cell = self.inner.cell.lock();
            if !cell.state.is_requested() {
                return;
            }
            self.inner.transition(&mut cell, ReconnectState::Disabled);
            cell.request.clone()
        };
        request.cancel();

        tracing::info!(server = %self.inner.server.name(), "Disconnect requested");
        if let Err(e) = self.inner.server.disconnect().await {
            tracing::warn!(server = %self.inner.server.name(), error = %e, "Disconnect failed");
        }
    }
}

impl fmt::Debug for ReconnectController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconnectController")
            .field("server", &self.inner.server.name())
            .field("state", &self.state())
            .field("delay", &self.inner.delay)
            .finish()
    }
}

impl Inner {
    fn transition(&self, cell: &mut StateCell, state: ReconnectState) {
        if cell.state == state {
            return;
        }
        tracing::debug!(
            server = %self.server.name(),
            from = %cell.state,
            to = %state,
            "Reconnect state changed"
        );
        cell.state = state;
        // No receivers is fine.
        let _ = self.events.send(state);
    }

    /// Moves to `state` unless the request was withdrawn.
    fn transition_if_requested(&self, state: ReconnectState) -> bool {
        let mut cell = self.cell.lock();
        if !cell.state.is_requested() {
            return false;
        }
        self.transition(&mut cell, state);
        true
    }

    fn trigger_reconnect(self: &Arc<Self>, wait: bool) {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::trace!(server = %self.server.name(), "Reconnect attempt already running");
            return;
        }

        let inner = Arc::clone(self);
        self.runtime.spawn(async move {
            let retry = inner.attempt(wait).await;
            inner.running.store(false, Ordering::Release);
            // A loss reported while this attempt was running found `running`
            // set and could not schedule its own retry.
            if retry || inner.is_disconnected() {
                inner.trigger_reconnect(true);
            }
        });
    }

    fn is_disconnected(&self) -> bool {
        self.cell.lock().state == ReconnectState::Disconnected
    }

    /// Runs one attempt. Returns `true` if another attempt should follow.
    async fn attempt(&self, wait: bool) -> bool {
        let request = self.cell.lock().request.clone();

        if wait {
            if !self.transition_if_requested(ReconnectState::Waiting) {
                return false;
            }
            tracing::info!(
                server = %self.server.name(),
                delay_ms = self.delay.as_millis() as u64,
                "Waiting before reconnect"
            );
            tokio::select! {
                biased;
                _ = request.cancelled() => {}
                _ = tokio::time::sleep(self.delay) => {}
            }
        }

        if !self.transition_if_requested(ReconnectState::Connecting) {
            tracing::debug!(server = %self.server.name(), "Reconnect abandoned");
            return false;
        }

        match self.server.connect().await {
            Ok(()) => {
                tracing::debug!(server = %self.server.name(), "Connect call returned");
                false
            }
            Err(e) => {
                tracing::info!(server = %self.server.name(), error = %e, "Connect attempt failed");
                self.transition_if_requested(ReconnectState::Disconnected)
            }
        }
    }

    fn on_connection_state(self: &Arc<Self>, connected: bool) {
        if connected {
            let requested = {
                let mut cell = self.cell.lock();
                let requested = cell.state.is_requested();
                if requested {
                    self.transition(&mut cell, ReconnectState::Connected);
                }
                requested
            };
            if requested {
                tracing::info!(server = %self.server.name(), "Connected");
            } else {
                tracing::warn!(server = %self.server.name(), "Unexpected connection, disconnecting");
                let server = Arc::clone(&self.server);
                self.runtime.spawn(async move {
                    if let Err(e) = server.disconnect().await {
                        tracing::warn!(server = %server.name(), error = %e, "Forced disconnect failed");
                    }
                });
            }
        } else {
            if !self.transition_if_requested(ReconnectState::Disconnected) {
                return;
            }
            tracing::warn!(server = %self.server.name(), "Connection lost");
            self.trigger_reconnect(true);
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(id) = self.listener_id.lock().take() {
            self.server.remove_state_listener(id);
        }
    }
}

struct ControllerListener {
    inner: Weak<Inner>,
}

impl ConnectionStateListener for ControllerListener {
    fn connection_state_changed(&self, connected: bool) {
        if let Some(inner) = self.inner.upgrade() {
            inner.on_connection_state(connected);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_state() {
        assert!(!ReconnectState::Disabled.is_requested());
        assert!(ReconnectState::Waiting.is_requested());
        assert!(ReconnectState::Connected.is_connected());
        assert_eq!(ReconnectState::Connecting.to_string(), "Connecting");
        assert_eq!(ReconnectState::default(), ReconnectState::Disabled);
    }
}
