// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Named connections and the registry that owns them.
//!
//! ```text
//! ConnectionRegistry
//! ├── "plant-a" ─► Connection { server, ReconnectController, [AccessEngine, ...] }
//! └── "plant-b" ─► Connection { ... }
//! ```
//!
//! The registry is a plain value owned by the application; there is no
//! process-wide connection table.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use uuid::Uuid;

use opcda_core::{ConfigurationError, OpcDaError, OpcDaResult, RemoteServer};

use crate::engine::AccessEngine;
use crate::reconnect::{ReconnectController, ReconnectState};
use crate::settings::{EngineSettings, ReconnectSettings};

// =============================================================================
// Connection
// =============================================================================

/// One server connection with its reconnect controller and engines.
pub struct Connection {
    id: Uuid,
    name: String,
    server: Arc<dyn RemoteServer>,
    reconnect: ReconnectController,
    engines: RwLock<Vec<AccessEngine>>,
}

impl Connection {
    /// Creates a connection.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn new(name: impl Into<String>, server: Arc<dyn RemoteServer>, settings: ReconnectSettings) -> Self {
        let reconnect = ReconnectController::new(Arc::clone(&server), settings);
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            server,
            reconnect,
            engines: RwLock::new(Vec::new()),
        }
    }

    /// Returns the unique connection id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the connection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the server handle.
    pub fn server(&self) -> &Arc<dyn RemoteServer> {
        &self.server
    }

    /// Returns the reconnect controller.
    pub fn reconnect(&self) -> &ReconnectController {
        &self.reconnect
    }

    /// Returns the reconnect state.
    pub fn state(&self) -> ReconnectState {
        self.reconnect.state()
    }

    /// Returns the attached engines.
    pub fn engines(&self) -> Vec<AccessEngine> {
        self.engines.read().clone()
    }

    /// Returns an attached engine by name.
    pub fn engine(&self, name: &str) -> Option<AccessEngine> {
        self.engines.read().iter().find(|e| e.name() == name).cloned()
    }

    /// Builds an engine for this connection's server, binds it and keeps it.
    pub async fn attach_engine(&self, settings: EngineSettings) -> OpcDaResult<AccessEngine> {
        if self.engine(&settings.name).is_some() {
            return Err(OpcDaError::configuration(ConfigurationError::new(
                "engines.name",
                format!("engine '{}' already attached to '{}'", settings.name, self.name),
            )));
        }
        let engine = AccessEngine::new(Arc::clone(&self.server), settings)?;
        engine.bind().await;
        self.engines.write().push(engine.clone());

        tracing::info!(connection = %self.name, engine = %engine.name(), "Engine attached");
        Ok(engine)
    }

    /// Unbinds and drops an engine. Returns `false` if unknown.
    pub async fn detach_engine(&self, name: &str) -> bool {
        let engine = {
            let mut engines = self.engines.write();
            let Some(pos) = engines.iter().position(|e| e.name() == name) else {
                return false;
            };
            engines.remove(pos)
        };
        engine.unbind().await;
        true
    }

    /// Requests the connection.
    pub fn open(&self) {
        tracing::info!(connection = %self.name, id = %self.id, server = %self.server.name(), "Opening connection");
        self.reconnect.connect();
    }

    /// Unbinds all engines and closes the connection.
    pub async fn close(&self) {
        for engine in self.engines() {
            engine.unbind().await;
        }
        self.reconnect.disconnect().await;
        tracing::info!(connection = %self.name, "Connection closed");
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("server", &self.server.name())
            .field("state", &self.state())
            .field("engines", &self.engines.read().len())
            .finish()
    }
}

// =============================================================================
// ConnectionRegistry
// =============================================================================

/// Registry of named connections.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<String, Arc<Connection>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new connection.
    ///
    /// Fails if the name is already taken.
    pub fn register(
        &self,
        name: impl Into<String>,
        server: Arc<dyn RemoteServer>,
        settings: ReconnectSettings,
    ) -> OpcDaResult<Arc<Connection>> {
        let name = name.into();
        match self.connections.entry(name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(OpcDaError::configuration(
                ConfigurationError::new("name", format!("connection '{}' already registered", name)),
            )),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let connection = Arc::new(Connection::new(name.clone(), server, settings));
                entry.insert(Arc::clone(&connection));
                tracing::info!(connection = %name, "Connection registered");
                Ok(connection)
            }
        }
    }

    /// Returns a connection by name.
    pub fn get(&self, name: &str) -> Option<Arc<Connection>> {
        self.connections.get(name).map(|r| Arc::clone(r.value()))
    }

    /// Returns all connection names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.connections.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    /// Returns the number of connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Returns `true` if no connections are registered.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Opens every registered connection.
    pub fn open_all(&self) {
        for connection in self.snapshot() {
            connection.open();
        }
    }

    /// Removes and closes a connection.
    pub async fn remove(&self, name: &str) -> Option<Arc<Connection>> {
        let (_, connection) = self.connections.remove(name)?;
        connection.close().await;
        tracing::info!(connection = %name, "Connection removed");
        Some(connection)
    }

    /// Closes and removes every connection.
    pub async fn close_all(&self) {
        for name in self.names() {
            self.remove(&name).await;
        }
    }

    fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.iter().map(|r| Arc::clone(r.value())).collect()
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connections", &self.names())
            .finish()
    }
}
