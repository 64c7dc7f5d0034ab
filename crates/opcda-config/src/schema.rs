// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration schema.
//!
//! ```yaml
//! client:
//!   name: line-3
//! connections:
//!   - name: plant
//!     host: 10.0.0.5
//!     server: Matrikon.OPC.Simulation.1
//!     reconnect_delay_ms: 5000
//!     engines:
//!       - name: fast
//!         mode: polling
//!         update_period_ms: 500
//!         items: [Random.Int4, Random.Real8]
//! logging:
//!   level: info
//! ```

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use opcda_client::{DeliveryMode, EngineSettings, ReconnectSettings};
use opcda_core::DataSource;

use crate::error::{ConfigError, ConfigResult};

/// Smallest accepted update period in milliseconds.
pub const MIN_UPDATE_PERIOD_MS: u64 = 10;

/// Largest accepted update period in milliseconds.
pub const MAX_UPDATE_PERIOD_MS: u64 = 3_600_000;

/// Default update period in milliseconds.
pub const DEFAULT_UPDATE_PERIOD_MS: u64 = 1000;

/// Default reconnect delay in milliseconds.
pub const DEFAULT_RECONNECT_DELAY_MS: i64 = 5000;

// =============================================================================
// ClientConfig
// =============================================================================

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Client identity.
    #[serde(default)]
    pub client: ClientInfo,

    /// Server connections.
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,

    /// Logging.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ClientConfig {
    /// Validates the whole configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut names = HashSet::new();
        for (i, connection) in self.connections.iter().enumerate() {
            connection.validate(i)?;
            if !names.insert(connection.name.as_str()) {
                return Err(ConfigError::duplicate_connection(&connection.name));
            }
        }
        Ok(())
    }

    /// Returns a connection by name.
    pub fn connection(&self, name: &str) -> Option<&ConnectionConfig> {
        self.connections.iter().find(|c| c.name == name)
    }

    /// Returns the total number of engines.
    pub fn engine_count(&self) -> usize {
        self.connections.iter().map(|c| c.engines.len()).sum()
    }

    /// Returns the total number of configured items.
    pub fn item_count(&self) -> usize {
        self.connections
            .iter()
            .flat_map(|c| c.engines.iter())
            .map(|e| e.items.len())
            .sum()
    }
}

/// Client identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Client name, used in logs.
    #[serde(default = "default_client_name")]
    pub name: String,

    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
}

fn default_client_name() -> String {
    "opcda-client".to_string()
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: default_client_name(),
            description: None,
        }
    }
}

// =============================================================================
// ConnectionConfig
// =============================================================================

/// One server connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Unique connection name.
    pub name: String,

    /// Server host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Server program id (e.g. `Matrikon.OPC.Simulation.1`).
    pub server: String,

    /// Delay between reconnect attempts. Non-positive values use the default.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: i64,

    /// Engines on this connection.
    #[serde(default)]
    pub engines: Vec<EngineConfig>,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_reconnect_delay_ms() -> i64 {
    DEFAULT_RECONNECT_DELAY_MS
}

impl ConnectionConfig {
    /// Validates the connection. `index` is used in field paths.
    pub fn validate(&self, index: usize) -> ConfigResult<()> {
        let field = format!("connections[{}]", index);
        if self.name.trim().is_empty() {
            return Err(ConfigError::validation(format!("{}.name", field), "cannot be empty"));
        }
        if self.server.trim().is_empty() {
            return Err(ConfigError::validation(format!("{}.server", field), "cannot be empty"));
        }

        let mut names = HashSet::new();
        for (j, engine) in self.engines.iter().enumerate() {
            engine.validate(&format!("{}.engines[{}]", field, j))?;
            if !names.insert(engine.name.as_str()) {
                return Err(ConfigError::duplicate_engine(&self.name, &engine.name));
            }
        }
        Ok(())
    }

    /// Returns the reconnect settings.
    pub fn reconnect_settings(&self) -> ReconnectSettings {
        ReconnectSettings::from_millis(self.reconnect_delay_ms)
    }

    /// Returns `host/server` for display.
    pub fn target(&self) -> String {
        format!("{}/{}", self.host, self.server)
    }
}

// =============================================================================
// EngineConfig
// =============================================================================

/// One access engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Engine name, unique within its connection.
    pub name: String,

    /// Delivery mode.
    #[serde(default)]
    pub mode: DeliveryMode,

    /// Server group name. Defaults to the engine name.
    #[serde(default)]
    pub group_name: Option<String>,

    /// Group update period.
    #[serde(default = "default_update_period_ms")]
    pub update_period_ms: u64,

    /// Read source.
    #[serde(default)]
    pub data_source: DataSource,

    /// Refresh once after attaching (event mode).
    #[serde(default = "default_true")]
    pub initial_refresh: bool,

    /// Allow writes.
    #[serde(default)]
    pub writable: bool,

    /// Item ids to subscribe.
    #[serde(default)]
    pub items: Vec<String>,
}

fn default_update_period_ms() -> u64 {
    DEFAULT_UPDATE_PERIOD_MS
}

fn default_true() -> bool {
    true
}

impl EngineConfig {
    /// Validates the engine. `field` is the engine's field path.
    pub fn validate(&self, field: &str) -> ConfigResult<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::validation(format!("{}.name", field), "cannot be empty"));
        }
        if !(MIN_UPDATE_PERIOD_MS..=MAX_UPDATE_PERIOD_MS).contains(&self.update_period_ms) {
            return Err(ConfigError::out_of_range(
                format!("{}.update_period_ms", field),
                self.update_period_ms,
                MIN_UPDATE_PERIOD_MS,
                MAX_UPDATE_PERIOD_MS,
            ));
        }

        let mut seen = HashSet::new();
        for (k, item) in self.items.iter().enumerate() {
            if item.trim().is_empty() {
                return Err(ConfigError::validation(
                    format!("{}.items[{}]", field, k),
                    "cannot be empty",
                ));
            }
            if !seen.insert(item.as_str()) {
                return Err(ConfigError::duplicate_item(&self.name, item));
            }
        }
        Ok(())
    }

    /// Converts to engine settings.
    pub fn to_settings(&self) -> EngineSettings {
        EngineSettings {
            name: self.name.clone(),
            group_name: self.group_name.clone().unwrap_or_default(),
            update_period: Duration::from_millis(self.update_period_ms),
            data_source: self.data_source,
            mode: self.mode,
            initial_refresh: self.initial_refresh,
            writable: self.writable,
        }
    }
}

// =============================================================================
// Logging
// =============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Log format.
    #[serde(default)]
    pub format: LogFormat,
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Returns the filter directive.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Compact text.
    Compact,
    /// JSON lines.
    Json,
}
