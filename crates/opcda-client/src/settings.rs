// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Engine and reconnect settings.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use opcda_core::{ConfigurationError, DataSource, OpcDaError, OpcDaResult};

/// Default group update period.
pub const DEFAULT_UPDATE_PERIOD: Duration = Duration::from_millis(1000);

/// Smallest accepted group update period.
pub const MIN_UPDATE_PERIOD: Duration = Duration::from_millis(10);

/// Default delay between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(5000);

// =============================================================================
// DeliveryMode
// =============================================================================

/// How an engine receives item updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// A poll task issues one batched read per period.
    #[default]
    Polling,
    /// The server pushes data-change notifications.
    Event,
}

impl DeliveryMode {
    /// Returns `true` for [`DeliveryMode::Polling`].
    #[inline]
    pub const fn is_polling(&self) -> bool {
        matches!(self, Self::Polling)
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Polling => write!(f, "polling"),
            Self::Event => write!(f, "event"),
        }
    }
}

// =============================================================================
// EngineSettings
// =============================================================================

/// Settings for one [`AccessEngine`](crate::AccessEngine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Engine name, used in logs.
    pub name: String,

    /// Name of the server-side group. Empty lets the engine use its own name.
    #[serde(default)]
    pub group_name: String,

    /// Group update period.
    #[serde(with = "duration_millis")]
    pub update_period: Duration,

    /// Source for polled reads and the initial refresh.
    #[serde(default)]
    pub data_source: DataSource,

    /// Delivery strategy.
    #[serde(default)]
    pub mode: DeliveryMode,

    /// Issue a refresh right after attaching in event mode.
    #[serde(default = "default_true")]
    pub initial_refresh: bool,

    /// Allow writes through this engine.
    #[serde(default)]
    pub writable: bool,
}

fn default_true() -> bool {
    true
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            group_name: String::new(),
            update_period: DEFAULT_UPDATE_PERIOD,
            data_source: DataSource::Cache,
            mode: DeliveryMode::Polling,
            initial_refresh: true,
            writable: false,
        }
    }
}

impl EngineSettings {
    /// Creates polling settings with the given name.
    pub fn polling(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Creates event settings with the given name.
    pub fn event(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: DeliveryMode::Event,
            ..Default::default()
        }
    }

    /// Sets the update period.
    pub fn with_update_period(mut self, period: Duration) -> Self {
        self.update_period = period;
        self
    }

    /// Sets the group name.
    pub fn with_group_name(mut self, name: impl Into<String>) -> Self {
        self.group_name = name.into();
        self
    }

    /// Sets the data source.
    pub fn with_data_source(mut self, source: DataSource) -> Self {
        self.data_source = source;
        self
    }

    /// Enables or disables the initial refresh.
    pub fn with_initial_refresh(mut self, enabled: bool) -> Self {
        self.initial_refresh = enabled;
        self
    }

    /// Enables writes.
    pub fn writable(mut self) -> Self {
        self.writable = true;
        self
    }

    /// Returns the effective group name.
    pub fn effective_group_name(&self) -> &str {
        if self.group_name.is_empty() {
            &self.name
        } else {
            &self.group_name
        }
    }

    /// Validates the settings.
    pub fn validate(&self) -> OpcDaResult<()> {
        if self.name.trim().is_empty() {
            return Err(OpcDaError::configuration(ConfigurationError::new(
                "name",
                "engine name cannot be empty",
            )));
        }
        if self.update_period < MIN_UPDATE_PERIOD {
            return Err(OpcDaError::configuration(ConfigurationError::new(
                "update_period",
                format!("must be at least {:?}", MIN_UPDATE_PERIOD),
            )));
        }
        Ok(())
    }
}

// =============================================================================
// ReconnectSettings
// =============================================================================

/// Settings for the [`ReconnectController`](crate::ReconnectController).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectSettings {
    /// Delay before each reconnect attempt that follows a failure.
    #[serde(with = "duration_millis")]
    pub delay: Duration,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl ReconnectSettings {
    /// Creates settings with the given delay. A zero delay becomes the default.
    pub fn new(delay: Duration) -> Self {
        if delay.is_zero() {
            Self::default()
        } else {
            Self { delay }
        }
    }

    /// Creates settings from a configured millisecond value.
    ///
    /// Non-positive values are replaced with [`DEFAULT_RECONNECT_DELAY`].
    pub fn from_millis(millis: i64) -> Self {
        match u64::try_from(millis) {
            Ok(ms) if ms > 0 => Self {
                delay: Duration::from_millis(ms),
            },
            _ => Self::default(),
        }
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
