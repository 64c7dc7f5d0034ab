// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Fixtures
//!
//! Canned settings, clocks and configuration documents.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

use opcda_client::{Clock, EngineSettings};

// =============================================================================
// Clock
// =============================================================================

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// Creates a clock at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Creates a clock at a fixed, well-known instant.
    pub fn epoch() -> Self {
        Self::new(timestamp(0))
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    /// Sets the clock.
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Returns 2025-01-01T00:00:00Z plus `secs`.
pub fn timestamp(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
        + chrono::Duration::seconds(secs)
}

// =============================================================================
// Settings
// =============================================================================

/// Poll period used by engine fixtures.
pub const TEST_PERIOD: Duration = Duration::from_millis(100);

/// Reconnect delay used by controller fixtures.
pub const TEST_RECONNECT_DELAY: Duration = Duration::from_millis(1000);

/// Engine settings fixtures.
pub struct EngineFixtures;

impl EngineFixtures {
    /// Polling engine at [`TEST_PERIOD`].
    pub fn polling(name: &str) -> EngineSettings {
        EngineSettings::polling(name).with_update_period(TEST_PERIOD)
    }

    /// Writable polling engine at [`TEST_PERIOD`].
    pub fn writable(name: &str) -> EngineSettings {
        Self::polling(name).writable()
    }

    /// Event engine at [`TEST_PERIOD`] with an initial refresh.
    pub fn event(name: &str) -> EngineSettings {
        EngineSettings::event(name).with_update_period(TEST_PERIOD)
    }
}

// =============================================================================
// Configuration documents
// =============================================================================

/// Configuration document fixtures.
pub struct ConfigFixtures;

impl ConfigFixtures {
    /// Two connections, three engines.
    pub fn plant_yaml() -> &'static str {
        r#"
client:
  name: line-3
  description: Packaging line
connections:
  - name: plant-a
    host: 10.0.0.5
    server: Matrikon.OPC.Simulation.1
    reconnect_delay_ms: 2500
    engines:
      - name: fast
        mode: polling
        update_period_ms: 250
        data_source: device
        items:
          - Random.Int4
          - Random.Real8
      - name: pushed
        mode: event
        group_name: pushed-group
        writable: true
        items:
          - Bucket Brigade.Int4
  - name: plant-b
    server: Sim.2
    reconnect_delay_ms: 0
    engines:
      - name: slow
        update_period_ms: 60000
        items: [Saw-toothed Waves.Real4]
logging:
  level: debug
  format: json
"#
    }

    /// Same content as [`plant_yaml`](Self::plant_yaml), minimal TOML form.
    pub fn plant_toml() -> &'static str {
        r#"
[client]
name = "line-3"

[[connections]]
name = "plant-a"
host = "10.0.0.5"
server = "Matrikon.OPC.Simulation.1"
reconnect_delay_ms = 2500

[[connections.engines]]
name = "fast"
mode = "polling"
update_period_ms = 250
data_source = "device"
items = ["Random.Int4", "Random.Real8"]

[[connections.engines]]
name = "pushed"
mode = "event"
group_name = "pushed-group"
writable = true
items = ["Bucket Brigade.Int4"]
"#
    }

    /// One connection with a placeholder host and delay.
    pub fn placeholder_yaml() -> &'static str {
        r#"
connections:
  - name: plant
    host: ${OPCDA_FIXTURE_HOST:127.0.0.1}
    server: Sim.1
    reconnect_delay_ms: ${OPCDA_FIXTURE_DELAY:750}
"#
    }
}
