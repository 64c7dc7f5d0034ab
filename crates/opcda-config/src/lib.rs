// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # opcda-config
//!
//! Configuration for the OPC DA client.
//!
//! ## Features
//!
//! - **Schema**: connections, their engines and subscribed items
//! - **Multi-Format Support**: YAML, TOML and JSON files
//! - **Environment Overrides**: `${VAR:default}` placeholders and `OPCDA_*` variables
//! - **Validation**: unique names, update period bounds, non-empty item ids
//!
//! ## Quick Start
//!
//! ```no_run
//! use opcda_config::loader::load_config;
//!
//! let config = load_config("opcda.yaml").unwrap();
//!
//! for connection in &config.connections {
//!     println!("{} -> {}", connection.name, connection.target());
//!     for engine in &connection.engines {
//!         let settings = engine.to_settings();
//!         println!("  {} ({})", settings.name, settings.mode);
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod loader;
pub mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_config, load_config_str, ConfigFormat, ConfigLoader, ConfigLoaderBuilder};
pub use schema::{
    ClientConfig, ClientInfo, ConnectionConfig, EngineConfig, LogFormat, LogLevel, LoggingConfig,
    DEFAULT_RECONNECT_DELAY_MS, DEFAULT_UPDATE_PERIOD_MS, MAX_UPDATE_PERIOD_MS,
    MIN_UPDATE_PERIOD_MS,
};
