// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC DA client subscription and data-delivery engine.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     ConnectionRegistry                       │
//! └──────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Connection                                                   │
//! │   RemoteServer ◄──── ReconnectController (retry with delay)  │
//! │        │                                                     │
//! │        ├──► AccessEngine (polling) ──► Group ──► Items       │
//! │        └──► AccessEngine (event)   ──► Group ──► Items       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! An [`AccessEngine`] owns a desired set of items and keeps it subscribed
//! whenever the server is connected. Updates arrive either from a poll task
//! or from server-pushed events and pass through change detection before
//! reaching the item callbacks. The [`ReconnectController`] re-establishes
//! lost connections; engines react to the resulting connection
//! notifications and re-subscribe from scratch.
//!
//! # Example
//!
//! ```rust,ignore
//! use opcda_client::{ConnectionRegistry, EngineSettings, ReconnectSettings};
//!
//! let registry = ConnectionRegistry::new();
//! let connection = registry.register("plant", server, ReconnectSettings::default())?;
//! let engine = connection.attach_engine(EngineSettings::polling("fast")).await?;
//! engine.add_item("Random.Real8", |id: &ItemId, state: &ItemState| {
//!     println!("{id}: {state}");
//! }).await?;
//! connection.open();
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod clock;
pub mod connection;
pub mod engine;
pub mod group;
pub mod reconnect;
pub mod settings;

pub use clock::{Clock, SystemClock};
pub use connection::{Connection, ConnectionRegistry};
pub use engine::{
    AccessEngine, AccessEngineBuilder, AccessStateListener, ChannelCallback, ItemCallback,
    ItemUpdate,
};
pub use group::{AddItemsOutcome, Group, Item};
pub use reconnect::{ReconnectController, ReconnectState};
pub use settings::{
    DeliveryMode, EngineSettings, ReconnectSettings, DEFAULT_RECONNECT_DELAY,
    DEFAULT_UPDATE_PERIOD, MIN_UPDATE_PERIOD,
};
