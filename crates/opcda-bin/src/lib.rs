// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # opcda-bin
//!
//! Command line entry point for the OPC DA client.
//!
//! ```text
//!   main.rs ──► cli.rs ──► commands ──► opcda-config
//!                  │
//!                  └────► logging
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Validate the default configuration (opcda.yaml)
//! opcda
//!
//! # Validate a specific file, fail on warnings
//! opcda validate -c /etc/opcda/plant.toml --strict
//!
//! # Show version
//! opcda version
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;

pub use cli::{Cli, Commands};
pub use error::{BinError, BinResult};
pub use logging::init_logging;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
