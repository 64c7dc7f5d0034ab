// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # OPC DA Client Integration Tests
//!
//! Test tooling and end-to-end tests for the engine, reconnect controller
//! and configuration loader.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p opcda-tests
//! cargo test -p opcda-tests --test integration_engine
//! cargo test -p opcda-tests --test integration_reconnect
//! cargo test -p opcda-tests --test integration_config
//! ```
//!
//! ## Writing New Tests
//!
//! ```rust,ignore
//! use opcda_tests::prelude::*;
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_something() {
//!     let server = MockServer::new("sim");
//!     server.set_value("A", 1i32);
//!     let engine = AccessEngine::new(server.clone(), EngineFixtures::polling("e")).unwrap();
//!     // ...
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod common;

/// Commonly used test items.
pub mod prelude {
    pub use crate::common::fixtures::*;
    pub use crate::common::mocks::*;
    pub use crate::common::{init_test_logging, wait_until, wait_until_async};
}
