// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Delivery strategy seam.

use std::sync::Arc;

use async_trait::async_trait;

use opcda_core::OpcDaResult;

use super::EngineCore;
use crate::group::Group;
use crate::settings::{DeliveryMode, EngineSettings};

/// How updates get from the server group into the engine.
///
/// `on_start` runs after the initial realization; `on_stop` runs before
/// items are unrealized. Both are called with the engine's lifecycle lock
/// held, so they must not call back into `start`/`stop`.
#[async_trait]
pub(crate) trait DeliveryStrategy: Send + Sync {
    fn mode(&self) -> DeliveryMode;

    async fn on_start(&self, core: &Arc<EngineCore>, group: &Arc<Group>) -> OpcDaResult<()>;

    async fn on_stop(&self, core: &Arc<EngineCore>, group: &Arc<Group>);
}

pub(crate) fn for_settings(settings: &EngineSettings) -> Box<dyn DeliveryStrategy> {
    match settings.mode {
        DeliveryMode::Polling => Box::new(super::polling::PollingStrategy::new(
            settings.update_period,
            settings.data_source,
        )),
        DeliveryMode::Event => Box::new(super::event::EventStrategy::new(
            settings.data_source,
            settings.initial_refresh,
        )),
    }
}
