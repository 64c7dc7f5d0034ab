// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Event delivery.
//!
//! The server pushes batches into an [`EventDispatcher`] attached to the
//! group. Entries are matched to items by client handle only; entries for
//! handles the group no longer knows are dropped.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;

use opcda_core::{
    DataChangeBatch, DataSource, EventHandle, GroupEventSink, OpcDaResult, WriteCompleteBatch,
};

use super::strategy::DeliveryStrategy;
use super::EngineCore;
use crate::group::Group;
use crate::settings::DeliveryMode;

pub(crate) struct EventStrategy {
    source: DataSource,
    initial_refresh: bool,
    handle: Mutex<Option<Box<dyn EventHandle>>>,
}

impl EventStrategy {
    pub(crate) fn new(source: DataSource, initial_refresh: bool) -> Self {
        Self {
            source,
            initial_refresh,
            handle: Mutex::new(None),
        }
    }
}

#[async_trait]
impl DeliveryStrategy for EventStrategy {
    fn mode(&self) -> DeliveryMode {
        DeliveryMode::Event
    }

    async fn on_start(&self, core: &Arc<EngineCore>, group: &Arc<Group>) -> OpcDaResult<()> {
        let sink = Arc::new(EventDispatcher {
            engine: Arc::downgrade(core),
            group: Arc::clone(group),
        });
        let handle = group.attach(sink).await?;
        *self.handle.lock() = Some(handle);

        if self.initial_refresh {
            group.refresh(self.source).await?;
        }
        Ok(())
    }

    async fn on_stop(&self, core: &Arc<EngineCore>, _group: &Arc<Group>) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.detach().await {
                tracing::debug!(engine = %core.name(), error = %e, "Failed to detach event sink");
            }
        }
    }
}

/// Sink translating pushed batches into engine dispatches.
pub(crate) struct EventDispatcher {
    engine: Weak<EngineCore>,
    group: Arc<Group>,
}

impl EventDispatcher {
    fn deliver(&self, kind: &str, batch: DataChangeBatch) {
        let Some(engine) = self.engine.upgrade() else {
            return;
        };

        if batch.master_error.is_failure() {
            tracing::warn!(
                engine = %engine.name(),
                transaction_id = batch.transaction_id,
                master_error = %batch.master_error,
                "{kind} batch reported errors"
            );
        }

        for entry in &batch.results {
            match self.group.find_by_client_handle(entry.client_handle) {
                Some(item) => engine.dispatch(&item, entry.to_state()),
                None => tracing::trace!(
                    engine = %engine.name(),
                    client_handle = %entry.client_handle,
                    "Dropping {kind} entry for unknown item"
                ),
            }
        }
    }
}

#[async_trait]
impl GroupEventSink for EventDispatcher {
    async fn data_change(&self, batch: DataChangeBatch) {
        self.deliver("data change", batch);
    }

    async fn read_complete(&self, batch: DataChangeBatch) {
        self.deliver("read complete", batch);
    }

    async fn write_complete(&self, batch: WriteCompleteBatch) {
        for result in batch.results.iter().filter(|r| r.error_code.is_failure()) {
            let item_id = self
                .group
                .find_by_client_handle(result.client_handle)
                .map(|item| item.item_id().to_string())
                .unwrap_or_else(|| result.client_handle.to_string());
            tracing::warn!(
                group = %self.group.name(),
                transaction_id = batch.transaction_id,
                item_id = %item_id,
                error = %result.error_code,
                "Asynchronous write failed"
            );
        }
    }

    async fn cancel_complete(&self, transaction_id: u32) {
        tracing::debug!(group = %self.group.name(), transaction_id, "Operation cancelled");
    }
}
