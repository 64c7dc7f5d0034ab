// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Polling delivery.
//!
//! One task per engine reads all realized items in a single batch each
//! period and feeds the results through the engine's dispatch path.
//!
//! A read that fails as a whole is treated as connection loss. Per-item
//! errors inside a successful read are delivered to the item callbacks as
//! part of the item state.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use opcda_core::{DataSource, OpcDaResult};

use super::strategy::DeliveryStrategy;
use super::EngineCore;
use crate::group::Group;
use crate::settings::DeliveryMode;

struct PollTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub(crate) struct PollingStrategy {
    period: Duration,
    source: DataSource,
    task: Mutex<Option<PollTask>>,
}

impl PollingStrategy {
    pub(crate) fn new(period: Duration, source: DataSource) -> Self {
        Self {
            period,
            source,
            task: Mutex::new(None),
        }
    }
}

#[async_trait]
impl DeliveryStrategy for PollingStrategy {
    fn mode(&self) -> DeliveryMode {
        DeliveryMode::Polling
    }

    async fn on_start(&self, core: &Arc<EngineCore>, group: &Arc<Group>) -> OpcDaResult<()> {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(
            Arc::downgrade(core),
            Arc::clone(group),
            self.period,
            self.source,
            cancel.clone(),
        ));

        let previous = self.task.lock().replace(PollTask { cancel, handle });
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }
        Ok(())
    }

    async fn on_stop(&self, core: &Arc<EngineCore>, _group: &Arc<Group>) {
        let Some(task) = self.task.lock().take() else {
            return;
        };
        task.cancel.cancel();
        if let Err(e) = task.handle.await {
            if e.is_panic() {
                tracing::error!(engine = %core.name(), "Poll task panicked");
            }
        }
    }
}

async fn poll_loop(
    core: Weak<EngineCore>,
    group: Arc<Group>,
    period: Duration,
    source: DataSource,
    cancel: CancellationToken,
) {
    let mut last_error = false;

    loop {
        let Some(engine) = core.upgrade() else {
            break;
        };

        if engine.is_active() {
            let items = engine.realized_snapshot();
            if !items.is_empty() {
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    result = group.read(source, &items) => result,
                };

                match result {
                    Ok(states) => {
                        if last_error {
                            last_error = false;
                            engine.notify_error_cleared();
                        }
                        for (item, state) in states {
                            engine.dispatch(&item, state);
                        }
                    }
                    Err(e) => {
                        last_error = true;
                        tracing::warn!(
                            engine = %engine.name(),
                            items = items.len(),
                            error = %e,
                            "Poll read failed"
                        );
                        engine.handle_error(&e).await;
                    }
                }
            }
        }
        drop(engine);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(period) => {}
        }
    }

    tracing::debug!(group = %group.name(), "Poll loop stopped");
}
