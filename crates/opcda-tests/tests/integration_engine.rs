// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Engine Integration Tests
//!
//! End-to-end tests of `AccessEngine` against the mock server.
//!
//! ## Test Categories
//!
//! - `test_scenario_*`: polling walkthroughs (two tags, removal, reconnect)
//! - `test_dispatch_*`: change detection
//! - `test_items_*`: desired/realized bookkeeping
//! - `test_write_*`: write path
//! - `test_event_*`: event mode
//! - `test_lifecycle_*`: bind/unbind and error handling
//! - `test_group_*`: the group wrapper

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use opcda_client::{AccessEngine, ChannelCallback, Group};
use opcda_core::{
    ClientHandle, DataChangeBatch, DataSource, ErrorCode, ItemError, ItemId, ItemValueResult,
    OpcDaError, OperationError, Quality, RemoteServer, Variant,
};
use opcda_tests::prelude::*;

const WAIT: Duration = Duration::from_secs(5);

fn engine_for(server: &Arc<MockServer>, settings: opcda_client::EngineSettings) -> AccessEngine {
    AccessEngine::new(server.clone(), settings).unwrap()
}

fn assert_realized_subset(engine: &AccessEngine) {
    let desired = engine.desired_items();
    for id in engine.realized_items() {
        assert!(desired.contains(&id), "{} realized but not desired", id);
    }
}

fn ids(values: &[&str]) -> Vec<ItemId> {
    values.iter().map(|v| ItemId::new(*v)).collect()
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_scenario_two_tag_poll() {
    init_test_logging();
    let server = MockServer::new("sim");
    server.set_value("Random.Int4", 7i32);
    server.set_value("Random.Real8", 2.5f64);

    let engine = engine_for(&server, EngineFixtures::polling("poll"));
    let recorder = RecordingCallback::new();
    engine.add_item("Random.Int4", recorder.clone()).await.unwrap();
    engine.add_item("Random.Real8", recorder.clone()).await.unwrap();
    engine.bind().await;
    assert!(!engine.is_active());
    assert!(engine.realized_items().is_empty());

    server.connect().await.unwrap();
    assert!(wait_until(WAIT, || recorder.count() == 2).await);
    assert!(engine.is_active());
    assert_eq!(engine.realized_items(), ids(&["Random.Int4", "Random.Real8"]));
    assert_eq!(recorder.values_for("Random.Int4"), vec![Variant::Int32(7)]);
    assert_eq!(recorder.values_for("Random.Real8"), vec![Variant::Double(2.5)]);

    // Unchanged values are read but not delivered again.
    tokio::time::sleep(TEST_PERIOD * 10).await;
    assert_eq!(recorder.count(), 2);
    assert!(server.read_count() >= 5);

    server.set_value("Random.Int4", 8i32);
    assert!(wait_until(WAIT, || recorder.count() == 3).await);
    assert_eq!(
        recorder.values_for("Random.Int4"),
        vec![Variant::Int32(7), Variant::Int32(8)]
    );
    assert_eq!(recorder.count_for("Random.Real8"), 1);

    engine.unbind().await;
}

#[tokio::test(start_paused = true)]
async fn test_scenario_remove_while_active() {
    init_test_logging();
    let server = MockServer::new("sim");
    server.set_value("A", 1i32);
    server.set_value("B", 2i32);

    let engine = engine_for(&server, EngineFixtures::polling("poll"));
    let recorder = RecordingCallback::new();
    engine.add_item("A", recorder.clone()).await.unwrap();
    engine.add_item("B", recorder.clone()).await.unwrap();
    engine.bind().await;
    server.connect().await.unwrap();
    assert!(wait_until(WAIT, || recorder.count() == 2).await);

    assert!(engine.remove_item("B").await);
    assert_eq!(engine.desired_items(), ids(&["A"]));
    assert_eq!(engine.realized_items(), ids(&["A"]));
    assert!(engine.cached_state(&ItemId::new("B")).is_none());

    let group = server.last_group().unwrap();
    assert_eq!(group.item_ids(), ids(&["A"]));
    assert!(group.was_called(|c| *c == GroupCall::RemoveItems(1)));

    server.set_value("B", 20i32);
    server.set_value("A", 10i32);
    assert!(wait_until(WAIT, || recorder.count_for("A") == 2).await);
    tokio::time::sleep(TEST_PERIOD * 5).await;
    assert_eq!(recorder.count_for("B"), 1);

    assert!(!engine.remove_item("B").await);
    engine.unbind().await;
}

#[tokio::test(start_paused = true)]
async fn test_scenario_connection_drop_rerealizes() {
    init_test_logging();
    let server = MockServer::new("sim");
    server.set_value("A", 1i32);
    server.set_value("B", 2i32);

    let engine = engine_for(&server, EngineFixtures::polling("poll"));
    let recorder = RecordingCallback::new();
    engine.add_item("A", recorder.clone()).await.unwrap();
    engine.add_item("B", recorder.clone()).await.unwrap();
    engine.bind().await;
    server.connect().await.unwrap();
    assert!(wait_until(WAIT, || recorder.count() == 2).await);

    server.drop_connection();
    assert!(wait_until(WAIT, || !engine.is_active()).await);
    assert!(engine.realized_items().is_empty());
    assert_eq!(engine.desired_items(), ids(&["A", "B"]));
    assert!(engine.group().is_none());
    let first = server.last_group().unwrap();
    assert!(first.is_removed());

    // Nothing is polled while disconnected.
    let reads = server.read_count();
    tokio::time::sleep(TEST_PERIOD * 5).await;
    assert_eq!(server.read_count(), reads);

    server.connect().await.unwrap();
    assert!(wait_until(WAIT, || engine.realized_items().len() == 2).await);
    assert_eq!(server.groups().len(), 2);

    // The cache was cleared, so unchanged values are delivered again.
    assert!(wait_until(WAIT, || recorder.count() == 4).await);
    assert_eq!(recorder.values_for("A"), vec![Variant::Int32(1), Variant::Int32(1)]);

    engine.unbind().await;
}

// =============================================================================
// Change detection
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_dispatch_first_observation_even_if_bad() {
    let server = MockServer::new("sim");
    let engine = engine_for(&server, EngineFixtures::polling("poll"));
    let recorder = RecordingCallback::new();
    engine.add_item("Unset", recorder.clone()).await.unwrap();
    engine.bind().await;
    server.connect().await.unwrap();

    assert!(wait_until(WAIT, || recorder.count() == 1).await);
    let state = recorder.last_for("Unset").unwrap();
    assert!(state.quality.is_bad());
    assert_eq!(state.value, Variant::Empty);

    tokio::time::sleep(TEST_PERIOD * 5).await;
    assert_eq!(recorder.count(), 1);
    engine.unbind().await;
}

#[tokio::test(start_paused = true)]
async fn test_dispatch_quality_change_is_delivered() {
    let clock = Arc::new(FixedClock::epoch());
    let server = MockServer::with_clock("sim", clock.clone());
    server.set_value("A", 1i32);
    let engine = engine_for(&server, EngineFixtures::polling("poll"));
    let recorder = RecordingCallback::new();
    engine.add_item("A", recorder.clone()).await.unwrap();
    engine.bind().await;
    server.connect().await.unwrap();
    assert!(wait_until(WAIT, || recorder.count() == 1).await);

    let mut state = server.state_of("A");
    state.quality = Quality::UNCERTAIN;
    server.set_state("A", state);
    assert!(wait_until(WAIT, || recorder.count() == 2).await);
    assert!(recorder.last_for("A").unwrap().quality.is_uncertain());
    engine.unbind().await;
}

#[tokio::test(start_paused = true)]
async fn test_dispatch_callback_panic_is_contained() {
    init_test_logging();
    let server = MockServer::new("sim");
    server.set_value("A", 1i32);
    server.set_value("B", 1i32);

    let engine = engine_for(&server, EngineFixtures::polling("poll"));
    let recorder = RecordingCallback::new();
    engine
        .add_item("A", |_: &ItemId, _: &opcda_core::ItemState| panic!("callback failure"))
        .await
        .unwrap();
    engine.add_item("B", recorder.clone()).await.unwrap();
    engine.bind().await;
    server.connect().await.unwrap();
    assert!(wait_until(WAIT, || recorder.count() == 1).await);

    server.set_value("B", 2i32);
    server.set_value("A", 2i32);
    assert!(wait_until(WAIT, || recorder.count() == 2).await);
    assert!(engine.is_active());
    engine.unbind().await;
}

#[tokio::test(start_paused = true)]
async fn test_dispatch_channel_callback() {
    let server = MockServer::new("sim");
    server.set_value("A", "hello");
    let engine = engine_for(&server, EngineFixtures::polling("poll"));
    let (callback, mut rx) = ChannelCallback::with_channel(16);
    engine.add_item("A", callback).await.unwrap();
    engine.bind().await;
    server.connect().await.unwrap();

    let update = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(update.item_id.as_str(), "A");
    assert_eq!(update.state.value.as_str(), Some("hello"));
    engine.unbind().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dispatch_callbacks_follow_cache_order() {
    let server = MockServer::new("sim");
    server.set_value("A", 0i32);
    let engine = engine_for(&server, EngineFixtures::writable("rw"));

    // The callback compares each delivered state with the engine cache.
    let slot: Arc<parking_lot::Mutex<Option<AccessEngine>>> = Arc::default();
    let delivered = Arc::new(AtomicUsize::new(0));
    let mismatches = Arc::new(AtomicUsize::new(0));
    {
        let slot = slot.clone();
        let delivered = delivered.clone();
        let mismatches = mismatches.clone();
        engine
            .add_item("A", move |id: &ItemId, state: &opcda_core::ItemState| {
                let engine = slot.lock().clone();
                if let Some(engine) = engine {
                    if engine.cached_state(id).as_ref() != Some(state) {
                        mismatches.fetch_add(1, Ordering::SeqCst);
                    }
                }
                delivered.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();
    }
    *slot.lock() = Some(engine.clone());
    engine.bind().await;
    server.connect().await.unwrap();
    assert!(wait_until(WAIT, || delivered.load(Ordering::SeqCst) >= 1).await);

    let writers: Vec<_> = (0..8i32)
        .map(|writer| {
            let engine = engine.clone();
            tokio::spawn(async move {
                for i in 0..50i32 {
                    engine.write("A", writer * 1000 + i + 1).await.unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.await.unwrap();
    }

    assert!(delivered.load(Ordering::SeqCst) > 1);
    assert_eq!(mismatches.load(Ordering::SeqCst), 0);
    // Breaks the engine -> callback -> engine cycle.
    *slot.lock() = None;
    engine.unbind().await;
}

// =============================================================================
// Item bookkeeping
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_items_partial_failure_isolation() {
    init_test_logging();
    let server = MockServer::new("sim");
    server.reject_item("Does.Not.Exist");
    server.set_value("Good", 3i32);

    let engine = engine_for(&server, EngineFixtures::polling("poll"));
    let recorder = RecordingCallback::new();
    engine.add_item("Good", recorder.clone()).await.unwrap();
    engine.add_item("Does.Not.Exist", recorder.clone()).await.unwrap();
    engine.bind().await;
    server.connect().await.unwrap();

    assert!(wait_until(WAIT, || recorder.count() == 1).await);
    assert_eq!(engine.realized_items(), ids(&["Good"]));
    assert_eq!(engine.desired_items(), ids(&["Does.Not.Exist", "Good"]));
    assert_realized_subset(&engine);

    // A rejected add while active is logged, not returned.
    server.reject_item("Late.Reject");
    assert!(engine.add_item("Late.Reject", recorder.clone()).await.is_ok());
    assert_eq!(engine.realized_items(), ids(&["Good"]));
    assert_eq!(engine.desired_items().len(), 3);
    assert_eq!(recorder.count_for("Does.Not.Exist"), 0);
    engine.unbind().await;
}

#[tokio::test(start_paused = true)]
async fn test_items_add_while_active_and_duplicate() {
    let server = MockServer::new("sim");
    server.set_value("A", 1i32);
    let engine = engine_for(&server, EngineFixtures::polling("poll"));
    engine.bind().await;
    server.connect().await.unwrap();
    assert!(wait_until(WAIT, || engine.is_active()).await);

    let first = RecordingCallback::new();
    engine.add_item("A", first.clone()).await.unwrap();
    assert_eq!(engine.realized_items(), ids(&["A"]));

    let second = RecordingCallback::new();
    engine.add_item("A", second.clone()).await.unwrap();
    let group = server.last_group().unwrap();
    let adds = group
        .calls()
        .into_iter()
        .filter(|c| matches!(c, GroupCall::AddItems(_)))
        .count();
    assert_eq!(adds, 1);

    assert!(wait_until(WAIT, || first.count() == 1).await);
    tokio::time::sleep(TEST_PERIOD * 3).await;
    assert_eq!(second.count(), 0);
    engine.unbind().await;
}

#[tokio::test]
async fn test_items_empty_id_rejected() {
    let server = MockServer::new("sim");
    let engine = engine_for(&server, EngineFixtures::polling("poll"));
    let result = engine.add_item("   ", RecordingCallback::new()).await;
    assert!(matches!(
        result,
        Err(OpcDaError::Item(ItemError::InvalidId { .. }))
    ));
    assert!(engine.desired_items().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_items_concurrent_add_never_double_subscribes() {
    let server = MockServer::new("sim");
    let engine = engine_for(&server, EngineFixtures::polling("poll"));
    let recorder = RecordingCallback::new();
    engine.add_item("Seed", recorder.clone()).await.unwrap();
    engine.bind().await;

    let mut handles = Vec::new();
    for i in 0..20 {
        let engine = engine.clone();
        let recorder = recorder.clone();
        handles.push(tokio::spawn(async move {
            engine.add_item(format!("Tag.{}", i), recorder).await
        }));
    }
    server.connect().await.unwrap();
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    assert!(wait_until(WAIT, || engine.realized_items().len() == 21).await);
    let group = server.last_group().unwrap();
    assert_eq!(group.item_ids().len(), 21);
    assert_realized_subset(&engine);
    engine.unbind().await;
}

#[tokio::test(start_paused = true)]
async fn test_items_whole_batch_failure_keeps_desired() {
    init_test_logging();
    let server = MockServer::new("sim");
    server.fail_add_items(true);
    let engine = engine_for(&server, EngineFixtures::polling("poll"));
    engine.add_item("A", RecordingCallback::new()).await.unwrap();
    engine.bind().await;
    server.connect().await.unwrap();

    assert!(wait_until(WAIT, || engine.is_active()).await);
    assert!(engine.realized_items().is_empty());
    assert_eq!(engine.desired_items(), ids(&["A"]));

    // Realized again on the next subscription.
    server.fail_add_items(false);
    server.drop_connection();
    assert!(wait_until(WAIT, || !engine.is_active()).await);
    server.connect().await.unwrap();
    assert!(wait_until(WAIT, || engine.realized_items().len() == 1).await);
    engine.unbind().await;
}

// =============================================================================
// Writes
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_write_then_read_is_idempotent() {
    init_test_logging();
    let clock = Arc::new(FixedClock::epoch());
    let server = MockServer::with_clock("sim", clock.clone());
    server.set_value("Tank.Level", 1i32);

    let engine = AccessEngine::builder(server.clone())
        .settings(EngineFixtures::writable("rw"))
        .clock(clock.clone())
        .build()
        .unwrap();
    let recorder = RecordingCallback::new();
    engine.add_item("Tank.Level", recorder.clone()).await.unwrap();
    engine.bind().await;
    server.connect().await.unwrap();
    assert!(wait_until(WAIT, || recorder.count() == 1).await);

    clock.advance(chrono::Duration::seconds(5));
    engine.write("Tank.Level", 42i32).await.unwrap();
    assert_eq!(recorder.count(), 2);
    let written = recorder.last_for("Tank.Level").unwrap();
    assert_eq!(written.value, Variant::Int32(42));
    assert_eq!(written.error_code, ErrorCode::S_OK);
    assert_eq!(written.timestamp, Some(timestamp(5)));
    assert_eq!(written.quality, Quality::GOOD);

    tokio::time::sleep(TEST_PERIOD * 10).await;
    assert_eq!(recorder.count(), 2);
    assert_eq!(
        engine.cached_state(&ItemId::new("Tank.Level")),
        Some(server.state_of("Tank.Level"))
    );
    engine.unbind().await;
}

#[tokio::test(start_paused = true)]
async fn test_write_errors() {
    let server = MockServer::new("sim");
    server.set_value("A", 1i32);
    server.fail_write_of("A", ErrorCode::OPC_E_BADRIGHTS);

    let read_only = engine_for(&server, EngineFixtures::polling("ro"));
    let writable = engine_for(&server, EngineFixtures::writable("rw"));
    let recorder = RecordingCallback::new();
    writable.add_item("A", recorder.clone()).await.unwrap();

    assert!(matches!(
        read_only.write("A", 1i32).await,
        Err(OpcDaError::Operation(OperationError::ReadOnly { .. }))
    ));
    assert!(matches!(
        writable.write("A", 1i32).await,
        Err(OpcDaError::Item(ItemError::NotRealized { .. }))
    ));

    writable.bind().await;
    server.connect().await.unwrap();
    assert!(wait_until(WAIT, || recorder.count() == 1).await);
    let before = writable.cached_state(&ItemId::new("A"));

    let result = writable.write("A", 99i32).await;
    assert!(matches!(
        result,
        Err(OpcDaError::Operation(OperationError::WriteFailed { code, .. })) if code == ErrorCode::OPC_E_BADRIGHTS
    ));
    assert_eq!(recorder.count(), 1);
    assert_eq!(writable.cached_state(&ItemId::new("A")), before);
    writable.unbind().await;
}

#[tokio::test(start_paused = true)]
async fn test_write_completing_after_restart_is_dropped() {
    init_test_logging();
    let server = MockServer::new("sim");
    server.set_value("A", 1i32);
    server.set_value("B", 2i32);
    let engine = engine_for(&server, EngineFixtures::writable("rw"));
    let first = RecordingCallback::new();
    let second = RecordingCallback::new();
    engine.add_item("A", first.clone()).await.unwrap();
    engine.bind().await;
    server.connect().await.unwrap();
    assert!(wait_until(WAIT, || first.count() == 1).await);
    let handle_of_a = server.last_group().unwrap().client_handle_of("A").unwrap();

    server.set_write_delay(Some(TEST_PERIOD * 20));
    let writer = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.write("A", 99i32).await })
    };
    tokio::time::sleep(TEST_PERIOD).await;

    // While the write is in flight, A is replaced by B and the group is
    // recreated, so B inherits A's client handle.
    assert!(engine.remove_item("A").await);
    engine.add_item("B", second.clone()).await.unwrap();
    assert!(wait_until(WAIT, || second.count() == 1).await);
    server.drop_connection();
    server.force_connected();
    assert!(wait_until(WAIT, || second.count() == 2).await);
    assert_eq!(server.groups().len(), 2);
    assert_eq!(server.last_group().unwrap().client_handle_of("B"), Some(handle_of_a));

    assert!(writer.await.unwrap().is_ok());
    assert_eq!(second.count_for("A"), 0);
    assert_eq!(second.values_for("B"), vec![Variant::Int32(2), Variant::Int32(2)]);
    assert_eq!(
        engine.cached_state(&ItemId::new("B")).map(|s| s.value),
        Some(Variant::Int32(2))
    );
    engine.unbind().await;
}

#[tokio::test(start_paused = true)]
async fn test_write_transport_failure_disposes() {
    init_test_logging();
    let server = MockServer::new("sim");
    server.set_value("A", 1i32);
    let listener = RecordingStateListener::new();
    let engine = AccessEngine::builder(server.clone())
        .settings(EngineFixtures::writable("rw"))
        .state_listener(listener.clone())
        .build()
        .unwrap();
    let recorder = RecordingCallback::new();
    engine.add_item("A", recorder.clone()).await.unwrap();
    engine.bind().await;
    server.connect().await.unwrap();
    assert!(wait_until(WAIT, || recorder.count() == 1).await);

    server.fail_writes(true);
    assert!(engine.write("A", 5i32).await.is_err());
    assert_eq!(server.dispose_count(), 1);
    assert_eq!(listener.errors().len(), 1);
    assert!(wait_until(WAIT, || !engine.is_active()).await);
    assert_eq!(recorder.count(), 1);
    engine.unbind().await;
}

// =============================================================================
// Event mode
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_event_delivery() {
    init_test_logging();
    let clock = Arc::new(FixedClock::epoch());
    let server = MockServer::with_clock("sim", clock.clone());
    server.set_value("A", 1i32);
    server.set_value("B", 2i32);

    let engine = engine_for(&server, EngineFixtures::event("events"));
    let recorder = RecordingCallback::new();
    engine.add_item("A", recorder.clone()).await.unwrap();
    engine.add_item("B", recorder.clone()).await.unwrap();
    engine.bind().await;
    server.connect().await.unwrap();

    // Initial refresh.
    assert!(wait_until(WAIT, || recorder.count() == 2).await);
    let group = server.last_group().unwrap();
    assert!(group.has_sink());
    assert!(group.was_called(|c| *c == GroupCall::Attach));
    assert!(group.was_called(|c| *c == GroupCall::Refresh(DataSource::Cache)));
    assert!(!group.was_called(|c| matches!(c, GroupCall::Read(_))));

    group.emit_values(&[("A", Variant::Int32(5))]).await;
    assert_eq!(recorder.values_for("A"), vec![Variant::Int32(1), Variant::Int32(5)]);

    // Same state again: nothing new.
    group.emit_values(&[("A", Variant::Int32(5))]).await;
    assert_eq!(recorder.count(), 3);

    // Unknown handle is dropped.
    let stray = ItemValueResult {
        client_handle: ClientHandle(9999),
        error_code: ErrorCode::S_OK,
        value: Variant::Int32(0),
        timestamp: None,
        quality: Quality::GOOD,
    };
    group.emit(DataChangeBatch::new(vec![stray])).await;
    assert_eq!(recorder.count(), 3);

    // A failed master error does not hide per-item results.
    let handle = group.client_handle_of("B").unwrap();
    let mut batch = DataChangeBatch::new(vec![ItemValueResult {
        client_handle: handle,
        error_code: ErrorCode::S_OK,
        value: Variant::Int32(7),
        timestamp: Some(timestamp(0)),
        quality: Quality::GOOD,
    }]);
    batch.master_error = ErrorCode::E_FAIL;
    group.emit(batch).await;
    assert_eq!(recorder.values_for("B"), vec![Variant::Int32(2), Variant::Int32(7)]);

    engine.unbind().await;
    assert!(group.was_called(|c| *c == GroupCall::Detach));
    assert!(!group.has_sink());
    assert!(group.is_removed());
}

#[tokio::test(start_paused = true)]
async fn test_event_without_initial_refresh() {
    let server = MockServer::new("sim");
    server.set_value("A", 1i32);
    let settings = EngineFixtures::event("events").with_initial_refresh(false);
    let engine = engine_for(&server, settings);
    let recorder = RecordingCallback::new();
    engine.add_item("A", recorder.clone()).await.unwrap();
    engine.bind().await;
    server.connect().await.unwrap();
    assert!(wait_until(WAIT, || engine.is_active()).await);

    let group = server.last_group().unwrap();
    assert!(wait_until(WAIT, || group.has_sink()).await);
    assert!(!group.was_called(|c| matches!(c, GroupCall::Refresh(_))));
    assert_eq!(recorder.count(), 0);

    group.emit_values(&[("A", Variant::Int32(4))]).await;
    assert_eq!(recorder.values_for("A"), vec![Variant::Int32(4)]);
    engine.unbind().await;
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_lifecycle_group_activated_after_items() {
    let server = MockServer::new("sim");
    server.set_value("A", 1i32);
    let engine = engine_for(&server, EngineFixtures::polling("poll"));
    engine.add_item("A", RecordingCallback::new()).await.unwrap();
    engine.bind().await;
    server.connect().await.unwrap();
    assert!(wait_until(WAIT, || server.last_group().map_or(false, |g| g.is_active())).await);

    let group = server.last_group().unwrap();
    assert_eq!(group.update_rate(), TEST_PERIOD);
    let calls = group.calls();
    let added = calls
        .iter()
        .position(|c| matches!(c, GroupCall::AddItems(_)))
        .unwrap();
    let activated = calls
        .iter()
        .position(|c| *c == GroupCall::SetState(true))
        .unwrap();
    assert!(added < activated);
    assert_eq!(engine.group().unwrap().update_rate(), TEST_PERIOD);
    engine.unbind().await;
}

#[tokio::test(start_paused = true)]
async fn test_lifecycle_bind_unbind() {
    let server = MockServer::new("sim");
    server.force_connected();
    let listener = RecordingStateListener::new();
    let engine = AccessEngine::builder(server.clone())
        .settings(EngineFixtures::polling("poll"))
        .state_listener(listener.clone())
        .build()
        .unwrap();
    let mut active = engine.subscribe_active();

    engine.bind().await;
    engine.bind().await;
    assert!(engine.is_bound());
    assert!(engine.is_active());
    assert!(*active.borrow_and_update());
    assert_eq!(server.listener_count(), 1);
    assert_eq!(server.groups().len(), 1);

    engine.unbind().await;
    engine.unbind().await;
    assert!(!engine.is_bound());
    assert!(!engine.is_active());
    assert!(!*active.borrow_and_update());
    assert_eq!(server.listener_count(), 0);
    assert!(server.last_group().unwrap().is_removed());
    assert_eq!(listener.transitions(), vec![true, false]);

    // No longer reacts to connection changes.
    server.drop_connection();
    server.force_connected();
    tokio::time::sleep(TEST_PERIOD * 3).await;
    assert_eq!(server.groups().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_lifecycle_poll_failure_forces_disconnect() {
    init_test_logging();
    let server = MockServer::new("sim");
    server.set_value("A", 1i32);
    let listener = RecordingStateListener::new();
    let engine = AccessEngine::builder(server.clone())
        .settings(EngineFixtures::polling("poll"))
        .state_listener(listener.clone())
        .build()
        .unwrap();
    engine.add_item("A", RecordingCallback::new()).await.unwrap();
    engine.bind().await;
    server.connect().await.unwrap();
    assert!(wait_until(WAIT, || engine.realized_items().len() == 1).await);

    server.fail_reads(true);
    assert!(wait_until(WAIT, || !engine.is_active()).await);
    assert_eq!(server.dispose_count(), 1);
    assert!(!server.is_connected());
    assert_eq!(listener.errors().len(), 1);
    assert_eq!(listener.transitions(), vec![true, false]);
    engine.unbind().await;
}

#[tokio::test(start_paused = true)]
async fn test_lifecycle_poll_error_cleared() {
    let server = MockServer::new("sim");
    server.set_value("A", 1i32);
    server.keep_alive_on_dispose(true);
    let listener = RecordingStateListener::new();
    let engine = AccessEngine::builder(server.clone())
        .settings(EngineFixtures::polling("poll"))
        .state_listener(listener.clone())
        .build()
        .unwrap();
    engine.add_item("A", RecordingCallback::new()).await.unwrap();
    engine.bind().await;
    server.connect().await.unwrap();
    assert!(wait_until(WAIT, || engine.realized_items().len() == 1).await);

    server.fail_reads(true);
    assert!(wait_until(WAIT, || !listener.errors().is_empty()).await);
    server.fail_reads(false);
    assert!(wait_until(WAIT, || listener.cleared_count() == 1).await);
    assert!(engine.is_active());
    engine.unbind().await;
}

#[tokio::test(start_paused = true)]
async fn test_lifecycle_group_creation_failure() {
    init_test_logging();
    let server = MockServer::new("sim");
    server.fail_add_group(true);
    let listener = RecordingStateListener::new();
    let engine = AccessEngine::builder(server.clone())
        .settings(EngineFixtures::polling("poll"))
        .state_listener(listener.clone())
        .build()
        .unwrap();
    engine.bind().await;
    server.connect().await.unwrap();

    assert!(wait_until(WAIT, || server.dispose_count() == 1).await);
    assert!(!engine.is_active());
    assert_eq!(listener.errors().len(), 1);
    engine.unbind().await;
}

// =============================================================================
// Group
// =============================================================================

#[tokio::test]
async fn test_group_mixed_add_and_lookup() {
    let server = MockServer::new("sim");
    server.force_connected();
    server.reject_item("Nope");
    server.set_value("A", 1i32);
    let remote = server.add_group("g", true, TEST_PERIOD).await.unwrap();
    let group = Group::new(remote, TEST_PERIOD);

    let outcome = group.add_items(&ids(&["A", "Nope", "B"])).await.unwrap();
    assert_eq!(outcome.added.len(), 2);
    assert_eq!(outcome.failed, vec![(ItemId::new("Nope"), ErrorCode::OPC_E_UNKNOWNITEMID)]);
    assert!(!outcome.is_complete());
    assert_eq!(group.len(), 2);

    let a = group.find(&ItemId::new("A")).unwrap();
    assert_eq!(group.find_by_client_handle(a.client_handle()), Some(a.clone()));
    assert_ne!(a.client_handle(), outcome.added[1].client_handle());

    let states = group.read(DataSource::Device, &outcome.added).await.unwrap();
    assert_eq!(states.len(), 2);
    assert_eq!(states[0].1.value, Variant::Int32(1));
    assert_eq!(states[1].1, opcda_core::ItemState::default());

    let mock = server.last_group().unwrap();
    assert!(mock.is_active());
    group.set_active(false).await.unwrap();
    assert!(!mock.is_active());
    assert_eq!(mock.update_rate(), group.update_rate());

    group.remove_items(&ids(&["A"])).await.unwrap();
    assert!(group.find(&ItemId::new("A")).is_none());
    assert!(group.find_by_client_handle(a.client_handle()).is_none());
    assert!(group.add_item(&ItemId::new("Nope")).await.is_err());

    group.remove().await.unwrap();
    assert!(group.is_empty());
}
