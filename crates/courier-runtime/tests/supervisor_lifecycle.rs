//! Connection supervisor lifecycle tests
//!
//! Drives the supervisor through a scripted `MockConnector` on a paused
//! tokio clock, so backoff schedules can be asserted exactly.

use courier_core::{AppEvent, CourierConfig, DisconnectReason, LifecycleEvent, SessionState};
use courier_harness::{ConnectScript, EventRecorder, MockConnector, MockTimeSource};
use courier_runtime::{RuntimeBuilder, RuntimeHandle};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

// ----------------------------------------------------------------------------
// Test Utilities
// ----------------------------------------------------------------------------

async fn create_test_runtime(connector: &MockConnector) -> (RuntimeHandle, EventRecorder) {
    let runtime = RuntimeBuilder::new(Arc::new(connector.clone()))
        .with_config(CourierConfig::testing())
        .with_time_source(Arc::new(MockTimeSource::new(1_709_287_200_000)))
        .build_and_start()
        .await
        .expect("runtime should start");
    let events = EventRecorder::new(runtime.subscribe());
    (runtime, events)
}

async fn wait_connected(events: &mut EventRecorder) {
    events
        .wait_for(|e| matches!(e, AppEvent::Connected))
        .await
        .expect("should connect");
}

// ----------------------------------------------------------------------------
// Connect and Pairing
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_start_goes_online() {
    let connector = MockConnector::new();
    let (mut runtime, mut events) = create_test_runtime(&connector).await;

    runtime.start().await.unwrap();
    wait_connected(&mut events).await;

    assert_eq!(runtime.state(), SessionState::Online);
    assert!(runtime.is_online());
    assert_eq!(connector.connect_count(), 1);
    assert!(events.statuses().contains(&"connection connecting".to_string()));

    runtime.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_start_ignored_while_online() {
    let connector = MockConnector::new();
    let (mut runtime, mut events) = create_test_runtime(&connector).await;

    runtime.start().await.unwrap();
    wait_connected(&mut events).await;
    runtime.start().await.unwrap();

    let ignored = events
        .wait_for(|e| matches!(e, AppEvent::Status { text } if text.starts_with("start ignored")))
        .await;
    assert!(ignored.is_some());
    assert_eq!(connector.connect_count(), 1);

    runtime.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_pairing_artifact_published_and_cleared() {
    let connector = MockConnector::new();
    connector.push_script(ConnectScript::pair_only("2@pairing-ref,key"));
    let (mut runtime, mut events) = create_test_runtime(&connector).await;

    runtime.start().await.unwrap();
    let qr = events
        .wait_for(|e| matches!(e, AppEvent::QrReady { .. }))
        .await
        .unwrap();
    assert_eq!(
        qr,
        AppEvent::QrReady {
            artifact: "2@pairing-ref,key".to_string()
        }
    );
    assert_eq!(runtime.state(), SessionState::AwaitingPairing);
    assert_eq!(
        runtime.pairing_artifact().as_deref(),
        Some("2@pairing-ref,key")
    );

    assert!(connector.complete_pairing());
    wait_connected(&mut events).await;
    assert!(runtime.pairing_artifact().is_none());

    runtime.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_construction_failure_retries_after_initial_delay() {
    let connector = MockConnector::new();
    connector.push_script(ConnectScript::fail("socket refused"));
    let (mut runtime, mut events) = create_test_runtime(&connector).await;

    let started = Instant::now();
    runtime.start().await.unwrap();
    wait_connected(&mut events).await;

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(500), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(1_000), "elapsed {:?}", elapsed);
    assert_eq!(connector.connect_count(), 2);
    assert!(events
        .statuses()
        .iter()
        .any(|s| s.starts_with("session construction failed")));

    runtime.shutdown().await.unwrap();
}

// ----------------------------------------------------------------------------
// Reconnect Policy
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_transient_drops_back_off_then_give_up() {
    let connector = MockConnector::with_default(ConnectScript::CloseWith(
        DisconnectReason::ConnectionLost,
    ));
    connector.push_script(ConnectScript::Open);
    let (mut runtime, mut events) = create_test_runtime(&connector).await;

    runtime.start().await.unwrap();
    wait_connected(&mut events).await;

    let dropped_at = Instant::now();
    assert!(connector.drop_connection(DisconnectReason::ConnectionLost));

    let unavailable = events
        .wait_for(|e| matches!(e, AppEvent::Unavailable { .. }))
        .await
        .unwrap();
    assert_eq!(unavailable, AppEvent::Unavailable { attempts: 4 });
    assert_eq!(runtime.state(), SessionState::Unavailable);

    // 1s + 2s + 4s of backoff, then the fourth failure exceeds the ceiling
    let elapsed = dropped_at.elapsed();
    assert!(elapsed >= Duration::from_millis(7_000), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(8_000), "elapsed {:?}", elapsed);
    assert_eq!(connector.connect_count(), 4);

    let statuses = events.statuses();
    for expected in [
        "reconnecting in 1000ms (attempt 1/3)",
        "reconnecting in 2000ms (attempt 2/3)",
        "reconnecting in 4000ms (attempt 3/3)",
    ] {
        assert!(
            statuses.iter().any(|s| s == expected),
            "missing status {:?}",
            expected
        );
    }

    // Nothing else happens until a manual restart
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(connector.connect_count(), 4);

    connector.push_script(ConnectScript::Open);
    runtime.restart().await.unwrap();
    wait_connected(&mut events).await;
    assert_eq!(connector.connect_count(), 5);

    runtime.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_restart_required_reconnects_immediately() {
    let connector = MockConnector::new();
    let (mut runtime, mut events) = create_test_runtime(&connector).await;

    runtime.start().await.unwrap();
    wait_connected(&mut events).await;

    let dropped_at = Instant::now();
    assert!(connector.drop_connection(DisconnectReason::RestartRequired));
    let disconnected = events
        .wait_for(|e| matches!(e, AppEvent::Disconnected { .. }))
        .await
        .unwrap();
    assert_eq!(
        disconnected,
        AppEvent::Disconnected {
            reason: DisconnectReason::RestartRequired
        }
    );
    wait_connected(&mut events).await;

    assert!(dropped_at.elapsed() < Duration::from_millis(1_000));
    assert_eq!(connector.connect_count(), 2);
    assert!(events
        .statuses()
        .iter()
        .any(|s| s == "reconnecting in 0ms (attempt 1/3)"));

    runtime.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_successful_reconnect_resets_attempts() {
    let connector = MockConnector::new();
    let (mut runtime, mut events) = create_test_runtime(&connector).await;

    runtime.start().await.unwrap();
    wait_connected(&mut events).await;

    for _ in 0..5 {
        assert!(connector.drop_connection(DisconnectReason::TimedOut));
        wait_connected(&mut events).await;
    }

    // Each drop starts again from the first attempt
    let first_attempts = events
        .statuses()
        .iter()
        .filter(|s| *s == "reconnecting in 1000ms (attempt 1/3)")
        .count();
    assert_eq!(first_attempts, 5);
    assert_eq!(runtime.state(), SessionState::Online);

    runtime.shutdown().await.unwrap();
}

// ----------------------------------------------------------------------------
// Authoritative Invalidation and Reset
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_logout_purges_and_waits_for_start() {
    let connector = MockConnector::new();
    let (mut runtime, mut events) = create_test_runtime(&connector).await;

    runtime.start().await.unwrap();
    wait_connected(&mut events).await;

    assert!(connector.drop_connection(DisconnectReason::LoggedOut));
    events
        .wait_for(|e| matches!(e, AppEvent::LoggedOut))
        .await
        .unwrap();

    assert_eq!(runtime.state(), SessionState::LoggedOut);
    assert_eq!(connector.purge_count(), 1);

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(connector.connect_count(), 1);

    runtime.start().await.unwrap();
    wait_connected(&mut events).await;
    assert_eq!(connector.connect_count(), 2);

    runtime.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_multidevice_mismatch_is_authoritative() {
    let connector = MockConnector::new();
    connector.push_script(ConnectScript::CloseWith(
        DisconnectReason::MultideviceMismatch,
    ));
    let (mut runtime, mut events) = create_test_runtime(&connector).await;

    runtime.start().await.unwrap();
    events
        .wait_for(|e| matches!(e, AppEvent::LoggedOut))
        .await
        .unwrap();

    assert_eq!(runtime.state(), SessionState::LoggedOut);
    assert_eq!(connector.purge_count(), 1);
    assert_eq!(connector.connect_count(), 1);

    runtime.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_force_reset_purges_and_reconnects() {
    let connector = MockConnector::new();
    let (mut runtime, mut events) = create_test_runtime(&connector).await;

    runtime.start().await.unwrap();
    wait_connected(&mut events).await;

    runtime.force_reset().await.unwrap();
    wait_connected(&mut events).await;

    assert_eq!(connector.purge_count(), 1);
    assert_eq!(connector.connect_count(), 2);
    assert!(events
        .statuses()
        .iter()
        .any(|s| s == "connection idle"));

    runtime.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_force_reset_while_unavailable() {
    let connector = MockConnector::with_default(ConnectScript::fail("unreachable"));
    let (mut runtime, mut events) = create_test_runtime(&connector).await;

    runtime.start().await.unwrap();
    events
        .wait_for(|e| matches!(e, AppEvent::Unavailable { .. }))
        .await
        .unwrap();

    connector.push_script(ConnectScript::Open);
    runtime.force_reset().await.unwrap();
    wait_connected(&mut events).await;
    assert_eq!(connector.purge_count(), 1);

    runtime.shutdown().await.unwrap();
}

// ----------------------------------------------------------------------------
// Stale Generations
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_events_from_replaced_session_are_ignored() {
    let connector = MockConnector::new();
    let (mut runtime, mut events) = create_test_runtime(&connector).await;

    runtime.start().await.unwrap();
    wait_connected(&mut events).await;
    runtime.restart().await.unwrap();
    wait_connected(&mut events).await;
    let generation = runtime.supervisor().snapshot().generation;

    assert!(connector.emit_for_attempt(
        1,
        LifecycleEvent::Closed {
            reason: DisconnectReason::ConnectionLost
        }
    ));
    assert!(connector.emit_for_attempt(1, LifecycleEvent::Open));
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(runtime.state(), SessionState::Online);
    assert_eq!(runtime.supervisor().snapshot().generation, generation);
    assert_eq!(connector.connect_count(), 2);
    assert!(!events
        .drain()
        .iter()
        .any(|e| matches!(e, AppEvent::Disconnected { .. })));

    runtime.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_restart_cancels_pending_retry() {
    let connector = MockConnector::new();
    let (mut runtime, mut events) = create_test_runtime(&connector).await;

    runtime.start().await.unwrap();
    wait_connected(&mut events).await;

    // Drop schedules a 1s retry; restart connects right away instead
    assert!(connector.drop_connection(DisconnectReason::ConnectionClosed));
    runtime
        .supervisor()
        .wait_for_state(|s| s == SessionState::Reconnecting)
        .await
        .unwrap();
    runtime.restart().await.unwrap();
    wait_connected(&mut events).await;
    assert_eq!(connector.connect_count(), 2);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(connector.connect_count(), 2);
    assert_eq!(runtime.state(), SessionState::Online);

    runtime.shutdown().await.unwrap();
}
