// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Connection Integration Tests
//!
//! State machine, reconnect and liveness handling.
//!
//! ## Test Categories
//!
//! - `test_lifecycle_*`: connect / disconnect
//! - `test_reconnect_*`: keep-alive driven reconnects
//! - `test_closing_*`: server-initiated session closing

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use trap_uaclient::{
    Callback, Connection, ConnectionState, DataValue, ErrorSource, Notification, RemoteSession, UaClientError,
    Variant,
};

use trap_tests::common::{
    assert_containers, drain_transitions, expect_transition, init_test_logging, mock_stack, wait_for_state,
    wait_until, NodeFixtures, ReconnectMode, WAIT,
};

use ConnectionState::{Connected, Connecting, Disconnected, Reconnecting};

fn ignore<T: Send + 'static>() -> Callback<T> {
    Callback::sync(|_: Notification<T>| {})
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_lifecycle_connect_and_disconnect() {
    init_test_logging();
    let (server, connector, config) = mock_stack(10);
    let connection = Connection::new(NodeFixtures::identity(server.endpoint()), config, connector.clone());
    let mut events = connection.state_changes();
    let cancel = CancellationToken::new();

    assert_eq!(connection.state(), Disconnected);
    connection.connect(&cancel).await.unwrap();
    assert!(connection.is_connected());
    assert_eq!(connection.session_name(), "TRAP.Worker.line1");
    assert_eq!(connector.last_session().unwrap().name(), "TRAP.Worker.line1");

    connection.disconnect().await.unwrap();
    connection.disconnect().await.unwrap();
    assert_eq!(connection.state(), Disconnected);
    assert!(connector.last_session().unwrap().is_closed());

    assert_eq!(
        drain_transitions(&mut events),
        vec![(Disconnected, Connecting), (Connecting, Connected), (Connected, Disconnected)]
    );
}

#[tokio::test]
async fn test_lifecycle_zero_event_capacity_still_publishes() {
    let (server, connector, mut config) = mock_stack(10);
    config.event_capacity = 0;
    assert!(config.validate().is_err());

    let connection = Connection::new(NodeFixtures::identity(server.endpoint()), config, connector.clone());
    let mut events = connection.state_changes();
    connection.connect(&CancellationToken::new()).await.unwrap();

    // One slot: the receiver lags to the latest transition.
    let latest = tokio::time::timeout(WAIT, events.recv()).await.unwrap().unwrap();
    assert_eq!((latest.old, latest.new), (Connecting, Connected));
}

#[tokio::test]
async fn test_lifecycle_connect_twice_is_rejected() {
    let (server, connector, config) = mock_stack(10);
    let connection = Connection::new(NodeFixtures::identity(server.endpoint()), config, connector.clone());
    let cancel = CancellationToken::new();

    connection.connect(&cancel).await.unwrap();
    let err = connection.connect(&cancel).await.unwrap_err();
    assert!(matches!(
        err,
        UaClientError::Connection(trap_uaclient::ConnectionError::AlreadyConnected { .. })
    ));
    assert_eq!(connector.open_count(), 1);
}

#[tokio::test]
async fn test_lifecycle_failed_open_returns_to_disconnected() {
    let (server, connector, config) = mock_stack(10);
    let connection = Connection::new(NodeFixtures::identity(server.endpoint()), config, connector.clone());
    let cancel = CancellationToken::new();

    server.set_fail_open(true);
    let err = connection.connect(&cancel).await.unwrap_err();
    assert_eq!(err.category(), "connection");
    assert!(err.is_retryable());
    assert_eq!(connection.state(), Disconnected);
    assert_eq!(connection.stats().connect_failures, 1);

    server.set_fail_open(false);
    connection.connect(&cancel).await.unwrap();
    assert_eq!(connection.state(), Connected);
}

#[tokio::test]
async fn test_lifecycle_cancelled_connect() {
    let (server, connector, config) = mock_stack(10);
    connector.set_open_latency(Duration::from_secs(30));
    let connection = Connection::new(NodeFixtures::identity(server.endpoint()), config, connector.clone());
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = connection.connect(&cancel).await.unwrap_err();
    assert_eq!(err.category(), "cancelled");
    assert_eq!(connection.state(), Disconnected);
}

#[tokio::test]
async fn test_lifecycle_operations_require_connection() {
    let (server, connector, config) = mock_stack(10);
    let connection = Connection::new(NodeFixtures::identity(server.endpoint()), config, connector.clone());
    let cancel = CancellationToken::new();

    let err = connection
        .read::<f64>(&NodeFixtures::tag("A"), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        UaClientError::Connection(trap_uaclient::ConnectionError::NotConnected)
    ));
    assert!(connection
        .write(&NodeFixtures::tag("A"), 1.0f64, &cancel)
        .await
        .is_err());
}

// =============================================================================
// Reconnect
// =============================================================================

#[tokio::test]
async fn test_reconnect_restores_containers_on_new_session() {
    let (server, connector, config) = mock_stack(2);
    let connection = Connection::new(NodeFixtures::identity(server.endpoint()), config, connector.clone());
    let mut events = connection.state_changes();
    let cancel = CancellationToken::new();
    connection.connect(&cancel).await.unwrap();

    let (a, b, c) = (NodeFixtures::tag("A"), NodeFixtures::tag("B"), NodeFixtures::tag("C"));
    let (tx, mut rx) = mpsc::channel(8);
    connection
        .subscribe_many(vec![a.clone(), b.clone()], Callback::channel(tx), &cancel)
        .await
        .unwrap();
    connection.subscribe(c.clone(), ignore::<f64>(), &cancel).await.unwrap();

    let first = connector.last_session().unwrap();
    first.keep_alive_bad();

    let entered = expect_transition(&mut events, Reconnecting).await;
    assert_eq!(entered.old, Connected);
    let json = serde_json::to_value(&entered).unwrap();
    assert_eq!(json["new"], "reconnecting");
    expect_transition(&mut events, Connected).await;

    let second = connector.last_session().unwrap();
    assert_ne!(first.id(), second.id());
    assert!(first.is_closed());
    assert_eq!(first.observer_count(), 0);
    assert_containers(&server.containers(), &[&[&a, &b], &[&c]]);

    assert!(!first.data_change(&a, DataValue::good(Variant::Double(0.5))));
    assert!(second.data_change(&b, DataValue::good(Variant::Double(1.0))));
    let received: Notification<f64> = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(received.address, b);
    assert_eq!(received.value, 1.0);
    assert!(rx.try_recv().is_err());

    let stats = connection.stats();
    assert_eq!(stats.reconnect_attempts, 1);
    assert_eq!(stats.reconnects_succeeded, 1);
    assert_eq!(serde_json::to_value(&stats).unwrap()["keep_alive_failures"], 1);
    assert!(!connection.is_reconnecting());
}

#[tokio::test]
async fn test_reconnect_reactivated_session_is_kept() {
    let (server, connector, config) = mock_stack(2);
    connector.set_reconnect_mode(ReconnectMode::Reactivate);
    let connection = Connection::new(NodeFixtures::identity(server.endpoint()), config, connector.clone());
    let mut events = connection.state_changes();
    let cancel = CancellationToken::new();
    connection.connect(&cancel).await.unwrap();
    connection
        .subscribe(NodeFixtures::tag("A"), ignore::<f64>(), &cancel)
        .await
        .unwrap();
    drain_transitions(&mut events);

    let session = connector.last_session().unwrap();
    session.keep_alive_bad();
    expect_transition(&mut events, Connected).await;

    assert!(!session.is_closed());
    assert_eq!(connector.sessions().len(), 1);
    assert_eq!(server.point_count(), 1);
}

#[tokio::test]
async fn test_reconnect_second_bad_signal_is_ignored() {
    let (server, connector, config) = mock_stack(10);
    connector.set_reconnect_mode(ReconnectMode::Manual);
    let connection = Connection::new(NodeFixtures::identity(server.endpoint()), config, connector.clone());
    let cancel = CancellationToken::new();
    connection.connect(&cancel).await.unwrap();

    let session = connector.last_session().unwrap();
    session.keep_alive_bad();
    session.keep_alive_bad();

    wait_for_state(&connection, Reconnecting).await;
    session.keep_alive_bad();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(connector.reconnect_count(), 1);
    assert!(connection.is_reconnecting());
    let stats = connection.stats();
    assert_eq!(stats.keep_alive_failures, 1);
    assert_eq!(stats.stale_events, 1);

    let err = connection.connect(&cancel).await.unwrap_err();
    assert_eq!(err.category(), "connection");

    connector.complete_pending(true).unwrap();
    wait_for_state(&connection, Connected).await;
    assert!(!connection.is_reconnecting());
}

#[tokio::test]
async fn test_reconnect_bad_keep_alive_while_connecting_is_not_lost() {
    let (server, connector, config) = mock_stack(10);
    let connection = Connection::new(NodeFixtures::identity(server.endpoint()), config, connector.clone());
    let mut events = connection.state_changes();
    let cancel = CancellationToken::new();

    let a = NodeFixtures::tag("A");
    connection.subscribe(a.clone(), ignore::<f64>(), &cancel).await.unwrap();
    server.set_keep_alive_bad_on_create(true);

    connection.connect(&cancel).await.unwrap();
    wait_for_state(&connection, Connected).await;

    assert_eq!(
        drain_transitions(&mut events),
        vec![(Disconnected, Connecting), (Connecting, Reconnecting), (Reconnecting, Connected)]
    );
    assert_eq!(connector.reconnect_count(), 1);
    assert_eq!(connection.stats().keep_alive_failures, 1);

    let sessions = connector.sessions();
    assert_eq!(sessions.len(), 2);
    assert!(sessions[0].is_closed());
    assert_containers(&server.containers(), &[&[&a]]);
    assert!(sessions[1].data_change(&a, DataValue::good(Variant::Double(2.0))));
}

#[tokio::test]
async fn test_reconnect_good_keep_alive_changes_nothing() {
    let (server, connector, config) = mock_stack(10);
    let connection = Connection::new(NodeFixtures::identity(server.endpoint()), config, connector.clone());
    let mut events = connection.state_changes();
    let cancel = CancellationToken::new();
    connection.connect(&cancel).await.unwrap();
    drain_transitions(&mut events);

    connector.last_session().unwrap().keep_alive_good();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(connector.reconnect_count(), 0);
    assert!(drain_transitions(&mut events).is_empty());
}

#[tokio::test]
async fn test_reconnect_failure_goes_disconnected() {
    let (server, connector, config) = mock_stack(10);
    connector.set_reconnect_mode(ReconnectMode::Fail);
    let connection = Connection::new(NodeFixtures::identity(server.endpoint()), config, connector.clone());
    let mut errors = connection.errors();
    let cancel = CancellationToken::new();
    connection.connect(&cancel).await.unwrap();
    connection
        .subscribe(NodeFixtures::tag("A"), ignore::<f64>(), &cancel)
        .await
        .unwrap();

    connector.last_session().unwrap().keep_alive_bad();
    wait_for_state(&connection, Disconnected).await;

    let event = tokio::time::timeout(WAIT, errors.recv()).await.unwrap().unwrap();
    assert_eq!(event.source, ErrorSource::Reconnect);
    assert_eq!(event.error.category(), "reconnect");
    assert_eq!(connection.stats().reconnects_failed, 1);

    // Subscriptions survive and are recreated by the next connect.
    assert_eq!(connection.point_count(), 1);
    connection.connect(&cancel).await.unwrap();
    assert_eq!(server.point_count(), 1);
}

#[tokio::test]
async fn test_reconnect_stale_completion_is_discarded() {
    let (server, connector, config) = mock_stack(10);
    connector.set_reconnect_mode(ReconnectMode::Manual);
    let connection = Connection::new(NodeFixtures::identity(server.endpoint()), config, connector.clone());
    let cancel = CancellationToken::new();
    connection.connect(&cancel).await.unwrap();

    connector.last_session().unwrap().keep_alive_bad();
    wait_for_state(&connection, Reconnecting).await;

    connection.disconnect().await.unwrap();
    assert_eq!(connection.state(), Disconnected);

    let late = connector.complete_pending(true).unwrap();
    wait_until("late session closed", || late.is_closed()).await;
    wait_until("old containers dropped", || server.container_count() == 0).await;

    assert_eq!(connection.state(), Disconnected);
    assert_eq!(connection.stats().reconnects_succeeded, 0);
}

#[tokio::test]
async fn test_reconnect_events_from_old_session_are_ignored() {
    let (server, connector, config) = mock_stack(10);
    let connection = Connection::new(NodeFixtures::identity(server.endpoint()), config, connector.clone());
    let mut events = connection.state_changes();
    let cancel = CancellationToken::new();
    connection.connect(&cancel).await.unwrap();
    drain_transitions(&mut events);

    let first = connector.last_session().unwrap();
    first.keep_alive_bad();
    expect_transition(&mut events, Connected).await;

    first.closing();
    first.keep_alive_bad();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(connection.state(), Connected);
    assert_eq!(connector.reconnect_count(), 1);
}

// =============================================================================
// Session Closing
// =============================================================================

#[tokio::test]
async fn test_closing_moves_to_disconnected() {
    let (server, connector, config) = mock_stack(10);
    let connection = Connection::new(NodeFixtures::identity(server.endpoint()), config, connector.clone());
    let mut errors = connection.errors();
    let cancel = CancellationToken::new();
    connection.connect(&cancel).await.unwrap();
    let a = NodeFixtures::tag("A");
    connection.subscribe(a.clone(), ignore::<f64>(), &cancel).await.unwrap();

    let session = connector.last_session().unwrap();
    session.closing();
    wait_for_state(&connection, Disconnected).await;

    let event = tokio::time::timeout(WAIT, errors.recv()).await.unwrap().unwrap();
    assert_eq!(event.source, ErrorSource::Liveness);
    assert!(session.is_closed());
    assert_eq!(connector.reconnect_count(), 0);

    connection.connect(&cancel).await.unwrap();
    assert_containers(&server.containers(), &[&[&a]]);
}
