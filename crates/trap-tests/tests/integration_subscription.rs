// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Subscription Integration Tests
//!
//! Container packing, queued subscriptions and notification routing.
//!
//! ## Test Categories
//!
//! - `test_pack_*`: First-fit placement
//! - `test_queue_*`: Subscriptions made while disconnected
//! - `test_notify_*`: Notification delivery

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use trap_uaclient::{Callback, Connection, DataValue, Notification, RemoteSession, SessionEvent, StatusCode, Variant};

use trap_tests::common::{assert_containers, init_test_logging, mock_stack, wait_until, NodeFixtures, WAIT};

fn ignore<T: Send + 'static>() -> Callback<T> {
    Callback::sync(|_: Notification<T>| {})
}

// =============================================================================
// Packing
// =============================================================================

#[tokio::test]
async fn test_pack_first_fit_across_containers() {
    init_test_logging();
    let (server, connector, config) = mock_stack(2);
    let connection = Connection::new(NodeFixtures::identity(server.endpoint()), config, connector.clone());
    let cancel = CancellationToken::new();
    connection.connect(&cancel).await.unwrap();

    let (a, b, c) = (NodeFixtures::tag("A"), NodeFixtures::tag("B"), NodeFixtures::tag("C"));
    let ka = connection.subscribe(a.clone(), ignore::<f64>(), &cancel).await.unwrap();
    let kb = connection.subscribe(b.clone(), ignore::<f64>(), &cancel).await.unwrap();
    let kc = connection.subscribe(c.clone(), ignore::<f64>(), &cancel).await.unwrap();

    assert_eq!(ka, kb);
    assert_ne!(ka, kc);
    assert_containers(&server.containers(), &[&[&a, &b], &[&c]]);
    assert_eq!(connection.point_count(), 3);
}

#[tokio::test]
async fn test_pack_unsubscribe_shrinks_and_deletes() {
    let (server, connector, config) = mock_stack(2);
    let connection = Connection::new(NodeFixtures::identity(server.endpoint()), config, connector.clone());
    let cancel = CancellationToken::new();
    connection.connect(&cancel).await.unwrap();

    let (a, b, c) = (NodeFixtures::tag("A"), NodeFixtures::tag("B"), NodeFixtures::tag("C"));
    for node in [&a, &b, &c] {
        connection.subscribe(node.clone(), ignore::<f64>(), &cancel).await.unwrap();
    }

    assert!(connection.unsubscribe(&b, &cancel).await.unwrap());
    assert_containers(&server.containers(), &[&[&a], &[&c]]);

    assert!(connection.unsubscribe(&a, &cancel).await.unwrap());
    assert_containers(&server.containers(), &[&[&c]]);
    assert_eq!(connection.containers().await.len(), 1);

    assert!(!connection.unsubscribe(&a, &cancel).await.unwrap());
}

#[tokio::test]
async fn test_pack_subscribe_is_idempotent() {
    let (server, connector, config) = mock_stack(10);
    let connection = Connection::new(NodeFixtures::identity(server.endpoint()), config, connector.clone());
    let cancel = CancellationToken::new();
    connection.connect(&cancel).await.unwrap();

    let a = NodeFixtures::tag("A");
    let first = connection.subscribe(a.clone(), ignore::<i32>(), &cancel).await.unwrap();
    let second = connection.subscribe(a.clone(), ignore::<i32>(), &cancel).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(server.point_count(), 1);
    assert_eq!(connection.point_count(), 1);
}

#[tokio::test]
async fn test_pack_batch_subscribe_fills_containers() {
    let (server, connector, config) = mock_stack(3);
    let connection = Connection::new(NodeFixtures::identity(server.endpoint()), config, connector.clone());
    let cancel = CancellationToken::new();
    connection.connect(&cancel).await.unwrap();

    let tags = NodeFixtures::tags("T", 7);
    let placed = connection
        .subscribe_many(tags.clone(), ignore::<f64>(), &cancel)
        .await
        .unwrap();

    assert_eq!(placed.len(), 7);
    let sizes: Vec<usize> = server.containers().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![3, 3, 1]);
    assert!(server.containers().iter().all(|c| c.len() <= 3));
}

#[tokio::test]
async fn test_pack_failed_server_subscribe_rolls_back() {
    let (server, connector, config) = mock_stack(2);
    let connection = Connection::new(NodeFixtures::identity(server.endpoint()), config, connector.clone());
    let cancel = CancellationToken::new();
    connection.connect(&cancel).await.unwrap();

    server.set_fail_create_container(true);
    let err = connection
        .subscribe(NodeFixtures::tag("A"), ignore::<f64>(), &cancel)
        .await
        .unwrap_err();

    assert_eq!(err.category(), "subscription");
    assert_eq!(connection.point_count(), 0);
    assert!(connection.containers().await.is_empty());

    server.set_fail_create_container(false);
    connection
        .subscribe(NodeFixtures::tag("A"), ignore::<f64>(), &cancel)
        .await
        .unwrap();
    assert_eq!(server.point_count(), 1);
}

// =============================================================================
// Queued Subscriptions
// =============================================================================

#[tokio::test]
async fn test_queue_subscriptions_before_connect() {
    let (server, connector, config) = mock_stack(2);
    let connection = Connection::new(NodeFixtures::identity(server.endpoint()), config, connector.clone());
    let cancel = CancellationToken::new();

    let (a, b, c) = (NodeFixtures::tag("A"), NodeFixtures::tag("B"), NodeFixtures::tag("C"));
    for node in [&a, &b, &c] {
        connection.subscribe(node.clone(), ignore::<f64>(), &cancel).await.unwrap();
    }

    assert_eq!(server.container_count(), 0);
    let pending = connection.containers().await;
    assert_eq!(pending.len(), 2);
    assert!(pending.iter().all(|c| c.pending && c.server_id.is_none()));

    connection.connect(&cancel).await.unwrap();
    assert_containers(&server.containers(), &[&[&a, &b], &[&c]]);
    assert!(connection.containers().await.iter().all(|c| !c.pending));
}

#[tokio::test]
async fn test_queue_unsubscribe_before_connect_never_reaches_server() {
    let (server, connector, config) = mock_stack(2);
    let connection = Connection::new(NodeFixtures::identity(server.endpoint()), config, connector.clone());
    let cancel = CancellationToken::new();

    let (a, b) = (NodeFixtures::tag("A"), NodeFixtures::tag("B"));
    connection.subscribe(a.clone(), ignore::<f64>(), &cancel).await.unwrap();
    connection.subscribe(b.clone(), ignore::<f64>(), &cancel).await.unwrap();
    assert!(connection.unsubscribe(&a, &cancel).await.unwrap());

    connection.connect(&cancel).await.unwrap();
    assert_containers(&server.containers(), &[&[&b]]);
}

#[tokio::test]
async fn test_queue_cancelled_subscribe() {
    let (server, connector, config) = mock_stack(2);
    let connection = Connection::new(NodeFixtures::identity(server.endpoint()), config, connector.clone());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = connection
        .subscribe(NodeFixtures::tag("A"), ignore::<f64>(), &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.category(), "cancelled");
    assert_eq!(connection.point_count(), 0);
}

// =============================================================================
// Notifications
// =============================================================================

#[tokio::test]
async fn test_notify_channel_callback_receives_values() {
    let (server, connector, config) = mock_stack(10);
    let connection = Connection::new(NodeFixtures::identity(server.endpoint()), config, connector.clone());
    let cancel = CancellationToken::new();
    connection.connect(&cancel).await.unwrap();

    let a = NodeFixtures::tag("A");
    let (tx, mut rx) = mpsc::channel(8);
    connection.subscribe(a.clone(), Callback::<f64>::channel(tx), &cancel).await.unwrap();

    let session = connector.last_session().unwrap();
    assert!(session.data_change(&a, DataValue::good(Variant::Double(1.5))));
    assert!(session.data_change(&a, DataValue::good(Variant::Int32(2))));

    let first = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    let second = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(first.value, 1.5);
    assert_eq!(second.value, 2.0);
    assert_eq!(first.address, a);
}

#[tokio::test]
async fn test_notify_sync_callback_skips_bad_status() {
    let (server, connector, config) = mock_stack(10);
    let connection = Connection::new(NodeFixtures::identity(server.endpoint()), config, connector.clone());
    let cancel = CancellationToken::new();
    connection.connect(&cancel).await.unwrap();

    let a = NodeFixtures::tag("A");
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    connection
        .subscribe(
            a.clone(),
            Callback::sync(move |_: Notification<bool>| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            &cancel,
        )
        .await
        .unwrap();

    let session = connector.last_session().unwrap();
    session.data_change(&a, DataValue::bad(StatusCode::BAD_COMMUNICATION_ERROR));
    session.data_change(&a, DataValue::good(Variant::Boolean(true)));

    wait_until("one delivery", || hits.load(Ordering::SeqCst) == 1).await;
    wait_until("one drop", || connection.stats().pool.notifications_dropped == 1).await;
}

#[tokio::test]
async fn test_notify_undecodable_values_are_counted_not_reported() {
    let (server, connector, config) = mock_stack(10);
    let connection = Connection::new(NodeFixtures::identity(server.endpoint()), config, connector.clone());
    let mut errors = connection.errors();
    let cancel = CancellationToken::new();
    connection.connect(&cancel).await.unwrap();

    let a = NodeFixtures::tag("A");
    let (tx, mut rx) = mpsc::channel(8);
    connection.subscribe(a.clone(), Callback::channel(tx), &cancel).await.unwrap();

    let session = connector.last_session().unwrap();
    for _ in 0..3 {
        session.data_change(&a, DataValue::good(Variant::String("n/a".to_string())));
    }
    session.data_change(&a, DataValue::good(Variant::Double(4.5)));

    let received: Notification<f64> = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(received.value, 4.5);

    let point = connection.point(&a).unwrap();
    assert_eq!(point.value_type(), "f64");
    assert_eq!(point.stats().dropped, 3);
    assert_eq!(connection.stats().pool.notifications_dropped, 3);
    assert!(errors.try_recv().is_none());
    assert_eq!(connection.stats().errors, 0);
}

#[tokio::test]
async fn test_notify_async_callback_preserves_order() {
    let (server, connector, config) = mock_stack(10);
    let connection = Connection::new(NodeFixtures::identity(server.endpoint()), config, connector.clone());
    let cancel = CancellationToken::new();
    connection.connect(&cancel).await.unwrap();

    let a = NodeFixtures::tag("A");
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = seen.clone();
    connection
        .subscribe(
            a.clone(),
            Callback::asynchronous(move |n: Notification<i64>| {
                let sink = sink.clone();
                async move {
                    tokio::task::yield_now().await;
                    sink.lock().push(n.value);
                }
            }),
            &cancel,
        )
        .await
        .unwrap();

    let session = connector.last_session().unwrap();
    for i in 0..20 {
        session.data_change(&a, DataValue::good(Variant::Int64(i)));
    }

    wait_until("twenty deliveries", || seen.lock().len() == 20).await;
    assert_eq!(*seen.lock(), (0..20).collect::<Vec<i64>>());
}

#[tokio::test]
async fn test_notify_stops_after_unsubscribe() {
    let (server, connector, config) = mock_stack(10);
    let connection = Connection::new(NodeFixtures::identity(server.endpoint()), config, connector.clone());
    let cancel = CancellationToken::new();
    connection.connect(&cancel).await.unwrap();

    let a = NodeFixtures::tag("A");
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    connection
        .subscribe(
            a.clone(),
            Callback::sync(move |_: Notification<f64>| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            &cancel,
        )
        .await
        .unwrap();

    let session = connector.last_session().unwrap();
    let container = server.container_of(session.id(), &a);
    assert!(container.is_some());

    connection.unsubscribe(&a, &cancel).await.unwrap();
    session.emit(SessionEvent::DataChange {
        container: container.unwrap(),
        address: a.clone(),
        value: DataValue::good(Variant::Double(1.0)),
    });

    wait_until("unrouted notification", || connection.stats().pool.notifications_unrouted == 1).await;
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}
