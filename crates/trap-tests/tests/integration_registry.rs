// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Client Registry Integration Tests
//!
//! Connection sharing, limits and disposal.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use trap_uaclient::{ClientRegistry, ConnectionState, RegistryError, RemoteIdentity, UaClientError};

use trap_tests::common::{init_test_logging, mock_stack, NodeFixtures};

#[tokio::test]
async fn test_create_or_get_shares_connection() {
    init_test_logging();
    let (server, connector, config) = mock_stack(10);
    let registry = ClientRegistry::new(config, connector.clone());
    let cancel = CancellationToken::new();
    let identity = NodeFixtures::identity(server.endpoint());

    let first = registry.create_or_get_connection(identity.clone(), &cancel).await.unwrap();
    let second = registry.create_or_get_connection(identity.clone(), &cancel).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(connector.open_count(), 1);
    assert_eq!(registry.len().await, 1);
    assert_eq!(registry.state_of(&identity).await, Some(ConnectionState::Connected));
}

#[tokio::test]
async fn test_create_or_get_reconnects_disconnected_entry() {
    let (server, connector, config) = mock_stack(10);
    let registry = ClientRegistry::new(config, connector.clone());
    let cancel = CancellationToken::new();
    let identity = NodeFixtures::identity(server.endpoint());

    let connection = registry.create_or_get_connection(identity.clone(), &cancel).await.unwrap();
    connection.disconnect().await.unwrap();

    let again = registry.create_or_get_connection(identity, &cancel).await.unwrap();
    assert!(Arc::ptr_eq(&connection, &again));
    assert!(again.is_connected());
    assert_eq!(connector.open_count(), 2);
}

#[tokio::test]
async fn test_concurrent_create_or_get_yields_one_entry() {
    let (server, connector, config) = mock_stack(10);
    let registry = Arc::new(ClientRegistry::new(config, connector.clone()));
    let identity = NodeFixtures::identity(server.endpoint());

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let registry = registry.clone();
            let identity = identity.clone();
            tokio::spawn(async move {
                registry
                    .create_or_get_connection(identity, &CancellationToken::new())
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut connections = Vec::new();
    for task in tasks {
        connections.push(task.await.unwrap());
    }

    assert_eq!(registry.len().await, 1);
    let registered = registry.get(&identity).await.unwrap();
    assert!(connections.iter().all(|c| Arc::ptr_eq(c, &registered)));
    assert!(registered.is_connected());
}

#[tokio::test]
async fn test_distinct_session_names_are_separate_connections() {
    let (server, connector, config) = mock_stack(10);
    let registry = ClientRegistry::new(config, connector.clone());
    let cancel = CancellationToken::new();

    let a = RemoteIdentity::new(server.endpoint(), "line1");
    let b = RemoteIdentity::new(server.endpoint(), "line2");
    registry.create_or_get_connection(b.clone(), &cancel).await.unwrap();
    registry.create_or_get_connection(a.clone(), &cancel).await.unwrap();

    assert_eq!(registry.identities().await, vec![a, b]);
    assert_eq!(registry.get_by_endpoint(server.endpoint()).await.len(), 2);
    assert!(registry.get_by_endpoint("opc.tcp://elsewhere:4840").await.is_empty());
}

#[tokio::test]
async fn test_capacity_is_enforced() {
    let (server, connector, mut config) = mock_stack(10);
    config.max_connections = 1;
    let registry = ClientRegistry::new(config, connector.clone());
    let cancel = CancellationToken::new();

    registry
        .create_or_get_connection(RemoteIdentity::new(server.endpoint(), "line1"), &cancel)
        .await
        .unwrap();
    let err = registry
        .create_or_get_connection(RemoteIdentity::new(server.endpoint(), "line2"), &cancel)
        .await
        .unwrap_err();

    assert_eq!(err.category(), "registry");
    assert!(matches!(
        err,
        UaClientError::Registry(RegistryError::CapacityExceeded { max: 1 })
    ));
    assert_eq!(connector.open_count(), 1);
}

#[tokio::test]
async fn test_create_connection_rejects_duplicates() {
    let (server, connector, config) = mock_stack(10);
    let registry = ClientRegistry::new(config, connector.clone());
    let cancel = CancellationToken::new();
    let identity = NodeFixtures::identity(server.endpoint());

    registry.create_connection(identity.clone(), &cancel).await.unwrap();
    let err = registry.create_connection(identity, &cancel).await.unwrap_err();

    assert!(matches!(
        err,
        UaClientError::Registry(RegistryError::DuplicateConnection { .. })
    ));
    assert_eq!(connector.open_count(), 1);
}

#[tokio::test]
async fn test_failed_connect_is_not_registered() {
    let (server, connector, config) = mock_stack(10);
    let registry = ClientRegistry::new(config, connector.clone());
    let cancel = CancellationToken::new();
    let identity = NodeFixtures::identity(server.endpoint());

    server.set_fail_open(true);
    let err = registry
        .create_or_get_connection(identity.clone(), &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.category(), "connection");
    assert!(!registry.contains(&identity).await);

    server.set_fail_open(false);
    registry.create_or_get_connection(identity.clone(), &cancel).await.unwrap();
    assert!(registry.contains(&identity).await);
}

#[tokio::test]
async fn test_remove_connection_disconnects() {
    let (server, connector, config) = mock_stack(10);
    let registry = ClientRegistry::new(config, connector.clone());
    let cancel = CancellationToken::new();
    let identity = NodeFixtures::identity(server.endpoint());

    let connection = registry.create_or_get_connection(identity.clone(), &cancel).await.unwrap();
    assert!(registry.remove_connection(&identity).await.unwrap());
    assert_eq!(connection.state(), ConnectionState::Disconnected);
    assert!(connector.last_session().unwrap().is_closed());

    assert!(!registry.remove_connection(&identity).await.unwrap());
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn test_dispose_disconnects_all_and_refuses_creation() {
    let (server, connector, config) = mock_stack(10);
    let registry = ClientRegistry::new(config, connector.clone());
    let cancel = CancellationToken::new();

    let a = registry
        .create_or_get_connection(RemoteIdentity::new(server.endpoint(), "line1"), &cancel)
        .await
        .unwrap();
    let b = registry
        .create_or_get_connection(RemoteIdentity::new(server.endpoint(), "line2"), &cancel)
        .await
        .unwrap();

    let results = registry.dispose().await;
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|(_, r)| r.is_ok()));
    assert!(registry.is_disposed());
    assert!(registry.is_empty().await);
    assert!(!a.is_connected() && !b.is_connected());
    assert!(connector.sessions().iter().all(|s| s.is_closed()));

    let err = registry
        .create_or_get_connection(NodeFixtures::identity(server.endpoint()), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, UaClientError::Registry(RegistryError::Disposed)));
    assert!(registry.dispose().await.is_empty());
}
