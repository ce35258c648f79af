// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Process-wide registry of connections keyed by remote identity.
//!
//! # Example
//!
//! ```rust,ignore
//! use trap_uaclient::registry::ClientRegistry;
//!
//! let registry = ClientRegistry::new(config, connector);
//! let identity = RemoteIdentity::new("opc.tcp://plc-1:4840", "line1");
//!
//! // Returns the same connection on every call
//! let connection = registry.create_or_get_connection(identity, &cancel).await?;
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::client::{Connection, ConnectionState, SessionConnector};
use crate::config::ClientConfig;
use crate::error::{ConnectionError, RegistryError, UaClientError, UaClientResult};
use crate::types::RemoteIdentity;

/// Owns every [`Connection`] and enforces the connection limit.
///
/// At most one connection exists per [`RemoteIdentity`].
pub struct ClientRegistry {
    config: ClientConfig,
    connector: Arc<dyn SessionConnector>,
    connections: Mutex<HashMap<RemoteIdentity, Arc<Connection>>>,
    disposed: AtomicBool,
}

impl ClientRegistry {
    /// Creates an empty registry.
    pub fn new(config: ClientConfig, connector: Arc<dyn SessionConnector>) -> Self {
        Self {
            config,
            connector,
            connections: Mutex::new(HashMap::new()),
            disposed: AtomicBool::new(false),
        }
    }

    /// Returns the configuration handed to new connections.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn ensure_alive(&self) -> UaClientResult<()> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(RegistryError::Disposed.into());
        }
        Ok(())
    }

    async fn connect_existing(connection: &Arc<Connection>, cancel: &CancellationToken) -> UaClientResult<()> {
        if connection.state() != ConnectionState::Disconnected {
            return Ok(());
        }
        match connection.connect(cancel).await {
            Ok(()) | Err(UaClientError::Connection(ConnectionError::AlreadyConnected { .. })) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Returns the connection for `identity`, creating and connecting it
    /// if needed.
    ///
    /// An existing but disconnected connection is reconnected. New
    /// connections are opened outside the registry lock; if a concurrent
    /// caller registered the same identity first, that connection wins and
    /// ours is discarded.
    ///
    /// # Errors
    ///
    /// - `Registry::CapacityExceeded` if the connection limit is reached
    /// - `Registry::Disposed` after [`dispose`](Self::dispose)
    /// - any error from connecting; a new connection that fails is not
    ///   registered
    pub async fn create_or_get_connection(
        &self,
        identity: RemoteIdentity,
        cancel: &CancellationToken,
    ) -> UaClientResult<Arc<Connection>> {
        self.ensure_alive()?;

        let existing = self.connections.lock().await.get(&identity).cloned();
        if let Some(connection) = existing {
            Self::connect_existing(&connection, cancel).await?;
            return Ok(connection);
        }

        self.admit().await?;
        let connection = Connection::new(identity.clone(), self.config.clone(), self.connector.clone());
        connection.connect(cancel).await?;

        let mut connections = self.connections.lock().await;
        if self.disposed.load(Ordering::Acquire) {
            drop(connections);
            let _ = connection.disconnect().await;
            return Err(RegistryError::Disposed.into());
        }
        if let Some(winner) = connections.get(&identity).cloned() {
            drop(connections);
            tracing::debug!(identity = %identity, "Concurrent registration won, discarding duplicate");
            let _ = connection.disconnect().await;
            return Ok(winner);
        }
        if connections.len() >= self.config.max_connections {
            drop(connections);
            let _ = connection.disconnect().await;
            return Err(self.capacity_error());
        }
        connections.insert(identity.clone(), connection.clone());
        tracing::info!(identity = %identity, total = connections.len(), "Connection registered");
        Ok(connection)
    }

    /// Creates and connects a new connection, failing if one exists.
    ///
    /// # Errors
    ///
    /// Returns `Registry::DuplicateConnection` if `identity` is registered.
    pub async fn create_connection(
        &self,
        identity: RemoteIdentity,
        cancel: &CancellationToken,
    ) -> UaClientResult<Arc<Connection>> {
        self.ensure_alive()?;
        if self.contains(&identity).await {
            return Err(UaClientError::duplicate_connection(identity.to_string()));
        }
        self.admit().await?;

        let connection = Connection::new(identity.clone(), self.config.clone(), self.connector.clone());
        connection.connect(cancel).await?;

        let mut connections = self.connections.lock().await;
        if connections.contains_key(&identity) || self.disposed.load(Ordering::Acquire) {
            let duplicate = connections.contains_key(&identity);
            drop(connections);
            let _ = connection.disconnect().await;
            return Err(if duplicate {
                UaClientError::duplicate_connection(identity.to_string())
            } else {
                RegistryError::Disposed.into()
            });
        }
        if connections.len() >= self.config.max_connections {
            drop(connections);
            let _ = connection.disconnect().await;
            return Err(self.capacity_error());
        }
        connections.insert(identity.clone(), connection.clone());
        tracing::info!(identity = %identity, total = connections.len(), "Connection registered");
        Ok(connection)
    }

    async fn admit(&self) -> UaClientResult<()> {
        if self.connections.lock().await.len() >= self.config.max_connections {
            return Err(self.capacity_error());
        }
        Ok(())
    }

    fn capacity_error(&self) -> UaClientError {
        tracing::warn!(max = self.config.max_connections, "Connection limit reached");
        RegistryError::CapacityExceeded {
            max: self.config.max_connections,
        }
        .into()
    }

    /// Disconnects and removes a connection. Returns `false` if unknown.
    pub async fn remove_connection(&self, identity: &RemoteIdentity) -> UaClientResult<bool> {
        let removed = self.connections.lock().await.remove(identity);
        let Some(connection) = removed else {
            return Ok(false);
        };
        connection.disconnect().await?;
        tracing::info!(identity = %identity, "Connection removed");
        Ok(true)
    }

    /// Disconnects every connection and refuses further creation.
    ///
    /// Returns the per-connection results.
    pub async fn dispose(&self) -> Vec<(RemoteIdentity, UaClientResult<()>)> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Vec::new();
        }
        let drained: Vec<(RemoteIdentity, Arc<Connection>)> = self.connections.lock().await.drain().collect();

        let mut results = Vec::with_capacity(drained.len());
        for (identity, connection) in drained {
            let result = connection.disconnect().await;
            if let Err(e) = &result {
                tracing::warn!(identity = %identity, error = %e, "Failed to disconnect during dispose");
            }
            results.push((identity, result));
        }
        tracing::info!(connections = results.len(), "Client registry disposed");
        results
    }

    /// Returns `true` after [`dispose`](Self::dispose).
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Returns the connection for `identity`.
    pub async fn get(&self, identity: &RemoteIdentity) -> Option<Arc<Connection>> {
        self.connections.lock().await.get(identity).cloned()
    }

    /// Returns every connection to `endpoint`.
    pub async fn get_by_endpoint(&self, endpoint: &str) -> Vec<Arc<Connection>> {
        let connections = self.connections.lock().await;
        let mut found: Vec<_> = connections
            .iter()
            .filter(|(identity, _)| identity.endpoint == endpoint)
            .map(|(identity, connection)| (identity.clone(), connection.clone()))
            .collect();
        found.sort_by(|a, b| a.0.cmp(&b.0));
        found.into_iter().map(|(_, connection)| connection).collect()
    }

    /// Returns `true` if `identity` is registered.
    pub async fn contains(&self, identity: &RemoteIdentity) -> bool {
        self.connections.lock().await.contains_key(identity)
    }

    /// Returns the number of registered connections.
    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    /// Returns `true` if no connection is registered.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Returns every registered identity, sorted.
    pub async fn identities(&self) -> Vec<RemoteIdentity> {
        let mut identities: Vec<_> = self.connections.lock().await.keys().cloned().collect();
        identities.sort();
        identities
    }

    /// Returns the state of a registered connection.
    pub async fn state_of(&self, identity: &RemoteIdentity) -> Option<ConnectionState> {
        self.get(identity).await.map(|connection| connection.state())
    }
}

impl std::fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("max_connections", &self.config.max_connections)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
