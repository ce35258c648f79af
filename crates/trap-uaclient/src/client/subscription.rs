// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Subscription pool: packs monitored points into capacity-bounded
//! server-side subscription containers.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      SubscriptionPool                           │
//! │   routes: address -> MonitoredPoint   (lock-free dispatch)      │
//! │   ContainerSet (creation order, first fit)                      │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │
//!          ┌───────────────────┼───────────────────┐
//!          ▼                   ▼                   ▼
//! ┌─────────────────┐ ┌─────────────────┐ ┌─────────────────┐
//! │ Container #1    │ │ Container #2    │ │ Container #3    │
//! │ [A, B]          │ │ [C]             │ │ (pending)       │
//! └─────────────────┘ └─────────────────┘ └─────────────────┘
//! ```
//!
//! Structural changes are always staged in the [`ContainerSet`] first. With a
//! session attached they are committed immediately; without one (before the
//! first connect, or while a reconnect is in flight) they stay pending and
//! are applied by the next reconciliation.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::config::{ContainerSettings, PointSettings};
use crate::error::{OperationError, SubscriptionError, UaClientError, UaClientResult};
use crate::types::{DataValue, NodeId};

use super::conversion::Mappable;
use super::point::{Callback, Delivery, MonitoredPoint};
use super::transport::{ContainerId, PointId, RemoteSession};

// =============================================================================
// ContainerKey
// =============================================================================

/// Stable local identifier of a container.
///
/// Unlike the server-side id it survives reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerKey(pub u64);

impl fmt::Display for ContainerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "container#{}", self.0)
    }
}

// =============================================================================
// ContainerSet
// =============================================================================

#[derive(Debug, Clone)]
struct PointSlot {
    address: NodeId,
    server_id: Option<PointId>,
}

#[derive(Debug, Clone)]
struct Container {
    key: ContainerKey,
    server_id: Option<ContainerId>,
    points: Vec<PointSlot>,
    pending_removals: Vec<PointId>,
}

impl Container {
    fn needs_sync(&self) -> bool {
        self.server_id.is_none()
            || !self.pending_removals.is_empty()
            || self.points.iter().any(|p| p.server_id.is_none())
    }
}

/// Result of removing a point from a [`ContainerSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    /// Container the point was in.
    pub key: ContainerKey,
    /// Server-side container id, if created.
    pub container: Option<ContainerId>,
    /// Server-side point id, if added.
    pub point: Option<PointId>,
    /// Whether the container became empty and was dropped.
    pub emptied: bool,
}

/// Read-only view of one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSnapshot {
    /// Local key.
    pub key: ContainerKey,
    /// Server-side id, `None` while pending creation.
    pub server_id: Option<ContainerId>,
    /// Addresses in insertion order.
    pub addresses: Vec<NodeId>,
    /// Whether server-side changes are outstanding.
    pub pending: bool,
}

/// Placement bookkeeping for containers, independent of any session.
///
/// Invariants: no container exceeds the capacity; an address appears in at
/// most one container; no empty container is kept.
#[derive(Debug, Clone)]
pub struct ContainerSet {
    capacity: usize,
    next_key: u64,
    containers: Vec<Container>,
    index: HashMap<NodeId, ContainerKey>,
    retired: Vec<ContainerId>,
}

impl ContainerSet {
    /// Creates an empty set.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            next_key: 1,
            containers: Vec::new(),
            index: HashMap::new(),
            retired: Vec::new(),
        }
    }

    /// Returns the per-container capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of containers.
    pub fn len(&self) -> usize {
        self.containers.len()
    }

    /// Returns `true` if there are no containers.
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    /// Returns the number of points across all containers.
    pub fn point_count(&self) -> usize {
        self.index.len()
    }

    /// Returns the container holding `address`.
    pub fn container_of(&self, address: &NodeId) -> Option<ContainerKey> {
        self.index.get(address).copied()
    }

    /// Returns `true` if `address` is placed.
    pub fn contains(&self, address: &NodeId) -> bool {
        self.index.contains_key(address)
    }

    /// Places a group of new addresses into one container.
    ///
    /// The first container in creation order with room for the whole group
    /// is used; otherwise a new container is opened. Addresses already placed
    /// are skipped.
    pub fn place(&mut self, addresses: &[NodeId]) -> Result<ContainerKey, SubscriptionError> {
        let mut fresh: Vec<&NodeId> = Vec::with_capacity(addresses.len());
        for address in addresses {
            if !self.index.contains_key(address) && !fresh.contains(&address) {
                fresh.push(address);
            }
        }
        if fresh.len() > self.capacity {
            return Err(SubscriptionError::CapacityExceeded {
                requested: fresh.len(),
                capacity: self.capacity,
            });
        }

        let capacity = self.capacity;
        let slot = match self
            .containers
            .iter()
            .position(|c| c.points.len() + fresh.len() <= capacity)
        {
            Some(slot) => slot,
            None => {
                let key = ContainerKey(self.next_key);
                self.next_key += 1;
                self.containers.push(Container {
                    key,
                    server_id: None,
                    points: Vec::new(),
                    pending_removals: Vec::new(),
                });
                self.containers.len() - 1
            }
        };

        let container = &mut self.containers[slot];
        for address in fresh {
            container.points.push(PointSlot {
                address: address.clone(),
                server_id: None,
            });
            self.index.insert(address.clone(), container.key);
        }
        Ok(container.key)
    }

    /// Removes an address.
    ///
    /// An emptied container is dropped; if it existed server-side its id is
    /// retired for deletion.
    pub fn remove(&mut self, address: &NodeId) -> Option<Removal> {
        let key = self.index.remove(address)?;
        let slot = self.containers.iter().position(|c| c.key == key)?;
        let container = &mut self.containers[slot];
        let position = container.points.iter().position(|p| &p.address == address)?;
        let point = container.points.remove(position);

        let server_container = container.server_id;
        let emptied = container.points.is_empty();
        if emptied {
            self.containers.remove(slot);
            if let Some(id) = server_container {
                self.retired.push(id);
            }
        } else if let Some(id) = point.server_id {
            container.pending_removals.push(id);
        }

        Some(Removal {
            key,
            container: server_container,
            point: point.server_id,
            emptied,
        })
    }

    /// Forgets every server-side id so all containers are recreated.
    ///
    /// Returns the ids that existed, including retired ones.
    pub fn invalidate(&mut self) -> Vec<ContainerId> {
        let mut stale: Vec<ContainerId> = self.retired.drain(..).collect();
        for container in &mut self.containers {
            if let Some(id) = container.server_id.take() {
                stale.push(id);
            }
            container.pending_removals.clear();
            for point in &mut container.points {
                point.server_id = None;
            }
        }
        stale
    }

    /// Drops every container, returning the server-side ids that existed.
    pub fn clear(&mut self) -> Vec<ContainerId> {
        let stale = self.invalidate();
        self.containers.clear();
        self.index.clear();
        stale
    }

    /// Returns the number of containers with outstanding server-side work.
    pub fn pending_changes(&self) -> usize {
        self.retired.len() + self.containers.iter().filter(|c| c.needs_sync()).count()
    }

    /// Returns a view of every container in creation order.
    pub fn snapshot(&self) -> Vec<ContainerSnapshot> {
        self.containers
            .iter()
            .map(|c| ContainerSnapshot {
                key: c.key,
                server_id: c.server_id,
                addresses: c.points.iter().map(|p| p.address.clone()).collect(),
                pending: c.needs_sync(),
            })
            .collect()
    }

    fn keys(&self) -> Vec<ContainerKey> {
        self.containers.iter().map(|c| c.key).collect()
    }

    fn get_mut(&mut self, key: ContainerKey) -> Option<&mut Container> {
        self.containers.iter_mut().find(|c| c.key == key)
    }
}

// =============================================================================
// ReconcileReport
// =============================================================================

/// Summary of applied server-side changes.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Containers created.
    pub containers_created: usize,
    /// Containers deleted.
    pub containers_deleted: usize,
    /// Points added.
    pub points_added: usize,
    /// Points removed.
    pub points_removed: usize,
    /// Failures; the affected changes stay pending.
    pub errors: Vec<UaClientError>,
}

impl ReconcileReport {
    /// Returns `true` if nothing failed.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns `true` if nothing was applied or failed.
    pub fn is_noop(&self) -> bool {
        self.is_clean()
            && self.containers_created == 0
            && self.containers_deleted == 0
            && self.points_added == 0
            && self.points_removed == 0
    }
}

// =============================================================================
// PoolStats
// =============================================================================

/// Subscription pool statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolStats {
    /// Containers created server-side.
    pub containers_created: u64,
    /// Containers deleted server-side.
    pub containers_deleted: u64,
    /// Points added server-side.
    pub points_added: u64,
    /// Points removed server-side.
    pub points_removed: u64,
    /// Notifications handed to callbacks.
    pub notifications_dispatched: u64,
    /// Notifications dropped by a point.
    pub notifications_dropped: u64,
    /// Notifications for addresses with no live point.
    pub notifications_unrouted: u64,
}

#[derive(Debug, Default)]
struct AtomicPoolStats {
    containers_created: AtomicU64,
    containers_deleted: AtomicU64,
    points_added: AtomicU64,
    points_removed: AtomicU64,
    notifications_dispatched: AtomicU64,
    notifications_dropped: AtomicU64,
    notifications_unrouted: AtomicU64,
}

// =============================================================================
// SubscriptionPool
// =============================================================================

struct PoolState {
    set: ContainerSet,
    session: Option<Arc<dyn RemoteSession>>,
}

/// Pool of subscription containers owned by one connection.
pub struct SubscriptionPool {
    state: Mutex<PoolState>,
    routes: DashMap<NodeId, Arc<MonitoredPoint>>,
    container_settings: ContainerSettings,
    point_settings: PointSettings,
    stats: AtomicPoolStats,
}

impl SubscriptionPool {
    /// Creates an empty pool.
    pub fn new(capacity: usize, container_settings: ContainerSettings, point_settings: PointSettings) -> Self {
        Self {
            state: Mutex::new(PoolState {
                set: ContainerSet::new(capacity),
                session: None,
            }),
            routes: DashMap::new(),
            container_settings,
            point_settings,
            stats: AtomicPoolStats::default(),
        }
    }

    async fn lock(&self, cancel: &CancellationToken, operation: &str) -> UaClientResult<MutexGuard<'_, PoolState>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(UaClientError::cancelled(operation)),
            guard = self.state.lock() => Ok(guard),
        }
    }

    // =========================================================================
    // Subscribe / Unsubscribe
    // =========================================================================

    /// Subscribes addresses with one callback.
    ///
    /// Addresses that already have a live point are left alone and reported
    /// with their existing container. New addresses are placed first-fit; if
    /// a session is attached the affected containers are committed, and on
    /// failure the new points are rolled back.
    pub async fn subscribe<T: Mappable>(
        &self,
        addresses: Vec<NodeId>,
        callback: Callback<T>,
        cancel: &CancellationToken,
    ) -> UaClientResult<Vec<(NodeId, ContainerKey)>> {
        let mut state = self.lock(cancel, "subscribe").await?;

        let mut requested: Vec<NodeId> = Vec::with_capacity(addresses.len());
        let mut seen = HashSet::with_capacity(addresses.len());
        for address in addresses {
            if seen.insert(address.clone()) {
                requested.push(address);
            }
        }
        let fresh: Vec<NodeId> = requested
            .iter()
            .filter(|a| !state.set.contains(a))
            .cloned()
            .collect();

        let mut placed: Vec<ContainerKey> = Vec::new();
        for chunk in fresh.chunks(state.set.capacity()) {
            let key = state.set.place(chunk)?;
            for address in chunk {
                let point = Arc::new(MonitoredPoint::new(address.clone(), callback.clone()));
                self.routes.insert(address.clone(), point);
            }
            if !placed.contains(&key) {
                placed.push(key);
            }
        }

        if let Some(session) = state.session.clone() {
            let mut report = ReconcileReport::default();
            for key in &placed {
                if let Err(e) = self.sync_container(&mut state, &session, *key, &mut report).await {
                    self.rollback(&mut state, &session, &fresh).await;
                    return Err(e);
                }
            }
        } else if !fresh.is_empty() {
            tracing::debug!(points = fresh.len(), "No session attached, subscription queued");
        }

        Ok(requested
            .into_iter()
            .filter_map(|address| state.set.container_of(&address).map(|key| (address, key)))
            .collect())
    }

    async fn rollback(&self, state: &mut PoolState, session: &Arc<dyn RemoteSession>, addresses: &[NodeId]) {
        for address in addresses {
            if let Some((_, point)) = self.routes.remove(address) {
                point.close();
            }
            state.set.remove(address);
        }
        let report = self.reconcile_locked(state, session).await;
        if !report.is_clean() {
            tracing::debug!(
                failures = report.errors.len(),
                "Cleanup after failed subscribe left changes pending"
            );
        }
    }

    /// Unsubscribes an address. Returns `false` if it was not subscribed.
    ///
    /// Routing is detached before the point is removed. The local removal
    /// always takes effect; a failed server-side cleanup stays pending and
    /// its error is returned.
    pub async fn unsubscribe(&self, address: &NodeId, cancel: &CancellationToken) -> UaClientResult<bool> {
        let mut state = self.lock(cancel, "unsubscribe").await?;

        if let Some((_, point)) = self.routes.remove(address) {
            point.close();
        }
        let Some(removal) = state.set.remove(address) else {
            return Ok(false);
        };
        tracing::debug!(
            address = %address,
            container = %removal.key,
            emptied = removal.emptied,
            "Point unsubscribed"
        );

        if let Some(session) = state.session.clone() {
            let mut report = ReconcileReport::default();
            if removal.emptied {
                self.flush_retired(&mut state, &session, &mut report).await;
            } else {
                self.sync_container(&mut state, &session, removal.key, &mut report)
                    .await?;
            }
            if let Some(error) = report.errors.into_iter().next() {
                return Err(error);
            }
        }
        Ok(true)
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Routes a value-change notification to its point.
    ///
    /// Returns `None` if no live point exists for the address.
    pub fn dispatch(&self, address: &NodeId, value: DataValue) -> Option<Delivery> {
        let point = self.routes.get(address).map(|entry| entry.value().clone());
        let Some(point) = point else {
            self.stats.notifications_unrouted.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(address = %address, "Notification for unknown point dropped");
            return None;
        };

        let delivery = point.deliver(value);
        match &delivery {
            Delivery::Delivered => {
                self.stats.notifications_dispatched.fetch_add(1, Ordering::Relaxed);
            }
            Delivery::Dropped(reason) => {
                self.stats.notifications_dropped.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(address = %address, reason = %reason, "Notification dropped");
            }
        }
        Some(delivery)
    }

    // =========================================================================
    // Session Lifecycle
    // =========================================================================

    /// Attaches a session and applies everything pending.
    pub async fn attach(&self, session: Arc<dyn RemoteSession>) -> ReconcileReport {
        let mut state = self.state.lock().await;
        state.session = Some(session.clone());
        self.reconcile_locked(&mut state, &session).await
    }

    /// Detaches the session; later changes are queued.
    pub async fn detach(&self) -> Option<Arc<dyn RemoteSession>> {
        self.state.lock().await.session.take()
    }

    /// Recreates every container on a replacement session.
    ///
    /// Old server-side containers are deleted first on a best-effort basis.
    pub async fn restore(&self, session: Arc<dyn RemoteSession>) -> ReconcileReport {
        let mut state = self.state.lock().await;
        let stale = state.set.invalidate();
        state.session = Some(session.clone());

        for id in stale {
            if let Err(e) = session.delete_container(id).await {
                tracing::debug!(container = id, error = %e, "Stale container not deleted");
            }
        }

        let report = self.reconcile_locked(&mut state, &session).await;
        tracing::info!(
            containers = state.set.len(),
            points = state.set.point_count(),
            failures = report.errors.len(),
            "Subscription containers restored"
        );
        report
    }

    /// Forgets server-side state after the session was lost for good.
    ///
    /// Points stay subscribed and are recreated on the next attach.
    pub async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        state.session = None;
        state.set.invalidate();
    }

    /// Removes every point and container.
    ///
    /// Callbacks are detached before any container is deleted.
    pub async fn teardown(&self, session: Option<Arc<dyn RemoteSession>>) -> usize {
        let mut state = self.state.lock().await;
        state.session = None;

        let points: Vec<Arc<MonitoredPoint>> = self.routes.iter().map(|e| e.value().clone()).collect();
        self.routes.clear();
        for point in &points {
            point.close();
        }

        let containers = state.set.clear();
        if let Some(session) = session {
            for id in containers {
                match session.delete_container(id).await {
                    Ok(()) => {
                        self.stats.containers_deleted.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        tracing::debug!(container = id, error = %e, "Container not deleted during teardown");
                    }
                }
            }
        }
        points.len()
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Applies all pending structural changes with the attached session.
    ///
    /// Without a session nothing happens.
    pub async fn reconcile(&self, cancel: &CancellationToken) -> UaClientResult<ReconcileReport> {
        let mut state = self.lock(cancel, "reconcile").await?;
        let Some(session) = state.session.clone() else {
            return Ok(ReconcileReport::default());
        };
        Ok(self.reconcile_locked(&mut state, &session).await)
    }

    async fn reconcile_locked(&self, state: &mut PoolState, session: &Arc<dyn RemoteSession>) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        self.flush_retired(state, session, &mut report).await;
        for key in state.set.keys() {
            if let Err(e) = self.sync_container(state, session, key, &mut report).await {
                report.errors.push(e);
            }
        }
        report
    }

    async fn flush_retired(&self, state: &mut PoolState, session: &Arc<dyn RemoteSession>, report: &mut ReconcileReport) {
        let retired: Vec<ContainerId> = state.set.retired.drain(..).collect();
        for id in retired {
            match session.delete_container(id).await {
                Ok(()) => {
                    self.stats.containers_deleted.fetch_add(1, Ordering::Relaxed);
                    report.containers_deleted += 1;
                    tracing::debug!(container = id, "Empty container deleted");
                }
                Err(e) => {
                    state.set.retired.push(id);
                    report
                        .errors
                        .push(SubscriptionError::container_delete_failed(id, e.to_string()).into());
                }
            }
        }
    }

    async fn sync_container(
        &self,
        state: &mut PoolState,
        session: &Arc<dyn RemoteSession>,
        key: ContainerKey,
        report: &mut ReconcileReport,
    ) -> UaClientResult<()> {
        let Some(container) = state.set.get_mut(key) else {
            return Ok(());
        };

        let server_id = match container.server_id {
            Some(id) => id,
            None => {
                let id = session
                    .create_container(&self.container_settings)
                    .await
                    .map_err(|e| SubscriptionError::container_create_failed(e.to_string()))?;
                container.server_id = Some(id);
                self.stats.containers_created.fetch_add(1, Ordering::Relaxed);
                report.containers_created += 1;
                tracing::debug!(container = %key, server_id = id, "Container created");
                id
            }
        };

        if !container.pending_removals.is_empty() {
            let removals = std::mem::take(&mut container.pending_removals);
            if let Err(e) = session.remove_points(server_id, &removals).await {
                container.pending_removals = removals;
                return Err(SubscriptionError::point_remove_failed(
                    format!("{} point(s) in container {}", container.pending_removals.len(), server_id),
                    e.to_string(),
                )
                .into());
            }
            self.stats
                .points_removed
                .fetch_add(removals.len() as u64, Ordering::Relaxed);
            report.points_removed += removals.len();
        }

        let unsynced: Vec<usize> = container
            .points
            .iter()
            .enumerate()
            .filter(|(_, p)| p.server_id.is_none())
            .map(|(i, _)| i)
            .collect();
        if unsynced.is_empty() {
            return Ok(());
        }

        let addresses: Vec<NodeId> = unsynced
            .iter()
            .map(|&i| container.points[i].address.clone())
            .collect();
        let ids = session
            .add_points(server_id, &addresses, &self.point_settings)
            .await
            .map_err(|e| SubscriptionError::point_add_failed(addresses[0].to_string(), e.to_string()))?;
        if ids.len() != addresses.len() {
            return Err(OperationError::BatchMismatch {
                operation: "add_points",
                expected: addresses.len(),
                actual: ids.len(),
            }
            .into());
        }
        for (&i, id) in unsynced.iter().zip(ids) {
            container.points[i].server_id = Some(id);
        }
        self.stats
            .points_added
            .fetch_add(addresses.len() as u64, Ordering::Relaxed);
        report.points_added += addresses.len();
        tracing::debug!(container = %key, server_id, points = addresses.len(), "Points added");
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Returns a view of every container in creation order.
    pub async fn snapshot(&self) -> Vec<ContainerSnapshot> {
        self.state.lock().await.set.snapshot()
    }

    /// Returns the number of containers with outstanding server-side work.
    pub async fn pending_changes(&self) -> usize {
        self.state.lock().await.set.pending_changes()
    }

    /// Returns `true` if a session is attached.
    pub async fn has_session(&self) -> bool {
        self.state.lock().await.session.is_some()
    }

    /// Returns the number of live points.
    pub fn point_count(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if `address` has a live point.
    pub fn contains(&self, address: &NodeId) -> bool {
        self.routes.contains_key(address)
    }

    /// Returns the live point for `address`.
    pub fn point(&self, address: &NodeId) -> Option<Arc<MonitoredPoint>> {
        self.routes.get(address).map(|entry| entry.value().clone())
    }

    /// Returns pool statistics.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            containers_created: self.stats.containers_created.load(Ordering::Relaxed),
            containers_deleted: self.stats.containers_deleted.load(Ordering::Relaxed),
            points_added: self.stats.points_added.load(Ordering::Relaxed),
            points_removed: self.stats.points_removed.load(Ordering::Relaxed),
            notifications_dispatched: self.stats.notifications_dispatched.load(Ordering::Relaxed),
            notifications_dropped: self.stats.notifications_dropped.load(Ordering::Relaxed),
            notifications_unrouted: self.stats.notifications_unrouted.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for SubscriptionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionPool")
            .field("points", &self.routes.len())
            .field("container_settings", &self.container_settings)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str) -> NodeId {
        NodeId::string(2, name)
    }

    fn addresses(set: &ContainerSet) -> Vec<Vec<String>> {
        set.snapshot()
            .into_iter()
            .map(|c| c.addresses.iter().map(|a| a.as_string().unwrap_or_default().to_string()).collect())
            .collect()
    }

    #[test]
    fn test_first_fit_placement() {
        let mut set = ContainerSet::new(2);
        let a = set.place(&[node("A")]).unwrap();
        let b = set.place(&[node("B")]).unwrap();
        let c = set.place(&[node("C")]).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(addresses(&set), vec![vec!["A", "B"], vec!["C"]]);
    }

    #[test]
    fn test_remove_keeps_other_containers() {
        let mut set = ContainerSet::new(2);
        set.place(&[node("A")]).unwrap();
        set.place(&[node("B")]).unwrap();
        set.place(&[node("C")]).unwrap();

        let removal = set.remove(&node("B")).unwrap();
        assert!(!removal.emptied);
        assert_eq!(addresses(&set), vec![vec!["A"], vec!["C"]]);

        let removal = set.remove(&node("A")).unwrap();
        assert!(removal.emptied);
        assert_eq!(addresses(&set), vec![vec!["C"]]);
        assert!(set.remove(&node("A")).is_none());
    }

    #[test]
    fn test_place_skips_known_addresses() {
        let mut set = ContainerSet::new(3);
        let first = set.place(&[node("A"), node("A")]).unwrap();
        let again = set.place(&[node("A")]).unwrap();

        assert_eq!(first, again);
        assert_eq!(set.point_count(), 1);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_group_larger_than_capacity_is_rejected() {
        let mut set = ContainerSet::new(2);
        let err = set.place(&[node("A"), node("B"), node("C")]).unwrap_err();
        assert!(matches!(err, SubscriptionError::CapacityExceeded { requested: 3, capacity: 2 }));
    }

    #[test]
    fn test_group_goes_to_first_container_with_room() {
        let mut set = ContainerSet::new(3);
        set.place(&[node("A"), node("B")]).unwrap();
        set.place(&[node("C"), node("D")]).unwrap();
        set.place(&[node("E")]).unwrap();

        assert_eq!(addresses(&set), vec![vec!["A", "B", "E"], vec!["C", "D"]]);
    }

    #[test]
    fn test_invalidate_and_retire() {
        let mut set = ContainerSet::new(2);
        let key = set.place(&[node("A"), node("B")]).unwrap();
        {
            let container = set.get_mut(key).unwrap();
            container.server_id = Some(7);
            container.points[0].server_id = Some(70);
            container.points[1].server_id = Some(71);
        }
        assert_eq!(set.pending_changes(), 0);

        set.remove(&node("A"));
        assert_eq!(set.pending_changes(), 1);

        set.remove(&node("B"));
        assert_eq!(set.retired, vec![7]);

        set.place(&[node("C")]).unwrap();
        assert_eq!(set.invalidate(), vec![7]);
        assert!(set.snapshot()[0].pending);
    }
}
