// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Resilient connection to one remote server.
//!
//! # State Machine
//!
//! ```text
//!                 connect()               open ok
//! Disconnected ─────────────▶ Connecting ─────────▶ Connected
//!      ▲                          │                   │   ▲
//!      │        open failed       │     bad keep-alive│   │ reconnect ok
//!      ├──────────────────────────┘                   ▼   │
//!      │                                          Reconnecting
//!      │            reconnect failed                  │
//!      ├──────────────────────────────────────────────┘
//!      │
//!      └── disconnect() / session closing (from any state)
//! ```
//!
//! Session events are forwarded into a single per-connection task, so
//! liveness handling and notification delivery never run concurrently with
//! each other. Every adopted session gets a fresh token; events carrying a
//! token that is no longer current are dropped.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::{Mutex as SyncMutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::bus::{ErrorEvent, ErrorSource, EventBus, EventReceiver, ObserverId, StateChange};
use crate::config::ClientConfig;
use crate::error::{
    ConnectionError, OperationError, ReconnectError, SubscriptionError, UaClientError, UaClientResult,
};
use crate::types::{NodeId, RemoteIdentity, Variant};

use super::conversion::{Mappable, ValueMapper};
use super::point::{Callback, Delivery, DropReason, MonitoredPoint};
use super::subscription::{ContainerKey, ContainerSnapshot, PoolStats, ReconcileReport, SubscriptionPool};
use super::transport::{LivenessStatus, RemoteSession, SessionConnector, SessionEvent, SessionObserver};

// =============================================================================
// ConnectionState
// =============================================================================

/// Lifecycle state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No session.
    #[default]
    Disconnected,

    /// A session is being opened.
    Connecting,

    /// A session is open and usable.
    Connected,

    /// The session failed and a replacement is being established.
    Reconnecting,
}

impl ConnectionState {
    /// Returns `true` if a session is open and usable.
    #[inline]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns `true` while a connect or reconnect is in flight.
    #[inline]
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Reconnecting => write!(f, "Reconnecting"),
        }
    }
}

// =============================================================================
// ConnectionStats
// =============================================================================

/// Connection statistics snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionStats {
    /// Calls to `connect` that reached the server.
    pub connect_attempts: u64,
    /// Failed connect attempts.
    pub connect_failures: u64,
    /// Reconnects started.
    pub reconnect_attempts: u64,
    /// Reconnects that produced a session.
    pub reconnects_succeeded: u64,
    /// Reconnects that gave up.
    pub reconnects_failed: u64,
    /// Bad keep-alive signals acted upon.
    pub keep_alive_failures: u64,
    /// Server-initiated session closings.
    pub session_closings: u64,
    /// Events from sessions that were already released or replaced,
    /// including repeated bad keep-alives from a session being reconnected.
    pub stale_events: u64,
    /// Typed reads.
    pub reads: u64,
    /// Typed writes.
    pub writes: u64,
    /// Method calls.
    pub calls: u64,
    /// Error events published.
    pub errors: u64,
    /// Composite schema discovery calls.
    pub schema_fetches: u64,
    /// Subscription pool statistics.
    pub pool: PoolStats,
}

#[derive(Debug, Default)]
struct AtomicConnectionStats {
    connect_attempts: AtomicU64,
    connect_failures: AtomicU64,
    reconnect_attempts: AtomicU64,
    reconnects_succeeded: AtomicU64,
    reconnects_failed: AtomicU64,
    keep_alive_failures: AtomicU64,
    session_closings: AtomicU64,
    stale_events: AtomicU64,
    reads: AtomicU64,
    writes: AtomicU64,
    calls: AtomicU64,
    errors: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

// =============================================================================
// SessionLink
// =============================================================================

type EventTx = mpsc::UnboundedSender<(u64, SessionEvent)>;
type EventRx = mpsc::UnboundedReceiver<(u64, SessionEvent)>;

/// Observer attached to each adopted session.
struct SessionLink {
    token: u64,
    current: Arc<AtomicU64>,
    tx: EventTx,
}

impl SessionObserver for SessionLink {
    fn on_event(&self, event: &SessionEvent) {
        if self.current.load(Ordering::Acquire) != self.token {
            return;
        }
        // The receiver only goes away with the connection.
        let _ = self.tx.send((self.token, event.clone()));
    }
}

struct ActiveSession {
    session: Arc<dyn RemoteSession>,
    observer: ObserverId,
    token: u64,
}

// =============================================================================
// Connection
// =============================================================================

/// A resilient connection with its subscription pool and value mapper.
///
/// # Examples
///
/// ```rust,ignore
/// let connection = Connection::new(identity, config, connector);
/// connection.connect(&CancellationToken::new()).await?;
///
/// let speed: f64 = connection.read(&NodeId::string(2, "Line1.Speed"), &cancel).await?;
/// ```
pub struct Connection {
    identity: RemoteIdentity,
    session_name: String,
    config: ClientConfig,
    connector: Arc<dyn SessionConnector>,

    state: RwLock<ConnectionState>,
    active: RwLock<Option<ActiveSession>>,
    current_token: Arc<AtomicU64>,
    next_token: AtomicU64,
    generation: AtomicU64,
    reconnecting: AtomicBool,
    liveness_lost: AtomicBool,
    gate: Mutex<()>,

    pool: SubscriptionPool,
    mapper: ValueMapper,

    state_events: EventBus<StateChange>,
    error_events: EventBus<ErrorEvent>,
    event_tx: EventTx,
    event_rx: SyncMutex<Option<EventRx>>,
    shutdown: CancellationToken,

    self_ref: Weak<Connection>,
    stats: AtomicConnectionStats,
}

impl Connection {
    /// Creates a disconnected connection.
    pub fn new(
        identity: RemoteIdentity,
        config: ClientConfig,
        connector: Arc<dyn SessionConnector>,
    ) -> Arc<Self> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let session_name = config.session_name(&identity.session_name);
        let pool = SubscriptionPool::new(
            config.container_capacity,
            config.container.clone(),
            config.point.clone(),
        );
        let capacity = config.event_capacity;

        Arc::new_cyclic(|self_ref| Self {
            identity,
            session_name,
            config,
            connector,
            state: RwLock::new(ConnectionState::Disconnected),
            active: RwLock::new(None),
            current_token: Arc::new(AtomicU64::new(0)),
            next_token: AtomicU64::new(1),
            generation: AtomicU64::new(0),
            reconnecting: AtomicBool::new(false),
            liveness_lost: AtomicBool::new(false),
            gate: Mutex::new(()),
            pool,
            mapper: ValueMapper::new(),
            state_events: EventBus::new(capacity),
            error_events: EventBus::new(capacity),
            event_tx,
            event_rx: SyncMutex::new(Some(event_rx)),
            shutdown: CancellationToken::new(),
            self_ref: self_ref.clone(),
            stats: AtomicConnectionStats::default(),
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Returns the remote identity.
    pub fn identity(&self) -> &RemoteIdentity {
        &self.identity
    }

    /// Returns the full session name sent to the server.
    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the current state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Returns `true` if the connection is usable.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Returns `true` while a reconnect is in flight.
    pub fn is_reconnecting(&self) -> bool {
        self.reconnecting.load(Ordering::Acquire)
    }

    /// Subscribes to state transitions.
    pub fn state_changes(&self) -> EventReceiver<StateChange> {
        self.state_events.subscribe()
    }

    /// Subscribes to background errors.
    pub fn errors(&self) -> EventReceiver<ErrorEvent> {
        self.error_events.subscribe()
    }

    /// Returns the value mapper.
    pub fn mapper(&self) -> &ValueMapper {
        &self.mapper
    }

    /// Returns connection statistics.
    pub fn stats(&self) -> ConnectionStats {
        let s = &self.stats;
        ConnectionStats {
            connect_attempts: s.connect_attempts.load(Ordering::Relaxed),
            connect_failures: s.connect_failures.load(Ordering::Relaxed),
            reconnect_attempts: s.reconnect_attempts.load(Ordering::Relaxed),
            reconnects_succeeded: s.reconnects_succeeded.load(Ordering::Relaxed),
            reconnects_failed: s.reconnects_failed.load(Ordering::Relaxed),
            keep_alive_failures: s.keep_alive_failures.load(Ordering::Relaxed),
            session_closings: s.session_closings.load(Ordering::Relaxed),
            stale_events: s.stale_events.load(Ordering::Relaxed),
            reads: s.reads.load(Ordering::Relaxed),
            writes: s.writes.load(Ordering::Relaxed),
            calls: s.calls.load(Ordering::Relaxed),
            errors: s.errors.load(Ordering::Relaxed),
            schema_fetches: self.mapper.schema_fetches(),
            pool: self.pool.stats(),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    async fn lock_gate(&self, cancel: &CancellationToken, operation: &str) -> UaClientResult<MutexGuard<'_, ()>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(UaClientError::cancelled(operation)),
            guard = self.gate.lock() => Ok(guard),
        }
    }

    /// Opens a session and commits every queued subscription.
    ///
    /// # Errors
    ///
    /// - `Connection::AlreadyConnected` if connected or reconnecting
    /// - `Connection::Transport` if the server cannot be reached
    /// - `Cancelled` if `cancel` fires first; the state returns to
    ///   `Disconnected`
    ///
    /// A bad keep-alive observed before the session settles sends the
    /// connection straight to `Reconnecting`; `connect` still returns `Ok`.
    pub async fn connect(&self, cancel: &CancellationToken) -> UaClientResult<()> {
        let _gate = self.lock_gate(cancel, "connect").await?;

        let state = self.state();
        if matches!(state, ConnectionState::Connected | ConnectionState::Reconnecting) {
            return Err(UaClientError::already_connected(&self.identity.endpoint));
        }

        self.generation.fetch_add(1, Ordering::AcqRel);
        self.reconnecting.store(false, Ordering::Release);
        self.liveness_lost.store(false, Ordering::Release);
        self.ensure_event_loop();
        self.set_state(ConnectionState::Connecting);
        bump(&self.stats.connect_attempts);

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(UaClientError::cancelled("connect")),
            result = self.connector.open(&self.identity, &self.session_name, &self.config.session) => result,
        };

        let session = match opened {
            Ok(session) => session,
            Err(e) => {
                bump(&self.stats.connect_failures);
                self.set_state(ConnectionState::Disconnected);
                e.log("connect");
                return Err(e);
            }
        };

        self.adopt(session.clone());
        let report = self.pool.attach(session.clone()).await;
        for error in report.errors {
            self.emit_error(ErrorSource::Reconciliation, error);
        }

        if !self.settle_connected() {
            tracing::warn!(
                identity = %self.identity,
                session_id = %session.id(),
                "Keep-alive failed while connecting"
            );
            self.reconnecting.store(true, Ordering::Release);
            match self.release() {
                Some(failing) => self.start_reconnect(failing).await,
                None => {
                    self.reconnecting.store(false, Ordering::Release);
                    self.set_state(ConnectionState::Disconnected);
                    return Err(UaClientError::not_connected());
                }
            }
            return Ok(());
        }

        tracing::info!(
            identity = %self.identity,
            session_id = %session.id(),
            containers = report.containers_created,
            points = report.points_added,
            "Connected"
        );
        Ok(())
    }

    /// Removes every subscription and closes the session.
    ///
    /// Idempotent. Any in-flight reconnect is abandoned and its result
    /// discarded.
    pub async fn disconnect(&self) -> UaClientResult<()> {
        let _gate = self.gate.lock().await;

        self.generation.fetch_add(1, Ordering::AcqRel);
        self.reconnecting.store(false, Ordering::Release);

        let session = self.release();
        let removed = self.pool.teardown(session.clone()).await;
        if let Some(session) = session {
            if let Err(e) = session.close().await {
                tracing::debug!(identity = %self.identity, error = %e, "Session close failed");
            }
        }

        if self.state() != ConnectionState::Disconnected {
            tracing::info!(identity = %self.identity, points = removed, "Disconnected");
        }
        self.set_state(ConnectionState::Disconnected);
        Ok(())
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Subscribes one address.
    ///
    /// Works in any state; while disconnected the point is queued and
    /// created on the next connect.
    pub async fn subscribe<T: Mappable>(
        &self,
        address: NodeId,
        callback: Callback<T>,
        cancel: &CancellationToken,
    ) -> UaClientResult<ContainerKey> {
        let label = address.to_string();
        let mut placed = self.pool.subscribe(vec![address], callback, cancel).await?;
        placed
            .pop()
            .map(|(_, key)| key)
            .ok_or_else(|| SubscriptionError::point_add_failed(label, "point was not placed").into())
    }

    /// Subscribes several addresses sharing one callback.
    pub async fn subscribe_many<T: Mappable>(
        &self,
        addresses: Vec<NodeId>,
        callback: Callback<T>,
        cancel: &CancellationToken,
    ) -> UaClientResult<Vec<(NodeId, ContainerKey)>> {
        self.pool.subscribe(addresses, callback, cancel).await
    }

    /// Unsubscribes an address. Returns `false` if it was not subscribed.
    pub async fn unsubscribe(&self, address: &NodeId, cancel: &CancellationToken) -> UaClientResult<bool> {
        self.pool.unsubscribe(address, cancel).await
    }

    /// Applies queued subscription changes now.
    pub async fn apply_pending_changes(&self, cancel: &CancellationToken) -> UaClientResult<ReconcileReport> {
        self.pool.reconcile(cancel).await
    }

    /// Returns a view of every subscription container.
    pub async fn containers(&self) -> Vec<ContainerSnapshot> {
        self.pool.snapshot().await
    }

    /// Returns the number of subscribed points.
    pub fn point_count(&self) -> usize {
        self.pool.point_count()
    }

    /// Returns the monitored point bound to an address.
    pub fn point(&self, address: &NodeId) -> Option<Arc<MonitoredPoint>> {
        self.pool.point(address)
    }

    // =========================================================================
    // Read / Write / Call
    // =========================================================================

    fn session(&self) -> UaClientResult<Arc<dyn RemoteSession>> {
        if !self.is_connected() {
            return Err(UaClientError::not_connected());
        }
        self.active
            .read()
            .as_ref()
            .map(|active| active.session.clone())
            .ok_or_else(UaClientError::not_connected)
    }

    /// Reads a typed value.
    ///
    /// # Errors
    ///
    /// Returns `Connection::NotConnected` unless the state is `Connected`.
    pub async fn read<T: Mappable>(&self, address: &NodeId, cancel: &CancellationToken) -> UaClientResult<T> {
        let session = self.session()?;
        bump(&self.stats.reads);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(UaClientError::cancelled("read")),
            result = self.mapper.decode::<T>(session.as_ref(), address) => result,
        }
    }

    /// Writes a typed value.
    pub async fn write<T: Mappable>(&self, address: &NodeId, value: T, cancel: &CancellationToken) -> UaClientResult<()> {
        let session = self.session()?;
        bump(&self.stats.writes);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(UaClientError::cancelled("write")),
            result = self.mapper.encode(session.as_ref(), address, value) => result,
        }
    }

    /// Calls a method and returns its output arguments.
    pub async fn call(
        &self,
        object: &NodeId,
        method: &NodeId,
        arguments: &[Variant],
        cancel: &CancellationToken,
    ) -> UaClientResult<Vec<Variant>> {
        let session = self.session()?;
        bump(&self.stats.calls);
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(UaClientError::cancelled("call")),
            result = session.call(object, method, arguments) => result?,
        };
        if outcome.status.is_bad() {
            return Err(OperationError::call_failed(object.to_string(), method.to_string(), outcome.status).into());
        }
        Ok(outcome.outputs)
    }

    // =========================================================================
    // Session Bookkeeping
    // =========================================================================

    fn adopt(&self, session: Arc<dyn RemoteSession>) -> u64 {
        let token = self.next_token.fetch_add(1, Ordering::AcqRel);
        self.current_token.store(token, Ordering::Release);
        let observer = session.attach_observer(Arc::new(SessionLink {
            token,
            current: self.current_token.clone(),
            tx: self.event_tx.clone(),
        }));
        *self.active.write() = Some(ActiveSession {
            session,
            observer,
            token,
        });
        token
    }

    fn release(&self) -> Option<Arc<dyn RemoteSession>> {
        self.current_token.store(0, Ordering::Release);
        let active = self.active.write().take()?;
        active.session.detach_observer(active.observer);
        Some(active.session)
    }

    fn is_current(&self, token: u64) -> bool {
        token != 0 && self.current_token.load(Ordering::Acquire) == token
    }

    fn set_state(&self, new: ConnectionState) {
        let mut state = self.state.write();
        self.apply_state(&mut state, new);
    }

    /// Moves `Connecting` to `Connected` unless liveness went bad meanwhile.
    ///
    /// Runs under the state write lock, so a concurrent bad keep-alive is
    /// either seen here or handled after the transition.
    fn settle_connected(&self) -> bool {
        let mut state = self.state.write();
        if self.liveness_lost.swap(false, Ordering::AcqRel) {
            return false;
        }
        self.apply_state(&mut state, ConnectionState::Connected);
        true
    }

    fn apply_state(&self, state: &mut ConnectionState, new: ConnectionState) {
        let old = *state;
        if old == new {
            return;
        }
        *state = new;
        self.state_events.publish(StateChange {
            identity: self.identity.clone(),
            old,
            new,
            at: Utc::now(),
        });
        tracing::info!(identity = %self.identity, from = %old, to = %new, "Connection state changed");
    }

    fn emit_error(&self, source: ErrorSource, error: UaClientError) {
        error.log(&format!("{} {}", self.identity, source));
        bump(&self.stats.errors);
        self.error_events.publish(ErrorEvent {
            identity: self.identity.clone(),
            source,
            error: Arc::new(error),
            at: Utc::now(),
        });
    }

    // =========================================================================
    // Event Loop
    // =========================================================================

    fn ensure_event_loop(&self) {
        let Some(rx) = self.event_rx.lock().take() else {
            return;
        };
        tokio::spawn(run_event_loop(self.self_ref.clone(), rx, self.shutdown.clone()));
    }

    async fn handle_event(&self, token: u64, event: SessionEvent) {
        if !self.is_current(token) {
            bump(&self.stats.stale_events);
            tracing::trace!(identity = %self.identity, kind = event.kind(), "Stale session event dropped");
            return;
        }

        match event {
            SessionEvent::KeepAlive { status, diagnostics } => match status {
                LivenessStatus::Good => {
                    tracing::trace!(identity = %self.identity, "Keep-alive");
                }
                LivenessStatus::Bad => {
                    tracing::warn!(
                        identity = %self.identity,
                        diagnostics = diagnostics.as_deref().unwrap_or(""),
                        "Keep-alive failed"
                    );
                    self.on_keep_alive_failed(token).await;
                }
            },
            SessionEvent::SessionClosing => self.on_session_closing(token).await,
            SessionEvent::SubscriptionsChanged => match self.pool.reconcile(&self.shutdown).await {
                Ok(report) => {
                    for error in report.errors {
                        self.emit_error(ErrorSource::Reconciliation, error);
                    }
                }
                Err(e) => tracing::debug!(identity = %self.identity, error = %e, "Reconciliation skipped"),
            },
            SessionEvent::DataChange { address, value, .. } => {
                // Counted by the pool; no error event per dropped value.
                if let Some(Delivery::Dropped(DropReason::Conversion(reason))) = self.pool.dispatch(&address, value) {
                    tracing::debug!(
                        identity = %self.identity,
                        address = %address,
                        reason = %reason,
                        "Undecodable notification dropped"
                    );
                }
            }
        }
    }

    async fn on_keep_alive_failed(&self, token: u64) {
        {
            let state = self.state.read();
            match *state {
                ConnectionState::Connected => {}
                ConnectionState::Connecting => {
                    self.liveness_lost.store(true, Ordering::Release);
                    tracing::debug!(identity = %self.identity, "Keep-alive failure deferred until connect settles");
                    return;
                }
                ConnectionState::Reconnecting | ConnectionState::Disconnected => return,
            }
        }
        if self
            .reconnecting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let _gate = self.gate.lock().await;
        if !self.is_current(token) || self.state() != ConnectionState::Connected {
            self.reconnecting.store(false, Ordering::Release);
            return;
        }
        let Some(failing) = self.release() else {
            self.reconnecting.store(false, Ordering::Release);
            return;
        };
        self.start_reconnect(failing).await;
    }

    /// Hands a failed session to the connector. Caller holds the gate and has
    /// set `reconnecting`.
    async fn start_reconnect(&self, failing: Arc<dyn RemoteSession>) {
        bump(&self.stats.keep_alive_failures);

        self.pool.detach().await;
        self.set_state(ConnectionState::Reconnecting);
        bump(&self.stats.reconnect_attempts);

        let generation = self.generation.load(Ordering::Acquire);
        let handle = self
            .connector
            .begin_reconnect(failing.clone(), self.config.reconnect_interval);
        tracing::warn!(
            identity = %self.identity,
            session_id = %failing.id(),
            interval = ?self.config.reconnect_interval,
            "Reconnect started"
        );

        let weak = self.self_ref.clone();
        tokio::spawn(async move {
            let result = handle.wait().await;
            match weak.upgrade() {
                Some(connection) => connection.complete_reconnect(generation, failing, result).await,
                None => {
                    if let Ok(session) = result {
                        let _ = session.close().await;
                    }
                }
            }
        });
    }

    async fn complete_reconnect(
        &self,
        generation: u64,
        failing: Arc<dyn RemoteSession>,
        result: UaClientResult<Arc<dyn RemoteSession>>,
    ) {
        let _gate = self.gate.lock().await;

        if generation != self.generation.load(Ordering::Acquire) {
            tracing::debug!(identity = %self.identity, "Stale reconnect completion discarded");
            if let Ok(session) = &result {
                if session.id() != failing.id() {
                    let _ = session.close().await;
                }
            }
            let _ = failing.close().await;
            return;
        }

        match result {
            Ok(session) => {
                if session.id() != failing.id() {
                    if let Err(e) = failing.close().await {
                        tracing::debug!(identity = %self.identity, error = %e, "Failed session close failed");
                    }
                }
                self.adopt(session.clone());
                let report = self.pool.restore(session.clone()).await;
                if let Some(first) = report.errors.first() {
                    let error = ReconnectError::RestoreFailed {
                        failed: report.errors.len(),
                        message: first.to_string(),
                    };
                    self.emit_error(ErrorSource::Reconnect, error.into());
                }

                self.reconnecting.store(false, Ordering::Release);
                bump(&self.stats.reconnects_succeeded);
                self.set_state(ConnectionState::Connected);
                tracing::info!(
                    identity = %self.identity,
                    session_id = %session.id(),
                    containers = report.containers_created,
                    points = report.points_added,
                    "Reconnected"
                );
            }
            Err(e) => {
                if let Err(close) = failing.close().await {
                    tracing::debug!(identity = %self.identity, error = %close, "Failed session close failed");
                }
                self.pool.invalidate().await;
                self.reconnecting.store(false, Ordering::Release);
                bump(&self.stats.reconnects_failed);
                self.set_state(ConnectionState::Disconnected);

                let error = match e {
                    UaClientError::Reconnect(_) => e,
                    other => UaClientError::reconnect_failed(&self.identity.endpoint, other.to_string()),
                };
                self.emit_error(ErrorSource::Reconnect, error);
            }
        }
    }

    async fn on_session_closing(&self, token: u64) {
        let _gate = self.gate.lock().await;
        if !self.is_current(token) {
            return;
        }
        bump(&self.stats.session_closings);

        let session = self.release();
        self.pool.invalidate().await;
        if let Some(session) = session {
            if let Err(e) = session.close().await {
                tracing::debug!(identity = %self.identity, error = %e, "Session close failed");
            }
        }
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.reconnecting.store(false, Ordering::Release);
        self.set_state(ConnectionState::Disconnected);
        self.emit_error(
            ErrorSource::Liveness,
            ConnectionError::closed("server is closing the session").into(),
        );
    }
}

async fn run_event_loop(connection: Weak<Connection>, mut rx: EventRx, shutdown: CancellationToken) {
    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            next = rx.recv() => next,
        };
        let Some((token, event)) = next else {
            break;
        };
        let Some(connection) = connection.upgrade() else {
            break;
        };
        connection.handle_event(token, event).await;
    }
    tracing::trace!("Connection event loop stopped");
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.current_token.store(0, Ordering::Release);
        if let Some(active) = self.active.get_mut().take() {
            active.session.detach_observer(active.observer);
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let session = active.session;
                handle.spawn(async move {
                    let _ = session.close().await;
                });
            }
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("identity", &self.identity)
            .field("session_name", &self.session_name)
            .field("state", &self.state())
            .field("token", &self.active.read().as_ref().map(|a| a.token))
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_defaults_and_display() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert_eq!(ConnectionState::Reconnecting.to_string(), "Reconnecting");
        assert!(ConnectionState::Connected.is_connected());
        assert!(ConnectionState::Connecting.is_transitioning());
        assert!(!ConnectionState::Disconnected.is_transitioning());
    }

    #[test]
    fn test_state_serde() {
        let json = serde_json::to_string(&ConnectionState::Reconnecting).unwrap();
        assert_eq!(json, "\"reconnecting\"");
    }

    #[test]
    fn test_stale_link_ignores_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let current = Arc::new(AtomicU64::new(2));
        let link = SessionLink {
            token: 1,
            current: current.clone(),
            tx,
        };

        link.on_event(&SessionEvent::SessionClosing);
        assert!(rx.try_recv().is_err());

        current.store(1, Ordering::Release);
        link.on_event(&SessionEvent::SessionClosing);
        assert_eq!(rx.try_recv().unwrap(), (1, SessionEvent::SessionClosing));
    }
}
