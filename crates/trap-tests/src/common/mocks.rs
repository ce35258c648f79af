// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Mock Implementations
//!
//! An in-memory server with a session layer on top of it, for testing the
//! client runtime without a network.
//!
//! ## Design Principles
//!
//! - Configurable behavior for different test scenarios
//! - Recording of interactions for verification
//! - Thread-safe for concurrent testing
//! - Easy to set up error injection

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use trap_uaclient::client::{
    CallOutcome, ContainerId, LivenessStatus, PointId, ReconnectCompleter, ReconnectHandle, RemoteSession,
    SessionConnector, SessionEvent, SessionId, SessionObserver, TypeDescription,
};
use trap_uaclient::{
    ClientConfig, ContainerSettings, DataValue, NodeId, ObserverId, ObserverList, PointSettings, ReconnectError,
    RemoteIdentity, SessionSettings, StatusCode, UaClientError, UaClientResult, Variant,
};

// =============================================================================
// Mock Server
// =============================================================================

#[derive(Debug, Clone)]
struct ServerContainer {
    session: SessionId,
    points: BTreeMap<PointId, NodeId>,
}

#[derive(Debug, Default)]
struct ServerState {
    values: HashMap<NodeId, DataValue>,
    types: HashMap<NodeId, TypeDescription>,
    calls: HashMap<(NodeId, NodeId), CallOutcome>,
    containers: BTreeMap<ContainerId, ServerContainer>,
    writes: Vec<(NodeId, Variant)>,
}

/// In-memory address space shared by every mock session to one endpoint.
#[derive(Debug)]
pub struct MockServer {
    endpoint: String,
    state: Mutex<ServerState>,

    next_session: AtomicU64,
    next_container: AtomicU32,
    next_point: AtomicU32,

    /// Force `open` to fail.
    fail_open: AtomicBool,
    /// Force container creation to fail.
    fail_create_container: AtomicBool,
    /// Force point creation to fail.
    fail_add_points: AtomicBool,
    /// Emit one bad keep-alive from the next container creation.
    keep_alive_bad_on_create: AtomicBool,

    describe_calls: AtomicU64,
    read_calls: AtomicU64,
}

impl MockServer {
    /// Create an empty server.
    pub fn new(endpoint: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            endpoint: endpoint.into(),
            state: Mutex::new(ServerState::default()),
            next_session: AtomicU64::new(1),
            next_container: AtomicU32::new(1),
            next_point: AtomicU32::new(1),
            fail_open: AtomicBool::new(false),
            fail_create_container: AtomicBool::new(false),
            fail_add_points: AtomicBool::new(false),
            keep_alive_bad_on_create: AtomicBool::new(false),
            describe_calls: AtomicU64::new(0),
            read_calls: AtomicU64::new(0),
        })
    }

    /// Returns the endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    // =========================================================================
    // Address Space
    // =========================================================================

    /// Set a good value for a node.
    pub fn set_value(&self, node: NodeId, value: Variant) {
        self.state.lock().values.insert(node, DataValue::good(value));
    }

    /// Set a full data value (status included) for a node.
    pub fn set_data_value(&self, node: NodeId, value: DataValue) {
        self.state.lock().values.insert(node, value);
    }

    /// Get the current value of a node.
    pub fn value(&self, node: &NodeId) -> Option<Variant> {
        self.state.lock().values.get(node).map(|v| v.value.clone())
    }

    /// Declare the type of a node.
    pub fn define_type(&self, node: NodeId, description: TypeDescription) {
        self.state.lock().types.insert(node, description);
    }

    /// Set the outcome of a method call.
    pub fn set_call_result(&self, object: NodeId, method: NodeId, outcome: CallOutcome) {
        self.state.lock().calls.insert((object, method), outcome);
    }

    /// Get every write in arrival order.
    pub fn writes(&self) -> Vec<(NodeId, Variant)> {
        self.state.lock().writes.clone()
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Get the addresses of every live container, in creation order.
    pub fn containers(&self) -> Vec<Vec<NodeId>> {
        self.state
            .lock()
            .containers
            .values()
            .map(|c| c.points.values().cloned().collect())
            .collect()
    }

    /// Get the number of live containers.
    pub fn container_count(&self) -> usize {
        self.state.lock().containers.len()
    }

    /// Get the number of live monitored points.
    pub fn point_count(&self) -> usize {
        self.state.lock().containers.values().map(|c| c.points.len()).sum()
    }

    /// Get the container monitoring `address` for a session.
    pub fn container_of(&self, session: SessionId, address: &NodeId) -> Option<ContainerId> {
        self.state
            .lock()
            .containers
            .iter()
            .find(|(_, c)| c.session == session && c.points.values().any(|a| a == address))
            .map(|(id, _)| *id)
    }

    // =========================================================================
    // Fault Injection
    // =========================================================================

    /// Make session opening fail.
    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Make container creation fail.
    pub fn set_fail_create_container(&self, fail: bool) {
        self.fail_create_container.store(fail, Ordering::SeqCst);
    }

    /// Make point creation fail.
    pub fn set_fail_add_points(&self, fail: bool) {
        self.fail_add_points.store(fail, Ordering::SeqCst);
    }

    /// Make the next container creation report a bad keep-alive and stall
    /// briefly, so the signal lands while the caller is still working.
    pub fn set_keep_alive_bad_on_create(&self, enabled: bool) {
        self.keep_alive_bad_on_create.store(enabled, Ordering::SeqCst);
    }

    // =========================================================================
    // Counters
    // =========================================================================

    /// Get the number of type discovery calls.
    pub fn describe_calls(&self) -> u64 {
        self.describe_calls.load(Ordering::SeqCst)
    }

    /// Get the number of batched read calls.
    pub fn read_calls(&self) -> u64 {
        self.read_calls.load(Ordering::SeqCst)
    }

    fn next_session_id(&self) -> SessionId {
        SessionId(self.next_session.fetch_add(1, Ordering::SeqCst))
    }

    fn drop_session_containers(&self, session: SessionId) {
        self.state.lock().containers.retain(|_, c| c.session != session);
    }
}

// =============================================================================
// Mock Session
// =============================================================================

/// A session on a [`MockServer`] whose events are driven by the test.
pub struct MockSession {
    id: SessionId,
    name: String,
    server: Arc<MockServer>,
    observers: ObserverList<dyn SessionObserver>,
    closed: AtomicBool,
}

impl MockSession {
    fn open(server: Arc<MockServer>, name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: server.next_session_id(),
            name: name.into(),
            server,
            observers: ObserverList::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// Returns `true` after `close`.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Get the number of attached observers.
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Deliver an event to every observer.
    pub fn emit(&self, event: SessionEvent) {
        self.observers.notify(|observer| observer.on_event(&event));
    }

    /// Emit a good keep-alive.
    pub fn keep_alive_good(&self) {
        self.emit(SessionEvent::keep_alive(LivenessStatus::Good));
    }

    /// Emit a bad keep-alive.
    pub fn keep_alive_bad(&self) {
        self.emit(SessionEvent::KeepAlive {
            status: LivenessStatus::Bad,
            diagnostics: Some("BadConnectionClosed".to_string()),
        });
    }

    /// Emit a session-closing event.
    pub fn closing(&self) {
        self.emit(SessionEvent::SessionClosing);
    }

    /// Emit a subscriptions-changed event.
    pub fn subscriptions_changed(&self) {
        self.emit(SessionEvent::SubscriptionsChanged);
    }

    /// Emit a value change for a monitored address.
    ///
    /// Returns `false` if this session does not monitor the address.
    pub fn data_change(&self, address: &NodeId, value: DataValue) -> bool {
        let Some(container) = self.server.container_of(self.id, address) else {
            return false;
        };
        self.emit(SessionEvent::DataChange {
            container,
            address: address.clone(),
            value,
        });
        true
    }

    fn ensure_open(&self) -> UaClientResult<()> {
        if self.is_closed() {
            return Err(UaClientError::transport(&self.server.endpoint, "session is closed"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for MockSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSession")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[async_trait]
impl RemoteSession for MockSession {
    fn id(&self) -> SessionId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn endpoint(&self) -> &str {
        &self.server.endpoint
    }

    async fn read_values(&self, addresses: &[NodeId]) -> UaClientResult<Vec<DataValue>> {
        self.ensure_open()?;
        self.server.read_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.server.state.lock();
        Ok(addresses
            .iter()
            .map(|a| {
                state
                    .values
                    .get(a)
                    .cloned()
                    .unwrap_or_else(|| DataValue::bad(StatusCode::BAD_NODE_ID_UNKNOWN))
            })
            .collect())
    }

    async fn write_values(&self, writes: &[(NodeId, Variant)]) -> UaClientResult<Vec<StatusCode>> {
        self.ensure_open()?;
        let mut state = self.server.state.lock();
        let mut statuses = Vec::with_capacity(writes.len());
        for (address, value) in writes {
            if state.values.contains_key(address) {
                state.values.insert(address.clone(), DataValue::good(value.clone()));
                state.writes.push((address.clone(), value.clone()));
                statuses.push(StatusCode::GOOD);
            } else {
                statuses.push(StatusCode::BAD_NODE_ID_UNKNOWN);
            }
        }
        Ok(statuses)
    }

    async fn call(&self, object: &NodeId, method: &NodeId, _arguments: &[Variant]) -> UaClientResult<CallOutcome> {
        self.ensure_open()?;
        Ok(self
            .server
            .state
            .lock()
            .calls
            .get(&(object.clone(), method.clone()))
            .cloned()
            .unwrap_or(CallOutcome {
                status: StatusCode::BAD_METHOD_INVALID,
                outputs: Vec::new(),
            }))
    }

    async fn describe_type(&self, address: &NodeId) -> UaClientResult<TypeDescription> {
        self.ensure_open()?;
        self.server.describe_calls.fetch_add(1, Ordering::SeqCst);
        self.server
            .state
            .lock()
            .types
            .get(address)
            .cloned()
            .ok_or_else(|| UaClientError::read_failed(address.to_string(), StatusCode::BAD_NODE_ID_UNKNOWN))
    }

    async fn create_container(&self, _settings: &ContainerSettings) -> UaClientResult<ContainerId> {
        self.ensure_open()?;
        if self.server.fail_create_container.load(Ordering::SeqCst) {
            return Err(UaClientError::transport(&self.server.endpoint, "BadTooManySubscriptions"));
        }
        if self.server.keep_alive_bad_on_create.swap(false, Ordering::SeqCst) {
            self.keep_alive_bad();
            tokio::time::sleep(Duration::from_millis(30)).await;
        }
        let id = self.server.next_container.fetch_add(1, Ordering::SeqCst);
        self.server.state.lock().containers.insert(
            id,
            ServerContainer {
                session: self.id,
                points: BTreeMap::new(),
            },
        );
        Ok(id)
    }

    async fn delete_container(&self, container: ContainerId) -> UaClientResult<()> {
        self.ensure_open()?;
        self.server.state.lock().containers.remove(&container);
        Ok(())
    }

    async fn add_points(
        &self,
        container: ContainerId,
        addresses: &[NodeId],
        _settings: &PointSettings,
    ) -> UaClientResult<Vec<PointId>> {
        self.ensure_open()?;
        if self.server.fail_add_points.load(Ordering::SeqCst) {
            return Err(UaClientError::transport(&self.server.endpoint, "BadTooManyMonitoredItems"));
        }
        let mut state = self.server.state.lock();
        let Some(target) = state.containers.get_mut(&container) else {
            return Err(UaClientError::transport(&self.server.endpoint, "BadSubscriptionIdInvalid"));
        };
        let mut ids = Vec::with_capacity(addresses.len());
        for address in addresses {
            let id = self.server.next_point.fetch_add(1, Ordering::SeqCst);
            target.points.insert(id, address.clone());
            ids.push(id);
        }
        Ok(ids)
    }

    async fn remove_points(&self, container: ContainerId, points: &[PointId]) -> UaClientResult<()> {
        self.ensure_open()?;
        let mut state = self.server.state.lock();
        if let Some(target) = state.containers.get_mut(&container) {
            for id in points {
                target.points.remove(id);
            }
        }
        Ok(())
    }

    fn attach_observer(&self, observer: Arc<dyn SessionObserver>) -> ObserverId {
        self.observers.attach(observer)
    }

    fn detach_observer(&self, id: ObserverId) -> bool {
        self.observers.detach(id)
    }

    async fn close(&self) -> UaClientResult<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.server.drop_session_containers(self.id);
        }
        Ok(())
    }
}

// =============================================================================
// Mock Connector
// =============================================================================

/// How [`MockConnector::begin_reconnect`] resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectMode {
    /// Resolve at once with a fresh session.
    Immediate,
    /// Resolve at once with the failed session reactivated.
    Reactivate,
    /// Resolve at once with a failure.
    Fail,
    /// Resolve when the test calls [`MockConnector::complete_pending`].
    Manual,
}

/// Opens [`MockSession`]s on a [`MockServer`].
pub struct MockConnector {
    server: Arc<MockServer>,
    sessions: Mutex<Vec<Arc<MockSession>>>,
    mode: Mutex<ReconnectMode>,
    pending: Mutex<Vec<(String, ReconnectCompleter)>>,
    open_latency: Mutex<Duration>,
    opens: AtomicU64,
    reconnects: AtomicU64,
}

impl MockConnector {
    /// Create a connector that reconnects immediately.
    pub fn new(server: Arc<MockServer>) -> Arc<Self> {
        Arc::new(Self {
            server,
            sessions: Mutex::new(Vec::new()),
            mode: Mutex::new(ReconnectMode::Immediate),
            pending: Mutex::new(Vec::new()),
            open_latency: Mutex::new(Duration::ZERO),
            opens: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
        })
    }

    /// Returns the server.
    pub fn server(&self) -> &Arc<MockServer> {
        &self.server
    }

    /// Set how reconnects resolve.
    pub fn set_reconnect_mode(&self, mode: ReconnectMode) {
        *self.mode.lock() = mode;
    }

    /// Delay every `open` call.
    pub fn set_open_latency(&self, latency: Duration) {
        *self.open_latency.lock() = latency;
    }

    /// Resolve the oldest pending manual reconnect.
    ///
    /// Returns the new session on success, `None` if nothing was pending or
    /// `succeed` is false.
    pub fn complete_pending(&self, succeed: bool) -> Option<Arc<MockSession>> {
        let (name, completer) = {
            let mut pending = self.pending.lock();
            if pending.is_empty() {
                return None;
            }
            pending.remove(0)
        };
        if succeed {
            let session = self.track(MockSession::open(self.server.clone(), name));
            completer.complete(Ok(session.clone() as Arc<dyn RemoteSession>));
            Some(session)
        } else {
            completer.complete(Err(ReconnectError::failed(&self.server.endpoint, "server unreachable").into()));
            None
        }
    }

    /// Get the number of pending manual reconnects.
    pub fn pending_reconnects(&self) -> usize {
        self.pending.lock().len()
    }

    /// Get the number of `open` calls.
    pub fn open_count(&self) -> u64 {
        self.opens.load(Ordering::SeqCst)
    }

    /// Get the number of `begin_reconnect` calls.
    pub fn reconnect_count(&self) -> u64 {
        self.reconnects.load(Ordering::SeqCst)
    }

    /// Get every session handed out, oldest first.
    pub fn sessions(&self) -> Vec<Arc<MockSession>> {
        self.sessions.lock().clone()
    }

    /// Get the most recent session.
    pub fn last_session(&self) -> Option<Arc<MockSession>> {
        self.sessions.lock().last().cloned()
    }

    fn track(&self, session: Arc<MockSession>) -> Arc<MockSession> {
        self.sessions.lock().push(session.clone());
        session
    }
}

#[async_trait]
impl SessionConnector for MockConnector {
    async fn open(
        &self,
        _identity: &RemoteIdentity,
        session_name: &str,
        _settings: &SessionSettings,
    ) -> UaClientResult<Arc<dyn RemoteSession>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let latency = *self.open_latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.server.fail_open.load(Ordering::SeqCst) {
            return Err(UaClientError::transport(&self.server.endpoint, "connection refused"));
        }
        let session = self.track(MockSession::open(self.server.clone(), session_name));
        Ok(session)
    }

    fn begin_reconnect(&self, failed: Arc<dyn RemoteSession>, _interval: Duration) -> ReconnectHandle {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        let endpoint = failed.endpoint().to_string();
        match *self.mode.lock() {
            ReconnectMode::Immediate => {
                let session = self.track(MockSession::open(self.server.clone(), failed.name()));
                ReconnectHandle::ready(endpoint, Ok(session))
            }
            ReconnectMode::Reactivate => ReconnectHandle::ready(endpoint, Ok(failed)),
            ReconnectMode::Fail => ReconnectHandle::ready(
                endpoint.clone(),
                Err(ReconnectError::failed(endpoint, "server unreachable").into()),
            ),
            ReconnectMode::Manual => {
                let (completer, handle) = ReconnectHandle::channel(endpoint);
                self.pending.lock().push((failed.name().to_string(), completer));
                handle
            }
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Create a server, connector and config with the given container capacity.
pub fn mock_stack(capacity: usize) -> (Arc<MockServer>, Arc<MockConnector>, ClientConfig) {
    let server = MockServer::new("opc.tcp://mock:4840");
    let connector = MockConnector::new(server.clone());
    let config = ClientConfig::builder()
        .endpoint(server.endpoint())
        .container_capacity(capacity)
        .reconnect_interval(Duration::from_millis(10))
        .build()
        .expect("valid mock config");
    (server, connector, config)
}
