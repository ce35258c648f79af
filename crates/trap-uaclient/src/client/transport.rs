// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Remote session abstraction layer.
//!
//! The runtime never speaks the wire protocol itself. It drives a
//! [`RemoteSession`] (one live logical connection) obtained from a
//! [`SessionConnector`], which also owns the background reconnect machinery.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::bus::ObserverId;
use crate::config::{ContainerSettings, PointSettings, SessionSettings};
use crate::error::{ReconnectError, UaClientResult};
use crate::types::{DataValue, NodeId, RemoteIdentity, ScalarType, StatusCode, Variant};

/// Server-assigned subscription container id.
pub type ContainerId = u32;

/// Server-assigned monitored point id.
pub type PointId = u32;

// =============================================================================
// SessionId
// =============================================================================

/// Identifier of a remote session, unique per connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

// =============================================================================
// Session Events
// =============================================================================

/// Liveness status carried by a keep-alive tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LivenessStatus {
    /// The session is healthy.
    Good,
    /// The session lost contact with the server.
    Bad,
}

impl LivenessStatus {
    /// Returns `true` for a good signal.
    #[inline]
    pub fn is_good(&self) -> bool {
        matches!(self, Self::Good)
    }
}

impl fmt::Display for LivenessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Good => write!(f, "good"),
            Self::Bad => write!(f, "bad"),
        }
    }
}

/// Events a remote session delivers to its observers.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Periodic keep-alive tick.
    KeepAlive {
        /// Liveness status.
        status: LivenessStatus,
        /// Free-form diagnostics from the session layer.
        diagnostics: Option<String>,
    },

    /// The server is closing the session.
    SessionClosing,

    /// The server reports structural changes to subscriptions.
    SubscriptionsChanged,

    /// A monitored point reported a new value.
    DataChange {
        /// Container the notification arrived on.
        container: ContainerId,
        /// Address of the monitored point.
        address: NodeId,
        /// The reported value.
        value: DataValue,
    },
}

impl SessionEvent {
    /// Creates a keep-alive event.
    pub fn keep_alive(status: LivenessStatus) -> Self {
        Self::KeepAlive {
            status,
            diagnostics: None,
        }
    }

    /// Returns a short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::KeepAlive { .. } => "keep_alive",
            Self::SessionClosing => "session_closing",
            Self::SubscriptionsChanged => "subscriptions_changed",
            Self::DataChange { .. } => "data_change",
        }
    }
}

/// Receives events from a remote session.
///
/// Called on whatever thread the session layer uses; implementations must
/// return quickly and must not block.
pub trait SessionObserver: Send + Sync {
    /// Handles one event.
    fn on_event(&self, event: &SessionEvent);
}

// =============================================================================
// Type Descriptions
// =============================================================================

/// Server-declared type of a node, as returned by the discovery call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeDescription {
    /// A scalar attribute.
    Scalar(ScalarType),
    /// A structured node whose fields are child nodes.
    Structure(Vec<FieldDescription>),
}

impl TypeDescription {
    /// Returns the field with the given name, if structured.
    pub fn field(&self, name: &str) -> Option<&FieldDescription> {
        match self {
            Self::Structure(fields) => fields.iter().find(|f| f.name == name),
            Self::Scalar(_) => None,
        }
    }

    /// Returns a short name for diagnostics.
    pub fn kind(&self) -> String {
        match self {
            Self::Scalar(scalar) => scalar.name().to_string(),
            Self::Structure(_) => "Structure".to_string(),
        }
    }
}

/// One field of a structured node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescription {
    /// Field name, also the child address suffix.
    pub name: String,
    /// Field type.
    pub description: TypeDescription,
}

impl FieldDescription {
    /// Creates a scalar field.
    pub fn scalar(name: impl Into<String>, scalar: ScalarType) -> Self {
        Self {
            name: name.into(),
            description: TypeDescription::Scalar(scalar),
        }
    }

    /// Creates a structured field.
    pub fn structure(name: impl Into<String>, fields: Vec<FieldDescription>) -> Self {
        Self {
            name: name.into(),
            description: TypeDescription::Structure(fields),
        }
    }
}

/// Result of a method call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CallOutcome {
    /// Overall call status.
    pub status: StatusCode,
    /// Output arguments.
    pub outputs: Vec<Variant>,
}

// =============================================================================
// RemoteSession Trait
// =============================================================================

/// One live logical connection to a server.
///
/// Batch operations return one result per input, in input order.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the runtime calls them from many
/// tasks concurrently.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    // =========================================================================
    // Identity
    // =========================================================================

    /// Returns the session id.
    fn id(&self) -> SessionId;

    /// Returns the session name the session was opened with.
    fn name(&self) -> &str;

    /// Returns the endpoint URL.
    fn endpoint(&self) -> &str;

    // =========================================================================
    // Attribute Services
    // =========================================================================

    /// Reads the value attribute of each address.
    async fn read_values(&self, addresses: &[NodeId]) -> UaClientResult<Vec<DataValue>>;

    /// Writes the value attribute of each address.
    async fn write_values(&self, writes: &[(NodeId, Variant)]) -> UaClientResult<Vec<StatusCode>>;

    /// Calls a method on an object.
    async fn call(
        &self,
        object: &NodeId,
        method: &NodeId,
        arguments: &[Variant],
    ) -> UaClientResult<CallOutcome>;

    /// Describes the type of a node, recursing into structured fields.
    async fn describe_type(&self, address: &NodeId) -> UaClientResult<TypeDescription>;

    // =========================================================================
    // Subscription Services
    // =========================================================================

    /// Creates a subscription container.
    async fn create_container(&self, settings: &ContainerSettings) -> UaClientResult<ContainerId>;

    /// Deletes a subscription container and everything in it.
    async fn delete_container(&self, container: ContainerId) -> UaClientResult<()>;

    /// Adds monitored points to a container, returning their ids.
    async fn add_points(
        &self,
        container: ContainerId,
        addresses: &[NodeId],
        settings: &PointSettings,
    ) -> UaClientResult<Vec<PointId>>;

    /// Removes monitored points from a container.
    async fn remove_points(&self, container: ContainerId, points: &[PointId]) -> UaClientResult<()>;

    // =========================================================================
    // Events and Lifecycle
    // =========================================================================

    /// Attaches an event observer.
    fn attach_observer(&self, observer: Arc<dyn SessionObserver>) -> ObserverId;

    /// Detaches an event observer. Returns `false` if it was not attached.
    fn detach_observer(&self, id: ObserverId) -> bool;

    /// Closes the session.
    async fn close(&self) -> UaClientResult<()>;
}

// =============================================================================
// SessionConnector Trait
// =============================================================================

/// Opens sessions and runs background reconnects.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    /// Opens a new session.
    ///
    /// # Errors
    ///
    /// Returns a connection error if the server cannot be reached.
    async fn open(
        &self,
        identity: &RemoteIdentity,
        session_name: &str,
        settings: &SessionSettings,
    ) -> UaClientResult<Arc<dyn RemoteSession>>;

    /// Starts a fire-and-forget reconnect for a failed session.
    ///
    /// The connector keeps retrying every `interval` until it either produces
    /// a session or gives up; the returned handle resolves once.
    fn begin_reconnect(&self, failed: Arc<dyn RemoteSession>, interval: Duration) -> ReconnectHandle;
}

// =============================================================================
// ReconnectHandle
// =============================================================================

type ReconnectResult = UaClientResult<Arc<dyn RemoteSession>>;

/// Completion side of a background reconnect.
pub struct ReconnectCompleter {
    sender: oneshot::Sender<ReconnectResult>,
}

impl ReconnectCompleter {
    /// Reports the outcome. Returns `false` if nobody is waiting anymore.
    pub fn complete(self, result: ReconnectResult) -> bool {
        self.sender.send(result).is_ok()
    }
}

impl fmt::Debug for ReconnectCompleter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconnectCompleter")
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

/// Waiting side of a background reconnect.
///
/// Dropping the handle does not stop the reconnect; the completer simply
/// finds nobody listening.
pub struct ReconnectHandle {
    endpoint: String,
    receiver: oneshot::Receiver<ReconnectResult>,
}

impl ReconnectHandle {
    /// Creates a linked completer and handle.
    pub fn channel(endpoint: impl Into<String>) -> (ReconnectCompleter, ReconnectHandle) {
        let (sender, receiver) = oneshot::channel();
        (
            ReconnectCompleter { sender },
            ReconnectHandle {
                endpoint: endpoint.into(),
                receiver,
            },
        )
    }

    /// Creates a handle that is already resolved.
    pub fn ready(endpoint: impl Into<String>, result: ReconnectResult) -> ReconnectHandle {
        let (completer, handle) = Self::channel(endpoint);
        completer.complete(result);
        handle
    }

    /// Returns the endpoint being reconnected.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Waits for the outcome.
    ///
    /// A completer dropped without reporting counts as an abandoned attempt.
    pub async fn wait(self) -> ReconnectResult {
        match self.receiver.await {
            Ok(result) => result,
            Err(_) => Err(ReconnectError::abandoned(self.endpoint).into()),
        }
    }
}

impl fmt::Debug for ReconnectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconnectHandle")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UaClientError;

    #[tokio::test]
    async fn test_reconnect_handle_abandoned() {
        let (completer, handle) = ReconnectHandle::channel("opc.tcp://localhost:4840");
        drop(completer);

        let err = handle.wait().await.err().unwrap();
        assert!(matches!(
            err,
            UaClientError::Reconnect(ReconnectError::Abandoned { .. })
        ));
    }

    #[tokio::test]
    async fn test_reconnect_handle_failure_passes_through() {
        let handle = ReconnectHandle::ready(
            "opc.tcp://localhost:4840",
            Err(UaClientError::reconnect_failed("opc.tcp://localhost:4840", "refused")),
        );
        assert_eq!(handle.endpoint(), "opc.tcp://localhost:4840");
        assert!(handle.wait().await.is_err());
    }

    #[test]
    fn test_completer_without_listener() {
        let (completer, handle) = ReconnectHandle::channel("opc.tcp://localhost:4840");
        drop(handle);
        assert!(!completer.complete(Err(UaClientError::not_connected())));
    }

    #[test]
    fn test_type_description_field_lookup() {
        let description = TypeDescription::Structure(vec![
            FieldDescription::scalar("Speed", ScalarType::Double),
            FieldDescription::structure(
                "Drive",
                vec![FieldDescription::scalar("Running", ScalarType::Boolean)],
            ),
        ]);

        assert_eq!(
            description.field("Speed").map(|f| &f.description),
            Some(&TypeDescription::Scalar(ScalarType::Double))
        );
        assert!(description.field("Missing").is_none());
        assert_eq!(description.kind(), "Structure");
        assert!(TypeDescription::Scalar(ScalarType::Int32).field("x").is_none());
    }
}
