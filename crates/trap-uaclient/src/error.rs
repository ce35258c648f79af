// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Client runtime error types with diagnostics.
//!
//! This module provides the error hierarchy for the resilient client runtime,
//! designed for:
//!
//! - **Diagnostics**: Detailed error information for debugging
//! - **Recovery**: Hints for error recovery and retry decisions
//! - **Observability**: Structured logging with stable error codes
//!
//! # Error Categories
//!
//! ```text
//! UaClientError
//! ├── Connection    - Transport failures and connection misuse
//! ├── Reconnect     - Background reconnect attempt failures
//! ├── Operation     - Read/write/call status failures
//! ├── Schema        - Composite type schema resolution failures
//! ├── Subscription  - Container and monitored point failures
//! ├── Conversion    - Value coercion failures
//! ├── Registry      - Connection registry violations
//! ├── Configuration - Invalid settings
//! └── Cancelled     - Caller-requested cancellation
//! ```
//!
//! # Examples
//!
//! ```
//! use trap_uaclient::error::UaClientError;
//!
//! let error = UaClientError::transport("opc.tcp://localhost:4840", "connection refused");
//!
//! assert!(error.is_retryable());
//! for hint in error.recovery_hints() {
//!     println!("Hint: {}", hint);
//! }
//! ```

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tracing::Level;

use crate::types::StatusCode;

// =============================================================================
// UaClientError - Main Error Type
// =============================================================================

/// The main error type for the client runtime.
///
/// Errors are grouped by domain so callers can match on the category they
/// care about while still handling everything through one type.
#[derive(Debug, Error)]
pub enum UaClientError {
    /// Connection-related errors.
    #[error("{0}")]
    Connection(#[from] ConnectionError),

    /// Reconnect procedure errors.
    #[error("{0}")]
    Reconnect(#[from] ReconnectError),

    /// Read/write/call operation errors.
    #[error("{0}")]
    Operation(#[from] OperationError),

    /// Composite schema errors.
    #[error("{0}")]
    Schema(#[from] SchemaError),

    /// Subscription container and monitored point errors.
    #[error("{0}")]
    Subscription(#[from] SubscriptionError),

    /// Value conversion errors.
    #[error("{0}")]
    Conversion(#[from] ConversionError),

    /// Client registry errors.
    #[error("{0}")]
    Registry(#[from] RegistryError),

    /// Configuration errors.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// The caller cancelled the operation.
    #[error("Operation '{operation}' was cancelled")]
    Cancelled {
        /// Name of the cancelled operation.
        operation: String,
    },
}

impl UaClientError {
    // =========================================================================
    // Convenience Factory Methods
    // =========================================================================

    /// Creates a transport error.
    pub fn transport(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection(ConnectionError::transport(endpoint, message))
    }

    /// Creates an already connected error.
    pub fn already_connected(endpoint: impl Into<String>) -> Self {
        Self::Connection(ConnectionError::AlreadyConnected {
            endpoint: endpoint.into(),
        })
    }

    /// Creates a not connected error.
    pub fn not_connected() -> Self {
        Self::Connection(ConnectionError::NotConnected)
    }

    /// Creates a reconnect failed error.
    pub fn reconnect_failed(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Reconnect(ReconnectError::failed(endpoint, message))
    }

    /// Creates a remote read failed error.
    pub fn read_failed(address: impl Into<String>, status: StatusCode) -> Self {
        Self::Operation(OperationError::read_failed(address, status))
    }

    /// Creates a remote write failed error.
    pub fn write_failed(address: impl Into<String>, status: StatusCode) -> Self {
        Self::Operation(OperationError::write_failed(address, status))
    }

    /// Creates a schema resolution failed error.
    pub fn schema_resolution(
        type_tag: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Schema(SchemaError::resolution_failed(type_tag, field, reason))
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::Conversion(ConversionError::type_mismatch(expected, actual))
    }

    /// Creates a duplicate connection error.
    pub fn duplicate_connection(identity: impl Into<String>) -> Self {
        Self::Registry(RegistryError::DuplicateConnection {
            identity: identity.into(),
        })
    }

    /// Creates a cancelled error.
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    // =========================================================================
    // Error Properties
    // =========================================================================

    /// Returns `true` if this error is retryable.
    ///
    /// Nothing in the runtime retries automatically; this is advice for the
    /// caller deciding whether to call the operation again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(e) => e.is_retryable(),
            Self::Reconnect(e) => e.is_retryable(),
            Self::Operation(e) => e.is_retryable(),
            Self::Subscription(e) => e.is_retryable(),
            Self::Registry(e) => e.is_retryable(),
            Self::Cancelled { .. } => true,
            Self::Schema(_) | Self::Conversion(_) | Self::Configuration(_) => false,
        }
    }

    /// Returns the severity level of this error.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Connection(e) => e.severity(),
            Self::Reconnect(e) => e.severity(),
            Self::Operation(e) => e.severity(),
            Self::Schema(_) => ErrorSeverity::Error,
            Self::Subscription(e) => e.severity(),
            Self::Conversion(_) => ErrorSeverity::Warning,
            Self::Registry(e) => e.severity(),
            Self::Configuration(_) => ErrorSeverity::Critical,
            Self::Cancelled { .. } => ErrorSeverity::Info,
        }
    }

    /// Returns the error category for logging and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Reconnect(_) => "reconnect",
            Self::Operation(_) => "operation",
            Self::Schema(_) => "schema",
            Self::Subscription(_) => "subscription",
            Self::Conversion(_) => "conversion",
            Self::Registry(_) => "registry",
            Self::Configuration(_) => "configuration",
            Self::Cancelled { .. } => "cancelled",
        }
    }

    /// Returns a unique error code for this error.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Connection(e) => e.error_code(),
            Self::Reconnect(e) => e.error_code(),
            Self::Operation(e) => e.error_code(),
            Self::Schema(e) => e.error_code(),
            Self::Subscription(e) => e.error_code(),
            Self::Conversion(e) => e.error_code(),
            Self::Registry(e) => e.error_code(),
            Self::Configuration(e) => e.error_code(),
            Self::Cancelled { .. } => ErrorCode::new(9, 1),
        }
    }

    /// Returns recovery hints for this error.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::Connection(e) => e.recovery_hints(),
            Self::Reconnect(e) => e.recovery_hints(),
            Self::Operation(e) => e.recovery_hints(),
            Self::Schema(e) => e.recovery_hints(),
            Self::Subscription(e) => e.recovery_hints(),
            Self::Conversion(e) => e.recovery_hints(),
            Self::Registry(e) => e.recovery_hints(),
            Self::Configuration(e) => e.recovery_hints(),
            Self::Cancelled { .. } => vec!["Retry the operation if the result is still needed"],
        }
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            Self::Connection(e) => e.user_message(),
            Self::Reconnect(e) => e.user_message(),
            Self::Operation(e) => e.user_message(),
            Self::Schema(e) => e.user_message(),
            Self::Subscription(e) => e.user_message(),
            Self::Conversion(e) => e.user_message(),
            Self::Registry(e) => e.user_message(),
            Self::Configuration(e) => e.user_message(),
            Self::Cancelled { operation } => format!("작업이 취소되었습니다: {}", operation),
        }
    }

    /// Returns the tracing level for this error.
    pub fn tracing_level(&self) -> Level {
        self.severity().to_tracing_level()
    }

    /// Logs this error with appropriate level and context.
    pub fn log(&self, context: &str) {
        let level = self.tracing_level();
        let code = self.error_code();

        match level {
            Level::ERROR => tracing::error!(
                error_code = %code,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
            Level::WARN => tracing::warn!(
                error_code = %code,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
            _ => tracing::debug!(
                error_code = %code,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
        }
    }
}

// =============================================================================
// ConnectionError
// =============================================================================

/// Connection-related errors.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The remote session could not be opened or a transport call failed.
    #[error("Transport error for '{endpoint}': {message}")]
    Transport {
        /// Target endpoint.
        endpoint: String,
        /// Error message.
        message: String,
        /// Underlying error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// `connect` was called on a connection that is already connected.
    #[error("Already connected to '{endpoint}'")]
    AlreadyConnected {
        /// Target endpoint.
        endpoint: String,
    },

    /// The operation requires a connected session.
    #[error("Not connected to server")]
    NotConnected,

    /// The session was closed underneath the connection.
    #[error("Session closed: {reason}")]
    Closed {
        /// Reason for closure.
        reason: String,
    },
}

impl ConnectionError {
    /// Creates a transport error.
    pub fn transport(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a transport error with source.
    pub fn transport_with(
        endpoint: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a session closed error.
    pub fn closed(reason: impl Into<String>) -> Self {
        Self::Closed {
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Closed { .. } => true,
            Self::NotConnected => true,
            Self::AlreadyConnected { .. } => false,
        }
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Transport { .. } => ErrorSeverity::Error,
            Self::AlreadyConnected { .. } => ErrorSeverity::Info,
            Self::NotConnected | Self::Closed { .. } => ErrorSeverity::Warning,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Transport { .. } => ErrorCode::new(1, 1),
            Self::AlreadyConnected { .. } => ErrorCode::new(1, 2),
            Self::NotConnected => ErrorCode::new(1, 3),
            Self::Closed { .. } => ErrorCode::new(1, 4),
        }
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::Transport { .. } => vec![
                "Check if the server is running",
                "Verify the endpoint URL is correct",
                "Check firewall rules allow the connection",
            ],
            Self::AlreadyConnected { .. } => vec!["Call disconnect() before connecting again"],
            Self::NotConnected => vec![
                "Call connect() before performing operations",
                "Watch the state-changed stream for reconnect completion",
            ],
            Self::Closed { .. } => vec![
                "The server closed the session",
                "Call connect() to open a new session",
            ],
        }
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            Self::Transport { endpoint, .. } => {
                format!("서버({})에 연결할 수 없습니다", endpoint)
            }
            Self::AlreadyConnected { endpoint } => {
                format!("이미 서버({})에 연결되어 있습니다", endpoint)
            }
            Self::NotConnected => "서버에 연결되어 있지 않습니다".to_string(),
            Self::Closed { .. } => "세션이 종료되었습니다".to_string(),
        }
    }
}

// =============================================================================
// ReconnectError
// =============================================================================

/// Errors raised by the background reconnect procedure.
///
/// These never reach a caller directly; they are published on the
/// connection's error stream and end in a `Disconnected` transition.
#[derive(Debug, Error)]
pub enum ReconnectError {
    /// The reconnect attempt completed with a failure.
    #[error("Reconnect to '{endpoint}' failed: {message}")]
    Failed {
        /// Target endpoint.
        endpoint: String,
        /// Error message.
        message: String,
    },

    /// The reconnect handle was dropped without a result.
    #[error("Reconnect to '{endpoint}' was abandoned by the session layer")]
    Abandoned {
        /// Target endpoint.
        endpoint: String,
    },

    /// Restoring subscription containers on the new session failed.
    #[error("Failed to restore {failed} subscription container(s) after reconnect: {message}")]
    RestoreFailed {
        /// Number of containers that could not be recreated.
        failed: usize,
        /// First failure message.
        message: String,
    },
}

impl ReconnectError {
    /// Creates a reconnect failed error.
    pub fn failed(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Creates an abandoned reconnect error.
    pub fn abandoned(endpoint: impl Into<String>) -> Self {
        Self::Abandoned {
            endpoint: endpoint.into(),
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::RestoreFailed { .. })
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Error
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Failed { .. } => ErrorCode::new(2, 1),
            Self::Abandoned { .. } => ErrorCode::new(2, 2),
            Self::RestoreFailed { .. } => ErrorCode::new(2, 3),
        }
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::Failed { .. } | Self::Abandoned { .. } => vec![
                "The connection is now disconnected",
                "Call connect() to open a new session",
            ],
            Self::RestoreFailed { .. } => vec![
                "Check server subscription limits",
                "Unsubscribe and subscribe the affected addresses again",
            ],
        }
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            Self::Failed { endpoint, .. } | Self::Abandoned { endpoint } => {
                format!("서버({}) 재연결에 실패했습니다", endpoint)
            }
            Self::RestoreFailed { failed, .. } => {
                format!("재연결 후 구독 {}개를 복원하지 못했습니다", failed)
            }
        }
    }
}

// =============================================================================
// OperationError
// =============================================================================

/// Per-attribute operation failures.
#[derive(Debug, Error)]
pub enum OperationError {
    /// A remote attribute read returned a bad status.
    #[error("Read of '{address}' failed with status {status}")]
    ReadFailed {
        /// Remote address.
        address: String,
        /// Status code returned by the server.
        status: StatusCode,
    },

    /// A remote attribute write returned a bad status.
    #[error("Write of '{address}' failed with status {status}")]
    WriteFailed {
        /// Remote address.
        address: String,
        /// Status code returned by the server.
        status: StatusCode,
    },

    /// A method call returned a bad status.
    #[error("Call of '{method}' on '{object}' failed with status {status}")]
    CallFailed {
        /// Object address.
        object: String,
        /// Method address.
        method: String,
        /// Status code returned by the server.
        status: StatusCode,
    },

    /// A batch response did not line up with its request.
    #[error("Batch {operation} returned {actual} results for {expected} requests")]
    BatchMismatch {
        /// Operation name.
        operation: &'static str,
        /// Number of requests.
        expected: usize,
        /// Number of results.
        actual: usize,
    },
}

impl OperationError {
    /// Creates a read failed error.
    pub fn read_failed(address: impl Into<String>, status: StatusCode) -> Self {
        Self::ReadFailed {
            address: address.into(),
            status,
        }
    }

    /// Creates a write failed error.
    pub fn write_failed(address: impl Into<String>, status: StatusCode) -> Self {
        Self::WriteFailed {
            address: address.into(),
            status,
        }
    }

    /// Creates a call failed error.
    pub fn call_failed(
        object: impl Into<String>,
        method: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self::CallFailed {
            object: object.into(),
            method: method.into(),
            status,
        }
    }

    /// Returns the status code carried by this error, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::ReadFailed { status, .. }
            | Self::WriteFailed { status, .. }
            | Self::CallFailed { status, .. } => Some(*status),
            Self::BatchMismatch { .. } => None,
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self.status() {
            Some(status) => matches!(
                status,
                StatusCode::BAD_TIMEOUT
                    | StatusCode::BAD_COMMUNICATION_ERROR
                    | StatusCode::BAD_SERVER_NOT_CONNECTED
                    | StatusCode::BAD_SESSION_CLOSED
            ),
            None => false,
        }
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::BatchMismatch { .. } => ErrorSeverity::Error,
            _ => ErrorSeverity::Warning,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::ReadFailed { .. } => ErrorCode::new(3, 1),
            Self::WriteFailed { .. } => ErrorCode::new(3, 2),
            Self::CallFailed { .. } => ErrorCode::new(3, 3),
            Self::BatchMismatch { .. } => ErrorCode::new(3, 4),
        }
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::ReadFailed { .. } => vec![
                "Verify the node exists and is readable",
                "Check the user has read access",
            ],
            Self::WriteFailed { .. } => vec![
                "Verify the node is writable",
                "Check the value matches the node data type",
            ],
            Self::CallFailed { .. } => vec![
                "Verify the method belongs to the object",
                "Check the input arguments",
            ],
            Self::BatchMismatch { .. } => vec!["Report the server behaviour; results cannot be matched"],
        }
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            Self::ReadFailed { address, status } => {
                format!("노드 읽기 실패: {} ({})", address, status.name())
            }
            Self::WriteFailed { address, status } => {
                format!("노드 쓰기 실패: {} ({})", address, status.name())
            }
            Self::CallFailed { method, status, .. } => {
                format!("메서드 호출 실패: {} ({})", method, status.name())
            }
            Self::BatchMismatch { .. } => "서버 응답 형식이 올바르지 않습니다".to_string(),
        }
    }
}

// =============================================================================
// SchemaError
// =============================================================================

/// Composite type schema errors.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// A field has no resolvable remote type.
    #[error("Cannot resolve remote type of field '{field}' in '{type_tag}': {reason}")]
    ResolutionFailed {
        /// Composite type tag.
        type_tag: String,
        /// Field name.
        field: String,
        /// Reason.
        reason: String,
    },

    /// A child address cannot be derived from the parent address.
    #[error("Cannot address field '{field}' below '{parent}': only string node ids have children")]
    InvalidChildAddress {
        /// Parent address.
        parent: String,
        /// Field name.
        field: String,
    },

    /// The remote node shape does not match the local type shape.
    #[error("Shape mismatch for '{type_tag}': expected {expected}, server declares {actual}")]
    ShapeMismatch {
        /// Local type tag.
        type_tag: String,
        /// Local shape.
        expected: String,
        /// Remote shape.
        actual: String,
    },
}

impl SchemaError {
    /// Creates a resolution failed error.
    pub fn resolution_failed(
        type_tag: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::ResolutionFailed {
            type_tag: type_tag.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a shape mismatch error.
    pub fn shape_mismatch(
        type_tag: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::ShapeMismatch {
            type_tag: type_tag.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::ResolutionFailed { .. } => ErrorCode::new(4, 1),
            Self::InvalidChildAddress { .. } => ErrorCode::new(4, 2),
            Self::ShapeMismatch { .. } => ErrorCode::new(4, 3),
        }
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::ResolutionFailed { .. } => vec![
                "Check the field names match the server structure definition",
                "A server-side schema change requires a new connection",
            ],
            Self::InvalidChildAddress { .. } => {
                vec!["Address composite values with string node ids (ns=2;s=...)"]
            }
            Self::ShapeMismatch { .. } => vec!["Use a scalar type for scalar nodes and vice versa"],
        }
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            Self::ResolutionFailed { field, .. } => {
                format!("필드 타입을 확인할 수 없습니다: {}", field)
            }
            Self::InvalidChildAddress { parent, .. } => {
                format!("하위 노드 주소를 만들 수 없습니다: {}", parent)
            }
            Self::ShapeMismatch { type_tag, .. } => {
                format!("타입 구조가 서버와 일치하지 않습니다: {}", type_tag)
            }
        }
    }
}

// =============================================================================
// SubscriptionError
// =============================================================================

/// Subscription container and monitored point errors.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// Creating a container on the server failed.
    #[error("Failed to create subscription container: {message}")]
    ContainerCreateFailed {
        /// Error message.
        message: String,
    },

    /// Deleting a container on the server failed.
    #[error("Failed to delete subscription container {container}: {message}")]
    ContainerDeleteFailed {
        /// Server-side container id.
        container: u32,
        /// Error message.
        message: String,
    },

    /// Adding a monitored point failed.
    #[error("Failed to monitor '{address}': {message}")]
    PointAddFailed {
        /// Remote address.
        address: String,
        /// Error message.
        message: String,
    },

    /// Removing a monitored point failed.
    #[error("Failed to stop monitoring '{address}': {message}")]
    PointRemoveFailed {
        /// Remote address.
        address: String,
        /// Error message.
        message: String,
    },

    /// A single request needs more points than one container may hold.
    #[error("Requested {requested} points but a container holds at most {capacity}")]
    CapacityExceeded {
        /// Requested point count.
        requested: usize,
        /// Container capacity.
        capacity: usize,
    },
}

impl SubscriptionError {
    /// Creates a container create failed error.
    pub fn container_create_failed(message: impl Into<String>) -> Self {
        Self::ContainerCreateFailed {
            message: message.into(),
        }
    }

    /// Creates a container delete failed error.
    pub fn container_delete_failed(container: u32, message: impl Into<String>) -> Self {
        Self::ContainerDeleteFailed {
            container,
            message: message.into(),
        }
    }

    /// Creates a point add failed error.
    pub fn point_add_failed(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PointAddFailed {
            address: address.into(),
            message: message.into(),
        }
    }

    /// Creates a point remove failed error.
    pub fn point_remove_failed(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PointRemoveFailed {
            address: address.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::CapacityExceeded { .. })
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::CapacityExceeded { .. } => ErrorSeverity::Error,
            _ => ErrorSeverity::Warning,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::ContainerCreateFailed { .. } => ErrorCode::new(5, 1),
            Self::ContainerDeleteFailed { .. } => ErrorCode::new(5, 2),
            Self::PointAddFailed { .. } => ErrorCode::new(5, 3),
            Self::PointRemoveFailed { .. } => ErrorCode::new(5, 4),
            Self::CapacityExceeded { .. } => ErrorCode::new(5, 5),
        }
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::ContainerCreateFailed { .. } => vec![
                "Check the server subscription limits",
                "Verify the session is still connected",
            ],
            Self::ContainerDeleteFailed { .. } => {
                vec!["The server releases the container when the session closes"]
            }
            Self::PointAddFailed { .. } => vec![
                "Verify the node exists",
                "Check the server monitored item limits",
            ],
            Self::PointRemoveFailed { .. } => {
                vec!["The point stops reporting once its container is deleted"]
            }
            Self::CapacityExceeded { .. } => vec![
                "Split the request into smaller batches",
                "Increase container_capacity in the configuration",
            ],
        }
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            Self::ContainerCreateFailed { .. } => "구독 생성에 실패했습니다".to_string(),
            Self::ContainerDeleteFailed { container, .. } => {
                format!("구독({}) 삭제에 실패했습니다", container)
            }
            Self::PointAddFailed { address, .. } => {
                format!("모니터링 항목 추가 실패: {}", address)
            }
            Self::PointRemoveFailed { address, .. } => {
                format!("모니터링 항목 제거 실패: {}", address)
            }
            Self::CapacityExceeded { capacity, .. } => {
                format!("구독당 최대 항목 수({})를 초과했습니다", capacity)
            }
        }
    }
}

// =============================================================================
// ConversionError
// =============================================================================

/// Value conversion errors.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// The value has a different type than expected.
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Expected type.
        expected: String,
        /// Actual type.
        actual: String,
    },

    /// The value does not fit in the target type.
    #[error("Value {value} is out of range for {target}")]
    OutOfRange {
        /// Value rendered as text.
        value: String,
        /// Target type.
        target: String,
    },

    /// A null value was found where a value was required.
    #[error("Null value where {expected} was expected")]
    NullValue {
        /// Expected type.
        expected: String,
    },

    /// A composite value lacks a field.
    #[error("Composite value has no field '{field}'")]
    MissingField {
        /// Field name.
        field: String,
    },
}

impl ConversionError {
    /// Creates a type mismatch error.
    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates an out of range error.
    pub fn out_of_range(value: impl fmt::Display, target: impl Into<String>) -> Self {
        Self::OutOfRange {
            value: value.to_string(),
            target: target.into(),
        }
    }

    /// Creates a null value error.
    pub fn null_value(expected: impl Into<String>) -> Self {
        Self::NullValue {
            expected: expected.into(),
        }
    }

    /// Creates a missing field error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::TypeMismatch { .. } => ErrorCode::new(6, 1),
            Self::OutOfRange { .. } => ErrorCode::new(6, 2),
            Self::NullValue { .. } => ErrorCode::new(6, 3),
            Self::MissingField { .. } => ErrorCode::new(6, 4),
        }
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::TypeMismatch { .. } => vec!["Declare a local type compatible with the node data type"],
            Self::OutOfRange { .. } => vec!["Use a wider local type"],
            Self::NullValue { .. } => vec!["Use Variant to accept null values"],
            Self::MissingField { .. } => vec!["Check the structure field names"],
        }
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            Self::TypeMismatch { expected, actual } => {
                format!("타입 불일치: {} 예상, {} 수신", expected, actual)
            }
            Self::OutOfRange { value, target } => {
                format!("값 {}이(가) {} 범위를 벗어났습니다", value, target)
            }
            Self::NullValue { .. } => "값이 비어 있습니다".to_string(),
            Self::MissingField { field } => format!("필드가 없습니다: {}", field),
        }
    }
}

// =============================================================================
// RegistryError
// =============================================================================

/// Client registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A connection with the same identity already exists.
    #[error("A connection for '{identity}' already exists")]
    DuplicateConnection {
        /// Remote identity.
        identity: String,
    },

    /// The registry is full.
    #[error("Connection limit reached ({max})")]
    CapacityExceeded {
        /// Maximum number of connections.
        max: usize,
    },

    /// No connection exists for the identity.
    #[error("No connection for '{identity}'")]
    NotFound {
        /// Remote identity.
        identity: String,
    },

    /// The registry was disposed.
    #[error("Client registry has been disposed")]
    Disposed,
}

impl RegistryError {
    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CapacityExceeded { .. })
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NotFound { .. } => ErrorSeverity::Info,
            Self::Disposed => ErrorSeverity::Error,
            _ => ErrorSeverity::Warning,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::DuplicateConnection { .. } => ErrorCode::new(7, 1),
            Self::CapacityExceeded { .. } => ErrorCode::new(7, 2),
            Self::NotFound { .. } => ErrorCode::new(7, 3),
            Self::Disposed => ErrorCode::new(7, 4),
        }
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::DuplicateConnection { .. } => {
                vec!["Use create_or_get_connection() to reuse the existing connection"]
            }
            Self::CapacityExceeded { .. } => vec![
                "Remove unused connections",
                "Increase max_connections in the configuration",
            ],
            Self::NotFound { .. } => vec!["Create the connection first"],
            Self::Disposed => vec!["Create a new registry"],
        }
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            Self::DuplicateConnection { identity } => {
                format!("이미 존재하는 연결입니다: {}", identity)
            }
            Self::CapacityExceeded { max } => format!("최대 연결 수({})에 도달했습니다", max),
            Self::NotFound { identity } => format!("연결을 찾을 수 없습니다: {}", identity),
            Self::Disposed => "레지스트리가 이미 해제되었습니다".to_string(),
        }
    }
}

// =============================================================================
// ConfigurationError
// =============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A required field is missing.
    #[error("Missing required field: '{field}'")]
    MissingField {
        /// Field name.
        field: String,
    },

    /// A field has an invalid value.
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue {
        /// Field name.
        field: String,
        /// Reason.
        reason: String,
    },

    /// The endpoint URL is invalid.
    #[error("Invalid endpoint URL: '{url}' - {reason}")]
    InvalidEndpoint {
        /// The invalid URL.
        url: String,
        /// Reason.
        reason: String,
    },

    /// A node id string could not be parsed.
    #[error("Invalid node id '{node_id}': {reason}")]
    InvalidNodeId {
        /// Node id text.
        node_id: String,
        /// Reason.
        reason: String,
    },

    /// A configuration file could not be read.
    #[error("Failed to read configuration file {path:?}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Configuration content could not be parsed.
    #[error("Failed to parse {format} configuration: {message}")]
    Parse {
        /// Format name.
        format: &'static str,
        /// Parser message.
        message: String,
    },
}

impl ConfigurationError {
    /// Creates a missing field error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Creates an invalid value error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid endpoint error.
    pub fn invalid_endpoint(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid node id error.
    pub fn invalid_node_id(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidNodeId {
            node_id: node_id.into(),
            reason: reason.into(),
        }
    }

    /// Creates a parse error.
    pub fn parse(format: &'static str, message: impl fmt::Display) -> Self {
        Self::Parse {
            format,
            message: message.to_string(),
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::MissingField { .. } => ErrorCode::new(8, 1),
            Self::InvalidValue { .. } => ErrorCode::new(8, 2),
            Self::InvalidEndpoint { .. } => ErrorCode::new(8, 3),
            Self::InvalidNodeId { .. } => ErrorCode::new(8, 4),
            Self::Io { .. } => ErrorCode::new(8, 5),
            Self::Parse { .. } => ErrorCode::new(8, 6),
        }
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::MissingField { .. } => vec!["Add the missing field to the configuration"],
            Self::InvalidValue { .. } => vec!["Check the value against the documented range"],
            Self::InvalidEndpoint { .. } => vec!["Use format: opc.tcp://hostname:port/path"],
            Self::InvalidNodeId { .. } => vec![
                "Use format: ns=<index>;<type>=<value>",
                "Valid types are i= (numeric), s= (string), g= (guid), b= (opaque)",
            ],
            Self::Io { .. } => vec!["Check the file path and permissions"],
            Self::Parse { .. } => vec!["Check the file syntax matches its extension"],
        }
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            Self::MissingField { field } => format!("필수 설정이 없습니다: {}", field),
            Self::InvalidValue { field, .. } => format!("잘못된 설정 값: {}", field),
            Self::InvalidEndpoint { url, .. } => format!("잘못된 엔드포인트 URL: {}", url),
            Self::InvalidNodeId { node_id, .. } => format!("잘못된 노드 ID: {}", node_id),
            Self::Io { path, .. } => format!("설정 파일을 읽을 수 없습니다: {}", path.display()),
            Self::Parse { format, .. } => format!("{} 설정 파싱 실패", format),
        }
    }
}

// =============================================================================
// ErrorSeverity
// =============================================================================

/// Error severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    /// Informational - no action required.
    Info,
    /// Warning - action may be required.
    Warning,
    /// Error - action required, but recoverable.
    Error,
    /// Critical - immediate action required.
    Critical,
}

impl ErrorSeverity {
    /// Converts to tracing level.
    pub fn to_tracing_level(self) -> Level {
        match self {
            Self::Info => Level::INFO,
            Self::Warning => Level::WARN,
            Self::Error => Level::ERROR,
            Self::Critical => Level::ERROR,
        }
    }

    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// ErrorCode
// =============================================================================

/// Structured error code for categorization.
///
/// Format: `UA-XXYY` where XX is category and YY is specific error.
///
/// Categories:
/// - 1: Connection
/// - 2: Reconnect
/// - 3: Operation
/// - 4: Schema
/// - 5: Subscription
/// - 6: Conversion
/// - 7: Registry
/// - 8: Configuration
/// - 9: Cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode {
    /// Category (1-9).
    pub category: u8,
    /// Specific error within category.
    pub code: u8,
}

impl ErrorCode {
    /// Creates a new error code.
    pub const fn new(category: u8, code: u8) -> Self {
        Self { category, code }
    }

    /// Returns the full error code as a u16.
    pub fn as_u16(&self) -> u16 {
        ((self.category as u16) << 8) | (self.code as u16)
    }

    /// Creates from a u16.
    pub fn from_u16(value: u16) -> Self {
        Self {
            category: (value >> 8) as u8,
            code: (value & 0xFF) as u8,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UA-{:02X}{:02X}", self.category, self.code)
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// A Result type with UaClientError.
pub type UaClientResult<T> = Result<T, UaClientError>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_retryable() {
        assert!(ConnectionError::transport("opc.tcp://localhost:4840", "refused").is_retryable());
        assert!(ConnectionError::NotConnected.is_retryable());
        assert!(!ConnectionError::AlreadyConnected {
            endpoint: "opc.tcp://localhost:4840".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_operation_error_carries_status() {
        let error = OperationError::read_failed("ns=2;s=Motor.Speed", StatusCode::BAD_NODE_ID_UNKNOWN);
        assert_eq!(error.status(), Some(StatusCode::BAD_NODE_ID_UNKNOWN));
        assert!(!error.is_retryable());
        assert!(error.to_string().contains("ns=2;s=Motor.Speed"));
        assert!(error.to_string().contains("BadNodeIdUnknown"));

        let timeout = OperationError::write_failed("ns=2;s=X", StatusCode::BAD_TIMEOUT);
        assert!(timeout.is_retryable());
    }

    #[test]
    fn test_error_code() {
        let code = ErrorCode::new(1, 5);
        assert_eq!(code.to_string(), "UA-0105");
        assert_eq!(code.as_u16(), 0x0105);

        let from_u16 = ErrorCode::from_u16(0x0305);
        assert_eq!(from_u16.category, 3);
        assert_eq!(from_u16.code, 5);
    }

    #[test]
    fn test_error_category_and_codes() {
        assert_eq!(UaClientError::not_connected().category(), "connection");
        assert_eq!(
            UaClientError::reconnect_failed("opc.tcp://a:4840", "boom").category(),
            "reconnect"
        );
        assert_eq!(
            UaClientError::schema_resolution("Motor", "speed", "missing").error_code(),
            ErrorCode::new(4, 1)
        );
        assert_eq!(
            UaClientError::duplicate_connection("worker@opc.tcp://a:4840").error_code(),
            ErrorCode::new(7, 1)
        );
    }

    #[test]
    fn test_severity() {
        assert_eq!(ConnectionError::NotConnected.severity(), ErrorSeverity::Warning);
        assert_eq!(
            UaClientError::from(ConfigurationError::missing_field("endpoint")).severity(),
            ErrorSeverity::Critical
        );
        assert_eq!(UaClientError::cancelled("connect").severity(), ErrorSeverity::Info);
    }

    #[test]
    fn test_recovery_hints() {
        let error = UaClientError::transport("opc.tcp://localhost:4840", "refused");
        assert!(error.recovery_hints().iter().any(|h| h.contains("running")));

        let error = ConfigurationError::invalid_node_id("bad;format", "missing namespace");
        assert!(error.recovery_hints().iter().any(|h| h.contains("ns=")));
    }

    #[test]
    fn test_user_messages() {
        let error = UaClientError::transport("opc.tcp://192.168.1.100:4840", "refused");
        assert!(error.user_message().contains("192.168.1.100"));
    }
}
