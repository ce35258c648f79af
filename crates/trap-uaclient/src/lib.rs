// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Resilient OPC UA client runtime for the TRAP gateway.
//!
//! This crate keeps long-lived sessions to industrial servers alive and
//! hides the session layer behind a small typed API. The wire protocol is
//! supplied by an implementation of [`SessionConnector`]; everything above
//! it lives here.
//!
//! # Features
//!
//! - Connection state machine with background reconnect on keep-alive loss
//! - Subscription containers packed first-fit up to a fixed capacity
//! - Subscriptions queued while disconnected and replayed on connect
//! - Typed read/write of scalars and composite types with schema caching
//! - Sync, async and channel notification callbacks
//! - Registry with at most one connection per remote identity
//!
//! # Error Handling
//!
//! ```text
//! UaClientError
//! ├── Connection    - Transport and session lifecycle issues
//! ├── Reconnect     - Background reconnect failures
//! ├── Operation     - Read/write/call failures
//! ├── Schema        - Composite type resolution failures
//! ├── Subscription  - Container and monitored point errors
//! ├── Conversion    - Value coercion errors
//! ├── Registry      - Connection registry violations
//! ├── Configuration - Invalid settings
//! └── Cancelled     - Caller-requested cancellation
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use trap_uaclient::{Callback, ClientConfig, ClientRegistry, NodeId, RemoteIdentity};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::from_file("uaclient.yaml")?;
//!     let registry = ClientRegistry::new(config, connector);
//!     let cancel = CancellationToken::new();
//!
//!     let connection = registry
//!         .create_or_get_connection(RemoteIdentity::new("opc.tcp://plc-1:4840", "line1"), &cancel)
//!         .await?;
//!
//!     connection
//!         .subscribe(
//!             NodeId::string(2, "Line1.Speed"),
//!             Callback::sync(|n: trap_uaclient::Notification<f64>| println!("{}", n.value)),
//!             &cancel,
//!         )
//!         .await?;
//!
//!     let speed: f64 = connection.read(&NodeId::string(2, "Line1.Speed"), &cancel).await?;
//!     println!("Speed: {}", speed);
//!
//!     registry.dispose().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod bus;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod registry;
pub mod types;

// Re-export commonly used types
pub use error::{
    ConfigurationError, ConnectionError, ConversionError, ErrorCode, ErrorSeverity, OperationError,
    ReconnectError, RegistryError, SchemaError, SubscriptionError, UaClientError, UaClientResult,
};

pub use types::{DataValue, NodeId, NodeIdentifier, RemoteIdentity, ScalarType, StatusCode, Variant};

pub use config::{ClientConfig, ClientConfigBuilder, ConfigFormat, ContainerSettings, PointSettings, SessionSettings};

pub use bus::{ErrorEvent, ErrorSource, EventBus, EventReceiver, ObserverId, ObserverList, StateChange};

// Re-export client types
pub use client::{
    Callback, CallbackKind, CompositeFields, CompositeShape, Connection, ConnectionState, ConnectionStats,
    ContainerKey, ContainerSnapshot, Delivery, DropReason, FieldDecl, Mappable, MappedValue, MonitoredPoint,
    Notification, ReconcileReport, RemoteSession, SessionConnector, SessionEvent, SessionObserver, Shape,
    SubscriptionPool, ValueMapper,
};

pub use registry::ClientRegistry;

pub use logging::{init_logging, try_init_logging, LogFormat};
