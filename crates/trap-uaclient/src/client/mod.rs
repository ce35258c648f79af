// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Client-side runtime for one remote server.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Connection                              │
//! │        (state machine, reconnect, read/write/call API)          │
//! └─────────────────────────────────────────────────────────────────┘
//!            │                    │                    │
//!            ▼                    ▼                    ▼
//! ┌──────────────────┐ ┌──────────────────┐ ┌──────────────────┐
//! │ SubscriptionPool │ │   ValueMapper    │ │  SessionLink     │
//! │ (containers)     │ │ (schema cache)   │ │ (event forward)  │
//! └──────────────────┘ └──────────────────┘ └──────────────────┘
//!            │                    │                    │
//!            ▼                    ▼                    ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │               RemoteSession / SessionConnector                  │
//! │                  (abstract session layer)                       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod connection;
mod conversion;
mod point;
mod subscription;
mod transport;

pub use connection::{Connection, ConnectionState, ConnectionStats};
pub use conversion::{
    coerce, decode_variant, CompositeFields, CompositeShape, FieldDecl, Mappable, MappedValue, SchemaField,
    SchemaNode, Shape, ValueMapper,
};
pub use point::{Callback, CallbackKind, Delivery, DropReason, MonitoredPoint, Notification, PointStats};
pub use subscription::{
    ContainerKey, ContainerSet, ContainerSnapshot, PoolStats, ReconcileReport, Removal, SubscriptionPool,
};
pub use transport::{
    CallOutcome, ContainerId, FieldDescription, LivenessStatus, PointId, ReconnectCompleter, ReconnectHandle,
    RemoteSession, SessionConnector, SessionEvent, SessionId, SessionObserver, TypeDescription,
};
