// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Monitored points: a remote address bound to a typed callback.
//!
//! Three callback shapes are supported:
//!
//! - [`Callback::sync`]: invoked inline on the connection's dispatch task
//! - [`Callback::asynchronous`]: driven by a per-point worker task
//! - [`Callback::channel`]: forwarded into an `mpsc` sender without waiting
//!
//! Delivery order per point is the arrival order for all three shapes.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::types::{DataValue, NodeId, StatusCode};

use super::conversion::{decode_variant, Mappable};

// =============================================================================
// Notification
// =============================================================================

/// A decoded value-change notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification<T> {
    /// Address of the monitored point.
    pub address: NodeId,
    /// Decoded value.
    pub value: T,
    /// Status reported with the value.
    pub status: StatusCode,
    /// Source timestamp, if reported.
    pub source_timestamp: Option<DateTime<Utc>>,
    /// Server timestamp, if reported.
    pub server_timestamp: Option<DateTime<Utc>>,
}

// =============================================================================
// Callback
// =============================================================================

type SyncFn<T> = Arc<dyn Fn(Notification<T>) + Send + Sync>;
type AsyncFn<T> = Arc<dyn Fn(Notification<T>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Typed handler for value-change notifications.
pub enum Callback<T> {
    /// Synchronous handler.
    Sync(SyncFn<T>),
    /// Asynchronous handler.
    Async(AsyncFn<T>),
    /// Channel sink.
    Channel(mpsc::Sender<Notification<T>>),
}

impl<T: Send + 'static> Callback<T> {
    /// Creates a synchronous callback.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(Notification<T>) + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(f))
    }

    /// Creates an asynchronous callback.
    pub fn asynchronous<F, Fut>(f: F) -> Self
    where
        F: Fn(Notification<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::Async(Arc::new(move |notification| f(notification).boxed()))
    }

    /// Creates a channel callback.
    ///
    /// Notifications that do not fit into the channel are dropped.
    pub fn channel(sender: mpsc::Sender<Notification<T>>) -> Self {
        Self::Channel(sender)
    }

    /// Returns the callback shape.
    pub fn kind(&self) -> CallbackKind {
        match self {
            Self::Sync(_) => CallbackKind::Sync,
            Self::Async(_) => CallbackKind::Async,
            Self::Channel(_) => CallbackKind::Channel,
        }
    }
}

impl<T> Clone for Callback<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Sync(f) => Self::Sync(f.clone()),
            Self::Async(f) => Self::Async(f.clone()),
            Self::Channel(tx) => Self::Channel(tx.clone()),
        }
    }
}

impl<T> fmt::Debug for Callback<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Sync(_) => "Sync",
            Self::Async(_) => "Async",
            Self::Channel(_) => "Channel",
        };
        f.debug_tuple("Callback").field(&kind).finish()
    }
}

/// Callback shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackKind {
    /// Synchronous handler.
    Sync,
    /// Asynchronous handler.
    Async,
    /// Channel sink.
    Channel,
}

// =============================================================================
// Delivery
// =============================================================================

/// Outcome of routing one notification to a point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The callback received the value.
    Delivered,
    /// The value was dropped without invoking the callback.
    Dropped(DropReason),
}

impl Delivery {
    /// Returns `true` if the callback received the value.
    #[inline]
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Why a notification was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// The value carried a bad status.
    BadStatus(StatusCode),
    /// The value was empty.
    Empty,
    /// The value could not be decoded into the declared type.
    Conversion(String),
    /// The channel receiver is full.
    ReceiverFull,
    /// The point was unsubscribed or its receiver is gone.
    Closed,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadStatus(status) => write!(f, "bad status {}", status),
            Self::Empty => write!(f, "empty value"),
            Self::Conversion(message) => write!(f, "conversion failed: {}", message),
            Self::ReceiverFull => write!(f, "receiver full"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

// =============================================================================
// PointHandler
// =============================================================================

/// Type-erased delivery into a typed callback.
trait PointHandler: Send + Sync {
    fn deliver(&self, address: &NodeId, value: DataValue) -> Delivery;
    fn close(&self);
}

enum Sink<T> {
    Sync(SyncFn<T>),
    Worker(Mutex<Option<mpsc::UnboundedSender<Notification<T>>>>),
    Channel(Mutex<Option<mpsc::Sender<Notification<T>>>>),
}

struct TypedHandler<T> {
    sink: Sink<T>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Mappable> TypedHandler<T> {
    /// Must be called from within a Tokio runtime for async callbacks.
    fn new(callback: Callback<T>) -> Self {
        let sink = match callback {
            Callback::Sync(f) => Sink::Sync(f),
            Callback::Async(f) => {
                let (tx, mut rx) = mpsc::unbounded_channel::<Notification<T>>();
                tokio::spawn(async move {
                    while let Some(notification) = rx.recv().await {
                        f(notification).await;
                    }
                });
                Sink::Worker(Mutex::new(Some(tx)))
            }
            Callback::Channel(tx) => Sink::Channel(Mutex::new(Some(tx))),
        };
        Self {
            sink,
            _marker: PhantomData,
        }
    }
}

impl<T: Mappable> PointHandler for TypedHandler<T> {
    fn deliver(&self, address: &NodeId, value: DataValue) -> Delivery {
        if value.status.is_bad() {
            return Delivery::Dropped(DropReason::BadStatus(value.status));
        }
        if value.value.is_null() {
            return Delivery::Dropped(DropReason::Empty);
        }

        let decoded = match decode_variant::<T>(value.value) {
            Ok(decoded) => decoded,
            Err(e) => return Delivery::Dropped(DropReason::Conversion(e.to_string())),
        };
        let notification = Notification {
            address: address.clone(),
            value: decoded,
            status: value.status,
            source_timestamp: value.source_timestamp,
            server_timestamp: value.server_timestamp,
        };

        match &self.sink {
            Sink::Sync(f) => {
                f(notification);
                Delivery::Delivered
            }
            Sink::Worker(tx) => match tx.lock().as_ref() {
                Some(tx) if tx.send(notification).is_ok() => Delivery::Delivered,
                _ => Delivery::Dropped(DropReason::Closed),
            },
            Sink::Channel(tx) => match tx.lock().as_ref() {
                Some(tx) => match tx.try_send(notification) {
                    Ok(()) => Delivery::Delivered,
                    Err(mpsc::error::TrySendError::Full(_)) => Delivery::Dropped(DropReason::ReceiverFull),
                    Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Dropped(DropReason::Closed),
                },
                None => Delivery::Dropped(DropReason::Closed),
            },
        }
    }

    fn close(&self) {
        match &self.sink {
            Sink::Sync(_) => {}
            Sink::Worker(tx) => {
                tx.lock().take();
            }
            Sink::Channel(tx) => {
                tx.lock().take();
            }
        }
    }
}

// =============================================================================
// MonitoredPoint
// =============================================================================

/// Statistics for one monitored point.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PointStats {
    /// Notifications handed to the callback.
    pub delivered: u64,
    /// Notifications dropped.
    pub dropped: u64,
}

/// One subscribed remote address with its callback.
pub struct MonitoredPoint {
    address: NodeId,
    value_type: &'static str,
    kind: CallbackKind,
    handler: Box<dyn PointHandler>,
    created_at: DateTime<Utc>,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl MonitoredPoint {
    /// Binds a typed callback to an address.
    ///
    /// Async callbacks spawn their worker here, so this must run inside a
    /// Tokio runtime.
    pub fn new<T: Mappable>(address: NodeId, callback: Callback<T>) -> Self {
        let kind = callback.kind();
        Self {
            address,
            value_type: std::any::type_name::<T>(),
            kind,
            handler: Box::new(TypedHandler::new(callback)),
            created_at: Utc::now(),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Returns the remote address.
    pub fn address(&self) -> &NodeId {
        &self.address
    }

    /// Returns the declared value type name.
    pub fn value_type(&self) -> &'static str {
        self.value_type
    }

    /// Returns the callback shape.
    pub fn callback_kind(&self) -> CallbackKind {
        self.kind
    }

    /// Returns when the point was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Decodes and delivers a value.
    pub fn deliver(&self, value: DataValue) -> Delivery {
        let outcome = self.handler.deliver(&self.address, value);
        match &outcome {
            Delivery::Delivered => self.delivered.fetch_add(1, Ordering::Relaxed),
            Delivery::Dropped(_) => self.dropped.fetch_add(1, Ordering::Relaxed),
        };
        outcome
    }

    /// Stops delivery; later values are dropped as closed.
    ///
    /// An async worker drains what it already queued and then exits.
    pub fn close(&self) {
        self.handler.close();
    }

    /// Returns point statistics.
    pub fn stats(&self) -> PointStats {
        PointStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for MonitoredPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitoredPoint")
            .field("address", &self.address)
            .field("value_type", &self.value_type)
            .field("kind", &self.kind)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Variant;
    use std::time::Duration;

    fn address() -> NodeId {
        NodeId::string(2, "Line1.Speed")
    }

    #[tokio::test]
    async fn test_sync_callback_receives_decoded_value() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let point = MonitoredPoint::new(
            address(),
            Callback::sync(move |n: Notification<f64>| sink.lock().push(n.value)),
        );

        assert!(point.deliver(DataValue::good(Variant::Float(1.5))).is_delivered());
        assert!(point.deliver(DataValue::good(Variant::Int32(2))).is_delivered());
        assert_eq!(*seen.lock(), vec![1.5, 2.0]);
        assert_eq!(point.callback_kind(), CallbackKind::Sync);
    }

    #[tokio::test]
    async fn test_bad_and_empty_values_are_dropped() {
        let point = MonitoredPoint::new(address(), Callback::sync(|_: Notification<i32>| {
            panic!("callback must not run");
        }));

        assert_eq!(
            point.deliver(DataValue::bad(StatusCode::BAD_NODE_ID_UNKNOWN)),
            Delivery::Dropped(DropReason::BadStatus(StatusCode::BAD_NODE_ID_UNKNOWN))
        );
        assert_eq!(
            point.deliver(DataValue::good(Variant::Null)),
            Delivery::Dropped(DropReason::Empty)
        );
        assert!(matches!(
            point.deliver(DataValue::good(Variant::String("n/a".into()))),
            Delivery::Dropped(DropReason::Conversion(_))
        ));
        assert_eq!(point.stats().dropped, 3);
    }

    #[tokio::test]
    async fn test_async_callback_preserves_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let point = MonitoredPoint::new(
            address(),
            Callback::asynchronous(move |n: Notification<u32>| {
                let tx = tx.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis((5 - n.value as u64) * 2)).await;
                    let _ = tx.send(n.value);
                }
            }),
        );

        for i in 0..5u32 {
            assert!(point.deliver(DataValue::good(Variant::UInt32(i))).is_delivered());
        }

        let mut received = Vec::new();
        for _ in 0..5 {
            received.push(rx.recv().await.unwrap());
        }
        assert_eq!(received, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_channel_callback_full_and_closed() {
        let (tx, mut rx) = mpsc::channel(1);
        let point = MonitoredPoint::new(address(), Callback::<bool>::channel(tx));

        assert!(point.deliver(DataValue::good(Variant::Boolean(true))).is_delivered());
        assert_eq!(
            point.deliver(DataValue::good(Variant::Boolean(false))),
            Delivery::Dropped(DropReason::ReceiverFull)
        );
        assert!(rx.recv().await.unwrap().value);

        point.close();
        assert_eq!(
            point.deliver(DataValue::good(Variant::Boolean(true))),
            Delivery::Dropped(DropReason::Closed)
        );
    }
}
