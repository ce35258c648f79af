// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Event plumbing shared by sessions and connections.
//!
//! - **ObserverList**: typed attach/detach registry a remote session uses to
//!   fan its events out to observers
//! - **EventBus**: broadcast channel a connection publishes its state-changed
//!   and error streams on
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐  on_event   ┌──────────────────┐  broadcast  ┌──────────┐
//! │ RemoteSession  │ ──────────▶ │    Connection    │ ──────────▶ │ Callers  │
//! │ (ObserverList) │             │ (EventBus x 2)   │             │          │
//! └────────────────┘             └──────────────────┘             └──────────┘
//! ```
//!
//! Observers are detached explicitly by id; nothing relies on dropping a
//! closure to unsubscribe.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::client::ConnectionState;
use crate::error::UaClientError;
use crate::types::RemoteIdentity;

// =============================================================================
// ObserverList
// =============================================================================

/// Handle returned when an observer is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObserverId(u64);

impl ObserverId {
    /// Returns the raw id.
    #[inline]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer#{}", self.0)
    }
}

/// An ordered list of attached observers.
///
/// `notify` works on a snapshot, so an observer may detach itself (or others)
/// while being notified.
pub struct ObserverList<O: ?Sized> {
    next_id: AtomicU64,
    observers: Mutex<Vec<(ObserverId, Arc<O>)>>,
}

impl<O: ?Sized> ObserverList<O> {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Attaches an observer and returns its id.
    pub fn attach(&self, observer: Arc<O>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.lock().push((id, observer));
        id
    }

    /// Detaches an observer. Returns `false` if it was not attached.
    pub fn detach(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    /// Detaches every observer.
    pub fn clear(&self) {
        self.observers.lock().clear();
    }

    /// Returns the number of attached observers.
    pub fn len(&self) -> usize {
        self.observers.lock().len()
    }

    /// Returns `true` if nothing is attached.
    pub fn is_empty(&self) -> bool {
        self.observers.lock().is_empty()
    }

    /// Returns a snapshot of the attached observers in attach order.
    pub fn snapshot(&self) -> Vec<Arc<O>> {
        self.observers
            .lock()
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect()
    }

    /// Invokes `f` for every attached observer.
    pub fn notify<F>(&self, mut f: F)
    where
        F: FnMut(&O),
    {
        for observer in self.snapshot() {
            f(&observer);
        }
    }
}

impl<O: ?Sized> Default for ObserverList<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: ?Sized> fmt::Debug for ObserverList<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverList")
            .field("observers", &self.len())
            .finish()
    }
}

// =============================================================================
// EventBus
// =============================================================================

/// Statistics for an event bus.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventBusStats {
    /// Events published.
    pub events_published: u64,
    /// Events published while nobody was listening.
    pub events_unobserved: u64,
    /// Events lost by lagging receivers.
    pub events_lagged: u64,
    /// Current number of receivers.
    pub receiver_count: usize,
}

#[derive(Debug, Default)]
struct AtomicEventBusStats {
    events_published: AtomicU64,
    events_unobserved: AtomicU64,
    events_lagged: AtomicU64,
}

/// Broadcast event stream.
///
/// Publishing never blocks; a slow receiver lags and skips events instead of
/// holding up the publisher.
pub struct EventBus<E: Clone> {
    sender: broadcast::Sender<E>,
    capacity: usize,
    stats: Arc<AtomicEventBusStats>,
}

impl<E: Clone> EventBus<E> {
    /// Creates a bus with the given buffer capacity, raised to at least one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            capacity,
            stats: Arc::new(AtomicEventBusStats::default()),
        }
    }

    /// Publishes an event, returning the number of receivers reached.
    pub fn publish(&self, event: E) -> usize {
        self.stats.events_published.fetch_add(1, Ordering::Relaxed);
        match self.sender.send(event) {
            Ok(count) => count,
            Err(_) => {
                self.stats.events_unobserved.fetch_add(1, Ordering::Relaxed);
                0
            }
        }
    }

    /// Creates a new receiver that sees events published from now on.
    pub fn subscribe(&self) -> EventReceiver<E> {
        EventReceiver {
            receiver: self.sender.subscribe(),
            stats: self.stats.clone(),
        }
    }

    /// Returns the number of receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Returns the buffer capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns bus statistics.
    pub fn stats(&self) -> EventBusStats {
        EventBusStats {
            events_published: self.stats.events_published.load(Ordering::Relaxed),
            events_unobserved: self.stats.events_unobserved.load(Ordering::Relaxed),
            events_lagged: self.stats.events_lagged.load(Ordering::Relaxed),
            receiver_count: self.sender.receiver_count(),
        }
    }
}

impl<E: Clone> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.capacity)
            .field("receivers", &self.sender.receiver_count())
            .field(
                "events_published",
                &self.stats.events_published.load(Ordering::Relaxed),
            )
            .finish()
    }
}

/// Receiving half of an [`EventBus`].
pub struct EventReceiver<E: Clone> {
    receiver: broadcast::Receiver<E>,
    stats: Arc<AtomicEventBusStats>,
}

impl<E: Clone> EventReceiver<E> {
    /// Receives the next event.
    ///
    /// Lagged events are skipped and counted. Returns `None` once the bus is
    /// gone.
    pub async fn recv(&mut self) -> Option<E> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    self.stats.events_lagged.fetch_add(count, Ordering::Relaxed);
                    tracing::warn!(count, "Event receiver lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Receives an event without waiting.
    pub fn try_recv(&mut self) -> Option<E> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(count)) => {
                    self.stats.events_lagged.fetch_add(count, Ordering::Relaxed);
                }
                Err(_) => return None,
            }
        }
    }
}

impl<E: Clone> fmt::Debug for EventReceiver<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventReceiver").finish_non_exhaustive()
    }
}

// =============================================================================
// Connection Events
// =============================================================================

/// Emitted on every connection state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    /// Connection the transition belongs to.
    pub identity: RemoteIdentity,
    /// Previous state.
    pub old: ConnectionState,
    /// New state.
    pub new: ConnectionState,
    /// When the transition happened.
    pub at: DateTime<Utc>,
}

impl fmt::Display for StateChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} -> {}", self.identity, self.old, self.new)
    }
}

/// Background machinery an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSource {
    /// Keep-alive and session-closing handling.
    Liveness,
    /// The reconnect procedure.
    Reconnect,
    /// Pending-change reconciliation of subscription containers.
    Reconciliation,
}

impl fmt::Display for ErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Liveness => write!(f, "liveness"),
            Self::Reconnect => write!(f, "reconnect"),
            Self::Reconciliation => write!(f, "reconciliation"),
        }
    }
}

/// Emitted when background work fails without a caller to return to.
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    /// Connection the error belongs to.
    pub identity: RemoteIdentity,
    /// Where the error came from.
    pub source: ErrorSource,
    /// The error.
    pub error: Arc<UaClientError>,
    /// When it happened.
    pub at: DateTime<Utc>,
}

impl fmt::Display for ErrorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}: {}",
            self.identity,
            self.source,
            self.error.error_code(),
            self.error
        )
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    trait Counter: Send + Sync {
        fn hit(&self);
    }

    struct Hits(AtomicUsize);

    impl Counter for Hits {
        fn hit(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_observer_attach_detach() {
        let list: ObserverList<dyn Counter> = ObserverList::new();
        let hits = Arc::new(Hits(AtomicUsize::new(0)));

        let first = list.attach(hits.clone());
        let second = list.attach(hits.clone());
        assert_ne!(first, second);
        assert_eq!(list.len(), 2);

        list.notify(|o| o.hit());
        assert_eq!(hits.0.load(Ordering::SeqCst), 2);

        assert!(list.detach(first));
        assert!(!list.detach(first));
        list.notify(|o| o.hit());
        assert_eq!(hits.0.load(Ordering::SeqCst), 3);

        list.clear();
        assert!(list.is_empty());
    }

    #[tokio::test]
    async fn test_event_bus_publish_and_receive() {
        let bus: EventBus<u32> = EventBus::new(8);
        assert_eq!(bus.publish(1), 0);

        let mut rx = bus.subscribe();
        assert_eq!(bus.publish(2), 1);
        assert_eq!(rx.recv().await, Some(2));

        let stats = bus.stats();
        assert_eq!(stats.events_published, 2);
        assert_eq!(stats.events_unobserved, 1);
        assert_eq!(stats.receiver_count, 1);
    }

    #[tokio::test]
    async fn test_event_bus_zero_capacity_is_clamped() {
        let bus: EventBus<u32> = EventBus::new(0);
        assert_eq!(bus.capacity(), 1);

        let mut rx = bus.subscribe();
        assert_eq!(bus.publish(7), 1);
        assert_eq!(rx.recv().await, Some(7));
    }

    #[tokio::test]
    async fn test_event_bus_lag_is_counted() {
        let bus: EventBus<u32> = EventBus::new(2);
        let mut rx = bus.subscribe();
        for i in 0..5 {
            bus.publish(i);
        }
        assert_eq!(rx.recv().await, Some(3));
        assert_eq!(rx.recv().await, Some(4));
        assert_eq!(bus.stats().events_lagged, 3);
    }
}
