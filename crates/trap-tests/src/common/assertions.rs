// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Custom Test Assertions
//!
//! Helpers for waiting on background work and checking container layouts.
//!
//! ## Design Principles
//!
//! - Provide clear, informative failure messages
//! - Never sleep a fixed amount when a condition can be polled

use std::time::Duration;

use tokio::time::{timeout, Instant};

use trap_uaclient::{Connection, ConnectionState, EventReceiver, NodeId, StateChange};

/// Default wait for background work.
pub const WAIT: Duration = Duration::from_secs(2);

/// Poll `condition` until it holds or `WAIT` elapses.
pub async fn wait_until<F>(what: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + WAIT;
    while !condition() {
        assert!(Instant::now() < deadline, "Timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Wait until the connection reaches `expected`.
pub async fn wait_for_state(connection: &Connection, expected: ConnectionState) {
    let deadline = Instant::now() + WAIT;
    while connection.state() != expected {
        assert!(
            Instant::now() < deadline,
            "Expected state {}, but connection is {}",
            expected,
            connection.state()
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Read transitions until one enters `expected`; returns it.
pub async fn expect_transition(events: &mut EventReceiver<StateChange>, expected: ConnectionState) -> StateChange {
    let deadline = Instant::now() + WAIT;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match timeout(remaining, events.recv()).await {
            Ok(Some(change)) if change.new == expected => return change,
            Ok(Some(_)) => continue,
            Ok(None) => panic!("State event stream closed before reaching {}", expected),
            Err(_) => panic!("Timed out waiting for transition to {}", expected),
        }
    }
}

/// Collect every transition already published.
pub fn drain_transitions(events: &mut EventReceiver<StateChange>) -> Vec<(ConnectionState, ConnectionState)> {
    let mut out = Vec::new();
    while let Some(change) = events.try_recv() {
        out.push((change.old, change.new));
    }
    out
}

/// Assert the server-side container layout, in creation order.
pub fn assert_containers(actual: &[Vec<NodeId>], expected: &[&[&NodeId]]) {
    let expected: Vec<Vec<NodeId>> = expected
        .iter()
        .map(|c| c.iter().map(|n| (*n).clone()).collect())
        .collect();
    assert_eq!(
        actual,
        expected.as_slice(),
        "Container layout mismatch\n  actual:   {:?}\n  expected: {:?}",
        actual,
        expected
    );
}
