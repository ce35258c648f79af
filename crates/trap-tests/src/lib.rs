// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # TRAP UA Client Integration Tests
//!
//! Integration tests and test doubles for `trap-uaclient`. Everything runs
//! against an in-memory server; no network is needed.
//!
//! ## Module Structure
//!
//! - [`common`]: Shared test utilities, fixtures, and helpers
//!   - `fixtures`: Composite types and node ids
//!   - `assertions`: Waiting and layout assertion helpers
//!   - `mocks`: `MockServer`, `MockSession`, `MockConnector`
//!
//! ## Running Tests
//!
//! ```bash
//! # Run all integration tests
//! cargo test -p trap-tests
//!
//! # Run specific test suite
//! cargo test -p trap-tests --test integration_connection
//! cargo test -p trap-tests --test integration_subscription
//! cargo test -p trap-tests --test integration_mapper
//! cargo test -p trap-tests --test integration_registry
//!
//! # Run with verbose output
//! cargo test -p trap-tests -- --nocapture
//! ```
//!
//! ## Writing New Tests
//!
//! ```rust,ignore
//! use trap_tests::common::{mock_stack, NodeFixtures};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let (server, connector, config) = mock_stack(2);
//!     let connection = Connection::new(NodeFixtures::identity(server.endpoint()), config, connector.clone());
//!     // ... test logic
//! }
//! ```

pub mod common;
