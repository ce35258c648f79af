// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Fixtures
//!
//! Pre-built addresses, composite types and server layouts.

use trap_uaclient::client::{FieldDescription, TypeDescription};
use trap_uaclient::{
    CompositeFields, CompositeShape, ConversionError, FieldDecl, Mappable, MappedValue, NodeId, RemoteIdentity,
    ScalarType, Shape, Variant,
};

use super::mocks::MockServer;

// =============================================================================
// Node Fixtures
// =============================================================================

/// Namespace used by every fixture node.
pub const NS: u16 = 2;

/// Common node ids.
pub struct NodeFixtures;

impl NodeFixtures {
    /// A string node in the fixture namespace.
    pub fn tag(name: &str) -> NodeId {
        NodeId::string(NS, name)
    }

    /// A batch of `count` tags named `{prefix}{i}`.
    pub fn tags(prefix: &str, count: usize) -> Vec<NodeId> {
        (0..count).map(|i| Self::tag(&format!("{}{}", prefix, i))).collect()
    }

    /// Default identity for a mock endpoint.
    pub fn identity(endpoint: &str) -> RemoteIdentity {
        RemoteIdentity::new(endpoint, "line1")
    }
}

// =============================================================================
// MotorStatus
// =============================================================================

/// Flat composite: two leaves.
#[derive(Debug, Clone, PartialEq)]
pub struct MotorStatus {
    /// Running flag.
    pub running: bool,
    /// Speed in rpm.
    pub speed: f64,
}

static MOTOR_STATUS: CompositeShape = CompositeShape {
    type_tag: "MotorStatus",
    fields: &[
        FieldDecl { name: "Running", shape: <bool as Mappable>::shape },
        FieldDecl { name: "Speed", shape: <f64 as Mappable>::shape },
    ],
};

impl Mappable for MotorStatus {
    fn shape() -> Shape {
        Shape::Composite(&MOTOR_STATUS)
    }

    fn from_mapped(value: MappedValue) -> Result<Self, ConversionError> {
        let mut fields = CompositeFields::new(&MOTOR_STATUS, value)?;
        Ok(Self {
            running: fields.take("Running")?,
            speed: fields.take("Speed")?,
        })
    }

    fn into_mapped(self) -> MappedValue {
        MappedValue::composite([
            ("Running", self.running.into_mapped()),
            ("Speed", self.speed.into_mapped()),
        ])
    }
}

impl MotorStatus {
    /// Server-side description; speed is declared as a 32-bit float.
    pub fn description() -> TypeDescription {
        TypeDescription::Structure(Self::fields())
    }

    fn fields() -> Vec<FieldDescription> {
        vec![
            FieldDescription::scalar("Running", ScalarType::Boolean),
            FieldDescription::scalar("Speed", ScalarType::Float),
        ]
    }

    /// Install a motor at `node` with the given state.
    pub fn install(server: &MockServer, node: &NodeId, running: bool, speed: f32) {
        server.define_type(node.clone(), Self::description());
        Self::install_leaves(server, node, running, speed);
    }

    fn install_leaves(server: &MockServer, node: &NodeId, running: bool, speed: f32) {
        server.set_value(child(node, "Running"), Variant::Boolean(running));
        server.set_value(child(node, "Speed"), Variant::Float(speed));
    }
}

// =============================================================================
// Station
// =============================================================================

/// Nested composite: a name plus a motor.
#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    /// Station name.
    pub name: String,
    /// Station drive.
    pub motor: MotorStatus,
}

static STATION: CompositeShape = CompositeShape {
    type_tag: "Station",
    fields: &[
        FieldDecl { name: "Name", shape: <String as Mappable>::shape },
        FieldDecl { name: "Motor", shape: <MotorStatus as Mappable>::shape },
    ],
};

impl Mappable for Station {
    fn shape() -> Shape {
        Shape::Composite(&STATION)
    }

    fn from_mapped(value: MappedValue) -> Result<Self, ConversionError> {
        let mut fields = CompositeFields::new(&STATION, value)?;
        Ok(Self {
            name: fields.take("Name")?,
            motor: fields.take("Motor")?,
        })
    }

    fn into_mapped(self) -> MappedValue {
        MappedValue::composite([
            ("Name", self.name.into_mapped()),
            ("Motor", self.motor.into_mapped()),
        ])
    }
}

impl Station {
    /// Server-side description.
    pub fn description() -> TypeDescription {
        TypeDescription::Structure(vec![
            FieldDescription::scalar("Name", ScalarType::String),
            FieldDescription::structure("Motor", MotorStatus::fields()),
        ])
    }

    /// Install a station at `node`.
    pub fn install(server: &MockServer, node: &NodeId, name: &str, running: bool, speed: f32) {
        server.define_type(node.clone(), Self::description());
        server.set_value(child(node, "Name"), Variant::String(name.to_string()));
        MotorStatus::install_leaves(server, &child(node, "Motor"), running, speed);
    }
}

/// Child address of a string node.
pub fn child(node: &NodeId, field: &str) -> NodeId {
    node.child(field).expect("fixture nodes use string identifiers")
}
