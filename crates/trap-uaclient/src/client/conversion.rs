// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Typed value mapping between local Rust values and remote nodes.
//!
//! A local type declares its [`Shape`]: either a scalar, or a composite whose
//! fields are child nodes addressed as `parent.Field`. The first time a
//! composite type is used on a connection, the server's type description is
//! fetched once and resolved against the local shape into a [`SchemaNode`]
//! tree, cached by type tag for the lifetime of the connection.
//!
//! # Architecture
//!
//! ```text
//!   Mappable::shape()        RemoteSession::describe_type()
//!          │                            │
//!          └──────────┬─────────────────┘
//!                     ▼
//!               SchemaNode tree  (cached per type tag)
//!                     │
//!        ┌────────────┴────────────┐
//!        ▼                         ▼
//!   decode: batch read        encode: coerce leaves,
//!   leaves, assemble          batch write
//! ```
//!
//! # Examples
//!
//! ```
//! use trap_uaclient::client::{
//!     CompositeFields, CompositeShape, FieldDecl, Mappable, MappedValue, Shape,
//! };
//! use trap_uaclient::error::ConversionError;
//!
//! struct Setpoint {
//!     value: f64,
//!     enabled: bool,
//! }
//!
//! static SETPOINT: CompositeShape = CompositeShape {
//!     type_tag: "Setpoint",
//!     fields: &[
//!         FieldDecl { name: "Value", shape: <f64 as Mappable>::shape },
//!         FieldDecl { name: "Enabled", shape: <bool as Mappable>::shape },
//!     ],
//! };
//!
//! impl Mappable for Setpoint {
//!     fn shape() -> Shape {
//!         Shape::Composite(&SETPOINT)
//!     }
//!
//!     fn from_mapped(value: MappedValue) -> Result<Self, ConversionError> {
//!         let mut fields = CompositeFields::new(&SETPOINT, value)?;
//!         Ok(Self {
//!             value: fields.take("Value")?,
//!             enabled: fields.take("Enabled")?,
//!         })
//!     }
//!
//!     fn into_mapped(self) -> MappedValue {
//!         MappedValue::composite([
//!             ("Value", self.value.into_mapped()),
//!             ("Enabled", self.enabled.into_mapped()),
//!         ])
//!     }
//! }
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::{ConversionError, OperationError, SchemaError, UaClientError, UaClientResult};
use crate::types::{NodeId, ScalarType, Variant};

use super::transport::{RemoteSession, TypeDescription};

// =============================================================================
// Shape Declarations
// =============================================================================

/// Local shape of a mappable type.
#[derive(Debug, Clone, Copy)]
pub enum Shape {
    /// A single remote attribute.
    Scalar,
    /// A structure whose fields are child nodes.
    Composite(&'static CompositeShape),
}

impl Shape {
    /// Returns the composite type tag, if any.
    pub fn type_tag(&self) -> Option<&'static str> {
        match self {
            Self::Scalar => None,
            Self::Composite(shape) => Some(shape.type_tag),
        }
    }
}

/// Static description of a composite type.
#[derive(Debug)]
pub struct CompositeShape {
    /// Stable identifier used as the schema cache key.
    pub type_tag: &'static str,
    /// Writable fields in declaration order.
    pub fields: &'static [FieldDecl],
}

/// One field of a composite type.
#[derive(Debug, Clone, Copy)]
pub struct FieldDecl {
    /// Field name; also the child address suffix.
    pub name: &'static str,
    /// Shape of the field's declared type.
    pub shape: fn() -> Shape,
}

// =============================================================================
// MappedValue
// =============================================================================

/// Intermediate value tree produced by decoding and consumed by encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum MappedValue {
    /// A remote scalar.
    Scalar(Variant),
    /// Named field values of a composite.
    Composite(Vec<(String, MappedValue)>),
}

impl MappedValue {
    /// Builds a composite from `(field, value)` pairs.
    pub fn composite<I>(fields: I) -> Self
    where
        I: IntoIterator<Item = (&'static str, MappedValue)>,
    {
        Self::Composite(
            fields
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        )
    }

    /// Unwraps a scalar, failing for composites.
    pub fn into_scalar(self, expected: &str) -> Result<Variant, ConversionError> {
        match self {
            Self::Scalar(variant) => Ok(variant),
            Self::Composite(_) => Err(ConversionError::type_mismatch(expected, "Composite")),
        }
    }

    /// Converts the tree into a variant, composites becoming structures.
    pub fn into_variant(self) -> Variant {
        match self {
            Self::Scalar(variant) => variant,
            Self::Composite(fields) => Variant::Structure(
                fields
                    .into_iter()
                    .map(|(name, value)| (name, value.into_variant()))
                    .collect(),
            ),
        }
    }
}

/// Field accessor used by composite `from_mapped` implementations.
#[derive(Debug)]
pub struct CompositeFields {
    type_tag: &'static str,
    fields: Vec<(String, MappedValue)>,
}

impl CompositeFields {
    /// Opens a composite value for field extraction.
    pub fn new(shape: &'static CompositeShape, value: MappedValue) -> Result<Self, ConversionError> {
        match value {
            MappedValue::Composite(fields) => Ok(Self {
                type_tag: shape.type_tag,
                fields,
            }),
            MappedValue::Scalar(variant) => Err(ConversionError::type_mismatch(
                shape.type_tag,
                variant.type_name(),
            )),
        }
    }

    /// Removes and decodes a field.
    pub fn take<T: Mappable>(&mut self, name: &str) -> Result<T, ConversionError> {
        let index = self
            .fields
            .iter()
            .position(|(field, _)| field == name)
            .ok_or_else(|| ConversionError::missing_field(format!("{}.{}", self.type_tag, name)))?;
        let (_, value) = self.fields.swap_remove(index);
        T::from_mapped(value)
    }
}

// =============================================================================
// Mappable Trait
// =============================================================================

/// A local type that can be read from and written to remote nodes.
pub trait Mappable: Sized + Send + 'static {
    /// Declares the local shape.
    fn shape() -> Shape;

    /// Builds a value from a decoded tree.
    fn from_mapped(value: MappedValue) -> Result<Self, ConversionError>;

    /// Converts the value into a tree for encoding.
    fn into_mapped(self) -> MappedValue;
}

macro_rules! impl_integer {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl Mappable for $ty {
                fn shape() -> Shape {
                    Shape::Scalar
                }

                fn from_mapped(value: MappedValue) -> Result<Self, ConversionError> {
                    let variant = value.into_scalar(stringify!($ty))?;
                    integer_from(&variant, stringify!($ty))
                }

                fn into_mapped(self) -> MappedValue {
                    MappedValue::Scalar(Variant::$variant(self))
                }
            }
        )*
    };
}

impl_integer! {
    i8 => SByte,
    u8 => Byte,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
}

macro_rules! impl_scalar {
    ($ty:ty, $variant:ident, $convert:ident) => {
        impl Mappable for $ty {
            fn shape() -> Shape {
                Shape::Scalar
            }

            fn from_mapped(value: MappedValue) -> Result<Self, ConversionError> {
                let variant = value.into_scalar(stringify!($ty))?;
                $convert(&variant)
            }

            fn into_mapped(self) -> MappedValue {
                MappedValue::Scalar(Variant::$variant(self))
            }
        }
    };
}

impl_scalar!(bool, Boolean, bool_from);
impl_scalar!(f32, Float, f32_from);
impl_scalar!(f64, Double, f64_from);
impl_scalar!(String, String, string_from);
impl_scalar!(DateTime<Utc>, DateTime, datetime_from);
impl_scalar!(Uuid, Guid, uuid_from);
impl_scalar!(Vec<u8>, ByteString, bytes_from);

impl Mappable for Variant {
    fn shape() -> Shape {
        Shape::Scalar
    }

    fn from_mapped(value: MappedValue) -> Result<Self, ConversionError> {
        Ok(value.into_variant())
    }

    fn into_mapped(self) -> MappedValue {
        MappedValue::Scalar(self)
    }
}

impl<T: Mappable> Mappable for Option<T> {
    fn shape() -> Shape {
        T::shape()
    }

    fn from_mapped(value: MappedValue) -> Result<Self, ConversionError> {
        match value {
            MappedValue::Scalar(Variant::Null) => Ok(None),
            other => T::from_mapped(other).map(Some),
        }
    }

    fn into_mapped(self) -> MappedValue {
        match self {
            Some(value) => value.into_mapped(),
            None => MappedValue::Scalar(Variant::Null),
        }
    }
}

// =============================================================================
// Scalar Conversions
// =============================================================================

fn integer_from<T>(variant: &Variant, target: &str) -> Result<T, ConversionError>
where
    T: TryFrom<i64> + TryFrom<u64>,
{
    match variant {
        Variant::Null => Err(ConversionError::null_value(target)),
        Variant::UInt64(v) => T::try_from(*v).map_err(|_| ConversionError::out_of_range(v, target)),
        Variant::String(s) => {
            let parsed: i64 = s
                .trim()
                .parse()
                .map_err(|_| ConversionError::type_mismatch(target, "String"))?;
            T::try_from(parsed).map_err(|_| ConversionError::out_of_range(parsed, target))
        }
        other => match other.as_i64() {
            Some(v) => T::try_from(v).map_err(|_| ConversionError::out_of_range(v, target)),
            None => Err(ConversionError::type_mismatch(target, other.type_name())),
        },
    }
}

fn bool_from(variant: &Variant) -> Result<bool, ConversionError> {
    match variant {
        Variant::Boolean(v) => Ok(*v),
        Variant::Null => Err(ConversionError::null_value("bool")),
        Variant::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(ConversionError::type_mismatch("bool", "String")),
        },
        other => other
            .as_i64()
            .map(|v| v != 0)
            .ok_or_else(|| ConversionError::type_mismatch("bool", other.type_name())),
    }
}

fn f64_from(variant: &Variant) -> Result<f64, ConversionError> {
    match variant {
        Variant::Null => Err(ConversionError::null_value("f64")),
        Variant::String(s) => s
            .trim()
            .parse()
            .map_err(|_| ConversionError::type_mismatch("f64", "String")),
        other => other
            .as_f64()
            .ok_or_else(|| ConversionError::type_mismatch("f64", other.type_name())),
    }
}

fn f32_from(variant: &Variant) -> Result<f32, ConversionError> {
    if let Variant::Float(v) = variant {
        return Ok(*v);
    }
    let wide = f64_from(variant).map_err(|e| match e {
        ConversionError::TypeMismatch { actual, .. } => ConversionError::type_mismatch("f32", actual),
        ConversionError::NullValue { .. } => ConversionError::null_value("f32"),
        other => other,
    })?;
    if wide.is_finite() && wide.abs() > f32::MAX as f64 {
        return Err(ConversionError::out_of_range(wide, "f32"));
    }
    Ok(wide as f32)
}

fn string_from(variant: &Variant) -> Result<String, ConversionError> {
    match variant {
        Variant::String(s) => Ok(s.clone()),
        Variant::Null => Err(ConversionError::null_value("String")),
        Variant::Array(_) | Variant::Structure(_) => {
            Err(ConversionError::type_mismatch("String", variant.type_name()))
        }
        other => Ok(other.to_string()),
    }
}

fn datetime_from(variant: &Variant) -> Result<DateTime<Utc>, ConversionError> {
    match variant {
        Variant::DateTime(v) => Ok(*v),
        Variant::Null => Err(ConversionError::null_value("DateTime")),
        Variant::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| ConversionError::type_mismatch("DateTime", "String")),
        other => Err(ConversionError::type_mismatch("DateTime", other.type_name())),
    }
}

fn uuid_from(variant: &Variant) -> Result<Uuid, ConversionError> {
    match variant {
        Variant::Guid(v) => Ok(*v),
        Variant::Null => Err(ConversionError::null_value("Guid")),
        Variant::String(s) => {
            Uuid::parse_str(s.trim()).map_err(|_| ConversionError::type_mismatch("Guid", "String"))
        }
        other => Err(ConversionError::type_mismatch("Guid", other.type_name())),
    }
}

fn bytes_from(variant: &Variant) -> Result<Vec<u8>, ConversionError> {
    match variant {
        Variant::ByteString(v) => Ok(v.clone()),
        Variant::String(s) => Ok(s.as_bytes().to_vec()),
        Variant::Null => Err(ConversionError::null_value("ByteString")),
        other => Err(ConversionError::type_mismatch("ByteString", other.type_name())),
    }
}

/// Coerces a scalar to the remote type declared for a leaf.
///
/// Numeric narrowing is range checked.
pub fn coerce(value: &Variant, target: ScalarType) -> Result<Variant, ConversionError> {
    if value.scalar_type() == Some(target) {
        return Ok(value.clone());
    }
    let name = target.name();
    if value.is_null() {
        return Err(ConversionError::null_value(name));
    }
    Ok(match target {
        ScalarType::Boolean => Variant::Boolean(bool_from(value)?),
        ScalarType::SByte => Variant::SByte(integer_from(value, name)?),
        ScalarType::Byte => Variant::Byte(integer_from(value, name)?),
        ScalarType::Int16 => Variant::Int16(integer_from(value, name)?),
        ScalarType::UInt16 => Variant::UInt16(integer_from(value, name)?),
        ScalarType::Int32 => Variant::Int32(integer_from(value, name)?),
        ScalarType::UInt32 => Variant::UInt32(integer_from(value, name)?),
        ScalarType::Int64 => Variant::Int64(integer_from(value, name)?),
        ScalarType::UInt64 => Variant::UInt64(integer_from(value, name)?),
        ScalarType::Float => Variant::Float(f32_from(value)?),
        ScalarType::Double => Variant::Double(f64_from(value)?),
        ScalarType::String => Variant::String(string_from(value)?),
        ScalarType::DateTime => Variant::DateTime(datetime_from(value)?),
        ScalarType::Guid => Variant::Guid(uuid_from(value)?),
        ScalarType::ByteString => Variant::ByteString(bytes_from(value)?),
    })
}

/// Decodes a notification value.
///
/// Composite types are populated from a structure body by field name; no
/// remote reads are involved.
pub fn decode_variant<T: Mappable>(value: Variant) -> Result<T, ConversionError> {
    T::from_mapped(mapped_from_variant(T::shape(), value)?)
}

fn mapped_from_variant(shape: Shape, value: Variant) -> Result<MappedValue, ConversionError> {
    match (shape, value) {
        (Shape::Scalar, variant) => Ok(MappedValue::Scalar(variant)),
        (Shape::Composite(composite), Variant::Structure(mut members)) => {
            let mut fields = Vec::with_capacity(composite.fields.len());
            for decl in composite.fields {
                let index = members
                    .iter()
                    .position(|(name, _)| name == decl.name)
                    .ok_or_else(|| {
                        ConversionError::missing_field(format!("{}.{}", composite.type_tag, decl.name))
                    })?;
                let (_, member) = members.swap_remove(index);
                fields.push((decl.name.to_string(), mapped_from_variant((decl.shape)(), member)?));
            }
            Ok(MappedValue::Composite(fields))
        }
        (Shape::Composite(composite), other) => Err(ConversionError::type_mismatch(
            composite.type_tag,
            other.type_name(),
        )),
    }
}

// =============================================================================
// Schema Tree
// =============================================================================

/// Resolved schema of a composite type against the server's declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    /// A leaf attribute with its server-declared type.
    Leaf(ScalarType),
    /// A composite with resolved fields in local declaration order.
    Composite {
        /// Local type tag.
        type_tag: &'static str,
        /// Resolved fields.
        fields: Vec<SchemaField>,
    },
}

/// A resolved field.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaField {
    /// Field name.
    pub name: &'static str,
    /// Resolved field schema.
    pub node: SchemaNode,
}

impl SchemaNode {
    /// Resolves a local composite shape against a server type description.
    pub fn resolve(shape: &'static CompositeShape, remote: &TypeDescription) -> Result<Self, SchemaError> {
        if !matches!(remote, TypeDescription::Structure(_)) {
            return Err(SchemaError::shape_mismatch(
                shape.type_tag,
                "Structure",
                remote.kind(),
            ));
        }

        let mut fields = Vec::with_capacity(shape.fields.len());
        for decl in shape.fields {
            let remote_field = remote.field(decl.name).ok_or_else(|| {
                SchemaError::resolution_failed(shape.type_tag, decl.name, "field not declared by the server")
            })?;
            let node = match ((decl.shape)(), &remote_field.description) {
                (Shape::Scalar, TypeDescription::Scalar(scalar)) => SchemaNode::Leaf(*scalar),
                (Shape::Composite(nested), description @ TypeDescription::Structure(_)) => {
                    SchemaNode::resolve(nested, description)?
                }
                (Shape::Scalar, TypeDescription::Structure(_)) => {
                    return Err(SchemaError::resolution_failed(
                        shape.type_tag,
                        decl.name,
                        "server declares a structure for a scalar field",
                    ));
                }
                (Shape::Composite(nested), TypeDescription::Scalar(scalar)) => {
                    return Err(SchemaError::resolution_failed(
                        shape.type_tag,
                        decl.name,
                        format!("server declares {} for composite {}", scalar, nested.type_tag),
                    ));
                }
            };
            fields.push(SchemaField {
                name: decl.name,
                node,
            });
        }

        Ok(SchemaNode::Composite {
            type_tag: shape.type_tag,
            fields,
        })
    }

    /// Returns the number of leaf attributes.
    pub fn leaf_count(&self) -> usize {
        match self {
            Self::Leaf(_) => 1,
            Self::Composite { fields, .. } => fields.iter().map(|f| f.node.leaf_count()).sum(),
        }
    }

    /// Returns leaf addresses under `address` in depth-first order.
    pub fn leaf_addresses(&self, address: &NodeId) -> Result<Vec<NodeId>, SchemaError> {
        let mut out = Vec::with_capacity(self.leaf_count());
        self.collect_leaves(address, &mut out)?;
        Ok(out)
    }

    fn collect_leaves(&self, address: &NodeId, out: &mut Vec<NodeId>) -> Result<(), SchemaError> {
        match self {
            Self::Leaf(_) => out.push(address.clone()),
            Self::Composite { fields, .. } => {
                for field in fields {
                    field.node.collect_leaves(&address.child(field.name)?, out)?;
                }
            }
        }
        Ok(())
    }

    fn assemble<I>(&self, values: &mut I) -> MappedValue
    where
        I: Iterator<Item = Variant>,
    {
        match self {
            Self::Leaf(_) => MappedValue::Scalar(values.next().unwrap_or_default()),
            Self::Composite { fields, .. } => MappedValue::Composite(
                fields
                    .iter()
                    .map(|field| (field.name.to_string(), field.node.assemble(values)))
                    .collect(),
            ),
        }
    }

    fn flatten(
        &self,
        address: &NodeId,
        value: MappedValue,
        out: &mut Vec<(NodeId, Variant)>,
    ) -> UaClientResult<()> {
        match (self, value) {
            (Self::Leaf(scalar), MappedValue::Scalar(variant)) => {
                out.push((address.clone(), coerce(&variant, *scalar)?));
            }
            (Self::Leaf(scalar), MappedValue::Composite(_)) => {
                return Err(ConversionError::type_mismatch(scalar.name(), "Composite").into());
            }
            (Self::Composite { type_tag, fields }, MappedValue::Composite(mut members)) => {
                for field in fields {
                    let index = members
                        .iter()
                        .position(|(name, _)| name == field.name)
                        .ok_or_else(|| {
                            ConversionError::missing_field(format!("{}.{}", type_tag, field.name))
                        })?;
                    let (_, member) = members.swap_remove(index);
                    field.node.flatten(&address.child(field.name)?, member, out)?;
                }
            }
            (Self::Composite { type_tag, .. }, MappedValue::Scalar(variant)) => {
                return Err(ConversionError::type_mismatch(*type_tag, variant.type_name()).into());
            }
        }
        Ok(())
    }
}

// =============================================================================
// ValueMapper
// =============================================================================

/// Per-connection mapper with its schema cache.
///
/// Cache entries are never invalidated; a server-side schema change needs a
/// new connection.
#[derive(Default)]
pub struct ValueMapper {
    schemas: DashMap<&'static str, Arc<SchemaNode>>,
    schema_fetches: AtomicU64,
}

impl ValueMapper {
    /// Creates a mapper with an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached schema for a type tag.
    pub fn cached_schema(&self, type_tag: &str) -> Option<Arc<SchemaNode>> {
        self.schemas.get(type_tag).map(|entry| entry.value().clone())
    }

    /// Returns the cached type tags, sorted.
    pub fn cached_types(&self) -> Vec<&'static str> {
        let mut tags: Vec<_> = self.schemas.iter().map(|entry| *entry.key()).collect();
        tags.sort_unstable();
        tags
    }

    /// Returns how many discovery calls have been issued.
    pub fn schema_fetches(&self) -> u64 {
        self.schema_fetches.load(Ordering::Relaxed)
    }

    async fn schema_for(
        &self,
        session: &dyn RemoteSession,
        shape: &'static CompositeShape,
        address: &NodeId,
    ) -> UaClientResult<Arc<SchemaNode>> {
        if let Some(schema) = self.cached_schema(shape.type_tag) {
            return Ok(schema);
        }

        self.schema_fetches.fetch_add(1, Ordering::Relaxed);
        let description = session.describe_type(address).await?;
        let resolved = Arc::new(SchemaNode::resolve(shape, &description)?);
        tracing::debug!(
            type_tag = shape.type_tag,
            address = %address,
            leaves = resolved.leaf_count(),
            "Composite schema resolved"
        );

        Ok(self
            .schemas
            .entry(shape.type_tag)
            .or_insert(resolved)
            .value()
            .clone())
    }

    /// Reads a typed value from `address`.
    ///
    /// # Errors
    ///
    /// - `Operation::ReadFailed` if any attribute read reports a bad status
    /// - `Schema` if a composite field cannot be resolved remotely
    /// - `Conversion` if a value cannot be coerced to the declared type
    pub async fn decode<T: Mappable>(&self, session: &dyn RemoteSession, address: &NodeId) -> UaClientResult<T> {
        let (leaves, schema) = match T::shape() {
            Shape::Scalar => (vec![address.clone()], None),
            Shape::Composite(shape) => {
                let schema = self.schema_for(session, shape, address).await?;
                (schema.leaf_addresses(address)?, Some(schema))
            }
        };

        let values = session.read_values(&leaves).await?;
        if values.len() != leaves.len() {
            return Err(OperationError::BatchMismatch {
                operation: "read",
                expected: leaves.len(),
                actual: values.len(),
            }
            .into());
        }
        if let Some((leaf, value)) = leaves
            .iter()
            .zip(values.iter())
            .find(|(_, value)| value.status.is_bad())
        {
            return Err(UaClientError::read_failed(leaf.to_string(), value.status));
        }

        let mut variants = values.into_iter().map(|value| value.value);
        let mapped = match schema {
            None => MappedValue::Scalar(variants.next().unwrap_or_default()),
            Some(schema) => schema.assemble(&mut variants),
        };
        Ok(T::from_mapped(mapped)?)
    }

    /// Writes a typed value to `address`.
    ///
    /// Scalars are written as-is; composites become one batched write of
    /// their leaves, each coerced to the server-declared type.
    pub async fn encode<T: Mappable>(
        &self,
        session: &dyn RemoteSession,
        address: &NodeId,
        value: T,
    ) -> UaClientResult<()> {
        let writes = match T::shape() {
            Shape::Scalar => vec![(address.clone(), value.into_mapped().into_scalar("scalar")?)],
            Shape::Composite(shape) => {
                let schema = self.schema_for(session, shape, address).await?;
                let mut writes = Vec::with_capacity(schema.leaf_count());
                schema.flatten(address, value.into_mapped(), &mut writes)?;
                writes
            }
        };

        let statuses = session.write_values(&writes).await?;
        if statuses.len() != writes.len() {
            return Err(OperationError::BatchMismatch {
                operation: "write",
                expected: writes.len(),
                actual: statuses.len(),
            }
            .into());
        }
        if let Some(((leaf, _), status)) = writes
            .iter()
            .zip(statuses.iter())
            .find(|(_, status)| !status.is_good())
        {
            return Err(UaClientError::write_failed(leaf.to_string(), *status));
        }
        Ok(())
    }

    /// Decodes a single notification value.
    pub fn decode_notification<T: Mappable>(&self, value: Variant) -> Result<T, ConversionError> {
        decode_variant(value)
    }
}

impl fmt::Debug for ValueMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueMapper")
            .field("cached_types", &self.cached_types())
            .field("schema_fetches", &self.schema_fetches())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::transport::FieldDescription;

    #[derive(Debug, PartialEq)]
    struct Drive {
        running: bool,
        speed: f64,
    }

    static DRIVE: CompositeShape = CompositeShape {
        type_tag: "Drive",
        fields: &[
            FieldDecl { name: "Running", shape: <bool as Mappable>::shape },
            FieldDecl { name: "Speed", shape: <f64 as Mappable>::shape },
        ],
    };

    impl Mappable for Drive {
        fn shape() -> Shape {
            Shape::Composite(&DRIVE)
        }

        fn from_mapped(value: MappedValue) -> Result<Self, ConversionError> {
            let mut fields = CompositeFields::new(&DRIVE, value)?;
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

    #[derive(Debug, PartialEq)]
    struct Cell {
        name: String,
        drive: Drive,
    }

    static CELL: CompositeShape = CompositeShape {
        type_tag: "Cell",
        fields: &[
            FieldDecl { name: "Name", shape: <String as Mappable>::shape },
            FieldDecl { name: "Drive", shape: <Drive as Mappable>::shape },
        ],
    };

    impl Mappable for Cell {
        fn shape() -> Shape {
            Shape::Composite(&CELL)
        }

        fn from_mapped(value: MappedValue) -> Result<Self, ConversionError> {
            let mut fields = CompositeFields::new(&CELL, value)?;
            Ok(Self {
                name: fields.take("Name")?,
                drive: fields.take("Drive")?,
            })
        }

        fn into_mapped(self) -> MappedValue {
            MappedValue::composite([
                ("Name", self.name.into_mapped()),
                ("Drive", self.drive.into_mapped()),
            ])
        }
    }

    fn cell_description() -> TypeDescription {
        TypeDescription::Structure(vec![
            FieldDescription::scalar("Name", ScalarType::String),
            FieldDescription::structure(
                "Drive",
                vec![
                    FieldDescription::scalar("Running", ScalarType::Boolean),
                    FieldDescription::scalar("Speed", ScalarType::Float),
                ],
            ),
        ])
    }

    #[test]
    fn test_integer_narrowing_is_range_checked() {
        assert_eq!(coerce(&Variant::Int64(12), ScalarType::Int16).unwrap(), Variant::Int16(12));
        assert!(matches!(
            coerce(&Variant::Int32(70_000), ScalarType::Int16),
            Err(ConversionError::OutOfRange { .. })
        ));
        assert!(matches!(
            coerce(&Variant::Int32(-1), ScalarType::UInt32),
            Err(ConversionError::OutOfRange { .. })
        ));
        assert!(matches!(
            coerce(&Variant::Null, ScalarType::Double),
            Err(ConversionError::NullValue { .. })
        ));
    }

    #[test]
    fn test_scalar_from_mapped() {
        let value: i32 = Mappable::from_mapped(MappedValue::Scalar(Variant::Int16(-7))).unwrap();
        assert_eq!(value, -7);

        let flag: bool = Mappable::from_mapped(MappedValue::Scalar(Variant::Byte(1))).unwrap();
        assert!(flag);

        let text: String = Mappable::from_mapped(MappedValue::Scalar(Variant::Double(1.5))).unwrap();
        assert_eq!(text, "1.5");

        let missing: Option<u16> = Mappable::from_mapped(MappedValue::Scalar(Variant::Null)).unwrap();
        assert_eq!(missing, None);

        assert!(<u8 as Mappable>::from_mapped(MappedValue::Scalar(Variant::Int32(300))).is_err());
        assert!(<f64 as Mappable>::from_mapped(MappedValue::Composite(vec![])).is_err());
    }

    #[test]
    fn test_resolve_nested_schema() {
        let schema = SchemaNode::resolve(&CELL, &cell_description()).unwrap();
        assert_eq!(schema.leaf_count(), 3);

        let leaves = schema.leaf_addresses(&NodeId::string(2, "Line1.Cell")).unwrap();
        let rendered: Vec<String> = leaves.iter().map(|n| n.to_string()).collect();
        assert_eq!(
            rendered,
            vec![
                "ns=2;s=Line1.Cell.Name",
                "ns=2;s=Line1.Cell.Drive.Running",
                "ns=2;s=Line1.Cell.Drive.Speed",
            ]
        );
    }

    #[test]
    fn test_resolve_missing_field_fails() {
        let description = TypeDescription::Structure(vec![FieldDescription::scalar(
            "Running",
            ScalarType::Boolean,
        )]);
        let err = SchemaNode::resolve(&DRIVE, &description).unwrap_err();
        assert!(matches!(err, SchemaError::ResolutionFailed { ref field, .. } if field == "Speed"));

        let err = SchemaNode::resolve(&DRIVE, &TypeDescription::Scalar(ScalarType::Double)).unwrap_err();
        assert!(matches!(err, SchemaError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_flatten_coerces_to_remote_types() {
        let schema = SchemaNode::resolve(&CELL, &cell_description()).unwrap();
        let cell = Cell {
            name: "press".to_string(),
            drive: Drive {
                running: true,
                speed: 12.5,
            },
        };

        let mut writes = Vec::new();
        schema
            .flatten(&NodeId::string(2, "Cell"), cell.into_mapped(), &mut writes)
            .unwrap();

        assert_eq!(writes.len(), 3);
        assert_eq!(writes[2].0, NodeId::string(2, "Cell.Drive.Speed"));
        assert_eq!(writes[2].1, Variant::Float(12.5));
    }

    #[test]
    fn test_assemble_round_trip() {
        let schema = SchemaNode::resolve(&CELL, &cell_description()).unwrap();
        let mut values = vec![
            Variant::String("press".to_string()),
            Variant::Boolean(false),
            Variant::Float(3.0),
        ]
        .into_iter();

        let cell = Cell::from_mapped(schema.assemble(&mut values)).unwrap();
        assert_eq!(
            cell,
            Cell {
                name: "press".to_string(),
                drive: Drive {
                    running: false,
                    speed: 3.0,
                },
            }
        );
    }

    #[test]
    fn test_decode_structure_notification() {
        let body = Cell {
            name: "press".to_string(),
            drive: Drive {
                running: true,
                speed: 7.0,
            },
        }
        .into_mapped()
        .into_variant();

        let decoded: Cell = decode_variant(body).unwrap();
        assert_eq!(decoded.drive.speed, 7.0);

        assert!(decode_variant::<Cell>(Variant::Double(1.0)).is_err());
        assert!(decode_variant::<Drive>(Variant::Structure(vec![(
            "Running".to_string(),
            Variant::Boolean(true)
        )]))
        .is_err());
    }
}
