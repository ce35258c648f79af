// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Core value and addressing types.
//!
//! - **NodeId**: remote node addresses with `ns=..;s=..` parsing
//! - **RemoteIdentity**: endpoint plus logical session name, the registry key
//! - **StatusCode**: OPC UA status codes with severity helpers
//! - **ScalarType / Variant / DataValue**: the remote value model
//!
//! # Examples
//!
//! ```
//! use trap_uaclient::types::{NodeId, RemoteIdentity};
//!
//! let node: NodeId = "ns=2;s=Line1.Motor".parse().unwrap();
//! assert_eq!(node.child("Speed").unwrap().to_string(), "ns=2;s=Line1.Motor.Speed");
//!
//! let identity = RemoteIdentity::new("opc.tcp://localhost:4840", "line1");
//! assert_eq!(identity.to_string(), "line1@opc.tcp://localhost:4840");
//! ```

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ConfigurationError, SchemaError, UaClientError};

// =============================================================================
// NodeId
// =============================================================================

/// Remote node identifier.
///
/// A NodeId consists of a namespace index and an identifier which can be
/// numeric, string, GUID, or opaque (byte string).
///
/// # Examples
///
/// ```
/// use trap_uaclient::types::NodeId;
///
/// let numeric = NodeId::numeric(2, 1001);
/// let string = NodeId::string(2, "MyDevice.Temperature");
/// let parsed: NodeId = "ns=2;s=MyDevice.Temperature".parse().unwrap();
/// assert_eq!(parsed, string);
/// assert_eq!(numeric.to_string(), "ns=2;i=1001");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    /// Namespace index (0 = standard namespace).
    pub namespace_index: u16,

    /// The node identifier.
    pub identifier: NodeIdentifier,
}

impl NodeId {
    /// Creates a numeric node ID.
    #[inline]
    pub fn numeric(namespace_index: u16, value: u32) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Numeric(value),
        }
    }

    /// Creates a string node ID.
    #[inline]
    pub fn string(namespace_index: u16, value: impl Into<String>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::String(value.into()),
        }
    }

    /// Creates a GUID node ID.
    #[inline]
    pub fn guid(namespace_index: u16, value: Uuid) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Guid(value),
        }
    }

    /// Creates an opaque (byte string) node ID.
    #[inline]
    pub fn opaque(namespace_index: u16, value: Vec<u8>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Opaque(value),
        }
    }

    /// Returns the null node ID (ns=0, i=0).
    #[inline]
    pub const fn null() -> Self {
        Self {
            namespace_index: 0,
            identifier: NodeIdentifier::Numeric(0),
        }
    }

    /// Returns `true` if this is a null node ID.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.namespace_index == 0 && matches!(self.identifier, NodeIdentifier::Numeric(0))
    }

    /// Returns the string value if this is a string identifier.
    #[inline]
    pub fn as_string(&self) -> Option<&str> {
        match &self.identifier {
            NodeIdentifier::String(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the address of a composite member: `parent.field`.
    ///
    /// Only string identifiers can be extended this way.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidChildAddress`] for non-string identifiers.
    pub fn child(&self, field: &str) -> Result<NodeId, SchemaError> {
        match &self.identifier {
            NodeIdentifier::String(parent) => {
                Ok(NodeId::string(self.namespace_index, format!("{}.{}", parent, field)))
            }
            _ => Err(SchemaError::InvalidChildAddress {
                parent: self.to_opc_string(),
                field: field.to_string(),
            }),
        }
    }

    /// Converts to the string format `ns=<namespace>;{i|s|g|b}=<identifier>`.
    ///
    /// The namespace prefix is omitted for namespace 0.
    pub fn to_opc_string(&self) -> String {
        if self.namespace_index == 0 {
            self.identifier.to_string()
        } else {
            format!("ns={};{}", self.namespace_index, self.identifier)
        }
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_opc_string())
    }
}

impl FromStr for NodeId {
    type Err = UaClientError;

    /// Parses a NodeId.
    ///
    /// Supported formats:
    /// - `ns=2;i=1001` (numeric)
    /// - `ns=2;s=MyNode` (string)
    /// - `ns=2;g=550e8400-e29b-41d4-a716-446655440000` (GUID)
    /// - `ns=2;b=SGVsbG8=` (opaque, base64 encoded)
    /// - `i=1001` / `s=MyNode` (namespace 0)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = |reason: String| {
            UaClientError::Configuration(ConfigurationError::invalid_node_id(s, reason))
        };

        let (namespace_index, identifier_part) = match s.strip_prefix("ns=") {
            Some(rest) => {
                let (ns_str, id) = rest
                    .split_once(';')
                    .ok_or_else(|| invalid("Missing identifier after namespace".to_string()))?;
                let ns: u16 = ns_str
                    .parse()
                    .map_err(|_| invalid("Invalid namespace index".to_string()))?;
                (ns, id)
            }
            None => (0, s),
        };

        let identifier = if let Some(id) = identifier_part.strip_prefix("i=") {
            let value: u32 = id
                .parse()
                .map_err(|_| invalid("Invalid numeric identifier".to_string()))?;
            NodeIdentifier::Numeric(value)
        } else if let Some(id) = identifier_part.strip_prefix("s=") {
            if id.is_empty() {
                return Err(invalid("Empty string identifier".to_string()));
            }
            NodeIdentifier::String(id.to_string())
        } else if let Some(id) = identifier_part.strip_prefix("g=") {
            let uuid = Uuid::parse_str(id).map_err(|e| invalid(format!("Invalid GUID: {}", e)))?;
            NodeIdentifier::Guid(uuid)
        } else if let Some(id) = identifier_part.strip_prefix("b=") {
            let bytes = BASE64
                .decode(id)
                .map_err(|e| invalid(format!("Invalid base64: {}", e)))?;
            NodeIdentifier::Opaque(bytes)
        } else {
            return Err(invalid(
                "Unknown identifier type. Expected i=, s=, g=, or b=".to_string(),
            ));
        };

        Ok(Self {
            namespace_index,
            identifier,
        })
    }
}

// =============================================================================
// NodeIdentifier
// =============================================================================

/// Node identifier kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum NodeIdentifier {
    /// Numeric identifier.
    Numeric(u32),

    /// String identifier.
    String(String),

    /// GUID identifier.
    Guid(Uuid),

    /// Opaque identifier.
    Opaque(Vec<u8>),
}

impl fmt::Display for NodeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(v) => write!(f, "i={}", v),
            Self::String(v) => write!(f, "s={}", v),
            Self::Guid(v) => write!(f, "g={}", v),
            Self::Opaque(v) => write!(f, "b={}", BASE64.encode(v)),
        }
    }
}

// =============================================================================
// RemoteIdentity
// =============================================================================

/// Identity of a remote connection: server endpoint plus logical session name.
///
/// Two connections with the same identity would share a server session slot,
/// so the registry refuses to create a second one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RemoteIdentity {
    /// Server endpoint URL.
    pub endpoint: String,

    /// Logical session name.
    pub session_name: String,
}

impl RemoteIdentity {
    /// Creates a new identity.
    pub fn new(endpoint: impl Into<String>, session_name: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            session_name: session_name.into(),
        }
    }
}

impl fmt::Display for RemoteIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.session_name, self.endpoint)
    }
}

// =============================================================================
// StatusCode
// =============================================================================

/// Status code returned by the server for reads, writes, calls and
/// notifications.
///
/// The top two bits carry the severity: `0x80000000` bad,
/// `0x40000000` uncertain, neither set good.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(pub u32);

impl StatusCode {
    /// Good.
    pub const GOOD: StatusCode = StatusCode(0x0000_0000);
    /// Uncertain.
    pub const UNCERTAIN: StatusCode = StatusCode(0x4000_0000);
    /// Generic bad.
    pub const BAD: StatusCode = StatusCode(0x8000_0000);
    /// BadCommunicationError.
    pub const BAD_COMMUNICATION_ERROR: StatusCode = StatusCode(0x8005_0000);
    /// BadTimeout.
    pub const BAD_TIMEOUT: StatusCode = StatusCode(0x800C_0000);
    /// BadServerNotConnected.
    pub const BAD_SERVER_NOT_CONNECTED: StatusCode = StatusCode(0x800F_0000);
    /// BadSessionClosed.
    pub const BAD_SESSION_CLOSED: StatusCode = StatusCode(0x802A_0000);
    /// BadSubscriptionIdInvalid.
    pub const BAD_SUBSCRIPTION_ID_INVALID: StatusCode = StatusCode(0x802C_0000);
    /// BadNodeIdUnknown.
    pub const BAD_NODE_ID_UNKNOWN: StatusCode = StatusCode(0x8062_0000);
    /// BadNotReadable.
    pub const BAD_NOT_READABLE: StatusCode = StatusCode(0x8068_0000);
    /// BadNotWritable.
    pub const BAD_NOT_WRITABLE: StatusCode = StatusCode(0x8069_0000);
    /// BadOutOfRange.
    pub const BAD_OUT_OF_RANGE: StatusCode = StatusCode(0x806A_0000);
    /// BadNotFound.
    pub const BAD_NOT_FOUND: StatusCode = StatusCode(0x806C_0000);
    /// BadTypeMismatch.
    pub const BAD_TYPE_MISMATCH: StatusCode = StatusCode(0x80AB_0000);
    /// BadMethodInvalid.
    pub const BAD_METHOD_INVALID: StatusCode = StatusCode(0x80AC_0000);

    /// Returns `true` if the status is good.
    #[inline]
    pub fn is_good(&self) -> bool {
        self.0 & 0xC000_0000 == 0
    }

    /// Returns `true` if the status is uncertain.
    #[inline]
    pub fn is_uncertain(&self) -> bool {
        self.0 & 0x4000_0000 != 0 && self.0 & 0x8000_0000 == 0
    }

    /// Returns `true` if the status is bad.
    #[inline]
    pub fn is_bad(&self) -> bool {
        self.0 & 0x8000_0000 != 0
    }

    /// Returns the symbolic name of well-known codes.
    pub fn name(&self) -> &'static str {
        match *self {
            Self::GOOD => "Good",
            Self::UNCERTAIN => "Uncertain",
            Self::BAD => "Bad",
            Self::BAD_COMMUNICATION_ERROR => "BadCommunicationError",
            Self::BAD_TIMEOUT => "BadTimeout",
            Self::BAD_SERVER_NOT_CONNECTED => "BadServerNotConnected",
            Self::BAD_SESSION_CLOSED => "BadSessionClosed",
            Self::BAD_SUBSCRIPTION_ID_INVALID => "BadSubscriptionIdInvalid",
            Self::BAD_NODE_ID_UNKNOWN => "BadNodeIdUnknown",
            Self::BAD_NOT_READABLE => "BadNotReadable",
            Self::BAD_NOT_WRITABLE => "BadNotWritable",
            Self::BAD_OUT_OF_RANGE => "BadOutOfRange",
            Self::BAD_NOT_FOUND => "BadNotFound",
            Self::BAD_TYPE_MISMATCH => "BadTypeMismatch",
            Self::BAD_METHOD_INVALID => "BadMethodInvalid",
            _ if self.is_bad() => "Bad",
            _ if self.is_uncertain() => "Uncertain",
            _ => "Good",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08X})", self.name(), self.0)
    }
}

// =============================================================================
// ScalarType
// =============================================================================

/// Built-in scalar data types a server can declare for a leaf node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    /// Boolean value.
    Boolean,
    /// Signed 8-bit integer.
    SByte,
    /// Unsigned 8-bit integer.
    Byte,
    /// Signed 16-bit integer.
    Int16,
    /// Unsigned 16-bit integer.
    UInt16,
    /// Signed 32-bit integer.
    Int32,
    /// Unsigned 32-bit integer.
    UInt32,
    /// Signed 64-bit integer.
    Int64,
    /// Unsigned 64-bit integer.
    UInt64,
    /// 32-bit IEEE 754 float.
    Float,
    /// 64-bit IEEE 754 double.
    Double,
    /// UTF-8 string.
    String,
    /// Date and time.
    DateTime,
    /// GUID.
    Guid,
    /// Raw byte string.
    ByteString,
}

impl ScalarType {
    /// Returns the type name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Boolean => "Boolean",
            Self::SByte => "SByte",
            Self::Byte => "Byte",
            Self::Int16 => "Int16",
            Self::UInt16 => "UInt16",
            Self::Int32 => "Int32",
            Self::UInt32 => "UInt32",
            Self::Int64 => "Int64",
            Self::UInt64 => "UInt64",
            Self::Float => "Float",
            Self::Double => "Double",
            Self::String => "String",
            Self::DateTime => "DateTime",
            Self::Guid => "Guid",
            Self::ByteString => "ByteString",
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// Variant
// =============================================================================

/// Remote value as carried by reads, writes and notifications.
///
/// `Structure` holds a decoded structure body with its named members, as
/// delivered for composite nodes.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Variant {
    /// Boolean value.
    Boolean(bool),
    /// Signed byte.
    SByte(i8),
    /// Unsigned byte.
    Byte(u8),
    /// 16-bit signed integer.
    Int16(i16),
    /// 16-bit unsigned integer.
    UInt16(u16),
    /// 32-bit signed integer.
    Int32(i32),
    /// 32-bit unsigned integer.
    UInt32(u32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit unsigned integer.
    UInt64(u64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit double.
    Double(f64),
    /// String value.
    String(String),
    /// Date/time value.
    DateTime(DateTime<Utc>),
    /// GUID value.
    Guid(Uuid),
    /// Byte string.
    ByteString(Vec<u8>),
    /// Array of values.
    Array(Vec<Variant>),
    /// Structure body with named members in declaration order.
    Structure(Vec<(String, Variant)>),
    /// Null value.
    #[default]
    Null,
}

impl Variant {
    /// Returns the scalar type of this value, if it is a scalar.
    pub fn scalar_type(&self) -> Option<ScalarType> {
        Some(match self {
            Self::Boolean(_) => ScalarType::Boolean,
            Self::SByte(_) => ScalarType::SByte,
            Self::Byte(_) => ScalarType::Byte,
            Self::Int16(_) => ScalarType::Int16,
            Self::UInt16(_) => ScalarType::UInt16,
            Self::Int32(_) => ScalarType::Int32,
            Self::UInt32(_) => ScalarType::UInt32,
            Self::Int64(_) => ScalarType::Int64,
            Self::UInt64(_) => ScalarType::UInt64,
            Self::Float(_) => ScalarType::Float,
            Self::Double(_) => ScalarType::Double,
            Self::String(_) => ScalarType::String,
            Self::DateTime(_) => ScalarType::DateTime,
            Self::Guid(_) => ScalarType::Guid,
            Self::ByteString(_) => ScalarType::ByteString,
            Self::Array(_) | Self::Structure(_) | Self::Null => return None,
        })
    }

    /// Returns a short type name for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Array(_) => "Array",
            Self::Structure(_) => "Structure",
            Self::Null => "Null",
            other => other.scalar_type().map(|t| t.name()).unwrap_or("Unknown"),
        }
    }

    /// Returns `true` if this is a null value.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Attempts to get the value as an i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Boolean(v) => Some(if *v { 1 } else { 0 }),
            Self::SByte(v) => Some(*v as i64),
            Self::Byte(v) => Some(*v as i64),
            Self::Int16(v) => Some(*v as i64),
            Self::UInt16(v) => Some(*v as i64),
            Self::Int32(v) => Some(*v as i64),
            Self::UInt32(v) => Some(*v as i64),
            Self::Int64(v) => Some(*v),
            Self::UInt64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Attempts to get the value as a u64.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::UInt64(v) => Some(*v),
            other => other.as_i64().and_then(|v| u64::try_from(v).ok()),
        }
    }

    /// Attempts to get the value as an f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v as f64),
            Self::Double(v) => Some(*v),
            Self::UInt64(v) => Some(*v as f64),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    /// Attempts to get the value as a string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// Returns a structure member by name.
    pub fn member(&self, name: &str) -> Option<&Variant> {
        match self {
            Self::Structure(members) => members.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(v) => write!(f, "{}", v),
            Self::SByte(v) => write!(f, "{}", v),
            Self::Byte(v) => write!(f, "{}", v),
            Self::Int16(v) => write!(f, "{}", v),
            Self::UInt16(v) => write!(f, "{}", v),
            Self::Int32(v) => write!(f, "{}", v),
            Self::UInt32(v) => write!(f, "{}", v),
            Self::Int64(v) => write!(f, "{}", v),
            Self::UInt64(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
            Self::String(v) => write!(f, "{}", v),
            Self::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
            Self::Guid(v) => write!(f, "{}", v),
            Self::ByteString(v) => write!(f, "<{} bytes>", v.len()),
            Self::Array(v) => write!(f, "[{} items]", v.len()),
            Self::Structure(v) => write!(f, "{{{} members}}", v.len()),
            Self::Null => write!(f, "null"),
        }
    }
}

// =============================================================================
// DataValue
// =============================================================================

/// A value together with its status and timestamps.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataValue {
    /// The value.
    pub value: Variant,

    /// Status of the value.
    pub status: StatusCode,

    /// Source timestamp.
    pub source_timestamp: Option<DateTime<Utc>>,

    /// Server timestamp.
    pub server_timestamp: Option<DateTime<Utc>>,
}

impl DataValue {
    /// Creates a good value stamped now.
    pub fn good(value: Variant) -> Self {
        Self {
            value,
            status: StatusCode::GOOD,
            source_timestamp: None,
            server_timestamp: Some(Utc::now()),
        }
    }

    /// Creates a value-less result with the given status.
    pub fn bad(status: StatusCode) -> Self {
        Self {
            value: Variant::Null,
            status,
            source_timestamp: None,
            server_timestamp: Some(Utc::now()),
        }
    }

    /// Sets the source timestamp.
    pub fn with_source_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.source_timestamp = Some(timestamp);
        self
    }

    /// Returns `true` if the status is good.
    #[inline]
    pub fn is_good(&self) -> bool {
        self.status.is_good()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_parse_round_trip() {
        let cases = [
            "ns=2;i=1001",
            "ns=2;s=Line1.Motor",
            "i=85",
            "ns=3;g=550e8400-e29b-41d4-a716-446655440000",
            "ns=1;b=SGVsbG8=",
        ];
        for text in cases {
            let node: NodeId = text.parse().unwrap();
            assert_eq!(node.to_string(), text);
        }
    }

    #[test]
    fn test_node_id_parse_errors() {
        assert!("ns=x;i=1".parse::<NodeId>().is_err());
        assert!("ns=2".parse::<NodeId>().is_err());
        assert!("ns=2;q=1".parse::<NodeId>().is_err());
        assert!("ns=2;s=".parse::<NodeId>().is_err());
    }

    #[test]
    fn test_child_address() {
        let parent = NodeId::string(2, "Station");
        assert_eq!(
            parent.child("Motor").unwrap().child("Speed").unwrap(),
            NodeId::string(2, "Station.Motor.Speed")
        );
        assert!(NodeId::numeric(2, 10).child("Speed").is_err());
    }

    #[test]
    fn test_status_code_severity() {
        assert!(StatusCode::GOOD.is_good());
        assert!(StatusCode::UNCERTAIN.is_uncertain());
        assert!(!StatusCode::UNCERTAIN.is_good());
        assert!(StatusCode::BAD_TIMEOUT.is_bad());
        assert_eq!(StatusCode::BAD_NOT_WRITABLE.name(), "BadNotWritable");
        assert_eq!(StatusCode(0x80FF_0000).name(), "Bad");
        assert_eq!(StatusCode::BAD_TIMEOUT.to_string(), "BadTimeout (0x800C0000)");
    }

    #[test]
    fn test_variant_accessors() {
        assert_eq!(Variant::Int16(-4).as_i64(), Some(-4));
        assert_eq!(Variant::UInt64(u64::MAX).as_i64(), None);
        assert_eq!(Variant::Float(1.5).as_f64(), Some(1.5));
        assert_eq!(Variant::Int32(-1).as_u64(), None);
        assert_eq!(Variant::Null.scalar_type(), None);
        assert_eq!(Variant::Double(1.0).type_name(), "Double");

        let body = Variant::Structure(vec![("Speed".into(), Variant::Double(2.0))]);
        assert_eq!(body.member("Speed"), Some(&Variant::Double(2.0)));
        assert_eq!(body.member("Torque"), None);
    }

    #[test]
    fn test_identity_display() {
        let identity = RemoteIdentity::new("opc.tcp://plc:4840", "line1");
        assert_eq!(identity.to_string(), "line1@opc.tcp://plc:4840");
    }
}
