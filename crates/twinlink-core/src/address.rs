// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Addressing types for both sides of the bridge.
//!
//! - [`NodeId`] / [`NodeRef`] identify OPC UA nodes, using the canonical
//!   textual form `ns=<u16>;<i|s|g|b>=<payload>`.
//! - [`ElementRef`] identifies an AAS submodel element by submodel id and a
//!   slash-separated idShortPath.

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ConfigError;

// =============================================================================
// NodeId
// =============================================================================

/// OPC UA node identifier.
///
/// # Examples
///
/// ```
/// use twinlink_core::address::NodeId;
///
/// let node = NodeId::string(2, "Temperature");
/// assert_eq!(node.to_string(), "ns=2;s=Temperature");
///
/// let parsed: NodeId = "ns=2;i=1001".parse().unwrap();
/// assert_eq!(parsed.namespace_index, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId {
    /// Namespace index (0 = OPC UA standard namespace).
    pub namespace_index: u16,

    /// The node identifier.
    pub identifier: NodeIdentifier,
}

impl NodeId {
    /// Creates a numeric node id.
    #[inline]
    pub fn numeric(namespace_index: u16, value: u32) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Numeric(value),
        }
    }

    /// Creates a string node id.
    #[inline]
    pub fn string(namespace_index: u16, value: impl Into<String>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::String(value.into()),
        }
    }

    /// Creates a GUID node id.
    #[inline]
    pub fn guid(namespace_index: u16, value: Uuid) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Guid(value),
        }
    }

    /// Creates an opaque (byte string) node id.
    #[inline]
    pub fn opaque(namespace_index: u16, value: Vec<u8>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Opaque(value),
        }
    }

    /// Returns `true` if this is a string identifier.
    #[inline]
    pub const fn is_string(&self) -> bool {
        matches!(self.identifier, NodeIdentifier::String(_))
    }

    /// Converts to the canonical OPC UA string form.
    ///
    /// The namespace prefix is always emitted, matching the canonical form
    /// used in mapping configuration.
    pub fn to_opc_string(&self) -> String {
        format!("ns={};{}", self.namespace_index, self.identifier)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_opc_string())
    }
}

impl FromStr for NodeId {
    type Err = ConfigError;

    /// Parses a node id from the canonical textual form.
    ///
    /// Supported: `ns=2;i=1001`, `ns=2;s=Name`, `ns=2;g=<uuid>`,
    /// `ns=2;b=<base64>`, and the namespace-0 shorthand `i=1001`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        let (namespace_index, identifier_part) = if let Some(rest) = s.strip_prefix("ns=") {
            let (ns_str, rest) = rest
                .split_once(';')
                .ok_or_else(|| ConfigError::invalid_node_id(s, "Missing identifier after namespace"))?;
            let ns: u16 = ns_str
                .parse()
                .map_err(|_| ConfigError::invalid_node_id(s, "Invalid namespace index"))?;
            (ns, rest)
        } else {
            (0, s)
        };

        let identifier = if let Some(id) = identifier_part.strip_prefix("i=") {
            let value: u32 = id
                .parse()
                .map_err(|_| ConfigError::invalid_node_id(s, "Invalid numeric identifier"))?;
            NodeIdentifier::Numeric(value)
        } else if let Some(id) = identifier_part.strip_prefix("s=") {
            NodeIdentifier::String(id.to_string())
        } else if let Some(id) = identifier_part.strip_prefix("g=") {
            let uuid = Uuid::parse_str(id)
                .map_err(|e| ConfigError::invalid_node_id(s, format!("Invalid GUID: {}", e)))?;
            NodeIdentifier::Guid(uuid)
        } else if let Some(id) = identifier_part.strip_prefix("b=") {
            let bytes = BASE64
                .decode(id)
                .map_err(|e| ConfigError::invalid_node_id(s, format!("Invalid base64: {}", e)))?;
            NodeIdentifier::Opaque(bytes)
        } else {
            return Err(ConfigError::invalid_node_id(
                s,
                "Unknown identifier type. Expected i=, s=, g=, or b=",
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

/// The four OPC UA node identifier kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum NodeIdentifier {
    /// Numeric identifier.
    Numeric(u32),

    /// String identifier.
    String(String),

    /// GUID identifier.
    Guid(Uuid),

    /// Opaque identifier (application-specific byte array).
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
// NodeRef
// =============================================================================

/// Reference to an OPC UA node on a named endpoint. Immutable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    /// The endpoint name from the configuration.
    pub endpoint: String,

    /// The node within that endpoint's address space.
    pub node_id: NodeId,
}

impl NodeRef {
    /// Creates a new node reference.
    pub fn new(endpoint: impl Into<String>, node_id: NodeId) -> Self {
        Self {
            endpoint: endpoint.into(),
            node_id,
        }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.endpoint, self.node_id)
    }
}

// =============================================================================
// ElementRef
// =============================================================================

/// Reference to an AAS submodel element. Immutable.
///
/// `id_short_path` is a slash-separated chain of idShort segments; nested
/// collections are addressed by listing each level.
///
/// # Examples
///
/// ```
/// use twinlink_core::address::ElementRef;
///
/// let element = ElementRef::new("urn:factory:submodel:sensors", "Line1/Temperature");
/// assert_eq!(element.id_short(), "Temperature");
/// assert_eq!(element.segments().count(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementRef {
    /// Opaque IRI/URN of the containing submodel.
    pub submodel_id: String,

    /// Slash-separated idShort path within the submodel.
    pub id_short_path: String,
}

impl ElementRef {
    /// Creates a new element reference.
    pub fn new(submodel_id: impl Into<String>, id_short_path: impl Into<String>) -> Self {
        Self {
            submodel_id: submodel_id.into(),
            id_short_path: id_short_path.into(),
        }
    }

    /// Returns the idShort of the addressed element (the last segment).
    pub fn id_short(&self) -> &str {
        self.id_short_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.id_short_path)
    }

    /// Iterates the idShort segments in order.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.id_short_path.split('/').filter(|s| !s.is_empty())
    }

    /// Returns the parent path, if the element is nested.
    pub fn parent_path(&self) -> Option<&str> {
        self.id_short_path.rsplit_once('/').map(|(parent, _)| parent)
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.submodel_id, self.id_short_path)
    }
}

// =============================================================================
// Tests
// =============================================================================
