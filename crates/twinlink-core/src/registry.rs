// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Mapping registry: the pre-validated, immutable binding table between
//! OPC UA nodes and AAS submodel elements.
//!
//! The registry is built once at bridge start from configuration and is
//! read-only afterwards; the Monitor and Controller share it freely.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::address::{ElementRef, NodeRef};
use crate::error::{ConfigError, ConfigResult};
use crate::xsd::XsdType;

/// Default sampling interval for monitored items.
pub const DEFAULT_SAMPLING_INTERVAL: Duration = Duration::from_millis(100);

/// Default monitored item queue size.
pub const DEFAULT_QUEUE_SIZE: u32 = 10;

// =============================================================================
// Direction
// =============================================================================

/// Synchronization direction for a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// OPC UA → AAS only.
    OpcuaToAas,

    /// AAS → OPC UA only.
    AasToOpcua,

    /// Both directions.
    #[default]
    Bidirectional,
}

impl Direction {
    /// Returns `true` if OPC UA changes flow to the AAS side.
    #[inline]
    pub const fn includes_opcua_to_aas(&self) -> bool {
        matches!(self, Self::OpcuaToAas | Self::Bidirectional)
    }

    /// Returns `true` if AAS changes flow to the OPC UA side.
    #[inline]
    pub const fn includes_aas_to_opcua(&self) -> bool {
        matches!(self, Self::AasToOpcua | Self::Bidirectional)
    }
}

// =============================================================================
// ValueRange
// =============================================================================

/// Inclusive numeric range constraint for validated writes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    /// Inclusive lower bound.
    pub min: f64,

    /// Inclusive upper bound.
    pub max: f64,
}

impl ValueRange {
    /// Creates a range, returning an error when `min > max`.
    pub fn new(min: f64, max: f64) -> ConfigResult<Self> {
        if min > max {
            return Err(ConfigError::validation(
                "range",
                format!("min {} must be <= max {}", min, max),
            ));
        }
        Ok(Self { min, max })
    }

    /// Returns `true` if the value lies within the range.
    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

// =============================================================================
// Mapping
// =============================================================================

/// A binding between an OPC UA node and an AAS submodel element.
///
/// Created at bridge start and immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mapping {
    /// The OPC UA side of the binding.
    pub node: NodeRef,

    /// The AAS side of the binding.
    pub element: ElementRef,

    /// The XSD type both endpoints must be coercible to.
    pub value_type: XsdType,

    /// Synchronization direction.
    pub direction: Direction,

    /// Optional declared value range, enforced after coercion.
    pub range: Option<ValueRange>,

    /// Sampling interval for the monitored item.
    #[serde(with = "duration_millis")]
    pub sampling_interval: Duration,

    /// Monitored item queue size.
    pub queue_size: u32,

    /// Whether null values are accepted for this element.
    pub nullable: bool,
}

impl Mapping {
    /// Creates a mapping with default sampling settings.
    pub fn new(node: NodeRef, element: ElementRef, value_type: XsdType) -> Self {
        Self {
            node,
            element,
            value_type,
            direction: Direction::Bidirectional,
            range: None,
            sampling_interval: DEFAULT_SAMPLING_INTERVAL,
            queue_size: DEFAULT_QUEUE_SIZE,
            nullable: false,
        }
    }

    /// Sets the direction.
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Sets the declared range.
    pub fn with_range(mut self, range: ValueRange) -> Self {
        self.range = Some(range);
        self
    }

    /// Sets the sampling interval.
    pub fn with_sampling_interval(mut self, interval: Duration) -> Self {
        self.sampling_interval = interval;
        self
    }

    /// Sets the queue size.
    pub fn with_queue_size(mut self, queue_size: u32) -> Self {
        self.queue_size = queue_size;
        self
    }

    /// Marks the mapping as nullable.
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }
}

// Durations serialize as milliseconds in mapping dumps.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

// =============================================================================
// MappingRegistry
// =============================================================================

/// Immutable lookup over all configured mappings.
///
/// Two indices: node → mapping and element → mapping. Duplicate keys on
/// either index are rejected at build time; there is no mutation path.
#[derive(Debug)]
pub struct MappingRegistry {
    by_node: HashMap<NodeRef, Arc<Mapping>>,
    by_element: HashMap<ElementRef, Arc<Mapping>>,
    endpoints: Vec<String>,
}

impl MappingRegistry {
    /// Builds the registry, validating uniqueness of both indices.
    pub fn new(mappings: Vec<Mapping>) -> ConfigResult<Self> {
        let mut by_node = HashMap::with_capacity(mappings.len());
        let mut by_element = HashMap::with_capacity(mappings.len());
        let mut endpoints: Vec<String> = Vec::new();

        for mapping in mappings {
            let mapping = Arc::new(mapping);

            if by_node
                .insert(mapping.node.clone(), Arc::clone(&mapping))
                .is_some()
            {
                return Err(ConfigError::duplicate_mapping(mapping.node.to_string()));
            }
            if by_element
                .insert(mapping.element.clone(), Arc::clone(&mapping))
                .is_some()
            {
                return Err(ConfigError::duplicate_mapping(mapping.element.to_string()));
            }
            if !endpoints.contains(&mapping.node.endpoint) {
                endpoints.push(mapping.node.endpoint.clone());
            }
        }

        Ok(Self {
            by_node,
            by_element,
            endpoints,
        })
    }

    /// Looks up the mapping for an OPC UA node.
    pub fn by_node(&self, node: &NodeRef) -> Option<&Arc<Mapping>> {
        self.by_node.get(node)
    }

    /// Looks up the mapping for an AAS element.
    pub fn by_element(&self, element: &ElementRef) -> Option<&Arc<Mapping>> {
        self.by_element.get(element)
    }

    /// Returns every endpoint named by at least one mapping.
    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Returns the mappings on an endpoint whose direction includes
    /// OPC UA → AAS flow (the Monitor's subscription set).
    pub fn outbound_for_endpoint(&self, endpoint: &str) -> Vec<Arc<Mapping>> {
        let mut mappings: Vec<Arc<Mapping>> = self
            .by_node
            .values()
            .filter(|m| m.node.endpoint == endpoint && m.direction.includes_opcua_to_aas())
            .cloned()
            .collect();
        mappings.sort_by(|a, b| a.node.node_id.to_opc_string().cmp(&b.node.node_id.to_opc_string()));
        mappings
    }

    /// Iterates all mappings.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Mapping>> {
        self.by_node.values()
    }

    /// Returns the number of mappings.
    pub fn len(&self) -> usize {
        self.by_node.len()
    }

    /// Returns `true` if the registry holds no mappings.
    pub fn is_empty(&self) -> bool {
        self.by_node.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::NodeId;

    fn mapping(node: &str, element: &str) -> Mapping {
        Mapping::new(
            NodeRef::new("plant", NodeId::string(2, node)),
            ElementRef::new("urn:sm:sensors", element),
            XsdType::Double,
        )
    }

    #[test]
    fn test_registry_lookup() {
        let registry = MappingRegistry::new(vec![
            mapping("Temperature", "Temperature"),
            mapping("Pressure", "Pressure"),
        ])
        .unwrap();

        assert_eq!(registry.len(), 2);
        let node = NodeRef::new("plant", NodeId::string(2, "Temperature"));
        let found = registry.by_node(&node).unwrap();
        assert_eq!(found.element.id_short_path, "Temperature");

        let element = ElementRef::new("urn:sm:sensors", "Pressure");
        let found = registry.by_element(&element).unwrap();
        assert_eq!(found.node.node_id.to_opc_string(), "ns=2;s=Pressure");
    }

    #[test]
    fn test_registry_rejects_duplicate_node() {
        let result = MappingRegistry::new(vec![
            mapping("Temperature", "A"),
            mapping("Temperature", "B"),
        ]);
        assert!(matches!(result, Err(ConfigError::DuplicateMapping { .. })));
    }

    #[test]
    fn test_registry_rejects_duplicate_element() {
        let result = MappingRegistry::new(vec![mapping("A", "Same"), mapping("B", "Same")]);
        assert!(matches!(result, Err(ConfigError::DuplicateMapping { .. })));
    }

    #[test]
    fn test_outbound_filter() {
        let registry = MappingRegistry::new(vec![
            mapping("A", "A").with_direction(Direction::OpcuaToAas),
            mapping("B", "B").with_direction(Direction::AasToOpcua),
            mapping("C", "C").with_direction(Direction::Bidirectional),
        ])
        .unwrap();

        let outbound = registry.outbound_for_endpoint("plant");
        let names: Vec<String> = outbound
            .iter()
            .map(|m| m.element.id_short_path.clone())
            .collect();
        assert_eq!(names, vec!["A", "C"]);
        assert!(registry.outbound_for_endpoint("other").is_empty());
    }

    #[test]
    fn test_value_range() {
        let range = ValueRange::new(0.0, 100.0).unwrap();
        assert!(range.contains(0.0));
        assert!(range.contains(100.0));
        assert!(!range.contains(100.1));
        assert!(ValueRange::new(10.0, 0.0).is_err());
    }

    #[test]
    fn test_direction_flags() {
        assert!(Direction::Bidirectional.includes_opcua_to_aas());
        assert!(Direction::Bidirectional.includes_aas_to_opcua());
        assert!(Direction::OpcuaToAas.includes_opcua_to_aas());
        assert!(!Direction::OpcuaToAas.includes_aas_to_opcua());
        assert!(!Direction::AasToOpcua.includes_opcua_to_aas());
    }
}
