// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Last observed value per OPC UA node.
//!
//! The Monitor records every successfully decoded sample here; the
//! Controller reads it to fill the `prior_value` of audit records.

use std::collections::HashMap;
use std::sync::Mutex;

use twinlink_core::address::NodeRef;
use twinlink_core::xsd::XsdValue;

/// Shared node → last value map.
#[derive(Debug, Default)]
pub struct NodeValueCache {
    values: Mutex<HashMap<NodeRef, XsdValue>>,
}

impl NodeValueCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the latest decoded value for a node.
    pub fn note(&self, node: &NodeRef, value: XsdValue) {
        self.values
            .lock()
            .expect("node value cache poisoned")
            .insert(node.clone(), value);
    }

    /// Returns the last observed value for a node.
    pub fn get(&self, node: &NodeRef) -> Option<XsdValue> {
        self.values
            .lock()
            .expect("node value cache poisoned")
            .get(node)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use twinlink_core::address::NodeId;

    #[test]
    fn test_note_and_get() {
        let cache = NodeValueCache::new();
        let node = NodeRef::new("plant", NodeId::string(2, "Temperature"));

        assert!(cache.get(&node).is_none());
        cache.note(&node, XsdValue::Double(42.0));
        assert_eq!(cache.get(&node), Some(XsdValue::Double(42.0)));

        cache.note(&node, XsdValue::Double(43.0));
        assert_eq!(cache.get(&node), Some(XsdValue::Double(43.0)));
    }
}
