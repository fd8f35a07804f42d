// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA transport abstraction.
//!
//! [`OpcUaTransport`] is the seam between the connection pool and the wire.
//! The production implementation wraps the `opcua` crate; tests drive the
//! pool and the sync pipeline through in-memory implementations.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use twinlink_core::address::NodeId;
use twinlink_core::error::OpcUaResult;
use twinlink_core::variant::Variant;

use crate::types::EndpointSettings;

// =============================================================================
// DataChange
// =============================================================================

/// A data-change notification delivered by a subscription.
#[derive(Debug, Clone)]
pub struct DataChange {
    /// The node that changed.
    pub node_id: NodeId,

    /// The new value.
    pub value: Variant,

    /// Source timestamp reported by the server, when available.
    pub source_timestamp: Option<DateTime<Utc>>,
}

impl DataChange {
    /// Creates a notification without a source timestamp.
    pub fn new(node_id: NodeId, value: Variant) -> Self {
        Self {
            node_id,
            value,
            source_timestamp: None,
        }
    }
}

// =============================================================================
// MonitoredItemRequest
// =============================================================================

/// Request to monitor one node within a subscription.
#[derive(Debug, Clone)]
pub struct MonitoredItemRequest {
    /// The node to monitor.
    pub node_id: NodeId,

    /// Requested sampling interval.
    pub sampling_interval: Duration,

    /// Requested queue size.
    pub queue_size: u32,
}

// =============================================================================
// OpcUaTransport
// =============================================================================

/// Abstract transport for one OPC UA endpoint.
///
/// Implementations must be `Send + Sync`; the pool shares them across its
/// supervisor task and callers of `write_value`/`with_session`.
#[async_trait]
pub trait OpcUaTransport: Send + Sync {
    /// Establishes the connection and activates the session.
    async fn connect(&self) -> OpcUaResult<()>;

    /// Closes the session, dropping server-side subscriptions.
    async fn disconnect(&self) -> OpcUaResult<()>;

    /// Returns `true` while the session is usable.
    fn is_connected(&self) -> bool;

    /// Reads a node's value attribute.
    async fn read_value(&self, node_id: &NodeId) -> OpcUaResult<Variant>;

    /// Writes a node's value attribute under the session identity.
    async fn write_value(&self, node_id: &NodeId, value: Variant) -> OpcUaResult<()>;

    /// Returns `true` when the transport can execute a write under a
    /// caller-supplied user identity. Most stacks activate the session
    /// once and cannot switch identity per call.
    fn supports_user_identity(&self) -> bool {
        false
    }

    /// Writes under the given user identity. The default implementation
    /// falls back to the session identity.
    async fn write_value_as(
        &self,
        node_id: &NodeId,
        value: Variant,
        _user: &str,
    ) -> OpcUaResult<()> {
        self.write_value(node_id, value).await
    }

    /// Creates a subscription whose data changes are forwarded into `sink`.
    ///
    /// Senders must not block the notification path: implementations use
    /// `try_send` and count drops when the sink is full (drop-newest).
    async fn create_subscription(
        &self,
        publishing_interval: Duration,
        sink: mpsc::Sender<DataChange>,
    ) -> OpcUaResult<u32>;

    /// Adds monitored items to a subscription, returning server item ids.
    async fn create_monitored_items(
        &self,
        subscription_id: u32,
        items: &[MonitoredItemRequest],
    ) -> OpcUaResult<Vec<u32>>;

    /// Deletes a subscription.
    async fn delete_subscription(&self, subscription_id: u32) -> OpcUaResult<()>;
}

// =============================================================================
// TransportFactory
// =============================================================================

/// Creates one transport per configured endpoint.
pub trait TransportFactory: Send + Sync {
    /// Builds the transport for an endpoint.
    fn create(&self, endpoint: &EndpointSettings) -> Arc<dyn OpcUaTransport>;
}
