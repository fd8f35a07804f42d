// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Shared fixtures for sync engine integration tests.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use twinlink_core::address::NodeId;
use twinlink_core::error::{OpcUaError, OpcUaResult};
use twinlink_core::retry::BackoffPolicy;
use twinlink_core::variant::Variant;
use twinlink_opcua::pool::PoolSettings;
use twinlink_opcua::transport::{
    DataChange, MonitoredItemRequest, OpcUaTransport, TransportFactory,
};
use twinlink_opcua::types::EndpointSettings;

/// In-memory OPC UA transport with scripted connectivity, recorded writes,
/// and manual data-change emission.
pub struct MockTransport {
    connected: AtomicBool,
    sinks: Mutex<Vec<mpsc::Sender<DataChange>>>,
    writes: Mutex<Vec<(NodeId, Variant)>>,
    next_subscription_id: AtomicU64,
    write_delay: Mutex<Duration>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connected: AtomicBool::new(false),
            sinks: Mutex::new(Vec::new()),
            writes: Mutex::new(Vec::new()),
            next_subscription_id: AtomicU64::new(1),
            write_delay: Mutex::new(Duration::ZERO),
        })
    }

    /// Slows every write down, to force overlapping events in tests.
    pub fn set_write_delay(&self, delay: Duration) {
        *self.write_delay.lock().unwrap() = delay;
    }

    /// Returns how many subscriptions are currently active.
    pub fn subscription_count(&self) -> usize {
        self.sinks.lock().unwrap().len()
    }

    /// Emits a data change to every active subscription sink.
    pub fn emit(&self, node_id: NodeId, value: Variant) {
        for sink in self.sinks.lock().unwrap().iter() {
            let _ = sink.try_send(DataChange::new(node_id.clone(), value.clone()));
        }
    }

    /// Returns the recorded writes.
    pub fn writes(&self) -> Vec<(NodeId, Variant)> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl OpcUaTransport for MockTransport {
    async fn connect(&self) -> OpcUaResult<()> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> OpcUaResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.sinks.lock().unwrap().clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn read_value(&self, _node_id: &NodeId) -> OpcUaResult<Variant> {
        Ok(Variant::Null)
    }

    async fn write_value(&self, node_id: &NodeId, value: Variant) -> OpcUaResult<()> {
        if !self.is_connected() {
            return Err(OpcUaError::NotConnected);
        }
        let delay = *self.write_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.writes.lock().unwrap().push((node_id.clone(), value));
        Ok(())
    }

    async fn create_subscription(
        &self,
        _publishing_interval: Duration,
        sink: mpsc::Sender<DataChange>,
    ) -> OpcUaResult<u32> {
        self.sinks.lock().unwrap().push(sink);
        Ok(self.next_subscription_id.fetch_add(1, Ordering::SeqCst) as u32)
    }

    async fn create_monitored_items(
        &self,
        _subscription_id: u32,
        items: &[MonitoredItemRequest],
    ) -> OpcUaResult<Vec<u32>> {
        Ok((1..=items.len() as u32).collect())
    }

    async fn delete_subscription(&self, _subscription_id: u32) -> OpcUaResult<()> {
        Ok(())
    }
}

/// Pool settings tuned for fast tests.
pub fn fast_pool_settings() -> PoolSettings {
    PoolSettings {
        connect_timeout: Duration::from_millis(200),
        write_timeout: Duration::from_millis(200),
        session_wait_timeout: Duration::from_millis(500),
        keepalive_interval: Duration::from_millis(10),
        backoff: BackoffPolicy {
            initial: Duration::from_millis(10),
            max: Duration::from_millis(50),
            multiplier: 2.0,
            jitter: 0.0,
        },
    }
}

/// Factory cloning one shared mock transport for every endpoint.
pub struct SharedTransportFactory(pub Arc<MockTransport>);

impl TransportFactory for SharedTransportFactory {
    fn create(&self, _endpoint: &EndpointSettings) -> Arc<dyn OpcUaTransport> {
        Arc::clone(&self.0) as Arc<dyn OpcUaTransport>
    }
}

/// Polls `check` until it holds or the deadline passes.
pub async fn wait_for<F: Fn() -> bool>(deadline: Duration, check: F) -> bool {
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}
