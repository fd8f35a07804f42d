// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA connection pool.
//!
//! The pool maintains one session per configured endpoint with automatic
//! reconnect and subscription restoration. Each endpoint gets a supervisor
//! task driving the state machine
//!
//! ```text
//! Disconnected → Connecting → Connected → Faulted → Connecting → …
//!                                  │
//!                              Stopping → Disconnected (terminal)
//! ```
//!
//! Reconnects back off exponentially from 1 s to a 30 s cap with ±25%
//! jitter. Subscriptions submitted through [`ConnectionPool::submit_subscription`]
//! stay registered in memory and are reapplied on every transition back to
//! `Connected`; the subscriber sees at most a brief pause. Sessions never
//! share state between endpoints.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use twinlink_core::address::NodeId;
use twinlink_core::error::{OpcUaError, OpcUaResult};
use twinlink_core::retry::BackoffPolicy;
use twinlink_core::variant::Variant;

use crate::transport::{DataChange, MonitoredItemRequest, OpcUaTransport, TransportFactory};
use crate::types::EndpointSettings;

// =============================================================================
// SessionState
// =============================================================================

/// State of one pooled session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// No connection.
    #[default]
    Disconnected,

    /// Connection attempt in progress.
    Connecting,

    /// Session is active and usable.
    Connected,

    /// Connection lost; a reconnect is pending.
    Faulted,

    /// Pool shutdown in progress.
    Stopping,
}

impl SessionState {
    /// Returns `true` if the session is usable.
    #[inline]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Faulted => write!(f, "Faulted"),
            Self::Stopping => write!(f, "Stopping"),
        }
    }
}

// =============================================================================
// Subscription registration
// =============================================================================

/// A subscription request: monitored items plus the notification sink.
pub struct SubscriptionSpec {
    /// Publishing interval requested from the server.
    pub publishing_interval: Duration,

    /// Nodes to monitor with their sampling settings.
    pub items: Vec<MonitoredItemRequest>,

    /// Channel receiving data-change notifications.
    pub sink: mpsc::Sender<DataChange>,
}

/// Handle identifying a registered subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    /// The endpoint the subscription lives on.
    pub endpoint: String,

    /// Pool-local id, stable across reconnects.
    pub local_id: u64,
}

struct RegisteredSubscription {
    local_id: u64,
    spec: SubscriptionSpec,
    server_id: Option<u32>,
}

// =============================================================================
// PoolSettings
// =============================================================================

/// Tunables for the connection pool.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Deadline for one connect attempt.
    pub connect_timeout: Duration,

    /// Deadline for a single write.
    pub write_timeout: Duration,

    /// Bounded wait for a session in `with_session`/`write_value`.
    pub session_wait_timeout: Duration,

    /// Interval between connectivity probes on an active session.
    pub keepalive_interval: Duration,

    /// Reconnect backoff schedule.
    pub backoff: BackoffPolicy,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(5),
            session_wait_timeout: Duration::from_secs(5),
            keepalive_interval: Duration::from_secs(5),
            backoff: BackoffPolicy::reconnect(),
        }
    }
}

// =============================================================================
// ConnectionPool
// =============================================================================

/// Pool of OPC UA sessions, one per configured endpoint.
pub struct ConnectionPool {
    workers: HashMap<String, Arc<EndpointWorker>>,
    settings: PoolSettings,
    shutdown: broadcast::Sender<()>,
    started: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

struct EndpointWorker {
    settings: EndpointSettings,
    transport: Arc<dyn OpcUaTransport>,
    state_tx: watch::Sender<SessionState>,
    subscriptions: Mutex<Vec<RegisteredSubscription>>,
    next_local_id: AtomicU64,
    reconnects: AtomicU64,
    first_connect: Mutex<Option<oneshot::Sender<OpcUaResult<()>>>>,
}

impl ConnectionPool {
    /// Creates a pool over the given endpoints. Transports are built
    /// eagerly; connections are made by [`ConnectionPool::start`].
    pub fn new(
        endpoints: Vec<EndpointSettings>,
        factory: &dyn TransportFactory,
        settings: PoolSettings,
    ) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        let workers = endpoints
            .into_iter()
            .map(|endpoint| {
                let (state_tx, _) = watch::channel(SessionState::Disconnected);
                let worker = Arc::new(EndpointWorker {
                    transport: factory.create(&endpoint),
                    settings: endpoint,
                    state_tx,
                    subscriptions: Mutex::new(Vec::new()),
                    next_local_id: AtomicU64::new(1),
                    reconnects: AtomicU64::new(0),
                    first_connect: Mutex::new(None),
                });
                (worker.settings.name.clone(), worker)
            })
            .collect();

        Self {
            workers,
            settings,
            shutdown,
            started: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Starts all endpoint supervisors and waits for the first connect
    /// attempt of every endpoint.
    ///
    /// Only an authentication failure is fatal here; other failures leave
    /// the supervisor retrying in the background.
    pub async fn start(&self) -> OpcUaResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut first_results = Vec::new();
        let mut tasks = self.tasks.lock().await;
        for worker in self.workers.values() {
            let (tx, rx) = oneshot::channel();
            *worker.first_connect.lock().await = Some(tx);
            first_results.push((worker.settings.name.clone(), rx));

            let worker = Arc::clone(worker);
            let settings = self.settings.clone();
            let shutdown = self.shutdown.subscribe();
            tasks.push(tokio::spawn(async move {
                run_endpoint(worker, settings, shutdown).await;
            }));
        }
        drop(tasks);

        for (endpoint, rx) in first_results {
            match rx.await {
                Ok(Err(e)) if e.is_auth() => return Err(e),
                Ok(Err(e)) => {
                    warn!(endpoint = %endpoint, error = %e, "Initial connect failed, retrying in background");
                }
                Ok(Ok(())) => {}
                Err(_) => {
                    // Supervisor exited before reporting; shutdown raced start.
                    warn!(endpoint = %endpoint, "Supervisor exited during startup");
                }
            }
        }
        Ok(())
    }

    /// Runs `f` against a connected session's transport.
    ///
    /// Waits up to the configured bounded timeout for the session to become
    /// ready; returns `Unavailable` otherwise.
    pub async fn with_session<T, F, Fut>(&self, endpoint: &str, f: F) -> OpcUaResult<T>
    where
        F: FnOnce(Arc<dyn OpcUaTransport>) -> Fut,
        Fut: Future<Output = OpcUaResult<T>>,
    {
        let worker = self.worker(endpoint)?;
        worker
            .wait_connected(self.settings.session_wait_timeout)
            .await?;
        f(Arc::clone(&worker.transport)).await
    }

    /// Registers a subscription.
    ///
    /// The spec stays registered in memory; the pool applies it now when the
    /// session is connected, and reapplies it after every reconnect.
    pub async fn submit_subscription(
        &self,
        endpoint: &str,
        spec: SubscriptionSpec,
    ) -> OpcUaResult<SubscriptionHandle> {
        let worker = self.worker(endpoint)?;
        let local_id = worker.next_local_id.fetch_add(1, Ordering::SeqCst);

        let mut registered = RegisteredSubscription {
            local_id,
            spec,
            server_id: None,
        };

        if worker.state().is_connected() {
            match apply_subscription(&worker.transport, &registered.spec).await {
                Ok(server_id) => registered.server_id = Some(server_id),
                Err(e) => {
                    // The supervisor will apply it after the next reconnect.
                    warn!(endpoint = %endpoint, error = %e, "Deferred subscription to next reconnect");
                }
            }
        }

        worker.subscriptions.lock().await.push(registered);
        info!(endpoint = %endpoint, local_id, "Subscription registered");

        Ok(SubscriptionHandle {
            endpoint: endpoint.to_string(),
            local_id,
        })
    }

    /// Writes a value to a node, optionally under a caller identity.
    ///
    /// Returns `Unavailable` when the session is not connected, `Timeout`
    /// when the write deadline passes, and the service fault otherwise.
    pub async fn write_value(
        &self,
        endpoint: &str,
        node_id: &NodeId,
        value: Variant,
        user: Option<&str>,
    ) -> OpcUaResult<()> {
        let worker = self.worker(endpoint)?;
        if !worker.state().is_connected() {
            return Err(OpcUaError::unavailable(endpoint));
        }

        let transport = Arc::clone(&worker.transport);
        let deadline = self.settings.write_timeout;
        let write = async {
            match user {
                Some(user) if transport.supports_user_identity() => {
                    transport.write_value_as(node_id, value, user).await
                }
                Some(user) => {
                    debug!(
                        endpoint = %endpoint,
                        user = %user,
                        "Per-call identity not supported by transport, using session identity"
                    );
                    transport.write_value(node_id, value).await
                }
                None => transport.write_value(node_id, value).await,
            }
        };

        match tokio::time::timeout(deadline, write).await {
            Ok(result) => result,
            Err(_) => Err(OpcUaError::timeout(deadline)),
        }
    }

    /// Returns the current state of an endpoint's session.
    pub fn state(&self, endpoint: &str) -> Option<SessionState> {
        self.workers.get(endpoint).map(|w| w.state())
    }

    /// Returns `true` when every endpoint session is connected.
    pub fn all_connected(&self) -> bool {
        self.workers.values().all(|w| w.state().is_connected())
    }

    /// Returns how many times an endpoint has reconnected.
    pub fn reconnect_count(&self, endpoint: &str) -> u64 {
        self.workers
            .get(endpoint)
            .map(|w| w.reconnects.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Subscribes to an endpoint's state transitions.
    pub fn watch_state(&self, endpoint: &str) -> Option<watch::Receiver<SessionState>> {
        self.workers.get(endpoint).map(|w| w.state_tx.subscribe())
    }

    /// Drains all sessions: closes subscriptions, disconnects, and stops
    /// the supervisors.
    pub async fn stop(&self) {
        for worker in self.workers.values() {
            worker.set_state(SessionState::Stopping);
        }
        let _ = self.shutdown.send(());

        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            let _ = task.await;
        }
        info!("Connection pool stopped");
    }

    fn worker(&self, endpoint: &str) -> OpcUaResult<&Arc<EndpointWorker>> {
        self.workers
            .get(endpoint)
            .ok_or_else(|| OpcUaError::unavailable(endpoint))
    }
}

impl EndpointWorker {
    fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, new_state: SessionState) {
        let old_state = self.state();
        if old_state != new_state {
            debug!(
                endpoint = %self.settings.name,
                old_state = %old_state,
                new_state = %new_state,
                "Session state changed"
            );
            let _ = self.state_tx.send(new_state);
        }
    }

    async fn wait_connected(&self, timeout: Duration) -> OpcUaResult<()> {
        let mut rx = self.state_tx.subscribe();
        let wait = async {
            loop {
                if rx.borrow().is_connected() {
                    return Ok(());
                }
                if rx.changed().await.is_err() {
                    return Err(OpcUaError::unavailable(&self.settings.name));
                }
            }
        };
        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(OpcUaError::unavailable(&self.settings.name)),
        }
    }

    async fn report_first_connect(&self, result: OpcUaResult<()>) {
        if let Some(tx) = self.first_connect.lock().await.take() {
            let _ = tx.send(result);
        }
    }

    /// Recreates every registered subscription on a fresh session. The old
    /// server-side ids died with the previous session.
    async fn reapply_subscriptions(&self) -> OpcUaResult<()> {
        let mut subscriptions = self.subscriptions.lock().await;
        for registered in subscriptions.iter_mut() {
            registered.server_id = None;
        }
        for registered in subscriptions.iter_mut() {
            let server_id = apply_subscription(&self.transport, &registered.spec).await?;
            registered.server_id = Some(server_id);
        }
        if !subscriptions.is_empty() {
            info!(
                endpoint = %self.settings.name,
                count = subscriptions.len(),
                "Subscriptions restored"
            );
        }
        Ok(())
    }

    /// Applies subscriptions registered while the state flip to `Connected`
    /// was still in flight.
    async fn apply_pending_subscriptions(&self) -> OpcUaResult<()> {
        let mut subscriptions = self.subscriptions.lock().await;
        for registered in subscriptions.iter_mut() {
            if registered.server_id.is_none() {
                let server_id = apply_subscription(&self.transport, &registered.spec).await?;
                registered.server_id = Some(server_id);
                info!(
                    endpoint = %self.settings.name,
                    local_id = registered.local_id,
                    "Pending subscription applied"
                );
            }
        }
        Ok(())
    }
}

async fn apply_subscription(
    transport: &Arc<dyn OpcUaTransport>,
    spec: &SubscriptionSpec,
) -> OpcUaResult<u32> {
    let server_id = transport
        .create_subscription(spec.publishing_interval, spec.sink.clone())
        .await?;
    transport
        .create_monitored_items(server_id, &spec.items)
        .await?;
    Ok(server_id)
}

async fn run_endpoint(
    worker: Arc<EndpointWorker>,
    settings: PoolSettings,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut attempt: u32 = 0;
    let mut first_attempt_pending = true;

    'supervisor: loop {
        if worker.state() == SessionState::Stopping {
            break;
        }
        worker.set_state(SessionState::Connecting);

        let connected = match tokio::time::timeout(
            settings.connect_timeout,
            worker.transport.connect(),
        )
        .await
        {
            Ok(Ok(())) => match worker.reapply_subscriptions().await {
                Ok(()) => Ok(()),
                Err(e) => {
                    let _ = worker.transport.disconnect().await;
                    Err(e)
                }
            },
            Ok(Err(e)) => Err(e),
            Err(_) => Err(OpcUaError::timeout(settings.connect_timeout)),
        };

        if first_attempt_pending {
            first_attempt_pending = false;
            let report = match &connected {
                Ok(()) => Ok(()),
                Err(e) if e.is_auth() => {
                    Err(OpcUaError::auth_failed(&worker.settings.name, e.to_string()))
                }
                Err(e) => Err(OpcUaError::connection_failed(
                    &worker.settings.name,
                    e.to_string(),
                )),
            };
            worker.report_first_connect(report).await;
        }

        match connected {
            Ok(()) => {
                attempt = 0;
                worker.set_state(SessionState::Connected);

                // Supervise the live session until it drops or we stop.
                loop {
                    tokio::select! {
                        _ = shutdown.recv() => {
                            worker.set_state(SessionState::Stopping);
                            break 'supervisor;
                        }
                        _ = tokio::time::sleep(settings.keepalive_interval) => {
                            if !worker.transport.is_connected() {
                                break;
                            }
                            if let Err(e) = worker.apply_pending_subscriptions().await {
                                warn!(endpoint = %worker.settings.name, error = %e, "Applying pending subscription failed");
                                break;
                            }
                        }
                    }
                }

                warn!(endpoint = %worker.settings.name, "Session lost, scheduling reconnect");
                worker.set_state(SessionState::Faulted);
                worker.reconnects.fetch_add(1, Ordering::Relaxed);
                let _ = worker.transport.disconnect().await;
            }
            Err(e) => {
                warn!(endpoint = %worker.settings.name, error = %e, "Connect attempt failed");
                worker.set_state(SessionState::Faulted);
            }
        }

        let delay = settings.backoff.delay(attempt);
        attempt = attempt.saturating_add(1);
        tokio::select! {
            _ = shutdown.recv() => {
                worker.set_state(SessionState::Stopping);
                break;
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }

    let _ = worker.transport.disconnect().await;
    worker.set_state(SessionState::Disconnected);
    debug!(endpoint = %worker.settings.name, "Supervisor exited");
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    /// In-memory transport: scripted connects, recorded writes, and
    /// manually emitted data changes.
    struct MockTransport {
        connected: AtomicBool,
        fail_connects: AtomicU64,
        sinks: StdMutex<Vec<mpsc::Sender<DataChange>>>,
        items: StdMutex<Vec<MonitoredItemRequest>>,
        writes: StdMutex<Vec<(NodeId, Variant)>>,
        subscriptions_created: AtomicU64,
        next_subscription_id: AtomicU64,
    }

    impl MockTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                connected: AtomicBool::new(false),
                fail_connects: AtomicU64::new(0),
                sinks: StdMutex::new(Vec::new()),
                items: StdMutex::new(Vec::new()),
                writes: StdMutex::new(Vec::new()),
                subscriptions_created: AtomicU64::new(0),
                next_subscription_id: AtomicU64::new(1),
            })
        }

        fn kill(&self) {
            self.connected.store(false, Ordering::SeqCst);
            self.sinks.lock().unwrap().clear();
        }

        fn emit(&self, node_id: NodeId, value: Variant) {
            for sink in self.sinks.lock().unwrap().iter() {
                let _ = sink.try_send(DataChange::new(node_id.clone(), value.clone()));
            }
        }
    }

    #[async_trait]
    impl OpcUaTransport for MockTransport {
        async fn connect(&self) -> OpcUaResult<()> {
            if self.fail_connects.load(Ordering::SeqCst) > 0 {
                self.fail_connects.fetch_sub(1, Ordering::SeqCst);
                return Err(OpcUaError::connection_failed("mock", "scripted failure"));
            }
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn disconnect(&self) -> OpcUaResult<()> {
            self.connected.store(false, Ordering::SeqCst);
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
            self.writes.lock().unwrap().push((node_id.clone(), value));
            Ok(())
        }

        async fn create_subscription(
            &self,
            _publishing_interval: Duration,
            sink: mpsc::Sender<DataChange>,
        ) -> OpcUaResult<u32> {
            self.sinks.lock().unwrap().push(sink);
            self.subscriptions_created.fetch_add(1, Ordering::SeqCst);
            Ok(self.next_subscription_id.fetch_add(1, Ordering::SeqCst) as u32)
        }

        async fn create_monitored_items(
            &self,
            _subscription_id: u32,
            items: &[MonitoredItemRequest],
        ) -> OpcUaResult<Vec<u32>> {
            let mut stored = self.items.lock().unwrap();
            stored.extend(items.iter().cloned());
            Ok((1..=items.len() as u32).collect())
        }

        async fn delete_subscription(&self, _subscription_id: u32) -> OpcUaResult<()> {
            Ok(())
        }
    }

    fn fast_settings() -> PoolSettings {
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

    struct MockFactory(Arc<MockTransport>);

    impl TransportFactory for MockFactory {
        fn create(&self, _endpoint: &EndpointSettings) -> Arc<dyn OpcUaTransport> {
            Arc::clone(&self.0) as Arc<dyn OpcUaTransport>
        }
    }

    fn pool_with(transport: Arc<MockTransport>) -> ConnectionPool {
        ConnectionPool::new(
            vec![EndpointSettings::insecure("plant", "opc.tcp://localhost:4840")],
            &MockFactory(transport),
            fast_settings(),
        )
    }

    async fn wait_for<F: Fn() -> bool>(deadline: Duration, check: F) -> bool {
        let start = tokio::time::Instant::now();
        while start.elapsed() < deadline {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_start_connects_endpoint() {
        let transport = MockTransport::new();
        let pool = pool_with(Arc::clone(&transport));

        pool.start().await.unwrap();
        assert!(
            wait_for(Duration::from_secs(1), || pool.all_connected()).await,
            "endpoint should connect"
        );

        pool.stop().await;
        assert_eq!(pool.state("plant"), Some(SessionState::Disconnected));
    }

    #[tokio::test]
    async fn test_write_when_disconnected_is_unavailable() {
        let transport = MockTransport::new();
        transport.fail_connects.store(1000, Ordering::SeqCst);
        let pool = pool_with(Arc::clone(&transport));
        pool.start().await.unwrap();

        let result = pool
            .write_value("plant", &NodeId::string(2, "X"), Variant::Double(1.0), None)
            .await;
        assert!(matches!(result, Err(OpcUaError::Unavailable { .. })));

        pool.stop().await;
    }

    #[tokio::test]
    async fn test_unknown_endpoint() {
        let transport = MockTransport::new();
        let pool = pool_with(transport);
        let result = pool
            .write_value("nowhere", &NodeId::string(2, "X"), Variant::Double(1.0), None)
            .await;
        assert!(matches!(result, Err(OpcUaError::Unavailable { .. })));
    }

    #[tokio::test]
    async fn test_reconnect_restores_subscription() {
        let transport = MockTransport::new();
        let pool = pool_with(Arc::clone(&transport));
        pool.start().await.unwrap();
        assert!(wait_for(Duration::from_secs(1), || pool.all_connected()).await);

        let (tx, mut rx) = mpsc::channel(16);
        pool.submit_subscription(
            "plant",
            SubscriptionSpec {
                publishing_interval: Duration::from_millis(100),
                items: vec![MonitoredItemRequest {
                    node_id: NodeId::string(2, "Temperature"),
                    sampling_interval: Duration::from_millis(100),
                    queue_size: 10,
                }],
                sink: tx,
            },
        )
        .await
        .unwrap();

        // Notifications flow before the outage.
        transport.emit(NodeId::string(2, "Temperature"), Variant::Double(42.0));
        let change = rx.recv().await.unwrap();
        assert_eq!(change.value, Variant::Double(42.0));

        // Drop the connection; the supervisor must notice and reconnect.
        let subs_before = transport.subscriptions_created.load(Ordering::SeqCst);
        transport.kill();
        assert!(
            wait_for(Duration::from_secs(2), || {
                pool.all_connected()
                    && transport.subscriptions_created.load(Ordering::SeqCst) > subs_before
            })
            .await,
            "subscription should be restored after reconnect"
        );
        assert!(pool.reconnect_count("plant") >= 1);

        // No external re-subscribe call, yet notifications flow again.
        transport.emit(NodeId::string(2, "Temperature"), Variant::Double(23.5));
        let change = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("notification after reconnect")
            .unwrap();
        assert_eq!(change.value, Variant::Double(23.5));

        pool.stop().await;
    }

    #[tokio::test]
    async fn test_with_session_waits_bounded() {
        let transport = MockTransport::new();
        transport.fail_connects.store(1000, Ordering::SeqCst);
        let pool = pool_with(Arc::clone(&transport));
        pool.start().await.unwrap();

        let result = pool
            .with_session("plant", |t| async move { t.read_value(&NodeId::string(2, "X")).await })
            .await;
        assert!(matches!(result, Err(OpcUaError::Unavailable { .. })));

        pool.stop().await;
    }

    #[tokio::test]
    async fn test_write_passes_through_when_connected() {
        let transport = MockTransport::new();
        let pool = pool_with(Arc::clone(&transport));
        pool.start().await.unwrap();
        assert!(wait_for(Duration::from_secs(1), || pool.all_connected()).await);

        pool.write_value("plant", &NodeId::string(2, "Setpoint"), Variant::Double(55.0), Some("alice"))
            .await
            .unwrap();

        let writes = transport.writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].1, Variant::Double(55.0));
        drop(writes);

        pool.stop().await;
    }
}
