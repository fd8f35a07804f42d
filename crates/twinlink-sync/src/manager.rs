// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Sync manager: lifecycle orchestration.
//!
//! Start order: mapping registry → AAS repository probe → connection pool →
//! monitor and controller (plus event ingress or polling). Stop reverses
//! the order, giving each step a bounded grace period before forced
//! cancellation. Health is `ready` when every endpoint session is connected
//! and the repository answered a probe within `2 × poll_interval`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use twinlink_aas::client::AasRepository;
use twinlink_aas::events::{AasEventSource, ElementChanged};
use twinlink_aas::poller::ValuePoller;
use twinlink_core::audit::AuditSink;
use twinlink_core::dedup::SuppressionCache;
use twinlink_core::error::{AasError, BridgeError, BridgeResult};
use twinlink_core::registry::MappingRegistry;
use twinlink_opcua::pool::{ConnectionPool, SessionState};

use crate::cache::NodeValueCache;
use crate::controller::{Controller, ControllerStats};
use crate::monitor::{Monitor, MonitorSettings, MonitorStats};

// =============================================================================
// Settings & health
// =============================================================================

/// Sync manager tunables.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// REST worker pool size.
    pub rest_workers: usize,

    /// Bounded queue capacity between stages.
    pub queue_capacity: usize,

    /// Grace period for orderly shutdown.
    pub shutdown_grace: Duration,

    /// Polling fallback period; also bounds probe freshness.
    pub poll_interval: Duration,

    /// Create missing submodels on first use.
    pub auto_create_submodels: bool,

    /// Create missing elements on first use.
    pub auto_create_elements: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            rest_workers: 4,
            queue_capacity: 1024,
            shutdown_grace: Duration::from_secs(5),
            poll_interval: Duration::from_secs(5),
            auto_create_submodels: false,
            auto_create_elements: false,
        }
    }
}

/// A point-in-time health snapshot.
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// All endpoints connected and the repository probe is fresh.
    pub ready: bool,

    /// Per-endpoint session states.
    pub endpoints: Vec<(String, SessionState)>,

    /// Whether the repository answered within `2 × poll_interval`.
    pub aas_fresh: bool,
}

// =============================================================================
// SyncManager
// =============================================================================

/// Owns the lifecycle of the whole sync engine.
pub struct SyncManager {
    registry: Arc<MappingRegistry>,
    pool: Arc<ConnectionPool>,
    repository: Arc<dyn AasRepository>,
    event_source: Option<AasEventSource>,
    audit: Arc<dyn AuditSink>,
    suppression: Arc<SuppressionCache>,
    node_values: Arc<NodeValueCache>,
    settings: SyncSettings,
    shutdown: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
    monitor_stats: Option<Arc<MonitorStats>>,
    controller_stats: Option<Arc<ControllerStats>>,
}

impl SyncManager {
    /// Creates the manager. `event_source` enables MQTT ingress; when
    /// absent the polling fallback drives the AAS → OPC UA flow.
    pub fn new(
        registry: Arc<MappingRegistry>,
        pool: Arc<ConnectionPool>,
        repository: Arc<dyn AasRepository>,
        event_source: Option<AasEventSource>,
        audit: Arc<dyn AuditSink>,
        suppression: Arc<SuppressionCache>,
        settings: SyncSettings,
    ) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            registry,
            pool,
            repository,
            event_source,
            audit,
            suppression,
            node_values: Arc::new(NodeValueCache::new()),
            settings,
            shutdown,
            tasks: Vec::new(),
            monitor_stats: None,
            controller_stats: None,
        }
    }

    /// Starts every component in order.
    pub async fn start(&mut self) -> BridgeResult<()> {
        info!(
            mappings = self.registry.len(),
            endpoints = self.registry.endpoints().len(),
            "Starting sync engine"
        );

        // 1. AAS repository: a failed probe is only fatal when it is an
        //    authentication rejection.
        match self.repository.probe().await {
            Ok(()) => {}
            Err(e @ AasError::Auth { .. }) => return Err(BridgeError::Aas(e)),
            Err(e) => {
                warn!(error = %e, "AAS repository not reachable yet, continuing startup");
            }
        }

        // 2. OPC UA connection pool (auth failures abort startup).
        self.pool.start().await.map_err(BridgeError::OpcUa)?;

        // 3. Monitor (OPC UA → AAS).
        let monitor = Monitor::new(
            Arc::clone(&self.pool),
            Arc::clone(&self.registry),
            Arc::clone(&self.repository),
            Arc::clone(&self.suppression),
            Arc::clone(&self.node_values),
            MonitorSettings {
                rest_workers: self.settings.rest_workers,
                queue_capacity: self.settings.queue_capacity,
                auto_create_submodels: self.settings.auto_create_submodels,
                auto_create_elements: self.settings.auto_create_elements,
            },
        );
        self.monitor_stats = Some(monitor.stats());
        self.tasks
            .extend(monitor.start(&self.shutdown).await.map_err(BridgeError::OpcUa)?);

        // 4. Controller (AAS → OPC UA) fed by events or polling; when
        //    MQTT ingress is configured, polling stays off.
        let (event_tx, event_rx) = mpsc::channel::<ElementChanged>(self.settings.queue_capacity);
        match self.event_source.take() {
            Some(source) => {
                info!("AAS change ingress: MQTT events");
                self.tasks.push(source.start(event_tx));
            }
            None => {
                info!("AAS change ingress: polling fallback");
                let elements = self
                    .registry
                    .iter()
                    .filter(|m| m.direction.includes_aas_to_opcua())
                    .map(|m| m.element.clone())
                    .collect();
                let poller = ValuePoller::new(
                    Arc::clone(&self.repository),
                    elements,
                    self.settings.poll_interval,
                );
                self.tasks.push(poller.start(event_tx, self.shutdown.subscribe()));
            }
        }

        let controller = Arc::new(Controller::new(
            Arc::clone(&self.pool),
            Arc::clone(&self.registry),
            Arc::clone(&self.suppression),
            Arc::clone(&self.node_values),
            Arc::clone(&self.audit),
        ));
        self.controller_stats = Some(controller.stats());
        self.tasks
            .push(controller.start(event_rx, self.shutdown.subscribe()));

        // 5. Repository probe heartbeat for health reporting.
        let repository = Arc::clone(&self.repository);
        let interval = self.settings.poll_interval;
        let mut shutdown_rx = self.shutdown.subscribe();
        self.tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep(interval) => {
                        if let Err(e) = repository.probe().await {
                            warn!(error = %e, "AAS probe failed");
                        }
                    }
                }
            }
        }));

        info!("Sync engine started");
        Ok(())
    }

    /// Stops everything in reverse order with a bounded grace period.
    pub async fn stop(&mut self) {
        info!("Stopping sync engine");
        let _ = self.shutdown.send(());

        let grace = self.settings.shutdown_grace;
        for mut task in self.tasks.drain(..) {
            if tokio::time::timeout(grace, &mut task).await.is_err() {
                warn!("Task exceeded shutdown grace, aborting");
                task.abort();
            }
        }

        self.pool.stop().await;
        info!("Sync engine stopped");
    }

    /// Returns a health snapshot.
    pub fn health(&self) -> HealthStatus {
        let endpoints: Vec<(String, SessionState)> = self
            .registry
            .endpoints()
            .iter()
            .map(|name| {
                (
                    name.clone(),
                    self.pool.state(name).unwrap_or(SessionState::Disconnected),
                )
            })
            .collect();

        let aas_fresh = self
            .repository
            .last_success()
            .map(|at| at.elapsed() <= self.settings.poll_interval * 2)
            .unwrap_or(false);

        let ready =
            aas_fresh && !endpoints.is_empty() && endpoints.iter().all(|(_, s)| s.is_connected());

        HealthStatus {
            ready,
            endpoints,
            aas_fresh,
        }
    }

    /// Monitor flow counters, when started.
    pub fn monitor_stats(&self) -> Option<Arc<MonitorStats>> {
        self.monitor_stats.clone()
    }

    /// Controller flow counters, when started.
    pub fn controller_stats(&self) -> Option<Arc<ControllerStats>> {
        self.controller_stats.clone()
    }
}
