// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Monitor: OPC UA → AAS flow.
//!
//! For each endpoint the monitor submits one subscription covering every
//! `opcua_to_aas` and `bidirectional` mapping, then fans notifications out
//! to a pool of REST workers. Work is sharded by element so per-node
//! publish order is preserved end-to-end up to the AAS `PATCH` call; no
//! cross-node ordering is promised.
//!
//! Transient AAS failures drop the sample: the next data change carries the
//! freshest state, so there is no replay queue.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use twinlink_aas::client::AasRepository;
use twinlink_core::address::NodeRef;
use twinlink_core::codec;
use twinlink_core::dedup::SuppressionCache;
use twinlink_core::error::{AasError, OpcUaResult};
use twinlink_core::registry::{Mapping, MappingRegistry};
use twinlink_opcua::pool::{ConnectionPool, SubscriptionSpec};
use twinlink_opcua::transport::{DataChange, MonitoredItemRequest};

use crate::cache::NodeValueCache;

// =============================================================================
// Settings & stats
// =============================================================================

/// Monitor tunables.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// Number of REST workers.
    pub rest_workers: usize,

    /// Bounded queue capacity per stage (drop-newest when full).
    pub queue_capacity: usize,

    /// Create missing submodels on first use.
    pub auto_create_submodels: bool,

    /// Create missing elements on first use.
    pub auto_create_elements: bool,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            rest_workers: 4,
            queue_capacity: 1024,
            auto_create_submodels: false,
            auto_create_elements: false,
        }
    }
}

/// Flow counters, exposed for health and tests.
#[derive(Debug, Default)]
pub struct MonitorStats {
    /// Samples forwarded to the AAS repository.
    pub written: AtomicU64,

    /// Samples dropped as round-trip echoes.
    pub suppressed: AtomicU64,

    /// Samples dropped on coercion failure.
    pub decode_failures: AtomicU64,

    /// Samples dropped on AAS failure.
    pub write_failures: AtomicU64,

    /// Samples dropped because a queue was full.
    pub queue_drops: AtomicU64,
}

// =============================================================================
// Monitor
// =============================================================================

struct MonitorJob {
    mapping: Arc<Mapping>,
    change: DataChange,
}

/// The OPC UA → AAS half of the sync engine.
pub struct Monitor {
    pool: Arc<ConnectionPool>,
    registry: Arc<MappingRegistry>,
    repository: Arc<dyn AasRepository>,
    suppression: Arc<SuppressionCache>,
    node_values: Arc<NodeValueCache>,
    settings: MonitorSettings,
    stats: Arc<MonitorStats>,
}

impl Monitor {
    /// Creates the monitor.
    pub fn new(
        pool: Arc<ConnectionPool>,
        registry: Arc<MappingRegistry>,
        repository: Arc<dyn AasRepository>,
        suppression: Arc<SuppressionCache>,
        node_values: Arc<NodeValueCache>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            pool,
            registry,
            repository,
            suppression,
            node_values,
            settings,
            stats: Arc::new(MonitorStats::default()),
        }
    }

    /// Returns the flow counters.
    pub fn stats(&self) -> Arc<MonitorStats> {
        Arc::clone(&self.stats)
    }

    /// Submits subscriptions and spawns the demux and worker tasks.
    pub async fn start(&self, shutdown: &broadcast::Sender<()>) -> OpcUaResult<Vec<JoinHandle<()>>> {
        let mut tasks = Vec::new();

        // REST worker pool; jobs are sharded by element so order per node
        // is preserved within one worker queue.
        let worker_count = self.settings.rest_workers.max(1);
        let mut worker_senders = Vec::with_capacity(worker_count);
        for worker_index in 0..worker_count {
            let (tx, mut rx) = mpsc::channel::<MonitorJob>(self.settings.queue_capacity);
            worker_senders.push(tx);

            let repository = Arc::clone(&self.repository);
            let suppression = Arc::clone(&self.suppression);
            let node_values = Arc::clone(&self.node_values);
            let stats = Arc::clone(&self.stats);
            let settings = self.settings.clone();
            tasks.push(tokio::spawn(async move {
                while let Some(job) = rx.recv().await {
                    process_change(
                        &repository,
                        &suppression,
                        &node_values,
                        &stats,
                        &settings,
                        job,
                    )
                    .await;
                }
                debug!(worker_index, "Monitor worker drained");
            }));
        }

        for endpoint in self.registry.endpoints() {
            let mappings = self.registry.outbound_for_endpoint(endpoint);
            if mappings.is_empty() {
                continue;
            }

            let items: Vec<MonitoredItemRequest> = mappings
                .iter()
                .map(|m| MonitoredItemRequest {
                    node_id: m.node.node_id.clone(),
                    sampling_interval: m.sampling_interval,
                    queue_size: m.queue_size,
                })
                .collect();
            let publishing_interval = mappings
                .iter()
                .map(|m| m.sampling_interval)
                .min()
                .unwrap_or(Duration::from_millis(100));

            let (tx, mut rx) = mpsc::channel::<DataChange>(self.settings.queue_capacity);
            self.pool
                .submit_subscription(
                    endpoint,
                    SubscriptionSpec {
                        publishing_interval,
                        items,
                        sink: tx,
                    },
                )
                .await?;
            info!(endpoint = %endpoint, items = mappings.len(), "Monitor subscription submitted");

            // Demux: route each change to its mapping's worker shard.
            let endpoint = endpoint.clone();
            let registry = Arc::clone(&self.registry);
            let stats = Arc::clone(&self.stats);
            let worker_senders = worker_senders.clone();
            let mut shutdown_rx = shutdown.subscribe();
            tasks.push(tokio::spawn(async move {
                loop {
                    let change = tokio::select! {
                        _ = shutdown_rx.recv() => break,
                        maybe = rx.recv() => match maybe {
                            Some(change) => change,
                            None => break,
                        },
                    };

                    let node = NodeRef::new(endpoint.clone(), change.node_id.clone());
                    let mapping = match registry.by_node(&node) {
                        Some(mapping) => Arc::clone(mapping),
                        None => {
                            warn!(node = %node, "Data change for unmapped node, dropping");
                            continue;
                        }
                    };

                    let shard = shard_for(&mapping) % worker_senders.len();
                    let job = MonitorJob { mapping, change };
                    if worker_senders[shard].try_send(job).is_err() {
                        let total = stats.queue_drops.fetch_add(1, Ordering::Relaxed) + 1;
                        warn!(node = %node, dropped_total = total, "Worker queue full, dropping newest sample");
                    }
                }
                debug!(endpoint = %endpoint, "Monitor demux exited");
            }));
        }

        Ok(tasks)
    }
}

fn shard_for(mapping: &Mapping) -> usize {
    let mut hasher = DefaultHasher::new();
    mapping.element.hash(&mut hasher);
    hasher.finish() as usize
}

async fn process_change(
    repository: &Arc<dyn AasRepository>,
    suppression: &SuppressionCache,
    node_values: &NodeValueCache,
    stats: &MonitorStats,
    settings: &MonitorSettings,
    job: MonitorJob,
) {
    let mapping = &job.mapping;

    let value = match codec::decode(&job.change.value, mapping.value_type, mapping.nullable) {
        Ok(value) => value,
        Err(e) => {
            stats.decode_failures.fetch_add(1, Ordering::Relaxed);
            warn!(node = %mapping.node, error = %e, "Dropping undecodable sample");
            return;
        }
    };

    if let Some(range) = &mapping.range {
        if let Err(e) = codec::check_range(&value, range) {
            stats.decode_failures.fetch_add(1, Ordering::Relaxed);
            warn!(node = %mapping.node, error = %e, "Write skipped, sample outside declared range");
            return;
        }
    }

    node_values.note(&mapping.node, value.clone());

    let hash = codec::hash(&value);
    if suppression.matches(&mapping.element, &hash) {
        stats.suppressed.fetch_add(1, Ordering::Relaxed);
        debug!(element = %mapping.element, "Suppressed round-trip echo");
        return;
    }

    let json = match codec::to_json(&value) {
        Ok(json) => json,
        Err(e) => {
            stats.decode_failures.fetch_add(1, Ordering::Relaxed);
            warn!(node = %mapping.node, error = %e, "Value not representable in JSON, dropping");
            return;
        }
    };

    match repository.write_value(&mapping.element, &json).await {
        Ok(()) => {
            suppression.insert(&mapping.element, hash);
            stats.written.fetch_add(1, Ordering::Relaxed);
        }
        Err(AasError::NotFound { .. }) if settings.auto_create_elements => {
            if let Err(e) = ensure_element(repository, mapping, settings).await {
                stats.write_failures.fetch_add(1, Ordering::Relaxed);
                warn!(element = %mapping.element, error = %e, "Element creation failed, dropping sample");
                return;
            }
            // Retry once after creation.
            match repository.write_value(&mapping.element, &json).await {
                Ok(()) => {
                    suppression.insert(&mapping.element, hash);
                    stats.written.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    stats.write_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(element = %mapping.element, error = %e, "Write after creation failed, dropping sample");
                }
            }
        }
        Err(e) => {
            stats.write_failures.fetch_add(1, Ordering::Relaxed);
            warn!(
                element = %mapping.element,
                error = %e,
                "AAS write failed, dropping sample (next change carries fresh state)"
            );
        }
    }
}

async fn ensure_element(
    repository: &Arc<dyn AasRepository>,
    mapping: &Mapping,
    settings: &MonitorSettings,
) -> Result<(), AasError> {
    if settings.auto_create_submodels {
        repository.create_submodel(&mapping.element.submodel_id).await?;
    }
    repository
        .create_element(&mapping.element, mapping.value_type)
        .await?;
    info!(element = %mapping.element, "Created missing AAS element");
    Ok(())
}
