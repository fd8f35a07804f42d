// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Controller: AAS → OPC UA flow.
//!
//! Consumes [`ElementChanged`] events, validates and coerces their values,
//! and writes the OPC UA node, producing an audit record for every
//! attempted write. Per element there is at most one in-flight write; an
//! event arriving while its element is busy replaces any queued value, so
//! the latest state wins. Events are never replayed: an unavailable session
//! audits `Deferred` and the event is dropped.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use twinlink_aas::events::ElementChanged;
use twinlink_core::address::ElementRef;
use twinlink_core::audit::{AuditOutcome, AuditRecord, AuditSink, RejectReason};
use twinlink_core::codec::{self, ValueHash};
use twinlink_core::dedup::SuppressionCache;
use twinlink_core::error::{CodecError, OpcUaError};
use twinlink_core::registry::{Direction, Mapping, MappingRegistry};
use twinlink_core::variant::Variant;
use twinlink_core::xsd::XsdValue;
use twinlink_opcua::pool::ConnectionPool;

use crate::cache::NodeValueCache;

// =============================================================================
// Stats
// =============================================================================

/// Flow counters for the controller.
#[derive(Debug, Default)]
pub struct ControllerStats {
    /// Writes accepted by the OPC UA server.
    pub accepted: AtomicU64,

    /// Events rejected by validation or the server.
    pub rejected: AtomicU64,

    /// Events deferred because the session was unavailable.
    pub deferred: AtomicU64,

    /// Events dropped as round-trip echoes.
    pub suppressed: AtomicU64,

    /// Events coalesced by a newer value for the same element.
    pub coalesced: AtomicU64,
}

// =============================================================================
// Controller
// =============================================================================

struct PreparedWrite {
    mapping: Arc<Mapping>,
    value: XsdValue,
    variant: Variant,
    hash: ValueHash,
    user: Option<String>,
}

/// The AAS → OPC UA half of the sync engine.
pub struct Controller {
    pool: Arc<ConnectionPool>,
    registry: Arc<MappingRegistry>,
    suppression: Arc<SuppressionCache>,
    node_values: Arc<NodeValueCache>,
    audit: Arc<dyn AuditSink>,
    stats: Arc<ControllerStats>,
}

impl Controller {
    /// Creates the controller.
    pub fn new(
        pool: Arc<ConnectionPool>,
        registry: Arc<MappingRegistry>,
        suppression: Arc<SuppressionCache>,
        node_values: Arc<NodeValueCache>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            pool,
            registry,
            suppression,
            node_values,
            audit,
            stats: Arc::new(ControllerStats::default()),
        }
    }

    /// Returns the flow counters.
    pub fn stats(&self) -> Arc<ControllerStats> {
        Arc::clone(&self.stats)
    }

    /// Spawns the controller loop over an event stream.
    pub fn start(
        self: Arc<Self>,
        events: mpsc::Receiver<ElementChanged>,
        shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run(events, shutdown).await;
        })
    }

    async fn run(
        self: Arc<Self>,
        mut events: mpsc::Receiver<ElementChanged>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        // Write completions flow back so the next queued value can start.
        let (done_tx, mut done_rx) = mpsc::channel::<ElementRef>(64);
        let mut in_flight: HashSet<ElementRef> = HashSet::new();
        let mut queued: HashMap<ElementRef, PreparedWrite> = HashMap::new();

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                Some(element) = done_rx.recv() => {
                    in_flight.remove(&element);
                    if let Some(next) = queued.remove(&element) {
                        in_flight.insert(element);
                        self.spawn_write(next, done_tx.clone());
                    }
                }
                maybe_event = events.recv() => {
                    let event = match maybe_event {
                        Some(event) => event,
                        None => break,
                    };
                    let Some(prepared) = self.prepare(event).await else {
                        continue;
                    };
                    let element = prepared.mapping.element.clone();
                    if in_flight.contains(&element) {
                        // Overlapping events: the later value wins.
                        if queued.insert(element, prepared).is_some() {
                            self.stats.coalesced.fetch_add(1, Ordering::Relaxed);
                        }
                    } else {
                        in_flight.insert(element);
                        self.spawn_write(prepared, done_tx.clone());
                    }
                }
            }
        }
        debug!("Controller loop exited");
    }

    /// Validates one event; rejections are audited here, drops are logged.
    async fn prepare(&self, event: ElementChanged) -> Option<PreparedWrite> {
        let mapping = match self.registry.by_element(&event.element) {
            Some(mapping) => Arc::clone(mapping),
            None => {
                debug!(element = %event.element, "Event for unmapped element, dropping");
                return None;
            }
        };
        if !mapping.direction.includes_aas_to_opcua() {
            debug!(element = %event.element, "Mapping direction excludes AAS writes, dropping");
            return None;
        }

        let value = match codec::coerce_json(&event.value, mapping.value_type, mapping.nullable) {
            Ok(value) => value,
            Err(e) => {
                self.reject(&mapping, None, event.user, reject_reason(&e)).await;
                return None;
            }
        };

        if let Some(range) = &mapping.range {
            if codec::check_range(&value, range).is_err() {
                self.reject(&mapping, Some(value), event.user, RejectReason::RangeError)
                    .await;
                return None;
            }
        }

        let hash = codec::hash(&value);
        if self.suppression.matches(&mapping.element, &hash) {
            self.stats.suppressed.fetch_add(1, Ordering::Relaxed);
            debug!(element = %mapping.element, "Suppressed echo of our own AAS write");
            return None;
        }

        let variant = match codec::encode(&value, mapping.value_type.variant_type()) {
            Ok(variant) => variant,
            Err(e) => {
                self.reject(&mapping, Some(value), event.user, reject_reason(&e)).await;
                return None;
            }
        };

        Some(PreparedWrite {
            mapping,
            value,
            variant,
            hash,
            user: event.user,
        })
    }

    fn spawn_write(&self, prepared: PreparedWrite, done: mpsc::Sender<ElementRef>) {
        let pool = Arc::clone(&self.pool);
        let suppression = Arc::clone(&self.suppression);
        let node_values = Arc::clone(&self.node_values);
        let audit = Arc::clone(&self.audit);
        let stats = Arc::clone(&self.stats);

        tokio::spawn(async move {
            let mapping = &prepared.mapping;
            let element = mapping.element.clone();
            let prior = node_values.get(&mapping.node);

            let result = pool
                .write_value(
                    &mapping.node.endpoint,
                    &mapping.node.node_id,
                    prepared.variant.clone(),
                    prepared.user.as_deref(),
                )
                .await;

            let record = AuditRecord::new(
                Direction::AasToOpcua,
                mapping.node.clone(),
                element.clone(),
                match &result {
                    Ok(()) => AuditOutcome::Accepted,
                    Err(OpcUaError::Unavailable { .. }) => AuditOutcome::Deferred,
                    Err(e) => AuditOutcome::rejected(RejectReason::OpcError {
                        detail: e.to_string(),
                    }),
                },
            )
            .with_prior_value(prior)
            .with_new_value(prepared.value.clone())
            .with_user(prepared.user.clone());
            audit.record(record).await;

            match result {
                Ok(()) => {
                    stats.accepted.fetch_add(1, Ordering::Relaxed);
                    // The server will echo this write back through the
                    // subscription; remember it so the Monitor drops it.
                    suppression.insert(&element, prepared.hash);
                    node_values.note(&mapping.node, prepared.value);
                }
                Err(OpcUaError::Unavailable { .. }) => {
                    stats.deferred.fetch_add(1, Ordering::Relaxed);
                    debug!(element = %element, "Session unavailable, event dropped");
                }
                Err(e) => {
                    stats.rejected.fetch_add(1, Ordering::Relaxed);
                    warn!(element = %element, error = %e, "OPC UA write failed");
                }
            }

            let _ = done.send(element).await;
        });
    }

    async fn reject(
        &self,
        mapping: &Mapping,
        value: Option<XsdValue>,
        user: Option<String>,
        reason: RejectReason,
    ) {
        self.stats.rejected.fetch_add(1, Ordering::Relaxed);
        warn!(element = %mapping.element, reason = %reason, "Rejecting AAS event");

        let mut record = AuditRecord::new(
            Direction::AasToOpcua,
            mapping.node.clone(),
            mapping.element.clone(),
            AuditOutcome::rejected(reason),
        )
        .with_prior_value(self.node_values.get(&mapping.node))
        .with_user(user);
        if let Some(value) = value {
            record = record.with_new_value(value);
        }
        self.audit.record(record).await;
    }
}

fn reject_reason(error: &CodecError) -> RejectReason {
    match error {
        CodecError::Range { .. } => RejectReason::RangeError,
        _ => RejectReason::TypeError,
    }
}
