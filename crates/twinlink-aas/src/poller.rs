// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Polling fallback for repositories without MQTT events.
//!
//! Every `poll_interval` the poller reads each mapped element's `$value`
//! and emits [`ElementChanged`] when the JSON-normalized value differs from
//! the last seen one. The first successful read of an element only records
//! a baseline; emitting it would replay the whole AAS state into the
//! OPC UA address space at startup.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as Json;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use twinlink_core::address::ElementRef;

use crate::client::AasRepository;
use crate::events::ElementChanged;

// =============================================================================
// ValuePoller
// =============================================================================

/// Periodic `$value` reader emitting change events.
pub struct ValuePoller {
    repository: Arc<dyn AasRepository>,
    elements: Vec<ElementRef>,
    interval: Duration,
}

impl ValuePoller {
    /// Creates a poller over the given elements.
    pub fn new(
        repository: Arc<dyn AasRepository>,
        elements: Vec<ElementRef>,
        interval: Duration,
    ) -> Self {
        Self {
            repository,
            elements,
            interval,
        }
    }

    /// Starts polling until shutdown is signaled or the receiver drops.
    pub fn start(
        self,
        tx: mpsc::Sender<ElementChanged>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                elements = self.elements.len(),
                interval_s = self.interval.as_secs_f64(),
                "AAS polling started"
            );
            let mut snapshots: HashMap<ElementRef, Json> = HashMap::new();

            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        info!("AAS polling stopped");
                        return;
                    }
                    _ = tokio::time::sleep(self.interval) => {}
                }

                for element in &self.elements {
                    let current = match self.repository.read_value(element).await {
                        Ok(value) => value,
                        Err(e) => {
                            warn!(element = %element, error = %e, "Poll read failed");
                            continue;
                        }
                    };

                    match snapshots.get(element) {
                        None => {
                            debug!(element = %element, "Recorded poll baseline");
                            snapshots.insert(element.clone(), current);
                        }
                        Some(previous) if *previous != current => {
                            snapshots.insert(element.clone(), current.clone());
                            let event = ElementChanged {
                                element: element.clone(),
                                value: current,
                                user: None,
                            };
                            if tx.send(event).await.is_err() {
                                info!("Change receiver dropped, stopping poller");
                                return;
                            }
                        }
                        Some(_) => {}
                    }
                }
            }
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
