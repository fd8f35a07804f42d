// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Bridge runtime assembly.
//!
//! Builds every component from configuration in dependency order, runs the
//! sync engine until a shutdown signal arrives, and tears it down with the
//! configured grace period.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use twinlink_aas::client::{AasClient, AasClientSettings, AasRepository, MemoryRepository};
use twinlink_aas::events::{AasEventSource, EventSourceSettings, PayloadKeys};
use twinlink_config::schema::{AasKind, BridgeConfig};
use twinlink_core::audit::{
    AuditSink, CompositeAuditSink, FileAuditSink, NoOpAuditSink, TracingAuditSink,
};
use twinlink_core::dedup::SuppressionCache;
use twinlink_core::error::AasError;
use twinlink_core::registry::MappingRegistry;
use twinlink_opcua::pool::{ConnectionPool, PoolSettings};
use twinlink_opcua::real::RealTransportFactory;
use twinlink_sync::{SyncManager, SyncSettings};

use crate::error::{BinError, BinResult};
use crate::shutdown::ShutdownCoordinator;

// =============================================================================
// BridgeRuntime
// =============================================================================

/// Owns the assembled bridge for the lifetime of the process.
pub struct BridgeRuntime {
    config: BridgeConfig,
    shutdown: ShutdownCoordinator,
}

impl BridgeRuntime {
    /// Creates a runtime from validated configuration.
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            shutdown: ShutdownCoordinator::new(),
        }
    }

    /// Runs the bridge until shutdown.
    pub async fn run(self) -> BinResult<()> {
        info!("Starting TWINLINK bridge v{}", twinlink_core::VERSION);

        let endpoints = self.config.endpoint_settings()?;
        let mappings = self.config.resolved_mappings()?;
        let registry = Arc::new(MappingRegistry::new(mappings)?);
        info!(
            endpoints = endpoints.len(),
            mappings = registry.len(),
            "Configuration loaded"
        );

        let audit = self.build_audit_sink()?;
        let suppression = Arc::new(SuppressionCache::new(
            Duration::from_secs(self.config.aas.events.dedup_ttl_seconds),
            self.config.aas.events.dedup_max_entries,
        ));
        let repository = self.build_repository()?;
        let event_source = self.build_event_source()?;

        let pool = Arc::new(ConnectionPool::new(
            endpoints,
            &RealTransportFactory,
            PoolSettings {
                write_timeout: Duration::from_secs(self.config.sync.opc_write_timeout_seconds),
                ..PoolSettings::default()
            },
        ));

        let mut manager = SyncManager::new(
            registry,
            pool,
            repository,
            event_source,
            audit,
            suppression,
            SyncSettings {
                rest_workers: self.config.sync.rest_workers,
                queue_capacity: self.config.sync.queue_capacity,
                shutdown_grace: Duration::from_secs(self.config.sync.shutdown_grace_seconds),
                poll_interval: Duration::from_secs(self.config.aas.poll_interval_seconds),
                auto_create_submodels: self.config.aas.auto_create_submodels,
                auto_create_elements: self.config.aas.auto_create_elements,
            },
        );

        manager.start().await.map_err(BinError::from)?;
        info!("Bridge is running; waiting for shutdown signal");

        self.shutdown.wait_for_shutdown().await;

        manager.stop().await;
        info!("Bridge shutdown complete");
        Ok(())
    }

    fn build_audit_sink(&self) -> BinResult<Arc<dyn AuditSink>> {
        if !self.config.audit.enabled {
            info!("Audit logging disabled");
            return Ok(Arc::new(NoOpAuditSink));
        }

        let tracing_sink: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
        match &self.config.audit.file {
            Some(path) => {
                let file_sink = FileAuditSink::open(path).map_err(|e| {
                    BinError::Configuration(format!(
                        "cannot open audit file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                info!(path = %path.display(), "Audit logging to file and structured logs");
                Ok(Arc::new(CompositeAuditSink::new(vec![
                    tracing_sink,
                    Arc::new(file_sink),
                ])))
            }
            None => Ok(tracing_sink),
        }
    }

    fn build_repository(&self) -> BinResult<Arc<dyn AasRepository>> {
        match self.config.aas.kind {
            AasKind::Memory => {
                warn!("Using in-memory AAS repository; values are not persisted anywhere");
                Ok(Arc::new(MemoryRepository::new()))
            }
            AasKind::Basyx | AasKind::AasxServer => {
                let url = self
                    .config
                    .aas
                    .url
                    .clone()
                    .ok_or_else(|| BinError::Configuration("aas.url is required".into()))?;
                let client = AasClient::new(AasClientSettings {
                    base_url: url.trim_end_matches('/').to_string(),
                    encode_identifiers: self.config.aas.encode_identifiers,
                    bearer_token: self.config.aas.bearer_token.clone(),
                    ..AasClientSettings::default()
                })
                .map_err(|e: AasError| BinError::Runtime(e.to_string()))?;
                Ok(Arc::new(client))
            }
        }
    }

    fn build_event_source(&self) -> BinResult<Option<AasEventSource>> {
        let events = &self.config.aas.events;
        if !events.enabled {
            return Ok(None);
        }
        let mqtt_url = events
            .mqtt_url
            .clone()
            .ok_or_else(|| BinError::Configuration("aas.events.mqtt_url is required".into()))?;

        let source = AasEventSource::new(EventSourceSettings {
            mqtt_url,
            topic: events.mqtt_topic.clone(),
            payload_keys: PayloadKeys {
                id_short: events.payload_id_short_key.clone(),
                id_short_path: events.payload_id_short_path_key.clone(),
                submodel_id: events.payload_submodel_id_key.clone(),
                value: events.payload_value_key.clone(),
                user: events.payload_user_key.clone(),
            },
            ..EventSourceSettings::default()
        })?;
        Ok(Some(source))
    }
}
