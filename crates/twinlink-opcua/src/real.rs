// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Production OPC UA transport over the `opcua` crate.
//!
//! One [`RealTransport`] serves one configured endpoint. The connection pool
//! owns reconnection; this layer only connects, converts values, and moves
//! subscription notifications into the caller's sink.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use opcua::client::prelude::*;
use opcua::sync::RwLock as OpcUaRwLock;

use twinlink_core::address::{NodeId as CoreNodeId, NodeIdentifier};
use twinlink_core::error::{OpcUaError, OpcUaResult};
use twinlink_core::variant::Variant as CoreVariant;

use crate::transport::{DataChange, MonitoredItemRequest, OpcUaTransport, TransportFactory};
use crate::types::{EndpointSettings, SecurityMode as CfgSecurityMode, SecurityPolicy as CfgSecurityPolicy};

// =============================================================================
// RealTransport
// =============================================================================

/// OPC UA transport backed by the `opcua` crate.
pub struct RealTransport {
    settings: EndpointSettings,
    session: tokio::sync::RwLock<Option<Arc<OpcUaRwLock<Session>>>>,
    run_stop: StdMutex<Option<tokio::sync::oneshot::Sender<SessionCommand>>>,
    /// Notifications dropped because a sink was full (drop-newest).
    dropped_notifications: Arc<AtomicU64>,
}

impl RealTransport {
    /// Creates a transport for the given endpoint settings.
    pub fn new(settings: EndpointSettings) -> Self {
        Self {
            settings,
            session: tokio::sync::RwLock::new(None),
            run_stop: StdMutex::new(None),
            dropped_notifications: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns how many notifications were dropped on full sinks.
    pub fn dropped_notifications(&self) -> u64 {
        self.dropped_notifications.load(Ordering::Relaxed)
    }

    fn build_client(&self) -> OpcUaResult<Client> {
        let mut builder = ClientBuilder::new()
            .application_name("TWINLINK Bridge")
            .application_uri(format!("urn:twinlink:bridge:{}", self.settings.name))
            // The pool drives reconnection; the stack must not retry itself.
            .session_retry_limit(0)
            .session_timeout(60_000);

        if let Some(ref cert) = self.settings.certificate_path {
            builder = builder.certificate_path(cert.clone());
        }
        if let Some(ref key) = self.settings.private_key_path {
            builder = builder.private_key_path(key.clone());
        }

        builder.client().ok_or_else(|| {
            OpcUaError::connection_failed(&self.settings.name, "Failed to build OPC UA client")
        })
    }

    fn security_policy(&self) -> SecurityPolicy {
        match self.settings.security_policy {
            CfgSecurityPolicy::None => SecurityPolicy::None,
            CfgSecurityPolicy::Basic128Rsa15 => SecurityPolicy::Basic128Rsa15,
            CfgSecurityPolicy::Basic256 => SecurityPolicy::Basic256,
            CfgSecurityPolicy::Basic256Sha256 => SecurityPolicy::Basic256Sha256,
            CfgSecurityPolicy::Aes128Sha256RsaOaep => SecurityPolicy::Aes128Sha256RsaOaep,
            CfgSecurityPolicy::Aes256Sha256RsaPss => SecurityPolicy::Aes256Sha256RsaPss,
        }
    }

    fn security_mode(&self) -> MessageSecurityMode {
        match self.settings.security_mode {
            CfgSecurityMode::None => MessageSecurityMode::None,
            CfgSecurityMode::Sign => MessageSecurityMode::Sign,
            CfgSecurityMode::SignAndEncrypt => MessageSecurityMode::SignAndEncrypt,
        }
    }

    fn identity_token(&self) -> IdentityToken {
        match (&self.settings.username, &self.settings.password) {
            (Some(user), Some(pass)) => IdentityToken::UserName(user.clone(), pass.clone()),
            (Some(user), None) => IdentityToken::UserName(user.clone(), String::new()),
            _ => IdentityToken::Anonymous,
        }
    }

    async fn current_session(&self) -> OpcUaResult<Arc<OpcUaRwLock<Session>>> {
        self.session
            .read()
            .await
            .clone()
            .ok_or(OpcUaError::NotConnected)
    }

    fn to_stack_node_id(node_id: &CoreNodeId) -> opcua::types::NodeId {
        match &node_id.identifier {
            NodeIdentifier::Numeric(v) => opcua::types::NodeId::new(node_id.namespace_index, *v),
            NodeIdentifier::String(v) => {
                opcua::types::NodeId::new(node_id.namespace_index, v.clone())
            }
            NodeIdentifier::Guid(v) => {
                opcua::types::NodeId::new(node_id.namespace_index, opcua::types::Guid::from(*v))
            }
            NodeIdentifier::Opaque(v) => opcua::types::NodeId::new(
                node_id.namespace_index,
                opcua::types::ByteString::from(v.as_slice()),
            ),
        }
    }

    fn from_stack_node_id(node_id: &opcua::types::NodeId) -> CoreNodeId {
        let ns = node_id.namespace;
        match &node_id.identifier {
            opcua::types::Identifier::Numeric(v) => CoreNodeId::numeric(ns, *v),
            opcua::types::Identifier::String(v) => CoreNodeId::string(ns, v.as_ref()),
            opcua::types::Identifier::Guid(v) => {
                CoreNodeId::guid(ns, uuid::Uuid::from_bytes(*v.as_bytes()))
            }
            opcua::types::Identifier::ByteString(v) => {
                CoreNodeId::opaque(ns, v.value.clone().unwrap_or_default())
            }
        }
    }

    fn from_stack_variant(variant: &opcua::types::Variant) -> CoreVariant {
        use opcua::types::Variant as V;
        match variant {
            V::Empty => CoreVariant::Null,
            V::Boolean(v) => CoreVariant::Boolean(*v),
            V::SByte(v) => CoreVariant::SByte(*v),
            V::Byte(v) => CoreVariant::Byte(*v),
            V::Int16(v) => CoreVariant::Int16(*v),
            V::UInt16(v) => CoreVariant::UInt16(*v),
            V::Int32(v) => CoreVariant::Int32(*v),
            V::UInt32(v) => CoreVariant::UInt32(*v),
            V::Int64(v) => CoreVariant::Int64(*v),
            V::UInt64(v) => CoreVariant::UInt64(*v),
            V::Float(v) => CoreVariant::Float(*v),
            V::Double(v) => CoreVariant::Double(*v),
            V::String(v) => CoreVariant::String(v.as_ref().to_string()),
            V::DateTime(v) => {
                let dt = chrono::DateTime::from_timestamp(
                    v.as_chrono().timestamp(),
                    v.as_chrono().timestamp_subsec_nanos(),
                )
                .unwrap_or_else(chrono::Utc::now);
                CoreVariant::DateTime(dt)
            }
            // GUID and LocalizedText nodes surface as strings; the codec
            // keeps xs:string semantics for them (OPC 30270).
            V::Guid(v) => CoreVariant::String(v.to_string()),
            V::LocalizedText(v) => CoreVariant::String(v.text.as_ref().to_string()),
            V::ByteString(v) => CoreVariant::ByteString(v.value.clone().unwrap_or_default()),
            V::Array(arr) => {
                let values: Vec<CoreVariant> =
                    arr.values.iter().map(Self::from_stack_variant).collect();
                CoreVariant::Array(values)
            }
            other => CoreVariant::String(format!("{:?}", other)),
        }
    }

    fn to_stack_variant(value: &CoreVariant) -> opcua::types::Variant {
        use opcua::types::Variant as V;
        match value {
            CoreVariant::Null => V::Empty,
            CoreVariant::Boolean(v) => V::Boolean(*v),
            CoreVariant::SByte(v) => V::SByte(*v),
            CoreVariant::Byte(v) => V::Byte(*v),
            CoreVariant::Int16(v) => V::Int16(*v),
            CoreVariant::UInt16(v) => V::UInt16(*v),
            CoreVariant::Int32(v) => V::Int32(*v),
            CoreVariant::UInt32(v) => V::UInt32(*v),
            CoreVariant::Int64(v) => V::Int64(*v),
            CoreVariant::UInt64(v) => V::UInt64(*v),
            CoreVariant::Float(v) => V::Float(*v),
            CoreVariant::Double(v) => V::Double(*v),
            CoreVariant::String(v) => V::String(opcua::types::UAString::from(v.as_str())),
            CoreVariant::DateTime(v) => {
                V::DateTime(Box::new(opcua::types::DateTime::from(*v)))
            }
            CoreVariant::ByteString(v) => {
                V::ByteString(opcua::types::ByteString::from(v.as_slice()))
            }
            CoreVariant::Array(items) => {
                let values: Vec<opcua::types::Variant> =
                    items.iter().map(Self::to_stack_variant).collect();
                match opcua::types::Array::new(opcua::types::VariantTypeId::Variant, values) {
                    Ok(array) => V::Array(Box::new(array)),
                    Err(_) => V::Empty,
                }
            }
        }
    }

    fn classify_connect_error(&self, status: StatusCode) -> OpcUaError {
        match status {
            StatusCode::BadUserAccessDenied
            | StatusCode::BadIdentityTokenInvalid
            | StatusCode::BadIdentityTokenRejected
            | StatusCode::BadCertificateInvalid
            | StatusCode::BadCertificateUntrusted => {
                OpcUaError::auth_failed(&self.settings.name, status.to_string())
            }
            other => OpcUaError::connection_failed(&self.settings.name, other.to_string()),
        }
    }
}

#[async_trait]
impl OpcUaTransport for RealTransport {
    async fn connect(&self) -> OpcUaResult<()> {
        if self.is_connected() {
            return Ok(());
        }

        info!(endpoint = %self.settings.name, url = %self.settings.url, "Connecting to OPC UA server");

        let client = self.build_client()?;

        let endpoints = client
            .get_server_endpoints_from_url(&self.settings.url)
            .map_err(|status| self.classify_connect_error(status))?;

        let policy = self.security_policy();
        let mode = self.security_mode();
        let endpoint = endpoints
            .iter()
            .find(|e| e.security_policy_uri.as_ref() == policy.to_uri() && e.security_mode == mode)
            .cloned()
            .ok_or_else(|| {
                OpcUaError::connection_failed(
                    &self.settings.name,
                    format!("no endpoint matches {}/{}", policy, mode),
                )
            })?;

        debug!(
            endpoint = %self.settings.name,
            security_policy = %endpoint.security_policy_uri,
            "Found matching server endpoint"
        );

        let mut client = client;
        let session = client
            .connect_to_endpoint(endpoint, self.identity_token())
            .map_err(|status| self.classify_connect_error(status))?;

        // Pump the publish loop on the stack's background thread.
        let stop_handle = Session::run_async(session.clone());
        *self.run_stop.lock().expect("run handle poisoned") = Some(stop_handle);
        *self.session.write().await = Some(session);

        info!(endpoint = %self.settings.name, "OPC UA session active");
        Ok(())
    }

    async fn disconnect(&self) -> OpcUaResult<()> {
        if let Some(stop) = self.run_stop.lock().expect("run handle poisoned").take() {
            let _ = stop.send(SessionCommand::Stop);
        }
        if let Some(session) = self.session.write().await.take() {
            let session = session.read();
            session.disconnect();
            info!(endpoint = %self.settings.name, "OPC UA session closed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        match self.session.try_read() {
            Ok(guard) => match guard.as_ref() {
                Some(session) => session.read().is_connected(),
                None => false,
            },
            // The slot is briefly write-locked during connect/disconnect.
            Err(_) => false,
        }
    }

    async fn read_value(&self, node_id: &CoreNodeId) -> OpcUaResult<CoreVariant> {
        let session = self.current_session().await?;
        let read_id = ReadValueId {
            node_id: Self::to_stack_node_id(node_id),
            attribute_id: AttributeId::Value as u32,
            index_range: opcua::types::UAString::null(),
            data_encoding: opcua::types::QualifiedName::null(),
        };

        trace!(node_id = %node_id, "Reading node value");

        let results = {
            let session = session.read();
            session
                .read(&[read_id], TimestampsToReturn::Source, 0.0)
                .map_err(|status| OpcUaError::status(node_id.to_string(), status.bits()))?
        };

        let data_value = results
            .first()
            .ok_or_else(|| OpcUaError::status(node_id.to_string(), 0x8000_0000))?;

        if let Some(status) = data_value.status {
            if !status.is_good() {
                return Err(OpcUaError::status(node_id.to_string(), status.bits()));
            }
        }

        Ok(data_value
            .value
            .as_ref()
            .map(Self::from_stack_variant)
            .unwrap_or(CoreVariant::Null))
    }

    async fn write_value(&self, node_id: &CoreNodeId, value: CoreVariant) -> OpcUaResult<()> {
        let session = self.current_session().await?;
        let write = WriteValue {
            node_id: Self::to_stack_node_id(node_id),
            attribute_id: AttributeId::Value as u32,
            index_range: opcua::types::UAString::null(),
            value: opcua::types::DataValue::new_now(Self::to_stack_variant(&value)),
        };

        trace!(node_id = %node_id, "Writing node value");

        let results = {
            let session = session.read();
            session
                .write(&[write])
                .map_err(|status| OpcUaError::status(node_id.to_string(), status.bits()))?
        };

        match results.first() {
            Some(status) if status.is_good() => Ok(()),
            Some(status) => Err(OpcUaError::status(node_id.to_string(), status.bits())),
            None => Err(OpcUaError::status(node_id.to_string(), 0x8000_0000)),
        }
    }

    async fn create_subscription(
        &self,
        publishing_interval: Duration,
        sink: mpsc::Sender<DataChange>,
    ) -> OpcUaResult<u32> {
        let session = self.current_session().await?;
        let endpoint = self.settings.name.clone();
        let dropped_in_callback = Arc::clone(&self.dropped_notifications);

        let subscription_id = {
            let session = session.read();
            session
                .create_subscription(
                    publishing_interval.as_millis() as f64,
                    60,
                    10,
                    65_535,
                    0,
                    true,
                    DataChangeCallback::new(move |changed_items| {
                        for item in changed_items.iter() {
                            let node_id =
                                Self::from_stack_node_id(&item.item_to_monitor().node_id);
                            let data_value = item.last_value();
                            let value = data_value
                                .value
                                .as_ref()
                                .map(Self::from_stack_variant)
                                .unwrap_or(CoreVariant::Null);
                            let source_timestamp = data_value.source_timestamp.map(|t| {
                                chrono::DateTime::from_timestamp(
                                    t.as_chrono().timestamp(),
                                    t.as_chrono().timestamp_subsec_nanos(),
                                )
                                .unwrap_or_else(chrono::Utc::now)
                            });
                            let change = DataChange {
                                node_id,
                                value,
                                source_timestamp,
                            };
                            if sink.try_send(change).is_err() {
                                let total =
                                    dropped_in_callback.fetch_add(1, Ordering::Relaxed) + 1;
                                warn!(
                                    endpoint = %endpoint,
                                    dropped_total = total,
                                    "Notification sink full, dropping newest data change"
                                );
                            }
                        }
                    }),
                )
                .map_err(|status| OpcUaError::subscription(status.to_string()))?
        };

        info!(
            endpoint = %self.settings.name,
            subscription_id,
            publishing_interval_ms = publishing_interval.as_millis() as u64,
            "Subscription created"
        );
        Ok(subscription_id)
    }

    async fn create_monitored_items(
        &self,
        subscription_id: u32,
        items: &[MonitoredItemRequest],
    ) -> OpcUaResult<Vec<u32>> {
        let session = self.current_session().await?;

        let requests: Vec<MonitoredItemCreateRequest> = items
            .iter()
            .enumerate()
            .map(|(i, item)| MonitoredItemCreateRequest {
                item_to_monitor: ReadValueId {
                    node_id: Self::to_stack_node_id(&item.node_id),
                    attribute_id: AttributeId::Value as u32,
                    index_range: opcua::types::UAString::null(),
                    data_encoding: opcua::types::QualifiedName::null(),
                },
                monitoring_mode: MonitoringMode::Reporting,
                requested_parameters: MonitoringParameters {
                    client_handle: (i + 1) as u32,
                    sampling_interval: item.sampling_interval.as_millis() as f64,
                    filter: opcua::types::ExtensionObject::null(),
                    queue_size: item.queue_size,
                    discard_oldest: true,
                },
            })
            .collect();

        let results = {
            let session = session.read();
            session
                .create_monitored_items(subscription_id, TimestampsToReturn::Source, &requests)
                .map_err(|status| OpcUaError::subscription(status.to_string()))?
        };

        info!(
            endpoint = %self.settings.name,
            subscription_id,
            monitored_items = items.len(),
            "Monitored items created"
        );
        Ok(results.iter().map(|r| r.monitored_item_id).collect())
    }

    async fn delete_subscription(&self, subscription_id: u32) -> OpcUaResult<()> {
        let session = self.current_session().await?;
        let session = session.read();
        session
            .delete_subscription(subscription_id)
            .map_err(|status| OpcUaError::subscription(status.to_string()))?;
        Ok(())
    }
}

// =============================================================================
// RealTransportFactory
// =============================================================================

/// Factory producing [`RealTransport`] instances.
#[derive(Debug, Default)]
pub struct RealTransportFactory;

impl TransportFactory for RealTransportFactory {
    fn create(&self, endpoint: &EndpointSettings) -> Arc<dyn OpcUaTransport> {
        Arc::new(RealTransport::new(endpoint.clone()))
    }
}
