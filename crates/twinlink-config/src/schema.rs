// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration schema.
//!
//! The YAML surface consumed by the bridge:
//!
//! ```yaml
//! opcua:
//!   endpoints:
//!     - url: opc.tcp://plc:4840
//!       name: plant-east
//!       security_policy: Basic256Sha256
//!       security_mode: SignAndEncrypt
//!       cert_path: /pki/client.der
//!       key_path: /pki/client.key
//! mappings:
//!   - opcua_node_id: "ns=2;s=Temperature"
//!     endpoint: plant-east
//!     submodel_id: urn:factory:submodel:sensors
//!     id_short_path: Temperature
//!     value_type: xs:double
//!     direction: bidirectional
//!     range: { min: -40.0, max: 120.0 }
//! aas:
//!   type: basyx
//!   url: http://basyx:8081
//!   encode_identifiers: true
//!   events:
//!     enabled: true
//!     mqtt_url: tcp://broker:1883
//! ```

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use twinlink_core::address::{ElementRef, NodeId, NodeRef};
use twinlink_core::error::{ConfigError, ConfigResult};
use twinlink_core::registry::{
    Direction, Mapping, ValueRange, DEFAULT_QUEUE_SIZE, DEFAULT_SAMPLING_INTERVAL,
};
use twinlink_core::xsd::XsdType;
use twinlink_opcua::types::{EndpointSettings, SecurityMode, SecurityPolicy};

// =============================================================================
// Root
// =============================================================================

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// OPC UA client section.
    pub opcua: OpcUaSection,

    /// Node ↔ element bindings.
    #[serde(default)]
    pub mappings: Vec<MappingEntry>,

    /// AAS repository section.
    #[serde(default)]
    pub aas: AasSection,

    /// Sync engine tunables.
    #[serde(default)]
    pub sync: SyncSection,

    /// Audit sink configuration.
    #[serde(default)]
    pub audit: AuditSection,
}

impl BridgeConfig {
    /// Validates the whole configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        self.endpoint_settings()?;
        self.resolved_mappings()?;
        self.aas.validate()?;
        Ok(())
    }

    /// Converts the endpoint entries into pool settings, validating them.
    pub fn endpoint_settings(&self) -> ConfigResult<Vec<EndpointSettings>> {
        if self.opcua.endpoints.is_empty() {
            return Err(ConfigError::validation(
                "opcua.endpoints",
                "at least one endpoint is required",
            ));
        }

        let mut settings: Vec<EndpointSettings> = Vec::with_capacity(self.opcua.endpoints.len());
        for entry in &self.opcua.endpoints {
            let resolved = entry.to_settings()?;
            resolved.validate()?;
            if settings.iter().any(|s| s.name == resolved.name) {
                return Err(ConfigError::validation(
                    "opcua.endpoints",
                    format!("duplicate endpoint name '{}'", resolved.name),
                ));
            }
            settings.push(resolved);
        }
        Ok(settings)
    }

    /// Resolves mapping entries into core mappings; disabled entries are
    /// skipped with a log line.
    pub fn resolved_mappings(&self) -> ConfigResult<Vec<Mapping>> {
        let mut mappings = Vec::with_capacity(self.mappings.len());
        for entry in &self.mappings {
            if !entry.enabled {
                info!(node_id = %entry.opcua_node_id, "Skipping disabled mapping");
                continue;
            }
            mappings.push(entry.resolve(&self.opcua.endpoints)?);
        }
        Ok(mappings)
    }
}

// =============================================================================
// OPC UA section
// =============================================================================

/// OPC UA client section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpcUaSection {
    /// Configured endpoints.
    pub endpoints: Vec<EndpointEntry>,
}

/// One OPC UA endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointEntry {
    /// Server URL (`opc.tcp://…`).
    pub url: String,

    /// Endpoint identifier used by mappings. Defaults to the URL.
    #[serde(default)]
    pub name: String,

    /// Security policy name (`None`, `Basic256Sha256`, …).
    #[serde(default = "default_policy")]
    pub security_policy: String,

    /// Message security mode (`None`, `Sign`, `SignAndEncrypt`).
    #[serde(default = "default_mode")]
    pub security_mode: String,

    /// Client certificate path.
    #[serde(default)]
    pub cert_path: Option<PathBuf>,

    /// Client private key path.
    #[serde(default)]
    pub key_path: Option<PathBuf>,

    /// Optional session username.
    #[serde(default)]
    pub username: Option<String>,

    /// Optional session password.
    #[serde(default)]
    pub password: Option<String>,
}

fn default_policy() -> String {
    "None".to_string()
}

fn default_mode() -> String {
    "None".to_string()
}

impl EndpointEntry {
    fn effective_name(&self) -> &str {
        if self.name.is_empty() {
            &self.url
        } else {
            &self.name
        }
    }

    fn to_settings(&self) -> ConfigResult<EndpointSettings> {
        Ok(EndpointSettings {
            name: self.effective_name().to_string(),
            url: self.url.clone(),
            security_policy: SecurityPolicy::from_str(&self.security_policy)?,
            security_mode: SecurityMode::from_str(&self.security_mode)?,
            certificate_path: self.cert_path.clone(),
            private_key_path: self.key_path.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        })
    }
}

// =============================================================================
// Mapping entries
// =============================================================================

/// One node ↔ element binding entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingEntry {
    /// Canonical OPC UA node id (`ns=2;s=Temperature`).
    pub opcua_node_id: String,

    /// Endpoint reference by name or URL; defaults to the first endpoint.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Target submodel identifier.
    pub submodel_id: String,

    /// Slash-separated idShort path.
    #[serde(alias = "aas_id_short", alias = "idShortPath")]
    pub id_short_path: String,

    /// Declared XSD value type.
    #[serde(default = "default_value_type")]
    pub value_type: String,

    /// Synchronization direction.
    #[serde(default)]
    pub direction: Direction,

    /// Optional declared range.
    #[serde(default)]
    pub range: Option<RangeEntry>,

    /// Sampling interval for the monitored item, in milliseconds.
    #[serde(default)]
    pub sampling_interval_ms: Option<u64>,

    /// Monitored item queue size.
    #[serde(default)]
    pub queue_size: Option<u32>,

    /// Whether null values are accepted.
    #[serde(default)]
    pub nullable: bool,

    /// Whether the mapping is active.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_value_type() -> String {
    "xs:double".to_string()
}

fn default_true() -> bool {
    true
}

/// Range constraint entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RangeEntry {
    /// Inclusive lower bound.
    pub min: f64,

    /// Inclusive upper bound.
    pub max: f64,
}

impl MappingEntry {
    fn resolve(&self, endpoints: &[EndpointEntry]) -> ConfigResult<Mapping> {
        let node_id: NodeId = self.opcua_node_id.parse()?;
        let value_type: XsdType = self.value_type.parse()?;
        let endpoint = resolve_endpoint(self.endpoint.as_deref(), endpoints)?;

        let mut mapping = Mapping::new(
            NodeRef::new(endpoint, node_id),
            ElementRef::new(self.submodel_id.clone(), self.id_short_path.clone()),
            value_type,
        )
        .with_direction(self.direction)
        .with_nullable(self.nullable);

        if let Some(range) = self.range {
            mapping = mapping.with_range(ValueRange::new(range.min, range.max)?);
        }
        mapping.sampling_interval = self
            .sampling_interval_ms
            .map(std::time::Duration::from_millis)
            .unwrap_or(DEFAULT_SAMPLING_INTERVAL);
        mapping.queue_size = self.queue_size.unwrap_or(DEFAULT_QUEUE_SIZE);

        Ok(mapping)
    }
}

/// Resolves an endpoint reference by name or URL; `None` binds to the
/// first configured endpoint.
fn resolve_endpoint(
    reference: Option<&str>,
    endpoints: &[EndpointEntry],
) -> ConfigResult<String> {
    match reference {
        None => endpoints
            .first()
            .map(|e| e.effective_name().to_string())
            .ok_or_else(|| ConfigError::missing_field("opcua.endpoints")),
        Some(reference) => endpoints
            .iter()
            .find(|e| e.effective_name() == reference || e.url == reference)
            .map(|e| e.effective_name().to_string())
            .ok_or_else(|| ConfigError::unknown_endpoint(reference)),
    }
}

// =============================================================================
// AAS section
// =============================================================================

/// Repository kind; the REST shape is common v3, the kind is semantic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AasKind {
    /// Eclipse BaSyx repository.
    Basyx,

    /// AASX Server.
    AasxServer,

    /// In-memory repository (tests, demos).
    #[default]
    Memory,
}

/// AAS repository section.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AasSection {
    /// Repository kind.
    #[serde(rename = "type", default)]
    pub kind: AasKind,

    /// Base URL; required unless the kind is `memory`.
    #[serde(default)]
    pub url: Option<String>,

    /// Base64url-encode submodel identifiers in API paths.
    #[serde(default = "default_true")]
    pub encode_identifiers: bool,

    /// Create missing submodels on first use.
    #[serde(default)]
    pub auto_create_submodels: bool,

    /// Create missing elements on first use.
    #[serde(default)]
    pub auto_create_elements: bool,

    /// Polling fallback period, in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,

    /// Optional bearer token.
    #[serde(default)]
    pub bearer_token: Option<String>,

    /// MQTT event ingress.
    #[serde(default)]
    pub events: EventsSection,
}

fn default_poll_interval() -> u64 {
    5
}

impl AasSection {
    fn validate(&self) -> ConfigResult<()> {
        if self.kind != AasKind::Memory && self.url.is_none() {
            return Err(ConfigError::missing_field("aas.url"));
        }
        if self.events.enabled && self.events.mqtt_url.is_none() {
            return Err(ConfigError::missing_field("aas.events.mqtt_url"));
        }
        if self.poll_interval_seconds == 0 {
            return Err(ConfigError::validation(
                "aas.poll_interval_seconds",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// MQTT event ingress section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsSection {
    /// Whether MQTT ingress is enabled. When true, polling is disabled.
    #[serde(default)]
    pub enabled: bool,

    /// Broker URL (`tcp://host:port`).
    #[serde(default)]
    pub mqtt_url: Option<String>,

    /// Topic pattern.
    #[serde(default = "default_topic")]
    pub mqtt_topic: String,

    /// Payload key carrying a flat idShort.
    #[serde(default = "default_id_short_key")]
    pub payload_id_short_key: String,

    /// Payload key carrying a full idShortPath.
    #[serde(default = "default_id_short_path_key")]
    pub payload_id_short_path_key: String,

    /// Payload key carrying the submodel identifier.
    #[serde(default = "default_submodel_key")]
    pub payload_submodel_id_key: String,

    /// Payload key carrying the value.
    #[serde(default = "default_value_key")]
    pub payload_value_key: String,

    /// Payload key carrying the user identity.
    #[serde(default = "default_user_key")]
    pub payload_user_key: String,

    /// Loop-suppression entry TTL, in seconds.
    #[serde(default = "default_dedup_ttl")]
    pub dedup_ttl_seconds: u64,

    /// Loop-suppression cache size bound.
    #[serde(default = "default_dedup_entries")]
    pub dedup_max_entries: usize,
}

fn default_topic() -> String {
    "sm-repository/+/submodels/+/submodelElements/#".to_string()
}

fn default_id_short_key() -> String {
    "idShort".to_string()
}

fn default_id_short_path_key() -> String {
    "idShortPath".to_string()
}

fn default_submodel_key() -> String {
    "submodelId".to_string()
}

fn default_value_key() -> String {
    "value".to_string()
}

fn default_user_key() -> String {
    "user".to_string()
}

fn default_dedup_ttl() -> u64 {
    30
}

fn default_dedup_entries() -> usize {
    2048
}

impl Default for EventsSection {
    fn default() -> Self {
        Self {
            enabled: false,
            mqtt_url: None,
            mqtt_topic: default_topic(),
            payload_id_short_key: default_id_short_key(),
            payload_id_short_path_key: default_id_short_path_key(),
            payload_submodel_id_key: default_submodel_key(),
            payload_value_key: default_value_key(),
            payload_user_key: default_user_key(),
            dedup_ttl_seconds: default_dedup_ttl(),
            dedup_max_entries: default_dedup_entries(),
        }
    }
}

// =============================================================================
// Sync section
// =============================================================================

/// Sync engine tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSection {
    /// Size of the AAS REST worker pool.
    #[serde(default = "default_rest_workers")]
    pub rest_workers: usize,

    /// Bounded channel capacity between stages (drop-newest when full).
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Grace period for orderly shutdown, in seconds.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,

    /// OPC UA write deadline, in seconds.
    #[serde(default = "default_write_timeout")]
    pub opc_write_timeout_seconds: u64,
}

fn default_rest_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_shutdown_grace() -> u64 {
    5
}

fn default_write_timeout() -> u64 {
    5
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            rest_workers: default_rest_workers(),
            queue_capacity: default_queue_capacity(),
            shutdown_grace_seconds: default_shutdown_grace(),
            opc_write_timeout_seconds: default_write_timeout(),
        }
    }
}

// =============================================================================
// Audit section
// =============================================================================

/// Audit sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSection {
    /// Whether audit records are emitted.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Optional JSON-lines file; structured logs are always emitted when
    /// audit is enabled.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for AuditSection {
    fn default() -> Self {
        Self {
            enabled: true,
            file: None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_yaml() -> &'static str {
        r#"
opcua:
  endpoints:
    - url: opc.tcp://localhost:4840
      name: plant
mappings:
  - opcua_node_id: "ns=2;s=Temperature"
    submodel_id: urn:factory:submodel:sensors
    id_short_path: Temperature
    value_type: xs:double
aas:
  type: memory
"#
    }

    #[test]
    fn test_minimal_config_parses_and_validates() {
        let config: BridgeConfig = serde_yaml::from_str(minimal_yaml()).unwrap();
        config.validate().unwrap();

        let mappings = config.resolved_mappings().unwrap();
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].node.endpoint, "plant");
        assert_eq!(mappings[0].value_type, XsdType::Double);
        assert_eq!(mappings[0].sampling_interval, DEFAULT_SAMPLING_INTERVAL);
        assert_eq!(mappings[0].queue_size, DEFAULT_QUEUE_SIZE);
    }

    #[test]
    fn test_aas_id_short_alias() {
        let yaml = r#"
opcua:
  endpoints:
    - url: opc.tcp://localhost:4840
mappings:
  - opcua_node_id: "ns=2;s=Pressure"
    submodel_id: urn:sm:a
    aas_id_short: Pressure
aas:
  type: memory
"#;
        let config: BridgeConfig = serde_yaml::from_str(yaml).unwrap();
        let mappings = config.resolved_mappings().unwrap();
        assert_eq!(mappings[0].element.id_short_path, "Pressure");
    }

    #[test]
    fn test_endpoint_resolution() {
        let yaml = r#"
opcua:
  endpoints:
    - url: opc.tcp://a:4840
      name: first
    - url: opc.tcp://b:4840
      name: second
mappings:
  - opcua_node_id: "ns=2;s=X"
    endpoint: second
    submodel_id: urn:sm:a
    id_short_path: X
  - opcua_node_id: "ns=2;s=Y"
    endpoint: opc.tcp://a:4840
    submodel_id: urn:sm:a
    id_short_path: Y
  - opcua_node_id: "ns=2;s=Z"
    submodel_id: urn:sm:a
    id_short_path: Z
aas:
  type: memory
"#;
        let config: BridgeConfig = serde_yaml::from_str(yaml).unwrap();
        let mappings = config.resolved_mappings().unwrap();
        assert_eq!(mappings[0].node.endpoint, "second");
        assert_eq!(mappings[1].node.endpoint, "first");
        assert_eq!(mappings[2].node.endpoint, "first");
    }

    #[test]
    fn test_unknown_endpoint_rejected() {
        let yaml = r#"
opcua:
  endpoints:
    - url: opc.tcp://a:4840
      name: first
mappings:
  - opcua_node_id: "ns=2;s=X"
    endpoint: missing
    submodel_id: urn:sm:a
    id_short_path: X
aas:
  type: memory
"#;
        let config: BridgeConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(
            config.resolved_mappings(),
            Err(ConfigError::UnknownEndpoint { .. })
        ));
    }

    #[test]
    fn test_invalid_node_id_rejected() {
        let yaml = r#"
opcua:
  endpoints:
    - url: opc.tcp://a:4840
mappings:
  - opcua_node_id: "not-a-node"
    submodel_id: urn:sm:a
    id_short_path: X
aas:
  type: memory
"#;
        let config: BridgeConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.resolved_mappings().is_err());
    }

    #[test]
    fn test_disabled_mapping_skipped() {
        let yaml = r#"
opcua:
  endpoints:
    - url: opc.tcp://a:4840
mappings:
  - opcua_node_id: "ns=2;s=X"
    submodel_id: urn:sm:a
    id_short_path: X
    enabled: false
aas:
  type: memory
"#;
        let config: BridgeConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.resolved_mappings().unwrap().is_empty());
    }

    #[test]
    fn test_bad_range_rejected() {
        let yaml = r#"
opcua:
  endpoints:
    - url: opc.tcp://a:4840
mappings:
  - opcua_node_id: "ns=2;s=X"
    submodel_id: urn:sm:a
    id_short_path: X
    range: { min: 100.0, max: 0.0 }
aas:
  type: memory
"#;
        let config: BridgeConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.resolved_mappings().is_err());
    }

    #[test]
    fn test_rest_repository_requires_url() {
        let yaml = r#"
opcua:
  endpoints:
    - url: opc.tcp://a:4840
aas:
  type: basyx
"#;
        let config: BridgeConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingField { .. })
        ));
    }

    #[test]
    fn test_events_require_mqtt_url() {
        let yaml = r#"
opcua:
  endpoints:
    - url: opc.tcp://a:4840
aas:
  type: memory
  events:
    enabled: true
"#;
        let config: BridgeConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingField { .. })
        ));
    }

    #[test]
    fn test_duplicate_endpoint_names_rejected() {
        let yaml = r#"
opcua:
  endpoints:
    - url: opc.tcp://a:4840
      name: same
    - url: opc.tcp://b:4840
      name: same
aas:
  type: memory
"#;
        let config: BridgeConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_security_settings_parse() {
        let yaml = r#"
opcua:
  endpoints:
    - url: opc.tcp://a:4840
      name: secure
      security_policy: Basic256Sha256
      security_mode: SignAndEncrypt
      cert_path: /pki/client.der
      key_path: /pki/client.key
aas:
  type: memory
"#;
        let config: BridgeConfig = serde_yaml::from_str(yaml).unwrap();
        let endpoints = config.endpoint_settings().unwrap();
        assert_eq!(endpoints[0].security_policy, SecurityPolicy::Basic256Sha256);
        assert_eq!(endpoints[0].security_mode, SecurityMode::SignAndEncrypt);
    }

    #[test]
    fn test_sync_defaults() {
        let config: BridgeConfig = serde_yaml::from_str(minimal_yaml()).unwrap();
        assert_eq!(config.sync.rest_workers, 4);
        assert_eq!(config.sync.queue_capacity, 1024);
        assert_eq!(config.sync.shutdown_grace_seconds, 5);
        assert_eq!(config.aas.events.dedup_max_entries, 2048);
        assert_eq!(config.aas.events.dedup_ttl_seconds, 30);
    }
}
