// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! MQTT event ingress from the AAS repository.
//!
//! BaSyx-style repositories publish element changes on topics like
//!
//! ```text
//! sm-repository/{repo}/submodels/{smid-b64url}/submodelElements/{idShortPath…}/{suffix}
//! ```
//!
//! Payload fields take precedence over topic-derived identity, since
//! idShort segments containing `/` are not representable in a topic.
//! Payloads may be wrapped under `data`, `payload`, or `event` (tried in
//! that order), and a bare scalar payload is treated as the value itself.

use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde_json::Value as Json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use twinlink_core::address::ElementRef;
use twinlink_core::error::MqttError;

use crate::encoding::decode_submodel_id_lossy;

/// Default topic pattern covering all submodel element events.
pub const DEFAULT_TOPIC: &str = "sm-repository/+/submodels/+/submodelElements/#";

/// Event suffixes stripped from the end of a topic before deriving the
/// idShortPath.
const EVENT_SUFFIXES: &[&str] = &[
    "created", "updated", "deleted", "patched", "patch", "value", "$value",
];

// =============================================================================
// ElementChanged
// =============================================================================

/// An AAS-side change delivered to the Controller.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementChanged {
    /// The element that changed.
    pub element: ElementRef,

    /// The raw JSON value from the event.
    pub value: Json,

    /// User identity carried by the event, when present.
    pub user: Option<String>,
}

// =============================================================================
// Settings
// =============================================================================

/// Payload key names, overridable per broker convention.
#[derive(Debug, Clone)]
pub struct PayloadKeys {
    /// Key carrying a flat idShort.
    pub id_short: String,

    /// Key carrying a full idShortPath.
    pub id_short_path: String,

    /// Key carrying the submodel identifier.
    pub submodel_id: String,

    /// Key carrying the value.
    pub value: String,

    /// Key carrying the user identity.
    pub user: String,
}

impl Default for PayloadKeys {
    fn default() -> Self {
        Self {
            id_short: "idShort".to_string(),
            id_short_path: "idShortPath".to_string(),
            submodel_id: "submodelId".to_string(),
            value: "value".to_string(),
            user: "user".to_string(),
        }
    }
}

/// Settings for the MQTT event source.
#[derive(Debug, Clone)]
pub struct EventSourceSettings {
    /// Broker URL, `tcp://host:port` or `mqtt://host:port`.
    pub mqtt_url: String,

    /// Topic pattern to subscribe.
    pub topic: String,

    /// MQTT client id.
    pub client_id: String,

    /// Keep-alive interval.
    pub keep_alive: Duration,

    /// Payload key names.
    pub payload_keys: PayloadKeys,
}

impl Default for EventSourceSettings {
    fn default() -> Self {
        Self {
            mqtt_url: "tcp://localhost:1883".to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            client_id: format!("twinlink-{}", uuid::Uuid::new_v4().simple()),
            keep_alive: Duration::from_secs(30),
            payload_keys: PayloadKeys::default(),
        }
    }
}

// =============================================================================
// AasEventSource
// =============================================================================

/// MQTT subscriber feeding [`ElementChanged`] events to the Controller.
pub struct AasEventSource {
    settings: EventSourceSettings,
}

impl AasEventSource {
    /// Creates the event source, validating the broker URL.
    pub fn new(settings: EventSourceSettings) -> Result<Self, MqttError> {
        parse_mqtt_url(&settings.mqtt_url)?;
        Ok(Self { settings })
    }

    /// Starts the MQTT loop; parsed events flow into `tx` until the
    /// receiver is dropped.
    pub fn start(self, tx: mpsc::Sender<ElementChanged>) -> JoinHandle<()> {
        let settings = self.settings;
        tokio::spawn(async move {
            let (host, port) = match parse_mqtt_url(&settings.mqtt_url) {
                Ok(parts) => parts,
                Err(e) => {
                    error!(error = %e, "Invalid MQTT URL, event ingress disabled");
                    return;
                }
            };

            let mut options = MqttOptions::new(&settings.client_id, host, port);
            options.set_keep_alive(settings.keep_alive);
            let (client, mut eventloop) = AsyncClient::new(options, 100);

            if let Err(e) = client.subscribe(&settings.topic, QoS::AtLeastOnce).await {
                error!(error = %e, topic = %settings.topic, "MQTT subscribe failed");
            }

            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let topic = publish.topic.clone();
                        match parse_event(&topic, &publish.payload, &settings.payload_keys) {
                            Ok(event) => {
                                debug!(
                                    element = %event.element,
                                    user = ?event.user,
                                    "AAS event received"
                                );
                                if tx.send(event).await.is_err() {
                                    info!("Event receiver dropped, stopping MQTT ingress");
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, topic = %topic, "Ignoring unparseable AAS event");
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!(topic = %settings.topic, "Connected to MQTT broker");
                        // Re-subscribe after every (re)connect.
                        if let Err(e) = client.subscribe(&settings.topic, QoS::AtLeastOnce).await {
                            warn!(error = %e, "MQTT re-subscribe failed");
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "MQTT connection error, retrying");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        })
    }
}

// =============================================================================
// Parsing
// =============================================================================

/// Parses an MQTT event into an [`ElementChanged`].
pub fn parse_event(
    topic: &str,
    payload: &[u8],
    keys: &PayloadKeys,
) -> Result<ElementChanged, MqttError> {
    let body: Json = if payload.is_empty() {
        Json::Null
    } else {
        serde_json::from_slice(payload)
            .map_err(|e| MqttError::MalformedPayload(e.to_string()))?
    };

    // Unwrap one level of envelope.
    let body = unwrap_envelope(&body);

    let hints = parse_topic(topic);

    let (value, submodel_id, id_short_path, user) = match body {
        Json::Object(map) => {
            let value = map.get(&keys.value).cloned();
            let submodel_id = map
                .get(&keys.submodel_id)
                .and_then(Json::as_str)
                .map(str::to_string);
            let id_short_path = map
                .get(&keys.id_short_path)
                .and_then(Json::as_str)
                .map(str::to_string)
                .or_else(|| {
                    map.get(&keys.id_short)
                        .and_then(Json::as_str)
                        .map(str::to_string)
                });
            let user = map.get(&keys.user).and_then(Json::as_str).map(str::to_string);
            (value, submodel_id, id_short_path, user)
        }
        // Value-only payload: identity must come from the topic.
        other if !other.is_null() => (Some(other.clone()), None, None, None),
        _ => (None, None, None, None),
    };

    let submodel_id = submodel_id
        .or(hints.submodel_id)
        .ok_or_else(|| MqttError::TopicParse(format!("no submodel id in '{}'", topic)))?;
    let id_short_path = id_short_path
        .or(hints.id_short_path)
        .ok_or_else(|| MqttError::TopicParse(format!("no idShortPath in '{}'", topic)))?;
    let value =
        value.ok_or_else(|| MqttError::MalformedPayload("event carries no value".to_string()))?;

    Ok(ElementChanged {
        element: ElementRef::new(submodel_id, id_short_path),
        value,
        user,
    })
}

fn unwrap_envelope(body: &Json) -> &Json {
    if let Json::Object(map) = body {
        for key in ["data", "payload", "event"] {
            if let Some(inner) = map.get(key) {
                if inner.is_object() {
                    return inner;
                }
            }
        }
    }
    body
}

#[derive(Debug, Default)]
struct TopicHints {
    submodel_id: Option<String>,
    id_short_path: Option<String>,
}

/// Derives element identity from the topic path segments.
fn parse_topic(topic: &str) -> TopicHints {
    let parts: Vec<&str> = topic.split('/').filter(|p| !p.is_empty()).collect();
    let mut hints = TopicHints::default();

    if let Some(index) = parts.iter().position(|&p| p == "submodels") {
        if let Some(encoded) = parts.get(index + 1) {
            hints.submodel_id = Some(decode_submodel_id_lossy(encoded));
        }
    }

    if let Some(index) = parts.iter().position(|&p| p == "submodelElements") {
        let mut tail: &[&str] = &parts[index + 1..];
        if let Some(last) = tail.last() {
            if EVENT_SUFFIXES.contains(&last.to_lowercase().as_str()) {
                tail = &tail[..tail.len() - 1];
            }
        }
        if !tail.is_empty() {
            hints.id_short_path = Some(tail.join("/"));
        }
    }

    hints
}

fn parse_mqtt_url(url: &str) -> Result<(String, u16), MqttError> {
    let stripped = url
        .strip_prefix("tcp://")
        .or_else(|| url.strip_prefix("mqtt://"))
        .unwrap_or(url);
    if stripped.is_empty() {
        return Err(MqttError::InvalidUrl(url.to_string()));
    }

    let (host, port) = match stripped.split_once(':') {
        Some((host, port_str)) => {
            let port = port_str
                .parse()
                .map_err(|_| MqttError::InvalidUrl(url.to_string()))?;
            (host.to_string(), port)
        }
        None => (stripped.to_string(), 1883),
    };
    Ok((host, port))
}

// =============================================================================
// Tests
// =============================================================================
