// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! AAS v3 repository access.
//!
//! [`AasRepository`] is the seam the sync engine talks through. The
//! production implementation is [`AasClient`] over HTTP; tests and the
//! `memory` repository type use [`MemoryRepository`].

use std::collections::{HashMap, HashSet};
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value as Json};
use tracing::{debug, warn};

use twinlink_core::address::ElementRef;
use twinlink_core::error::{AasError, AasResult};
use twinlink_core::retry::BackoffPolicy;
use twinlink_core::xsd::XsdType;

use crate::encoding::{encode_id_short_path, encode_submodel_id};

// =============================================================================
// AasRepository
// =============================================================================

/// Repository operations used by the Monitor, Controller, and poller.
#[async_trait]
pub trait AasRepository: Send + Sync {
    /// Reads an element's `$value`.
    async fn read_value(&self, element: &ElementRef) -> AasResult<Json>;

    /// Writes an element's `$value`.
    async fn write_value(&self, element: &ElementRef, value: &Json) -> AasResult<()>;

    /// Creates a submodel carrying only its identifier.
    async fn create_submodel(&self, submodel_id: &str) -> AasResult<()>;

    /// Creates a minimal Property element for the mapping's value type.
    async fn create_element(&self, element: &ElementRef, value_type: XsdType) -> AasResult<()>;

    /// Lightweight liveness probe against the repository.
    async fn probe(&self) -> AasResult<()>;

    /// When the repository last answered successfully.
    fn last_success(&self) -> Option<Instant>;
}

// =============================================================================
// AasClientSettings
// =============================================================================

/// Settings for the HTTP repository client.
#[derive(Debug, Clone)]
pub struct AasClientSettings {
    /// Base URL of the repository (no trailing slash).
    pub base_url: String,

    /// Base64url-encode submodel identifiers in paths.
    pub encode_identifiers: bool,

    /// Total deadline per request.
    pub request_timeout: Duration,

    /// Connect deadline per request.
    pub connect_timeout: Duration,

    /// Optional bearer token.
    pub bearer_token: Option<String>,

    /// Backoff schedule for transient retries.
    pub retry: BackoffPolicy,

    /// Retry attempts for transient failures.
    pub max_retries: u32,
}

impl Default for AasClientSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8081".to_string(),
            encode_identifiers: true,
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(2),
            bearer_token: None,
            retry: BackoffPolicy::transient_http(),
            max_retries: 3,
        }
    }
}

// =============================================================================
// AasClient
// =============================================================================

/// HTTP client for an AAS v3 submodel repository.
pub struct AasClient {
    http: reqwest::Client,
    settings: AasClientSettings,
    last_success: StdMutex<Option<Instant>>,
}

impl AasClient {
    /// Creates the client.
    pub fn new(settings: AasClientSettings) -> AasResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|e| AasError::transport(e.to_string()))?;

        Ok(Self {
            http,
            settings,
            last_success: StdMutex::new(None),
        })
    }

    fn element_value_url(&self, element: &ElementRef) -> String {
        format!(
            "{}/submodels/{}/submodel-elements/{}/$value",
            self.settings.base_url,
            encode_submodel_id(&element.submodel_id, self.settings.encode_identifiers),
            encode_id_short_path(&element.id_short_path),
        )
    }

    fn elements_collection_url(&self, element: &ElementRef) -> String {
        let base = format!(
            "{}/submodels/{}/submodel-elements",
            self.settings.base_url,
            encode_submodel_id(&element.submodel_id, self.settings.encode_identifiers),
        );
        match element.parent_path() {
            Some(parent) => format!("{}/{}", base, encode_id_short_path(parent)),
            None => base,
        }
    }

    fn record_success(&self) {
        *self.last_success.lock().expect("probe clock poisoned") = Some(Instant::now());
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.settings.bearer_token {
            Some(token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }

    /// Sends a request, retrying transient failures (transport errors, 5xx,
    /// 429) with capped backoff.
    async fn execute(&self, request: reqwest::RequestBuilder) -> AasResult<reqwest::Response> {
        let mut attempt: u32 = 0;
        loop {
            let cloned = request
                .try_clone()
                .ok_or_else(|| AasError::transport("request body is not replayable"))?;

            let error = match cloned.send().await {
                Ok(response) if response.status().is_success() => {
                    self.record_success();
                    return Ok(response);
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    let body = response.text().await.unwrap_or_default();
                    AasError::from_status(status, body)
                }
                Err(e) => AasError::transport(e.to_string()),
            };

            if error.is_retryable() && attempt < self.settings.max_retries {
                let delay = self.settings.retry.delay(attempt);
                debug!(attempt, error = %error, delay_ms = delay.as_millis() as u64, "Retrying AAS request");
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }
            return Err(error);
        }
    }
}

#[async_trait]
impl AasRepository for AasClient {
    async fn read_value(&self, element: &ElementRef) -> AasResult<Json> {
        let url = self.element_value_url(element);
        debug!(element = %element, url = %url, "GET element $value");

        let response = self.execute(self.authorize(self.http.get(&url))).await?;
        let body: Json = response
            .json()
            .await
            .map_err(|e| AasError::parse(e.to_string()))?;

        // Some repositories wrap the bare value in `{"value": …}`.
        match body {
            Json::Object(ref map) if map.len() == 1 && map.contains_key("value") => {
                Ok(map["value"].clone())
            }
            other => Ok(other),
        }
    }

    async fn write_value(&self, element: &ElementRef, value: &Json) -> AasResult<()> {
        let url = self.element_value_url(element);
        debug!(element = %element, url = %url, "PATCH element $value");

        let request = self
            .authorize(self.http.patch(&url))
            .header("Content-Type", "application/json")
            .json(&json!({ "value": value }));

        self.execute(request).await.map(|_| ())
    }

    async fn create_submodel(&self, submodel_id: &str) -> AasResult<()> {
        let url = format!("{}/submodels", self.settings.base_url);
        debug!(submodel_id, url = %url, "POST submodel");

        let body = json!({
            "modelType": "Submodel",
            "id": submodel_id,
            "idShort": derive_id_short(submodel_id),
        });
        let request = self.authorize(self.http.post(&url)).json(&body);

        match self.execute(request).await {
            Ok(_) => Ok(()),
            // An existing submodel is fine; creation is first-use only.
            Err(AasError::PermanentClient { status: 409, .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn create_element(&self, element: &ElementRef, value_type: XsdType) -> AasResult<()> {
        let url = self.elements_collection_url(element);
        debug!(element = %element, url = %url, "POST submodel element");

        let body = json!({
            "modelType": "Property",
            "idShort": element.id_short(),
            "valueType": value_type.as_str(),
        });
        let request = self.authorize(self.http.post(&url)).json(&body);

        match self.execute(request).await {
            Ok(_) => Ok(()),
            Err(AasError::PermanentClient { status: 409, .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn probe(&self) -> AasResult<()> {
        let url = format!("{}/submodels?limit=1", self.settings.base_url);
        self.execute(self.authorize(self.http.get(&url)))
            .await
            .map(|_| ())
    }

    fn last_success(&self) -> Option<Instant> {
        *self.last_success.lock().expect("probe clock poisoned")
    }
}

/// Derives a legal idShort from a submodel IRI/URN for auto-created
/// submodels: the trailing segment, restricted to `[A-Za-z0-9_]`.
fn derive_id_short(submodel_id: &str) -> String {
    let tail = submodel_id
        .rsplit([':', '/', '#'])
        .next()
        .unwrap_or(submodel_id);
    let cleaned: String = tail
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() || cleaned.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        format!("Submodel_{}", cleaned)
    } else {
        cleaned
    }
}

// =============================================================================
// MemoryRepository
// =============================================================================

/// In-memory repository used by the `memory` provider type and tests.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    inner: StdMutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    submodels: HashSet<String>,
    values: HashMap<ElementRef, Json>,
    last_success: Option<Instant>,
    writes: u64,
}

impl MemoryRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seeds an element (the submodel is created implicitly).
    pub fn seed(&self, element: ElementRef, value: Json) {
        let mut state = self.inner.lock().expect("memory repo poisoned");
        state.submodels.insert(element.submodel_id.clone());
        state.values.insert(element, value);
    }

    /// Returns the stored value of an element, if any.
    pub fn value(&self, element: &ElementRef) -> Option<Json> {
        self.inner
            .lock()
            .expect("memory repo poisoned")
            .values
            .get(element)
            .cloned()
    }

    /// Returns how many writes were applied.
    pub fn write_count(&self) -> u64 {
        self.inner.lock().expect("memory repo poisoned").writes
    }

    /// Returns `true` if the submodel exists.
    pub fn has_submodel(&self, submodel_id: &str) -> bool {
        self.inner
            .lock()
            .expect("memory repo poisoned")
            .submodels
            .contains(submodel_id)
    }
}

#[async_trait]
impl AasRepository for MemoryRepository {
    async fn read_value(&self, element: &ElementRef) -> AasResult<Json> {
        let mut state = self.inner.lock().expect("memory repo poisoned");
        state.last_success = Some(Instant::now());
        state
            .values
            .get(element)
            .cloned()
            .ok_or_else(|| AasError::not_found(element.to_string()))
    }

    async fn write_value(&self, element: &ElementRef, value: &Json) -> AasResult<()> {
        let mut state = self.inner.lock().expect("memory repo poisoned");
        state.last_success = Some(Instant::now());
        if !state.values.contains_key(element) {
            return Err(AasError::not_found(element.to_string()));
        }
        state.values.insert(element.clone(), value.clone());
        state.writes += 1;
        Ok(())
    }

    async fn create_submodel(&self, submodel_id: &str) -> AasResult<()> {
        let mut state = self.inner.lock().expect("memory repo poisoned");
        state.last_success = Some(Instant::now());
        state.submodels.insert(submodel_id.to_string());
        Ok(())
    }

    async fn create_element(&self, element: &ElementRef, _value_type: XsdType) -> AasResult<()> {
        let mut state = self.inner.lock().expect("memory repo poisoned");
        state.last_success = Some(Instant::now());
        if !state.submodels.contains(&element.submodel_id) {
            warn!(element = %element, "Creating element in unknown submodel");
            state.submodels.insert(element.submodel_id.clone());
        }
        state.values.entry(element.clone()).or_insert(Json::Null);
        Ok(())
    }

    async fn probe(&self) -> AasResult<()> {
        self.inner.lock().expect("memory repo poisoned").last_success = Some(Instant::now());
        Ok(())
    }

    fn last_success(&self) -> Option<Instant> {
        self.inner.lock().expect("memory repo poisoned").last_success
    }
}

// =============================================================================
// Tests
// =============================================================================
