// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Write-path audit logging.
//!
//! The Controller produces an [`AuditRecord`] for every attempted OPC UA
//! write, whatever the outcome. Records go to an [`AuditSink`]; the bridge
//! ships a structured-log sink, a JSON-lines file sink, an in-memory sink
//! for tests, and a no-op sink.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::address::{ElementRef, NodeRef};
use crate::registry::Direction;
use crate::xsd::XsdValue;

// =============================================================================
// AuditOutcome
// =============================================================================

/// The result of an attempted write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AuditOutcome {
    /// The write was applied.
    Accepted,

    /// The target session was not ready; the event was dropped, the next
    /// event carries the latest state.
    Deferred,

    /// The write was refused.
    Rejected {
        /// Why the write was refused.
        reason: RejectReason,
    },
}

impl AuditOutcome {
    /// Creates a rejected outcome.
    pub fn rejected(reason: RejectReason) -> Self {
        Self::Rejected { reason }
    }
}

/// Rejection reasons, mirroring the codec and OPC UA error taxonomy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    /// The value could not be coerced to the declared type.
    TypeError,

    /// The coerced value violated a declared or intrinsic range.
    RangeError,

    /// The OPC UA service refused or failed the write.
    OpcError {
        /// Human-readable fault description.
        detail: String,
    },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeError => write!(f, "type_error"),
            Self::RangeError => write!(f, "range_error"),
            Self::OpcError { detail } => write!(f, "opc_error: {}", detail),
        }
    }
}

// =============================================================================
// AuditRecord
// =============================================================================

/// A single audited write attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// When the attempt happened.
    pub timestamp: DateTime<Utc>,

    /// Correlation id for tracing the write end-to-end.
    pub correlation_id: Uuid,

    /// Direction of the flow that produced the write.
    pub direction: Direction,

    /// The OPC UA node targeted.
    pub node: NodeRef,

    /// The AAS element the value came from.
    pub element: ElementRef,

    /// The last value observed on the node before the write, if known.
    pub prior_value: Option<XsdValue>,

    /// The value that was (or would have been) written.
    pub new_value: Option<XsdValue>,

    /// The user identity carried by the inbound event, when present.
    /// Serialized as `system` when absent.
    pub user_id: Option<String>,

    /// Outcome of the attempt.
    #[serde(flatten)]
    pub outcome: AuditOutcome,
}

impl AuditRecord {
    /// Creates a record stamped with the current time and a fresh
    /// correlation id.
    pub fn new(
        direction: Direction,
        node: NodeRef,
        element: ElementRef,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            correlation_id: Uuid::new_v4(),
            direction,
            node,
            element,
            prior_value: None,
            new_value: None,
            user_id: None,
            outcome,
        }
    }

    /// Attaches the prior value.
    pub fn with_prior_value(mut self, value: Option<XsdValue>) -> Self {
        self.prior_value = value;
        self
    }

    /// Attaches the new value.
    pub fn with_new_value(mut self, value: XsdValue) -> Self {
        self.new_value = Some(value);
        self
    }

    /// Attaches the user identity.
    pub fn with_user(mut self, user: Option<String>) -> Self {
        self.user_id = user;
        self
    }

    /// The effective user id, defaulting to `system`.
    pub fn effective_user(&self) -> &str {
        self.user_id.as_deref().unwrap_or("system")
    }
}

// =============================================================================
// AuditSink
// =============================================================================

/// Destination for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Records one audit entry. Sinks must not fail the write path; errors
    /// are logged and swallowed.
    async fn record(&self, record: AuditRecord);
}

/// Sink that emits each record as a structured log line.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: AuditRecord) {
        tracing::info!(
            correlation_id = %record.correlation_id,
            node = %record.node,
            element = %record.element,
            user = record.effective_user(),
            outcome = ?record.outcome,
            "audit_write"
        );
    }
}

/// Sink that appends JSON lines to a file.
#[derive(Debug)]
pub struct FileAuditSink {
    file: Mutex<File>,
}

impl FileAuditSink {
    /// Opens (or creates) the audit log file in append mode.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file: Mutex::new(file) })
    }
}

#[async_trait]
impl AuditSink for FileAuditSink {
    async fn record(&self, record: AuditRecord) {
        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize audit record");
                return;
            }
        };
        let mut file = self.file.lock().expect("audit file poisoned");
        if let Err(e) = writeln!(file, "{}", line) {
            tracing::warn!(error = %e, "Failed to append audit record");
        }
    }
}

/// Sink that keeps records in memory, for tests.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl InMemoryAuditSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all recorded entries.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().expect("audit records poisoned").clone()
    }

    /// Returns the number of recorded entries.
    pub fn len(&self) -> usize {
        self.records.lock().expect("audit records poisoned").len()
    }

    /// Returns `true` if no entries were recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn record(&self, record: AuditRecord) {
        self.records.lock().expect("audit records poisoned").push(record);
    }
}

/// Sink that discards all records.
#[derive(Debug, Default)]
pub struct NoOpAuditSink;

#[async_trait]
impl AuditSink for NoOpAuditSink {
    async fn record(&self, _record: AuditRecord) {}
}

/// Sink that fans each record out to several sinks.
pub struct CompositeAuditSink {
    sinks: Vec<std::sync::Arc<dyn AuditSink>>,
}

impl CompositeAuditSink {
    /// Creates a composite over the given sinks.
    pub fn new(sinks: Vec<std::sync::Arc<dyn AuditSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl AuditSink for CompositeAuditSink {
    async fn record(&self, record: AuditRecord) {
        for sink in &self.sinks {
            sink.record(record.clone()).await;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
