// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # twinlink-core
//!
//! Core abstractions and shared types for the TWINLINK digital-twin bridge.
//!
//! This crate provides the foundational pieces used across all TWINLINK
//! components:
//!
//! - **Address**: `NodeId`/`NodeRef` (OPC UA side) and `ElementRef` (AAS side)
//! - **Variant / Xsd**: the two tagged value sums the bridge moves between
//! - **Codec**: bidirectional type coercion, range validation, canonical hash
//! - **Registry**: the immutable node ↔ element mapping table
//! - **Dedup**: the loop-suppression cache that breaks feedback loops
//! - **Audit**: write-path audit records and sinks
//! - **Retry**: capped, jittered exponential backoff
//! - **Error**: unified error hierarchy

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod address;
pub mod audit;
pub mod codec;
pub mod dedup;
pub mod error;
pub mod registry;
pub mod retry;
pub mod variant;
pub mod xsd;

pub use address::{ElementRef, NodeId, NodeIdentifier, NodeRef};
pub use audit::{
    AuditOutcome, AuditRecord, AuditSink, CompositeAuditSink, FileAuditSink, InMemoryAuditSink,
    NoOpAuditSink, RejectReason, TracingAuditSink,
};
pub use codec::ValueHash;
pub use dedup::SuppressionCache;
pub use error::{
    AasError, AasResult, BridgeError, BridgeResult, CodecError, CodecResult, ConfigError,
    ConfigResult, MqttError, OpcUaError, OpcUaResult,
};
pub use registry::{Direction, Mapping, MappingRegistry, ValueRange};
pub use retry::BackoffPolicy;
pub use variant::{Variant, VariantType};
pub use xsd::{XsdType, XsdValue};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
