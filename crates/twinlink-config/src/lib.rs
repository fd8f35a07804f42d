// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # twinlink-config
//!
//! Configuration schema, YAML loading, and validation for the TWINLINK
//! bridge. Invalid configuration is fatal at startup; nothing in this crate
//! is consulted again at runtime.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod loader;
pub mod schema;

pub use loader::load_config;
pub use schema::{
    AasKind, AasSection, AuditSection, BridgeConfig, EndpointEntry, EventsSection, MappingEntry,
    OpcUaSection, RangeEntry, SyncSection,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
