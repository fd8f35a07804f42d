// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # twinlink-sync
//!
//! The synchronization engine of the TWINLINK bridge:
//!
//! - **Monitor**: OPC UA data changes → AAS `$value` writes
//! - **Controller**: AAS events/polls → validated OPC UA writes with audit
//! - **Manager**: lifecycle orchestration, health, loop suppression wiring

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod cache;
pub mod controller;
pub mod manager;
pub mod monitor;

pub use cache::NodeValueCache;
pub use controller::{Controller, ControllerStats};
pub use manager::{HealthStatus, SyncManager, SyncSettings};
pub use monitor::{Monitor, MonitorSettings, MonitorStats};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
