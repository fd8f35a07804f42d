// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # twinlink-aas
//!
//! AAS v3 repository side of the TWINLINK bridge:
//!
//! - **Encoding**: AAS Part 2 identifier/path encoding rules
//! - **Client**: the [`client::AasRepository`] seam with an HTTP
//!   implementation ([`client::AasClient`]) and an in-memory one
//!   ([`client::MemoryRepository`])
//! - **Events**: MQTT ingress producing [`events::ElementChanged`]
//! - **Poller**: `$value` polling fallback when events are disabled

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod client;
pub mod encoding;
pub mod events;
pub mod poller;

pub use client::{AasClient, AasClientSettings, AasRepository, MemoryRepository};
pub use encoding::{decode_submodel_id_lossy, encode_id_short_path, encode_submodel_id};
pub use events::{
    AasEventSource, ElementChanged, EventSourceSettings, PayloadKeys, DEFAULT_TOPIC,
};
pub use poller::ValuePoller;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
