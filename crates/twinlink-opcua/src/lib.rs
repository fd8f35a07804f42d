// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # twinlink-opcua
//!
//! OPC UA client side of the TWINLINK bridge:
//!
//! - **Transport**: the [`transport::OpcUaTransport`] seam, implemented for
//!   production by [`real::RealTransport`] over the `opcua` crate and by
//!   in-memory mocks in tests
//! - **Pool**: [`pool::ConnectionPool`], one supervised session per endpoint
//!   with reconnect and subscription restoration
//! - **Types**: endpoint settings, security policy and mode

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod pool;
pub mod real;
pub mod transport;
pub mod types;

pub use pool::{ConnectionPool, PoolSettings, SessionState, SubscriptionHandle, SubscriptionSpec};
pub use real::{RealTransport, RealTransportFactory};
pub use transport::{DataChange, MonitoredItemRequest, OpcUaTransport, TransportFactory};
pub use types::{EndpointSettings, SecurityMode, SecurityPolicy};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
