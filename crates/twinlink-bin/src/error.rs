// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Binary-level errors and process exit codes.

use thiserror::Error;

use twinlink_core::error::{BridgeError, ConfigError, MqttError};

/// Errors surfaced by the binary, each with a defined exit code.
#[derive(Debug, Error)]
pub enum BinError {
    /// Invalid configuration. Exit code 1.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Fatal OPC UA authentication error at startup. Exit code 2.
    #[error("OPC UA authentication error: {0}")]
    OpcUaAuth(String),

    /// Fatal AAS authentication error at startup. Exit code 3.
    #[error("AAS authentication error: {0}")]
    AasAuth(String),

    /// Any other runtime failure. Exit code 1.
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl BinError {
    /// Returns the process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            BinError::Configuration(_) => 1,
            BinError::OpcUaAuth(_) => 2,
            BinError::AasAuth(_) => 3,
            BinError::Runtime(_) => 1,
        }
    }
}

impl From<ConfigError> for BinError {
    fn from(e: ConfigError) -> Self {
        Self::Configuration(e.to_string())
    }
}

impl From<MqttError> for BinError {
    fn from(e: MqttError) -> Self {
        Self::Configuration(e.to_string())
    }
}

impl From<BridgeError> for BinError {
    fn from(e: BridgeError) -> Self {
        match e {
            BridgeError::Config(inner) => Self::Configuration(inner.to_string()),
            BridgeError::OpcUa(inner) if inner.is_auth() => Self::OpcUaAuth(inner.to_string()),
            BridgeError::Aas(inner) if inner.is_auth() => Self::AasAuth(inner.to_string()),
            other => Self::Runtime(other.to_string()),
        }
    }
}

/// A Result type with BinError.
pub type BinResult<T> = Result<T, BinError>;

#[cfg(test)]
mod tests {
    use super::*;
    use twinlink_core::error::{AasError, OpcUaError};

    #[test]
    fn test_exit_codes() {
        assert_eq!(BinError::Configuration("x".into()).exit_code(), 1);
        assert_eq!(BinError::OpcUaAuth("x".into()).exit_code(), 2);
        assert_eq!(BinError::AasAuth("x".into()).exit_code(), 3);
        assert_eq!(BinError::Runtime("x".into()).exit_code(), 1);
    }

    #[test]
    fn test_bridge_error_mapping() {
        let err: BinError = BridgeError::OpcUa(OpcUaError::auth_failed("plc", "denied")).into();
        assert_eq!(err.exit_code(), 2);

        let err: BinError = BridgeError::Aas(AasError::Auth { status: 401 }).into();
        assert_eq!(err.exit_code(), 3);

        let err: BinError =
            BridgeError::OpcUa(OpcUaError::connection_failed("plc", "refused")).into();
        assert_eq!(err.exit_code(), 1);
    }
}
