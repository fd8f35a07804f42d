// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Unified error hierarchy for TWINLINK.
//!
//! # Error Hierarchy
//!
//! ```text
//! BridgeError (root)
//! ├── ConfigError   - Configuration parsing and validation (fatal at startup)
//! ├── CodecError    - Type/range/null coercion failures
//! ├── OpcUaError    - OPC UA connection and service faults
//! ├── AasError      - AAS repository REST failures
//! ├── MqttError     - MQTT ingress failures
//! └── Unavailable   - A dependency is temporarily not ready
//! ```
//!
//! Only `ConfigError` aborts startup. Every runtime error is recovered
//! locally: the affected sample or event is dropped, an audit record or a
//! structured log line is emitted, and processing continues.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// BridgeError - Root Error Type
// =============================================================================

/// The root error type for TWINLINK.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Value coercion error.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// OPC UA error.
    #[error("OPC UA error: {0}")]
    OpcUa(#[from] OpcUaError),

    /// AAS repository error.
    #[error("AAS error: {0}")]
    Aas(#[from] AasError),

    /// MQTT ingress error.
    #[error("MQTT error: {0}")]
    Mqtt(#[from] MqttError),

    /// A dependency is temporarily not ready.
    #[error("Dependency unavailable: {reason}")]
    Unavailable {
        /// What is unavailable.
        reason: String,
    },
}

impl BridgeError {
    /// Creates an unavailable error.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable { reason: reason.into() }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            BridgeError::OpcUa(e) => e.is_retryable(),
            BridgeError::Aas(e) => e.is_retryable(),
            BridgeError::Mqtt(_) | BridgeError::Unavailable { .. } => true,
            _ => false,
        }
    }

    /// Returns the error type as a string for logging/metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            BridgeError::Config(_) => "config",
            BridgeError::Codec(e) => e.error_type(),
            BridgeError::OpcUa(_) => "opcua",
            BridgeError::Aas(_) => "aas",
            BridgeError::Mqtt(_) => "mqtt",
            BridgeError::Unavailable { .. } => "unavailable",
        }
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            BridgeError::Config(e) => format!("설정 오류: {}", e.user_message()),
            BridgeError::Codec(e) => format!("값 변환 오류: {}", e),
            BridgeError::OpcUa(e) => format!("장비 통신 오류: {}", e.user_message()),
            BridgeError::Aas(e) => format!("AAS 저장소 오류: {}", e.user_message()),
            BridgeError::Mqtt(_) => "이벤트 수신 오류가 발생했습니다".to_string(),
            BridgeError::Unavailable { .. } => "의존 구성 요소가 준비되지 않았습니다".to_string(),
        }
    }
}

// =============================================================================
// ConfigError
// =============================================================================

/// Configuration-related errors. Fatal at startup, never raised at runtime.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to parse configuration file.
    #[error("Failed to parse config file '{path}': {message}")]
    Parse {
        /// Path to the configuration file.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Validation failed for '{field}': {message}")]
    Validation {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// Required field is missing.
    #[error("Missing required field: {field}")]
    MissingField {
        /// The missing field name.
        field: String,
    },

    /// File I/O error.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        /// Path to the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Invalid OPC UA node id format.
    #[error("Invalid node id '{node_id}': {message}")]
    InvalidNodeId {
        /// The invalid node id string.
        node_id: String,
        /// Error message.
        message: String,
    },

    /// A mapping references an endpoint that is not configured.
    #[error("Unknown endpoint reference: {endpoint}")]
    UnknownEndpoint {
        /// The unresolved endpoint name or URL.
        endpoint: String,
    },

    /// Duplicate mapping key on one of the registry indices.
    #[error("Duplicate mapping for {key}")]
    DuplicateMapping {
        /// The duplicated node or element key.
        key: String,
    },

    /// The declared value type is not part of the supported XSD set.
    #[error("Unsupported value type: {value_type}")]
    UnsupportedValueType {
        /// The offending type name.
        value_type: String,
    },
}

impl ConfigError {
    /// Creates a validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a missing field error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField { field: field.into() }
    }

    /// Creates a parse error.
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid node id error.
    pub fn invalid_node_id(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidNodeId {
            node_id: node_id.into(),
            message: message.into(),
        }
    }

    /// Creates an unknown endpoint error.
    pub fn unknown_endpoint(endpoint: impl Into<String>) -> Self {
        Self::UnknownEndpoint { endpoint: endpoint.into() }
    }

    /// Creates a duplicate mapping error.
    pub fn duplicate_mapping(key: impl Into<String>) -> Self {
        Self::DuplicateMapping { key: key.into() }
    }

    /// Creates an unsupported value type error.
    pub fn unsupported_value_type(value_type: impl Into<String>) -> Self {
        Self::UnsupportedValueType {
            value_type: value_type.into(),
        }
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            ConfigError::Parse { path, message } => {
                format!("설정 파일 파싱 실패 ({}): {}", path.display(), message)
            }
            ConfigError::Validation { field, message } => {
                format!("설정 검증 실패 ({}): {}", field, message)
            }
            ConfigError::MissingField { field } => format!("필수 설정 누락: {}", field),
            ConfigError::Io { path, .. } => {
                format!("설정 파일 읽기 실패: {}", path.display())
            }
            ConfigError::InvalidNodeId { node_id, message } => {
                format!("잘못된 노드 ID ({}): {}", node_id, message)
            }
            ConfigError::UnknownEndpoint { endpoint } => {
                format!("알 수 없는 엔드포인트: {}", endpoint)
            }
            ConfigError::DuplicateMapping { key } => format!("중복된 매핑: {}", key),
            ConfigError::UnsupportedValueType { value_type } => {
                format!("지원하지 않는 값 타입: {}", value_type)
            }
        }
    }
}

// =============================================================================
// CodecError
// =============================================================================

/// Value coercion errors raised by the type codec.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    /// A value cannot be coerced to the declared type.
    #[error("Type error: cannot coerce {found} to {expected}")]
    Type {
        /// The declared target type.
        expected: String,
        /// What was actually found.
        found: String,
    },

    /// A coerced value falls outside the declared or intrinsic range.
    #[error("Range error: {value} outside [{min}, {max}]")]
    Range {
        /// Display form of the offending value.
        value: String,
        /// Inclusive lower bound.
        min: String,
        /// Inclusive upper bound.
        max: String,
    },

    /// A required non-null value was null.
    #[error("Null value for non-nullable mapping")]
    Null,
}

impl CodecError {
    /// Creates a type error.
    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::Type {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Creates a range error.
    pub fn out_of_range(
        value: impl ToString,
        min: impl ToString,
        max: impl ToString,
    ) -> Self {
        Self::Range {
            value: value.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        }
    }

    /// Returns the error type for logging/metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            CodecError::Type { .. } => "type_error",
            CodecError::Range { .. } => "range_error",
            CodecError::Null => "null_error",
        }
    }
}

// =============================================================================
// OpcUaError
// =============================================================================

/// OPC UA connection and service faults.
#[derive(Debug, Error)]
pub enum OpcUaError {
    /// Connection to the server failed.
    #[error("Connection failed for '{endpoint}': {message}")]
    ConnectionFailed {
        /// Endpoint name or URL.
        endpoint: String,
        /// Error message.
        message: String,
    },

    /// Authentication was rejected by the server. Fatal at startup.
    #[error("Authentication failed for '{endpoint}': {message}")]
    AuthFailed {
        /// Endpoint name or URL.
        endpoint: String,
        /// Error message.
        message: String,
    },

    /// The session is not connected.
    #[error("Session is not connected")]
    NotConnected,

    /// The session is not ready within the bounded wait.
    #[error("Session unavailable for '{endpoint}'")]
    Unavailable {
        /// Endpoint name or URL.
        endpoint: String,
    },

    /// An operation exceeded its deadline.
    #[error("Operation timed out after {deadline:?}")]
    Timeout {
        /// The deadline that was exceeded.
        deadline: Duration,
    },

    /// A service call returned a bad status code.
    #[error("Service fault on '{node_id}': status 0x{status:08X}")]
    Status {
        /// The node the operation targeted.
        node_id: String,
        /// The OPC UA status code.
        status: u32,
    },

    /// Subscription management failed.
    #[error("Subscription error: {message}")]
    Subscription {
        /// Error message.
        message: String,
    },
}

impl OpcUaError {
    /// Creates a connection failed error.
    pub fn connection_failed(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Creates an authentication failure error.
    pub fn auth_failed(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AuthFailed {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Creates an unavailable error.
    pub fn unavailable(endpoint: impl Into<String>) -> Self {
        Self::Unavailable { endpoint: endpoint.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(deadline: Duration) -> Self {
        Self::Timeout { deadline }
    }

    /// Creates a service fault error.
    pub fn status(node_id: impl Into<String>, status: u32) -> Self {
        Self::Status {
            node_id: node_id.into(),
            status,
        }
    }

    /// Creates a subscription error.
    pub fn subscription(message: impl Into<String>) -> Self {
        Self::Subscription { message: message.into() }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OpcUaError::ConnectionFailed { .. }
                | OpcUaError::NotConnected
                | OpcUaError::Unavailable { .. }
                | OpcUaError::Timeout { .. }
        )
    }

    /// Returns `true` if this is an authentication failure.
    pub fn is_auth(&self) -> bool {
        matches!(self, OpcUaError::AuthFailed { .. })
    }

    /// Returns the error type for logging/metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            OpcUaError::ConnectionFailed { .. } => "connection_failed",
            OpcUaError::AuthFailed { .. } => "auth_failed",
            OpcUaError::NotConnected => "not_connected",
            OpcUaError::Unavailable { .. } => "unavailable",
            OpcUaError::Timeout { .. } => "timeout",
            OpcUaError::Status { .. } => "service_fault",
            OpcUaError::Subscription { .. } => "subscription",
        }
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            OpcUaError::ConnectionFailed { endpoint, .. } => {
                format!("장비 연결에 실패했습니다 ({})", endpoint)
            }
            OpcUaError::AuthFailed { endpoint, .. } => {
                format!("장비 인증에 실패했습니다 ({})", endpoint)
            }
            OpcUaError::NotConnected => "장비가 연결되어 있지 않습니다".to_string(),
            OpcUaError::Unavailable { endpoint } => {
                format!("세션이 준비되지 않았습니다 ({})", endpoint)
            }
            OpcUaError::Timeout { deadline } => {
                format!("응답 시간 초과 ({:.1}초)", deadline.as_secs_f64())
            }
            OpcUaError::Status { node_id, status } => {
                format!("쓰기 실패 ({}): 0x{:08X}", node_id, status)
            }
            OpcUaError::Subscription { .. } => "구독 오류가 발생했습니다".to_string(),
        }
    }
}

// =============================================================================
// AasError
// =============================================================================

/// AAS repository REST failures.
#[derive(Debug, Error)]
pub enum AasError {
    /// The target submodel or element does not exist.
    #[error("Not found: {resource}")]
    NotFound {
        /// The missing resource path.
        resource: String,
    },

    /// Authentication or authorization was rejected. Fatal at startup.
    #[error("Authentication rejected (status {status})")]
    Auth {
        /// HTTP status code (401 or 403).
        status: u16,
    },

    /// A non-retryable client error (4xx other than 404/401/403/429).
    #[error("Permanent client error (status {status}): {message}")]
    PermanentClient {
        /// HTTP status code.
        status: u16,
        /// Response body excerpt.
        message: String,
    },

    /// A server-side error (5xx). Retryable.
    #[error("Server error (status {status})")]
    Server {
        /// HTTP status code.
        status: u16,
    },

    /// Rate limited (429). Retryable.
    #[error("Rate limited by repository")]
    RateLimited,

    /// A transport-level failure (connect reset, DNS, TLS). Retryable.
    #[error("Transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
    },

    /// Response body could not be parsed.
    #[error("Parse error: {message}")]
    Parse {
        /// Error message.
        message: String,
    },
}

impl AasError {
    /// Creates a not found error.
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound { resource: resource.into() }
    }

    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport { message: message.into() }
    }

    /// Creates a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse { message: message.into() }
    }

    /// Classifies an HTTP status code into an error.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        match status {
            404 => Self::NotFound { resource: message.into() },
            401 | 403 => Self::Auth { status },
            429 => Self::RateLimited,
            500..=599 => Self::Server { status },
            _ => Self::PermanentClient {
                status,
                message: message.into(),
            },
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AasError::Server { .. } | AasError::RateLimited | AasError::Transport { .. }
        )
    }

    /// Returns `true` if this is an authentication failure.
    pub fn is_auth(&self) -> bool {
        matches!(self, AasError::Auth { .. })
    }

    /// Returns the error type for logging/metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            AasError::NotFound { .. } => "not_found",
            AasError::Auth { .. } => "auth",
            AasError::PermanentClient { .. } => "permanent_client",
            AasError::Server { .. } => "server",
            AasError::RateLimited => "rate_limited",
            AasError::Transport { .. } => "transport",
            AasError::Parse { .. } => "parse",
        }
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            AasError::NotFound { resource } => format!("대상을 찾을 수 없습니다 ({})", resource),
            AasError::Auth { .. } => "저장소 인증에 실패했습니다".to_string(),
            AasError::PermanentClient { status, .. } => {
                format!("요청이 거부되었습니다 (status {})", status)
            }
            AasError::Server { status } => format!("저장소 서버 오류 (status {})", status),
            AasError::RateLimited => "요청 한도를 초과했습니다".to_string(),
            AasError::Transport { .. } => "저장소 연결에 실패했습니다".to_string(),
            AasError::Parse { .. } => "응답을 해석할 수 없습니다".to_string(),
        }
    }
}

// =============================================================================
// MqttError
// =============================================================================

/// MQTT ingress failures.
#[derive(Debug, Clone, Error)]
pub enum MqttError {
    /// Broker URL could not be parsed.
    #[error("Invalid MQTT URL: {0}")]
    InvalidUrl(String),

    /// Subscribing to the topic pattern failed.
    #[error("Subscription error: {0}")]
    Subscribe(String),

    /// The client lost its connection to the broker.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A received payload could not be interpreted.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// A received topic did not match the accepted grammar.
    #[error("Topic parse failure: {0}")]
    TopicParse(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// A Result type with BridgeError.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// A Result type with ConfigError.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// A Result type with CodecError.
pub type CodecResult<T> = Result<T, CodecError>;

/// A Result type with OpcUaError.
pub type OpcUaResult<T> = Result<T, OpcUaError>;

/// A Result type with AasError.
pub type AasResult<T> = Result<T, AasError>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcua_error_retryable() {
        assert!(OpcUaError::timeout(Duration::from_secs(5)).is_retryable());
        assert!(OpcUaError::connection_failed("plc", "refused").is_retryable());
        assert!(OpcUaError::NotConnected.is_retryable());
        assert!(!OpcUaError::status("ns=2;s=X", 0x80340000).is_retryable());
        assert!(!OpcUaError::auth_failed("plc", "denied").is_retryable());
    }

    #[test]
    fn test_aas_error_classification() {
        assert!(matches!(AasError::from_status(404, "x"), AasError::NotFound { .. }));
        assert!(matches!(AasError::from_status(401, "x"), AasError::Auth { status: 401 }));
        assert!(matches!(AasError::from_status(429, "x"), AasError::RateLimited));
        assert!(matches!(AasError::from_status(503, "x"), AasError::Server { status: 503 }));
        assert!(matches!(
            AasError::from_status(422, "x"),
            AasError::PermanentClient { status: 422, .. }
        ));
    }

    #[test]
    fn test_aas_error_retryable() {
        assert!(AasError::from_status(500, "x").is_retryable());
        assert!(AasError::RateLimited.is_retryable());
        assert!(AasError::transport("reset").is_retryable());
        assert!(!AasError::from_status(422, "x").is_retryable());
        assert!(!AasError::not_found("x").is_retryable());
    }

    #[test]
    fn test_codec_error_type() {
        assert_eq!(
            CodecError::type_mismatch("xs:int", "string").error_type(),
            "type_error"
        );
        assert_eq!(CodecError::out_of_range(300, 0, 255).error_type(), "range_error");
        assert_eq!(CodecError::Null.error_type(), "null_error");
    }

    #[test]
    fn test_bridge_error_conversion() {
        let err: BridgeError = OpcUaError::timeout(Duration::from_secs(5)).into();
        assert!(err.is_retryable());
        assert_eq!(err.error_type(), "opcua");

        let err: BridgeError = ConfigError::missing_field("url").into();
        assert!(!err.is_retryable());
        assert_eq!(err.error_type(), "config");
    }
}
