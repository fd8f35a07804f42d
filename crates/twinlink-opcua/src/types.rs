// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA endpoint configuration types.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use twinlink_core::error::ConfigError;

// =============================================================================
// SecurityPolicy
// =============================================================================

/// OPC UA security policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecurityPolicy {
    /// No security policy.
    #[default]
    None,

    /// Basic128Rsa15 (deprecated, legacy servers only).
    Basic128Rsa15,

    /// Basic256 (deprecated, legacy servers only).
    Basic256,

    /// Basic256Sha256 (recommended minimum).
    Basic256Sha256,

    /// Aes128_Sha256_RsaOaep.
    Aes128Sha256RsaOaep,

    /// Aes256_Sha256_RsaPss (most secure).
    Aes256Sha256RsaPss,
}

impl SecurityPolicy {
    /// Returns the short policy name as it appears in configuration.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Basic128Rsa15 => "Basic128Rsa15",
            Self::Basic256 => "Basic256",
            Self::Basic256Sha256 => "Basic256Sha256",
            Self::Aes128Sha256RsaOaep => "Aes128_Sha256_RsaOaep",
            Self::Aes256Sha256RsaPss => "Aes256_Sha256_RsaPss",
        }
    }

    /// Returns `true` if certificate material is required.
    #[inline]
    pub const fn requires_certificates(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for SecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for SecurityPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "none" => Ok(Self::None),
            "basic128rsa15" => Ok(Self::Basic128Rsa15),
            "basic256" => Ok(Self::Basic256),
            "basic256sha256" => Ok(Self::Basic256Sha256),
            "aes128sha256rsaoaep" => Ok(Self::Aes128Sha256RsaOaep),
            "aes256sha256rsapss" => Ok(Self::Aes256Sha256RsaPss),
            _ => Err(ConfigError::validation(
                "security_policy",
                format!("unknown policy '{}'", s),
            )),
        }
    }
}

// =============================================================================
// SecurityMode
// =============================================================================

/// OPC UA message security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    /// Messages are neither signed nor encrypted.
    None,

    /// Messages are signed but not encrypted.
    Sign,

    /// Messages are signed and encrypted.
    #[default]
    SignAndEncrypt,
}

impl SecurityMode {
    /// Returns the mode name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Sign => "Sign",
            Self::SignAndEncrypt => "SignAndEncrypt",
        }
    }
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for SecurityMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "none" => Ok(Self::None),
            "sign" => Ok(Self::Sign),
            "signandencrypt" => Ok(Self::SignAndEncrypt),
            _ => Err(ConfigError::validation(
                "security_mode",
                format!("unknown mode '{}'", s),
            )),
        }
    }
}

// =============================================================================
// EndpointSettings
// =============================================================================

/// Connection settings for one OPC UA endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointSettings {
    /// Endpoint identifier used by mappings.
    pub name: String,

    /// Server URL (`opc.tcp://…`).
    pub url: String,

    /// Security policy.
    #[serde(default)]
    pub security_policy: SecurityPolicy,

    /// Message security mode.
    #[serde(default)]
    pub security_mode: SecurityMode,

    /// Client certificate path.
    #[serde(default)]
    pub certificate_path: Option<PathBuf>,

    /// Client private key path.
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,

    /// Optional username for session activation.
    #[serde(default)]
    pub username: Option<String>,

    /// Optional password for session activation.
    #[serde(default)]
    pub password: Option<String>,
}

impl EndpointSettings {
    /// Creates anonymous, unsecured settings (tests and simulators).
    pub fn insecure(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            security_policy: SecurityPolicy::None,
            security_mode: SecurityMode::None,
            certificate_path: None,
            private_key_path: None,
            username: None,
            password: None,
        }
    }

    /// Validates URL scheme and certificate consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.url.starts_with("opc.tcp://") {
            return Err(ConfigError::validation(
                "url",
                format!("'{}' must start with opc.tcp://", self.url),
            ));
        }
        if self.security_policy.requires_certificates()
            && (self.certificate_path.is_none() || self.private_key_path.is_none())
        {
            return Err(ConfigError::validation(
                "security_policy",
                format!(
                    "policy {} requires certificate_path and private_key_path",
                    self.security_policy
                ),
            ));
        }
        if self.security_policy == SecurityPolicy::None && self.security_mode != SecurityMode::None
        {
            return Err(ConfigError::validation(
                "security_mode",
                "mode requires a security policy other than None",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parse() {
        assert_eq!(
            "Basic256Sha256".parse::<SecurityPolicy>().unwrap(),
            SecurityPolicy::Basic256Sha256
        );
        assert_eq!(
            "Aes128_Sha256_RsaOaep".parse::<SecurityPolicy>().unwrap(),
            SecurityPolicy::Aes128Sha256RsaOaep
        );
        assert!("TripleDes".parse::<SecurityPolicy>().is_err());
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("Sign".parse::<SecurityMode>().unwrap(), SecurityMode::Sign);
        assert_eq!(
            "SignAndEncrypt".parse::<SecurityMode>().unwrap(),
            SecurityMode::SignAndEncrypt
        );
    }

    #[test]
    fn test_endpoint_validation() {
        let ok = EndpointSettings::insecure("plant", "opc.tcp://localhost:4840");
        assert!(ok.validate().is_ok());

        let bad_scheme = EndpointSettings::insecure("plant", "http://localhost:4840");
        assert!(bad_scheme.validate().is_err());

        let mut missing_certs = EndpointSettings::insecure("plant", "opc.tcp://localhost:4840");
        missing_certs.security_policy = SecurityPolicy::Basic256Sha256;
        assert!(missing_certs.validate().is_err());
    }
}
