// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration file loading.

use std::path::Path;

use twinlink_core::error::{ConfigError, ConfigResult};

use crate::schema::BridgeConfig;

/// Loads and validates a YAML configuration file.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<BridgeConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let config: BridgeConfig = serde_yaml::from_str(&contents)
        .map_err(|e| ConfigError::parse(path, e.to_string()))?;

    config.validate()?;
    Ok(config)
}

// =============================================================================
// Tests
// =============================================================================
