// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! `twinlink run`: run the bridge.

use std::path::Path;

use twinlink_config::load_config;

use crate::error::BinResult;
use crate::runtime::BridgeRuntime;

/// Loads the configuration and runs the bridge until shutdown.
pub async fn execute(config_path: &Path) -> BinResult<()> {
    let config = load_config(config_path)?;
    BridgeRuntime::new(config).run().await
}
