// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! `twinlink validate`: check a configuration file.

use std::path::Path;

use twinlink_config::load_config;

use crate::error::BinResult;

/// Loads and validates the configuration, printing a short summary.
pub async fn execute(config_path: &Path) -> BinResult<()> {
    let config = load_config(config_path)?;
    let endpoints = config.endpoint_settings()?;
    let mappings = config.resolved_mappings()?;

    println!("Configuration OK: {}", config_path.display());
    println!("  endpoints: {}", endpoints.len());
    for endpoint in &endpoints {
        println!(
            "    - {} ({}, {})",
            endpoint.name, endpoint.url, endpoint.security_policy
        );
    }
    println!("  mappings:  {}", mappings.len());
    println!(
        "  events:    {}",
        if config.aas.events.enabled {
            "mqtt"
        } else {
            "polling"
        }
    );
    Ok(())
}
