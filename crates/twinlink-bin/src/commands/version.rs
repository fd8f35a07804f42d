// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! `twinlink version`: print version information.

/// Prints version information.
pub fn execute() {
    println!("twinlink {}", env!("CARGO_PKG_VERSION"));
    println!("  core:  {}", twinlink_core::VERSION);
    println!("  opcua: {}", twinlink_opcua::VERSION);
    println!("  aas:   {}", twinlink_aas::VERSION);
    println!("  sync:  {}", twinlink_sync::VERSION);
}
