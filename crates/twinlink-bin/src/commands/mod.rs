// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Subcommand implementations.

pub mod run;
pub mod validate;
pub mod version;
