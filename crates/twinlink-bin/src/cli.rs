// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Command-line interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// TWINLINK: OPC UA ↔ AAS digital-twin bridge.
#[derive(Debug, Parser)]
#[command(name = "twinlink", version, about)]
pub struct Cli {
    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the bridge.
    Run {
        /// Path to the YAML configuration file.
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Validate a configuration file and exit.
    Validate {
        /// Path to the YAML configuration file.
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Print version information.
    Version,
}

/// Log output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable output.
    Pretty,

    /// JSON lines for log shippers.
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from(["twinlink", "run", "--config", "/etc/bridge.yaml"]);
        assert!(matches!(cli.command, Command::Run { .. }));
        assert_eq!(cli.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_parse_validate_with_json_logs() {
        let cli = Cli::parse_from([
            "twinlink",
            "--log-format",
            "json",
            "validate",
            "--config",
            "bridge.yaml",
        ]);
        assert!(matches!(cli.command, Command::Validate { .. }));
        assert_eq!(cli.log_format, LogFormat::Json);
    }

    #[test]
    fn test_parse_version() {
        let cli = Cli::parse_from(["twinlink", "version"]);
        assert!(matches!(cli.command, Command::Version));
    }
}
