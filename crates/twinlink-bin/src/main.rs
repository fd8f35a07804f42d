// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! TWINLINK bridge entry point.

mod cli;
mod commands;
mod error;
mod logging;
mod runtime;
mod shutdown;

use clap::Parser;
use tracing::error;

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.log_format);

    let result = match cli.command {
        Command::Run { config } => commands::run::execute(&config).await,
        Command::Validate { config } => commands::validate::execute(&config).await,
        Command::Version => {
            commands::version::execute();
            Ok(())
        }
    };

    if let Err(e) = result {
        error!(error = %e, "Bridge failed");
        std::process::exit(e.exit_code());
    }
}
