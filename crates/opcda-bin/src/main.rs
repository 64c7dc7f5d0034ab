// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! `opcda` binary entry point.

use opcda_bin::error::report_error_and_exit;
use opcda_bin::{commands, init_logging, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    if let Err(e) = init_logging(cli.effective_log_level(), cli.log_format) {
        report_error_and_exit(e);
    }

    tracing::debug!(config = %cli.config.display(), "Starting opcda");

    if let Err(e) = commands::execute(cli).await {
        report_error_and_exit(e);
    }
}
