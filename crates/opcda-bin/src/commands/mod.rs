// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI command implementations.

mod validate;
mod version;

pub use validate::{collect_warnings, validate};
pub use version::version;

use crate::cli::{Cli, Commands};
use crate::error::BinResult;

/// Executes the command selected on the command line.
pub async fn execute(cli: Cli) -> BinResult<()> {
    match cli.effective_command() {
        Commands::Validate(args) => validate::validate(&cli, args),
        Commands::Version => version::version(&cli),
    }
}
