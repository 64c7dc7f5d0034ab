// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `validate` command.

use opcda_client::DeliveryMode;
use opcda_config::ClientConfig;

use crate::cli::{Cli, OutputFormat, ValidateArgs};
use crate::error::{BinError, BinResult};

/// Loads, validates and summarizes the configuration.
pub fn validate(cli: &Cli, args: ValidateArgs) -> BinResult<()> {
    let config_path = &cli.config;
    let config = opcda_config::load_config(config_path)?;

    // The engine settings carry their own checks; run them as the client would.
    for connection in &config.connections {
        for engine in &connection.engines {
            engine.to_settings().validate()?;
        }
    }

    let warnings = collect_warnings(&config);

    match args.format {
        OutputFormat::Text => {
            println!("✓ Configuration is valid: {}", config_path.display());
            println!();
            println!("Summary:");
            println!("  Client:      {}", config.client.name);
            println!("  Connections: {}", config.connections.len());
            println!("  Engines:     {}", config.engine_count());
            println!("  Items:       {}", config.item_count());

            for connection in &config.connections {
                println!();
                println!(
                    "  {} ({}, reconnect every {:?})",
                    connection.name,
                    connection.target(),
                    connection.reconnect_settings().delay
                );
                for engine in &connection.engines {
                    let settings = engine.to_settings();
                    println!(
                        "    - {} [{}] group={} period={:?} source={} items={}{}",
                        settings.name,
                        settings.mode,
                        settings.effective_group_name(),
                        settings.update_period,
                        settings.data_source,
                        engine.items.len(),
                        if settings.writable { " writable" } else { "" }
                    );
                }
            }

            if !warnings.is_empty() {
                println!();
                println!("Warnings:");
                for warning in &warnings {
                    println!("  ⚠ {}", warning);
                }
            }

            if args.show_config {
                println!();
                println!("Parsed configuration:");
                println!(
                    "{}",
                    serde_json::to_string_pretty(&config)
                        .unwrap_or_else(|_| "(serialization error)".to_string())
                );
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "valid": true,
                "config_path": config_path.display().to_string(),
                "summary": {
                    "client": config.client.name,
                    "connection_count": config.connections.len(),
                    "engine_count": config.engine_count(),
                    "item_count": config.item_count(),
                },
                "warnings": warnings,
                "config": if args.show_config { Some(&config) } else { None },
            });
            let rendered = serde_json::to_string_pretty(&output)
                .map_err(|e| BinError::config(format!("cannot render result: {}", e)))?;
            println!("{}", rendered);
        }
    }

    if args.strict && !warnings.is_empty() {
        return Err(BinError::config(format!(
            "Strict mode: {} warning(s) found",
            warnings.len()
        )));
    }

    Ok(())
}

/// Returns non-fatal findings for a valid configuration.
pub fn collect_warnings(config: &ClientConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.connections.is_empty() {
        warnings.push("No connections configured".to_string());
    }

    for connection in &config.connections {
        if connection.engines.is_empty() {
            warnings.push(format!("Connection '{}' has no engines", connection.name));
        }
        if connection.reconnect_delay_ms <= 0 {
            warnings.push(format!(
                "Connection '{}' has a non-positive reconnect delay; the default is used",
                connection.name
            ));
        }
        for engine in &connection.engines {
            if engine.items.is_empty() {
                warnings.push(format!(
                    "Engine '{}/{}' subscribes no items",
                    connection.name, engine.name
                ));
            }
            if engine.mode == DeliveryMode::Polling && !engine.initial_refresh {
                warnings.push(format!(
                    "Engine '{}/{}' disables initial_refresh, which only applies to event mode",
                    connection.name, engine.name
                ));
            }
        }
    }

    warnings
}
