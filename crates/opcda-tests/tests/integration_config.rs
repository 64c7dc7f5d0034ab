// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Configuration Integration Tests
//!
//! Loading configuration files and turning them into running engines.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tempfile::NamedTempFile;

use opcda_client::{
    ConnectionRegistry, DeliveryMode, ItemCallback, ReconnectSettings, ReconnectState,
    DEFAULT_RECONNECT_DELAY,
};
use opcda_config::{
    load_config, ClientConfig, ConfigError, ConfigFormat, ConfigLoader, LogFormat, LogLevel,
};
use opcda_core::{DataSource, ItemId, RemoteServer};
use opcda_tests::prelude::*;

fn write_temp(content: &str, suffix: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn assert_plant_a(config: &ClientConfig) {
    let plant_a = config.connection("plant-a").unwrap();
    assert_eq!(plant_a.host, "10.0.0.5");
    assert_eq!(plant_a.target(), "10.0.0.5/Matrikon.OPC.Simulation.1");
    assert_eq!(
        plant_a.reconnect_settings(),
        ReconnectSettings::new(Duration::from_millis(2500))
    );
    assert_eq!(plant_a.engines.len(), 2);

    let fast = plant_a.engines[0].to_settings();
    assert_eq!(fast.name, "fast");
    assert_eq!(fast.mode, DeliveryMode::Polling);
    assert_eq!(fast.update_period, Duration::from_millis(250));
    assert_eq!(fast.data_source, DataSource::Device);
    assert!(!fast.writable);
    assert_eq!(fast.effective_group_name(), "fast");
    assert!(fast.validate().is_ok());

    let pushed = plant_a.engines[1].to_settings();
    assert_eq!(pushed.mode, DeliveryMode::Event);
    assert_eq!(pushed.effective_group_name(), "pushed-group");
    assert_eq!(pushed.data_source, DataSource::Cache);
    assert!(pushed.writable);
    assert!(pushed.initial_refresh);
    assert_eq!(pushed.update_period, Duration::from_millis(1000));
}

// =============================================================================
// Loading
// =============================================================================

#[test]
fn test_load_yaml_file() {
    init_test_logging();
    let file = write_temp(ConfigFixtures::plant_yaml(), ".yaml");
    let config = load_config(file.path()).unwrap();

    assert_eq!(config.client.name, "line-3");
    assert_eq!(config.client.description.as_deref(), Some("Packaging line"));
    assert_eq!(config.connections.len(), 2);
    assert_eq!(config.engine_count(), 3);
    assert_eq!(config.item_count(), 4);
    assert_eq!(config.logging.level, LogLevel::Debug);
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_plant_a(&config);

    let plant_b = config.connection("plant-b").unwrap();
    assert_eq!(plant_b.host, "localhost");
    assert_eq!(plant_b.reconnect_settings().delay, DEFAULT_RECONNECT_DELAY);
    assert_eq!(
        plant_b.engines[0].items,
        vec!["Saw-toothed Waves.Real4".to_string()]
    );
}

#[test]
fn test_load_toml_file() {
    let file = write_temp(ConfigFixtures::plant_toml(), ".toml");
    let config = load_config(file.path()).unwrap();

    assert_eq!(config.connections.len(), 1);
    assert_eq!(config.logging.level, LogLevel::Info);
    assert_plant_a(&config);
}

#[test]
fn test_load_json_string() {
    let json = r#"{
        "connections": [
            { "name": "c", "server": "Sim.1", "engines": [ { "name": "e", "items": ["A"] } ] }
        ]
    }"#;
    let config = ConfigLoader::new()
        .with_env_vars(false)
        .load_from_str(json, ConfigFormat::Json)
        .unwrap();
    let settings = config.connections[0].engines[0].to_settings();
    assert_eq!(settings.mode, DeliveryMode::Polling);
    assert_eq!(config.client.name, "opcda-client");
}

#[test]
fn test_missing_and_unknown_files() {
    let err = load_config("/nonexistent/opcda.yaml").unwrap_err();
    assert!(matches!(err, ConfigError::FileNotFound { .. }));

    let file = write_temp("connections: []", ".ini");
    let err = load_config(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::UnsupportedFormat { .. }));

    let file = write_temp("connections: [ {", ".yaml");
    let err = load_config(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}

// =============================================================================
// Environment
// =============================================================================

#[test]
fn test_placeholders_default_then_resolve() {
    let file = write_temp(ConfigFixtures::placeholder_yaml(), ".yaml");

    std::env::remove_var("OPCDA_FIXTURE_HOST");
    std::env::remove_var("OPCDA_FIXTURE_DELAY");
    let config = load_config(file.path()).unwrap();
    assert_eq!(config.connections[0].host, "127.0.0.1");
    assert_eq!(config.connections[0].reconnect_delay_ms, 750);

    std::env::set_var("OPCDA_FIXTURE_HOST", "192.168.1.20");
    std::env::set_var("OPCDA_FIXTURE_DELAY", "1500");
    let config = load_config(file.path()).unwrap();
    std::env::remove_var("OPCDA_FIXTURE_HOST");
    std::env::remove_var("OPCDA_FIXTURE_DELAY");

    assert_eq!(config.connections[0].host, "192.168.1.20");
    assert_eq!(
        config.connections[0].reconnect_settings().delay,
        Duration::from_millis(1500)
    );
}

#[test]
fn test_env_overrides() {
    std::env::set_var("OPCDA_IT_OVR_CLIENT_NAME", "overridden");
    std::env::set_var("OPCDA_IT_OVR_CONNECTIONS_1_HOST", "10.9.9.9");
    std::env::set_var("OPCDA_IT_OVR_CONNECTIONS_0_ENGINES_1_UPDATE_PERIOD_MS", "40");
    std::env::set_var("OPCDA_IT_OVR_CONNECTIONS_0_ENGINES_0_WRITABLE", "yes");

    let config = ConfigLoader::new()
        .with_env_prefix("OPCDA_IT_OVR")
        .load_from_str(ConfigFixtures::plant_yaml(), ConfigFormat::Yaml)
        .unwrap();

    for key in [
        "OPCDA_IT_OVR_CLIENT_NAME",
        "OPCDA_IT_OVR_CONNECTIONS_1_HOST",
        "OPCDA_IT_OVR_CONNECTIONS_0_ENGINES_1_UPDATE_PERIOD_MS",
        "OPCDA_IT_OVR_CONNECTIONS_0_ENGINES_0_WRITABLE",
    ] {
        std::env::remove_var(key);
    }

    assert_eq!(config.client.name, "overridden");
    assert_eq!(config.connections[1].host, "10.9.9.9");
    assert_eq!(config.connections[0].engines[1].update_period_ms, 40);
    assert!(config.connections[0].engines[0].writable);
}

#[test]
fn test_env_override_out_of_range_fails_validation() {
    std::env::set_var("OPCDA_IT_RANGE_CONNECTIONS_0_ENGINES_0_UPDATE_PERIOD_MS", "1");
    let result = ConfigLoader::new()
        .with_env_prefix("OPCDA_IT_RANGE")
        .load_from_str(ConfigFixtures::plant_toml(), ConfigFormat::Toml);
    std::env::remove_var("OPCDA_IT_RANGE_CONNECTIONS_0_ENGINES_0_UPDATE_PERIOD_MS");

    let err = result.unwrap_err();
    assert!(err.is_validation_error());
    assert!(matches!(err, ConfigError::OutOfRange { .. }));
}

// =============================================================================
// Validation
// =============================================================================

#[test]
fn test_validation_errors() {
    let loader = ConfigLoader::new().with_env_vars(false);
    let cases: &[(&str, fn(&ConfigError) -> bool)] = &[
        (
            "connections:\n  - { name: a, server: S }\n  - { name: a, server: S }\n",
            |e| matches!(e, ConfigError::DuplicateConnection { .. }),
        ),
        (
            "connections:\n  - name: a\n    server: S\n    engines: [ { name: e }, { name: e } ]\n",
            |e| matches!(e, ConfigError::DuplicateEngine { .. }),
        ),
        (
            "connections:\n  - name: a\n    server: S\n    engines: [ { name: e, items: [X, X] } ]\n",
            |e| matches!(e, ConfigError::DuplicateItem { .. }),
        ),
        (
            "connections:\n  - name: a\n    server: S\n    engines: [ { name: e, update_period_ms: 5 } ]\n",
            |e| matches!(e, ConfigError::OutOfRange { .. }),
        ),
        (
            "connections:\n  - { name: a, server: \"\" }\n",
            |e| matches!(e, ConfigError::Validation { .. }),
        ),
    ];

    for (content, expected) in cases {
        let err = loader.load_from_str(content, ConfigFormat::Yaml).unwrap_err();
        assert!(expected(&err), "unexpected error {:?} for {}", err, content);
    }
}

// =============================================================================
// Config to running engines
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_engines_from_config() {
    init_test_logging();
    let yaml = r#"
connections:
  - name: plant
    server: Sim.1
    reconnect_delay_ms: 200
    engines:
      - name: fast
        update_period_ms: 50
        items: [A, B]
      - name: pushed
        mode: event
        writable: true
        items: [C]
"#;
    let config = ConfigLoader::new()
        .with_env_vars(false)
        .load_from_str(yaml, ConfigFormat::Yaml)
        .unwrap();

    let server = MockServer::new("Sim.1");
    server.set_value("A", 1i32);
    server.set_value("B", 2.5f64);
    server.set_value("C", true);

    let registry = ConnectionRegistry::new();
    let recorder = RecordingCallback::new();
    let shared: Arc<dyn ItemCallback> = Arc::new(recorder.clone());
    for connection_config in &config.connections {
        let connection = registry
            .register(
                &connection_config.name,
                server.clone(),
                connection_config.reconnect_settings(),
            )
            .unwrap();
        assert_eq!(connection.reconnect().delay(), Duration::from_millis(200));
        for engine_config in &connection_config.engines {
            let engine = connection
                .attach_engine(engine_config.to_settings())
                .await
                .unwrap();
            for item in &engine_config.items {
                engine
                    .add_item_shared(item.as_str(), shared.clone())
                    .await
                    .unwrap();
            }
        }
    }

    registry.open_all();
    assert!(wait_until(Duration::from_secs(5), || recorder.count() >= 3).await);

    let connection = registry.get("plant").unwrap();
    assert_eq!(connection.state(), ReconnectState::Connected);
    let fast = connection.engine("fast").unwrap();
    assert_eq!(fast.realized_items(), vec![ItemId::new("A"), ItemId::new("B")]);
    let pushed = connection.engine("pushed").unwrap();
    assert_eq!(pushed.mode(), DeliveryMode::Event);
    assert_eq!(recorder.count_for("A"), 1);
    assert_eq!(recorder.count_for("C"), 1);

    pushed.write("C", false).await.unwrap();
    assert!(fast.write("A", 5i32).await.is_err());

    registry.close_all().await;
    assert!(!server.is_connected());
}
