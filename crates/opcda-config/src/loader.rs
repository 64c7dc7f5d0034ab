// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration loading.
//!
//! # Loading Pipeline
//!
//! 1. Read the file and pick the format from its extension
//! 2. Resolve `${VAR}` / `${VAR:default}` placeholders
//! 3. Parse into [`ClientConfig`]
//! 4. Apply `OPCDA_*` environment overrides
//! 5. Validate
//!
//! # Environment Variable Override
//!
//! ```text
//! OPCDA_CLIENT_NAME=line-3
//! OPCDA_LOG_LEVEL=debug
//! OPCDA_CONNECTIONS_0_HOST=10.0.0.7
//! OPCDA_CONNECTIONS_0_RECONNECT_DELAY_MS=2000
//! OPCDA_CONNECTIONS_0_ENGINES_1_UPDATE_PERIOD_MS=250
//! ```

use std::env;
use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::schema::{ClientConfig, LogLevel};

/// Default environment variable prefix.
pub const DEFAULT_ENV_PREFIX: &str = "OPCDA";

// =============================================================================
// ConfigLoader
// =============================================================================

/// Configuration loader.
///
/// # Examples
///
/// ```no_run
/// use opcda_config::loader::ConfigLoader;
///
/// let loader = ConfigLoader::new();
/// let config = loader.load("opcda.yaml").unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    env_prefix: String,
    resolve_env_vars: bool,
}

impl ConfigLoader {
    /// Creates a loader with the default prefix and env resolution enabled.
    pub fn new() -> Self {
        Self {
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            resolve_env_vars: true,
        }
    }

    /// Creates a builder.
    pub fn builder() -> ConfigLoaderBuilder {
        ConfigLoaderBuilder::new()
    }

    /// Sets the environment variable prefix.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Enables or disables placeholder resolution and env overrides.
    pub fn with_env_vars(mut self, enabled: bool) -> Self {
        self.resolve_env_vars = enabled;
        self
    }

    /// Loads configuration from a file.
    ///
    /// The format follows the extension: `.yaml`/`.yml`, `.toml` or `.json`.
    pub fn load(&self, path: impl AsRef<Path>) -> ConfigResult<ClientConfig> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }
        let content = fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        let format = ConfigFormat::from_path(path)?;

        let content = if self.resolve_env_vars {
            self.resolve_env_placeholders(&content)
        } else {
            content
        };

        let mut config: ClientConfig = parse_str(&content, format).map_err(|e| match e {
            ConfigError::Serialization { message } => ConfigError::parse(path, message),
            other => other,
        })?;

        self.finish(&mut config)?;

        debug!(
            connections = config.connections.len(),
            engines = config.engine_count(),
            items = config.item_count(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Loads configuration from a string.
    pub fn load_from_str(&self, content: &str, format: ConfigFormat) -> ConfigResult<ClientConfig> {
        let content = if self.resolve_env_vars {
            self.resolve_env_placeholders(content)
        } else {
            content.to_string()
        };
        let mut config: ClientConfig = parse_str(&content, format)?;
        self.finish(&mut config)?;
        Ok(config)
    }

    fn finish(&self, config: &mut ClientConfig) -> ConfigResult<()> {
        if self.resolve_env_vars {
            self.apply_env_overrides(config)?;
        }
        config.validate()
    }

    /// Resolves `${VAR}` and `${VAR:default}` placeholders.
    ///
    /// Unknown variables without a default are left in place.
    fn resolve_env_placeholders(&self, content: &str) -> String {
        let mut result = String::with_capacity(content.len());
        let mut rest = content;

        while let Some(start) = rest.find("${") {
            result.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                result.push_str(&rest[start..]);
                return result;
            };

            let body = &after[..end];
            let (name, default) = match body.split_once(':') {
                Some((name, default)) => (name, Some(default)),
                None => (body, None),
            };

            match (env::var(name), default) {
                (Ok(value), _) => result.push_str(&value),
                (Err(_), Some(default)) => result.push_str(default),
                (Err(_), None) => {
                    warn!(variable = name, "Environment variable not found");
                    result.push_str(&rest[start..start + 2 + end + 1]);
                }
            }
            rest = &after[end + 1..];
        }

        result.push_str(rest);
        result
    }

    fn env_key(&self, suffix: &str) -> String {
        format!("{}_{}", self.env_prefix, suffix)
    }

    fn apply_env_overrides(&self, config: &mut ClientConfig) -> ConfigResult<()> {
        if let Ok(value) = env::var(self.env_key("CLIENT_NAME")) {
            config.client.name = value;
        }
        if let Ok(value) = env::var(self.env_key("LOG_LEVEL")) {
            match parse_log_level(&value) {
                Some(level) => config.logging.level = level,
                None => warn!(value = %value, "Ignoring invalid log level override"),
            }
        }

        for (i, connection) in config.connections.iter_mut().enumerate() {
            let prefix = format!("CONNECTIONS_{}", i);

            if let Ok(value) = env::var(self.env_key(&format!("{}_HOST", prefix))) {
                connection.host = value;
            }
            let key = self.env_key(&format!("{}_RECONNECT_DELAY_MS", prefix));
            if let Ok(value) = env::var(&key) {
                connection.reconnect_delay_ms = value
                    .parse()
                    .map_err(|_| ConfigError::invalid_env_var(&key, "expected a number"))?;
            }

            for (j, engine) in connection.engines.iter_mut().enumerate() {
                let prefix = format!("{}_ENGINES_{}", prefix, j);

                let key = self.env_key(&format!("{}_UPDATE_PERIOD_MS", prefix));
                if let Ok(value) = env::var(&key) {
                    engine.update_period_ms = value
                        .parse()
                        .map_err(|_| ConfigError::invalid_env_var(&key, "expected a number"))?;
                }
                if let Ok(value) = env::var(self.env_key(&format!("{}_WRITABLE", prefix))) {
                    engine.writable = parse_bool(&value);
                }
            }
        }
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// ConfigLoaderBuilder
// =============================================================================

/// Builder for [`ConfigLoader`].
#[derive(Debug, Default)]
pub struct ConfigLoaderBuilder {
    env_prefix: Option<String>,
    resolve_env_vars: Option<bool>,
}

impl ConfigLoaderBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the environment prefix.
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Enables or disables environment variable resolution.
    pub fn resolve_env_vars(mut self, enabled: bool) -> Self {
        self.resolve_env_vars = Some(enabled);
        self
    }

    /// Builds the loader.
    pub fn build(self) -> ConfigLoader {
        let mut loader = ConfigLoader::new();
        if let Some(prefix) = self.env_prefix {
            loader.env_prefix = prefix;
        }
        if let Some(enabled) = self.resolve_env_vars {
            loader.resolve_env_vars = enabled;
        }
        loader
    }
}

// =============================================================================
// ConfigFormat
// =============================================================================

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format.
    Yaml,
    /// TOML format.
    Toml,
    /// JSON format.
    Json,
}

impl ConfigFormat {
    /// Determines the format from a file path.
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match ext.as_deref() {
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("json") => Ok(ConfigFormat::Json),
            Some(other) => Err(ConfigError::unsupported_format(other)),
            None => Err(ConfigError::unsupported_format("(no extension)")),
        }
    }

    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Yaml => "yaml",
            ConfigFormat::Toml => "toml",
            ConfigFormat::Json => "json",
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn parse_str<T: DeserializeOwned>(content: &str, format: ConfigFormat) -> ConfigResult<T> {
    match format {
        ConfigFormat::Yaml => parse_yaml(content),
        ConfigFormat::Toml => toml::from_str(content).map_err(|e| ConfigError::serialization(e.to_string())),
        ConfigFormat::Json => {
            serde_json::from_str(content).map_err(|e| ConfigError::serialization(e.to_string()))
        }
    }
}

/// YAML goes through the `config` crate.
fn parse_yaml<T: DeserializeOwned>(content: &str) -> ConfigResult<T> {
    config::Config::builder()
        .add_source(config::File::from_str(content, config::FileFormat::Yaml))
        .build()
        .and_then(|c| c.try_deserialize())
        .map_err(|e| ConfigError::serialization(e.to_string()))
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_lowercase().as_str(),
        "true" | "1" | "yes" | "on" | "enabled"
    )
}

fn parse_log_level(value: &str) -> Option<LogLevel> {
    match value.to_lowercase().as_str() {
        "trace" => Some(LogLevel::Trace),
        "debug" => Some(LogLevel::Debug),
        "info" => Some(LogLevel::Info),
        "warn" | "warning" => Some(LogLevel::Warn),
        "error" => Some(LogLevel::Error),
        _ => None,
    }
}

// =============================================================================
// Convenience Functions
// =============================================================================

/// Loads configuration from a file with default settings.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<ClientConfig> {
    ConfigLoader::new().load(path)
}

/// Loads configuration from a string with the specified format.
pub fn load_config_str(content: &str, format: ConfigFormat) -> ConfigResult<ClientConfig> {
    ConfigLoader::new().load_from_str(content, format)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use opcda_client::DeliveryMode;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const YAML: &str = r#"
client:
  name: test-client
connections:
  - name: plant
    host: 10.0.0.5
    server: Matrikon.OPC.Simulation.1
    reconnect_delay_ms: 2000
    engines:
      - name: fast
        mode: polling
        update_period_ms: 500
        items: [Random.Int4, Random.Real8]
      - name: events
        mode: event
        writable: true
        items: [Bucket.Brigade.Int4]
logging:
  level: debug
"#;

    const TOML: &str = r#"
[client]
name = "toml-client"

[[connections]]
name = "plant"
server = "Sim.1"

[[connections.engines]]
name = "slow"
update_period_ms = 5000
items = ["A", "B"]
"#;

    #[test]
    fn test_load_yaml() {
        let mut file = NamedTempFile::with_suffix(".yaml").unwrap();
        file.write_all(YAML.as_bytes()).unwrap();

        let config = ConfigLoader::new().with_env_prefix("OPCDA_TEST_YAML").load(file.path()).unwrap();

        assert_eq!(config.client.name, "test-client");
        assert_eq!(config.connections.len(), 1);
        let plant = &config.connections[0];
        assert_eq!(plant.host, "10.0.0.5");
        assert_eq!(plant.reconnect_delay_ms, 2000);
        assert_eq!(plant.engines[0].items.len(), 2);
        assert_eq!(plant.engines[1].mode, DeliveryMode::Event);
        assert!(plant.engines[1].writable);
        assert!(plant.engines[1].initial_refresh);
        assert_eq!(config.logging.level, LogLevel::Debug);
    }

    #[test]
    fn test_load_toml_defaults() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        file.write_all(TOML.as_bytes()).unwrap();

        let config = ConfigLoader::new().with_env_prefix("OPCDA_TEST_TOML").load(file.path()).unwrap();
        let plant = &config.connections[0];
        assert_eq!(plant.host, "localhost");
        assert_eq!(plant.reconnect_delay_ms, 5000);
        assert_eq!(plant.engines[0].mode, DeliveryMode::Polling);
        assert_eq!(plant.engines[0].update_period_ms, 5000);
    }

    #[test]
    fn test_load_json() {
        let json = r#"{"connections":[{"name":"a","server":"S.1","engines":[{"name":"e","items":["x"]}]}]}"#;
        let config = ConfigLoader::new()
            .with_env_vars(false)
            .load_from_str(json, ConfigFormat::Json)
            .unwrap();
        assert_eq!(config.engine_count(), 1);
    }

    #[test]
    fn test_config_format_from_path() {
        assert_eq!(ConfigFormat::from_path(Path::new("c.yaml")).unwrap(), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("c.yml")).unwrap(), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("c.toml")).unwrap(), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path(Path::new("c.json")).unwrap(), ConfigFormat::Json);
        assert!(ConfigFormat::from_path(Path::new("c.txt")).is_err());
        assert!(ConfigFormat::from_path(Path::new("c")).is_err());
    }

    #[test]
    fn test_env_placeholder_with_default() {
        let loader = ConfigLoader::new();
        let result = loader.resolve_env_placeholders("host: ${OPCDA_TEST_SURELY_UNSET_VAR:10.1.1.1}");
        assert_eq!(result, "host: 10.1.1.1");
    }

    #[test]
    fn test_env_placeholder_unknown_kept() {
        let loader = ConfigLoader::new();
        let result = loader.resolve_env_placeholders("a ${OPCDA_TEST_SURELY_UNSET_VAR} b ${unterminated");
        assert_eq!(result, "a ${OPCDA_TEST_SURELY_UNSET_VAR} b ${unterminated");
    }

    #[test]
    fn test_env_overrides() {
        env::set_var("OPCDA_TEST_OVR_LOG_LEVEL", "warn");
        env::set_var("OPCDA_TEST_OVR_CONNECTIONS_0_RECONNECT_DELAY_MS", "750");
        env::set_var("OPCDA_TEST_OVR_CONNECTIONS_0_ENGINES_0_UPDATE_PERIOD_MS", "100");

        let config = ConfigLoader::builder()
            .env_prefix("OPCDA_TEST_OVR")
            .build()
            .load_from_str(YAML, ConfigFormat::Yaml)
            .unwrap();

        assert_eq!(config.logging.level, LogLevel::Warn);
        assert_eq!(config.connections[0].reconnect_delay_ms, 750);
        assert_eq!(config.connections[0].engines[0].update_period_ms, 100);

        env::remove_var("OPCDA_TEST_OVR_LOG_LEVEL");
        env::remove_var("OPCDA_TEST_OVR_CONNECTIONS_0_RECONNECT_DELAY_MS");
        env::remove_var("OPCDA_TEST_OVR_CONNECTIONS_0_ENGINES_0_UPDATE_PERIOD_MS");
    }

    #[test]
    fn test_invalid_env_override() {
        env::set_var("OPCDA_TEST_BAD_CONNECTIONS_0_RECONNECT_DELAY_MS", "soon");
        let result = ConfigLoader::new()
            .with_env_prefix("OPCDA_TEST_BAD")
            .load_from_str(YAML, ConfigFormat::Yaml);
        env::remove_var("OPCDA_TEST_BAD_CONNECTIONS_0_RECONNECT_DELAY_MS");
        assert!(matches!(result, Err(ConfigError::InvalidEnvVar { .. })));
    }

    #[test]
    fn test_validation_runs_on_load() {
        let yaml = "connections:\n  - name: a\n    server: S\n  - name: a\n    server: S\n";
        let result = ConfigLoader::new().with_env_vars(false).load_from_str(yaml, ConfigFormat::Yaml);
        assert!(matches!(result, Err(ConfigError::DuplicateConnection { .. })));
    }

    #[test]
    fn test_parse_error_names_file() {
        let mut file = NamedTempFile::with_suffix(".json").unwrap();
        file.write_all(b"{ not json").unwrap();
        let result = ConfigLoader::new().load(file.path());
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_file_not_found() {
        let result = load_config("/nonexistent/path/opcda.yaml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_parse_helpers() {
        assert!(parse_bool("yes"));
        assert!(!parse_bool("off"));
        assert_eq!(parse_log_level("WARNING"), Some(LogLevel::Warn));
        assert_eq!(parse_log_level("loud"), None);
    }

    #[test]
    fn test_loader_builder() {
        let loader = ConfigLoader::builder().env_prefix("MYAPP").resolve_env_vars(false).build();
        assert_eq!(loader.env_prefix, "MYAPP");
        assert!(!loader.resolve_env_vars);
    }
}
