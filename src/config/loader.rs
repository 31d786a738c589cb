//! Configuration Loader
//!
//! Layers an optional configuration file under `MESHSYNC__`-prefixed
//! environment variables, deserializes the result into [`MeshConfig`] and
//! validates it.

use super::MeshConfig;
use crate::error::{MeshError, Result};
use crate::properties::{InMemoryProperties, PropertySource};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "MESHSYNC_CONFIG";

/// Prefix of environment overrides (`MESHSYNC__DISPATCH__TIMEOUT_MS=5000`)
pub const ENV_PREFIX: &str = "MESHSYNC";

/// Loaded, validated configuration
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: MeshConfig,
    source: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration from `MESHSYNC_CONFIG` (if set) and the environment
    pub fn load() -> Result<Arc<ConfigManager>> {
        let path = env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);
        Self::load_layers(path.as_deref())
    }

    /// Load configuration from a specific file, with environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Arc<ConfigManager>> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(MeshError::Configuration(format!(
                "configuration file not found: {}",
                path.display()
            )));
        }
        Self::load_layers(Some(path))
    }

    /// Wrap an already-built configuration
    pub fn from_config(config: MeshConfig) -> Result<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager { config, source: None }))
    }

    fn load_layers(path: Option<&Path>) -> Result<Arc<ConfigManager>> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let raw = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: MeshConfig = raw.try_deserialize()?;
        if let Some(path) = path {
            if let Some(file_properties) = read_file_properties(path)? {
                config.properties = restore_key_case(file_properties, config.properties);
            } else if !config.properties.is_empty() {
                warn!(
                    path = %path.display(),
                    "Property keys from this file format are lowercased; use TOML or JSON for mixed-case group and handler names"
                );
            }
        }
        config.validate()?;

        let source = path
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "environment".to_string());
        info!(
            source = %source,
            dispatch_interval_ms = config.dispatch.interval_ms,
            dispatch_timeout_ms = config.dispatch.timeout_ms,
            properties = config.properties.len(),
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            source: path.map(Path::to_path_buf),
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    /// File the configuration was read from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Property source seeded with the configured properties
    pub fn property_source(&self) -> Arc<dyn PropertySource> {
        Arc::new(InMemoryProperties::with_values(
            self.config
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        ))
    }
}

#[derive(Debug, Default, Deserialize)]
struct PropertiesSection {
    #[serde(default)]
    properties: HashMap<String, Value>,
}

/// Read the `[properties]` table of a TOML or JSON file with key case intact.
/// `None` for other formats.
fn read_file_properties(path: &Path) -> Result<Option<HashMap<String, String>>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let parse_error =
        |e: &dyn std::fmt::Display| MeshError::Configuration(format!("{}: {e}", path.display()));

    let section: PropertiesSection = match extension.as_deref() {
        Some("toml") => {
            let text = fs::read_to_string(path).map_err(|e| parse_error(&e))?;
            toml::from_str(&text).map_err(|e| parse_error(&e))?
        }
        Some("json") => {
            let text = fs::read_to_string(path).map_err(|e| parse_error(&e))?;
            serde_json::from_str(&text).map_err(|e| parse_error(&e))?
        }
        _ => return Ok(None),
    };

    Ok(Some(
        section
            .properties
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::String(text) => text,
                    other => other.to_string(),
                };
                (key, value)
            })
            .collect(),
    ))
}

/// Re-key the layered properties with the file's original spelling. Values
/// still come from the layered map so environment overrides win; keys that
/// only exist in the environment are kept as given.
fn restore_key_case(
    file_properties: HashMap<String, String>,
    layered: HashMap<String, String>,
) -> HashMap<String, String> {
    let mut spelled: HashMap<String, String> = file_properties
        .keys()
        .map(|key| (key.to_lowercase(), key.clone()))
        .collect();
    let mut properties = file_properties;

    for (key, value) in layered {
        let key = spelled.remove(&key).unwrap_or(key);
        properties.insert(key, value);
    }
    properties
}
