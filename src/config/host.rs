//! Host configuration (`bundle-patcher.toml`).
//!
//! ```toml
//! host_version = "1.0.9005"
//! locale = "en-GB"
//! datastore = "datastore.json"
//!
//! [plugins.NoAccountLimit]
//! enabled = false
//!
//! [plugins.Timezone.settings]
//! "24h Time" = false
//! ```

use crate::config::applicator::{ApplyOptions, DEFAULT_PLUGIN_REF};
use crate::config::loader::ConfigError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "bundle-patcher.toml";
pub const CONFIG_ENV_VAR: &str = "BUNDLE_PATCHER_CONFIG";

#[derive(Debug, Deserialize, Clone)]
pub struct HostConfig {
    /// Host build version, matched against manifest `host_version` ranges
    #[serde(default)]
    pub host_version: Option<String>,
    /// Locale tag used for date/time formatting
    #[serde(default = "default_locale")]
    pub locale: String,
    /// JSON file backing the plugin data store (in-memory when unset)
    #[serde(default)]
    pub datastore: Option<PathBuf>,
    /// Host expression `$self` expands to; `{name}` is the quoted plugin name
    #[serde(default = "default_plugin_ref")]
    pub plugin_ref: String,
    /// Host CSS class appended to message timestamps
    #[serde(default)]
    pub message_timestamp_class: Option<String>,
    #[serde(default)]
    pub plugins: BTreeMap<String, PluginEntry>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PluginEntry {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Initial setting values, checked against the plugin's settings schema
    #[serde(default)]
    pub settings: BTreeMap<String, serde_json::Value>,
}

fn default_locale() -> String {
    "en-US".to_string()
}

fn default_plugin_ref() -> String {
    DEFAULT_PLUGIN_REF.to_string()
}

fn default_enabled() -> bool {
    true
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            host_version: None,
            locale: default_locale(),
            datastore: None,
            plugin_ref: default_plugin_ref(),
            message_timestamp_class: None,
            plugins: BTreeMap::new(),
        }
    }
}

impl HostConfig {
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        toml_edit::de::from_str(input).map_err(|source| ConfigError::Toml { path: None, source })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::parse(&contents).map_err(|e| e.with_path(path))?;

        // Relative datastore paths are relative to the config file
        if let Some(dir) = path.parent() {
            config.datastore = config.datastore.take().map(|store| {
                if store.is_relative() {
                    dir.join(store)
                } else {
                    store
                }
            });
        }

        Ok(config)
    }

    /// Resolve the host config.
    ///
    /// Priority order:
    /// 1. Explicit `--config` path
    /// 2. `BUNDLE_PATCHER_CONFIG` environment variable
    /// 3. `bundle-patcher.toml` in the current directory
    /// 4. Built-in defaults
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_path(path);
        }

        if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
            let path = PathBuf::from(env_path);
            if path.exists() {
                return Self::from_path(&path);
            }
            tracing::warn!(
                "{CONFIG_ENV_VAR} is set but path doesn't exist: {}",
                path.display()
            );
        }

        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return Self::from_path(&local);
        }

        Ok(Self::default())
    }

    /// Plugins without an entry are enabled.
    pub fn is_enabled(&self, plugin: &str) -> bool {
        self.plugins.get(plugin).map_or(true, |entry| entry.enabled)
    }

    pub fn plugin_settings(&self, plugin: &str) -> Option<&BTreeMap<String, serde_json::Value>> {
        self.plugins.get(plugin).map(|entry| &entry.settings)
    }

    pub fn apply_options(&self) -> ApplyOptions {
        ApplyOptions {
            plugin_ref: self.plugin_ref.clone(),
            host_version: self.host_version.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HostConfig::parse("").unwrap();
        assert_eq!(config.locale, "en-US");
        assert_eq!(config.plugin_ref, DEFAULT_PLUGIN_REF);
        assert!(config.is_enabled("Timezone"));
    }

    #[test]
    fn test_plugin_entries() {
        let config = HostConfig::parse(
            r#"
host_version = "1.0.9005"
locale = "en-GB"

[plugins.NoAccountLimit]
enabled = false

[plugins.Timezone.settings]
"24h Time" = false
"#,
        )
        .unwrap();

        assert!(!config.is_enabled("NoAccountLimit"));
        assert!(config.is_enabled("Timezone"));
        assert_eq!(
            config.plugin_settings("Timezone").unwrap().get("24h Time"),
            Some(&serde_json::Value::Bool(false))
        );
        assert_eq!(config.apply_options().host_version.as_deref(), Some("1.0.9005"));
    }

    #[test]
    fn test_relative_datastore_resolves_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "datastore = \"store.json\"\n").unwrap();

        let config = HostConfig::from_path(&path).unwrap();
        assert_eq!(config.datastore, Some(dir.path().join("store.json")));
    }
}
