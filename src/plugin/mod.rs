//! Plugin runtime: the plugin trait, host extension points and the manager
//! that wires them together.

pub mod boundary;
pub mod context_menu;
pub mod datastore;
pub mod manager;
pub mod manifest;
pub mod modal;
pub mod settings;

pub use context_menu::{ContextMenuPatch, ContextMenuRegistry, MenuAction, MenuContext, MenuItem};
pub use datastore::{DataStore, DataStoreError, JsonFileStore, MemoryStore};
pub use manager::PluginManager;
pub use manifest::ManifestPlugin;
pub use modal::{Modal, ModalHost, ModalKey, ModalStack};
pub use settings::{OptionType, SettingOption, SettingsDefinition, SettingsError, SettingsStore};

use crate::config::PatchDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginMeta {
    pub name: String,
    pub description: String,
    pub authors: Vec<String>,
}

impl PluginMeta {
    pub fn new(name: &str, description: &str, authors: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            authors: authors.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// A host user as seen by plugins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub username: String,
}

/// Host extension points handed to plugins on start and stop.
#[derive(Clone)]
pub struct HostServices {
    pub context_menus: Arc<ContextMenuRegistry>,
    pub modals: Arc<dyn ModalHost>,
    pub datastore: Arc<dyn DataStore>,
}

impl HostServices {
    pub fn new(datastore: Arc<dyn DataStore>) -> Self {
        Self {
            context_menus: Arc::new(ContextMenuRegistry::new()),
            modals: Arc::new(ModalStack::new()),
            datastore,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }
}

#[derive(Error, Debug)]
pub enum PluginError {
    #[error("plugin '{0}' is not registered")]
    NotFound(String),

    #[error("plugin '{0}' is already registered")]
    Duplicate(String),

    #[error("plugin '{plugin}' has no render hook '{hook}'")]
    UnknownHook { plugin: String, hook: String },

    #[error("invalid props for {plugin}.{hook}: {message}")]
    InvalidProps {
        plugin: String,
        hook: String,
        message: String,
    },

    #[error("plugin '{plugin}' failed to render: {message}")]
    Render { plugin: String, message: String },

    #[error("plugin '{plugin}' has no settings")]
    NoSettings { plugin: String },

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    DataStore(#[from] DataStoreError),
}

/// A unit of host customization.
///
/// Plugins are constructed at load. `patches` are collected before the host
/// evaluates its modules; `start` runs when the plugin is enabled and `stop`
/// must undo every side effect `start` registered.
pub trait Plugin: Send + Sync {
    fn meta(&self) -> &PluginMeta;

    fn patches(&self) -> Vec<PatchDescriptor>;

    /// Semver range of host builds the patches target
    fn host_version(&self) -> Option<&str> {
        None
    }

    fn settings(&self) -> Option<&SettingsStore> {
        None
    }

    fn start(&self, _services: &HostServices) -> Result<(), PluginError> {
        Ok(())
    }

    fn stop(&self, _services: &HostServices) -> Result<(), PluginError> {
        Ok(())
    }

    /// Entry point for the functions patched host code calls through `$self`.
    fn render(&self, hook: &str, _props: &Value) -> Result<Option<Value>, PluginError> {
        Err(PluginError::UnknownHook {
            plugin: self.meta().name.clone(),
            hook: hook.to_string(),
        })
    }
}
