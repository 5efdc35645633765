//! Plugin manager: registration, lifecycle, patching and render dispatch.
//!
//! Plugins keep their registration order everywhere: patches chain in that
//! order and `start` runs in that order. A plugin whose patches were rolled
//! back is marked degraded and is never started, since the host code that
//! would call into it was never rewritten.

use crate::config::{apply_patches, ApplyOptions, HostConfig, PatchReport, PluginPatchStatus, PluginPatches};
use crate::module::ModuleMap;
use crate::plugin::boundary::guard;
use crate::plugin::datastore::{get_typed, set_typed};
use crate::plugin::{HostServices, Plugin, PluginError};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

struct Entry {
    plugin: Arc<dyn Plugin>,
    enabled: bool,
    started: bool,
    degraded: Option<String>,
}

impl Entry {
    fn name(&self) -> &str {
        &self.plugin.meta().name
    }

    fn start(&mut self, services: &HostServices) -> Result<(), PluginError> {
        if self.started || !self.enabled || self.degraded.is_some() {
            return Ok(());
        }
        self.plugin.start(services)?;
        self.started = true;
        info!(plugin = self.name(), "started");
        Ok(())
    }

    fn stop(&mut self, services: &HostServices) -> Result<(), PluginError> {
        if !self.started {
            return Ok(());
        }
        // Marked stopped even on failure; a half-stopped plugin must not be restarted over itself
        self.started = false;
        self.plugin.stop(services)?;
        info!(plugin = self.name(), "stopped");
        Ok(())
    }
}

fn settings_key(plugin: &str) -> String {
    format!("settings.{plugin}")
}

pub struct PluginManager {
    services: HostServices,
    entries: Vec<Entry>,
}

impl PluginManager {
    pub fn new(services: HostServices) -> Self {
        Self {
            services,
            entries: Vec::new(),
        }
    }

    pub fn services(&self) -> &HostServices {
        &self.services
    }

    /// Register a plugin, enabled, restoring any persisted setting values.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> Result<(), PluginError> {
        let name = plugin.meta().name.clone();
        if self.position(&name).is_some() {
            return Err(PluginError::Duplicate(name));
        }

        if let Some(settings) = plugin.settings() {
            let saved: Option<BTreeMap<String, Value>> =
                get_typed(self.services.datastore.as_ref(), &settings_key(&name))?;
            for (key, value) in saved.unwrap_or_default() {
                if let Err(e) = settings.set(&key, value) {
                    warn!(plugin = %name, "ignoring persisted setting: {e}");
                }
            }
        }

        debug!(plugin = %name, "registered");
        self.entries.push(Entry {
            plugin,
            enabled: true,
            started: false,
            degraded: None,
        });
        Ok(())
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name() == name)
    }

    fn entry_mut(&mut self, name: &str) -> Result<&mut Entry, PluginError> {
        self.entries
            .iter_mut()
            .find(|e| e.name() == name)
            .ok_or_else(|| PluginError::NotFound(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Plugin>> {
        self.entries
            .iter()
            .find(|e| e.name() == name)
            .map(|e| &e.plugin)
    }

    /// Registered plugins in registration order.
    pub fn plugins(&self) -> impl Iterator<Item = &Arc<dyn Plugin>> {
        self.entries.iter().map(|e| &e.plugin)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(Entry::name).collect()
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name() == name && e.enabled)
    }

    pub fn is_started(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name() == name && e.started)
    }

    /// Why the plugin's patches were rolled back, if they were.
    pub fn degraded(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.name() == name)
            .and_then(|e| e.degraded.as_deref())
    }

    /// Apply enabled flags and initial setting values from the host config.
    ///
    /// Config settings are not persisted; they apply on top of stored values.
    pub fn apply_config(&mut self, config: &HostConfig) -> Result<(), PluginError> {
        for entry in &mut self.entries {
            let name = entry.plugin.meta().name.clone();
            entry.enabled = config.is_enabled(&name);

            let Some(values) = config.plugin_settings(&name) else {
                continue;
            };
            if values.is_empty() {
                continue;
            }
            let settings = entry
                .plugin
                .settings()
                .ok_or_else(|| PluginError::NoSettings { plugin: name.clone() })?;
            for (key, value) in values {
                settings.set(key, value.clone())?;
            }
        }
        Ok(())
    }

    /// Patch sets of enabled plugins, in registration order.
    pub fn patch_sets(&self) -> Vec<PluginPatches> {
        self.entries
            .iter()
            .filter(|e| e.enabled)
            .map(|e| PluginPatches {
                plugin: e.name().to_string(),
                host_version: e.plugin.host_version().map(str::to_string),
                patches: e.plugin.patches(),
            })
            .collect()
    }

    /// Rewrite `modules` with every enabled plugin's patches and record which
    /// plugins ended up degraded.
    pub fn patch_modules(&mut self, modules: &ModuleMap, options: &ApplyOptions) -> PatchReport {
        let report = apply_patches(modules, &self.patch_sets(), options);

        for (name, status) in &report.plugins {
            let Some(index) = self.position(name) else {
                continue;
            };
            let entry = &mut self.entries[index];
            entry.degraded = match status {
                PluginPatchStatus::Degraded { reason } => {
                    warn!(plugin = %name, %reason, "plugin degraded");
                    Some(reason.clone())
                }
                PluginPatchStatus::Applied | PluginPatchStatus::SkippedVersion { .. } => None,
            };
        }

        report
    }

    /// Start every enabled, non-degraded plugin. Failures are logged and
    /// returned; the failing plugin stays stopped.
    pub fn start_all(&mut self) -> Vec<(String, PluginError)> {
        let mut failures = Vec::new();
        for entry in &mut self.entries {
            if let Err(e) = entry.start(&self.services) {
                warn!(plugin = entry.name(), "failed to start: {e}");
                failures.push((entry.name().to_string(), e));
            }
        }
        failures
    }

    /// Stop every started plugin, last registered first.
    pub fn stop_all(&mut self) -> Vec<(String, PluginError)> {
        let mut failures = Vec::new();
        for entry in self.entries.iter_mut().rev() {
            if let Err(e) = entry.stop(&self.services) {
                warn!(plugin = entry.name(), "failed to stop: {e}");
                failures.push((entry.name().to_string(), e));
            }
        }
        failures
    }

    pub fn enable(&mut self, name: &str) -> Result<(), PluginError> {
        let services = self.services.clone();
        let entry = self.entry_mut(name)?;
        entry.enabled = true;
        entry.start(&services)
    }

    pub fn disable(&mut self, name: &str) -> Result<(), PluginError> {
        let services = self.services.clone();
        let entry = self.entry_mut(name)?;
        let stopped = entry.stop(&services);
        entry.enabled = false;
        stopped
    }

    /// Dispatch a render hook behind the error boundary.
    ///
    /// Renders nothing for unknown or stopped plugins.
    pub fn render(&self, plugin: &str, hook: &str, props: &Value) -> Option<Value> {
        let entry = self.entries.iter().find(|e| e.name() == plugin)?;
        if !entry.started {
            debug!(plugin, hook, "render skipped: plugin not started");
            return None;
        }
        guard(plugin, hook, || entry.plugin.render(hook, props))
    }

    /// Change a setting and persist the plugin's non-default values.
    pub fn set_setting(&self, plugin: &str, key: &str, value: Value) -> Result<(), PluginError> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.name() == plugin)
            .ok_or_else(|| PluginError::NotFound(plugin.to_string()))?;
        let settings = entry
            .plugin
            .settings()
            .ok_or_else(|| PluginError::NoSettings {
                plugin: plugin.to_string(),
            })?;

        settings.set(key, value)?;
        set_typed(
            self.services.datastore.as_ref(),
            &settings_key(plugin),
            &settings.overrides(),
        )?;
        Ok(())
    }
}
