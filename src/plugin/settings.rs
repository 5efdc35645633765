//! Declarative plugin settings.
//!
//! A [`SettingsDefinition`] lists each option with its type, description and
//! default; the host renders a settings UI from it. A [`SettingsStore`] holds
//! the current values, starting from the declared defaults.

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Boolean,
    String,
    Number,
    Select,
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OptionType::Boolean => "boolean",
            OptionType::String => "string",
            OptionType::Number => "number",
            OptionType::Select => "select",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingOption {
    pub key: String,
    #[serde(rename = "type")]
    pub kind: OptionType,
    pub description: String,
    pub default: Value,
    /// Allowed values of a `Select` option
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<Value>,
}

impl SettingOption {
    fn accepts(&self, value: &Value) -> bool {
        match self.kind {
            OptionType::Boolean => value.is_boolean(),
            OptionType::String => value.is_string(),
            OptionType::Number => value.is_number(),
            OptionType::Select => self.choices.contains(value),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SettingsDefinition {
    options: Vec<SettingOption>,
}

impl SettingsDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boolean(self, key: &str, description: &str, default: bool) -> Self {
        self.option(key, OptionType::Boolean, description, Value::Bool(default), Vec::new())
    }

    pub fn string(self, key: &str, description: &str, default: &str) -> Self {
        self.option(key, OptionType::String, description, Value::from(default), Vec::new())
    }

    pub fn number(self, key: &str, description: &str, default: f64) -> Self {
        self.option(key, OptionType::Number, description, Value::from(default), Vec::new())
    }

    pub fn select(self, key: &str, description: &str, choices: &[&str], default: &str) -> Self {
        let choices = choices.iter().map(|c| Value::from(*c)).collect();
        self.option(key, OptionType::Select, description, Value::from(default), choices)
    }

    fn option(
        mut self,
        key: &str,
        kind: OptionType,
        description: &str,
        default: Value,
        choices: Vec<Value>,
    ) -> Self {
        self.options.push(SettingOption {
            key: key.to_string(),
            kind,
            description: description.to_string(),
            default,
            choices,
        });
        self
    }

    pub fn options(&self) -> &[SettingOption] {
        &self.options
    }

    pub fn get(&self, key: &str) -> Option<&SettingOption> {
        self.options.iter().find(|o| o.key == key)
    }

    fn defaults(&self) -> BTreeMap<String, Value> {
        self.options
            .iter()
            .map(|o| (o.key.clone(), o.default.clone()))
            .collect()
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SettingsError {
    #[error("unknown setting '{key}'")]
    UnknownOption { key: String },

    #[error("setting '{key}' expects a {expected} value, got {found}")]
    TypeMismatch {
        key: String,
        expected: OptionType,
        found: Value,
    },
}

/// Current values of one plugin's settings.
#[derive(Debug)]
pub struct SettingsStore {
    definition: SettingsDefinition,
    values: RwLock<BTreeMap<String, Value>>,
}

impl SettingsStore {
    pub fn new(definition: SettingsDefinition) -> Self {
        let values = RwLock::new(definition.defaults());
        Self { definition, values }
    }

    pub fn definition(&self) -> &SettingsDefinition {
        &self.definition
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }

    /// Boolean option value; `false` for unknown keys.
    pub fn get_bool(&self, key: &str) -> bool {
        self.values
            .read()
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn set(&self, key: &str, value: Value) -> Result<(), SettingsError> {
        let option = self
            .definition
            .get(key)
            .ok_or_else(|| SettingsError::UnknownOption {
                key: key.to_string(),
            })?;

        if !option.accepts(&value) {
            return Err(SettingsError::TypeMismatch {
                key: key.to_string(),
                expected: option.kind,
                found: value,
            });
        }

        self.values.write().insert(key.to_string(), value);
        Ok(())
    }

    pub fn reset(&self) {
        *self.values.write() = self.definition.defaults();
    }

    /// Snapshot of every value, defaults included.
    pub fn values(&self) -> BTreeMap<String, Value> {
        self.values.read().clone()
    }

    /// Values that differ from their declared default.
    pub fn overrides(&self) -> BTreeMap<String, Value> {
        self.values
            .read()
            .iter()
            .filter(|(key, value)| {
                self.definition
                    .get(key)
                    .map_or(true, |option| &option.default != *value)
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn definition() -> SettingsDefinition {
        SettingsDefinition::new()
            .boolean("enabled", "Turn it on", true)
            .select("style", "Pick one", &["short", "full"], "short")
            .number("delay", "Delay in ms", 750.0)
    }

    #[test]
    fn test_store_starts_from_defaults() {
        let store = SettingsStore::new(definition());
        assert!(store.get_bool("enabled"));
        assert_eq!(store.get("style"), Some(json!("short")));
        assert!(store.overrides().is_empty());
    }

    #[test]
    fn test_set_checks_type_and_choices() {
        let store = SettingsStore::new(definition());
        assert!(matches!(
            store.set("enabled", json!("yes")),
            Err(SettingsError::TypeMismatch { .. })
        ));
        assert!(matches!(
            store.set("style", json!("medium")),
            Err(SettingsError::TypeMismatch { .. })
        ));
        assert!(matches!(
            store.set("missing", json!(true)),
            Err(SettingsError::UnknownOption { .. })
        ));

        store.set("style", json!("full")).unwrap();
        assert_eq!(store.overrides(), BTreeMap::from([("style".to_string(), json!("full"))]));

        store.reset();
        assert_eq!(store.get("style"), Some(json!("short")));
    }
}
