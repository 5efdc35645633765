//! Persistent key-value store shared by plugins.
//!
//! Keys are plugin-scoped strings; values are JSON. The file-backed store keeps
//! every key in one JSON object and rewrites it atomically on each change.

use crate::edit::atomic_write;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataStoreError {
    #[error("I/O error on data store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("data store {path} is not valid JSON: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("data store {0} must hold a JSON object")]
    NotAnObject(PathBuf),

    #[error("value under '{key}' has an unexpected shape: {source}")]
    Shape {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

pub trait DataStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, DataStoreError>;
    fn set(&self, key: &str, value: Value) -> Result<(), DataStoreError>;
    fn delete(&self, key: &str) -> Result<(), DataStoreError>;
}

/// Read `key` and deserialize it into `T`.
pub fn get_typed<T: DeserializeOwned>(
    store: &dyn DataStore,
    key: &str,
) -> Result<Option<T>, DataStoreError> {
    match store.get(key)? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|source| DataStoreError::Shape {
                key: key.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

/// Serialize `value` and store it under `key`.
pub fn set_typed<T: Serialize>(
    store: &dyn DataStore,
    key: &str,
    value: &T,
) -> Result<(), DataStoreError> {
    let value = serde_json::to_value(value).map_err(|source| DataStoreError::Shape {
        key: key.to_string(),
        source,
    })?;
    store.set(key, value)
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DataStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, DataStoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), DataStoreError> {
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), DataStoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// One JSON object on disk. A missing file reads as empty.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Map<String, Value>, DataStoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(source) => {
                return Err(DataStoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if contents.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str(&contents) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(DataStoreError::NotAnObject(self.path.clone())),
            Err(source) => Err(DataStoreError::Corrupt {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn write_all(&self, map: Map<String, Value>) -> Result<(), DataStoreError> {
        let body = serde_json::to_vec_pretty(&Value::Object(map)).map_err(|source| {
            DataStoreError::Corrupt {
                path: self.path.clone(),
                source,
            }
        })?;
        atomic_write(&self.path, &body).map_err(|source| DataStoreError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl DataStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, DataStoreError> {
        let _guard = self.lock.lock();
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: Value) -> Result<(), DataStoreError> {
        let _guard = self.lock.lock();
        let mut map = self.read_all()?;
        map.insert(key.to_string(), value);
        self.write_all(map)
    }

    fn delete(&self, key: &str) -> Result<(), DataStoreError> {
        let _guard = self.lock.lock();
        let mut map = self.read_all()?;
        if map.remove(key).is_some() {
            self.write_all(map)?;
        }
        Ok(())
    }
}
