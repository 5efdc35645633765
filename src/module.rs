//! The host's module map: module identifier → source text.
//!
//! Iteration order is the identifier order, so locating a `find` token across
//! modules is deterministic regardless of how the host enumerated them.

use crate::edit::atomic_write;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Identifier of one unit of the host's bundled code.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(String);

impl ModuleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ModuleId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("failed to read module directory {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("duplicate module id '{id}' ({path})")]
    Duplicate { id: ModuleId, path: PathBuf },
}

/// Source text of every loaded module, keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleMap {
    modules: BTreeMap<ModuleId, String>,
    /// File each module was read from, when loaded from disk
    origins: BTreeMap<ModuleId, PathBuf>,
}

impl ModuleMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<ModuleId>, source: impl Into<String>) -> Option<String> {
        self.modules.insert(id.into(), source.into())
    }

    pub fn get(&self, id: &ModuleId) -> Option<&str> {
        self.modules.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ModuleId, &str)> {
        self.modules.iter().map(|(id, src)| (id, src.as_str()))
    }

    /// Path the module was loaded from, if any.
    pub fn origin(&self, id: &ModuleId) -> Option<&Path> {
        self.origins.get(id).map(PathBuf::as_path)
    }

    /// Load every `.js` file under `dir` (one level deep) as a module whose id
    /// is the file stem.
    pub fn load_dir(dir: &Path) -> Result<Self, ModuleError> {
        let mut map = ModuleMap::new();

        for entry in WalkDir::new(dir).max_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|source| ModuleError::Walk {
                path: dir.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|s| s.to_str()) != Some("js")
            {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let source = fs::read_to_string(path).map_err(|source| ModuleError::Io {
                path: path.to_path_buf(),
                source,
            })?;

            let id = ModuleId::new(stem);
            if map.modules.contains_key(&id) {
                return Err(ModuleError::Duplicate {
                    id,
                    path: path.to_path_buf(),
                });
            }
            map.origins.insert(id.clone(), path.to_path_buf());
            map.modules.insert(id, source);
        }

        Ok(map)
    }

    /// Write back every module that differs from `original`, returning the
    /// ids that were written. Modules without an on-disk origin are skipped.
    pub fn write_changed(&self, original: &ModuleMap) -> Result<Vec<ModuleId>, ModuleError> {
        let mut written = Vec::new();

        for (id, source) in &self.modules {
            if original.get(id) == Some(source.as_str()) {
                continue;
            }
            let Some(path) = self.origins.get(id) else {
                continue;
            };
            atomic_write(path, source.as_bytes()).map_err(|source| ModuleError::Io {
                path: path.clone(),
                source,
            })?;
            written.push(id.clone());
        }

        Ok(written)
    }
}

impl<I: Into<ModuleId>, S: Into<String>> FromIterator<(I, S)> for ModuleMap {
    fn from_iter<T: IntoIterator<Item = (I, S)>>(iter: T) -> Self {
        let mut map = ModuleMap::new();
        for (id, source) in iter {
            map.insert(id, source);
        }
        map
    }
}
