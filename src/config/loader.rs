use crate::config::schema::{PluginManifest, ValidationError};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },
}

impl ConfigError {
    pub(crate) fn with_path(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        match self {
            ConfigError::Io { .. } => self,
            ConfigError::Toml { path: None, source } => ConfigError::Toml {
                path: Some(path),
                source,
            },
            ConfigError::Validation { path: None, source } => ConfigError::Validation {
                path: Some(path),
                source,
            },
            other => other,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read {}: {}", path.display(), source)
            }
            ConfigError::Toml { path, source } => match path {
                Some(path) => write!(f, "failed to parse TOML ({}): {}", path.display(), source),
                None => write!(f, "failed to parse TOML: {}", source),
            },
            ConfigError::Validation { path, source } => match path {
                Some(path) => write!(f, "invalid plugin manifest ({}): {}", path.display(), source),
                None => write!(f, "invalid plugin manifest: {}", source),
            },
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Validation { source, .. } => Some(source),
        }
    }
}

pub fn load_from_str(input: &str) -> Result<PluginManifest, ConfigError> {
    let manifest: PluginManifest = toml_edit::de::from_str(input)
        .map_err(|source| ConfigError::Toml { path: None, source })?;
    manifest
        .validate()
        .map_err(|source| ConfigError::Validation { path: None, source })?;
    Ok(manifest)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<PluginManifest, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_str(&contents).map_err(|error| error.with_path(path))
}

/// Load every `.toml` manifest directly inside `dir`, sorted by file name so
/// registration order is stable across runs.
pub fn load_dir(dir: impl AsRef<Path>) -> Result<Vec<PluginManifest>, ConfigError> {
    let dir = dir.as_ref();
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| ConfigError::Io {
            path: dir.to_path_buf(),
            source: e.into(),
        })?;
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|s| s.to_str()) == Some("toml")
        {
            files.push(entry.path().to_path_buf());
        }
    }

    files.iter().map(load_from_path).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{Matcher, ValidationIssue};

    const MANIFEST: &str = r#"
[meta]
name = "NoAccountLimit"
description = "Allows you to add as many accounts as you want"
authors = ["HAHALOSAH"]

[[patches]]
find = '"switch-accounts-modal"'

[[patches.replacement]]
match = { literal = "=5" }
replace = "=Infinity"
"#;

    #[test]
    fn test_load_manifest() {
        let manifest = load_from_str(MANIFEST).unwrap();
        assert_eq!(manifest.meta.name, "NoAccountLimit");
        assert_eq!(manifest.patches.len(), 1);
        assert_eq!(manifest.patches[0].find, "\"switch-accounts-modal\"");
        assert_eq!(
            manifest.patches[0].replacement[0].matcher,
            Matcher::literal("=5")
        );
        assert!(!manifest.patches[0].all);
    }

    #[test]
    fn test_validation_error_carries_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.toml");
        fs::write(&path, "[meta]\nname = \"Empty\"\n").unwrap();

        let err = load_from_path(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { path: Some(_), .. }));
        assert!(err.to_string().contains("empty.toml"));
    }

    #[test]
    fn test_lookbehind_pattern_is_reported() {
        let err = load_from_str(
            r#"
[meta]
name = "Timezone"

[[patches]]
find = ".NITRO_BANNER,"

[[patches.replacement]]
match = { regex = '(?<=hasProfileEffect.+?)children:\[' }
replace = "$&$self.renderProfileTimezone(arguments[0]),"
"#,
        )
        .unwrap_err();

        let ConfigError::Validation { source, .. } = &err else {
            panic!("expected a validation error, got {err}");
        };
        assert!(matches!(
            source.issues.as_slice(),
            [ValidationIssue::UnsupportedLookaround { construct: "lookbehind", .. }]
        ));
    }

    #[test]
    fn test_load_dir_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.toml"), MANIFEST.replace("NoAccountLimit", "B")).unwrap();
        fs::write(dir.path().join("a.toml"), MANIFEST.replace("NoAccountLimit", "A")).unwrap();
        fs::write(dir.path().join("readme.md"), "ignored").unwrap();

        let names: Vec<String> = load_dir(dir.path())
            .unwrap()
            .into_iter()
            .map(|m| m.meta.name)
            .collect();
        assert_eq!(names, vec!["A", "B"]);
    }
}
