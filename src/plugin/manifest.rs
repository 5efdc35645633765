//! Plugins declared entirely in TOML manifests.

use crate::config::{PatchDescriptor, PluginManifest};
use crate::plugin::{Plugin, PluginMeta};

/// Patch-only plugin backed by a [`PluginManifest`].
#[derive(Debug, Clone)]
pub struct ManifestPlugin {
    meta: PluginMeta,
    host_version: Option<String>,
    patches: Vec<PatchDescriptor>,
}

impl From<PluginManifest> for ManifestPlugin {
    fn from(manifest: PluginManifest) -> Self {
        let PluginManifest { meta, patches } = manifest;
        Self {
            meta: PluginMeta {
                name: meta.name,
                description: meta.description.unwrap_or_default(),
                authors: meta.authors,
            },
            host_version: meta.host_version,
            patches,
        }
    }
}

impl Plugin for ManifestPlugin {
    fn meta(&self) -> &PluginMeta {
        &self.meta
    }

    fn patches(&self) -> Vec<PatchDescriptor> {
        self.patches.clone()
    }

    fn host_version(&self) -> Option<&str> {
        self.host_version.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_from_str;

    #[test]
    fn test_manifest_plugin_carries_meta_and_patches() {
        let manifest = load_from_str(
            r#"
[meta]
name = "QuietTyping"
description = "Hide the typing indicator"
authors = ["someone"]
host_version = ">=1.0.0"

[[patches]]
find = "typingIndicator"

[[patches.replacement]]
match = { literal = "show:!0" }
replace = "show:!1"
"#,
        )
        .unwrap();

        let plugin = ManifestPlugin::from(manifest);
        assert_eq!(plugin.meta().name, "QuietTyping");
        assert_eq!(plugin.host_version(), Some(">=1.0.0"));
        assert_eq!(plugin.patches().len(), 1);
        assert!(plugin.settings().is_none());
    }
}
