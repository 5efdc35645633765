//! NoAccountLimit: lifts the cap on accounts in the account switcher.

use crate::config::{Matcher, PatchDescriptor, ReplacementRule};
use crate::plugin::{Plugin, PluginMeta};

pub const NAME: &str = "NoAccountLimit";

#[derive(Debug)]
pub struct NoAccountLimit {
    meta: PluginMeta,
}

impl NoAccountLimit {
    pub fn new() -> Self {
        Self {
            meta: PluginMeta::new(
                NAME,
                "Allows you to add as many accounts as you want",
                &["HAHALOSAH"],
            ),
        }
    }
}

impl Default for NoAccountLimit {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for NoAccountLimit {
    fn meta(&self) -> &PluginMeta {
        &self.meta
    }

    fn patches(&self) -> Vec<PatchDescriptor> {
        vec![PatchDescriptor::new(
            r#""switch-accounts-modal""#,
            vec![ReplacementRule::new(Matcher::literal("=5"), "=Infinity")],
        )]
    }
}
