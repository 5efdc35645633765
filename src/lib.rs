//! Bundle Patcher: runtime patch engine for bundled web-app modules
//!
//! Plugins rewrite the host application's module sources before the host
//! evaluates them, then hook into the host's UI through a small set of
//! extension points (settings, context menus, modals, a key-value store).
//!
//! # Architecture
//!
//! Every rewrite compiles down to a single primitive: [`Edit`], a verified
//! byte-span replacement over a module's source text. Patch application is a
//! two-phase pipeline:
//!
//! 1. [`config::locate`] finds the module(s) containing a descriptor's `find`
//!    token, returning a typed absence or ambiguity.
//! 2. [`config::apply_rule`] rewrites one module's text with one replacement
//!    rule, returning the new text or a typed failure.
//!
//! Patches from several plugins chain left-to-right in registration order:
//! each patch sees the output of the ones before it.
//!
//! # Failure isolation
//!
//! - A plugin whose `find` token is missing or ambiguous is rolled back and
//!   reported as degraded; other plugins still apply
//! - A replacement that no longer matches is skipped and reported
//! - Render hooks run behind an error boundary that renders nothing on failure
//!
//! # Example
//!
//! ```
//! use bundle_patcher::config::{apply_rule, Matcher, ReplacementRule};
//!
//! let rule = ReplacementRule::new(Matcher::literal("=5"), "=Infinity");
//! let applied = apply_rule("const maxAccounts=5;", &rule, "plugins.Example").unwrap();
//! assert_eq!(applied.text, "const maxAccounts=Infinity;");
//! ```

pub mod cache;
pub mod config;
pub mod edit;
pub mod module;
pub mod plugin;
pub mod plugins;

// Re-exports
pub use config::{
    apply_patches, apply_rule, check_patches, load_from_path, load_from_str, locate,
    matches_requirement, ApplyOptions, ConfigError, HostConfig, Matcher, PatchDescriptor,
    PatchError, PatchReport, PluginManifest, ReplacementRule, VersionError,
};
pub use edit::{Edit, EditError, EditVerification};
pub use module::{ModuleId, ModuleMap};
pub use plugin::{
    ContextMenuRegistry, DataStore, HostServices, JsonFileStore, MemoryStore, Plugin,
    PluginError, PluginManager, PluginMeta, SettingsStore,
};
