pub mod applicator;
pub mod host;
pub mod loader;
pub mod matcher;
pub mod schema;
pub mod template;
pub mod version;

pub use applicator::{
    apply_patches, apply_rule, check_patches, locate, ApplyOptions, PatchError, PatchOutcome,
    PatchReport, PatchResult, PluginPatchStatus, PluginPatches, RuleApplication, RuleError,
};
pub use host::{HostConfig, PluginEntry};
pub use loader::{load_dir, load_from_path, load_from_str, ConfigError};
pub use schema::{
    Matcher, Metadata, PatchDescriptor, PluginManifest, ReplacementRule, ValidationError,
    ValidationIssue,
};
pub use version::{matches_requirement, validate_requirement, BuildRange, HostBuild, VersionError};
