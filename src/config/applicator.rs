//! Patch applicator - rewrites module sources from plugin patch descriptors
//!
//! Application is a two-phase pipeline:
//! - [`locate`] finds the module(s) containing a descriptor's `find` token
//! - [`apply_rule`] rewrites one module's text with one replacement rule
//!
//! [`apply_patches`] drives both phases over every enabled plugin in
//! registration order. Each patch sees the output of every patch before it,
//! so a plugin whose `match` depends on text another plugin rewrote will stop
//! matching. Failures are isolated per plugin and reported, never fatal.

use crate::config::matcher::{find_matches, lookaround, MatchSpan};
use crate::config::schema::{Matcher, PatchDescriptor, ReplacementRule};
use crate::config::template::{expand, ExpandContext};
use crate::config::version::{matches_requirement, VersionError};
use crate::edit::{apply_batch, Edit, EditError};
use crate::module::{ModuleId, ModuleMap};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

/// Host expression that `$self` expands to, `{name}` being the JSON-quoted
/// plugin name.
pub const DEFAULT_PLUGIN_REF: &str = "Vencord.Plugins.plugins[{name}]";

#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Template for the `$self` expansion
    pub plugin_ref: String,
    /// Build version of the host, checked against manifest `host_version` ranges
    pub host_version: Option<String>,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            plugin_ref: DEFAULT_PLUGIN_REF.to_string(),
            host_version: None,
        }
    }
}

impl ApplyOptions {
    /// The expression `$self` expands to for `plugin`.
    pub fn plugin_ref(&self, plugin: &str) -> String {
        let quoted = serde_json::to_string(plugin).unwrap_or_else(|_| format!("\"{plugin}\""));
        self.plugin_ref.replace("{name}", &quoted)
    }
}

/// One plugin's patches, in the order the plugin declared them.
#[derive(Debug, Clone)]
pub struct PluginPatches {
    pub plugin: String,
    pub host_version: Option<String>,
    pub patches: Vec<PatchDescriptor>,
}

impl PluginPatches {
    pub fn new(plugin: impl Into<String>, patches: Vec<PatchDescriptor>) -> Self {
        Self {
            plugin: plugin.into(),
            host_version: None,
            patches,
        }
    }
}

/// Errors during patch application. None of them are fatal to the host.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    #[error("[{plugin}] no module contains find {find:?}")]
    PatchNotFound { plugin: String, find: String },

    #[error("[{plugin}] find {find:?} matched {} modules ({}), expected 1", .modules.len(), join_ids(.modules))]
    AmbiguousPatch {
        plugin: String,
        find: String,
        modules: Vec<ModuleId>,
    },

    #[error("[{plugin}] replacement {pattern} had no effect on module {module} (find {find:?})")]
    ReplacementNotFound {
        plugin: String,
        find: String,
        module: ModuleId,
        pattern: String,
    },

    #[error("[{plugin}] invalid match pattern {pattern}: {message}")]
    InvalidPattern {
        plugin: String,
        pattern: String,
        message: String,
    },

    #[error("[{plugin}] edit failed on module {module}: {source}")]
    Edit {
        plugin: String,
        module: ModuleId,
        #[source]
        source: EditError,
    },

    #[error("[{plugin}] {source}")]
    Version {
        plugin: String,
        #[source]
        source: VersionError,
    },
}

impl PatchError {
    /// Whether this failure disables the owning plugin.
    pub fn degrades_plugin(&self) -> bool {
        matches!(
            self,
            PatchError::PatchNotFound { .. }
                | PatchError::AmbiguousPatch { .. }
                | PatchError::Version { .. }
        )
    }
}

fn join_ids(ids: &[ModuleId]) -> String {
    ids.iter()
        .map(ModuleId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result of one patch descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "PatchResult should be checked for success/failure"]
pub enum PatchResult {
    /// Every rule applied in every located module
    Applied { modules: Vec<ModuleId> },
    /// Located, but some rules did not apply; those modules proceed unpatched for them
    Partial {
        modules: Vec<ModuleId>,
        failures: Vec<PatchError>,
    },
    /// Discarded because another patch of the same plugin failed
    RolledBack { modules: Vec<ModuleId> },
    /// Optional patch whose `find` is absent
    Skipped,
    /// Manifest targets a different host version
    SkippedVersion { reason: String },
}

impl fmt::Display for PatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchResult::Applied { modules } => write!(f, "Applied to {}", join_ids(modules)),
            PatchResult::Partial { modules, failures } => write!(
                f,
                "Partially applied to {} ({} rule(s) failed)",
                join_ids(modules),
                failures.len()
            ),
            PatchResult::RolledBack { modules } => {
                write!(f, "Rolled back on {}", join_ids(modules))
            }
            PatchResult::Skipped => write!(f, "Skipped (optional, target absent)"),
            PatchResult::SkippedVersion { reason } => write!(f, "Skipped (version): {}", reason),
        }
    }
}

/// Outcome of one descriptor of one plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOutcome {
    pub plugin: String,
    pub find: String,
    pub result: Result<PatchResult, PatchError>,
}

/// Overall effect of patching on one plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginPatchStatus {
    Applied,
    /// At least one `find` failed; every change of the plugin was discarded
    Degraded { reason: String },
    SkippedVersion { reason: String },
}

#[derive(Debug, Clone, Default)]
pub struct PatchReport {
    /// Module sources after every surviving patch
    pub modules: ModuleMap,
    /// One entry per descriptor, in application order
    pub outcomes: Vec<PatchOutcome>,
    /// One entry per plugin, in registration order
    pub plugins: Vec<(String, PluginPatchStatus)>,
}

impl PatchReport {
    pub fn status(&self, plugin: &str) -> Option<&PluginPatchStatus> {
        self.plugins
            .iter()
            .find(|(name, _)| name == plugin)
            .map(|(_, status)| status)
    }

    pub fn is_degraded(&self, plugin: &str) -> bool {
        matches!(self.status(plugin), Some(PluginPatchStatus::Degraded { .. }))
    }

    /// Every error recorded, including individual rule failures.
    pub fn failures(&self) -> Vec<&PatchError> {
        let mut failures = Vec::new();
        for outcome in &self.outcomes {
            match &outcome.result {
                Err(e) => failures.push(e),
                Ok(PatchResult::Partial { failures: rules, .. }) => failures.extend(rules),
                Ok(_) => {}
            }
        }
        failures
    }
}

/// Result of rewriting one module's text with one rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleApplication {
    pub text: String,
    /// Number of spans rewritten
    pub edits: usize,
}

/// Why a rule could not be applied, without plugin or module context.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("pattern matched nothing")]
    NoMatch,
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),
    #[error(transparent)]
    Edit(#[from] EditError),
}

/// Phase 1: find the modules a descriptor targets.
///
/// Pure containment check over `modules` in the order given. Exactly one
/// candidate is required unless the descriptor sets `all`.
pub fn locate<'a, I>(
    modules: I,
    plugin: &str,
    patch: &PatchDescriptor,
) -> Result<Vec<ModuleId>, PatchError>
where
    I: IntoIterator<Item = (&'a ModuleId, &'a str)>,
{
    let candidates: Vec<ModuleId> = modules
        .into_iter()
        .filter(|(_, source)| source.contains(patch.find.as_str()))
        .map(|(id, _)| id.clone())
        .collect();

    match candidates.len() {
        0 => Err(PatchError::PatchNotFound {
            plugin: plugin.to_string(),
            find: patch.find.clone(),
        }),
        1 => Ok(candidates),
        _ if patch.all => Ok(candidates),
        _ => Err(PatchError::AmbiguousPatch {
            plugin: plugin.to_string(),
            find: patch.find.clone(),
            modules: candidates,
        }),
    }
}

/// Phase 2: rewrite `source` with one rule.
///
/// Only the first match is rewritten unless the rule is `global`. `plugin_ref`
/// is what `$self` expands to.
pub fn apply_rule(
    source: &str,
    rule: &ReplacementRule,
    plugin_ref: &str,
) -> Result<RuleApplication, RuleError> {
    if let Matcher::Literal(text) = &rule.matcher {
        if text.is_empty() {
            return Err(RuleError::NoMatch);
        }
    }

    let spans = find_matches(&rule.matcher, source, rule.global).map_err(|e| {
        RuleError::InvalidPattern(match lookaround(rule.matcher.source()) {
            Some(construct) => format!("{construct} is not supported"),
            None => e.to_string(),
        })
    })?;
    if spans.is_empty() {
        return Err(RuleError::NoMatch);
    }

    let edits: Vec<Edit> = spans
        .iter()
        .map(|span| edit_for_span(source, span, &rule.replace, plugin_ref))
        .collect();
    let text = apply_batch(source, &edits)?;

    Ok(RuleApplication {
        text,
        edits: edits.len(),
    })
}

fn edit_for_span(source: &str, span: &MatchSpan, template: &str, plugin_ref: &str) -> Edit {
    let new_text = expand(
        template,
        &ExpandContext {
            source,
            span,
            plugin_ref,
        },
    );
    Edit::new(
        span.range.start,
        span.range.end,
        new_text,
        &source[span.range.clone()],
    )
}

/// Apply every plugin's patches to `modules`.
///
/// Plugins are processed in the given order. A plugin's changes are staged and
/// only committed if all of its required `find` tokens resolved; otherwise the
/// plugin is reported as degraded and later plugins see the text as it was.
pub fn apply_patches(
    modules: &ModuleMap,
    plugins: &[PluginPatches],
    options: &ApplyOptions,
) -> PatchReport {
    let mut report = PatchReport {
        modules: modules.clone(),
        ..PatchReport::default()
    };

    for set in plugins {
        let status = apply_plugin(&mut report, set, options);
        report.plugins.push((set.plugin.clone(), status));
    }

    report
}

/// Evaluate patches without keeping the rewritten sources.
///
/// Same result semantics as [`apply_patches`]: `Applied` means "would apply".
pub fn check_patches(
    modules: &ModuleMap,
    plugins: &[PluginPatches],
    options: &ApplyOptions,
) -> Vec<PatchOutcome> {
    apply_patches(modules, plugins, options).outcomes
}

fn apply_plugin(
    report: &mut PatchReport,
    set: &PluginPatches,
    options: &ApplyOptions,
) -> PluginPatchStatus {
    let plugin = set.plugin.as_str();

    if let Some(host_version) = options.host_version.as_deref() {
        match matches_requirement(host_version, set.host_version.as_deref()) {
            Ok(true) => {}
            Ok(false) => {
                let reason = format!(
                    "host build {} is outside host_version {}",
                    host_version.trim(),
                    set.host_version.as_deref().unwrap_or("").trim()
                );
                debug!(plugin, %reason, "skipping plugin patches");
                for patch in &set.patches {
                    report.outcomes.push(PatchOutcome {
                        plugin: plugin.to_string(),
                        find: patch.find.clone(),
                        result: Ok(PatchResult::SkippedVersion {
                            reason: reason.clone(),
                        }),
                    });
                }
                return PluginPatchStatus::SkippedVersion { reason };
            }
            Err(source) => {
                let error = PatchError::Version {
                    plugin: plugin.to_string(),
                    source,
                };
                warn!("{error}");
                let reason = error.to_string();
                for patch in &set.patches {
                    report.outcomes.push(PatchOutcome {
                        plugin: plugin.to_string(),
                        find: patch.find.clone(),
                        result: Err(error.clone()),
                    });
                }
                return PluginPatchStatus::Degraded { reason };
            }
        }
    }

    let plugin_ref = options.plugin_ref(plugin);
    let mut staged: BTreeMap<ModuleId, String> = BTreeMap::new();
    let mut outcomes = Vec::with_capacity(set.patches.len());
    let mut degraded: Option<String> = None;

    for patch in &set.patches {
        let view = report.modules.iter().map(|(id, source)| {
            (id, staged.get(id).map(String::as_str).unwrap_or(source))
        });

        let targets = match locate(view, plugin, patch) {
            Ok(targets) => targets,
            Err(PatchError::PatchNotFound { .. }) if patch.no_warn => {
                debug!(plugin, find = %patch.find, "optional patch target absent");
                outcomes.push(PatchOutcome {
                    plugin: plugin.to_string(),
                    find: patch.find.clone(),
                    result: Ok(PatchResult::Skipped),
                });
                continue;
            }
            Err(error) => {
                warn!("{error}");
                degraded.get_or_insert_with(|| error.to_string());
                outcomes.push(PatchOutcome {
                    plugin: plugin.to_string(),
                    find: patch.find.clone(),
                    result: Err(error),
                });
                continue;
            }
        };

        let mut failures = Vec::new();
        for module in &targets {
            let mut text = staged
                .get(module)
                .cloned()
                .or_else(|| report.modules.get(module).map(str::to_string))
                .unwrap_or_default();

            for rule in &patch.replacement {
                match apply_rule(&text, rule, &plugin_ref) {
                    Ok(applied) => {
                        debug!(
                            plugin,
                            module = %module,
                            pattern = %rule.matcher,
                            edits = applied.edits,
                            "applied replacement"
                        );
                        text = applied.text;
                    }
                    Err(error) => {
                        let error = rule_error(error, plugin, patch, module, rule);
                        warn!("{error}");
                        failures.push(error);
                    }
                }
            }

            staged.insert(module.clone(), text);
        }

        let result = if failures.is_empty() {
            PatchResult::Applied { modules: targets }
        } else {
            PatchResult::Partial {
                modules: targets,
                failures,
            }
        };
        outcomes.push(PatchOutcome {
            plugin: plugin.to_string(),
            find: patch.find.clone(),
            result: Ok(result),
        });
    }

    let status = match degraded {
        Some(reason) => {
            warn!(plugin, "plugin patches rolled back");
            for outcome in &mut outcomes {
                let touched = match &outcome.result {
                    Ok(PatchResult::Applied { modules } | PatchResult::Partial { modules, .. }) => {
                        Some(modules.clone())
                    }
                    _ => None,
                };
                if let Some(modules) = touched {
                    outcome.result = Ok(PatchResult::RolledBack { modules });
                }
            }
            PluginPatchStatus::Degraded { reason }
        }
        None => {
            for (id, text) in staged {
                report.modules.insert(id, text);
            }
            PluginPatchStatus::Applied
        }
    };

    report.outcomes.extend(outcomes);
    status
}

fn rule_error(
    error: RuleError,
    plugin: &str,
    patch: &PatchDescriptor,
    module: &ModuleId,
    rule: &ReplacementRule,
) -> PatchError {
    match error {
        RuleError::NoMatch => PatchError::ReplacementNotFound {
            plugin: plugin.to_string(),
            find: patch.find.clone(),
            module: module.clone(),
            pattern: rule.matcher.to_string(),
        },
        RuleError::InvalidPattern(message) => PatchError::InvalidPattern {
            plugin: plugin.to_string(),
            pattern: rule.matcher.to_string(),
            message,
        },
        RuleError::Edit(source) => PatchError::Edit {
            plugin: plugin.to_string(),
            module: module.clone(),
            source,
        },
    }
}
