use serde::{Deserialize, Serialize};
use std::fmt;

/// A declarative plugin: metadata plus the patches it applies.
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct PluginManifest {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub patches: Vec<PatchDescriptor>,
}

impl PluginManifest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.meta.name.trim().is_empty() {
            issues.push(ValidationIssue::MissingField {
                find: None,
                field: "meta.name",
            });
        }

        let range = self.meta.host_version.as_deref().map(str::trim);
        if let Some(range) = range.filter(|r| !r.is_empty()) {
            if let Err(e) = crate::config::version::validate_requirement(range) {
                issues.push(ValidationIssue::InvalidCombo {
                    find: None,
                    message: e.to_string(),
                });
            }
        }

        if self.patches.is_empty() {
            issues.push(ValidationIssue::EmptyPatchList);
        }

        for patch in &self.patches {
            patch.collect_issues(&mut issues);
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    /// Semver range of host builds this manifest targets
    #[serde(default)]
    pub host_version: Option<String>,
}

/// Locates one module by a literal `find` token and rewrites it.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct PatchDescriptor {
    /// Literal substring expected in exactly one module
    pub find: String,
    /// Rules applied in order, each against the previous rule's output
    pub replacement: Vec<ReplacementRule>,
    /// Patch every module containing `find` instead of treating it as ambiguous
    #[serde(default)]
    pub all: bool,
    /// Do not warn when `find` is absent
    #[serde(default)]
    pub no_warn: bool,
}

impl PatchDescriptor {
    pub fn new(find: impl Into<String>, replacement: Vec<ReplacementRule>) -> Self {
        Self {
            find: find.into(),
            replacement,
            all: false,
            no_warn: false,
        }
    }

    pub fn all(mut self) -> Self {
        self.all = true;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();
        self.collect_issues(&mut issues);
        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    fn collect_issues(&self, issues: &mut Vec<ValidationIssue>) {
        let find = (!self.find.is_empty()).then(|| self.find.clone());

        if self.find.trim().is_empty() {
            issues.push(ValidationIssue::MissingField {
                find: None,
                field: "find",
            });
        }

        if self.replacement.is_empty() {
            issues.push(ValidationIssue::MissingField {
                find: find.clone(),
                field: "replacement",
            });
        }

        for rule in &self.replacement {
            match &rule.matcher {
                Matcher::Literal(text) | Matcher::Regex(text) if text.is_empty() => {
                    issues.push(ValidationIssue::MissingField {
                        find: find.clone(),
                        field: "replacement.match",
                    });
                }
                Matcher::Regex(pattern) => {
                    if let Some(construct) = crate::config::matcher::lookaround(pattern) {
                        issues.push(ValidationIssue::UnsupportedLookaround {
                            find: find.clone(),
                            construct,
                        });
                    } else if let Err(e) = crate::config::matcher::compile(pattern) {
                        issues.push(ValidationIssue::InvalidCombo {
                            find: find.clone(),
                            message: format!("invalid match pattern: {e}"),
                        });
                    }
                }
                Matcher::Literal(_) => {}
            }
        }
    }
}

/// One `match` → `replace` rewrite.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ReplacementRule {
    #[serde(rename = "match")]
    pub matcher: Matcher,
    /// Replacement template (`$&`, `$1`, `$<name>`, `$self`, ...)
    pub replace: String,
    /// Rewrite every match instead of only the first
    #[serde(default)]
    pub global: bool,
}

impl ReplacementRule {
    pub fn new(matcher: Matcher, replace: impl Into<String>) -> Self {
        Self {
            matcher,
            replace: replace.into(),
            global: false,
        }
    }

    pub fn global(mut self) -> Self {
        self.global = true;
        self
    }
}

/// How a rule finds the text it rewrites.
///
/// In TOML: `match = { literal = "=5" }` or `match = { regex = "..." }`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Matcher {
    /// Exact text
    Literal(String),
    /// Regular expression; `\i` matches an identifier
    Regex(String),
}

impl Matcher {
    pub fn literal(text: impl Into<String>) -> Self {
        Matcher::Literal(text.into())
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        Matcher::Regex(pattern.into())
    }

    /// The pattern as written, for diagnostics.
    pub fn source(&self) -> &str {
        match self {
            Matcher::Literal(text) | Matcher::Regex(text) => text,
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Literal(text) => write!(f, "{text:?}"),
            Matcher::Regex(pattern) => write!(f, "/{pattern}/"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    EmptyPatchList,
    MissingField {
        find: Option<String>,
        field: &'static str,
    },
    InvalidCombo {
        find: Option<String>,
        message: String,
    },
    UnsupportedLookaround {
        find: Option<String>,
        construct: &'static str,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyPatchList => write!(f, "plugin manifest contains no patches"),
            ValidationIssue::MissingField { find, field } => match find {
                Some(find) => write!(f, "patch {find:?} missing required field '{field}'"),
                None => write!(f, "missing required field '{field}'"),
            },
            ValidationIssue::InvalidCombo { find, message } => match find {
                Some(find) => write!(f, "patch {find:?} has invalid configuration: {message}"),
                None => write!(f, "invalid plugin manifest: {message}"),
            },
            ValidationIssue::UnsupportedLookaround { find, construct } => {
                if let Some(find) = find {
                    write!(f, "patch {find:?}: ")?;
                }
                write!(
                    f,
                    "{construct} is not supported in match patterns; capture the context instead (`(?<=a)b` → `(a)b` with `$1` in replace)"
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_validation_flags_empty_fields() {
        let patch = PatchDescriptor::new("", vec![]);
        let err = patch.validate().unwrap_err();
        assert_eq!(err.issues.len(), 2);
    }

    #[test]
    fn test_descriptor_validation_flags_bad_regex() {
        let patch = PatchDescriptor::new(
            "\"Message Username\"",
            vec![ReplacementRule::new(Matcher::regex("(unclosed"), "$&")],
        );
        let err = patch.validate().unwrap_err();
        assert!(err.to_string().contains("invalid match pattern"));
    }

    #[test]
    fn test_descriptor_validation_names_lookaround() {
        let patch = PatchDescriptor::new(
            ".NITRO_BANNER,",
            vec![ReplacementRule::new(
                Matcher::regex(r"(?<=hasProfileEffect.+?)children:\["),
                "$&$self.renderProfileTimezone(arguments[0]),",
            )],
        );
        let err = patch.validate().unwrap_err();
        assert!(matches!(
            err.issues[0],
            ValidationIssue::UnsupportedLookaround { construct: "lookbehind", .. }
        ));
        assert!(err.to_string().contains("lookbehind is not supported"));
    }

    #[test]
    fn test_matcher_display() {
        assert_eq!(Matcher::literal("=5").to_string(), "\"=5\"");
        assert_eq!(Matcher::regex("a.b").to_string(), "/a.b/");
    }
}
