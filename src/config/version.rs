//! Host build gating for plugin manifests.
//!
//! The host reports its build in the host config, either as a plain build
//! number (`281654`) or as a dotted release (`1.0.9005`). A manifest's
//! `host_version` is compared against whichever form the host uses:
//!
//! ```toml
//! host_version = ">=280000, <290000"   # build numbers
//! host_version = ">=1.0.9000"          # releases, semver comparison
//! ```

use semver::{Version, VersionReq};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("host build '{value}' is neither a build number nor a release version")]
    InvalidHostBuild { value: String },

    #[error("invalid host_version range '{value}': {reason}")]
    InvalidRequirement { value: String, reason: String },
}

/// The identifier of the running host build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostBuild {
    Number(u64),
    Release(Version),
}

impl FromStr for HostBuild {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(number) = s.parse::<u64>() {
            return Ok(HostBuild::Number(number));
        }
        Version::parse(s)
            .map(HostBuild::Release)
            .map_err(|_| VersionError::InvalidHostBuild {
                value: s.to_string(),
            })
    }
}

impl fmt::Display for HostBuild {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostBuild::Number(n) => write!(f, "build {n}"),
            HostBuild::Release(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
}

/// Comma-separated build-number comparisons, all of which must hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRange {
    clauses: Vec<(Op, u64)>,
}

impl BuildRange {
    pub fn contains(&self, build: u64) -> bool {
        self.clauses.iter().all(|&(op, bound)| match op {
            Op::Eq => build == bound,
            Op::Gt => build > bound,
            Op::Ge => build >= bound,
            Op::Lt => build < bound,
            Op::Le => build <= bound,
        })
    }
}

impl FromStr for BuildRange {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| VersionError::InvalidRequirement {
            value: s.trim().to_string(),
            reason,
        };

        let clauses = s
            .split(',')
            .map(|clause| {
                let clause = clause.trim();
                let (op, rest) = [
                    (">=", Op::Ge),
                    ("<=", Op::Le),
                    (">", Op::Gt),
                    ("<", Op::Lt),
                    ("=", Op::Eq),
                ]
                .iter()
                .find_map(|(prefix, op)| clause.strip_prefix(*prefix).map(|rest| (*op, rest)))
                .unwrap_or((Op::Eq, clause));

                let rest = rest.trim();
                if rest.is_empty() {
                    return Err(invalid(format!("empty comparison in '{clause}'")));
                }
                rest.parse::<u64>()
                    .map(|bound| (op, bound))
                    .map_err(|_| invalid(format!("'{rest}' is not a build number")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { clauses })
    }
}

/// Check that a manifest range is usable against some host build form.
pub fn validate_requirement(requirement: &str) -> Result<(), VersionError> {
    let requirement = requirement.trim();
    if requirement.parse::<BuildRange>().is_ok() {
        return Ok(());
    }
    VersionReq::parse(requirement)
        .map(|_| ())
        .map_err(|e| VersionError::InvalidRequirement {
            value: requirement.to_string(),
            reason: e.to_string(),
        })
}

/// Whether `host_build` falls inside a manifest's `host_version` range.
///
/// # Examples
///
/// ```
/// use bundle_patcher::config::version::matches_requirement;
///
/// assert!(matches_requirement("281654", Some(">=280000, <290000")).unwrap());
/// assert!(!matches_requirement("1.0.8999", Some(">=1.0.9000")).unwrap());
///
/// // No range: every host build
/// assert!(matches_requirement("281654", None).unwrap());
/// ```
pub fn matches_requirement(
    host_build: &str,
    requirement: Option<&str>,
) -> Result<bool, VersionError> {
    let Some(requirement) = requirement.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(true);
    };

    match host_build.parse::<HostBuild>()? {
        HostBuild::Number(build) => Ok(requirement.parse::<BuildRange>()?.contains(build)),
        HostBuild::Release(version) => {
            let req =
                VersionReq::parse(requirement).map_err(|e| VersionError::InvalidRequirement {
                    value: requirement.to_string(),
                    reason: e.to_string(),
                })?;
            Ok(req.matches(&version))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_number_ranges() {
        let range = ">=280000, <290000";
        assert!(matches_requirement("280000", Some(range)).unwrap());
        assert!(matches_requirement(" 289999 ", Some(range)).unwrap());
        assert!(!matches_requirement("290000", Some(range)).unwrap());
        assert!(!matches_requirement("279999", Some(range)).unwrap());
    }

    #[test]
    fn test_bare_build_number_is_exact() {
        assert!(matches_requirement("281654", Some("281654")).unwrap());
        assert!(!matches_requirement("281655", Some("=281654")).unwrap());
    }

    #[test]
    fn test_release_versions_use_semver() {
        let req = ">=1.0.9000, <1.0.9100";
        assert!(matches_requirement("1.0.9005", Some(req)).unwrap());
        assert!(!matches_requirement("1.0.9100", Some(req)).unwrap());
        // Numeric shorthand still means a release range for dotted hosts
        assert!(matches_requirement("2.1.0", Some(">=2")).unwrap());
    }

    #[test]
    fn test_no_requirement_matches_everything() {
        assert!(matches_requirement("281654", None).unwrap());
        assert!(matches_requirement("anything", Some("  ")).unwrap());
    }

    #[test]
    fn test_build_host_rejects_release_range() {
        assert!(matches!(
            matches_requirement("281654", Some(">=1.0.9000")),
            Err(VersionError::InvalidRequirement { .. })
        ));
        assert!(matches!(
            matches_requirement("stable", Some(">=1")),
            Err(VersionError::InvalidHostBuild { .. })
        ));
    }

    #[test]
    fn test_validate_accepts_either_form() {
        assert!(validate_requirement(">=280000, <290000").is_ok());
        assert!(validate_requirement("^1.0.9000").is_ok());
        assert!(validate_requirement(">=").is_err());
        assert!(validate_requirement(">=bad").is_err());
    }
}
