//! Version normalization and constraint matching.
//!
//! Patch sets key their patch lists by constraints like `"1.0.0"`,
//! `">=1.2 <2.0"`, `"~1.2"` or `"^1.4 || ^2.0"`. [`VersionMatcher`] is the
//! capability the resolver uses to decide which lists apply to an installed
//! version; [`SemverMatcher`] implements it on top of the `semver` crate.
//!
//! Constraints follow the patch-set conventions rather than Cargo's where
//! the two differ: a bare version pins exactly, `~X.Y` allows any later
//! minor release of `X`, and alternatives may be separated by `|` or `||`.

use semver::{Version, VersionReq};
use std::fmt;

/// Errors during version filtering
#[derive(Debug, Clone)]
pub enum VersionError {
    /// Invalid version string (e.g., "dev-master")
    InvalidVersion { value: String, source: String },
    /// Invalid version requirement (e.g., ">=bad")
    InvalidRequirement { value: String, source: String },
}

impl fmt::Display for VersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionError::InvalidVersion { value, source } => {
                write!(f, "invalid version '{}': {}", value, source)
            }
            VersionError::InvalidRequirement { value, source } => {
                write!(f, "invalid version requirement '{}': {}", value, source)
            }
        }
    }
}

impl std::error::Error for VersionError {}

/// A parsed version constraint.
pub trait VersionConstraint: fmt::Debug {
    /// Whether the concrete (normalized) `version` satisfies this constraint.
    fn matches(&self, version: &str) -> Result<bool, VersionError>;
}

/// Capability for normalizing versions and parsing constraints.
pub trait VersionMatcher {
    fn normalize(&self, version: &str) -> Result<String, VersionError>;

    fn parse_constraint(
        &self,
        constraint: &str,
    ) -> Result<Box<dyn VersionConstraint>, VersionError>;
}

/// [`VersionMatcher`] backed by `semver`, accepting loosely formatted versions.
#[derive(Debug, Clone, Copy, Default)]
pub struct SemverMatcher;

impl VersionMatcher for SemverMatcher {
    fn normalize(&self, version: &str) -> Result<String, VersionError> {
        parse_version(version).map(|v| v.to_string())
    }

    fn parse_constraint(
        &self,
        constraint: &str,
    ) -> Result<Box<dyn VersionConstraint>, VersionError> {
        SemverConstraint::parse(constraint).map(|c| Box::new(c) as Box<dyn VersionConstraint>)
    }
}

/// One alternative of a constraint.
#[derive(Debug, Clone)]
enum Alternative {
    Any,
    Exact(Version),
    Range(VersionReq),
}

/// Disjunction of alternatives; matches when any alternative does.
#[derive(Debug, Clone)]
pub struct SemverConstraint {
    raw: String,
    alternatives: Vec<Alternative>,
}

impl SemverConstraint {
    pub fn parse(constraint: &str) -> Result<Self, VersionError> {
        let invalid = |source: String| VersionError::InvalidRequirement {
            value: constraint.to_string(),
            source,
        };

        let mut alternatives = Vec::new();
        for alt in constraint.replace("||", "|").split('|') {
            let alt = alt.trim();
            if alt.is_empty() {
                return Err(invalid("empty alternative".to_string()));
            }
            if alt == "*" {
                alternatives.push(Alternative::Any);
                continue;
            }
            // A bare version pins exactly, unlike semver's implicit caret.
            if let Ok(version) = parse_version(alt) {
                alternatives.push(Alternative::Exact(version));
                continue;
            }
            let req = VersionReq::parse(&comma_separated(alt)).map_err(|e| invalid(e.to_string()))?;
            alternatives.push(Alternative::Range(req));
        }

        Ok(Self {
            raw: constraint.to_string(),
            alternatives,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl VersionConstraint for SemverConstraint {
    fn matches(&self, version: &str) -> Result<bool, VersionError> {
        let version = parse_version(version)?;
        Ok(self.alternatives.iter().any(|alt| match alt {
            Alternative::Any => true,
            Alternative::Exact(exact) => *exact == version,
            Alternative::Range(req) => req.matches(&version),
        }))
    }
}

impl fmt::Display for SemverConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Parse a loosely formatted version (`v1.2`, `1.2.3.0`, `1.2.3-beta.1`).
fn parse_version(input: &str) -> Result<Version, VersionError> {
    let invalid = |source: String| VersionError::InvalidVersion {
        value: input.to_string(),
        source,
    };

    let trimmed = input.trim();
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);

    if let Ok(version) = Version::parse(trimmed) {
        return Ok(version);
    }

    // Split off pre-release/build metadata before fixing up the numeric core.
    let split_at = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    let (core, suffix) = trimmed.split_at(split_at);

    let mut parts: Vec<&str> = core.split('.').collect();
    if parts.len() == 4 && parts[3].chars().all(|c| c == '0') {
        parts.truncate(3);
    }
    if parts.is_empty()
        || parts.len() > 3
        || parts
            .iter()
            .any(|p| p.is_empty() || !p.chars().all(|c| c.is_ascii_digit()))
    {
        return Err(invalid("not a numeric version".to_string()));
    }
    while parts.len() < 3 {
        parts.push("0");
    }

    Version::parse(&format!("{}{}", parts.join("."), suffix)).map_err(|e| invalid(e.to_string()))
}

/// `">=1.0 <2.0"` and `">= 1.0, <2.0"` both become `">=1.0, <2.0"`.
fn comma_separated(alt: &str) -> String {
    let mut comparators: Vec<String> = Vec::new();
    let mut pending_op = String::new();

    for token in alt.split([' ', ',', '\t']).filter(|t| !t.is_empty()) {
        if token.chars().all(|c| matches!(c, '<' | '>' | '=' | '~' | '^')) {
            pending_op.push_str(token);
            continue;
        }
        let comparator = format!("{}{}", std::mem::take(&mut pending_op), token);
        comparators.push(widen_tilde(&comparator).unwrap_or(comparator));
    }
    if !pending_op.is_empty() {
        comparators.push(pending_op);
    }

    comparators.join(", ")
}

/// `~1.2` is `>=1.2.0, <2.0.0` and `~1` is `>=1.0.0, <2.0.0`. A full
/// `~1.2.3` already means `<1.3.0` to semver and is left alone.
fn widen_tilde(comparator: &str) -> Option<String> {
    let version = comparator.strip_prefix('~')?;
    let parts: Vec<u64> = version
        .split('.')
        .map(|p| p.parse().ok())
        .collect::<Option<_>>()?;
    let (major, minor) = match parts[..] {
        [major] => (major, 0),
        [major, minor] => (major, minor),
        _ => return None,
    };
    Some(format!(">={major}.{minor}.0, <{}.0.0", major.checked_add(1)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(version: &str, constraint: &str) -> bool {
        SemverConstraint::parse(constraint)
            .unwrap()
            .matches(version)
            .unwrap()
    }

    #[test]
    fn test_bare_version_is_exact() {
        assert!(matches("1.0.0", "1.0.0"));
        assert!(!matches("1.0.1", "1.0.0"));
        assert!(!matches("1.5.0", "1.0.0"));
        assert!(matches("1.0.0", "v1.0"));
        assert!(matches("1.0.0", "1.0.0.0"));
    }

    #[test]
    fn test_simple_requirement() {
        assert!(matches("2.4.0", ">=2.4"));
        assert!(matches("2.5.1", ">=2.4"));
        assert!(!matches("2.3.9", ">=2.4"));

        assert!(matches("2.3.9", "<2.4"));
        assert!(!matches("2.4.0", "<2.4"));
    }

    #[test]
    fn test_space_and_comma_separated_ranges() {
        assert!(matches("1.5.0", ">=1.0 <2.0"));
        assert!(matches("1.5.0", ">= 1.0 < 2.0"));
        assert!(matches("1.5.0", ">=1.0, <2.0"));
        assert!(!matches("2.0.0", ">=1.0 <2.0"));
        assert!(!matches("0.9.0", ">=1.0,<2.0"));
    }

    #[test]
    fn test_alternatives() {
        for constraint in ["^1.4 || ^3.0", "^1.4 | ^3.0", "^1.4|^3.0"] {
            assert!(matches("1.4.2", constraint), "{constraint}");
            assert!(matches("3.1.0", constraint), "{constraint}");
            assert!(!matches("2.0.0", constraint), "{constraint}");
        }
        assert!(matches("1.0.0", "1.0.0 | 2.0.0"));
        assert!(!matches("1.5.0", "1.0.0 | 2.0.0"));
    }

    #[test]
    fn test_empty_alternative_is_invalid() {
        for constraint in ["", "  ", "^1.0 ||", "| ^1.0", "1.0 ||| 2.0"] {
            let err = SemverConstraint::parse(constraint).unwrap_err();
            assert!(
                matches!(err, VersionError::InvalidRequirement { .. }),
                "{constraint}"
            );
        }
    }

    #[test]
    fn test_wildcard() {
        assert!(matches("7.3.1", "*"));
        assert!(matches("0.1.0-alpha", "*"));
    }

    #[test]
    fn test_caret_requirement() {
        assert!(matches("0.88.0", "^0.88"));
        assert!(matches("0.88.5", "^0.88"));
        assert!(!matches("0.89.0", "^0.88"));
    }

    #[test]
    fn test_tilde_allows_later_minor_releases() {
        assert!(matches("1.2.0", "~1.2"));
        assert!(matches("1.3.0", "~1.2"));
        assert!(matches("1.9.4", "~1.2"));
        assert!(!matches("1.1.9", "~1.2"));
        assert!(!matches("2.0.0", "~1.2"));

        assert!(matches("1.7.0", "~1"));
        assert!(!matches("2.0.0", "~1"));
        assert!(matches("1.5.0", "~ 1.2"));
    }

    #[test]
    fn test_full_tilde_stays_within_minor() {
        assert!(matches("1.2.9", "~1.2.3"));
        assert!(!matches("1.2.2", "~1.2.3"));
        assert!(!matches("1.3.0", "~1.2.3"));
    }

    #[test]
    fn test_tilde_inside_alternatives() {
        assert!(matches("1.4.0", "~1.2 | ~3.0"));
        assert!(matches("3.8.0", "~1.2 || ~3.0"));
        assert!(!matches("2.1.0", "~1.2 | ~3.0"));
    }

    #[test]
    fn test_widen_tilde() {
        assert_eq!(widen_tilde("~1.2").as_deref(), Some(">=1.2.0, <2.0.0"));
        assert_eq!(widen_tilde("~0").as_deref(), Some(">=0.0.0, <1.0.0"));
        assert_eq!(widen_tilde("~1.2.3"), None);
        assert_eq!(widen_tilde("~1.2-beta"), None);
        assert_eq!(widen_tilde("^1.2"), None);
    }

    #[test]
    fn test_invalid_version() {
        let constraint = SemverConstraint::parse(">=2.0").unwrap();
        assert!(matches!(
            constraint.matches("dev-main").unwrap_err(),
            VersionError::InvalidVersion { .. }
        ));
    }

    #[test]
    fn test_invalid_requirement() {
        let err = SemverConstraint::parse(">=bad-version").unwrap_err();
        assert!(matches!(err, VersionError::InvalidRequirement { .. }));
        assert!(err.to_string().starts_with("invalid version requirement '>=bad-version'"));
    }

    #[test]
    fn test_prerelease_versions() {
        let req = ">=2.0.0-beta.2";
        assert!(matches("2.0.0-beta.2", req));
        assert!(matches("2.0.0-beta.3", req));
        assert!(!matches("2.0.0-beta.1", req));
    }

    #[test]
    fn test_normalize() {
        let m = SemverMatcher;
        assert_eq!(m.normalize("1.2.3").unwrap(), "1.2.3");
        assert_eq!(m.normalize("v1.2").unwrap(), "1.2.0");
        assert_eq!(m.normalize("2").unwrap(), "2.0.0");
        assert_eq!(m.normalize("1.2.3.0").unwrap(), "1.2.3");
        assert_eq!(m.normalize("1.2-beta.1").unwrap(), "1.2.0-beta.1");
        assert!(m.normalize("dev-master").is_err());
        assert!(m.normalize("1.2.3.4").is_err());
    }

    #[test]
    fn test_parse_constraint_through_matcher() {
        let m = SemverMatcher;
        let constraint = m.parse_constraint("~1.2").unwrap();
        assert!(constraint.matches("1.2.9").unwrap());
        assert!(constraint.matches("1.3.0").unwrap());
        assert!(!constraint.matches("2.0.0").unwrap());
    }
}
