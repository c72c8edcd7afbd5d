use crate::orchestrator::InstalledPackage;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

/// Installed packages, as listed in `patchset.toml`.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Manifest {
    #[serde(default, rename = "package")]
    pub packages: Vec<PackageEntry>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PackageEntry {
    pub name: String,
    pub version: String,
    /// Install directory, relative to the manifest unless absolute
    pub path: String,
    /// URL/path of a patch set, or an inline patch-set table
    #[serde(default)]
    pub patches: Option<serde_json::Value>,
}

impl Manifest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.packages.is_empty() {
            issues.push(ValidationIssue::EmptyPackageList);
        }

        let mut seen = HashSet::new();
        for package in &self.packages {
            let name = package.name.trim();
            if name.is_empty() {
                issues.push(ValidationIssue::MissingField {
                    package: None,
                    field: "name",
                });
            } else if !seen.insert(name) {
                issues.push(ValidationIssue::DuplicatePackage {
                    package: name.to_string(),
                });
            }

            let id = (!name.is_empty()).then(|| name.to_string());
            if package.version.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    package: id.clone(),
                    field: "version",
                });
            }
            if package.path.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    package: id,
                    field: "path",
                });
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    /// Packages with install paths resolved against `base_dir`.
    pub fn installed(&self, base_dir: &Path) -> Vec<InstalledPackage> {
        self.packages
            .iter()
            .map(|entry| {
                let package = InstalledPackage::new(
                    entry.name.trim(),
                    entry.version.trim(),
                    base_dir.join(&entry.path),
                );
                match &entry.patches {
                    Some(patches) => package.with_patches(patches.clone()),
                    None => package,
                }
            })
            .collect()
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

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    EmptyPackageList,
    MissingField {
        package: Option<String>,
        field: &'static str,
    },
    DuplicatePackage {
        package: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyPackageList => write!(f, "manifest lists no packages"),
            ValidationIssue::MissingField { package, field } => match package {
                Some(name) => write!(f, "package '{name}' missing required field '{field}'"),
                None => write!(f, "package missing required field '{field}'"),
            },
            ValidationIssue::DuplicatePackage { package } => {
                write!(f, "package '{package}' is listed more than once")
            }
        }
    }
}
