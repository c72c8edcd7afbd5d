//! Reading `patchset.toml` and anchoring it to its directory.

use crate::config::schema::{Manifest, ValidationError};
use crate::fetch::Fetcher;
use crate::orchestrator::InstalledPackage;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read manifest {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {}: {source}", describe(path))]
    Parse {
        path: Option<PathBuf>,
        #[source]
        source: toml_edit::de::Error,
    },

    #[error("invalid {}: {source}", describe(path))]
    Invalid {
        path: Option<PathBuf>,
        #[source]
        source: ValidationError,
    },

    #[error("cannot access manifest directory {}: {source}", dir.display())]
    BaseDir {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn describe(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!("manifest {}", path.display()),
        None => "manifest".to_string(),
    }
}

/// A validated manifest and the directory its relative paths start from.
#[derive(Debug, Clone)]
pub struct LoadedManifest {
    pub manifest: Manifest,
    /// Canonical directory containing the manifest file
    pub base_dir: PathBuf,
}

impl LoadedManifest {
    /// Installed packages with absolute install paths.
    pub fn packages(&self) -> Vec<InstalledPackage> {
        self.manifest.installed(&self.base_dir)
    }

    /// Fetcher reading relative patch locations from the manifest directory.
    pub fn fetcher(&self) -> Fetcher {
        Fetcher::new(self.base_dir.clone())
    }
}

/// Parse and validate manifest text. Relative paths stay unresolved.
pub fn load_from_str(input: &str) -> Result<Manifest, ConfigError> {
    parse(input, None)
}

/// Read the manifest at `path` and resolve its directory.
///
/// A bare file name is taken relative to the current directory.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<LoadedManifest, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let manifest = parse(&contents, Some(path))?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let base_dir = dir.canonicalize().map_err(|source| ConfigError::BaseDir {
        dir: dir.to_path_buf(),
        source,
    })?;

    Ok(LoadedManifest { manifest, base_dir })
}

fn parse(input: &str, path: Option<&Path>) -> Result<Manifest, ConfigError> {
    let manifest: Manifest = toml_edit::de::from_str(input).map_err(|source| ConfigError::Parse {
        path: path.map(Path::to_path_buf),
        source,
    })?;
    manifest.validate().map_err(|source| ConfigError::Invalid {
        path: path.map(Path::to_path_buf),
        source,
    })?;
    Ok(manifest)
}
