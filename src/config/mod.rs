//! The `patchset.toml` manifest of installed packages.

pub mod loader;
pub mod schema;

pub use loader::{load_from_path, load_from_str, ConfigError, LoadedManifest};
pub use schema::{Manifest, PackageEntry, ValidationError, ValidationIssue};
