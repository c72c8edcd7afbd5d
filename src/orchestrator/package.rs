use serde_json::Value;
use std::path::PathBuf;

/// A package present in the install tree.
#[derive(Debug, Clone, PartialEq)]
pub struct InstalledPackage {
    pub name: String,
    pub version: String,
    /// Directory the patch tool runs in
    pub install_path: PathBuf,
    /// Patch-set tree (or URL of one) this package contributes, if any
    pub patches: Option<Value>,
}

impl InstalledPackage {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        install_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            install_path: install_path.into(),
            patches: None,
        }
    }

    pub fn with_patches(mut self, patches: impl Into<Value>) -> Self {
        self.patches = Some(patches.into());
        self
    }
}
