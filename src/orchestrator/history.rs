use std::collections::HashSet;

/// What one orchestrator invocation has already done.
///
/// Owned by the caller so that several runs can share it.
#[derive(Debug, Default, Clone)]
pub struct History {
    processed: HashSet<String>,
    applied: HashSet<(String, String)>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifier of a (patch-set source, target package) pair.
    pub fn key(source: &str, target: &str) -> String {
        format!("{source}->{target}")
    }

    pub fn contains(&self, key: &str) -> bool {
        self.processed.contains(key)
    }

    pub fn mark(&mut self, key: String) {
        self.processed.insert(key);
    }

    /// Whether a patch with `checksum` is already in place on `package`.
    pub fn is_applied(&self, package: &str, checksum: &str) -> bool {
        self.applied
            .contains(&(package.to_string(), checksum.to_string()))
    }

    pub fn mark_applied(&mut self, package: &str, checksum: &str) {
        self.applied
            .insert((package.to_string(), checksum.to_string()));
    }

    pub fn unmark_applied(&mut self, package: &str, checksum: &str) {
        self.applied
            .remove(&(package.to_string(), checksum.to_string()));
    }
}
