use std::fmt;

/// Where an apply run is. A returned [`ApplyReport`] means `Applied`; a
/// failed run carries `FailedRolledBack` on its error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Pending,
    /// A dry run is in progress
    Testing,
    Applied,
    FailedRolledBack,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Pending => "pending",
            RunState::Testing => "testing",
            RunState::Applied => "applied",
            RunState::FailedRolledBack => "failed, rolled back",
        };
        f.write_str(name)
    }
}

/// What happened to one patch.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "PatchOutcome should be checked"]
pub enum PatchOutcome {
    Applied,
    /// The patch was found to be in place already
    AlreadyApplied,
    /// Same content already applied to this package in this invocation
    Duplicate,
    Reverted,
    RevertFailed { reason: String },
}

impl PatchOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, PatchOutcome::RevertFailed { .. })
    }
}

impl fmt::Display for PatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchOutcome::Applied => write!(f, "Applied"),
            PatchOutcome::AlreadyApplied => write!(f, "Already applied"),
            PatchOutcome::Duplicate => write!(f, "Skipped (duplicate)"),
            PatchOutcome::Reverted => write!(f, "Reverted"),
            PatchOutcome::RevertFailed { reason } => write!(f, "Revert failed: {}", reason),
        }
    }
}

/// One patch handled during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchEntry {
    /// Package whose patch set contributed the patch
    pub source: String,
    /// Package the patch was run against
    pub package: String,
    pub checksum: String,
    pub title: Option<String>,
    pub outcome: PatchOutcome,
}

impl PatchEntry {
    /// Title if there is one, checksum otherwise.
    pub fn label(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.checksum)
    }
}

impl fmt::Display for PatchEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.package, self.label(), self.outcome)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub entries: Vec<PatchEntry>,
}

impl ApplyReport {
    pub fn count(&self, outcome: &PatchOutcome) -> usize {
        self.entries.iter().filter(|e| &e.outcome == outcome).count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub entries: Vec<PatchEntry>,
}

impl RestoreReport {
    pub fn failures(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_failure()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(title: Option<&str>, outcome: PatchOutcome) -> PatchEntry {
        PatchEntry {
            source: "vendor/patches".to_string(),
            package: "vendor/lib".to_string(),
            checksum: "abc123".to_string(),
            title: title.map(str::to_string),
            outcome,
        }
    }

    #[test]
    fn test_entry_display() {
        let titled = entry(Some("Fix crash"), PatchOutcome::Applied);
        assert_eq!(titled.to_string(), "vendor/lib: Fix crash (Applied)");

        let untitled = entry(
            None,
            PatchOutcome::RevertFailed {
                reason: "Hunk #1 FAILED".to_string(),
            },
        );
        assert_eq!(
            untitled.to_string(),
            "vendor/lib: abc123 (Revert failed: Hunk #1 FAILED)"
        );
    }

    #[test]
    fn test_counts() {
        let report = ApplyReport {
            entries: vec![
                entry(None, PatchOutcome::Applied),
                entry(None, PatchOutcome::Duplicate),
                entry(None, PatchOutcome::Applied),
            ],
        };
        assert_eq!(report.count(&PatchOutcome::Applied), 2);
        assert_eq!(report.count(&PatchOutcome::AlreadyApplied), 0);

        let restore = RestoreReport {
            entries: vec![
                entry(None, PatchOutcome::Reverted),
                entry(
                    None,
                    PatchOutcome::RevertFailed {
                        reason: String::new(),
                    },
                ),
            ],
        };
        assert_eq!(restore.failures(), 1);
    }
}
