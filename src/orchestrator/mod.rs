//! Applying and restoring patches across installed packages.
//!
//! Every package may carry a patch set. A package's own set can target any
//! installed package; the sets of all other packages are consulted for
//! patches targeting it. The [`Orchestrator`] walks these pairs, tests each
//! patch with a dry run before applying it, and reverts everything it
//! applied in the current run when a patch turns out to be broken.

mod errors;
mod history;
mod package;
mod report;

pub use errors::OrchestratorError;
pub use history::History;
pub use package::InstalledPackage;
pub use report::{ApplyReport, PatchEntry, PatchOutcome, RestoreReport, RunState};

use crate::fetch::ContentFetcher;
use crate::patch::{Patch, PatchError};
use crate::process::PatchTool;
use crate::resolve::PatchSet;
use crate::version::VersionMatcher;
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

/// Patches one source contributes to one target.
struct Batch<'p> {
    source: &'p InstalledPackage,
    target: &'p InstalledPackage,
    patches: Vec<Patch>,
}

impl Batch<'_> {
    fn entry(&self, patch: &Patch, outcome: PatchOutcome) -> PatchEntry {
        PatchEntry {
            source: self.source.name.clone(),
            package: self.target.name.clone(),
            checksum: patch.checksum().to_string(),
            title: patch.title().map(str::to_string),
            outcome,
        }
    }
}

/// A patch really applied during the current run.
struct Applied<'p> {
    patch: Patch,
    target: &'p InstalledPackage,
}

pub struct Orchestrator<'a> {
    fetcher: &'a dyn ContentFetcher,
    matcher: &'a dyn VersionMatcher,
    tool: &'a PatchTool,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        fetcher: &'a dyn ContentFetcher,
        matcher: &'a dyn VersionMatcher,
        tool: &'a PatchTool,
    ) -> Self {
        Self {
            fetcher,
            matcher,
            tool,
        }
    }

    /// Apply every patch that targets an installed package.
    ///
    /// Patches already in place are detected and left alone. On the first
    /// broken patch all patches applied by this call are reverted in reverse
    /// order and the failure is returned.
    pub fn apply(
        &self,
        packages: &[InstalledPackage],
        history: &mut History,
    ) -> Result<ApplyReport, OrchestratorError> {
        let mut report = ApplyReport::default();
        let mut ledger: Vec<Applied<'_>> = Vec::new();
        info!(packages = packages.len(), state = %RunState::Pending, "maintaining patches");

        for initial in packages {
            let batches = match self.collect(initial, packages, history) {
                Ok(batches) => batches,
                Err(err) => {
                    error!(package = %initial.name, error = %err, "patch resolution failed");
                    self.roll_back(&mut ledger, history);
                    return Err(err);
                }
            };

            for batch in &batches {
                for patch in &batch.patches {
                    match self.apply_one(patch, batch.target, history, &mut ledger) {
                        Ok(outcome) => report.entries.push(batch.entry(patch, outcome)),
                        Err(source) => {
                            let (rolled_back, rollback_failures) =
                                self.roll_back(&mut ledger, history);
                            let state = RunState::FailedRolledBack;
                            error!(
                                patch = patch.label(),
                                package = %batch.target.name,
                                %state,
                                error = %source,
                                "could not apply patch"
                            );
                            return Err(OrchestratorError::PatchFailed {
                                package: batch.target.name.clone(),
                                patch: patch.label().to_string(),
                                state,
                                rolled_back,
                                rollback_failures,
                                source,
                            });
                        }
                    }
                }
            }
        }

        info!(entries = report.entries.len(), state = %RunState::Applied, "patches maintained");
        Ok(report)
    }

    /// Revert every patch affecting `package`, last applied first.
    ///
    /// A failing revert is recorded and never stops the restore. Content
    /// already reverted from a target in this call is skipped as `Duplicate`.
    pub fn restore(
        &self,
        package: &str,
        packages: &[InstalledPackage],
        history: &mut History,
    ) -> Result<RestoreReport, OrchestratorError> {
        let initial = packages
            .iter()
            .find(|p| p.name == package)
            .ok_or_else(|| OrchestratorError::UnknownPackage {
                package: package.to_string(),
            })?;

        let mut report = RestoreReport::default();
        let mut reverted: HashSet<(String, String)> = HashSet::new();
        for batch in self.collect(initial, packages, history)? {
            let target = batch.target;
            for patch in batch.patches.iter().rev() {
                let key = (target.name.clone(), patch.checksum().to_string());
                if reverted.contains(&key) {
                    debug!(patch = patch.label(), package = %target.name, "duplicate patch skipped");
                    report.entries.push(batch.entry(patch, PatchOutcome::Duplicate));
                    continue;
                }

                let fatal = |source| OrchestratorError::Restore {
                    package: target.name.clone(),
                    patch: patch.label().to_string(),
                    source,
                };

                match patch.revert(self.tool, &target.install_path, true) {
                    Ok(()) => {}
                    Err(PatchError::Apply(err)) => warn!(
                        patch = patch.label(),
                        package = %target.name,
                        error = %err,
                        "could not revert patch (was probably not applied)"
                    ),
                    Err(err) => return Err(fatal(err)),
                }

                info!(patch = patch.label(), package = %target.name, "reverting patch");
                let outcome = match patch.revert(self.tool, &target.install_path, false) {
                    Ok(()) => {
                        history.unmark_applied(&target.name, patch.checksum());
                        reverted.insert(key);
                        PatchOutcome::Reverted
                    }
                    Err(PatchError::Apply(err)) => {
                        warn!(patch = patch.label(), package = %target.name, "revert failed");
                        PatchOutcome::RevertFailed {
                            reason: first_line(&err.output),
                        }
                    }
                    Err(err) => return Err(fatal(err)),
                };
                report.entries.push(batch.entry(patch, outcome));
            }
        }

        Ok(report)
    }

    /// Patches every source contributes to `package`, without running
    /// anything. Returns (source name, patches) pairs in source order.
    pub fn list(
        &self,
        package: &str,
        packages: &[InstalledPackage],
    ) -> Result<Vec<(String, Vec<Patch>)>, OrchestratorError> {
        let target = packages
            .iter()
            .find(|p| p.name == package)
            .ok_or_else(|| OrchestratorError::UnknownPackage {
                package: package.to_string(),
            })?;
        let version = self.normalize(target);

        let mut listed = Vec::new();
        for source in packages {
            let Some(tree) = &source.patches else {
                continue;
            };
            let mut set = PatchSet::new(tree.clone(), self.fetcher, self.matcher);
            let patches = set
                .get_patches(&target.name, &version)
                .map_err(|err| OrchestratorError::Resolve {
                    package: target.name.clone(),
                    from: source.name.clone(),
                    source: err,
                })?;
            if !patches.is_empty() {
                listed.push((source.name.clone(), patches.to_vec()));
            }
        }

        Ok(listed)
    }

    /// Test and apply a single patch, recording it in the ledger.
    fn apply_one<'p>(
        &self,
        patch: &Patch,
        target: &'p InstalledPackage,
        history: &mut History,
        ledger: &mut Vec<Applied<'p>>,
    ) -> Result<PatchOutcome, PatchError> {
        if history.is_applied(&target.name, patch.checksum()) {
            debug!(patch = patch.label(), package = %target.name, "duplicate patch skipped");
            return Ok(PatchOutcome::Duplicate);
        }

        let path = &target.install_path;
        debug!(
            patch = patch.label(),
            package = %target.name,
            state = %RunState::Testing,
            "testing patch"
        );
        match patch.apply(self.tool, path, true) {
            Ok(()) => {}
            Err(PatchError::Apply(err)) => {
                // A patch that reverts cleanly is already in place.
                if let Err(revert_err) = patch.revert(self.tool, path, true) {
                    debug!(error = %revert_err, "dry-run revert failed");
                    return Err(PatchError::Apply(err));
                }
                warn!(patch = patch.label(), package = %target.name, "patch already applied");
                history.mark_applied(&target.name, patch.checksum());
                return Ok(PatchOutcome::AlreadyApplied);
            }
            Err(err) => return Err(err),
        }

        info!(patch = patch.label(), package = %target.name, "applying patch");
        patch.apply(self.tool, path, false)?;
        history.mark_applied(&target.name, patch.checksum());
        ledger.push(Applied {
            patch: patch.clone(),
            target,
        });
        Ok(PatchOutcome::Applied)
    }

    /// Revert the ledger in reverse order. Returns (reverted, failed).
    fn roll_back(&self, ledger: &mut Vec<Applied<'_>>, history: &mut History) -> (usize, usize) {
        let mut reverted = 0;
        let mut failed = 0;

        while let Some(Applied { patch, target }) = ledger.pop() {
            match patch.revert(self.tool, &target.install_path, false) {
                Ok(()) => {
                    info!(patch = patch.label(), package = %target.name, "rolled back patch");
                    history.unmark_applied(&target.name, patch.checksum());
                    reverted += 1;
                }
                Err(err) => {
                    error!(
                        patch = patch.label(),
                        package = %target.name,
                        error = %err,
                        "rollback failed"
                    );
                    failed += 1;
                }
            }
        }

        (reverted, failed)
    }

    /// Patch batches relevant to `initial` that `history` has not seen.
    fn collect<'p>(
        &self,
        initial: &'p InstalledPackage,
        packages: &'p [InstalledPackage],
        history: &mut History,
    ) -> Result<Vec<Batch<'p>>, OrchestratorError> {
        let mut sources: Vec<(&'p InstalledPackage, Vec<&'p InstalledPackage>)> = packages
            .iter()
            .filter(|p| p.name != initial.name && p.patches.is_some())
            .map(|p| (p, vec![initial]))
            .collect();
        if initial.patches.is_some() {
            sources.push((initial, packages.iter().collect()));
        }

        let mut batches = Vec::new();
        for (source, targets) in sources {
            let Some(tree) = &source.patches else {
                continue;
            };
            let mut set = PatchSet::new(tree.clone(), self.fetcher, self.matcher);

            for target in targets {
                let key = History::key(&source.name, &target.name);
                if history.contains(&key) {
                    debug!(key, "patch set already processed");
                    continue;
                }

                let version = self.normalize(target);
                let patches = set
                    .get_patches(&target.name, &version)
                    .map_err(|err| OrchestratorError::Resolve {
                        package: target.name.clone(),
                        from: source.name.clone(),
                        source: err,
                    })?
                    .to_vec();
                if patches.is_empty() {
                    continue;
                }

                history.mark(key);
                batches.push(Batch {
                    source,
                    target,
                    patches,
                });
            }
        }

        Ok(batches)
    }

    fn normalize(&self, package: &InstalledPackage) -> String {
        match self.matcher.normalize(&package.version) {
            Ok(version) => version,
            Err(err) => {
                debug!(
                    package = %package.name,
                    version = %package.version,
                    error = %err,
                    "using version as is"
                );
                package.version.clone()
            }
        }
    }
}

fn first_line(output: &str) -> String {
    output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("patch tool failed")
        .to_string()
}
