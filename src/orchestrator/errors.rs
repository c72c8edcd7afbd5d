use crate::patch::PatchError;
use super::RunState;
use crate::resolve::ResolveError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("package '{package}' is not installed")]
    UnknownPackage { package: String },

    #[error("failed to resolve patches from '{from}' for '{package}': {source}")]
    Resolve {
        package: String,
        from: String,
        #[source]
        source: ResolveError,
    },

    #[error(
        "could not apply patch {patch} to '{package}' \
         ({rolled_back} rolled back, {rollback_failures} could not be reverted): {source}"
    )]
    PatchFailed {
        package: String,
        patch: String,
        /// State the run ended in
        state: RunState,
        rolled_back: usize,
        rollback_failures: usize,
        #[source]
        source: PatchError,
    },

    #[error("could not revert patch {patch} from '{package}': {source}")]
    Restore {
        package: String,
        patch: String,
        #[source]
        source: PatchError,
    },
}
