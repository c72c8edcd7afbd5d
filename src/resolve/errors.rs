use crate::fetch::FetchError;
use crate::patch::PatchError;
use crate::version::VersionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("empty data entry at {location}")]
    EmptyData { location: String },

    #[error("patch set data at {location} must be a map or list, found {found}")]
    InvalidData {
        location: String,
        found: &'static str,
    },

    #[error("package '{package}' mixes patches with constraints and without constraints")]
    MixedConstraints { package: String },

    #[error("entry {package}.{constraint}[{index}] is not a valid patch")]
    InvalidPatchEntry {
        package: String,
        constraint: String,
        index: String,
    },

    #[error("invalid patch descriptor at {location}: {source}")]
    Descriptor {
        location: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error(transparent)]
    Patch(#[from] PatchError),
}
