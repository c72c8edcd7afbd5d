//! Patchset: resolve patch sets and apply them with the `patch` tool
//!
//! A patch set is a JSON tree (possibly spread over several documents)
//! mapping package names and version constraints to unified diffs. This
//! crate resolves such trees into concrete, checksum-verified patches and
//! applies or reverts them against installed package directories.
//!
//! # Architecture
//!
//! - [`resolve::PatchSet`] walks the tree for one package version, fetching
//!   referenced documents through a [`fetch::ContentFetcher`] and matching
//!   constraints through a [`version::VersionMatcher`].
//! - [`patch::Patch`] owns one diff: its checksum, the files it touches,
//!   and apply/revert through a [`process::PatchTool`].
//! - [`orchestrator::Orchestrator`] applies patches across packages, testing
//!   each with a dry run first and rolling back the whole run when one is
//!   broken.
//!
//! # Example
//!
//! ```no_run
//! use patchset::{Fetcher, PatchSet, PatchTool, SemverMatcher};
//! use serde_json::json;
//! use std::path::Path;
//!
//! let fetcher = Fetcher::new(".");
//! let matcher = SemverMatcher;
//! let tool = PatchTool::new();
//!
//! let mut set = PatchSet::new(
//!     json!({"vendor/library": {">=1.0 <2.0": [{"url": "patches/fix.diff"}]}}),
//!     &fetcher,
//!     &matcher,
//! );
//! for patch in set.get_patches("vendor/library", "1.2.0")? {
//!     patch.apply(&tool, Path::new("vendor/library"), true)?;
//!     patch.apply(&tool, Path::new("vendor/library"), false)?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod fetch;
pub mod orchestrator;
pub mod patch;
pub mod process;
pub mod resolve;
pub mod version;

pub use fetch::{ContentFetcher, FetchError, Fetcher};
pub use orchestrator::{History, InstalledPackage, Orchestrator, OrchestratorError};
pub use patch::{Patch, PatchApplyError, PatchError};
pub use process::{PatchTool, ProcessError, ProcessRunner};
pub use resolve::{PatchDescriptor, PatchSet, ResolveError};
pub use version::{SemverMatcher, VersionError, VersionMatcher};
