//! A single resolved patch.
//!
//! A [`Patch`] owns the bytes of its diff, fetched once when it is created
//! and verified against the descriptor's `sha1`. Applying and reverting run
//! the external patch tool through a [`PatchTool`].

pub mod diff;

use crate::fetch::{ContentFetcher, FetchError};
use crate::process::{CommandLine, PatchTool, ProcessError};
use crate::resolve::PatchDescriptor;
use diff::{header_paths, Side};
use sha1::{Digest, Sha1};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::debug;

/// Flags passed to the patch tool on every invocation.
const BASE_ARGS: [&str; 5] = ["-f", "-p1", "--no-backup-if-mismatch", "-r", "-"];

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("expected checksum '{expected}' but got '{actual}' for {url}")]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("unexpected path in diff header: {line}")]
    MalformedPath { line: String },

    #[error("failed to fetch patch: {0}")]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Apply(#[from] PatchApplyError),
}

/// The patch tool exited unsuccessfully.
#[derive(Debug, Clone)]
pub struct PatchApplyError {
    pub checksum: String,
    pub command: CommandLine,
    pub dry_run: bool,
    pub output: String,
}

impl fmt::Display for PatchApplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = if self.dry_run { "would fail" } else { "failed" };
        writeln!(f, "Patch {} {}!", self.checksum, verb)?;
        writeln!(f, "Error executing command \"{}\":", self.command)?;
        write!(f, "{}", self.output.trim_end())
    }
}

impl std::error::Error for PatchApplyError {}

#[derive(Clone)]
pub struct Patch {
    descriptor: Arc<PatchDescriptor>,
    content: Arc<[u8]>,
    checksum: String,
    deletions: OnceLock<Vec<String>>,
    additions: OnceLock<Vec<String>>,
}

impl Patch {
    /// Fetch the patch content and verify it.
    pub fn new(descriptor: PatchDescriptor, fetcher: &dyn ContentFetcher) -> Result<Self, PatchError> {
        let content = fetcher.get_contents(&descriptor.url)?;
        Self::from_content(descriptor, content)
    }

    /// Build a patch from content that was already fetched.
    pub fn from_content(descriptor: PatchDescriptor, content: Vec<u8>) -> Result<Self, PatchError> {
        let checksum = format!("{:x}", Sha1::digest(&content));

        if let Some(expected) = &descriptor.sha1 {
            if !expected.eq_ignore_ascii_case(&checksum) {
                return Err(PatchError::ChecksumMismatch {
                    url: descriptor.url.clone(),
                    expected: expected.clone(),
                    actual: checksum,
                });
            }
        }

        Ok(Self {
            descriptor: Arc::new(descriptor),
            content: content.into(),
            checksum,
            deletions: OnceLock::new(),
            additions: OnceLock::new(),
        })
    }

    /// SHA-1 of the content, lowercase hex.
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    pub fn descriptor(&self) -> &PatchDescriptor {
        &self.descriptor
    }

    pub fn url(&self) -> &str {
        &self.descriptor.url
    }

    pub fn title(&self) -> Option<&str> {
        self.descriptor.title.as_deref()
    }

    pub fn id(&self) -> Option<&str> {
        self.descriptor.id.as_deref()
    }

    /// Title if there is one, checksum otherwise.
    pub fn label(&self) -> &str {
        self.title().unwrap_or(&self.checksum)
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Files deleted or replaced by this patch.
    pub fn file_deletions(&self) -> Result<&[String], PatchError> {
        if let Some(paths) = self.deletions.get() {
            return Ok(paths);
        }
        let paths = header_paths(&String::from_utf8_lossy(&self.content), Side::Old)?;
        Ok(self.deletions.get_or_init(|| paths))
    }

    /// Files added or replaced by this patch.
    pub fn file_additions(&self) -> Result<&[String], PatchError> {
        if let Some(paths) = self.additions.get() {
            return Ok(paths);
        }
        let paths = header_paths(&String::from_utf8_lossy(&self.content), Side::New)?;
        Ok(self.additions.get_or_init(|| paths))
    }

    pub fn apply(&self, tool: &PatchTool, target: &Path, dry_run: bool) -> Result<(), PatchError> {
        self.run(tool, target, false, dry_run)
    }

    pub fn revert(&self, tool: &PatchTool, target: &Path, dry_run: bool) -> Result<(), PatchError> {
        self.run(tool, target, true, dry_run)
    }

    /// Arguments for the patch tool, without the program itself.
    pub fn command_args(&self, revert: bool, dry_run: bool) -> Vec<String> {
        let mut args: Vec<String> = BASE_ARGS.iter().map(|a| a.to_string()).collect();
        if revert {
            args.push("-R".to_string());
        }
        args.extend(self.descriptor.extra_args());
        if dry_run {
            args.push("--dry-run".to_string());
        }
        args
    }

    fn run(&self, tool: &PatchTool, target: &Path, revert: bool, dry_run: bool) -> Result<(), PatchError> {
        let args = self.command_args(revert, dry_run);
        let (command, output) = tool.run(&args, target, &self.content)?;
        debug!(
            checksum = %self.checksum,
            command = %command,
            code = ?output.code,
            "patch tool finished"
        );

        if output.success() {
            return Ok(());
        }
        Err(PatchApplyError {
            checksum: self.checksum.clone(),
            command,
            dry_run,
            output: output.combined(),
        }
        .into())
    }
}

impl fmt::Debug for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Patch")
            .field("checksum", &self.checksum)
            .field("url", &self.descriptor.url)
            .field("title", &self.descriptor.title)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::PatchArgs;

    const CONTENT: &[u8] = b"--- a/foo.txt\n+++ b/foo.txt\n@@ -1 +1 @@\n-old\n+new\n";

    fn sha1_hex(bytes: &[u8]) -> String {
        format!("{:x}", Sha1::digest(bytes))
    }

    #[test]
    fn test_checksum_of_content() {
        let patch = Patch::from_content(PatchDescriptor::new("x"), CONTENT.to_vec()).unwrap();
        assert_eq!(patch.checksum(), sha1_hex(CONTENT));
        assert_eq!(patch.checksum().len(), 40);
    }

    #[test]
    fn test_known_sha1() {
        let patch = Patch::from_content(PatchDescriptor::new("x"), b"abc".to_vec()).unwrap();
        assert_eq!(patch.checksum(), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn test_declared_checksum_matches() {
        let mut descriptor = PatchDescriptor::new("x");
        descriptor.sha1 = Some(sha1_hex(CONTENT).to_uppercase());
        assert!(Patch::from_content(descriptor, CONTENT.to_vec()).is_ok());
    }

    #[test]
    fn test_declared_checksum_mismatch() {
        let mut descriptor = PatchDescriptor::new("x");
        descriptor.sha1 = Some("0000000000000000000000000000000000000000".to_string());
        match Patch::from_content(descriptor, CONTENT.to_vec()) {
            Err(PatchError::ChecksumMismatch { expected, actual, .. }) => {
                assert_eq!(expected, "0000000000000000000000000000000000000000");
                assert_eq!(actual, sha1_hex(CONTENT));
            }
            other => panic!("expected ChecksumMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_file_lists() {
        let patch = Patch::from_content(PatchDescriptor::new("x"), CONTENT.to_vec()).unwrap();
        assert_eq!(patch.file_deletions().unwrap(), ["foo.txt"]);
        assert_eq!(patch.file_additions().unwrap(), ["foo.txt"]);
        // memoized
        assert_eq!(patch.file_additions().unwrap().as_ptr(), patch.file_additions().unwrap().as_ptr());
    }

    #[test]
    fn test_command_args() {
        let mut descriptor = PatchDescriptor::new("x");
        descriptor.args = Some(PatchArgs::Line("--ignore-whitespace".to_string()));
        let patch = Patch::from_content(descriptor, CONTENT.to_vec()).unwrap();

        assert_eq!(
            patch.command_args(false, false),
            ["-f", "-p1", "--no-backup-if-mismatch", "-r", "-", "--ignore-whitespace"]
        );
        assert_eq!(
            patch.command_args(true, true),
            ["-f", "-p1", "--no-backup-if-mismatch", "-r", "-", "-R", "--ignore-whitespace", "--dry-run"]
        );
    }

    #[test]
    fn test_label_prefers_title() {
        let mut descriptor = PatchDescriptor::new("x");
        let untitled = Patch::from_content(descriptor.clone(), CONTENT.to_vec()).unwrap();
        assert_eq!(untitled.label(), untitled.checksum());

        descriptor.title = Some("Fix foo".to_string());
        let titled = Patch::from_content(descriptor, CONTENT.to_vec()).unwrap();
        assert_eq!(titled.label(), "Fix foo");
    }

    #[test]
    fn test_apply_error_message() {
        let err = PatchApplyError {
            checksum: "abc".to_string(),
            command: CommandLine::new("/usr/bin/patch", vec!["-f".to_string(), "--dry-run".to_string()]),
            dry_run: true,
            output: "Hunk #1 FAILED\n".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Patch abc would fail!\nError executing command \"/usr/bin/patch -f --dry-run\":\nHunk #1 FAILED"
        );
    }
}
