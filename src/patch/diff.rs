//! File lists from unified diff headers.

use super::PatchError;

/// Path used in diff headers for "no file on this side".
pub const NULL_DEVICE: &str = "/dev/null";

/// Which side of a diff header to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// `--- a/...` lines: files deleted or replaced
    Old,
    /// `+++ b/...` lines: files added or replaced
    New,
}

impl Side {
    fn marker(self) -> &'static str {
        match self {
            Side::Old => "--- ",
            Side::New => "+++ ",
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            Side::Old => "a",
            Side::New => "b",
        }
    }
}

/// Paths named on `side` of every file header in `content`, with the
/// `a/`/`b/` component stripped and null-device entries skipped.
pub fn header_paths(content: &str, side: Side) -> Result<Vec<String>, PatchError> {
    let mut paths = Vec::new();

    for line in content.lines() {
        let Some(rest) = line.strip_prefix(side.marker()) else {
            continue;
        };
        // `diff -u` appends a tab and a timestamp
        let path = rest.split_once('\t').map_or(rest, |(path, _)| path);
        if path.is_empty() || path == NULL_DEVICE {
            continue;
        }

        match path.split_once('/') {
            Some((prefix, stripped)) if prefix == side.prefix() => {
                paths.push(stripped.to_string());
            }
            _ => {
                return Err(PatchError::MalformedPath {
                    line: line.to_string(),
                });
            }
        }
    }

    Ok(paths)
}
