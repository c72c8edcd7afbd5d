//! Patch-set resolution.
//!
//! A patch set is a JSON tree mapping package names to patches. Any node
//! may be a URL pointing at another JSON document, and below a package the
//! keys are either patches themselves or version constraints mapping to
//! lists of patches:
//!
//! ```json
//! {
//!     "vendor/library": {
//!         ">=1.0 <1.4": [{"url": "https://example.com/fix-1.diff"}],
//!         "1.4.0": "https://example.com/patches-1.4.json"
//!     },
//!     "vendor/tool": {"url": "tool.diff", "sha1": "..."},
//!     "vendor/tool-legacy": "vendor/tool"
//! }
//! ```
//!
//! [`PatchSet::get_patches`] turns this into the ordered list of [`Patch`]es
//! for one package version, fetching what it needs on the way and caching
//! everything it resolves.

mod descriptor;
mod errors;
mod node;

pub use descriptor::{PatchArgs, PatchDescriptor};
pub use errors::ResolveError;

use crate::fetch::ContentFetcher;
use crate::patch::Patch;
use crate::version::VersionMatcher;
use node::{classify, flatten, is_patch, Node};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use tracing::debug;

const ROOT: &str = "<root>";

/// One patch-set source and everything resolved from it so far.
pub struct PatchSet<'a> {
    source: Value,
    root: Option<Map<String, Value>>,
    packages: HashMap<String, Map<String, Value>>,
    resolved: HashMap<String, HashMap<String, Vec<Patch>>>,
    fetcher: &'a dyn ContentFetcher,
    matcher: &'a dyn VersionMatcher,
}

impl<'a> PatchSet<'a> {
    /// `source` is either a parsed tree or a string URL of one.
    pub fn new(
        source: impl Into<Value>,
        fetcher: &'a dyn ContentFetcher,
        matcher: &'a dyn VersionMatcher,
    ) -> Self {
        Self {
            source: source.into(),
            root: None,
            packages: HashMap::new(),
            resolved: HashMap::new(),
            fetcher,
            matcher,
        }
    }

    pub fn source(&self) -> &Value {
        &self.source
    }

    /// Patches for `name` at `version`, in patch-set order, without
    /// content duplicates.
    ///
    /// `version` should already be normalized; it is matched against the
    /// constraint keys as is. Results are memoized per (name, version).
    pub fn get_patches(&mut self, name: &str, version: &str) -> Result<&[Patch], ResolveError> {
        if self.root.is_none() {
            let root = self.read(&self.source, ROOT)?;
            self.root = Some(root);
        }

        if !self.packages.contains_key(name) {
            let empty = Map::new();
            let root = self.root.as_ref().unwrap_or(&empty);
            let entries = self.lookup(root, name)?;
            self.packages.insert(name.to_string(), entries);
        }

        let cached = self
            .resolved
            .get(name)
            .is_some_and(|versions| versions.contains_key(version));
        if cached {
            debug!(package = name, version, "patch list cache hit");
        } else {
            let patches = match self.packages.get(name) {
                Some(entries) => {
                    let raw = self.collect(name, version, entries)?;
                    self.instantiate(raw)?
                }
                None => Vec::new(),
            };
            debug!(package = name, version, count = patches.len(), "resolved patches");
            self.resolved
                .entry(name.to_string())
                .or_default()
                .insert(version.to_string(), patches);
        }

        Ok(self
            .resolved
            .get(name)
            .and_then(|versions| versions.get(version))
            .map(Vec::as_slice)
            .unwrap_or(&[]))
    }

    /// Dereference `data` into a map, fetching it when it is a URL.
    fn read(&self, data: &Value, location: &str) -> Result<Map<String, Value>, ResolveError> {
        match classify(data, None, location)? {
            Node::Reference(url) | Node::Alias(url) => {
                debug!(url, location, "fetching patch set document");
                let document = self.fetcher.get_json(url)?;
                flatten(&document, location)
            }
            Node::Leaf(map) => Ok(map.clone()),
            Node::Container(map) => Ok(map.into_owned()),
        }
    }

    /// Read the entry `key` of `map`, following one level of aliasing.
    /// A missing key resolves to an empty map.
    fn lookup(
        &self,
        map: &Map<String, Value>,
        key: &str,
    ) -> Result<Map<String, Value>, ResolveError> {
        let Some(value) = map.get(key) else {
            return Ok(Map::new());
        };

        match classify(value, Some(map), key)? {
            Node::Alias(alias) => {
                debug!(key, alias, "following alias");
                let target = map.get(alias).unwrap_or(value);
                self.read(target, alias)
            }
            _ => self.read(value, key),
        }
    }

    /// Collect the raw descriptors that apply to `version`.
    fn collect(
        &self,
        name: &str,
        version: &str,
        entries: &Map<String, Value>,
    ) -> Result<Vec<PatchDescriptor>, ResolveError> {
        if is_patch(entries) {
            return Ok(vec![descriptor(entries, name)?]);
        }

        let mut raw = Vec::new();
        let mut has_constraints: Option<bool> = None;

        for (key, value) in entries {
            let location = format!("{name}.{key}");
            let node = classify(value, None, &location)?;
            let is_constraint = !matches!(node, Node::Leaf(_));

            match has_constraints {
                Some(previous) if previous != is_constraint => {
                    return Err(ResolveError::MixedConstraints {
                        package: name.to_string(),
                    });
                }
                Some(_) => {}
                None => has_constraints = Some(is_constraint),
            }

            if let Node::Leaf(map) = node {
                raw.push(descriptor(map, &location)?);
                continue;
            }

            let members = self.read(value, &location)?;
            let constraint = self.matcher.parse_constraint(key)?;
            if !constraint.matches(version)? {
                debug!(package = name, constraint = key.as_str(), version, "constraint does not match");
                continue;
            }

            for (index, member) in &members {
                match member {
                    Value::Object(map) if is_patch(map) => {
                        raw.push(descriptor(map, &format!("{location}[{index}]"))?);
                    }
                    _ => {
                        return Err(ResolveError::InvalidPatchEntry {
                            package: name.to_string(),
                            constraint: key.clone(),
                            index: index.clone(),
                        });
                    }
                }
            }
        }

        Ok(raw)
    }

    /// Fetch every descriptor, dropping later duplicates of the same content.
    fn instantiate(&self, raw: Vec<PatchDescriptor>) -> Result<Vec<Patch>, ResolveError> {
        let mut seen = HashSet::new();
        let mut patches = Vec::with_capacity(raw.len());

        for descriptor in raw {
            let patch = Patch::new(descriptor, self.fetcher)?;
            if seen.insert(patch.checksum().to_string()) {
                patches.push(patch);
            } else {
                debug!(checksum = patch.checksum(), url = patch.url(), "dropping duplicate patch");
            }
        }

        Ok(patches)
    }
}

fn descriptor(map: &Map<String, Value>, location: &str) -> Result<PatchDescriptor, ResolveError> {
    PatchDescriptor::from_map(map).map_err(|source| ResolveError::Descriptor {
        location: location.to_string(),
        source,
    })
}
