//! The set of (local file, repository path) pairs a run operates on.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::core::errors::RunError;
use crate::core::workspace::Workspace;

/// One mapped local file. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedResource {
    /// Canonical absolute local path.
    pub local: PathBuf,
    /// Forward-slash repository path the server understands.
    pub repository_path: String,
}

/// Resolved resources keyed by canonical local path; duplicates collapse
/// and iteration order is deterministic.
#[derive(Debug, Default)]
pub struct ChangeSet {
    resources: BTreeMap<PathBuf, ResolvedResource>,
}

impl ChangeSet {
    /// Maps every collected file through the workspace scope chain. Files
    /// that fail to map are logged and dropped; an empty result is a hard
    /// error, not a silent no-op.
    pub fn resolve(workspace: &mut Workspace, files: &[PathBuf]) -> Result<Self, RunError> {
        let mut resources = BTreeMap::new();
        for file in files {
            match workspace.resolve(file)? {
                Some(mapping) => {
                    debug!(file = %file.display(), repo = %mapping.repository_path, "mapped");
                    resources.insert(
                        file.clone(),
                        ResolvedResource {
                            local: file.clone(),
                            repository_path: mapping.repository_path,
                        },
                    );
                }
                None => {
                    warn!(file = %file.display(), "no repository mapping; dropped from the run");
                }
            }
        }

        if resources.is_empty() {
            return Err(RunError::NoMappableResources {
                collected: files.len(),
            });
        }
        Ok(Self { resources })
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Resources in lexicographic local-path order.
    pub fn iter(&self) -> impl Iterator<Item = &ResolvedResource> {
        self.resources.values()
    }

    /// The repository paths touched by this change, for the compatibility
    /// query.
    pub fn touched_paths(&self) -> BTreeSet<String> {
        self.resources
            .values()
            .map(|r| r.repository_path.clone())
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn from_resources(resources: Vec<ResolvedResource>) -> Self {
        Self {
            resources: resources
                .into_iter()
                .map(|r| (r.local.clone(), r))
                .collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a ResolvedResource;
    type IntoIter = std::collections::btree_map::Values<'a, PathBuf, ResolvedResource>;

    fn into_iter(self) -> Self::IntoIter {
        self.resources.values()
    }
}
