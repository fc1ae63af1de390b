//! The mapping scope chain: overriding matcher, nearest per-directory
//! rule-file, global rule-file.
//!
//! Exactly one scope is consulted per file. When a per-directory rule-file
//! exists but none of its rules cover the file, the file stays unmapped;
//! there is no fall-through to the global file and no merging of scopes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::core::errors::RunError;
use crate::core::mapper::{
    MappingResult, RULE_FILE_NAME, RuleFile, canonicalize_allowing_missing,
};

/// Environment variable overriding the global rule-file location.
pub const GLOBAL_MAPPINGS_ENV: &str = "PREFLIGHT_MAPPINGS";

/// Default user-level location of the global rule-file.
pub const GLOBAL_MAPPINGS_PATH: &str = "~/.preflight/mappings";

/// Hierarchical local-to-repository resolver with a per-directory cache of
/// governing rule-files, so repeated files in one directory avoid
/// re-walking the hierarchy.
pub struct Workspace {
    overriding: Option<Arc<RuleFile>>,
    global: Option<Arc<RuleFile>>,
    /// Directory -> governing rule-file (`None` = nothing found upward).
    dir_cache: HashMap<PathBuf, Option<Arc<RuleFile>>>,
}

impl Workspace {
    /// Builds the scope chain. Both the overriding file (if given) and an
    /// existing global file are loaded eagerly; a malformed one is fatal.
    pub fn new(overriding: Option<&Path>) -> Result<Self, RunError> {
        let overriding = match overriding {
            Some(path) => Some(Arc::new(RuleFile::load(path)?)),
            None => None,
        };
        let global = match global_mappings_location() {
            Some(path) if path.exists() => {
                debug!(file = %path.display(), "loading global rule-file");
                Some(Arc::new(RuleFile::load(&path)?))
            }
            _ => None,
        };
        Ok(Self {
            overriding,
            global,
            dir_cache: HashMap::new(),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_scopes(
        overriding: Option<RuleFile>,
        global: Option<RuleFile>,
    ) -> Self {
        Self {
            overriding: overriding.map(Arc::new),
            global: global.map(Arc::new),
            dir_cache: HashMap::new(),
        }
    }

    /// Resolves one local file to its repository path, or `None` when the
    /// consulted scope has no rule for it.
    pub fn resolve(&mut self, file: &Path) -> Result<Option<MappingResult>, RunError> {
        let canonical =
            canonicalize_allowing_missing(file).map_err(|source| RunError::InvalidPath {
                path: file.to_path_buf(),
                source,
            })?;

        let matcher = if let Some(overriding) = &self.overriding {
            Some(Arc::clone(overriding))
        } else if let Some(per_dir) = self.nearest_rule_file(&canonical)? {
            Some(per_dir)
        } else {
            self.global.as_ref().map(Arc::clone)
        };

        let Some(matcher) = matcher else {
            debug!(file = %canonical.display(), "no mapping scope found");
            return Ok(None);
        };

        let hit = matcher.matching(&canonical);
        if hit.is_none() {
            debug!(
                file = %canonical.display(),
                rules = %matcher.origin().display(),
                "scope consulted but no rule matched"
            );
        }
        Ok(hit)
    }

    /// Walks from the file's parent directory upward to the filesystem
    /// root, stopping at the first directory containing a rule-file.
    /// Every visited directory is cached, hits and misses alike.
    fn nearest_rule_file(&mut self, canonical: &Path) -> Result<Option<Arc<RuleFile>>, RunError> {
        let mut visited = Vec::new();
        let mut found: Option<Arc<RuleFile>> = None;

        let mut dir = canonical.parent();
        while let Some(current) = dir {
            if let Some(cached) = self.dir_cache.get(current) {
                found = cached.clone();
                break;
            }
            let candidate = current.join(RULE_FILE_NAME);
            visited.push(current.to_path_buf());
            if candidate.is_file() {
                found = Some(Arc::new(RuleFile::load(&candidate)?));
                break;
            }
            dir = current.parent();
        }

        for dir in visited {
            self.dir_cache.insert(dir, found.clone());
        }
        Ok(found)
    }
}

/// Location of the global rule-file: environment override first, then the
/// fixed user-level default.
fn global_mappings_location() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(GLOBAL_MAPPINGS_ENV)
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }
    let expanded = shellexpand::tilde(GLOBAL_MAPPINGS_PATH);
    Some(PathBuf::from(expanded.into_owned()))
}
