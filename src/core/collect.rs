//! Path-specification expansion into a deduplicated, filtered, ordered set
//! of candidate local files.
//!
//! A specification is a concrete file, a directory (expanded recursively),
//! a glob pattern containing `*` or `!`, or `@listfile` whose lines are
//! themselves specifications (one level of indirection only). A path that
//! does not exist and is not a pattern is kept as-is: it represents a
//! locally deleted file.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use globset::GlobBuilder;
use ignore::WalkBuilder;
use tracing::debug;

use crate::core::errors::RunError;
use crate::core::mapper::{RULE_FILE_NAME, canonicalize_allowing_missing, normalize};

/// Expands CLI path specifications against a base directory (normally the
/// process working directory; injectable for tests).
pub struct Collector {
    base: PathBuf,
}

impl Collector {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Collects candidate files. When `specs` is empty the lines of `stdin`
    /// are used instead; when that is also empty, everything under the base
    /// directory is taken. Fails with [`RunError::NoFilesCollected`] when
    /// the final set is empty.
    ///
    /// The result is deduplicated by canonical path and sorted
    /// lexicographically, so downstream patch assembly is reproducible.
    pub fn collect(&self, specs: &[String], stdin: Option<&str>) -> Result<Vec<PathBuf>, RunError> {
        let mut effective: Vec<String> = specs
            .iter()
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();

        if effective.is_empty()
            && let Some(input) = stdin
        {
            effective = input
                .lines()
                .map(|l| l.trim().to_owned())
                .filter(|l| !l.is_empty())
                .collect();
            if !effective.is_empty() {
                debug!(specs = effective.len(), "read path specifications from stdin");
            }
        }
        if effective.is_empty() {
            debug!(base = %self.base.display(), "no specifications; using base directory");
            effective.push(".".to_owned());
        }

        let mut out = BTreeSet::new();
        for spec in &effective {
            if let Some(list) = spec.strip_prefix('@') {
                self.expand_list_file(Path::new(list), &mut out)?;
            } else {
                self.expand_spec(spec, &mut out)?;
            }
        }

        if out.is_empty() {
            return Err(RunError::NoFilesCollected);
        }
        Ok(out.into_iter().collect())
    }

    /// One level of list-file indirection: each line is a specification,
    /// but may not be another list-file.
    fn expand_list_file(&self, list: &Path, out: &mut BTreeSet<PathBuf>) -> Result<(), RunError> {
        let list_path = self.anchored(list);
        let contents = fs::read_to_string(&list_path).map_err(|source| RunError::InvalidPath {
            path: list_path.clone(),
            source,
        })?;
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with('@') {
                return Err(RunError::NestedListFile {
                    list: list_path,
                    entry: line.to_owned(),
                });
            }
            self.expand_spec(line, out)?;
        }
        Ok(())
    }

    fn expand_spec(&self, spec: &str, out: &mut BTreeSet<PathBuf>) -> Result<(), RunError> {
        if has_pattern(spec) {
            return self.expand_pattern(spec, out);
        }

        let path = self.anchored(Path::new(spec));
        if path.is_dir() {
            for file in self.walk_files(&path) {
                self.admit(&file, out)?;
            }
        } else {
            // Existing file, or a path that no longer exists on disk; the
            // latter becomes a Deleted patch entry downstream.
            self.admit(&path, out)?;
        }
        Ok(())
    }

    /// Glob expansion over the base directory, matched against the path
    /// relative to the base.
    fn expand_pattern(&self, pattern: &str, out: &mut BTreeSet<PathBuf>) -> Result<(), RunError> {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(false)
            .build()
            .map_err(|err| RunError::InvalidPath {
                path: PathBuf::from(pattern),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, err),
            })?
            .compile_matcher();

        for file in self.walk_files(&self.base) {
            let relative = file.strip_prefix(&self.base).unwrap_or(&file);
            if glob.is_match(relative) {
                self.admit(&file, out)?;
            }
        }
        Ok(())
    }

    /// All regular files under `root`. Standard ignore filters are off:
    /// this collector must see every file, tracked or not.
    fn walk_files(&self, root: &Path) -> Vec<PathBuf> {
        WalkBuilder::new(root)
            .standard_filters(false)
            .hidden(false)
            .build()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .map(|entry| entry.into_path())
            .collect()
    }

    /// Canonicalizes and applies the exclusion filters before admitting a
    /// candidate into the result set.
    fn admit(&self, path: &Path, out: &mut BTreeSet<PathBuf>) -> Result<(), RunError> {
        let canonical =
            canonicalize_allowing_missing(path).map_err(|source| RunError::InvalidPath {
                path: path.to_path_buf(),
                source,
            })?;
        if is_excluded(&canonical) {
            debug!(file = %canonical.display(), "excluded version-control/admin file");
            return Ok(());
        }
        out.insert(canonical);
        Ok(())
    }

    fn anchored(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base.join(path)
        }
    }
}

fn has_pattern(spec: &str) -> bool {
    spec.contains('*') || spec.contains('!')
}

/// Version-control metadata (`CVS/` bookkeeping, anything under `.svn`) and
/// the mapping rule-file itself never travel in a patch.
fn is_excluded(path: &Path) -> bool {
    if path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.eq_ignore_ascii_case(RULE_FILE_NAME))
    {
        return true;
    }
    let normal = normalize(path).to_ascii_lowercase();
    normal.contains("/.svn/")
        || normal.ends_with("/.svn")
        || normal.ends_with("cvs/entries")
        || normal.ends_with("cvs/repository")
        || normal.ends_with("cvs/root")
}
