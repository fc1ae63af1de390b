//! Rule-file parsing and longest-prefix path matching.
//!
//! A rule-file maps local directory scopes to repository path prefixes, one
//! `scopeRoot=repositoryPrefix` rule per line. `.` denotes the rule-file's
//! own directory; relative scope roots are anchored to it as well. Matching
//! is longest-scope-root-wins over the canonical, forward-slash-normalized
//! absolute path of the file.
//!
//! Normalization policy (applied uniformly): forward slashes, surrounding
//! whitespace and trailing slashes trimmed, case-sensitive comparison.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::core::errors::RuleError;

/// File name of a per-directory rule-file.
pub const RULE_FILE_NAME: &str = ".preflight-mappings";

/// One `scopeRoot=repositoryPrefix` rule, scope root already canonical.
#[derive(Debug, Clone)]
struct MappingRule {
    /// Normalized absolute path of the scope root.
    scope_root: String,
    /// Repository prefix, trailing slashes stripped.
    prefix: String,
}

/// The repository path a local file resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingResult {
    pub repository_path: String,
}

/// A parsed rule-file. Loading is all-or-nothing: any malformed line fails
/// the whole file.
#[derive(Debug)]
pub struct RuleFile {
    origin: PathBuf,
    /// Sorted by scope-root length, longest first, so the first prefix hit
    /// is the longest match. Scope roots are unique within one file.
    rules: Vec<MappingRule>,
}

impl RuleFile {
    pub fn load(path: &Path) -> Result<Self, RuleError> {
        let origin = path.to_path_buf();
        let text = fs::read_to_string(path).map_err(|source| RuleError::Unreadable {
            file: origin.clone(),
            source,
        })?;

        let anchor = origin.parent().map(Path::to_path_buf).unwrap_or_default();

        let mut rules = Vec::new();
        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((scope, prefix)) = line.split_once('=') else {
                return Err(RuleError::Malformed {
                    file: origin.clone(),
                    line: line_no,
                });
            };
            let scope = scope.trim();
            let prefix = prefix.trim().trim_end_matches('/');
            if scope.is_empty() || prefix.is_empty() {
                return Err(RuleError::Malformed {
                    file: origin.clone(),
                    line: line_no,
                });
            }

            // Relative scope roots (including ".") anchor to the rule-file's
            // own directory, never to the process working directory.
            let scope_path = Path::new(scope);
            let absolute = if scope_path.is_absolute() {
                scope_path.to_path_buf()
            } else {
                anchor.join(scope_path)
            };
            // A scope root that no longer exists stays in the file and simply
            // never matches anything.
            let canonical = match dunce::canonicalize(&absolute) {
                Ok(path) => path,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    debug!(file = %origin.display(), root = scope, "scope root missing on disk");
                    absolute
                }
                Err(source) => {
                    return Err(RuleError::BadScopeRoot {
                        file: origin.clone(),
                        line: line_no,
                        root: scope.to_owned(),
                        source,
                    });
                }
            };

            rules.push(MappingRule {
                scope_root: normalize(&canonical),
                prefix: prefix.to_owned(),
            });
        }

        if rules.is_empty() {
            return Err(RuleError::Empty { file: origin });
        }

        // Longest scope root first; ties impossible, roots are unique keys.
        rules.sort_by(|a, b| {
            b.scope_root
                .len()
                .cmp(&a.scope_root.len())
                .then_with(|| a.scope_root.cmp(&b.scope_root))
        });

        debug!(file = %origin.display(), rules = rules.len(), "loaded rule-file");
        Ok(Self { origin, rules })
    }

    /// Resolves a canonical absolute local path against this file's rules.
    /// Returns `None` when no scope root encloses the file.
    pub fn matching(&self, canonical_local: &Path) -> Option<MappingResult> {
        let file = normalize(canonical_local);
        for rule in &self.rules {
            let relative = if file == rule.scope_root {
                Some("")
            } else {
                file.strip_prefix(&rule.scope_root)
                    .and_then(|rest| rest.strip_prefix('/'))
            };
            if let Some(relative) = relative {
                let repository_path = if relative.is_empty() {
                    rule.prefix.clone()
                } else {
                    format!("{}/{}", rule.prefix, relative)
                };
                return Some(MappingResult { repository_path });
            }
        }
        None
    }

    pub fn origin(&self) -> &Path {
        &self.origin
    }
}

/// Normalizes a path for rule matching: forward slashes only, whitespace
/// and trailing slashes trimmed. Comparison stays case-sensitive.
pub fn normalize(path: &Path) -> String {
    let text = path.to_string_lossy().replace('\\', "/");
    let trimmed = text.trim();
    let stripped = trimmed.trim_end_matches('/');
    if stripped.is_empty() {
        // The filesystem root itself.
        "/".to_owned()
    } else {
        stripped.to_owned()
    }
}

/// Canonicalizes a path, tolerating a missing final component: a file that
/// was deleted locally must still resolve so it can become a `Deleted`
/// patch entry. Fails when the parent directory cannot be resolved.
pub fn canonicalize_allowing_missing(path: &Path) -> io::Result<PathBuf> {
    match dunce::canonicalize(path) {
        Ok(resolved) => Ok(resolved),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
            let name = path
                .file_name()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "path has no file name"))?;
            match parent {
                Some(parent) => Ok(dunce::canonicalize(parent)?.join(name)),
                None => Ok(dunce::canonicalize(Path::new("."))?.join(name)),
            }
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn rule_file(dir: &Path, contents: &str) -> PathBuf {
        let path = dir.join(RULE_FILE_NAME);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn maps_file_under_dot_scope() {
        let tmp = TempDir::new().unwrap();
        let path = rule_file(tmp.path(), ".=//depo/test/\n");
        fs::write(tmp.path().join("1.java"), "x").unwrap();

        let rules = RuleFile::load(&path).unwrap();
        let local = dunce::canonicalize(tmp.path().join("1.java")).unwrap();
        let hit = rules.matching(&local).unwrap();
        assert_eq!(hit.repository_path, "//depo/test/1.java");
    }

    #[test]
    fn longest_prefix_wins() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("a/b")).unwrap();
        fs::write(tmp.path().join("a/b/x.rs"), "x").unwrap();
        let path = rule_file(tmp.path(), "a=r1\na/b=r2\n");

        let rules = RuleFile::load(&path).unwrap();
        let local = dunce::canonicalize(tmp.path().join("a/b/x.rs")).unwrap();
        let hit = rules.matching(&local).unwrap();
        assert_eq!(hit.repository_path, "r2/x.rs");
    }

    #[test]
    fn prefix_trailing_slash_is_stripped() {
        let tmp = TempDir::new().unwrap();
        let path = rule_file(tmp.path(), ".=//root/sub///\n");
        fs::write(tmp.path().join("f"), "x").unwrap();

        let rules = RuleFile::load(&path).unwrap();
        let local = dunce::canonicalize(tmp.path().join("f")).unwrap();
        assert_eq!(
            rules.matching(&local).unwrap().repository_path,
            "//root/sub/f"
        );
    }

    #[test]
    fn sibling_directory_does_not_match() {
        let tmp = TempDir::new().unwrap();
        // "ab" must not match a scope root of "a" even though it shares the
        // string prefix.
        fs::create_dir_all(tmp.path().join("a")).unwrap();
        fs::create_dir_all(tmp.path().join("ab")).unwrap();
        fs::write(tmp.path().join("ab/f"), "x").unwrap();
        let path = rule_file(tmp.path(), "a=//r\n");

        let rules = RuleFile::load(&path).unwrap();
        let local = dunce::canonicalize(tmp.path().join("ab/f")).unwrap();
        assert!(rules.matching(&local).is_none());
    }

    #[test]
    fn missing_scope_root_loads_but_never_matches() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("f"), "x").unwrap();
        let path = rule_file(tmp.path(), "gone=//stale\n.=//live\n");

        let rules = RuleFile::load(&path).unwrap();
        let local = dunce::canonicalize(tmp.path().join("f")).unwrap();
        assert_eq!(rules.matching(&local).unwrap().repository_path, "//live/f");
    }

    #[test]
    fn malformed_line_fails_whole_file() {
        let tmp = TempDir::new().unwrap();
        let path = rule_file(tmp.path(), ".=//ok\nnot-a-rule\n");
        let err = RuleFile::load(&path).unwrap_err();
        assert!(matches!(err, RuleError::Malformed { line: 2, .. }));
    }

    #[test]
    fn empty_sides_are_malformed() {
        let tmp = TempDir::new().unwrap();
        let path = rule_file(tmp.path(), "=//prefix\n");
        assert!(matches!(
            RuleFile::load(&path).unwrap_err(),
            RuleError::Malformed { line: 1, .. }
        ));

        let path = rule_file(tmp.path(), ".=\n");
        assert!(matches!(
            RuleFile::load(&path).unwrap_err(),
            RuleError::Malformed { line: 1, .. }
        ));
    }

    #[test]
    fn empty_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = rule_file(tmp.path(), "\n# just a comment\n");
        assert!(matches!(
            RuleFile::load(&path).unwrap_err(),
            RuleError::Empty { .. }
        ));
    }

    #[test]
    fn relative_scope_anchors_to_rule_file_directory() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("sub/f.txt"), "x").unwrap();
        let path = rule_file(tmp.path(), "sub=//mapped\n");

        let rules = RuleFile::load(&path).unwrap();
        let local = dunce::canonicalize(tmp.path().join("sub/f.txt")).unwrap();
        assert_eq!(rules.matching(&local).unwrap().repository_path, "//mapped/f.txt");
    }

    #[test]
    fn round_trip_from_scope_root_and_suffix() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("src/deep")).unwrap();
        fs::write(tmp.path().join("src/deep/m.rs"), "x").unwrap();
        let path = rule_file(tmp.path(), ".=//depo/proj\n");

        let rules = RuleFile::load(&path).unwrap();
        let local = dunce::canonicalize(tmp.path().join("src/deep/m.rs")).unwrap();
        let mapped = rules.matching(&local).unwrap().repository_path;

        // Reconstruct the local path from the scope root plus the mapped
        // suffix; it must land on the same file.
        let suffix = mapped.strip_prefix("//depo/proj/").unwrap();
        let rebuilt = dunce::canonicalize(tmp.path().join(suffix)).unwrap();
        assert_eq!(rebuilt, local);
    }

    #[test]
    fn lenient_canonicalize_keeps_missing_leaf() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("gone.txt");
        let resolved = canonicalize_allowing_missing(&missing).unwrap();
        assert_eq!(
            resolved,
            dunce::canonicalize(tmp.path()).unwrap().join("gone.txt")
        );

        let hopeless = tmp.path().join("no-such-dir/gone.txt");
        assert!(canonicalize_allowing_missing(&hopeless).is_err());
    }
}
