//! Error taxonomy for the personal-build pipeline.
//!
//! Every stage-local failure aborts the run. Network operations are never
//! retried automatically; the polling loop is a designed repeat, not a
//! retry-on-error.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crate::remote::api::{ChangeListId, ConfigurationId, TransportError};

/// Terminal failure of one personal-build run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// A local path could not be canonicalized (broken symlink, missing
    /// parent directory, permission failure).
    #[error("cannot resolve local path \"{path}\"")]
    InvalidPath {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A rule-file that the run needed was missing, unreadable, or
    /// malformed. Never silently ignored.
    #[error(transparent)]
    Rules(#[from] RuleError),

    /// The path specifications expanded to nothing.
    #[error("no files collected for the personal build")]
    NoFilesCollected,

    /// A `@listfile` entry itself pointed at another list-file; only one
    /// level of indirection is supported.
    #[error("list-file \"{list}\" refers to another list-file \"{entry}\"")]
    NestedListFile { list: PathBuf, entry: String },

    /// Files were collected but none of them resolved to a repository path.
    #[error("none of the {collected} collected file(s) map to a repository path")]
    NoMappableResources { collected: usize },

    /// Reading local content or writing the patch sink failed.
    #[error("patch assembly failed")]
    PatchIo(#[source] io::Error),

    /// The requested/applicable configuration intersection came up empty.
    #[error("no applicable build configurations for [{}]", requested.join(", "))]
    NoApplicableConfigurations { requested: Vec<String> },

    /// Patch upload failed; the run is aborted, nothing was scheduled.
    #[error("patch upload failed")]
    Upload(#[source] TransportError),

    /// Any other server call failed (configuration listing, compatibility
    /// query, status summary).
    #[error("server request failed")]
    Remote(#[from] TransportError),

    /// The server rejected one or more configurations in the schedule
    /// batch. Configurations that were accepted stay scheduled.
    #[error("scheduling failed for {} configuration(s): {}", failures.len(), format_failures(failures))]
    Schedule {
        failures: Vec<(ConfigurationId, String)>,
    },

    /// The server reported the personal build as failed.
    #[error("personal build for change {change_list} failed (server status: {status})")]
    BuildFailed {
        change_list: ChangeListId,
        status: String,
    },

    /// The server canceled the personal build.
    #[error("personal build for change {change_list} was canceled on the server")]
    BuildCanceled { change_list: ChangeListId },

    /// The build succeeded but the server decided the change must not be
    /// committed. Distinct from a build failure.
    #[error("personal build for change {change_list} succeeded but the change was rejected for commit")]
    BuildRejected { change_list: ChangeListId },

    /// No terminal state was observed within the polling bound.
    #[error("timed out after {:?} waiting for change {change_list}", bound)]
    Timeout {
        change_list: ChangeListId,
        bound: Duration,
    },

    /// The user interrupted the run on the client side.
    #[error("canceled by user")]
    CanceledByUser,
}

/// Rule-file loading failures. A malformed rule-file is always fatal to the
/// run that consulted it; there is no partial loading.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("cannot read rule-file \"{file}\"")]
    Unreadable {
        file: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("rule-file \"{file}\" is empty")]
    Empty { file: PathBuf },

    #[error("rule-file \"{file}\" line {line}: expected \"path=repositoryPrefix\"")]
    Malformed { file: PathBuf, line: usize },

    #[error("rule-file \"{file}\" line {line}: scope root \"{root}\" cannot be resolved")]
    BadScopeRoot {
        file: PathBuf,
        line: usize,
        root: String,
        #[source]
        source: io::Error,
    },
}

fn format_failures(failures: &[(ConfigurationId, String)]) -> String {
    failures
        .iter()
        .map(|(id, reason)| format!("{id}: {reason}"))
        .collect::<Vec<_>>()
        .join("; ")
}
