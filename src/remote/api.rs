//! Contract with the build-orchestration server.
//!
//! The pipeline only ever talks to the server through [`ServerFacade`]; the
//! concrete transport lives in [`crate::remote::client`] and tests substitute
//! scripted fakes.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque server identifier of one build configuration, internal form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigurationId(pub String);

impl ConfigurationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Internal ids are server-generated and shaped like `bt<digits>`.
    /// External ids are human-assigned and can be anything else.
    pub fn looks_internal(id: &str) -> bool {
        id.strip_prefix("bt")
            .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
    }
}

impl fmt::Display for ConfigurationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConfigurationId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Server-assigned handle of one uploaded patch plus metadata. The join key
/// the polling loop uses to find this run among all personal changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeListId(pub i64);

impl fmt::Display for ChangeListId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One build configuration as reported by the server registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfiguration {
    pub internal_id: ConfigurationId,
    pub external_id: String,
    pub project_id: String,
    pub project_external_id: String,
}

/// One enqueue request; a batch of these is submitted atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRequest {
    pub configuration: ConfigurationId,
    pub change_list: ChangeListId,
    pub check_for_changes_early: bool,
    pub force_clean_checkout: bool,
}

/// Metadata sent alongside the patch stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchMetadata {
    pub submitter: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    /// Whether the change should be committed automatically when the
    /// personal build succeeds.
    pub commit_on_success: bool,
}

/// Per-configuration verdict of one schedule batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleOutcome {
    pub scheduled: BTreeSet<ConfigurationId>,
    pub failures: BTreeMap<ConfigurationId, String>,
}

impl ScheduleOutcome {
    pub fn all_scheduled(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Build status of a personal change as seen in the server summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl ChangeStatus {
    pub fn describe(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }
}

/// The server's verdict on whether the change may be committed, distinct
/// from build pass/fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitDecision {
    Pending,
    Commit,
    DoNotCommit,
}

/// One personal change in the user's status summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryEntry {
    pub change_list: ChangeListId,
    pub status: ChangeStatus,
    pub commit: CommitDecision,
}

/// Transport-level failures. The pipeline wraps these into
/// [`crate::core::errors::RunError`] variants; it never retries them.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("cannot connect to \"{address}\"")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("authentication failed for user \"{user}\": {reason}")]
    Auth { user: String, reason: String },

    #[error("i/o failure talking to the server")]
    Io(#[from] io::Error),

    #[error("malformed server response")]
    Decode(#[from] serde_json::Error),

    #[error("server error: {0}")]
    Server(String),
}

/// Everything the pipeline needs from the server. One blocking call at a
/// time; implementations may use interior mutability for the connection.
pub trait ServerFacade {
    /// Full configuration registry, used to build the external-to-internal
    /// id catalog once per run.
    fn list_configurations(&self) -> Result<Vec<BuildConfiguration>, TransportError>;

    /// Configurations whose checkout rules cover the given repository paths.
    fn applicable_configurations(
        &self,
        touched_paths: &BTreeSet<String>,
    ) -> Result<BTreeSet<ConfigurationId>, TransportError>;

    /// Uploads the patch file, returning the server-side changelist handle.
    fn upload_patch(
        &self,
        patch: &Path,
        metadata: &PatchMetadata,
    ) -> Result<ChangeListId, TransportError>;

    /// Submits the whole batch in one call; the server reports success or
    /// failure per configuration.
    fn schedule_builds(&self, batch: &[BuildRequest]) -> Result<ScheduleOutcome, TransportError>;

    /// Personal-change summary for the given user.
    fn fetch_summary(&self, user: &str) -> Result<Vec<SummaryEntry>, TransportError>;
}
