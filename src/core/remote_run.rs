//! The personal-build run: collect, map, assemble, upload, schedule, poll.
//!
//! One run is a single sequence of blocking calls; the only deliberate
//! delay is the poll sleep, which the cancel token can interrupt. Nothing
//! here retries a failed network call.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::Utc;
use owo_colors::OwoColorize;
use tracing::{debug, info};

use crate::cli::AppContext;
use crate::core::changeset::ChangeSet;
use crate::core::collect::Collector;
use crate::core::errors::RunError;
use crate::core::matcher::ConfigurationMatcher;
use crate::core::patch::{self, PatchSummary};
use crate::core::workspace::Workspace;
use crate::infra::cancel::CancelToken;
use crate::remote::api::{
    BuildRequest, ChangeListId, ConfigurationId, PatchMetadata, ServerFacade,
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Everything one run needs to know, resolved from CLI flags and config.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Change description; required by the server.
    pub description: String,
    /// Requested configuration ids (internal or external form).
    pub configurations: Vec<String>,
    /// Project filter, mutually exclusive with `configurations`.
    pub project: Option<String>,
    /// Intersect the request with the server's applicability verdict.
    pub force_compatibility_check: bool,
    pub check_for_changes_early: bool,
    pub force_clean_checkout: bool,
    /// Commit the change automatically when the build succeeds.
    pub commit_on_success: bool,
    /// Schedule and return without polling.
    pub no_wait: bool,
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// Retain the temporary patch artifact for debugging.
    pub keep_patch: bool,
    /// Overriding mapping rule-file; short-circuits the scope chain.
    pub mapping_file: Option<PathBuf>,
    /// Trailing path specifications (`@listfile` included).
    pub paths: Vec<String>,
    /// Base directory path specifications resolve against.
    pub base: PathBuf,
}

impl RunOptions {
    pub fn new(description: impl Into<String>, base: impl Into<PathBuf>) -> Self {
        Self {
            description: description.into(),
            configurations: Vec::new(),
            project: None,
            force_compatibility_check: false,
            check_for_changes_early: false,
            force_clean_checkout: false,
            commit_on_success: false,
            no_wait: false,
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            keep_patch: false,
            mapping_file: None,
            paths: Vec::new(),
            base: base.into(),
        }
    }
}

/// Terminal result of a successful run.
#[derive(Debug)]
pub struct RunOutcome {
    pub change_list: ChangeListId,
    pub scheduled: BTreeSet<ConfigurationId>,
    pub patch: PatchSummary,
    /// False when `--no-wait` skipped the polling phase.
    pub waited: bool,
    pub retained_patch: Option<PathBuf>,
}

/// The run state machine, generic over the server facade so tests can
/// script the remote side.
pub struct RemoteRun<'a, S: ServerFacade + ?Sized> {
    server: &'a S,
    user: String,
    cancel: CancelToken,
}

impl<'a, S: ServerFacade + ?Sized> RemoteRun<'a, S> {
    pub fn new(server: &'a S, user: impl Into<String>, cancel: CancelToken) -> Self {
        Self {
            server,
            user: user.into(),
            cancel,
        }
    }

    /// Drives the run to a terminal state. `stdin` carries piped path
    /// specifications, consulted only when `opts.paths` is empty.
    pub fn execute(
        &self,
        opts: &RunOptions,
        stdin: Option<&str>,
        ctx: &AppContext,
    ) -> Result<RunOutcome, RunError> {
        // Collecting
        let collector = Collector::new(&opts.base);
        let files = collector.collect(&opts.paths, stdin)?;
        self.progress(ctx, &format!("collected {} file(s)", files.len()));
        self.checkpoint()?;

        // Mapping
        let mut workspace = Workspace::new(opts.mapping_file.as_deref())?;
        let change_set = ChangeSet::resolve(&mut workspace, &files)?;
        self.progress(
            ctx,
            &format!("mapped {} of {} file(s)", change_set.len(), files.len()),
        );
        self.checkpoint()?;

        // PatchBuilding
        let (artifact, patch_summary) = patch::assemble_to_temp(&change_set)?;
        self.progress(ctx, &patch_summary.describe());
        self.checkpoint()?;

        // Configuration selection
        let matcher = ConfigurationMatcher::new(self.server);
        let requested = matcher.requested(&opts.configurations, opts.project.as_deref())?;
        let selected = matcher.applicable(
            &requested,
            &change_set.touched_paths(),
            opts.force_compatibility_check,
        )?;
        self.progress(
            ctx,
            &format!("running on {} configuration(s)", selected.len()),
        );
        self.checkpoint()?;

        // Uploading; the artifact is disposed of on every path, retained
        // only on explicit request.
        let metadata = PatchMetadata {
            submitter: self.user.clone(),
            description: opts.description.clone(),
            created_at: Utc::now(),
            commit_on_success: opts.commit_on_success,
        };
        let uploaded = self.server.upload_patch(artifact.path(), &metadata);
        let retained_patch = patch::dispose_artifact(artifact, opts.keep_patch);
        if let Some(kept) = &retained_patch {
            info!(patch = %kept.display(), "patch artifact retained");
        }
        let change_list = uploaded.map_err(RunError::Upload)?;
        self.progress(ctx, &format!("created change {change_list}"));
        self.checkpoint()?;

        // Scheduling: one atomic batch; per-configuration failures fail the
        // run but already-accepted configurations stay scheduled.
        let batch: Vec<BuildRequest> = selected
            .iter()
            .map(|configuration| BuildRequest {
                configuration: configuration.clone(),
                change_list,
                check_for_changes_early: opts.check_for_changes_early,
                force_clean_checkout: opts.force_clean_checkout,
            })
            .collect();
        debug!(batch = batch.len(), change = %change_list, "scheduling personal build");
        let outcome = self.server.schedule_builds(&batch)?;
        if !outcome.all_scheduled() {
            return Err(RunError::Schedule {
                failures: outcome.failures.into_iter().collect(),
            });
        }
        self.progress(ctx, &format!("scheduled {} build(s)", outcome.scheduled.len()));

        let mut result = RunOutcome {
            change_list,
            scheduled: outcome.scheduled,
            patch: patch_summary,
            waited: false,
            retained_patch,
        };

        if opts.no_wait {
            return Ok(result);
        }

        // Polling
        self.wait_for_verdict(change_list, opts, ctx)?;
        result.waited = true;
        Ok(result)
    }

    /// Polls the personal-change summary until a terminal state, the
    /// timeout, or a client-side cancel.
    fn wait_for_verdict(
        &self,
        change_list: ChangeListId,
        opts: &RunOptions,
        ctx: &AppContext,
    ) -> Result<(), RunError> {
        use crate::remote::api::{ChangeStatus, CommitDecision};

        let started = Instant::now();
        let mut last_status = None;
        loop {
            self.checkpoint()?;

            let entries = self.server.fetch_summary(&self.user)?;
            if let Some(entry) = entries.iter().find(|e| e.change_list == change_list) {
                if last_status != Some(entry.status) {
                    last_status = Some(entry.status);
                    self.progress(ctx, &format!("build {}", entry.status.describe()));
                }

                match entry.status {
                    ChangeStatus::Failed => {
                        return Err(RunError::BuildFailed {
                            change_list,
                            status: entry.status.describe().to_owned(),
                        });
                    }
                    ChangeStatus::Canceled => {
                        return Err(RunError::BuildCanceled { change_list });
                    }
                    _ => match entry.commit {
                        CommitDecision::Commit => return Ok(()),
                        CommitDecision::DoNotCommit => {
                            return Err(RunError::BuildRejected { change_list });
                        }
                        CommitDecision::Pending => {}
                    },
                }
            } else {
                debug!(change = %change_list, "change not yet visible in summary");
            }

            if started.elapsed() >= opts.timeout {
                return Err(RunError::Timeout {
                    change_list,
                    bound: opts.timeout,
                });
            }
            if self.cancel.sleep(opts.poll_interval) {
                return Err(RunError::CanceledByUser);
            }
        }
    }

    fn checkpoint(&self) -> Result<(), RunError> {
        if self.cancel.is_canceled() {
            Err(RunError::CanceledByUser)
        } else {
            Ok(())
        }
    }

    fn progress(&self, ctx: &AppContext, message: &str) {
        info!("{message}");
        if !ctx.quiet {
            if ctx.no_color {
                println!("{message}");
            } else {
                println!("{}", message.dimmed());
            }
        }
    }
}
