//! Full personal-build pipeline against a scripted server.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, VecDeque};
use std::path::Path;
use std::time::Duration;

use assert_fs::prelude::*;

use preflight::cli::AppContext;
use preflight::core::mapper::RULE_FILE_NAME;
use preflight::core::patch::{read_patch, PatchEntry};
use preflight::core::remote_run::{RemoteRun, RunOptions};
use preflight::infra::cancel::CancelToken;
use preflight::remote::api::{
    BuildConfiguration, BuildRequest, ChangeListId, ChangeStatus, CommitDecision,
    ConfigurationId, PatchMetadata, ScheduleOutcome, ServerFacade, SummaryEntry,
    TransportError,
};

fn ctx() -> AppContext {
    AppContext {
        quiet: true,
        no_color: true,
    }
}

/// Scripted facade that captures the patch bytes it receives.
#[derive(Default)]
struct RecordingServer {
    patches: RefCell<Vec<Vec<u8>>>,
    summaries: RefCell<VecDeque<Vec<SummaryEntry>>>,
    polls: Cell<usize>,
}

impl ServerFacade for RecordingServer {
    fn list_configurations(&self) -> Result<Vec<BuildConfiguration>, TransportError> {
        Ok(Vec::new())
    }

    fn applicable_configurations(
        &self,
        _touched: &BTreeSet<String>,
    ) -> Result<BTreeSet<ConfigurationId>, TransportError> {
        Ok(BTreeSet::new())
    }

    fn upload_patch(
        &self,
        patch: &Path,
        _metadata: &PatchMetadata,
    ) -> Result<ChangeListId, TransportError> {
        let bytes = std::fs::read(patch)?;
        self.patches.borrow_mut().push(bytes);
        Ok(ChangeListId(99))
    }

    fn schedule_builds(&self, batch: &[BuildRequest]) -> Result<ScheduleOutcome, TransportError> {
        Ok(ScheduleOutcome {
            scheduled: batch.iter().map(|r| r.configuration.clone()).collect(),
            failures: Default::default(),
        })
    }

    fn fetch_summary(&self, _user: &str) -> Result<Vec<SummaryEntry>, TransportError> {
        self.polls.set(self.polls.get() + 1);
        Ok(self
            .summaries
            .borrow_mut()
            .pop_front()
            .unwrap_or_default())
    }
}

fn project() -> (assert_fs::TempDir, RunOptions) {
    let tmp = assert_fs::TempDir::new().unwrap();
    tmp.child(RULE_FILE_NAME).write_str(".=//depo/app\n").unwrap();
    tmp.child("src/lib.rs").write_str("pub fn v1() {}\n").unwrap();
    tmp.child("README.md").write_str("# app\n").unwrap();

    let mut opts = RunOptions::new("try my change", tmp.path());
    opts.configurations = vec!["bt1".to_owned()];
    opts.no_wait = true;
    opts.poll_interval = Duration::from_millis(1);
    (tmp, opts)
}

#[test]
fn uploaded_patch_decodes_to_the_collected_files() {
    let (_tmp, opts) = project();
    let server = RecordingServer::default();
    let run = RemoteRun::new(&server, "alice", CancelToken::new());
    run.execute(&opts, None, &ctx()).unwrap();

    let patches = server.patches.borrow();
    let entries = read_patch(patches[0].as_slice()).unwrap();
    let paths: Vec<&str> = entries
        .iter()
        .map(|e| match e {
            PatchEntry::Modified { repository_path, .. } => repository_path.as_str(),
            PatchEntry::Deleted { repository_path } => repository_path.as_str(),
        })
        .collect();
    // Rule-file itself is excluded from collection; order is by local path.
    assert_eq!(paths, vec!["//depo/app/README.md", "//depo/app/src/lib.rs"]);
    assert!(entries
        .iter()
        .all(|e| matches!(e, PatchEntry::Modified { .. })));
}

#[test]
fn identical_workspace_produces_identical_patch_bytes() {
    let (_tmp, opts) = project();
    let server = RecordingServer::default();
    let run = RemoteRun::new(&server, "alice", CancelToken::new());
    run.execute(&opts, None, &ctx()).unwrap();
    run.execute(&opts, None, &ctx()).unwrap();

    let patches = server.patches.borrow();
    assert_eq!(patches[0], patches[1]);
}

#[test]
fn file_deleted_after_collection_becomes_a_deletion_entry() {
    let tmp = assert_fs::TempDir::new().unwrap();
    tmp.child(RULE_FILE_NAME).write_str(".=//depo\n").unwrap();
    tmp.child("kept.txt").write_str("kept").unwrap();

    let mut opts = RunOptions::new("deletion", tmp.path());
    opts.configurations = vec!["bt1".to_owned()];
    opts.no_wait = true;
    // Named explicitly so collection does not need the file on disk.
    opts.paths = vec!["kept.txt".to_owned(), "gone.txt".to_owned()];

    let server = RecordingServer::default();
    let run = RemoteRun::new(&server, "alice", CancelToken::new());
    run.execute(&opts, None, &ctx()).unwrap();

    let patches = server.patches.borrow();
    let entries = read_patch(patches[0].as_slice()).unwrap();
    assert!(entries.contains(&PatchEntry::Deleted {
        repository_path: "//depo/gone.txt".to_owned(),
    }));
}

#[test]
fn waiting_run_reports_success_on_commit_decision() {
    let (_tmp, mut opts) = project();
    opts.no_wait = false;
    opts.timeout = Duration::from_secs(5);

    let server = RecordingServer::default();
    server.summaries.borrow_mut().push_back(vec![SummaryEntry {
        change_list: ChangeListId(99),
        status: ChangeStatus::Running,
        commit: CommitDecision::Pending,
    }]);
    server.summaries.borrow_mut().push_back(vec![SummaryEntry {
        change_list: ChangeListId(99),
        status: ChangeStatus::Succeeded,
        commit: CommitDecision::Commit,
    }]);

    let run = RemoteRun::new(&server, "alice", CancelToken::new());
    let outcome = run.execute(&opts, None, &ctx()).unwrap();
    assert!(outcome.waited);
    assert_eq!(server.polls.get(), 2);
}

#[test]
fn stdin_lines_feed_collection_when_no_paths_are_given() {
    let (tmp, mut opts) = project();
    opts.paths.clear();

    let server = RecordingServer::default();
    let run = RemoteRun::new(&server, "alice", CancelToken::new());
    run.execute(&opts, Some("README.md\n"), &ctx()).unwrap();

    let patches = server.patches.borrow();
    let entries = read_patch(patches[0].as_slice()).unwrap();
    assert_eq!(entries.len(), 1);
    drop(patches);
    drop(tmp);
}
