//! Smoke tests for the `pfl` binary surface.

use assert_cmd::Command;
use assert_fs::prelude::*;
use predicates::prelude::*;

#[test]
fn run_without_message_is_a_usage_error() {
    Command::cargo_bin("pfl")
        .unwrap()
        .args(["run", "src/lib.rs"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--message"));
}

#[test]
fn run_without_server_reports_missing_configuration() {
    let tmp = assert_fs::TempDir::new().unwrap();
    Command::cargo_bin("pfl")
        .unwrap()
        .current_dir(tmp.path())
        .env("HOME", tmp.path())
        .env_remove("PREFLIGHT_SERVER")
        .args(["run", "-m", "change", "--no-wait"])
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No server configured"));
}

#[test]
fn init_writes_a_config_file() {
    let tmp = assert_fs::TempDir::new().unwrap();
    Command::cargo_bin("pfl")
        .unwrap()
        .args(["init", tmp.path().to_str().unwrap()])
        .assert()
        .success();
    tmp.child("preflight.toml")
        .assert(predicate::str::contains("timeout_secs"));

    // Without --force a second init must refuse to overwrite.
    Command::cargo_bin("pfl")
        .unwrap()
        .args(["init", tmp.path().to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
}

#[test]
fn login_then_logout_round_trips_the_credential_store() {
    let tmp = assert_fs::TempDir::new().unwrap();

    Command::cargo_bin("pfl")
        .unwrap()
        .env("HOME", tmp.path())
        .args(["login", "ci:9955", "--user", "alice", "--password", "pw"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Stored credentials"));

    tmp.child(".preflight/credentials.toml")
        .assert(predicate::str::contains("alice"));

    Command::cargo_bin("pfl")
        .unwrap()
        .env("HOME", tmp.path())
        .args(["logout", "ci:9955"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed credentials"));
}

#[test]
fn completions_print_to_stdout() {
    Command::cargo_bin("pfl")
        .unwrap()
        .args(["completions", "bash", "--stdout"])
        .assert()
        .success()
        .stdout(predicate::str::contains("pfl"));
}
