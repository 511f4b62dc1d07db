//! CLI surface tests for the footprint controller.
//!
//! These never launch a real session; they pin the argument contract
//! and the exit codes for the failure paths that do not need root, a
//! display, or a kernel tracer.

use assert_cmd::Command;
use predicates::prelude::*;
use std::time::Duration;

fn footprint() -> Command {
    let mut cmd = Command::cargo_bin("footprint").expect("binary built");
    cmd.timeout(Duration::from_secs(30));
    cmd
}

#[test]
fn test_help_lists_arguments() {
    footprint()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("app_name").or(predicate::str::contains("APP_NAME")))
        .stdout(predicate::str::contains("--output-dir"));
}

#[test]
fn test_missing_args_is_usage_error() {
    footprint()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_zero_duration_rejected() {
    let out_dir = tempfile::tempdir().expect("tempdir");
    footprint()
        .args(["mousepad", "0"])
        .arg("--output-dir")
        .arg(out_dir.path())
        .assert()
        .code(15)
        .stderr(predicate::str::contains("duration"));
}

#[test]
fn test_missing_tracer_is_capability_error() {
    let out_dir = tempfile::tempdir().expect("tempdir");
    let empty_path = tempfile::tempdir().expect("tempdir");
    // With an empty PATH neither bpftrace nor Xvfb can be found, so the
    // session must stop in preflight with the capability exit code
    footprint()
        .args(["mousepad", "5"])
        .arg("--output-dir")
        .arg(out_dir.path())
        .env("PATH", empty_path.path())
        .env_remove("FOOTPRINT_CONFIG")
        .assert()
        .code(11)
        .stderr(predicate::str::contains("bpftrace"));
}

#[test]
fn test_malformed_target_state_file_fails_before_launch() {
    // Only reachable when preflight passes; without bpftrace this exits
    // earlier, so assert just that it never succeeds
    let out_dir = tempfile::tempdir().expect("tempdir");
    let state = out_dir.path().join("state.json");
    std::fs::write(&state, "{not json").expect("write");
    footprint()
        .args(["mousepad", "5"])
        .arg(state.as_os_str())
        .arg("--output-dir")
        .arg(out_dir.path())
        .assert()
        .failure();
}
