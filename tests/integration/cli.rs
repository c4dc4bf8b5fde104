//! Smoke tests for the recast binary

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_lists_server_flags() {
    let mut cmd = Command::cargo_bin("recast").expect("binary should build");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--host"))
        .stdout(predicate::str::contains("--port"))
        .stdout(predicate::str::contains("--data-dir"));
}

#[test]
fn test_version_matches_package() {
    let mut cmd = Command::cargo_bin("recast").expect("binary should build");
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_unknown_flag_is_rejected() {
    let mut cmd = Command::cargo_bin("recast").expect("binary should build");
    cmd.arg("--definitely-not-a-flag")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--definitely-not-a-flag"));
}
