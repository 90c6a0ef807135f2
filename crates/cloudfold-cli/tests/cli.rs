//! End-to-end checks of the `cloudfold` binary that need no server.

use assert_cmd::Command;
use predicates::prelude::*;

fn cloudfold() -> Command {
    let mut cmd = Command::cargo_bin("cloudfold").expect("binary built");
    cmd.env_remove("CLOUDFOLD_TOKEN")
        .env("CLOUDFOLD_MAX_RETRIES", "0")
        .env("CLOUDFOLD_TIMEOUT", "2");
    cmd
}

#[test]
fn test_help_lists_commands() {
    cloudfold()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("upload"))
        .stdout(predicate::str::contains("rm"))
        .stdout(predicate::str::contains("zip"));
}

#[test]
fn test_version_needs_no_server() {
    cloudfold()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_unreachable_server_exits_with_network_code() {
    cloudfold()
        .args(["quota", "--url", "http://127.0.0.1:9/api"])
        .assert()
        .code(5)
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_missing_upload_file_is_usage_error() {
    cloudfold()
        .args(["upload", "/definitely/not/here.bin", "--url", "http://127.0.0.1:9/api"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("failed to read"));
}
