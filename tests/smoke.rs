//! Smoke tests -- verify the binary runs and fails fast on bad input.

use assert_cmd::Command;
use predicates::prelude::*;

fn clashprobe() -> Command {
    let mut cmd = Command::cargo_bin("clashprobe").unwrap();
    cmd.env_remove("SUB_URL").env_remove("CLASHPROBE_CONFIG");
    cmd
}

#[test]
fn test_cli_help() {
    clashprobe()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--map-output"))
        .stdout(predicate::str::contains("SUB_URL"));
}

#[test]
fn test_cli_version() {
    clashprobe()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("clashprobe"));
}

#[test]
fn test_missing_source_is_a_usage_error() {
    clashprobe()
        .assert()
        .failure()
        .stderr(predicate::str::contains("--source"));
}

#[test]
fn test_unreadable_source_fails() {
    let dir = tempfile::tempdir().unwrap();
    clashprobe()
        .current_dir(dir.path())
        .args(["--source", "does-not-exist.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load route source"));
}

#[test]
fn test_missing_binary_fails_and_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("sub.yaml"),
        "proxies:\n  - {name: a, type: ss, server: h, port: 8388, cipher: aes-128-gcm, password: p}\n",
    )
    .unwrap();

    clashprobe()
        .current_dir(dir.path())
        .args(["--source", "sub.yaml", "--mihomo", "no-such-mihomo", "--workers", "2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));

    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("temp_worker_"))
        .collect();
    assert!(leftovers.is_empty());
}
