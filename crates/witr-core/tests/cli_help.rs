//! CLI help output tests for witr.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// A witr command isolated from the user's config directory.
fn witr(config_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("witr").expect("witr binary should exist");
    cmd.env("WITR_CONFIG_DIR", config_dir.path())
        .env_remove("WITR_LOG")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_flag_works() {
    let dir = TempDir::new().unwrap();
    witr(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Why is this running?"))
        .stdout(predicate::str::contains("--port"))
        .stdout(predicate::str::contains("witr --file /var/lib/dpkg/lock"));
}

#[test]
fn version_flag_works() {
    let dir = TempDir::new().unwrap();
    witr(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("witr"));
}

#[test]
fn no_target_prints_help_and_succeeds() {
    let dir = TempDir::new().unwrap();
    witr(&dir)
        .assert()
        .code(0)
        .stdout(predicate::str::contains("Usage:"));
}

#[test]
fn help_lists_views() {
    let dir = TempDir::new().unwrap();
    witr(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--short"))
        .stdout(predicate::str::contains("--tree"))
        .stdout(predicate::str::contains("--warnings"))
        .stdout(predicate::str::contains("--env"))
        .stdout(predicate::str::contains("--json"));
}

#[test]
fn help_opens_with_question_not_package_description() {
    let dir = TempDir::new().unwrap();
    let output = witr(&dir).arg("-h").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.starts_with("Why is this running? Explain where a process, port or file comes from."),
        "help starts with: {}",
        stdout.lines().next().unwrap_or_default()
    );
    assert!(!stdout.contains("witr: explain why"));
}
