//! Black-box tests against the kbs binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn repo() -> TempDir {
    let temp = TempDir::new().unwrap();
    std::process::Command::new("git")
        .args(["init", "--quiet"])
        .current_dir(temp.path())
        .output()
        .expect("git init");
    temp
}

fn kbs(root: &TempDir) -> Command {
    let mut command = Command::cargo_bin("kbs").unwrap();
    command
        .current_dir(root.path())
        .env("KANBUS_NO_DAEMON", "1")
        .env("KANBUS_USER", "binary-test")
        .env("NO_COLOR", "1");
    command
}

#[test]
fn init_creates_the_documented_layout() {
    let temp = repo();
    kbs(&temp).arg("init").assert().success();

    assert!(temp.path().join(".kanbus.yml").is_file());
    assert!(temp.path().join("project/issues").is_dir());
    assert!(temp.path().join("project/events").is_dir());
    assert!(temp.path().join("CONTRIBUTING_AGENT.template.md").is_file());

    kbs(&temp)
        .arg("init")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("already_initialized"));
}

#[test]
fn create_close_delete_round_trip() {
    let temp = repo();
    kbs(&temp).arg("init").assert().success();

    let output = kbs(&temp)
        .args(["create", "Implement OAuth2 flow"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let id = stdout
        .lines()
        .find_map(|line| line.strip_prefix("ID: "))
        .expect("create prints the id")
        .to_string();
    assert!(id.starts_with("kbs-"));

    kbs(&temp).args(["close", &id]).assert().success();
    kbs(&temp)
        .args(["close", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid_transition"));

    kbs(&temp).args(["delete", &id]).assert().success();
    kbs(&temp)
        .args(["delete", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not_found"));
}

#[test]
fn duplicate_titles_fail_case_insensitively() {
    let temp = repo();
    kbs(&temp).arg("init").assert().success();
    kbs(&temp).args(["create", "Do Work"]).assert().success();
    kbs(&temp)
        .args(["create", "do work"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("duplicate_title"));
}

#[test]
fn ready_hides_blocked_issues() {
    let temp = repo();
    kbs(&temp).arg("init").assert().success();

    let first = create_and_read_id(&temp, "Blocked one");
    let second = create_and_read_id(&temp, "Blocker two");
    kbs(&temp)
        .args(["dep", "add", &first, "--blocked-by", &second])
        .assert()
        .success();

    let output = kbs(&temp).arg("ready").output().unwrap();
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(!stdout.contains(&first));
    assert!(stdout.contains(&second));
}

#[test]
fn cycles_surface_their_kind_on_stderr() {
    let temp = repo();
    kbs(&temp).arg("init").assert().success();
    let a = create_and_read_id(&temp, "A");
    let b = create_and_read_id(&temp, "B");
    let c = create_and_read_id(&temp, "C");

    kbs(&temp)
        .args(["dep", "add", &a, "--blocked-by", &b])
        .assert()
        .success();
    kbs(&temp)
        .args(["dep", "add", &b, "--blocked-by", &c])
        .assert()
        .success();
    kbs(&temp)
        .args(["dep", "add", &c, "--blocked-by", &a])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cycle_detected"));

    kbs(&temp)
        .args(["dep", "remove", &a, "--blocked-by", &b])
        .assert()
        .success();
    kbs(&temp)
        .args(["dep", "add", &c, "--blocked-by", &a])
        .assert()
        .success();
}

#[test]
fn validate_and_stats_report_over_the_store() {
    let temp = repo();
    kbs(&temp).arg("init").assert().success();
    create_and_read_id(&temp, "One");
    let second = create_and_read_id(&temp, "Two");
    kbs(&temp).args(["close", &second]).assert().success();

    kbs(&temp)
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("ok"));
    kbs(&temp)
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("total issues: 2"))
        .stdout(predicate::str::contains("open issues: 1"))
        .stdout(predicate::str::contains("closed issues: 1"));
}

fn create_and_read_id(temp: &TempDir, title: &str) -> String {
    let output = kbs(temp).args(["create", title]).output().unwrap();
    assert!(output.status.success());
    String::from_utf8(output.stdout)
        .unwrap()
        .lines()
        .find_map(|line| line.strip_prefix("ID: "))
        .expect("create prints the id")
        .to_string()
}
