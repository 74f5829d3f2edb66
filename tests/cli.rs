//! End-to-end runs of the `dms` binary against a throwaway data directory.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn dms(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("dms");
    cmd.arg("--data-dir").arg(dir.path()).env_remove("DMS_TOKEN").env_remove("RUST_LOG");
    cmd
}

/// One plant, an admin, and an operator at that plant.
fn seed(dir: &TempDir) {
    dms(dir).args(["plant", "add", "Pune Works", "pun"]).assert().success();
    dms(dir)
        .args(["user", "add", "admin@plant.example", "Admin", "--role", "admin"])
        .assert()
        .success();
    dms(dir)
        .args(["user", "add", "op@plant.example", "Op", "--plant", "PUN"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created user 2"));
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    dms(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("generate").and(predicate::str::contains("serve")));
}

#[test]
fn test_master_generate_and_complete() {
    let dir = TempDir::new().unwrap();
    seed(&dir);

    dms(&dir)
        .args([
            "master", "add", "Sweep floor", "--desc", "Bay 2", "--assignee", "op@plant.example",
            "--start", "2024-01-01", "--estimate", "15",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created task master 1: Sweep floor (plant 1)"));

    dms(&dir)
        .args(["generate", "--date", "2024-01-02"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Generated 2 task(s)."));
    dms(&dir)
        .args(["generate", "--date", "2024-01-02"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No tasks were due for generation."));

    dms(&dir).args(["task", "start", "1"]).assert().success();
    dms(&dir)
        .args(["task", "complete", "1", "--actual", "12"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Completed 1: Sweep floor"));

    dms(&dir)
        .args(["task", "complete", "2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));

    let csv = dir.path().join("out.csv");
    dms(&dir)
        .args(["export", "--status", "completed", "--output"])
        .arg(&csv)
        .assert()
        .success()
        .stdout(predicate::str::contains("Exported 1 task instance(s)"));
    let content = fs::read_to_string(&csv).unwrap();
    assert!(content.lines().nth(1).unwrap().starts_with("1,1,Sweep floor,completed,"));
}

#[test]
fn test_master_for_wrong_plant_is_rejected() {
    let dir = TempDir::new().unwrap();
    seed(&dir);
    dms(&dir).args(["plant", "add", "Chakan", "chk"]).assert().success();

    dms(&dir)
        .args([
            "master", "add", "Sweep floor", "--desc", "Bay 2", "--assignee", "2", "--plant", "2", "--estimate", "15",
        ])
        .assert()
        .failure();
    dms(&dir)
        .args(["master", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Sweep floor").not());
}

#[test]
fn test_actions_need_an_admin_or_acting_user() {
    let dir = TempDir::new().unwrap();
    dms(&dir).args(["plant", "add", "Pune Works", "pun"]).assert().success();
    dms(&dir)
        .args(["user", "add", "op@plant.example", "Op", "--plant", "PUN"])
        .assert()
        .success();

    let add = ["master", "add", "Check oil", "--desc", "Press 4", "--assignee", "2", "--estimate", "5"];
    dms(&dir).args(add).assert().failure();
    dms(&dir).args(add).args(["--as", "op@plant.example"]).assert().success();
}

#[test]
fn test_backup_writes_copy() {
    let dir = TempDir::new().unwrap();
    seed(&dir);
    dms(&dir)
        .arg("backup")
        .assert()
        .success()
        .stdout(predicate::str::contains("Backup written to"));
    assert!(dir.path().join("backup").read_dir().unwrap().next().is_some());
}
