//! Integration tests for the codecrew CLI

use assert_cmd::cargo;
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a Command for the codecrew binary
fn codecrew() -> Command {
    Command::new(cargo::cargo_bin!("codecrew"))
}

#[test]
fn test_help() {
    codecrew()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Multi-role coding pipeline"));
}

#[test]
fn test_version() {
    codecrew()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.1.0"));
}

#[test]
fn test_subcommands_are_listed() {
    codecrew()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("pipeline"));
}

#[test]
fn test_missing_project_directory_fails() {
    codecrew()
        .arg("--project")
        .arg("/definitely/not/a/real/path")
        .arg("plan")
        .arg("anything")
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_missing_llm_cli_is_reported() {
    let temp = TempDir::new().unwrap();
    std::fs::write(
        temp.path().join("codecrew.json"),
        r#"{"llm": {"command": "no-such-llm-cli-xyz"}}"#,
    )
    .unwrap();

    codecrew()
        .arg("--project")
        .arg(temp.path())
        .arg("plan")
        .arg("build a greeter")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found on PATH"));
}

#[test]
fn test_malformed_settings_file_is_rejected() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("codecrew.json"), "{not json").unwrap();

    codecrew()
        .arg("--project")
        .arg(temp.path())
        .arg("run")
        .arg("anything")
        .assert()
        .failure()
        .code(7)
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_invalid_budget_in_settings_is_rejected() {
    let temp = TempDir::new().unwrap();
    std::fs::write(
        temp.path().join("codecrew.json"),
        r#"{"engine": {"max_attempts": 0}}"#,
    )
    .unwrap();

    codecrew()
        .arg("--project")
        .arg(temp.path())
        .arg("run")
        .arg("anything")
        .assert()
        .failure()
        .code(7)
        .stderr(predicate::str::contains("max_attempts"));
}

#[test]
fn test_plan_requires_a_requirement() {
    codecrew().arg("plan").assert().failure();
}
