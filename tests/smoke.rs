//! Smoke tests -- verify the binary runs and key subcommands load.

use assert_cmd::Command;

#[test]
fn test_cli_help() {
    Command::cargo_bin("fristwatch")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains(
            "Response-time compliance analytics",
        ));
}

#[test]
fn test_cli_version() {
    Command::cargo_bin("fristwatch")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::contains("fristwatch"));
}

#[test]
fn test_analyze_subcommand_exists() {
    Command::cargo_bin("fristwatch")
        .unwrap()
        .args(["analyze", "--help"])
        .assert()
        .success();
}

#[test]
fn test_kpi_subcommand_exists() {
    Command::cargo_bin("fristwatch")
        .unwrap()
        .args(["kpi", "--help"])
        .assert()
        .success();
}

#[test]
fn test_analyze_missing_input_fails() {
    Command::cargo_bin("fristwatch")
        .unwrap()
        .args(["analyze", "--input", "no_such_file.json"])
        .assert()
        .failure();
}
