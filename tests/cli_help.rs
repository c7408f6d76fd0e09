use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn cli_help_runs() {
    let mut cmd = Command::cargo_bin("sensorgrab").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("radar"))
        .stdout(predicate::str::contains("depth"))
        .stdout(predicate::str::contains("multi"));
}

#[test]
fn radar_without_topic_is_a_usage_error() {
    let mut cmd = Command::cargo_bin("sensorgrab").unwrap();
    cmd.args(["radar", "in.bag", "out.txt"]).assert().failure();
}
