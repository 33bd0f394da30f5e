//! Integration tests for argument parsing and top-level behaviour.

#![allow(clippy::expect_used)]

use assert_cmd::Command;
use predicates::prelude::*;

fn meshbench() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("meshbench"));
    cmd.env("NO_COLOR", "1").env_remove("RUST_LOG");
    cmd
}

// --- Help and version tests ---

#[test]
fn test_cli_no_args_shows_help_and_exits_two() {
    // clap with arg_required_else_help shows help on stderr and exits 2
    meshbench()
        .assert()
        .code(2)
        .stderr(predicate::str::contains("port-forwards"));
}

#[test]
fn test_cli_help_flag_lists_commands() {
    meshbench()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("up"))
        .stdout(predicate::str::contains("down"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("deps"))
        .stdout(predicate::str::contains("check"));
}

#[test]
fn test_cli_version_flag_shows_version() {
    meshbench()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_cli_unknown_command_fails() {
    meshbench()
        .arg("teleport")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_deps_help_shows_lookback_default() {
    meshbench()
        .args(["deps", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--lookback"))
        .stdout(predicate::str::contains("[default: 1h]"));
}

#[test]
fn test_global_flags_accepted_after_subcommand() {
    meshbench()
        .args(["status", "--help", "--json", "--quiet", "--no-color", "--verbose"])
        .assert()
        .success();
}
