// The cargo_bin! macro requires build script setup that's overkill for simple tests.
#![allow(deprecated)]

use assert_cmd::cargo::cargo_bin;
use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

fn serfsim() -> Command {
    Command::new(cargo_bin("serfsim"))
}

/// Stdout summary lines (`tick ... | checksum ...`).
fn summaries(stdout: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter(|l| l.starts_with("tick ") && l.contains(" | checksum "))
        .map(str::to_owned)
        .collect()
}

fn run(args: &[&str]) -> Vec<String> {
    let output = serfsim().args(args).output().expect("failed to execute");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    summaries(&output.stdout)
}

fn arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn test_help_flag() {
    serfsim()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("--save-text"));
}

#[test]
fn test_demo_run_prints_summaries() {
    serfsim()
        .args(["-t", "20", "--report-every", "10", "--log-level", "warn"])
        .assert()
        .success()
        .stdout(predicate::str::contains("tick 0 | serfs"))
        .stdout(predicate::str::contains("tick 10 |"))
        .stdout(predicate::str::contains("tick 20 |"))
        .stdout(predicate::str::contains("fights: "));
}

#[test]
fn test_one_summary_per_report() {
    let lines = run(&["-t", "20", "--report-every", "10"]);
    assert_eq!(lines.len(), 3);
    assert!(lines[2].starts_with("tick 20 |"));
}

#[test]
fn test_same_seed_same_result() {
    let a = run(&["-t", "60", "--seed", "9"]);
    let b = run(&["-t", "60", "--seed", "9"]);
    assert_eq!(a.last(), b.last());
}

#[test]
fn test_unknown_serf_save_extension_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("serfs.sav");
    std::fs::write(&path, "").unwrap();
    serfsim()
        .args(["-t", "1", "--serfs", arg(&path)])
        .assert()
        .failure()
        .stderr(predicate::str::contains(".txt or .bin"));
}

#[test]
fn test_missing_config_file_fails() {
    serfsim()
        .args(["-t", "1", "--config", "/nonexistent/serfsim.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nonexistent"));
}

#[test]
fn test_text_save_resumes_where_it_stopped() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("world.json");
    let save = dir.path().join("serfs.txt");

    let straight = run(&["-t", "120"]);
    let first = run(&[
        "-t",
        "60",
        "--snapshot",
        arg(&snapshot),
        "--save-text",
        arg(&save),
    ]);
    let resumed = run(&["-t", "60", "--load", arg(&snapshot), "--serfs", arg(&save)]);

    assert_eq!(first.last(), resumed.first());
    assert_eq!(straight.last(), resumed.last());
}

#[test]
fn test_binary_save_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("world.json");
    let save = dir.path().join("serfs.bin");

    let first = run(&[
        "-t",
        "40",
        "--snapshot",
        arg(&snapshot),
        "--save-binary",
        arg(&save),
    ]);
    let reloaded = run(&["-t", "0", "--load", arg(&snapshot), "--serfs", arg(&save)]);
    assert_eq!(first.last(), reloaded.first());
}
