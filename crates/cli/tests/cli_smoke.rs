//! CLI smoke tests for playbuild.
//!
//! These tests run the binary against small on-disk package trees and check
//! exit codes and the shape of what it prints.

use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::Stdio;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serial_test::serial;
use tempfile::TempDir;

const ENV_VARS: [&str; 7] = [
  "PLAYBUILD_ROOT",
  "PLAYBUILD_LOCAL_PATH",
  "PLAYBUILD_MIRROR",
  "PLAYBUILD_ALLOWED_HOSTS",
  "PLAYBUILD_INSTRUCTION_TIMEOUT_SECS",
  "PLAYBUILD_PARALLELISM",
  "PLAYBUILD_EXCLUDE",
];

/// Get a Command for the playbuild binary with a clean environment.
fn playbuild_cmd() -> Command {
  let mut cmd = cargo_bin_cmd!("playbuild");
  for var in ENV_VARS {
    cmd.env_remove(var);
  }
  cmd
}

fn write_package(root: &Path, import_path: &str, file: &str, source: &str) {
  let dir = root.join("src").join(import_path);
  std::fs::create_dir_all(&dir).unwrap();
  std::fs::write(dir.join(file), source).unwrap();
}

/// A library root with `fmt` importing `io`.
fn library() -> TempDir {
  let temp = TempDir::new().unwrap();
  write_package(temp.path(), "io", "io.go", "package io\n\nfunc Write() {}\n");
  write_package(
    temp.path(),
    "fmt",
    "print.go",
    "package fmt\n\nimport \"io\"\n\nfunc Println() { io.Write() }\n",
  );
  temp
}

const UPDATE: &str = r#"{"type":"update","source":{"main":{"main.go":"package main\n\nimport \"fmt\"\n\nfunc main() { fmt.Println() }\n"}}}"#;

// =============================================================================
// Help & Version
// =============================================================================

#[test]
fn help_flag_works() {
  playbuild_cmd()
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("Usage"));
}

#[test]
fn version_flag_works() {
  playbuild_cmd()
    .arg("--version")
    .assert()
    .success()
    .stdout(predicate::str::contains("playbuild"));
}

#[test]
fn subcommand_help_works() {
  for cmd in &["session", "publish", "build", "info"] {
    playbuild_cmd()
      .arg(cmd)
      .arg("--help")
      .assert()
      .success()
      .stdout(predicate::str::contains("Usage"));
  }
}

// =============================================================================
// info
// =============================================================================

#[test]
#[serial]
fn info_shows_root() {
  let temp = library();

  playbuild_cmd()
    .arg("--root")
    .arg(temp.path())
    .arg("info")
    .assert()
    .success()
    .stdout(predicate::str::contains(temp.path().display().to_string()))
    .stdout(predicate::str::contains("github.com"));
}

// =============================================================================
// build
// =============================================================================

#[test]
#[serial]
fn build_prints_closure() {
  let temp = library();

  playbuild_cmd()
    .arg("--root")
    .arg(temp.path())
    .args(["build", "fmt"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Built 2 package(s)"));
}

#[test]
#[serial]
fn build_json_lists_hashes() {
  let temp = library();

  let output = playbuild_cmd()
    .arg("--root")
    .arg(temp.path())
    .args(["build", "fmt", "--output", "json"])
    .output()
    .unwrap();
  assert!(output.status.success());

  let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert!(json["io"]["hash_full"].is_string());
  assert_ne!(json["fmt"]["hash_full"], json["fmt"]["hash_optimized"]);
}

#[test]
#[serial]
fn build_missing_package_fails() {
  let temp = library();

  playbuild_cmd()
    .arg("--root")
    .arg(temp.path())
    .args(["build", "nope"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("Build failed"));
}

// =============================================================================
// publish
// =============================================================================

#[test]
#[serial]
fn publish_to_directory_writes_table() {
  let temp = library();
  let bucket = temp.path().join("bucket");
  let table = temp.path().join("table.json");

  playbuild_cmd()
    .arg("--root")
    .arg(temp.path())
    .arg("publish")
    .arg("--out")
    .arg(&bucket)
    .arg("--table")
    .arg(&table)
    .assert()
    .success()
    .stdout(predicate::str::contains("Published 2 package(s)"));

  let table: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&table).unwrap()).unwrap();
  let hash = table["fmt"]["hash_max"].as_str().unwrap();
  assert!(bucket.join("sys").join(format!("fmt.{}.js", hash)).exists());
  assert!(bucket.join("sys").join("index.json").exists());
}

#[test]
fn publish_requires_target() {
  playbuild_cmd().arg("publish").assert().failure();
}

// =============================================================================
// session
// =============================================================================

#[test]
#[serial]
fn session_streams_archives_and_index() {
  let temp = library();

  // Closing stdin cancels the session, so hold it open until stdout ends.
  let mut child = std::process::Command::new(env!("CARGO_BIN_EXE_playbuild"));
  for var in ENV_VARS {
    child.env_remove(var);
  }
  let mut child = child
    .arg("--root")
    .arg(temp.path())
    .arg("session")
    .stdin(Stdio::piped())
    .stdout(Stdio::piped())
    .stderr(Stdio::null())
    .spawn()
    .unwrap();

  let mut stdin = child.stdin.take().unwrap();
  writeln!(stdin, "{}", UPDATE).unwrap();
  let stdout = child.stdout.take().unwrap();
  let kinds: Vec<String> = BufReader::new(stdout)
    .lines()
    .map(|line| {
      let message: serde_json::Value = serde_json::from_str(&line.unwrap()).unwrap();
      message["type"].as_str().unwrap().to_string()
    })
    .collect();
  drop(stdin);
  assert!(child.wait().unwrap().success());

  assert_eq!(kinds.iter().filter(|k| *k == "archive").count(), 3);
  assert_eq!(kinds.iter().filter(|k| *k == "index").count(), 1);
  assert_eq!(kinds.first().map(String::as_str), Some("downloading"));
}

#[test]
#[serial]
fn session_reports_missing_main() {
  let temp = library();

  playbuild_cmd()
    .arg("--root")
    .arg(temp.path())
    .arg("session")
    .write_stdin("{\"type\":\"update\",\"source\":{}}\n")
    .assert()
    .failure()
    .stdout(predicate::str::contains("can't find main package in source"));
}
