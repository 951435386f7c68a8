//! CLI tests for `ralph tasks` and `ralph init`.
//!
//! Spawns the ralph binary and verifies exit codes and output for settled,
//! pending and malformed task lists.

use std::process::Command;

use ralph::core::types::TaskStatus;
use ralph::exit_codes;
use ralph::io::config::load_config;
use ralph::io::paths::ProjectPaths;
use ralph::io::task_store::{load_tasks, save_tasks};
use ralph::test_support::{task, task_with_status};

fn ralph_tasks(dir: &std::path::Path) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_ralph"))
        .arg("tasks")
        .arg("--dir")
        .arg(dir)
        .output()
        .expect("ralph tasks")
}

#[test]
fn tasks_settled_exits_with_complete_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    let paths = ProjectPaths::new(temp.path());
    save_tasks(
        &paths.tasks_path,
        &[
            task_with_status("done", 1, TaskStatus::Completed),
            task_with_status("gave-up", 2, TaskStatus::Skipped),
        ],
    )
    .expect("write tasks");

    let output = ralph_tasks(temp.path());
    assert_eq!(output.status.code(), Some(exit_codes::COMPLETE));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[completed] done (priority 1): done title"));
    assert!(stdout.contains("all tasks settled"));
    assert!(!stdout.contains("no pending tasks"));
}

#[test]
fn tasks_pending_prints_next_selection() {
    let temp = tempfile::tempdir().expect("tempdir");
    let paths = ProjectPaths::new(temp.path());
    save_tasks(&paths.tasks_path, &[task("later", 9), task("first", 0)]).expect("write tasks");

    let output = ralph_tasks(temp.path());
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(String::from_utf8_lossy(&output.stdout).contains("next: first"));
}

/// A missing file is an empty list, which has nothing pending.
#[test]
fn tasks_missing_file_exits_with_complete_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = ralph_tasks(temp.path());
    assert_eq!(output.status.code(), Some(exit_codes::COMPLETE));
    assert!(String::from_utf8_lossy(&output.stdout).contains("no pending tasks"));
}

#[test]
fn tasks_malformed_file_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    std::fs::write(temp.path().join("tasks.json"), "[{").expect("write");

    let output = ralph_tasks(temp.path());
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("parse tasks"));
}

#[test]
fn init_writes_config_and_empty_task_list() {
    let temp = tempfile::tempdir().expect("tempdir");
    let status = Command::new(env!("CARGO_BIN_EXE_ralph"))
        .arg("init")
        .arg("--dir")
        .arg(temp.path())
        .status()
        .expect("ralph init");
    assert_eq!(status.code(), Some(exit_codes::OK));

    let paths = ProjectPaths::new(temp.path());
    assert!(load_tasks(&paths.tasks_path).expect("tasks").is_empty());
    let config = load_config(&paths.config_path).expect("config");
    assert_eq!(config.max_retries_default, 3);
}
