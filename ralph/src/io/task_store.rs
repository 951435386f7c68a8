//! Task list load/save helpers (`tasks.json`).
//!
//! The file is shared with the external agent, which may rewrite it between
//! iterations. Callers always reload before deciding and always write via
//! atomic rename; concurrent writers resolve last-writer-wins.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use super::atomic::write_json_atomic;
use crate::core::types::{Task, TaskStatus};

/// Load the ordered task list. A missing file yields an empty list.
pub fn load_tasks(path: &Path) -> Result<Vec<Task>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "task file missing, using empty list");
            return Ok(Vec::new());
        }
        Err(err) => return Err(err).with_context(|| format!("read tasks {}", path.display())),
    };
    let tasks: Vec<Task> = serde_json::from_str(&contents)
        .with_context(|| format!("parse tasks {}", path.display()))?;
    debug!(path = %path.display(), count = tasks.len(), "tasks loaded");
    Ok(tasks)
}

/// Atomically write the full task list (temp file + rename).
pub fn save_tasks(path: &Path, tasks: &[Task]) -> Result<()> {
    debug!(path = %path.display(), count = tasks.len(), "writing tasks");
    write_json_atomic(path, tasks).with_context(|| format!("save tasks {}", path.display()))
}

/// Update the first task matching `id` in place. Returns whether one matched.
///
/// Callers are responsible for saving the list afterwards.
pub fn update_task(tasks: &mut [Task], id: &str, status: TaskStatus, retry_count: u32) -> bool {
    match tasks.iter_mut().find(|task| task.id == id) {
        Some(task) => {
            task.status = status;
            task.retry_count = retry_count;
            true
        }
        None => false,
    }
}
