//! Run state storage for iteration bookkeeping (`.ralph/state.json`).

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, warn};

use super::atomic::write_json_atomic;
use super::paths::{ProjectPaths, temp_path};
use crate::core::types::RunState;

/// Load run state for the project at `dir`.
///
/// If `state.json` is missing but `state.json.tmp` survived an interrupted
/// write, the temp file is renamed into place when it parses and discarded
/// when it does not. A missing pair yields `RunState::default()`.
pub fn load_run_state(dir: &Path) -> Result<RunState> {
    let path = ProjectPaths::new(dir).run_state_path;
    let tmp_path = temp_path(&path);
    if !path.exists() && tmp_path.exists() {
        recover_temp(&tmp_path, &path)?;
    }

    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "run state missing, using defaults");
            return Ok(RunState::default());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("read run state {}", path.display()));
        }
    };
    let state: RunState = serde_json::from_str(&contents)
        .with_context(|| format!("parse run state {}", path.display()))?;
    debug!(
        iteration = state.current_iteration,
        task_id = ?state.current_task_id,
        status = ?state.loop_status,
        "run state loaded"
    );
    Ok(state)
}

/// Promote a complete temp file to `path`; remove a partial one.
fn recover_temp(tmp_path: &Path, path: &Path) -> Result<()> {
    let contents = fs::read_to_string(tmp_path)
        .with_context(|| format!("read run state {}", tmp_path.display()))?;
    if let Err(err) = serde_json::from_str::<RunState>(&contents) {
        warn!(path = %tmp_path.display(), err = %err, "discarding partial run state");
        return fs::remove_file(tmp_path)
            .with_context(|| format!("remove run state {}", tmp_path.display()));
    }
    info!(path = %tmp_path.display(), "recovering run state from interrupted write");
    fs::rename(tmp_path, path).with_context(|| format!("recover run state {}", tmp_path.display()))
}

/// Stamp `last_updated` and atomically write run state (temp file + rename).
pub fn save_run_state(dir: &Path, state: &mut RunState) -> Result<()> {
    let path = ProjectPaths::new(dir).run_state_path;
    state.last_updated = Some(Utc::now());
    debug!(
        path = %path.display(),
        iteration = state.current_iteration,
        status = ?state.loop_status,
        "writing run state"
    );
    write_json_atomic(&path, state).with_context(|| format!("save run state {}", path.display()))
}
