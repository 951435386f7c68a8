//! Canonical file locations relative to a project directory.

use std::path::{Path, PathBuf};

/// Directory holding orchestrator-owned files.
pub const STATE_DIR: &str = ".ralph";

/// All canonical paths for a project root.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    pub root: PathBuf,
    pub state_dir: PathBuf,
    pub tasks_path: PathBuf,
    pub run_state_path: PathBuf,
    pub config_path: PathBuf,
}

impl ProjectPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let state_dir = root.join(STATE_DIR);
        Self {
            root: root.clone(),
            state_dir: state_dir.clone(),
            tasks_path: root.join("tasks.json"),
            run_state_path: state_dir.join("state.json"),
            config_path: state_dir.join("config.toml"),
        }
    }
}

/// Sibling staging path used for atomic writes (`tasks.json` -> `tasks.json.tmp`).
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}
