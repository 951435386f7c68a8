//! Test-only helpers: deterministic tasks, scripted agents and validators,
//! and throwaway project directories.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::agents::{AdapterFactory, AgentAdapter};
use crate::core::types::{AgentType, Task, TaskStatus};
use crate::error::{AgentFailed, Cancelled};
use crate::io::config::RalphConfig;
use crate::io::paths::ProjectPaths;
use crate::io::task_store::{load_tasks, save_tasks};
use crate::io::validator::{ValidationResult, Validator};

/// Create a deterministic pending task with default fields.
pub fn task(id: &str, priority: i64) -> Task {
    Task {
        id: id.to_string(),
        title: format!("{} title", id),
        description: format!("{} description", id),
        priority,
        ..Task::default()
    }
}

/// Create a deterministic task with an explicit status.
pub fn task_with_status(id: &str, priority: i64, status: TaskStatus) -> Task {
    let mut task = task(id, priority);
    task.status = status;
    task
}

/// One scripted agent invocation.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRun {
    pub output: Vec<String>,
    /// Fail with this reason after emitting output.
    pub failure: Option<String>,
    /// Replace the task list on disk, the way a planning agent would.
    pub writes_tasks: Option<Vec<Task>>,
    /// Block until cancelled.
    pub hangs: bool,
}

impl ScriptedRun {
    pub fn ok(output: &[&str]) -> Self {
        Self {
            output: output.iter().map(|line| line.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn fail(reason: &str) -> Self {
        Self {
            failure: Some(reason.to_string()),
            ..Self::default()
        }
    }

    pub fn hang() -> Self {
        Self {
            hangs: true,
            ..Self::default()
        }
    }

    pub fn writing_tasks(mut self, tasks: Vec<Task>) -> Self {
        self.writes_tasks = Some(tasks);
        self
    }
}

/// Shared script consumed by every adapter a [`ScriptedAdapterFactory`] creates.
#[derive(Debug, Default)]
struct Script {
    runs: Mutex<VecDeque<ScriptedRun>>,
    prompts: Mutex<Vec<(AgentType, String)>>,
    created: Mutex<Vec<(AgentType, Option<String>)>>,
}

/// Adapter returning predetermined output without spawning processes.
#[derive(Debug, Clone)]
pub struct ScriptedAdapter {
    agent: AgentType,
    tasks_path: PathBuf,
    script: Arc<Script>,
}

#[async_trait]
impl AgentAdapter for ScriptedAdapter {
    fn name(&self) -> AgentType {
        self.agent
    }

    fn supports_model_selection(&self) -> bool {
        self.agent != AgentType::Codex
    }

    async fn execute(
        &self,
        cancel: &CancellationToken,
        prompt: &str,
        on_output: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Cancelled.into());
        }
        lock(&self.script.prompts).push((self.agent, prompt.to_string()));
        let run = lock(&self.script.runs).pop_front();
        let Some(run) = run else {
            return Err(AgentFailed {
                agent: self.agent,
                reason: "script exhausted".to_string(),
            }
            .into());
        };

        for line in &run.output {
            on_output(line);
        }
        if let Some(tasks) = &run.writes_tasks {
            save_tasks(&self.tasks_path, tasks)?;
        }
        if run.hangs {
            cancel.cancelled().await;
            return Err(Cancelled.into());
        }
        match run.failure {
            Some(reason) => Err(AgentFailed {
                agent: self.agent,
                reason,
            }
            .into()),
            None => Ok(()),
        }
    }
}

/// Factory handing out [`ScriptedAdapter`]s that share one queue of runs.
#[derive(Debug, Clone)]
pub struct ScriptedAdapterFactory {
    tasks_path: PathBuf,
    script: Arc<Script>,
}

impl ScriptedAdapterFactory {
    pub fn new(tasks_path: impl Into<PathBuf>, runs: Vec<ScriptedRun>) -> Self {
        let script = Script {
            runs: Mutex::new(runs.into()),
            ..Script::default()
        };
        Self {
            tasks_path: tasks_path.into(),
            script: Arc::new(script),
        }
    }

    /// Append a run to the shared queue.
    pub fn push(&self, run: ScriptedRun) {
        lock(&self.script.runs).push_back(run);
    }

    /// Prompts received so far, with the backend that received each.
    pub fn prompts(&self) -> Vec<(AgentType, String)> {
        lock(&self.script.prompts).clone()
    }

    /// Every `create` call so far.
    pub fn created(&self) -> Vec<(AgentType, Option<String>)> {
        lock(&self.script.created).clone()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.script.runs).len()
    }
}

impl AdapterFactory for ScriptedAdapterFactory {
    fn create(&self, agent: AgentType, model: Option<&str>) -> Arc<dyn AgentAdapter> {
        lock(&self.script.created).push((agent, model.map(str::to_string)));
        Arc::new(ScriptedAdapter {
            agent,
            tasks_path: self.tasks_path.clone(),
            script: Arc::clone(&self.script),
        })
    }
}

/// Validator returning queued pass/fail outcomes.
#[derive(Debug, Default)]
pub struct ScriptedValidator {
    outcomes: Mutex<VecDeque<bool>>,
    commands: Mutex<Vec<String>>,
}

impl ScriptedValidator {
    pub fn new(outcomes: Vec<bool>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            commands: Mutex::new(Vec::new()),
        }
    }

    /// Commands run so far.
    pub fn commands(&self) -> Vec<String> {
        lock(&self.commands).clone()
    }
}

#[async_trait]
impl Validator for ScriptedValidator {
    async fn run(&self, cancel: &CancellationToken, command: &str) -> Result<ValidationResult> {
        if cancel.is_cancelled() {
            return Err(Cancelled.into());
        }
        lock(&self.commands).push(command.to_string());
        let outcome = lock(&self.outcomes).pop_front();
        let (passed, output) = match outcome {
            Some(true) => (true, "ok\n".to_string()),
            Some(false) => (false, "validation failed\n".to_string()),
            None => (false, "validator script exhausted\n".to_string()),
        };
        Ok(ValidationResult {
            command: command.to_string(),
            passed,
            output,
            duration: Duration::from_millis(1),
        })
    }
}

/// Temporary project directory with helpers for seeding and reading state.
pub struct TestProject {
    _temp: TempDir,
    pub paths: ProjectPaths,
}

impl TestProject {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir()?;
        let paths = ProjectPaths::new(temp.path());
        Ok(Self { _temp: temp, paths })
    }

    pub fn path(&self) -> &Path {
        &self.paths.root
    }

    pub fn write_tasks(&self, tasks: &[Task]) -> Result<()> {
        save_tasks(&self.paths.tasks_path, tasks)
    }

    pub fn read_tasks(&self) -> Result<Vec<Task>> {
        load_tasks(&self.paths.tasks_path)
    }

    /// Config with no inter-iteration delay and a short pause poll.
    pub fn fast_config(&self) -> RalphConfig {
        RalphConfig {
            iteration_delay_ms: 0,
            pause_poll_ms: 10,
            ..RalphConfig::default()
        }
    }

    pub fn factory(&self, runs: Vec<ScriptedRun>) -> ScriptedAdapterFactory {
        ScriptedAdapterFactory::new(&self.paths.tasks_path, runs)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
