//! The control loop: select a task, drive one agent invocation, validate,
//! apply the retry policy, persist, repeat.
//!
//! All orchestrator state is owned by the single task running [`Orchestrator::run`].
//! The host talks to it only through the channels in [`super::messages`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::messages::{Command, Event, HostChannels, LoopChannels, Snapshot, channel_pair, send_event};
use crate::agents::{AdapterFactory, AgentAdapter};
use crate::core::retry::apply_iteration_outcome;
use crate::core::selector::next_task_index;
use crate::core::types::{LoopMode, LoopStatus, RunState, Task, TaskStatus};
use crate::error::{AgentFailed, Cancelled, is_cancelled};
use crate::io::config::RalphConfig;
use crate::io::paths::ProjectPaths;
use crate::io::prompt::PromptEngine;
use crate::io::run_state::{load_run_state, save_run_state};
use crate::io::task_store::{load_tasks, save_tasks, update_task};
use crate::io::validator::Validator;

/// Reason why `Orchestrator::run` returned without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStop {
    /// Every task is settled.
    Complete,
    /// The caller cancelled the shared token.
    Cancelled,
}

/// Pending user intent for the most recent task, applied before the next selection.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TaskIntent {
    Retry(String),
    Skip(String),
}

/// Single-owner orchestrator state machine.
pub struct Orchestrator {
    paths: ProjectPaths,
    config: RalphConfig,
    factory: Arc<dyn AdapterFactory>,
    adapter: Arc<dyn AgentAdapter>,
    validator: Arc<dyn Validator>,
    prompts: PromptEngine,
    events: mpsc::Sender<Event>,
    commands: mpsc::Receiver<Command>,
    state: RunState,
    tasks: Vec<Task>,
    intent: Option<TaskIntent>,
    /// Task to select next regardless of priority (set by a retry intent).
    forced_next: Option<String>,
    /// Mode requested by the host for this session; wins over the persisted mode.
    mode_override: Option<LoopMode>,
    planning_failures: u32,
}

impl Orchestrator {
    /// Build an orchestrator and the host's end of its channels.
    pub fn new(
        paths: ProjectPaths,
        config: RalphConfig,
        factory: Arc<dyn AdapterFactory>,
        validator: Arc<dyn Validator>,
    ) -> Result<(Self, HostChannels)> {
        config.validate()?;
        let (LoopChannels { events, commands }, host) =
            channel_pair(config.event_buffer, config.command_buffer);
        let adapter = factory.create(config.agent, config.model.as_deref());
        let tasks_file = paths
            .tasks_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "tasks.json".to_string());
        let prompts = PromptEngine::new(tasks_file)?;
        let orchestrator = Self {
            paths,
            config,
            factory,
            adapter,
            validator,
            prompts,
            events,
            commands,
            state: RunState::default(),
            tasks: Vec::new(),
            intent: None,
            forced_next: None,
            mode_override: None,
            planning_failures: 0,
        };
        Ok((orchestrator, host))
    }

    /// Start this session in `mode` regardless of the mode persisted by a
    /// previous session.
    pub fn with_mode_override(mut self, mode: LoopMode) -> Self {
        self.mode_override = Some(mode);
        self
    }

    /// Run the loop until every task is settled, the token is cancelled, or an
    /// unrecoverable error occurs.
    ///
    /// Unrecoverable errors (malformed documents, disk failures) are reported as
    /// an [`Event::Error`] and returned after a best-effort state save.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<LoopStop> {
        match self.run_loop(&cancel).await {
            Ok(stop) => Ok(stop),
            Err(err) if is_cancelled(&err) => {
                info!(iteration = self.state.current_iteration, "loop cancelled");
                self.state.loop_status = LoopStatus::Stopped;
                self.persist_best_effort();
                self.emit_snapshot();
                Ok(LoopStop::Cancelled)
            }
            Err(err) => {
                error!(err = %format!("{err:#}"), "loop terminated");
                self.state.loop_status = LoopStatus::Error;
                self.emit(Event::Error {
                    iteration: Some(self.state.current_iteration).filter(|i| *i > 0),
                    task_id: self.state.current_task_id.clone(),
                    message: format!("{err:#}"),
                });
                self.persist_best_effort();
                self.emit_snapshot();
                Err(err)
            }
        }
    }

    async fn run_loop(&mut self, cancel: &CancellationToken) -> Result<LoopStop> {
        self.state = load_run_state(&self.paths.root)?;
        self.state.loop_status = LoopStatus::Running;
        if let Some(mode) = self.mode_override {
            self.state.loop_mode = Some(mode);
        } else if self.state.loop_mode.is_none() {
            self.state.loop_mode = Some(self.config.mode);
        }
        self.state.active_model = self.config.model.clone();
        self.record_adapter();
        self.tasks = load_tasks(&self.paths.tasks_path)?;
        self.reconcile_interrupted()?;
        info!(
            iteration = self.state.current_iteration,
            tasks = self.tasks.len(),
            agent = %self.adapter.name(),
            mode = self.mode().as_str(),
            "loop starting"
        );
        self.persist_best_effort();
        self.emit_snapshot();

        loop {
            self.drain_commands();

            if cancel.is_cancelled() {
                return Err(Cancelled.into());
            }

            if self.state.loop_status == LoopStatus::Paused {
                sleep_or_cancel(self.config.pause_poll(), cancel).await;
                continue;
            }

            self.tasks = load_tasks(&self.paths.tasks_path)?;
            self.apply_intent()?;

            match self.mode() {
                LoopMode::Planning => self.run_planning_iteration(cancel).await?,
                LoopMode::Building => match self.select_next() {
                    Some(idx) => self.run_iteration(cancel, idx).await?,
                    None if self.tasks.is_empty() => {
                        warn!("task list is empty in building mode, pausing");
                        self.emit(Event::Error {
                            iteration: None,
                            task_id: None,
                            message: format!(
                                "{} has no tasks; switch to planning mode or add tasks, then resume",
                                self.paths.tasks_path.display()
                            ),
                        });
                        self.set_paused(true);
                        continue;
                    }
                    None => {
                        info!(iteration = self.state.current_iteration, "all tasks settled");
                        self.state.loop_status = LoopStatus::Stopped;
                        save_run_state(&self.paths.root, &mut self.state)?;
                        self.emit_snapshot();
                        self.emit(Event::Done);
                        return Ok(LoopStop::Complete);
                    }
                },
            }

            self.tasks = load_tasks(&self.paths.tasks_path)?;
            self.emit_snapshot();
            sleep_or_cancel(self.config.iteration_delay(), cancel).await;
        }
    }

    /// One building iteration for the task at `idx`.
    #[instrument(skip_all)]
    async fn run_iteration(&mut self, cancel: &CancellationToken, idx: usize) -> Result<()> {
        let started = Instant::now();
        self.state.current_iteration += 1;
        let iteration = self.state.current_iteration;
        self.record_adapter();

        self.tasks[idx].status = TaskStatus::InProgress;
        let task = self.tasks[idx].clone();
        self.state.current_task_id = Some(task.id.clone());
        save_tasks(&self.paths.tasks_path, &self.tasks)?;

        info!(
            iteration,
            task_id = %task.id,
            title = %task.title,
            agent = %self.adapter.name(),
            "iteration started"
        );
        self.emit(Event::IterationStarted {
            iteration,
            task_id: Some(task.id.clone()),
            title: task.title.clone(),
        });

        let prompt = self.prompts.render_building(&task)?;
        let agent_error = self
            .invoke_agent(cancel, iteration, Some(&task.id), &prompt)
            .await?;

        let validation = match (&agent_error, task.validation()) {
            (None, Some(command)) => Some(self.validator.run(cancel, command).await?),
            _ => None,
        };
        let passed = agent_error.is_none() && validation.as_ref().is_none_or(|v| v.passed);

        let mut settled = task.clone();
        let status =
            apply_iteration_outcome(&mut settled, passed, self.config.max_retries_default);
        // The agent may have rewritten the list while it ran.
        self.tasks = load_tasks(&self.paths.tasks_path)?;
        if !update_task(&mut self.tasks, &task.id, status, settled.retry_count) {
            warn!(task_id = %task.id, "task disappeared from the list during the iteration");
        }

        let duration = started.elapsed();
        info!(
            task_id = %task.id,
            passed,
            status = status.as_str(),
            retry_count = settled.retry_count,
            duration_ms = duration.as_millis() as u64,
            "iteration complete"
        );
        self.emit(Event::IterationComplete {
            iteration,
            task_id: Some(task.id.clone()),
            validation,
            passed,
            duration,
            agent_error,
        });

        save_tasks(&self.paths.tasks_path, &self.tasks)?;
        save_run_state(&self.paths.root, &mut self.state)?;
        Ok(())
    }

    /// One task-less planning iteration. It passes when the agent succeeds and
    /// leaves pending work behind; the loop then switches to building.
    #[instrument(skip_all)]
    async fn run_planning_iteration(&mut self, cancel: &CancellationToken) -> Result<()> {
        let started = Instant::now();
        self.state.current_iteration += 1;
        let iteration = self.state.current_iteration;
        self.record_adapter();

        info!(
            iteration,
            tasks = self.tasks.len(),
            agent = %self.adapter.name(),
            "planning iteration started"
        );
        self.emit(Event::IterationStarted {
            iteration,
            task_id: None,
            title: "Plan task list".to_string(),
        });

        let prompt = self.prompts.render_planning(&self.tasks)?;
        let agent_error = self.invoke_agent(cancel, iteration, None, &prompt).await?;

        self.tasks = load_tasks(&self.paths.tasks_path)?;
        let has_work = next_task_index(&self.tasks).is_some();
        let passed = agent_error.is_none() && has_work;

        let duration = started.elapsed();
        self.emit(Event::IterationComplete {
            iteration,
            task_id: None,
            validation: None,
            passed,
            duration,
            agent_error,
        });

        if passed {
            self.planning_failures = 0;
            info!(tasks = self.tasks.len(), "plan ready, switching to building");
            self.set_mode(LoopMode::Building);
        } else {
            self.planning_failures += 1;
            warn!(failures = self.planning_failures, has_work, "planning iteration failed");
            if self.planning_failures > self.config.max_retries_default {
                self.emit(Event::Error {
                    iteration: Some(iteration),
                    task_id: None,
                    message: format!(
                        "planning failed {} times in a row; pausing",
                        self.planning_failures
                    ),
                });
                self.planning_failures = 0;
                self.set_paused(true);
            }
        }

        save_run_state(&self.paths.root, &mut self.state)?;
        Ok(())
    }

    /// Drive the current adapter, forwarding output as events.
    ///
    /// Returns `Ok(Some(reason))` for an agent failure (absorbed by the retry
    /// policy) and `Err` only for cancellation of the shared token.
    async fn invoke_agent(
        &self,
        cancel: &CancellationToken,
        iteration: u32,
        task_id: Option<&str>,
        prompt: &str,
    ) -> Result<Option<String>> {
        let adapter = Arc::clone(&self.adapter);
        let events = self.events.clone();
        let output_task_id = task_id.map(str::to_string);
        let mut on_output = move |text: &str| {
            send_event(
                &events,
                Event::Output {
                    iteration,
                    task_id: output_task_id.clone(),
                    text: text.to_string(),
                },
            );
        };

        let result = match self.config.iteration_timeout() {
            None => adapter.execute(cancel, prompt, &mut on_output).await,
            Some(timeout) => {
                let scoped = cancel.child_token();
                let timer = tokio::spawn({
                    let scoped = scoped.clone();
                    async move {
                        tokio::time::sleep(timeout).await;
                        scoped.cancel();
                    }
                });
                let result = adapter.execute(&scoped, prompt, &mut on_output).await;
                timer.abort();
                match result {
                    Err(err) if is_cancelled(&err) && !cancel.is_cancelled() => {
                        Err(AgentFailed {
                            agent: adapter.name(),
                            reason: format!("timed out after {}s", timeout.as_secs()),
                        }
                        .into())
                    }
                    other => other,
                }
            }
        };

        match result {
            Ok(()) => Ok(None),
            Err(err) if is_cancelled(&err) => Err(err),
            Err(err) => {
                let reason = format!("{err:#}");
                warn!(task_id = ?task_id, %reason, "agent invocation failed");
                Ok(Some(reason))
            }
        }
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            debug!(?command, "applying command");
            self.apply_command(command);
        }
    }

    fn apply_command(&mut self, command: Command) {
        match command {
            Command::Retry | Command::Skip => {
                let Some(id) = self.state.current_task_id.clone() else {
                    warn!(?command, "no active task to act on");
                    return;
                };
                info!(task_id = %id, ?command, "task intent recorded");
                self.intent = Some(match command {
                    Command::Retry => TaskIntent::Retry(id),
                    _ => TaskIntent::Skip(id),
                });
            }
            Command::TogglePause => {
                let paused = self.state.loop_status != LoopStatus::Paused;
                self.set_paused(paused);
            }
            Command::ChangeAdapter { agent, model } => {
                info!(%agent, model = ?model, "switching adapter for next iteration");
                self.adapter = self.factory.create(agent, model.as_deref());
                self.state.active_model = model.filter(|m| !m.trim().is_empty());
                self.record_adapter();
                self.persist_best_effort();
                self.emit_snapshot();
            }
            Command::ChangeMode(mode) => {
                self.planning_failures = 0;
                self.set_mode(mode);
            }
            Command::Stop => {
                info!("stop requested; waiting for the caller to cancel");
            }
        }
    }

    /// Return the task left `in_progress` by an interrupted session to the
    /// selection pool. Its retry count is kept.
    fn reconcile_interrupted(&mut self) -> Result<()> {
        let Some(id) = self.state.current_task_id.clone() else {
            return Ok(());
        };
        let Some(task) = self
            .tasks
            .iter_mut()
            .find(|task| task.id == id && task.status == TaskStatus::InProgress)
        else {
            return Ok(());
        };
        info!(task_id = %id, retry_count = task.retry_count, "resuming interrupted task");
        task.status = TaskStatus::Pending;
        save_tasks(&self.paths.tasks_path, &self.tasks)
    }

    /// Apply a pending retry/skip intent to the freshly loaded task list.
    fn apply_intent(&mut self) -> Result<()> {
        let Some(intent) = self.intent.take() else {
            return Ok(());
        };
        let (id, changed) = match &intent {
            TaskIntent::Retry(id) => {
                let changed = update_task(&mut self.tasks, id, TaskStatus::Pending, 0);
                if changed {
                    self.forced_next = Some(id.clone());
                }
                (id, changed)
            }
            TaskIntent::Skip(id) => {
                let settled = self
                    .tasks
                    .iter()
                    .find(|task| task.id == *id)
                    .is_some_and(|task| task.status == TaskStatus::Completed);
                let changed = !settled && {
                    let retry_count = self
                        .tasks
                        .iter()
                        .find(|task| task.id == *id)
                        .map_or(0, |task| task.retry_count);
                    update_task(&mut self.tasks, id, TaskStatus::Skipped, retry_count)
                };
                if self.forced_next.as_deref() == Some(id.as_str()) {
                    self.forced_next = None;
                }
                (id, changed)
            }
        };
        if changed {
            info!(task_id = %id, ?intent, "task intent applied");
            save_tasks(&self.paths.tasks_path, &self.tasks)?;
        } else {
            warn!(task_id = %id, ?intent, "task intent not applicable");
        }
        Ok(())
    }

    /// Index of the next task: a forced retry first, then priority order.
    fn select_next(&mut self) -> Option<usize> {
        if let Some(id) = self.forced_next.take()
            && let Some(idx) = self
                .tasks
                .iter()
                .position(|task| task.id == id && task.status == TaskStatus::Pending)
        {
            return Some(idx);
        }
        next_task_index(&self.tasks)
    }

    fn mode(&self) -> LoopMode {
        self.state.loop_mode.unwrap_or(self.config.mode)
    }

    fn set_mode(&mut self, mode: LoopMode) {
        if self.state.loop_mode == Some(mode) {
            return;
        }
        info!(mode = mode.as_str(), "loop mode changed");
        self.state.loop_mode = Some(mode);
        self.persist_best_effort();
        self.emit(Event::ModeChanged { mode });
    }

    fn set_paused(&mut self, paused: bool) {
        let (status, event) = if paused {
            (LoopStatus::Paused, Event::Paused)
        } else {
            (LoopStatus::Running, Event::Resumed)
        };
        if self.state.loop_status == status {
            return;
        }
        info!(paused, "loop pause toggled");
        self.state.loop_status = status;
        self.persist_best_effort();
        self.emit(event);
    }

    fn record_adapter(&mut self) {
        self.state.active_adapter = self.adapter.name();
        if !self.adapter.supports_model_selection() {
            self.state.active_model = None;
        }
    }

    fn persist_best_effort(&mut self) {
        if let Err(err) = save_run_state(&self.paths.root, &mut self.state) {
            warn!(err = %format!("{err:#}"), "failed to persist run state");
        }
    }

    fn emit(&self, event: Event) {
        send_event(&self.events, event);
    }

    fn emit_snapshot(&self) {
        self.emit(Event::Snapshot(Snapshot {
            state: self.state.clone(),
            tasks: self.tasks.clone(),
        }));
    }
}

async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(duration) => {}
    }
}
