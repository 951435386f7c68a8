//! Messages exchanged between the orchestrator and its host UI.
//!
//! Two bounded one-directional channels: events flow out (non-blocking,
//! dropped when full), commands flow in (drained once per loop pass).

use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

use crate::core::types::{AgentType, LoopMode, RunState, Task};
use crate::io::validator::{ValidationResult, duration_ms};

/// Full, self-consistent restatement of orchestrator state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub state: RunState,
    pub tasks: Vec<Task>,
}

/// Outbound progress events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Snapshot(Snapshot),
    Output {
        iteration: u32,
        task_id: Option<String>,
        text: String,
    },
    IterationStarted {
        iteration: u32,
        /// `None` for planning iterations.
        task_id: Option<String>,
        title: String,
    },
    IterationComplete {
        iteration: u32,
        task_id: Option<String>,
        validation: Option<ValidationResult>,
        passed: bool,
        #[serde(with = "duration_ms")]
        duration: Duration,
        /// Why the agent call failed, when it did.
        agent_error: Option<String>,
    },
    Done,
    Error {
        iteration: Option<u32>,
        task_id: Option<String>,
        message: String,
    },
    Paused,
    Resumed,
    ModeChanged {
        mode: LoopMode,
    },
}

/// Inbound control commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Retry the most recent task immediately with a fresh retry budget.
    Retry,
    /// Settle the most recent task as skipped.
    Skip,
    TogglePause,
    /// Swap the adapter used by the next iteration.
    ChangeAdapter {
        agent: AgentType,
        model: Option<String>,
    },
    ChangeMode(LoopMode),
    /// Signal only: the caller terminates the loop by cancelling its token.
    Stop,
}

/// Host side of the channel pair.
#[derive(Debug)]
pub struct HostChannels {
    pub events: mpsc::Receiver<Event>,
    pub commands: mpsc::Sender<Command>,
}

/// Orchestrator side of the channel pair.
#[derive(Debug)]
pub(crate) struct LoopChannels {
    pub events: mpsc::Sender<Event>,
    pub commands: mpsc::Receiver<Command>,
}

pub(crate) fn channel_pair(event_buffer: usize, command_buffer: usize) -> (LoopChannels, HostChannels) {
    let (event_tx, event_rx) = mpsc::channel(event_buffer);
    let (command_tx, command_rx) = mpsc::channel(command_buffer);
    (
        LoopChannels {
            events: event_tx,
            commands: command_rx,
        },
        HostChannels {
            events: event_rx,
            commands: command_tx,
        },
    )
}

/// Best-effort, non-blocking send. A full or closed channel drops the event;
/// the next snapshot lets the host recover.
pub(crate) fn send_event(tx: &mpsc::Sender<Event>, event: Event) {
    match tx.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(event)) => debug!(?event, "event channel full, dropping event"),
        Err(TrySendError::Closed(_)) => debug!("event channel closed"),
    }
}
