//! Shared types for the task list, the run state, and agent backends.
//!
//! Wire names follow the JSON documents on disk (`tasks.json`,
//! `.ralph/state.json`): camelCase fields, snake_case enum values.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a single task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Skipped => "skipped",
        }
    }

    /// Whether no further iteration will pick this task up on its own.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped
        )
    }
}

/// A unit of work handed to the agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    /// Handed verbatim to the agent.
    #[serde(default)]
    pub description: String,
    /// Lower is more urgent; ties keep list order.
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub retry_count: u32,
    /// `0` means "use the configured default".
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_command: Option<String>,
}

impl Task {
    /// Validation command with surrounding whitespace removed, if any is set.
    pub fn validation(&self) -> Option<&str> {
        self.validation_command
            .as_deref()
            .map(str::trim)
            .filter(|cmd| !cmd.is_empty())
    }
}

/// Status of the orchestrator loop itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopStatus {
    Running,
    Paused,
    #[default]
    Stopped,
    Error,
}

/// Which prompt and policy the next iteration uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopMode {
    Planning,
    #[default]
    Building,
}

impl LoopMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopMode::Planning => "planning",
            LoopMode::Building => "building",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            LoopMode::Planning => LoopMode::Building,
            LoopMode::Building => LoopMode::Planning,
        }
    }
}

impl FromStr for LoopMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "planning" | "plan" => Ok(LoopMode::Planning),
            "building" | "build" => Ok(LoopMode::Building),
            other => Err(anyhow::anyhow!("unknown loop mode {other:?}")),
        }
    }
}

/// Supported external agent backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    #[default]
    Claude,
    OpenCode,
    Cursor,
    Codex,
}

impl AgentType {
    pub const ALL: [AgentType; 4] = [
        AgentType::Claude,
        AgentType::OpenCode,
        AgentType::Cursor,
        AgentType::Codex,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Claude => "claude",
            AgentType::OpenCode => "opencode",
            AgentType::Cursor => "cursor",
            AgentType::Codex => "codex",
        }
    }

    /// Resolve a user-supplied name, falling back to the default backend.
    pub fn from_name_or_default(name: &str) -> Self {
        name.parse().unwrap_or_default()
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        AgentType::ALL
            .into_iter()
            .find(|agent| agent.as_str() == wanted)
            .ok_or_else(|| anyhow::anyhow!("unknown agent {s:?}"))
    }
}

/// Persisted orchestrator progress (`.ralph/state.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunState {
    /// Monotonic, never reset.
    pub current_iteration: u32,
    /// Task currently or most recently active.
    pub current_task_id: Option<String>,
    pub loop_status: LoopStatus,
    pub loop_mode: Option<LoopMode>,
    pub active_adapter: AgentType,
    pub active_model: Option<String>,
    /// Stamped on every save.
    pub last_updated: Option<DateTime<Utc>>,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            current_iteration: 0,
            current_task_id: None,
            loop_status: LoopStatus::Stopped,
            loop_mode: None,
            active_adapter: AgentType::default(),
            active_model: None,
            last_updated: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Absent optional task fields fall back to their defaults.
    #[test]
    fn task_defaults_missing_fields() {
        let task: Task = serde_json::from_str(r#"{"id":"a","title":"A"}"#).expect("parse");
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, 0);
        assert_eq!(task.retry_count, 0);
        assert_eq!(task.max_retries, 0);
        assert_eq!(task.validation_command, None);
        assert_eq!(task.description, "");
    }

    /// Field names on the wire are camelCase and statuses are snake_case.
    #[test]
    fn task_serializes_with_wire_names() {
        let task = Task {
            id: "t1".to_string(),
            title: "T".to_string(),
            description: "d".to_string(),
            priority: 2,
            status: TaskStatus::InProgress,
            retry_count: 1,
            max_retries: 5,
            validation_command: Some("cargo test".to_string()),
        };
        let value = serde_json::to_value(&task).expect("serialize");
        assert_eq!(value["status"], "in_progress");
        assert_eq!(value["retryCount"], 1);
        assert_eq!(value["maxRetries"], 5);
        assert_eq!(value["validationCommand"], "cargo test");
    }

    #[test]
    fn blank_validation_command_is_ignored() {
        let mut task: Task = serde_json::from_str(r#"{"id":"a","title":"A"}"#).expect("parse");
        task.validation_command = Some("   ".to_string());
        assert_eq!(task.validation(), None);
    }

    /// Unknown agent names resolve to the default backend.
    #[test]
    fn agent_name_falls_back_to_default() {
        assert_eq!(AgentType::from_name_or_default("OpenCode"), AgentType::OpenCode);
        assert_eq!(AgentType::from_name_or_default("nope"), AgentType::Claude);
    }

    #[test]
    fn run_state_uses_camel_case_and_rfc3339() {
        let state = RunState {
            current_iteration: 4,
            last_updated: Some(
                DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
                    .expect("timestamp")
                    .with_timezone(&Utc),
            ),
            ..RunState::default()
        };
        let value = serde_json::to_value(&state).expect("serialize");
        assert_eq!(value["currentIteration"], 4);
        assert_eq!(value["loopStatus"], "stopped");
        assert_eq!(value["activeAdapter"], "claude");
        assert_eq!(value["lastUpdated"], "2024-05-01T10:00:00Z");
    }
}
