//! Prompt rendering for building and planning iterations.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::types::Task;

const BUILDING_TEMPLATE: &str = include_str!("prompts/building.md");
const PLANNING_TEMPLATE: &str = include_str!("prompts/planning.md");

/// Task fields exposed to templates.
#[derive(Debug, Clone, Serialize)]
struct TaskContext<'a> {
    id: &'a str,
    title: &'a str,
    description: &'a str,
    priority: i64,
    status: &'static str,
    retry_count: u32,
    validation_command: Option<&'a str>,
}

impl<'a> TaskContext<'a> {
    fn from_task(task: &'a Task) -> Self {
        Self {
            id: &task.id,
            title: &task.title,
            description: &task.description,
            priority: task.priority,
            status: task.status.as_str(),
            retry_count: task.retry_count,
            validation_command: task.validation(),
        }
    }
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
    tasks_file: String,
}

impl PromptEngine {
    /// `tasks_file` is how the prompt refers to the task list (e.g. `tasks.json`).
    pub fn new(tasks_file: impl Into<String>) -> Result<Self> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.add_template("building", BUILDING_TEMPLATE)
            .context("load building template")?;
        env.add_template("planning", PLANNING_TEMPLATE)
            .context("load planning template")?;
        Ok(Self {
            env,
            tasks_file: tasks_file.into(),
        })
    }

    /// Prompt asking the agent to implement `task`.
    pub fn render_building(&self, task: &Task) -> Result<String> {
        let template = self.env.get_template("building")?;
        let rendered = template
            .render(context! {
                task => TaskContext::from_task(task),
                tasks_file => &self.tasks_file,
            })
            .with_context(|| format!("render building prompt for {}", task.id))?;
        Ok(rendered)
    }

    /// Prompt asking the agent to create or refine the task list.
    pub fn render_planning(&self, tasks: &[Task]) -> Result<String> {
        let template = self.env.get_template("planning")?;
        let tasks: Vec<TaskContext<'_>> = tasks.iter().map(TaskContext::from_task).collect();
        let rendered = template
            .render(context! {
                tasks => tasks,
                tasks_file => &self.tasks_file,
            })
            .context("render planning prompt")?;
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TaskStatus;
    use crate::test_support::{task, task_with_status};

    fn engine() -> PromptEngine {
        PromptEngine::new("tasks.json").expect("templates")
    }

    /// Id, title, description and validation command all reach the prompt.
    #[test]
    fn building_prompt_interpolates_task_fields() {
        let mut t = task("auth-1", 1);
        t.title = "Add login".to_string();
        t.description = "Implement the /login route.".to_string();
        t.validation_command = Some("cargo test login".to_string());

        let prompt = engine().render_building(&t).expect("render");
        assert!(prompt.contains("ID: auth-1"));
        assert!(prompt.contains("Title: Add login"));
        assert!(prompt.contains("Implement the /login route."));
        assert!(prompt.contains("cargo test login"));
        assert!(!prompt.contains("<retry>"));
        assert!(!prompt.contains("\n\n\n"));
    }

    /// Descriptions keep their indentation and blank lines.
    #[test]
    fn building_prompt_keeps_description_verbatim() {
        let mut t = task("a", 1);
        t.description = "  Step one.\n\n\n    indented detail\n".to_string();
        let prompt = engine().render_building(&t).expect("render");
        assert!(prompt.contains("  Step one.\n\n\n    indented detail\n"));
    }

    #[test]
    fn building_prompt_omits_missing_validation_and_notes_retries() {
        let mut t = task("a", 1);
        t.retry_count = 2;
        let prompt = engine().render_building(&t).expect("render");
        assert!(!prompt.contains("<validation>"));
        assert!(prompt.contains("This is attempt 3."));
    }

    #[test]
    fn planning_prompt_lists_current_tasks() {
        let tasks = vec![
            task("a", 2),
            task_with_status("b", 1, TaskStatus::Completed),
        ];
        let prompt = engine().render_planning(&tasks).expect("render");
        assert!(prompt.contains("- [pending] a (priority 2)"));
        assert!(prompt.contains("- [completed] b (priority 1)"));
        assert!(!prompt.contains("No task list exists yet"));
    }

    #[test]
    fn planning_prompt_without_tasks_asks_for_a_list() {
        let prompt = engine().render_planning(&[]).expect("render");
        assert!(prompt.contains("No task list exists yet"));
        assert!(prompt.contains("`tasks.json` is a JSON array"));
    }
}
