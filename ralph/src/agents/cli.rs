//! Adapter that runs a backend CLI as a subprocess per invocation.

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::AgentAdapter;
use super::backends::{BackendSpec, backend_spec, build_args};
use crate::core::stream::{emits_envelopes, failed_result, normalize_line};
use crate::core::types::AgentType;
use crate::error::{AgentFailed, is_cancelled};
use crate::io::process::run_streaming;

/// Subprocess-backed agent adapter.
#[derive(Debug, Clone)]
pub struct CliAdapter {
    spec: &'static BackendSpec,
    program: String,
    model: Option<String>,
    workdir: PathBuf,
}

impl CliAdapter {
    pub fn new(agent: AgentType, model: Option<&str>, workdir: impl Into<PathBuf>) -> Self {
        let spec = backend_spec(agent);
        Self {
            spec,
            program: spec.program.to_string(),
            model: model
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string),
            workdir: workdir.into(),
        }
    }

    /// Use `program` instead of the backend's default executable.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn failed(&self, reason: impl Into<String>) -> anyhow::Error {
        AgentFailed {
            agent: self.spec.agent,
            reason: reason.into(),
        }
        .into()
    }
}

#[async_trait]
impl AgentAdapter for CliAdapter {
    fn name(&self) -> AgentType {
        self.spec.agent
    }

    fn supports_model_selection(&self) -> bool {
        self.spec.supports_model
    }

    #[instrument(skip_all, fields(agent = %self.spec.agent, model = ?self.model))]
    async fn execute(
        &self,
        cancel: &CancellationToken,
        prompt: &str,
        on_output: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<()> {
        info!(program = %self.program, workdir = %self.workdir.display(), "starting agent");
        let mut cmd = Command::new(&self.program);
        cmd.args(build_args(self.spec, self.model.as_deref(), prompt))
            .envs(self.spec.env.iter().copied())
            .current_dir(&self.workdir);

        let agent = self.spec.agent;
        let structured = emits_envelopes(agent);
        let mut reported_failure: Option<String> = None;
        let result = run_streaming(cmd, cancel, |line| {
            if structured && let Some(reason) = failed_result(line) {
                reported_failure = Some(reason);
            }
            if let Some(text) = normalize_line(agent, line) {
                on_output(&text);
            }
        })
        .await;

        let status = match result {
            Ok(status) => status,
            Err(err) if is_cancelled(&err) => return Err(err),
            Err(err) => return Err(self.failed(format!("{err:#}"))),
        };
        if !status.success() {
            warn!(exit_code = ?status.code(), "agent exited unsuccessfully");
            return Err(match status.code() {
                Some(code) => self.failed(format!("exited with status {code}")),
                None => self.failed("terminated by signal"),
            });
        }
        if let Some(reason) = reported_failure {
            warn!(%reason, "agent reported a failed result");
            return Err(self.failed(reason));
        }

        debug!("agent completed successfully");
        Ok(())
    }
}
