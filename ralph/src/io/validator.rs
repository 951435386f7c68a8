//! Post-iteration validation commands.
//!
//! A task's `validationCommand` is split on whitespace (first token is the
//! executable, the rest are arguments). There is no shell: metacharacters
//! such as `&&` or `|` are passed through as literal arguments.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::process::run_streaming;
use crate::error::is_cancelled;

/// Outcome of one validation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub command: String,
    pub passed: bool,
    /// Combined stdout + stderr.
    pub output: String,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
}

impl ValidationResult {
    fn failed(command: &str, output: String, duration: Duration) -> Self {
        Self {
            command: command.to_string(),
            passed: false,
            output,
            duration,
        }
    }
}

/// Abstraction over validation backends. Tests use scripted validators.
#[async_trait]
pub trait Validator: Send + Sync {
    /// Run `command`. Only cancellation is an error; a command that cannot be
    /// spawned or exits non-zero is a failed result.
    async fn run(&self, cancel: &CancellationToken, command: &str) -> Result<ValidationResult>;
}

/// Validator that spawns the command in the project directory.
#[derive(Debug, Clone)]
pub struct CommandValidator {
    workdir: PathBuf,
    output_limit_bytes: usize,
}

impl CommandValidator {
    pub fn new(workdir: impl Into<PathBuf>, output_limit_bytes: usize) -> Self {
        Self {
            workdir: workdir.into(),
            output_limit_bytes,
        }
    }
}

#[async_trait]
impl Validator for CommandValidator {
    #[instrument(skip_all, fields(command = %command))]
    async fn run(&self, cancel: &CancellationToken, command: &str) -> Result<ValidationResult> {
        let start = Instant::now();
        let mut parts = command.split_whitespace();
        let Some(program) = parts.next() else {
            debug!("empty validation command");
            return Ok(ValidationResult::failed(
                command,
                "empty validation command".to_string(),
                start.elapsed(),
            ));
        };

        let mut cmd = Command::new(program);
        cmd.args(parts).current_dir(&self.workdir);

        let mut output = BoundedOutput::new(self.output_limit_bytes);
        let status = match run_streaming(cmd, cancel, |line| output.push_line(line)).await {
            Ok(status) => status,
            Err(err) if is_cancelled(&err) => return Err(err),
            Err(err) => {
                warn!(err = %format!("{err:#}"), "validation command could not run");
                output.push_line(&format!("{err:#}"));
                return Ok(ValidationResult::failed(
                    command,
                    output.finish(),
                    start.elapsed(),
                ));
            }
        };

        let passed = status.success();
        info!(passed, exit_code = ?status.code(), "validation finished");
        Ok(ValidationResult {
            command: command.to_string(),
            passed,
            output: output.finish(),
            duration: start.elapsed(),
        })
    }
}

/// Output collector that keeps at most `limit` bytes and counts the rest.
struct BoundedOutput {
    buf: String,
    limit: usize,
    truncated: usize,
}

impl BoundedOutput {
    fn new(limit: usize) -> Self {
        Self {
            buf: String::new(),
            limit,
            truncated: 0,
        }
    }

    fn push_line(&mut self, line: &str) {
        let needed = line.len() + 1;
        if self.truncated == 0 && self.buf.len() + needed <= self.limit {
            self.buf.push_str(line);
            self.buf.push('\n');
        } else {
            self.truncated += needed;
        }
    }

    fn finish(mut self) -> String {
        if self.truncated > 0 {
            self.buf
                .push_str(&format!("[truncated {} bytes]\n", self.truncated));
        }
        self.buf
    }
}

pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }
}
