//! Orchestrator configuration stored under `.ralph/config.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use super::atomic::write_atomic;
use crate::core::retry::DEFAULT_MAX_RETRIES;
use crate::core::types::{AgentType, LoopMode};

/// Orchestrator configuration (TOML).
///
/// Intended to be edited by humans. Missing fields default to the values the
/// loop was designed around.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RalphConfig {
    /// Backend used when a session starts.
    pub agent: AgentType,

    /// Model passed via `--model` when the backend supports selection.
    pub model: Option<String>,

    /// Loop mode used when the run state does not record one.
    pub mode: LoopMode,

    /// Retry budget for tasks whose `maxRetries` is 0.
    pub max_retries_default: u32,

    /// Delay between iterations, in milliseconds.
    pub iteration_delay_ms: u64,

    /// Sleep between command drains while paused, in milliseconds.
    pub pause_poll_ms: u64,

    /// Optional wall-clock limit for a single agent invocation.
    pub iteration_timeout_secs: Option<u64>,

    /// Truncate captured validator output beyond this many bytes.
    pub validation_output_limit_bytes: usize,

    /// Capacity of the outbound event channel.
    pub event_buffer: usize,

    /// Capacity of the inbound command channel.
    pub command_buffer: usize,

    /// Executable overrides keyed by agent name (`claude = "/opt/bin/claude"`).
    pub binaries: BTreeMap<String, String>,
}

impl Default for RalphConfig {
    fn default() -> Self {
        Self {
            agent: AgentType::default(),
            model: None,
            mode: LoopMode::default(),
            max_retries_default: DEFAULT_MAX_RETRIES,
            iteration_delay_ms: 2_000,
            pause_poll_ms: 250,
            iteration_timeout_secs: None,
            validation_output_limit_bytes: 100_000,
            event_buffer: 256,
            command_buffer: 32,
            binaries: BTreeMap::new(),
        }
    }
}

impl RalphConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_retries_default == 0 {
            return Err(anyhow!("max_retries_default must be > 0"));
        }
        if self.pause_poll_ms == 0 {
            return Err(anyhow!("pause_poll_ms must be > 0"));
        }
        if self.iteration_timeout_secs == Some(0) {
            return Err(anyhow!("iteration_timeout_secs must be > 0 when set"));
        }
        if self.validation_output_limit_bytes == 0 {
            return Err(anyhow!("validation_output_limit_bytes must be > 0"));
        }
        if self.event_buffer == 0 || self.command_buffer == 0 {
            return Err(anyhow!("event_buffer and command_buffer must be > 0"));
        }
        if let Some(name) = self.binaries.keys().find(|name| name.parse::<AgentType>().is_err()) {
            return Err(anyhow!("binaries: unknown agent {name:?}"));
        }
        Ok(())
    }

    pub fn iteration_delay(&self) -> Duration {
        Duration::from_millis(self.iteration_delay_ms)
    }

    pub fn pause_poll(&self) -> Duration {
        Duration::from_millis(self.pause_poll_ms)
    }

    pub fn iteration_timeout(&self) -> Option<Duration> {
        self.iteration_timeout_secs.map(Duration::from_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RalphConfig::default()`.
pub fn load_config(path: &Path) -> Result<RalphConfig> {
    if !path.exists() {
        let cfg = RalphConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RalphConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RalphConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, RalphConfig::default());
        assert_eq!(cfg.iteration_delay(), Duration::from_secs(2));
        assert_eq!(cfg.max_retries_default, 3);
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let mut cfg = RalphConfig {
            agent: AgentType::OpenCode,
            model: Some("openai/gpt-5".to_string()),
            iteration_timeout_secs: Some(600),
            ..RalphConfig::default()
        };
        cfg.binaries
            .insert("opencode".to_string(), "/opt/bin/opencode".to_string());
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
        assert_eq!(
            loaded.binaries.get("opencode").map(String::as_str),
            Some("/opt/bin/opencode")
        );
        assert!(!loaded.binaries.contains_key("claude"));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "agent = \"cursor\"\nmode = \"planning\"\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.agent, AgentType::Cursor);
        assert_eq!(cfg.mode, LoopMode::Planning);
        assert_eq!(cfg.pause_poll_ms, 250);
    }

    #[test]
    fn rejects_zero_timeout_and_unknown_binary() {
        let cfg = RalphConfig {
            iteration_timeout_secs: Some(0),
            ..RalphConfig::default()
        };
        assert!(cfg.validate().is_err());

        let mut cfg = RalphConfig::default();
        cfg.binaries.insert("gpt".to_string(), "gpt".to_string());
        assert!(cfg.validate().is_err());
    }
}
