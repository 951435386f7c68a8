//! Agent adapters: one uniform interface over several external agent CLIs.
//!
//! The [`AgentAdapter`] trait decouples the orchestrator from the actual
//! backend. [`CliAdapterFactory`] resolves an [`AgentType`] plus optional model
//! into a [`CliAdapter`] and owns the model-listing cache. Tests use scripted
//! adapters that return predetermined output without spawning processes.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub mod backends;
pub mod cli;

pub use cli::CliAdapter;

use crate::core::models::parse_model_list;
use crate::core::types::AgentType;
use crate::io::config::RalphConfig;
use crate::io::process::run_streaming;
use backends::backend_spec;

/// Uniform interface over agent backends.
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    fn name(&self) -> AgentType;

    fn supports_model_selection(&self) -> bool;

    /// Run `prompt` to completion, delivering each displayable chunk to
    /// `on_output` as it arrives.
    ///
    /// Returns [`crate::error::Cancelled`] if `cancel` fires and
    /// [`crate::error::AgentFailed`] if the backend fails.
    async fn execute(
        &self,
        cancel: &CancellationToken,
        prompt: &str,
        on_output: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<()>;
}

/// Resolves a backend selection into a runnable adapter.
pub trait AdapterFactory: Send + Sync {
    fn create(&self, agent: AgentType, model: Option<&str>) -> Arc<dyn AgentAdapter>;
}

/// Per-backend model lists, kept for the lifetime of the owning factory.
#[derive(Debug, Default)]
pub struct ModelCache {
    entries: Mutex<HashMap<AgentType, Vec<String>>>,
}

impl ModelCache {
    pub fn get(&self, agent: AgentType) -> Option<Vec<String>> {
        self.lock().get(&agent).cloned()
    }

    pub fn insert(&self, agent: AgentType, models: Vec<String>) {
        self.lock().insert(agent, models);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<AgentType, Vec<String>>> {
        // Entries are plain data; a poisoned lock still holds a usable map.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Factory producing subprocess-backed adapters.
#[derive(Debug)]
pub struct CliAdapterFactory {
    workdir: PathBuf,
    binaries: BTreeMap<String, String>,
    models: ModelCache,
}

impl CliAdapterFactory {
    pub fn new(workdir: impl Into<PathBuf>, config: &RalphConfig) -> Self {
        Self {
            workdir: workdir.into(),
            binaries: config.binaries.clone(),
            models: ModelCache::default(),
        }
    }

    /// Resolve a backend by name; unknown names fall back to the default backend.
    pub fn create_by_name(&self, name: &str, model: Option<&str>) -> Arc<dyn AgentAdapter> {
        self.create(AgentType::from_name_or_default(name), model)
    }

    fn program_for(&self, agent: AgentType) -> String {
        self.binaries
            .get(agent.as_str())
            .cloned()
            .unwrap_or_else(|| backend_spec(agent).program.to_string())
    }

    /// List models for `agent` via its `<binary> models` command, cached per backend.
    pub async fn list_models(
        &self,
        cancel: &CancellationToken,
        agent: AgentType,
    ) -> Result<Vec<String>> {
        if let Some(models) = self.models.get(agent) {
            debug!(%agent, count = models.len(), "model list cache hit");
            return Ok(models);
        }
        let spec = backend_spec(agent);
        if !spec.supports_model {
            return Err(anyhow!("{agent} does not support model selection"));
        }
        let (args, format) = spec
            .model_listing
            .ok_or_else(|| anyhow!("{agent} does not provide a model listing command"))?;

        let mut cmd = Command::new(self.program_for(agent));
        cmd.args(args).current_dir(&self.workdir);
        let mut output = String::new();
        let status = run_streaming(cmd, cancel, |line| {
            output.push_str(line);
            output.push('\n');
        })
        .await?;
        if !status.success() {
            return Err(anyhow!(
                "{agent} model listing failed with status {:?}",
                status.code()
            ));
        }

        let models = parse_model_list(&output, format);
        info!(%agent, count = models.len(), "model list loaded");
        self.models.insert(agent, models.clone());
        Ok(models)
    }

    /// Drop every cached model list so the next lookup refreshes.
    pub fn clear_model_cache(&self) {
        self.models.clear();
    }
}

impl AdapterFactory for CliAdapterFactory {
    fn create(&self, agent: AgentType, model: Option<&str>) -> Arc<dyn AgentAdapter> {
        Arc::new(CliAdapter::new(agent, model, &self.workdir).with_program(self.program_for(agent)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_applies_binary_overrides() {
        let mut config = RalphConfig::default();
        config
            .binaries
            .insert("claude".to_string(), "/opt/claude".to_string());
        let factory = CliAdapterFactory::new("/proj", &config);
        assert_eq!(factory.program_for(AgentType::Claude), "/opt/claude");
        assert_eq!(factory.program_for(AgentType::Cursor), "cursor-agent");
    }

    /// Unknown names still produce a runnable adapter.
    #[test]
    fn unknown_name_falls_back_to_default() {
        let factory = CliAdapterFactory::new("/proj", &RalphConfig::default());
        let adapter = factory.create_by_name("something-new", None);
        assert_eq!(adapter.name(), AgentType::Claude);
        assert!(adapter.supports_model_selection());
        assert!(!factory.create(AgentType::Codex, None).supports_model_selection());
    }

    #[test]
    fn model_cache_clears() {
        let cache = ModelCache::default();
        cache.insert(AgentType::OpenCode, vec!["a/b".to_string()]);
        assert_eq!(cache.get(AgentType::OpenCode), Some(vec!["a/b".to_string()]));
        cache.clear();
        assert_eq!(cache.get(AgentType::OpenCode), None);
    }

    #[tokio::test]
    async fn listing_unsupported_backends_fails() {
        let factory = CliAdapterFactory::new("/proj", &RalphConfig::default());
        let cancel = CancellationToken::new();
        assert!(factory.list_models(&cancel, AgentType::Codex).await.is_err());
        assert!(factory.list_models(&cancel, AgentType::Claude).await.is_err());
    }

    /// Results are cached until cleared, even if the binary changes output.
    #[cfg(unix)]
    #[tokio::test]
    async fn model_listing_is_cached_until_cleared() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().expect("tempdir");
        let script = temp.path().join("cursor-agent");
        let write_script = |body: &str| {
            std::fs::write(&script, format!("#!/bin/sh\n{body}\n")).expect("write");
            let mut perms = std::fs::metadata(&script).expect("meta").permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&script, perms).expect("chmod");
        };
        write_script("echo 'anthropic sonnet-4'; echo; echo 'openai gpt-5'");

        let mut config = RalphConfig::default();
        config
            .binaries
            .insert("cursor".to_string(), script.display().to_string());
        let factory = CliAdapterFactory::new(temp.path(), &config);
        let cancel = CancellationToken::new();

        let first = factory
            .list_models(&cancel, AgentType::Cursor)
            .await
            .expect("list");
        assert_eq!(first, vec!["anthropic/sonnet-4", "openai/gpt-5"]);

        write_script("echo 'google gemini-2'");
        let cached = factory
            .list_models(&cancel, AgentType::Cursor)
            .await
            .expect("cached");
        assert_eq!(cached, first);

        factory.clear_model_cache();
        let refreshed = factory
            .list_models(&cancel, AgentType::Cursor)
            .await
            .expect("refresh");
        assert_eq!(refreshed, vec!["google/gemini-2"]);
    }
}
