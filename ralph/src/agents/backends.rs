//! Static invocation templates for each supported backend.

use crate::core::models::ModelListFormat;
use crate::core::types::AgentType;

/// How to invoke one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendSpec {
    pub agent: AgentType,
    /// Default executable name, resolved via `PATH`.
    pub program: &'static str,
    /// Fixed arguments placed before `--model` and the prompt.
    pub args: &'static [&'static str],
    /// Extra environment merged into the subprocess environment.
    pub env: &'static [(&'static str, &'static str)],
    pub supports_model: bool,
    /// Arguments and output format of the model listing command, if any.
    pub model_listing: Option<(&'static [&'static str], ModelListFormat)>,
}

const CLAUDE: BackendSpec = BackendSpec {
    agent: AgentType::Claude,
    program: "claude",
    args: &[
        "-p",
        "--output-format",
        "stream-json",
        "--verbose",
        "--dangerously-skip-permissions",
    ],
    env: &[],
    supports_model: true,
    model_listing: None,
};

const OPENCODE: BackendSpec = BackendSpec {
    agent: AgentType::OpenCode,
    program: "opencode",
    args: &["run", "--format", "json"],
    env: &[(
        "OPENCODE_PERMISSION",
        r#"{"edit":"allow","bash":"allow","webfetch":"allow"}"#,
    )],
    supports_model: true,
    model_listing: Some((&["models"], ModelListFormat::Token)),
};

const CURSOR: BackendSpec = BackendSpec {
    agent: AgentType::Cursor,
    program: "cursor-agent",
    args: &["-p", "--output-format", "stream-json", "--force"],
    env: &[],
    supports_model: true,
    model_listing: Some((&["models"], ModelListFormat::ProviderPair)),
};

const CODEX: BackendSpec = BackendSpec {
    agent: AgentType::Codex,
    program: "codex",
    args: &[
        "exec",
        "--skip-git-repo-check",
        "--sandbox",
        "danger-full-access",
    ],
    env: &[],
    supports_model: false,
    model_listing: None,
};

/// Invocation template for `agent`.
pub fn backend_spec(agent: AgentType) -> &'static BackendSpec {
    match agent {
        AgentType::Claude => &CLAUDE,
        AgentType::OpenCode => &OPENCODE,
        AgentType::Cursor => &CURSOR,
        AgentType::Codex => &CODEX,
    }
}

/// Full argument list: fixed template, optional `--model <model>`, then the prompt.
pub fn build_args(spec: &BackendSpec, model: Option<&str>, prompt: &str) -> Vec<String> {
    let mut args: Vec<String> = spec.args.iter().map(|arg| arg.to_string()).collect();
    if spec.supports_model
        && let Some(model) = model.map(str::trim).filter(|m| !m.is_empty())
    {
        args.push("--model".to_string());
        args.push(model.to_string());
    }
    args.push(prompt.to_string());
    args
}
