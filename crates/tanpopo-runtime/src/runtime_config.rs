use std::path::PathBuf;

use tanpopo_agent_core::AgentConfig;
use tanpopo_vcs::CommitIdentity;

/// Everything one dispatch needs, resolved from the Actions environment by
/// the caller.
#[derive(Debug, Clone)]
pub struct BotRuntimeConfig {
    pub actor: String,
    /// Link to the triggering run, used as the provenance trailer.
    pub run_url: String,
    /// Checkout holding the task definitions.
    pub workspace: PathBuf,
    /// Parent of the per-pair clone directories.
    pub runner_temp: PathBuf,
    pub tasks_root: String,
    pub bot_name: String,
    /// Login whose events are ignored; resolved from the forge when `None`.
    pub bot_login: Option<String>,
    pub default_branch: String,
    pub commit_identity: CommitIdentity,
    pub agent: AgentConfig,
    pub exec_timeout_ms: u64,
    pub max_output_bytes: usize,
}

impl BotRuntimeConfig {
    pub fn provenance_line(&self) -> String {
        format!("Generated by {}", self.run_url)
    }
}
