use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tanpopo_agent_core::AgentConfig;
use tanpopo_ai::{
    ChatRequest, ChatResponse, GoogleClient, GoogleConfig, LlmClient, TanpopoAiError,
};
use tanpopo_github::{GithubApiClient, GithubApiConfig, WebhookEvent};
use tanpopo_runtime::{BotRuntime, BotRuntimeConfig, DispatchReport};
use tanpopo_vcs::{CloneCredential, CommitIdentity, GitCli, ProcessCommandRunner};
use tracing::{info, warn};

use crate::{bootstrap_helpers::mask_secrets, cli_args::Cli};

/// Stands in for the completion service when no API key is configured, so
/// script-only tasks still run.
struct UnconfiguredLlm;

#[async_trait]
impl LlmClient for UnconfiguredLlm {
    async fn complete(&self, _request: ChatRequest) -> Result<ChatResponse, TanpopoAiError> {
        Err(TanpopoAiError::MissingApiKey)
    }
}

pub(crate) fn run_url(cli: &Cli) -> String {
    format!(
        "{}/{}/actions/runs/{}",
        cli.server_url.trim_end_matches('/'),
        cli.repository.trim(),
        cli.run_id.trim()
    )
}

pub(crate) fn runtime_config(cli: &Cli) -> BotRuntimeConfig {
    BotRuntimeConfig {
        actor: cli.actor.trim().to_string(),
        run_url: run_url(cli),
        workspace: cli.workspace.clone(),
        runner_temp: cli.runner_temp.clone().unwrap_or_else(std::env::temp_dir),
        tasks_root: cli.tasks_root.trim_matches('/').to_string(),
        bot_name: cli.bot_name.trim().to_string(),
        bot_login: cli
            .bot_login
            .as_deref()
            .map(str::trim)
            .filter(|login| !login.is_empty())
            .map(str::to_string),
        default_branch: cli.default_branch.clone(),
        commit_identity: CommitIdentity {
            name: cli.commit_name.clone(),
            email: cli.commit_email.clone(),
        },
        agent: AgentConfig {
            model: cli.model.clone(),
            max_turns: cli.max_turns,
            time_budget_ms: Some(cli.agent_timeout_seconds.saturating_mul(1_000)),
            ..AgentConfig::default()
        },
        exec_timeout_ms: cli.exec_timeout_seconds.saturating_mul(1_000),
        max_output_bytes: cli.max_output_bytes,
    }
}

pub(crate) fn read_event(event_name: &str, path: &Path) -> Result<WebhookEvent> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read event payload {}", path.display()))?;
    let payload: Value = serde_json::from_str(&raw)
        .with_context(|| format!("event payload {} is not JSON", path.display()))?;
    WebhookEvent::classify(event_name, &payload)
}

fn completion_client(cli: &Cli) -> Result<Arc<dyn LlmClient>> {
    let Some(api_key) = cli
        .gemini_api_key
        .as_deref()
        .map(str::trim)
        .filter(|key| !key.is_empty())
    else {
        warn!("no Gemini API key configured; tasks without task.sh will fail");
        return Ok(Arc::new(UnconfiguredLlm));
    };
    let client = GoogleClient::new(GoogleConfig {
        api_base: cli.gemini_api_base.clone(),
        api_key: api_key.to_string(),
        ..GoogleConfig::default()
    })
    .context("failed to build the Gemini client")?;
    Ok(Arc::new(client))
}

/// Masks every secret, builds the collaborators and dispatches one event.
pub(crate) async fn run(cli: Cli) -> Result<DispatchReport> {
    let credential = CloneCredential::new(cli.token.trim());
    let [token, header] = credential.secret_values();
    mask_secrets([
        token.as_str(),
        header.as_str(),
        cli.gemini_api_key.as_deref().unwrap_or_default(),
    ]);

    let event = read_event(&cli.event_name, &cli.event_path)?;
    let forge = GithubApiClient::new(GithubApiConfig {
        api_base: cli.api_url.clone(),
        token,
        request_timeout_ms: cli.request_timeout_ms,
        retry_max_attempts: cli.retry_max_attempts,
        retry_base_delay_ms: cli.retry_base_delay_ms,
    })?;
    let vcs = GitCli::new(ProcessCommandRunner, cli.server_url.clone());
    let llm = completion_client(&cli)?;

    let config = runtime_config(&cli);
    info!(
        event = event.kind(),
        repository = %cli.repository,
        run = %config.run_url,
        "starting"
    );
    let runtime = BotRuntime::new(config, Arc::new(forge), Arc::new(vcs), llm, credential);
    runtime.dispatch(&event).await
}
