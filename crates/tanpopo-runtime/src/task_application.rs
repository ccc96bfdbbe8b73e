use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::{Context, Result};
use tanpopo_agent_core::Agent;
use tanpopo_ai::{ContentBlock, LlmClient, Message};
use tanpopo_github::{Forge, PullRequest, RepoRef};
use tanpopo_task::{run_task_script, TaskDefinition};
use tanpopo_tools::{register_workspace_tools, ToolPolicy};
use tanpopo_vcs::{CloneCredential, VersionControl};
use tracing::info;

use crate::{
    publication::{publish, PublishRequest},
    BotRuntimeConfig,
};

pub const SEED_PROMPT_HEADER: &str = "Follow the task instruction.
The next part of this message contains the task instruction.

- The current working directory contains the code to be modified.
";

static WORKSPACE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Collaborators needed to apply one task to one repository.
pub struct TaskApplication<'a> {
    pub config: &'a BotRuntimeConfig,
    pub vcs: &'a dyn VersionControl,
    pub forge: &'a dyn Forge,
    pub llm: &'a Arc<dyn LlmClient>,
    pub credential: &'a CloneCredential,
}

/// First user turn of the agent loop: where to work, where the instruction
/// lives, then the instruction itself as a separate block.
pub fn build_seed_message(task: &TaskDefinition, task_workspace: &Path) -> Message {
    let header = format!(
        "{SEED_PROMPT_HEADER}- The task instruction is located at {}.\n",
        task.instruction_location(task_workspace)
    );
    Message::user_blocks(vec![
        ContentBlock::text(header),
        ContentBlock::text(task.instruction.clone()),
    ])
}

/// Clones `repository` into a fresh directory, runs the task's script or the
/// agent loop there, then publishes whatever changed.
///
/// A script or agent failure aborts before anything is committed; the clone is
/// left in place.
pub async fn apply_task_to_repository(
    application: &TaskApplication<'_>,
    task: &TaskDefinition,
    repository: &RepoRef,
) -> Result<Option<PullRequest>> {
    let config = application.config;
    let workspace = create_workspace_dir(&config.runner_temp, repository).await?;
    info!(
        repository = %repository,
        task = %task.id,
        workspace = %workspace.display(),
        "applying task"
    );

    application
        .vcs
        .clone_repository(&repository.as_slug(), &workspace, application.credential)
        .await
        .with_context(|| format!("failed to clone {repository}"))?;

    match &task.script {
        Some(script) => run_task_script(script, &workspace).await?,
        None => run_agent(application, task, &workspace).await?,
    }

    let provenance = config.provenance_line();
    publish(
        application.vcs,
        application.forge,
        PublishRequest {
            workspace: &workspace,
            task,
            repository,
            actor: &config.actor,
            provenance: &provenance,
            default_branch: &config.default_branch,
            identity: &config.commit_identity,
        },
    )
    .await
}

async fn run_agent(
    application: &TaskApplication<'_>,
    task: &TaskDefinition,
    workspace: &Path,
) -> Result<()> {
    let config = application.config;
    let mut policy = ToolPolicy::new(workspace);
    policy.exec_timeout_ms = config.exec_timeout_ms;
    policy.max_output_bytes = config.max_output_bytes;
    for secret in application.credential.secret_values() {
        policy = policy.with_redacted_value(secret);
    }

    let mut agent = Agent::new(application.llm.clone(), config.agent.clone());
    register_workspace_tools(&mut agent, Arc::new(policy));
    let outcome = agent
        .run(build_seed_message(task, &config.workspace))
        .await?;
    info!(
        task = %task.id,
        turns = outcome.turns,
        tool_calls = outcome.tool_calls,
        "agent finished: {}",
        outcome.message
    );
    Ok(())
}

/// Unique per pair; never reused within or across runs.
async fn create_workspace_dir(runner_temp: &Path, repository: &RepoRef) -> Result<PathBuf> {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    let sequence = WORKSPACE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let name = format!(
        "tanpopo-{}-{}-{}-{sequence}-{millis}",
        repository.owner,
        repository.name,
        std::process::id()
    );
    let path = runner_temp.join(name);
    tokio::fs::create_dir_all(&path)
        .await
        .with_context(|| format!("failed to create workspace {}", path.display()))?;
    Ok(path)
}
