use std::path::Path;

use anyhow::{bail, Result};
use tanpopo_github::{Forge, NewPullRequest, PullRequest, RepoRef};
use tanpopo_task::TaskDefinition;
use tanpopo_vcs::{branch_name_for_task, CommitIdentity, VersionControl};
use tracing::{info, warn};

/// Inputs of one create-or-update publication.
pub struct PublishRequest<'a> {
    pub workspace: &'a Path,
    pub task: &'a TaskDefinition,
    pub repository: &'a RepoRef,
    pub actor: &'a str,
    pub provenance: &'a str,
    pub default_branch: &'a str,
    pub identity: &'a CommitIdentity,
}

/// Task instruction followed by the provenance line.
pub fn pull_request_body(task: &TaskDefinition, provenance: &str) -> String {
    format!("{}\n\n----\n{provenance}\n", task.instruction.trim_end())
}

/// Commits the working tree of `request.workspace` to the task branch and
/// finds-or-creates the single open pull request for it.
///
/// Returns `None` without touching git or the forge when the tree is clean.
pub async fn publish(
    vcs: &dyn VersionControl,
    forge: &dyn Forge,
    request: PublishRequest<'_>,
) -> Result<Option<PullRequest>> {
    let status = vcs.status(request.workspace).await?;
    if status.trim().is_empty() {
        info!(repository = %request.repository, task = %request.task.id, "no changes");
        return Ok(None);
    }
    info!(repository = %request.repository, "changes:\n{}", status.trim_end());

    let branch = branch_name_for_task(&request.task.id);
    vcs.commit_and_push(
        request.workspace,
        &branch,
        &request.task.title,
        request.provenance,
        request.identity,
    )
    .await?;

    let base = vcs
        .default_branch(request.workspace)
        .await?
        .unwrap_or_else(|| request.default_branch.to_string());
    let body = pull_request_body(request.task, request.provenance);

    let existing = forge
        .list_open_pull_requests_by_head(request.repository, &branch)
        .await?;
    let pull_request = match existing.into_iter().next() {
        Some(existing) => {
            if existing.head.ref_name != branch {
                bail!(
                    "pull request {} has head {} but expected {branch}",
                    existing.html_url,
                    existing.head.ref_name
                );
            }
            let updated = forge
                .update_pull_request(
                    request.repository,
                    existing.number,
                    &request.task.title,
                    &body,
                )
                .await?;
            info!(url = %updated.html_url, "updated pull request");
            updated
        }
        None => {
            let created = forge
                .create_pull_request(
                    request.repository,
                    &NewPullRequest {
                        title: request.task.title.clone(),
                        body,
                        head: branch.clone(),
                        base,
                    },
                )
                .await?;
            info!(url = %created.html_url, "created pull request");
            created
        }
    };

    if is_requestable_reviewer(request.actor) {
        // A rejected review request does not fail the publication.
        if let Err(error) = forge
            .request_reviewers(
                request.repository,
                pull_request.number,
                &[request.actor.to_string()],
            )
            .await
        {
            warn!(
                url = %pull_request.html_url,
                reviewer = request.actor,
                "failed to request review: {error:#}"
            );
        }
    }
    Ok(Some(pull_request))
}

/// Apps cannot be requested as reviewers.
fn is_requestable_reviewer(actor: &str) -> bool {
    let actor = actor.trim();
    !actor.is_empty() && !actor.ends_with("[bot]")
}
