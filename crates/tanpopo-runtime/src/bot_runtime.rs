use std::sync::Arc;

use anyhow::Result;
use tanpopo_ai::LlmClient;
use tanpopo_github::{
    bot_comment::{
        bot_marker, find_checked_repositories, inject_between_markers, is_bot_comment,
        is_rerun_requested, parse_marker_metadata, render_checklist_comment,
        render_rerun_comment, results_marker, uncheck_all, CommentMetadata,
    },
    webhook_event::{IssueCommentEvent, IssueEvent, PullRequestEvent, ReviewCommentEvent},
    Forge, NewReviewComment, RepoRef, ReviewComment, WebhookEvent,
};
use tanpopo_task::{impacted_task_dirs, TaskDefinition, TASK_README};
use tanpopo_vcs::{CloneCredential, VersionControl};
use tracing::{info, warn};

use crate::{
    pair_outcome::{
        render_pair_results, render_summary_comment, DispatchReport, PairOutcome, PairResult,
    },
    task_application::{apply_task_to_repository, TaskApplication},
    BotRuntimeConfig,
};

/// Routes classified webhook events to task runs and comment updates.
///
/// Pairs are processed one at a time. A failing pair is recorded and the
/// remaining pairs still run; comments are written only after every pair of
/// the event was attempted.
pub struct BotRuntime {
    config: BotRuntimeConfig,
    forge: Arc<dyn Forge>,
    vcs: Arc<dyn VersionControl>,
    llm: Arc<dyn LlmClient>,
    credential: CloneCredential,
}

impl BotRuntime {
    pub fn new(
        config: BotRuntimeConfig,
        forge: Arc<dyn Forge>,
        vcs: Arc<dyn VersionControl>,
        llm: Arc<dyn LlmClient>,
        credential: CloneCredential,
    ) -> Self {
        Self {
            config,
            forge,
            vcs,
            llm,
            credential,
        }
    }

    pub fn config(&self) -> &BotRuntimeConfig {
        &self.config
    }

    pub async fn dispatch(&self, event: &WebhookEvent) -> Result<DispatchReport> {
        if let Some(sender) = event.sender() {
            if self.is_own_login(sender).await {
                info!(event = event.kind(), sender, "ignoring event sent by the bot");
                return Ok(DispatchReport::default());
            }
        }
        info!(event = event.kind(), "dispatching");

        match event {
            WebhookEvent::IssueOpened(issue) | WebhookEvent::IssueEdited(issue) => {
                self.refresh_checklist(issue).await
            }
            WebhookEvent::IssueCommentEdited(comment) => {
                self.rerun_checked_repositories(comment).await
            }
            WebhookEvent::PullRequestOpened(pull_request)
            | WebhookEvent::PullRequestSynchronized(pull_request) => {
                self.fan_out_pull_request(pull_request).await
            }
            WebhookEvent::ReviewCommentEdited(comment) => self.rerun_review_comment(comment).await,
            WebhookEvent::Unrecognized { event_name, action } => {
                info!(
                    event_name = %event_name,
                    action = action.as_deref().unwrap_or("none"),
                    "nothing to do for event"
                );
                Ok(DispatchReport::default())
            }
        }
    }

    async fn is_own_login(&self, sender: &str) -> bool {
        let login = match &self.config.bot_login {
            Some(login) => login.clone(),
            None => match self.forge.authenticated_login().await {
                Ok(login) => login,
                Err(error) => {
                    warn!("could not resolve the bot login, self-event guard disabled: {error:#}");
                    return false;
                }
            },
        };
        login.eq_ignore_ascii_case(sender)
    }

    fn application(&self) -> TaskApplication<'_> {
        TaskApplication {
            config: &self.config,
            vcs: self.vcs.as_ref(),
            forge: self.forge.as_ref(),
            llm: &self.llm,
            credential: &self.credential,
        }
    }

    async fn apply_pair(&self, task: &TaskDefinition, repository: &str) -> PairOutcome {
        let result = match RepoRef::parse(repository) {
            Ok(repo) => PairResult::from_publication(
                apply_task_to_repository(&self.application(), task, &repo).await,
            ),
            Err(error) => PairResult::Failed(format!("{error:#}")),
        };
        if let PairResult::Failed(message) = &result {
            warn!(repository, task = %task.id, "task application failed: {message}");
        }
        PairOutcome {
            task_id: task.id.clone(),
            repository: repository.to_string(),
            result,
        }
    }

    async fn refresh_checklist(&self, issue: &IssueEvent) -> Result<DispatchReport> {
        let bot = &self.config.bot_name;
        let (archived, active): (Vec<_>, Vec<_>) = self
            .forge
            .list_installation_repositories()
            .await?
            .into_iter()
            .partition(|repository| repository.archived);
        let repositories = active
            .into_iter()
            .map(|repository| repository.full_name)
            .collect::<Vec<_>>();
        let body = render_checklist_comment(bot, repositories.as_slice(), archived.len());

        let marker = bot_marker(bot);
        let existing = self
            .forge
            .list_issue_comments(&issue.repo, issue.number)
            .await?
            .into_iter()
            .find(|comment| {
                comment
                    .body
                    .as_deref()
                    .is_some_and(|body| body.trim_start().starts_with(&marker))
            });
        match existing {
            Some(comment) => {
                self.forge
                    .update_issue_comment(&issue.repo, comment.id, &body)
                    .await?;
                info!(issue = issue.number, repositories = repositories.len(), "updated checklist");
            }
            None => {
                self.forge
                    .create_issue_comment(&issue.repo, issue.number, &body)
                    .await?;
                info!(issue = issue.number, repositories = repositories.len(), "created checklist");
            }
        }
        Ok(DispatchReport::default())
    }

    async fn rerun_checked_repositories(
        &self,
        comment: &IssueCommentEvent,
    ) -> Result<DispatchReport> {
        let bot = &self.config.bot_name;
        if comment.is_pull_request || !comment.body.trim_start().starts_with(&bot_marker(bot)) {
            info!(comment = comment.comment_id, "comment is not a bot checklist");
            return Ok(DispatchReport::default());
        }
        let checked = find_checked_repositories(&comment.body);
        if checked.is_empty() {
            info!(comment = comment.comment_id, "no repository is checked");
            return Ok(DispatchReport::default());
        }

        let mut report = DispatchReport::default();
        let task = match TaskDefinition::from_issue(
            comment.issue_number,
            &comment.issue_title,
            comment.issue_body.as_deref(),
        ) {
            Ok(task) => task,
            Err(error) => {
                report.precondition_failures.push(format!("{error:#}"));
                return Ok(report);
            }
        };

        for repository in &checked {
            report.outcomes.push(self.apply_pair(&task, repository).await);
        }

        let results = render_pair_results(&report.outcomes);
        let body = uncheck_all(&inject_between_markers(
            &comment.body,
            &results_marker(bot),
            &results,
        ));
        self.forge
            .update_issue_comment(&comment.repo, comment.comment_id, &body)
            .await?;
        Ok(report)
    }

    async fn fan_out_pull_request(&self, pull_request: &PullRequestEvent) -> Result<DispatchReport> {
        let files = self
            .forge
            .list_pull_request_files(&pull_request.repo, pull_request.number)
            .await?;
        let task_dirs = impacted_task_dirs(files.as_slice(), &self.config.tasks_root);
        if task_dirs.is_empty() {
            info!(pull_request = pull_request.number, "no task changed");
            return Ok(DispatchReport::default());
        }

        let mut report = DispatchReport::default();
        let mut attempted = Vec::new();
        for task_dir in &task_dirs {
            if !self.config.workspace.join(task_dir).is_dir() {
                info!(task = %task_dir, "task was removed");
                continue;
            }
            let task = match TaskDefinition::load(&self.config.workspace, task_dir) {
                Ok(task) => task,
                Err(error) => {
                    warn!(task = %task_dir, "{error:#}");
                    report.precondition_failures.push(format!("{error:#}"));
                    continue;
                }
            };
            let Some(repositories) = task.repositories.clone() else {
                report.outcomes.push(PairOutcome {
                    task_id: task.id.clone(),
                    repository: "(none)".to_string(),
                    result: PairResult::Failed(format!(
                        "{} has no repositories file",
                        task.id
                    )),
                });
                continue;
            };
            for repository in &repositories {
                report.outcomes.push(self.apply_pair(&task, repository).await);
                attempted.push(report.outcomes.len() - 1);
            }
        }

        if !attempted.is_empty() {
            let existing = self
                .forge
                .list_review_comments(&pull_request.repo, pull_request.number)
                .await?;
            for index in attempted {
                let outcome = &report.outcomes[index];
                if let Err(error) = self
                    .upsert_review_comment(pull_request, &existing, outcome)
                    .await
                {
                    warn!(
                        task = %outcome.task_id,
                        repository = %outcome.repository,
                        "could not write the review comment: {error:#}"
                    );
                }
            }
        }

        self.upsert_summary_comment(pull_request, &report).await?;
        Ok(report)
    }

    async fn upsert_review_comment(
        &self,
        pull_request: &PullRequestEvent,
        existing: &[ReviewComment],
        outcome: &PairOutcome,
    ) -> Result<()> {
        let bot = &self.config.bot_name;
        let path = format!("{}/{TASK_README}", outcome.task_id);
        let metadata = CommentMetadata {
            repository: outcome.repository.clone(),
            task: Some(outcome.task_id.clone()),
        };
        let body = render_rerun_comment(bot, &metadata, &outcome.result.render())?;

        let current = existing.iter().find(|comment| {
            comment.path.as_deref() == Some(path.as_str())
                && comment
                    .body
                    .as_deref()
                    .and_then(|body| parse_marker_metadata(body, bot).ok().flatten())
                    .is_some_and(|found| found.repository == outcome.repository)
        });
        match current {
            Some(comment) => {
                self.forge
                    .update_review_comment(&pull_request.repo, comment.id, &body)
                    .await?;
            }
            None => {
                self.forge
                    .create_review_comment(
                        &pull_request.repo,
                        pull_request.number,
                        &NewReviewComment::on_file(body, &pull_request.head_sha, path),
                    )
                    .await?;
            }
        }
        Ok(())
    }

    async fn upsert_summary_comment(
        &self,
        pull_request: &PullRequestEvent,
        report: &DispatchReport,
    ) -> Result<()> {
        let bot = &self.config.bot_name;
        let body = render_summary_comment(bot, report);
        let marker = bot_marker(bot);
        let existing = self
            .forge
            .list_issue_comments(&pull_request.repo, pull_request.number)
            .await?
            .into_iter()
            .find(|comment| {
                comment
                    .body
                    .as_deref()
                    .is_some_and(|body| body.trim_start().starts_with(&marker))
            });
        match existing {
            Some(comment) => {
                self.forge
                    .update_issue_comment(&pull_request.repo, comment.id, &body)
                    .await?;
            }
            None => {
                self.forge
                    .create_issue_comment(&pull_request.repo, pull_request.number, &body)
                    .await?;
            }
        }
        info!(
            pull_request = pull_request.number,
            pairs = report.outcomes.len(),
            failed = report.failed_pairs(),
            "posted summary"
        );
        Ok(())
    }

    async fn rerun_review_comment(&self, comment: &ReviewCommentEvent) -> Result<DispatchReport> {
        let bot = &self.config.bot_name;
        if !is_bot_comment(&comment.body, bot) || !is_rerun_requested(&comment.body) {
            info!(comment = comment.comment_id, "re-run not requested");
            return Ok(DispatchReport::default());
        }

        let mut report = DispatchReport::default();
        let metadata = match parse_marker_metadata(&comment.body, bot) {
            Ok(Some(metadata)) => metadata,
            Ok(None) => {
                info!(comment = comment.comment_id, "comment carries no target repository");
                return Ok(report);
            }
            Err(error) => {
                report.precondition_failures.push(format!("{error:#}"));
                return Ok(report);
            }
        };
        let task_dir = metadata.task.clone().or_else(|| {
            comment
                .path
                .as_deref()
                .and_then(|path| path.strip_suffix(&format!("/{TASK_README}")))
                .map(str::to_string)
        });
        let Some(task_dir) = task_dir else {
            report.precondition_failures.push(format!(
                "review comment {} does not name a task",
                comment.comment_id
            ));
            return Ok(report);
        };
        let task = match TaskDefinition::load(&self.config.workspace, &task_dir) {
            Ok(task) => task,
            Err(error) => {
                report.precondition_failures.push(format!("{error:#}"));
                return Ok(report);
            }
        };

        let outcome = self.apply_pair(&task, &metadata.repository).await;
        let body = uncheck_all(&inject_between_markers(
            &comment.body,
            &results_marker(bot),
            &outcome.result.render(),
        ));
        self.forge
            .update_review_comment(&comment.repo, comment.comment_id, &body)
            .await?;
        if let PairResult::Failed(message) = &outcome.result {
            let thread = comment.in_reply_to_id.unwrap_or(comment.comment_id);
            self.forge
                .reply_to_review_comment(
                    &comment.repo,
                    comment.pull_number,
                    thread,
                    &format!("@{} {message}", comment.sender),
                )
                .await?;
        }
        report.outcomes.push(outcome);
        Ok(report)
    }
}
