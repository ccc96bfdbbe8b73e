//! In-memory collaborators shared by the runtime tests.

use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use tanpopo_agent_core::AgentConfig;
use tanpopo_ai::{
    ChatRequest, ChatResponse, ChatUsage, ContentBlock, LlmClient, Message, TanpopoAiError,
    ToolCall,
};
use tanpopo_github::{
    Forge, GithubRepository, IssueComment, NewPullRequest, NewReviewComment, PullRequest,
    PullRequestRef, RepoRef, ReviewComment,
};
use tanpopo_vcs::{CloneCredential, CommitIdentity, VersionControl};
use tokio::sync::Mutex as AsyncMutex;

use crate::BotRuntimeConfig;

pub(crate) const BOT: &str = "tanpopo-bot";
pub(crate) const BOT_LOGIN: &str = "tanpopo-bot[bot]";

pub(crate) fn runtime_config(temp: &Path) -> BotRuntimeConfig {
    let runner_temp = temp.join("runner-temp");
    let workspace = temp.join("workspace");
    BotRuntimeConfig {
        actor: "alice".to_string(),
        run_url: "https://github.com/octo/tasks/actions/runs/1".to_string(),
        workspace,
        runner_temp,
        tasks_root: "tasks".to_string(),
        bot_name: BOT.to_string(),
        bot_login: Some(BOT_LOGIN.to_string()),
        default_branch: "main".to_string(),
        commit_identity: CommitIdentity::default(),
        agent: AgentConfig {
            time_budget_ms: Some(60_000),
            ..AgentConfig::default()
        },
        exec_timeout_ms: 10_000,
        max_output_bytes: 4_096,
    }
}

/// Writes `{workspace}/{task_dir}` with a README and optional script and
/// repositories files.
pub(crate) fn write_task(
    workspace: &Path,
    task_dir: &str,
    readme: &str,
    script: Option<&str>,
    repositories: Option<&str>,
) -> PathBuf {
    let dir = workspace.join(task_dir);
    std::fs::create_dir_all(&dir).expect("task dir");
    std::fs::write(dir.join("README.md"), readme).expect("readme");
    if let Some(script) = script {
        std::fs::write(dir.join("task.sh"), script).expect("script");
    }
    if let Some(repositories) = repositories {
        std::fs::write(dir.join("repositories"), repositories).expect("repositories");
    }
    dir
}

pub(crate) fn text_response(text: &str) -> ChatResponse {
    ChatResponse {
        message: Message::assistant_text(text),
        finish_reason: Some("STOP".to_string()),
        usage: ChatUsage::default(),
        block_reason: None,
    }
}

pub(crate) fn tool_call_response(name: &str, arguments: Value) -> ChatResponse {
    ChatResponse {
        message: Message::assistant_blocks(vec![ContentBlock::tool_call(ToolCall {
            id: format!("call-{name}"),
            name: name.to_string(),
            arguments,
        })]),
        finish_reason: Some("STOP".to_string()),
        usage: ChatUsage::default(),
        block_reason: None,
    }
}

/// Pops queued responses in order and records every request.
pub(crate) struct ScriptedLlm {
    responses: AsyncMutex<VecDeque<ChatResponse>>,
    requests: AsyncMutex<Vec<ChatRequest>>,
}

impl ScriptedLlm {
    pub(crate) fn new(responses: Vec<ChatResponse>) -> Self {
        Self {
            responses: AsyncMutex::new(VecDeque::from(responses)),
            requests: AsyncMutex::new(Vec::new()),
        }
    }

    pub(crate) async fn request_count(&self) -> usize {
        self.requests.lock().await.len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, TanpopoAiError> {
        self.requests.lock().await.push(request);
        self.responses
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| TanpopoAiError::InvalidResponse("scripted queue exhausted".into()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum VcsCall {
    Clone { repository: String },
    Status,
    DefaultBranch,
    CommitAndPush { branch: String, title: String },
}

/// Records calls; `status` is either fixed or derived from the files present
/// in the clone directory.
pub(crate) struct FakeVcs {
    status: Option<String>,
    default_branch: Option<String>,
    failing_clones: Vec<String>,
    calls: Mutex<Vec<VcsCall>>,
}

impl FakeVcs {
    pub(crate) fn with_status(status: &str) -> Self {
        Self {
            status: Some(status.to_string()),
            default_branch: Some("main".to_string()),
            failing_clones: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn listing_files() -> Self {
        Self {
            status: None,
            ..Self::with_status("")
        }
    }

    pub(crate) fn without_default_branch(mut self) -> Self {
        self.default_branch = None;
        self
    }

    pub(crate) fn failing_clone(mut self, repository: &str) -> Self {
        self.failing_clones.push(repository.to_string());
        self
    }

    pub(crate) fn calls(&self) -> Vec<VcsCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn record(&self, call: VcsCall) {
        self.calls.lock().expect("calls lock").push(call);
    }
}

#[async_trait]
impl VersionControl for FakeVcs {
    async fn clone_repository(
        &self,
        repository: &str,
        destination: &Path,
        _credential: &CloneCredential,
    ) -> Result<()> {
        self.record(VcsCall::Clone {
            repository: repository.to_string(),
        });
        if self.failing_clones.iter().any(|failing| failing == repository) {
            bail!("git clone exited with 128: repository {repository} not found");
        }
        std::fs::create_dir_all(destination)?;
        Ok(())
    }

    async fn status(&self, dir: &Path) -> Result<String> {
        self.record(VcsCall::Status);
        if let Some(status) = &self.status {
            return Ok(status.clone());
        }
        let mut names = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        names.sort();
        Ok(names.iter().map(|name| format!("?? {name}\n")).collect())
    }

    async fn default_branch(&self, _dir: &Path) -> Result<Option<String>> {
        self.record(VcsCall::DefaultBranch);
        Ok(self.default_branch.clone())
    }

    async fn commit_and_push(
        &self,
        _dir: &Path,
        branch: &str,
        title: &str,
        _provenance: &str,
        _identity: &CommitIdentity,
    ) -> Result<()> {
        self.record(VcsCall::CommitAndPush {
            branch: branch.to_string(),
            title: title.to_string(),
        });
        Ok(())
    }
}

#[derive(Default)]
struct ForgeState {
    next_comment_id: u64,
    pull_request_files: Vec<String>,
    installation_repositories: Vec<GithubRepository>,
    login: Option<String>,
    issue_comments: Vec<(u64, IssueComment)>,
    review_comments: Vec<(u64, ReviewComment)>,
    replies: Vec<(u64, String)>,
    pull_requests: Vec<(RepoRef, PullRequest)>,
    reviewer_requests: Vec<(u64, String)>,
    mutations: usize,
}

impl ForgeState {
    fn comment_id(&mut self) -> u64 {
        self.next_comment_id += 1;
        100 + self.next_comment_id
    }
}

/// In-memory forge keyed the way the REST API is.
#[derive(Default)]
pub(crate) struct FakeForge {
    state: Mutex<ForgeState>,
}

impl FakeForge {
    pub(crate) fn with_pull_request_files(self, files: &[&str]) -> Self {
        self.lock().pull_request_files = files.iter().map(|file| file.to_string()).collect();
        self
    }

    pub(crate) fn with_installation_repositories(self, repositories: &[&str]) -> Self {
        self.lock()
            .installation_repositories
            .extend(repositories.iter().map(|repo| GithubRepository {
                full_name: repo.to_string(),
                archived: false,
            }));
        self
    }

    pub(crate) fn with_archived_repositories(self, repositories: &[&str]) -> Self {
        self.lock()
            .installation_repositories
            .extend(repositories.iter().map(|repo| GithubRepository {
                full_name: repo.to_string(),
                archived: true,
            }));
        self
    }

    pub(crate) fn with_login(self, login: &str) -> Self {
        self.lock().login = Some(login.to_string());
        self
    }

    pub(crate) fn insert_issue_comment(&self, issue: u64, body: &str) -> u64 {
        let mut state = self.lock();
        let id = state.comment_id();
        state.issue_comments.push((
            issue,
            IssueComment {
                id,
                body: Some(body.to_string()),
                html_url: None,
                user: None,
            },
        ));
        id
    }

    pub(crate) fn insert_review_comment(&self, pull: u64, path: &str, body: &str) -> u64 {
        let mut state = self.lock();
        let id = state.comment_id();
        state.review_comments.push((
            pull,
            ReviewComment {
                id,
                body: Some(body.to_string()),
                path: Some(path.to_string()),
                html_url: None,
                in_reply_to_id: None,
                user: None,
            },
        ));
        id
    }

    pub(crate) fn issue_comments(&self) -> Vec<(u64, IssueComment)> {
        self.lock().issue_comments.clone()
    }

    pub(crate) fn review_comments(&self) -> Vec<(u64, ReviewComment)> {
        self.lock().review_comments.clone()
    }

    pub(crate) fn replies(&self) -> Vec<(u64, String)> {
        self.lock().replies.clone()
    }

    pub(crate) fn pull_requests(&self) -> Vec<(RepoRef, PullRequest)> {
        self.lock().pull_requests.clone()
    }

    pub(crate) fn reviewer_requests(&self) -> Vec<(u64, String)> {
        self.lock().reviewer_requests.clone()
    }

    pub(crate) fn mutation_count(&self) -> usize {
        self.lock().mutations
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ForgeState> {
        self.state.lock().expect("forge lock")
    }
}

#[async_trait]
impl Forge for FakeForge {
    async fn list_pull_request_files(&self, _repo: &RepoRef, _number: u64) -> Result<Vec<String>> {
        Ok(self.lock().pull_request_files.clone())
    }

    async fn list_issue_comments(&self, _repo: &RepoRef, number: u64) -> Result<Vec<IssueComment>> {
        Ok(self
            .lock()
            .issue_comments
            .iter()
            .filter(|(issue, _)| *issue == number)
            .map(|(_, comment)| comment.clone())
            .collect())
    }

    async fn create_issue_comment(
        &self,
        repo: &RepoRef,
        number: u64,
        body: &str,
    ) -> Result<IssueComment> {
        let mut state = self.lock();
        state.mutations += 1;
        let id = state.comment_id();
        let comment = IssueComment {
            id,
            body: Some(body.to_string()),
            html_url: Some(format!("https://github.com/{repo}/issues/{number}#issuecomment-{id}")),
            user: None,
        };
        state.issue_comments.push((number, comment.clone()));
        Ok(comment)
    }

    async fn update_issue_comment(
        &self,
        _repo: &RepoRef,
        comment_id: u64,
        body: &str,
    ) -> Result<IssueComment> {
        let mut state = self.lock();
        state.mutations += 1;
        let (_, comment) = state
            .issue_comments
            .iter_mut()
            .find(|(_, comment)| comment.id == comment_id)
            .ok_or_else(|| anyhow!("issue comment {comment_id} not found"))?;
        comment.body = Some(body.to_string());
        Ok(comment.clone())
    }

    async fn list_review_comments(
        &self,
        _repo: &RepoRef,
        number: u64,
    ) -> Result<Vec<ReviewComment>> {
        Ok(self
            .lock()
            .review_comments
            .iter()
            .filter(|(pull, _)| *pull == number)
            .map(|(_, comment)| comment.clone())
            .collect())
    }

    async fn create_review_comment(
        &self,
        _repo: &RepoRef,
        number: u64,
        comment: &NewReviewComment,
    ) -> Result<ReviewComment> {
        let mut state = self.lock();
        state.mutations += 1;
        let id = state.comment_id();
        let created = ReviewComment {
            id,
            body: Some(comment.body.clone()),
            path: Some(comment.path.clone()),
            html_url: None,
            in_reply_to_id: None,
            user: None,
        };
        state.review_comments.push((number, created.clone()));
        Ok(created)
    }

    async fn update_review_comment(
        &self,
        _repo: &RepoRef,
        comment_id: u64,
        body: &str,
    ) -> Result<ReviewComment> {
        let mut state = self.lock();
        state.mutations += 1;
        let (_, comment) = state
            .review_comments
            .iter_mut()
            .find(|(_, comment)| comment.id == comment_id)
            .ok_or_else(|| anyhow!("review comment {comment_id} not found"))?;
        comment.body = Some(body.to_string());
        Ok(comment.clone())
    }

    async fn reply_to_review_comment(
        &self,
        _repo: &RepoRef,
        _number: u64,
        comment_id: u64,
        body: &str,
    ) -> Result<ReviewComment> {
        let mut state = self.lock();
        state.mutations += 1;
        state.replies.push((comment_id, body.to_string()));
        let id = state.comment_id();
        Ok(ReviewComment {
            id,
            body: Some(body.to_string()),
            path: None,
            html_url: None,
            in_reply_to_id: Some(comment_id),
            user: None,
        })
    }

    async fn list_open_pull_requests_by_head(
        &self,
        repo: &RepoRef,
        branch: &str,
    ) -> Result<Vec<PullRequest>> {
        Ok(self
            .lock()
            .pull_requests
            .iter()
            .filter(|(owner, pull)| owner == repo && pull.head.ref_name == branch)
            .map(|(_, pull)| pull.clone())
            .collect())
    }

    async fn create_pull_request(
        &self,
        repo: &RepoRef,
        pull_request: &NewPullRequest,
    ) -> Result<PullRequest> {
        let mut state = self.lock();
        state.mutations += 1;
        let number = state.pull_requests.len() as u64 + 1;
        let created = PullRequest {
            number,
            html_url: format!("https://github.com/{repo}/pull/{number}"),
            title: pull_request.title.clone(),
            body: Some(pull_request.body.clone()),
            head: PullRequestRef {
                ref_name: pull_request.head.clone(),
                sha: String::new(),
            },
            base: Some(PullRequestRef {
                ref_name: pull_request.base.clone(),
                sha: String::new(),
            }),
        };
        state.pull_requests.push((repo.clone(), created.clone()));
        Ok(created)
    }

    async fn update_pull_request(
        &self,
        repo: &RepoRef,
        number: u64,
        title: &str,
        body: &str,
    ) -> Result<PullRequest> {
        let mut state = self.lock();
        state.mutations += 1;
        let (_, pull) = state
            .pull_requests
            .iter_mut()
            .find(|(owner, pull)| owner == repo && pull.number == number)
            .ok_or_else(|| anyhow!("pull request {repo}#{number} not found"))?;
        pull.title = title.to_string();
        pull.body = Some(body.to_string());
        Ok(pull.clone())
    }

    async fn request_reviewers(
        &self,
        _repo: &RepoRef,
        number: u64,
        reviewers: &[String],
    ) -> Result<()> {
        let mut state = self.lock();
        state.mutations += 1;
        for reviewer in reviewers {
            state.reviewer_requests.push((number, reviewer.clone()));
        }
        Ok(())
    }

    async fn list_installation_repositories(&self) -> Result<Vec<GithubRepository>> {
        Ok(self.lock().installation_repositories.clone())
    }

    async fn authenticated_login(&self) -> Result<String> {
        self.lock()
            .login
            .clone()
            .ok_or_else(|| anyhow!("no authenticated identity"))
    }
}
