use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::RepoRef;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GithubUser {
    pub login: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
/// Public struct `GithubRepository` used across tanpopo components.
pub struct GithubRepository {
    pub full_name: String,
    #[serde(default)]
    pub archived: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct IssueComment {
    pub id: u64,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub user: Option<GithubUser>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReviewComment {
    pub id: u64,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub in_reply_to_id: Option<u64>,
    #[serde(default)]
    pub user: Option<GithubUser>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PullRequestRef {
    #[serde(rename = "ref")]
    pub ref_name: String,
    #[serde(default)]
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PullRequest {
    pub number: u64,
    pub html_url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub head: PullRequestRef,
    #[serde(default)]
    pub base: Option<PullRequestRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPullRequest {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
}

/// A file-level review comment anchored to `path` at `commit_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewReviewComment {
    pub body: String,
    pub commit_id: String,
    pub path: String,
    pub subject_type: String,
}

impl NewReviewComment {
    pub fn on_file(
        body: impl Into<String>,
        commit_id: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            body: body.into(),
            commit_id: commit_id.into(),
            path: path.into(),
            subject_type: "file".to_string(),
        }
    }
}

/// Forge operations the bot consumes. Every listing is fully drained.
#[async_trait]
pub trait Forge: Send + Sync {
    async fn list_pull_request_files(&self, repo: &RepoRef, number: u64) -> Result<Vec<String>>;

    async fn list_issue_comments(&self, repo: &RepoRef, number: u64) -> Result<Vec<IssueComment>>;

    async fn create_issue_comment(
        &self,
        repo: &RepoRef,
        number: u64,
        body: &str,
    ) -> Result<IssueComment>;

    async fn update_issue_comment(
        &self,
        repo: &RepoRef,
        comment_id: u64,
        body: &str,
    ) -> Result<IssueComment>;

    async fn list_review_comments(
        &self,
        repo: &RepoRef,
        number: u64,
    ) -> Result<Vec<ReviewComment>>;

    async fn create_review_comment(
        &self,
        repo: &RepoRef,
        number: u64,
        comment: &NewReviewComment,
    ) -> Result<ReviewComment>;

    async fn update_review_comment(
        &self,
        repo: &RepoRef,
        comment_id: u64,
        body: &str,
    ) -> Result<ReviewComment>;

    async fn reply_to_review_comment(
        &self,
        repo: &RepoRef,
        number: u64,
        comment_id: u64,
        body: &str,
    ) -> Result<ReviewComment>;

    /// Open pull requests whose head is `{repo.owner}:{branch}`.
    async fn list_open_pull_requests_by_head(
        &self,
        repo: &RepoRef,
        branch: &str,
    ) -> Result<Vec<PullRequest>>;

    async fn create_pull_request(
        &self,
        repo: &RepoRef,
        pull_request: &NewPullRequest,
    ) -> Result<PullRequest>;

    async fn update_pull_request(
        &self,
        repo: &RepoRef,
        number: u64,
        title: &str,
        body: &str,
    ) -> Result<PullRequest>;

    async fn request_reviewers(
        &self,
        repo: &RepoRef,
        number: u64,
        reviewers: &[String],
    ) -> Result<()>;

    async fn list_installation_repositories(&self) -> Result<Vec<GithubRepository>>;

    async fn authenticated_login(&self) -> Result<String>;
}
