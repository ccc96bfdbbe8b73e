use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tanpopo_ai::retry::{
    is_retryable_http_error, parse_retry_after_ms, retry_delay, should_retry_status,
};

use crate::forge::{
    Forge, GithubRepository, IssueComment, NewPullRequest, NewReviewComment, PullRequest,
    ReviewComment,
};
use crate::RepoRef;

const PER_PAGE: usize = 100;
const ERROR_BODY_MAX_CHARS: usize = 800;

/// Connection settings for [`GithubApiClient`].
#[derive(Clone)]
pub struct GithubApiConfig {
    pub api_base: String,
    pub token: String,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
}

impl Default for GithubApiConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            token: String::new(),
            request_timeout_ms: 30_000,
            retry_max_attempts: 4,
            retry_base_delay_ms: 500,
        }
    }
}

#[derive(Clone)]
/// REST client for the forge operations the bot needs.
pub struct GithubApiClient {
    http: reqwest::Client,
    api_base: String,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl GithubApiClient {
    pub fn new(config: GithubApiConfig) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("tanpopo-bot"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            reqwest::header::HeaderValue::from_static("2022-11-28"),
        );
        let auth_header = format!("Bearer {}", config.token.trim());
        let mut auth_value = reqwest::header::HeaderValue::from_str(&auth_header)
            .context("invalid github authorization header")?;
        auth_value.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth_value);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()
            .context("failed to create github api client")?;
        Ok(Self {
            http: client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            retry_max_attempts: config.retry_max_attempts.max(1),
            retry_base_delay_ms: config.retry_base_delay_ms.max(1),
        })
    }

    fn repo_url(&self, repo: &RepoRef, suffix: &str) -> String {
        format!(
            "{}/repos/{}/{}/{suffix}",
            self.api_base, repo.owner, repo.name
        )
    }

    /// Drains a page-numbered listing until a short page is returned.
    async fn paginate<T>(
        &self,
        operation: &str,
        url: String,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let mut page = 1_u32;
        let mut rows = Vec::new();
        loop {
            let page_value = page.to_string();
            let chunk: Vec<T> = self
                .request_json(operation, || {
                    self.http.get(&url).query(query).query(&[
                        ("per_page", PER_PAGE.to_string().as_str()),
                        ("page", page_value.as_str()),
                    ])
                })
                .await?;
            let chunk_len = chunk.len();
            rows.extend(chunk);
            if chunk_len < PER_PAGE {
                break;
            }
            page = page.saturating_add(1);
        }
        Ok(rows)
    }

    async fn request_json<T, F>(&self, operation: &str, mut request_builder: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let response = request_builder()
                .header(
                    "x-tanpopo-retry-attempt",
                    attempt.saturating_sub(1).to_string(),
                )
                .send()
                .await;
            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let parsed = response
                            .json::<T>()
                            .await
                            .with_context(|| format!("failed to decode github {operation}"))?;
                        return Ok(parsed);
                    }

                    let retry_after = parse_retry_after_ms(response.headers());
                    let rate_limited = is_rate_limited(status.as_u16(), response.headers());
                    let body = response.text().await.unwrap_or_default();
                    if attempt < self.retry_max_attempts
                        && (should_retry_status(status.as_u16()) || rate_limited)
                    {
                        let delay = retry_delay(
                            self.retry_base_delay_ms,
                            attempt - 1,
                            true,
                            retry_after,
                        );
                        tracing::warn!(
                            operation,
                            status = status.as_u16(),
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "retrying github api request"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    bail!(
                        "github api {operation} failed with status {}: {}",
                        status.as_u16(),
                        truncate_for_error(&body, ERROR_BODY_MAX_CHARS)
                    );
                }
                Err(error) => {
                    if attempt < self.retry_max_attempts && is_retryable_http_error(&error) {
                        tokio::time::sleep(retry_delay(
                            self.retry_base_delay_ms,
                            attempt - 1,
                            true,
                            None,
                        ))
                        .await;
                        continue;
                    }
                    return Err(error)
                        .with_context(|| format!("github api {operation} request failed"));
                }
            }
        }
    }

    /// Like [`Self::request_json`] for endpoints whose body is irrelevant.
    async fn request_ignored<F>(&self, operation: &str, request_builder: F) -> Result<()>
    where
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let _: serde_json::Value = self.request_json(operation, request_builder).await?;
        Ok(())
    }
}

/// Secondary rate limits surface as 403 with an exhausted quota.
fn is_rate_limited(status: u16, headers: &reqwest::header::HeaderMap) -> bool {
    status == 403
        && headers
            .get("x-ratelimit-remaining")
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.trim() == "0")
}

fn truncate_for_error(body: &str, max_chars: usize) -> String {
    if body.chars().count() <= max_chars {
        return body.to_string();
    }
    let truncated = body.chars().take(max_chars).collect::<String>();
    format!("{truncated}...")
}

#[async_trait]
impl Forge for GithubApiClient {
    async fn list_pull_request_files(&self, repo: &RepoRef, number: u64) -> Result<Vec<String>> {
        #[derive(Deserialize)]
        struct PullRequestFile {
            filename: String,
        }

        let files: Vec<PullRequestFile> = self
            .paginate(
                "list pull request files",
                self.repo_url(repo, &format!("pulls/{number}/files")),
                &[],
            )
            .await?;
        Ok(files.into_iter().map(|file| file.filename).collect())
    }

    async fn list_issue_comments(&self, repo: &RepoRef, number: u64) -> Result<Vec<IssueComment>> {
        self.paginate(
            "list issue comments",
            self.repo_url(repo, &format!("issues/{number}/comments")),
            &[],
        )
        .await
    }

    async fn create_issue_comment(
        &self,
        repo: &RepoRef,
        number: u64,
        body: &str,
    ) -> Result<IssueComment> {
        let payload = json!({ "body": body });
        let url = self.repo_url(repo, &format!("issues/{number}/comments"));
        self.request_json("create issue comment", || {
            self.http.post(&url).json(&payload)
        })
        .await
    }

    async fn update_issue_comment(
        &self,
        repo: &RepoRef,
        comment_id: u64,
        body: &str,
    ) -> Result<IssueComment> {
        let payload = json!({ "body": body });
        let url = self.repo_url(repo, &format!("issues/comments/{comment_id}"));
        self.request_json("update issue comment", || {
            self.http.patch(&url).json(&payload)
        })
        .await
    }

    async fn list_review_comments(
        &self,
        repo: &RepoRef,
        number: u64,
    ) -> Result<Vec<ReviewComment>> {
        self.paginate(
            "list review comments",
            self.repo_url(repo, &format!("pulls/{number}/comments")),
            &[],
        )
        .await
    }

    async fn create_review_comment(
        &self,
        repo: &RepoRef,
        number: u64,
        comment: &NewReviewComment,
    ) -> Result<ReviewComment> {
        let url = self.repo_url(repo, &format!("pulls/{number}/comments"));
        self.request_json("create review comment", || {
            self.http.post(&url).json(comment)
        })
        .await
    }

    async fn update_review_comment(
        &self,
        repo: &RepoRef,
        comment_id: u64,
        body: &str,
    ) -> Result<ReviewComment> {
        let payload = json!({ "body": body });
        let url = self.repo_url(repo, &format!("pulls/comments/{comment_id}"));
        self.request_json("update review comment", || {
            self.http.patch(&url).json(&payload)
        })
        .await
    }

    async fn reply_to_review_comment(
        &self,
        repo: &RepoRef,
        number: u64,
        comment_id: u64,
        body: &str,
    ) -> Result<ReviewComment> {
        let payload = json!({ "body": body });
        let url = self.repo_url(
            repo,
            &format!("pulls/{number}/comments/{comment_id}/replies"),
        );
        self.request_json("reply to review comment", || {
            self.http.post(&url).json(&payload)
        })
        .await
    }

    async fn list_open_pull_requests_by_head(
        &self,
        repo: &RepoRef,
        branch: &str,
    ) -> Result<Vec<PullRequest>> {
        let head = format!("{}:{branch}", repo.owner);
        self.paginate(
            "list pull requests",
            self.repo_url(repo, "pulls"),
            &[("state", "open"), ("head", head.as_str())],
        )
        .await
    }

    async fn create_pull_request(
        &self,
        repo: &RepoRef,
        pull_request: &NewPullRequest,
    ) -> Result<PullRequest> {
        let url = self.repo_url(repo, "pulls");
        self.request_json("create pull request", || {
            self.http.post(&url).json(pull_request)
        })
        .await
    }

    async fn update_pull_request(
        &self,
        repo: &RepoRef,
        number: u64,
        title: &str,
        body: &str,
    ) -> Result<PullRequest> {
        let payload = json!({ "title": title, "body": body });
        let url = self.repo_url(repo, &format!("pulls/{number}"));
        self.request_json("update pull request", || {
            self.http.patch(&url).json(&payload)
        })
        .await
    }

    async fn request_reviewers(
        &self,
        repo: &RepoRef,
        number: u64,
        reviewers: &[String],
    ) -> Result<()> {
        let payload = json!({ "reviewers": reviewers });
        let url = self.repo_url(repo, &format!("pulls/{number}/requested_reviewers"));
        self.request_ignored("request reviewers", || {
            self.http.post(&url).json(&payload)
        })
        .await
    }

    async fn list_installation_repositories(&self) -> Result<Vec<GithubRepository>> {
        #[derive(Deserialize)]
        struct InstallationRepositories {
            repositories: Vec<GithubRepository>,
        }

        let url = format!("{}/installation/repositories", self.api_base);
        let mut page = 1_u32;
        let mut rows = Vec::new();
        loop {
            let page_value = page.to_string();
            let chunk: InstallationRepositories = self
                .request_json("list installation repositories", || {
                    self.http.get(&url).query(&[
                        ("per_page", PER_PAGE.to_string().as_str()),
                        ("page", page_value.as_str()),
                    ])
                })
                .await?;
            let chunk_len = chunk.repositories.len();
            rows.extend(chunk.repositories);
            if chunk_len < PER_PAGE {
                break;
            }
            page = page.saturating_add(1);
        }
        Ok(rows)
    }

    async fn authenticated_login(&self) -> Result<String> {
        #[derive(Deserialize)]
        struct Viewer {
            login: String,
        }

        let url = format!("{}/user", self.api_base);
        let viewer: Viewer = self
            .request_json("resolve bot login", || self.http.get(&url))
            .await?;
        Ok(viewer.login)
    }
}
