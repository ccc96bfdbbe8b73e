//! GitHub forge client, webhook event model and bot comment helpers.

pub mod bot_comment;
mod forge;
mod github_api_client;
mod repo_ref;
pub mod webhook_event;

pub use forge::{
    Forge, GithubRepository, GithubUser, IssueComment, NewPullRequest, NewReviewComment,
    PullRequest, PullRequestRef, ReviewComment,
};
pub use github_api_client::{GithubApiClient, GithubApiConfig};
pub use repo_ref::RepoRef;
pub use webhook_event::WebhookEvent;
