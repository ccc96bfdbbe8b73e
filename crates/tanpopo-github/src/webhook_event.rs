//! Closed classification of the webhook payloads the bot reacts to.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::RepoRef;

#[derive(Debug, Clone, Deserialize)]
struct PayloadUser {
    login: String,
}

#[derive(Debug, Clone, Deserialize)]
struct PayloadRepository {
    full_name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct PayloadIssue {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    pull_request: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct PayloadComment {
    id: u64,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    in_reply_to_id: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct PayloadHead {
    #[serde(rename = "ref")]
    ref_name: String,
    sha: String,
}

#[derive(Debug, Clone, Deserialize)]
struct PayloadPullRequest {
    number: u64,
    head: PayloadHead,
}

#[derive(Debug, Clone, Deserialize)]
struct IssuesPayload {
    repository: PayloadRepository,
    issue: PayloadIssue,
    sender: PayloadUser,
}

#[derive(Debug, Clone, Deserialize)]
struct IssueCommentPayload {
    repository: PayloadRepository,
    issue: PayloadIssue,
    comment: PayloadComment,
    sender: PayloadUser,
}

#[derive(Debug, Clone, Deserialize)]
struct PullRequestPayload {
    repository: PayloadRepository,
    pull_request: PayloadPullRequest,
    sender: PayloadUser,
}

#[derive(Debug, Clone, Deserialize)]
struct ReviewCommentPayload {
    repository: PayloadRepository,
    pull_request: PayloadPullRequest,
    comment: PayloadComment,
    sender: PayloadUser,
}

/// An issue that defines an ad-hoc task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueEvent {
    pub repo: RepoRef,
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub sender: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueCommentEvent {
    pub repo: RepoRef,
    pub issue_number: u64,
    pub issue_title: String,
    pub issue_body: Option<String>,
    pub is_pull_request: bool,
    pub comment_id: u64,
    pub body: String,
    pub sender: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestEvent {
    pub repo: RepoRef,
    pub number: u64,
    pub head_ref: String,
    pub head_sha: String,
    pub sender: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewCommentEvent {
    pub repo: RepoRef,
    pub pull_number: u64,
    pub head_sha: String,
    pub comment_id: u64,
    pub in_reply_to_id: Option<u64>,
    pub path: Option<String>,
    pub body: String,
    pub sender: String,
}

/// Every event shape the bot distinguishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    IssueOpened(IssueEvent),
    IssueEdited(IssueEvent),
    IssueCommentEdited(IssueCommentEvent),
    PullRequestOpened(PullRequestEvent),
    PullRequestSynchronized(PullRequestEvent),
    ReviewCommentEdited(ReviewCommentEvent),
    Unrecognized {
        event_name: String,
        action: Option<String>,
    },
}

impl WebhookEvent {
    /// Maps `(event_name, payload.action)` onto a variant.
    ///
    /// Unknown pairs become [`WebhookEvent::Unrecognized`]; a known pair whose
    /// payload lacks required fields is an error.
    pub fn classify(event_name: &str, payload: &Value) -> Result<Self> {
        let action = payload
            .get("action")
            .and_then(Value::as_str)
            .map(str::to_string);

        let event = match (event_name, action.as_deref()) {
            ("issues", Some(action @ ("opened" | "edited"))) => {
                let payload: IssuesPayload = decode(event_name, payload)?;
                let issue = IssueEvent {
                    repo: RepoRef::parse(&payload.repository.full_name)?,
                    number: payload.issue.number,
                    title: payload.issue.title,
                    body: payload.issue.body,
                    sender: payload.sender.login,
                };
                if action == "opened" {
                    Self::IssueOpened(issue)
                } else {
                    Self::IssueEdited(issue)
                }
            }
            ("issue_comment", Some("edited")) => {
                let payload: IssueCommentPayload = decode(event_name, payload)?;
                Self::IssueCommentEdited(IssueCommentEvent {
                    repo: RepoRef::parse(&payload.repository.full_name)?,
                    issue_number: payload.issue.number,
                    issue_title: payload.issue.title,
                    issue_body: payload.issue.body,
                    is_pull_request: payload.issue.pull_request.is_some(),
                    comment_id: payload.comment.id,
                    body: payload.comment.body.unwrap_or_default(),
                    sender: payload.sender.login,
                })
            }
            ("pull_request", Some(action @ ("opened" | "synchronize"))) => {
                let payload: PullRequestPayload = decode(event_name, payload)?;
                let pull_request = PullRequestEvent {
                    repo: RepoRef::parse(&payload.repository.full_name)?,
                    number: payload.pull_request.number,
                    head_ref: payload.pull_request.head.ref_name,
                    head_sha: payload.pull_request.head.sha,
                    sender: payload.sender.login,
                };
                if action == "opened" {
                    Self::PullRequestOpened(pull_request)
                } else {
                    Self::PullRequestSynchronized(pull_request)
                }
            }
            ("pull_request_review_comment", Some("edited")) => {
                let payload: ReviewCommentPayload = decode(event_name, payload)?;
                Self::ReviewCommentEdited(ReviewCommentEvent {
                    repo: RepoRef::parse(&payload.repository.full_name)?,
                    pull_number: payload.pull_request.number,
                    head_sha: payload.pull_request.head.sha,
                    comment_id: payload.comment.id,
                    in_reply_to_id: payload.comment.in_reply_to_id,
                    path: payload.comment.path,
                    body: payload.comment.body.unwrap_or_default(),
                    sender: payload.sender.login,
                })
            }
            _ => Self::Unrecognized {
                event_name: event_name.to_string(),
                action: action.clone(),
            },
        };
        Ok(event)
    }

    /// Login of whoever triggered the event.
    pub fn sender(&self) -> Option<&str> {
        match self {
            Self::IssueOpened(event) | Self::IssueEdited(event) => Some(&event.sender),
            Self::IssueCommentEdited(event) => Some(&event.sender),
            Self::PullRequestOpened(event) | Self::PullRequestSynchronized(event) => {
                Some(&event.sender)
            }
            Self::ReviewCommentEdited(event) => Some(&event.sender),
            Self::Unrecognized { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::IssueOpened(_) => "issue_opened",
            Self::IssueEdited(_) => "issue_edited",
            Self::IssueCommentEdited(_) => "issue_comment_edited",
            Self::PullRequestOpened(_) => "pull_request_opened",
            Self::PullRequestSynchronized(_) => "pull_request_synchronized",
            Self::ReviewCommentEdited(_) => "review_comment_edited",
            Self::Unrecognized { .. } => "unrecognized",
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(event_name: &str, payload: &Value) -> Result<T> {
    T::deserialize(payload).with_context(|| format!("malformed {event_name} payload"))
}
