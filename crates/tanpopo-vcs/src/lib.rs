//! Version-control adapter used to clone, inspect and publish a workspace.
//!
//! The `git` binary is driven through a [`CommandRunner`] seam so the adapter
//! can be exercised without a network or a real repository.

use std::{path::Path, sync::LazyLock};

use anyhow::Result;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use regex::Regex;

mod command_runner;
mod git_cli;

pub use command_runner::{CommandOutput, CommandRunner, ProcessCommandRunner};
pub use git_cli::GitCli;

pub const BRANCH_PREFIX: &str = "bot--";

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^A-Za-z0-9_]").expect("non-word character class is a valid regex")
});

/// Short-lived bearer credential scoped to a single clone.
#[derive(Clone)]
pub struct CloneCredential {
    token: String,
}

impl CloneCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Value of the `AUTHORIZATION` extra header.
    pub fn authorization_header(&self) -> String {
        format!("basic {}", basic_auth_value(&self.token))
    }

    /// The raw token and its derived header value; both must be masked.
    pub fn secret_values(&self) -> [String; 2] {
        [self.token.clone(), basic_auth_value(&self.token)]
    }
}

impl std::fmt::Debug for CloneCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CloneCredential([REDACTED])")
    }
}

/// Base64 of `x-access-token:{token}`. Callers mask it before first use.
pub fn basic_auth_value(token: &str) -> String {
    STANDARD.encode(format!("x-access-token:{token}"))
}

/// Committer identity written to the clone's local config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
}

impl Default for CommitIdentity {
    fn default() -> Self {
        Self {
            name: "github-actions[bot]".to_string(),
            email: "41898282+github-actions[bot]@users.noreply.github.com".to_string(),
        }
    }
}

/// Deterministic head branch for a task: `bot--` plus the task id with every
/// non-word character replaced by `-`.
///
/// # Examples
///
/// ```
/// use tanpopo_vcs::branch_name_for_task;
///
/// assert_eq!(branch_name_for_task("tasks/node-22"), "bot--tasks-node-22");
/// ```
pub fn branch_name_for_task(task_id: &str) -> String {
    format!("{BRANCH_PREFIX}{}", NON_WORD.replace_all(task_id, "-"))
}

/// Capability interface over the version-control CLI.
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Shallow, quiet clone of `repository` (`owner/name`) into `destination`.
    async fn clone_repository(
        &self,
        repository: &str,
        destination: &Path,
        credential: &CloneCredential,
    ) -> Result<()>;

    /// Porcelain status; empty iff the tree is clean.
    async fn status(&self, dir: &Path) -> Result<String>;

    /// Remote default branch, or `None` when `origin/HEAD` does not resolve.
    async fn default_branch(&self, dir: &Path) -> Result<Option<String>>;

    /// Stages everything, commits `title` + `provenance` and force-pushes to
    /// `origin/<branch>`.
    async fn commit_and_push(
        &self,
        dir: &Path,
        branch: &str,
        title: &str,
        provenance: &str,
        identity: &CommitIdentity,
    ) -> Result<()>;
}
