use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::{CloneCredential, CommandOutput, CommandRunner, CommitIdentity, VersionControl};

const EXTRAHEADER_KEY_SUFFIX: &str = ".extraheader=";

/// [`VersionControl`] backed by the `git` binary.
#[derive(Debug, Clone)]
pub struct GitCli<R: CommandRunner> {
    runner: R,
    binary: PathBuf,
    server_url: String,
}

impl<R: CommandRunner> GitCli<R> {
    pub fn new(runner: R, server_url: impl Into<String>) -> Self {
        Self {
            runner,
            binary: PathBuf::from("git"),
            server_url: server_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub(crate) fn clone_args(
        &self,
        repository: &str,
        credential: &CloneCredential,
    ) -> Vec<String> {
        vec![
            "clone".to_string(),
            "--quiet".to_string(),
            "-c".to_string(),
            format!(
                "http.{}/{EXTRAHEADER_KEY_SUFFIX}AUTHORIZATION: {}",
                self.server_url,
                credential.authorization_header()
            ),
            "--depth=1".to_string(),
            format!("{}/{repository}.git", self.server_url),
            ".".to_string(),
        ]
    }

    async fn run_raw(&self, args: &[String], cwd: &Path) -> Result<CommandOutput> {
        let program = self.binary.to_string_lossy();
        debug!(args = %render_args(args), cwd = %cwd.display(), "git");
        self.runner
            .run(&program, args, cwd)
            .await
            .with_context(|| format!("failed to spawn git {}", render_args(args)))
    }

    async fn run_checked(&self, args: &[String], cwd: &Path) -> Result<String> {
        let output = self.run_raw(args, cwd).await?;
        if !output.success() {
            bail!(
                "git {} exited with {}: {}",
                render_args(args),
                output
                    .exit_code
                    .map_or_else(|| "a signal".to_string(), |code| code.to_string()),
                output.stderr.trim()
            );
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl<R: CommandRunner> VersionControl for GitCli<R> {
    #[instrument(skip(self, credential))]
    async fn clone_repository(
        &self,
        repository: &str,
        destination: &Path,
        credential: &CloneCredential,
    ) -> Result<()> {
        tokio::fs::create_dir_all(destination)
            .await
            .with_context(|| format!("failed to create {}", destination.display()))?;
        self.run_checked(&self.clone_args(repository, credential), destination)
            .await
            .with_context(|| format!("failed to clone {repository}"))?;
        Ok(())
    }

    async fn status(&self, dir: &Path) -> Result<String> {
        self.run_checked(&strings(&["status", "--porcelain"]), dir)
            .await
    }

    async fn default_branch(&self, dir: &Path) -> Result<Option<String>> {
        let output = self
            .run_raw(
                &strings(&["rev-parse", "--symbolic-full-name", "origin/HEAD"]),
                dir,
            )
            .await?;
        if !output.success() {
            debug!(stderr = %output.stderr.trim(), "origin/HEAD does not resolve");
            return Ok(None);
        }
        Ok(parse_default_branch(&output.stdout))
    }

    #[instrument(skip(self, title, provenance, identity))]
    async fn commit_and_push(
        &self,
        dir: &Path,
        branch: &str,
        title: &str,
        provenance: &str,
        identity: &CommitIdentity,
    ) -> Result<()> {
        self.run_checked(&strings(&["config", "user.name", &identity.name]), dir)
            .await?;
        self.run_checked(&strings(&["config", "user.email", &identity.email]), dir)
            .await?;
        self.run_checked(&strings(&["add", "."]), dir).await?;
        self.run_checked(&strings(&["commit", "-m", title, "-m", provenance]), dir)
            .await?;
        self.run_checked(
            &strings(&["push", "-f", "origin", &format!("HEAD:{branch}")]),
            dir,
        )
        .await
        .with_context(|| format!("failed to push {branch}"))?;
        Ok(())
    }
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|arg| arg.to_string()).collect()
}

/// `refs/remotes/origin/main` → `main`.
fn parse_default_branch(stdout: &str) -> Option<String> {
    let reference = stdout.trim();
    if reference.is_empty() || reference == "origin/HEAD" {
        return None;
    }
    reference
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// Joins arguments for logs and errors with credential headers elided.
fn render_args(args: &[String]) -> String {
    args.iter()
        .map(|arg| match arg.find(EXTRAHEADER_KEY_SUFFIX) {
            Some(index) => format!("{}[REDACTED]", &arg[..index + EXTRAHEADER_KEY_SUFFIX.len()]),
            None => arg.clone(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
