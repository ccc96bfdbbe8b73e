use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::parse_repository_list;

pub const TASK_README: &str = "README.md";
pub const TASK_SCRIPT: &str = "task.sh";
pub const REPOSITORIES_FILE: &str = "repositories";

/// A unit of repeatable work, immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDefinition {
    /// Stable identifier, e.g. `tasks/node-22` or `issues/7`. Drives the
    /// head branch name.
    pub id: String,
    /// Directory holding the task files; `None` for issue-backed tasks.
    pub dir: Option<PathBuf>,
    pub title: String,
    pub instruction: String,
    pub script: Option<PathBuf>,
    pub repositories: Option<Vec<String>>,
}

impl TaskDefinition {
    /// Loads `{base}/{task_dir}`. A README without a `# ` heading is rejected.
    pub fn load(base: &Path, task_dir: &str) -> Result<Self> {
        let task_dir = task_dir.trim_end_matches('/');
        let dir = base.join(task_dir);
        let readme_path = dir.join(TASK_README);
        let instruction = std::fs::read_to_string(&readme_path)
            .with_context(|| format!("failed to read {}", readme_path.display()))?;
        let title = parse_task_title(&instruction)
            .with_context(|| format!("task title not found in {}", readme_path.display()))?;

        let script_path = dir.join(TASK_SCRIPT);
        let script = script_path.is_file().then_some(script_path);

        let repositories_path = dir.join(REPOSITORIES_FILE);
        let repositories = if repositories_path.is_file() {
            let raw = std::fs::read_to_string(&repositories_path)
                .with_context(|| format!("failed to read {}", repositories_path.display()))?;
            Some(parse_repository_list(&raw))
        } else {
            None
        };

        Ok(Self {
            id: task_dir.to_string(),
            dir: Some(dir),
            title,
            instruction,
            script,
            repositories,
        })
    }

    /// Ad-hoc task described by an issue.
    pub fn from_issue(number: u64, title: &str, body: Option<&str>) -> Result<Self> {
        let title = title.trim();
        if title.is_empty() {
            bail!("issue #{number} has no title");
        }
        Ok(Self {
            id: format!("issues/{number}"),
            dir: None,
            title: title.to_string(),
            instruction: body.unwrap_or_default().to_string(),
            script: None,
            repositories: None,
        })
    }

    /// Where the agent is told the instruction lives.
    pub fn instruction_location(&self, workspace: &Path) -> String {
        match &self.dir {
            Some(_) => format!("{}/{}/{TASK_README}", workspace.display(), self.id),
            None => format!("the body of {}", self.id.replace("issues/", "issue #")),
        }
    }
}

/// Text of the first `# ` heading line.
pub fn parse_task_title(readme: &str) -> Option<String> {
    readme
        .lines()
        .filter_map(|line| line.trim_end().strip_prefix("# "))
        .map(str::trim)
        .find(|title| !title.is_empty())
        .map(str::to_string)
}
