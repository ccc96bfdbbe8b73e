use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use serde_json::{json, Value};
use tanpopo_agent_core::{Agent, AgentTool, ToolExecutionResult};
use tanpopo_ai::ToolDefinition;

mod exec_tool;

pub use exec_tool::{CommandExecutor, CommandOutcome, ExecArguments, ExecError, ExecTool};

pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 64 * 1024;
pub const DEFAULT_EXEC_TIMEOUT_MS: u64 = 600_000;
const TRUNCATION_NOTICE: &str = "<output truncated>";
const REDACTION: &str = "[REDACTED]";

/// Limits shared by every tool bound to one workspace.
#[derive(Debug, Clone)]
pub struct ToolPolicy {
    pub workspace_root: PathBuf,
    pub exec_timeout_ms: u64,
    pub max_output_bytes: usize,
    /// Literal values scrubbed from any tool output in addition to sensitive
    /// environment variables.
    pub redacted_values: Vec<String>,
}

impl ToolPolicy {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            exec_timeout_ms: DEFAULT_EXEC_TIMEOUT_MS,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            redacted_values: Vec::new(),
        }
    }

    pub fn with_redacted_value(mut self, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.trim().is_empty() {
            self.redacted_values.push(value);
        }
        self
    }

    pub(crate) fn scrub(&self, text: &str) -> String {
        let redacted = redact_secrets(text, &self.redacted_values);
        truncate_bytes(&redacted, self.max_output_bytes)
    }
}

/// Registers `exec` and `readFile` against `policy.workspace_root`.
pub fn register_workspace_tools(agent: &mut Agent, policy: Arc<ToolPolicy>) {
    agent.register_tool(ExecTool::new(policy.clone()));
    agent.register_tool(ReadFileTool::new(policy));
}

/// Reads a file (or an inclusive 0-based line range of it) under the workspace.
pub struct ReadFileTool {
    policy: Arc<ToolPolicy>,
}

impl ReadFileTool {
    pub fn new(policy: Arc<ToolPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl AgentTool for ReadFileTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "readFile".to_string(),
            description:
                "Reads the content of a file in the workspace. Can be used to get context of the source code."
                    .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "filePath": {
                        "type": "string",
                        "minLength": 1,
                        "description": "The relative path to the file from the workspace root."
                    },
                    "startLine": {
                        "type": "number",
                        "description": "Optional: The 0-based line number to start reading from."
                    },
                    "endLine": {
                        "type": "number",
                        "description": "Optional: The 0-based line number to end reading at (inclusive)."
                    }
                },
                "required": ["filePath"]
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        let file_path = match required_string(&arguments, "filePath") {
            Ok(file_path) => file_path,
            Err(error) => return ToolExecutionResult::error(json!({ "error": error })),
        };
        let start_line = optional_line(&arguments, "startLine");
        let end_line = optional_line(&arguments, "endLine");

        let resolved = match resolve_workspace_path(&file_path, &self.policy.workspace_root) {
            Ok(resolved) => resolved,
            Err(error) => return ToolExecutionResult::error(json!({ "error": error })),
        };

        match tokio::fs::read_to_string(&resolved).await {
            Ok(content) => {
                let content = slice_lines(&content, start_line, end_line);
                ToolExecutionResult::ok(json!({ "content": self.policy.scrub(&content) }))
            }
            Err(error) => {
                tracing::debug!(path = %resolved.display(), %error, "readFile failed");
                ToolExecutionResult::error(json!({
                    "error": format!("failed to read '{file_path}': {error}")
                }))
            }
        }
    }
}

/// Resolves `user_path` against `workspace_root` and rejects anything whose
/// canonical form escapes the root (`..` segments, absolute paths, symlinks).
pub(crate) fn resolve_workspace_path(
    user_path: &str,
    workspace_root: &Path,
) -> Result<PathBuf, String> {
    let input = PathBuf::from(user_path);
    let absolute = if input.is_absolute() {
        input
    } else {
        workspace_root.join(input)
    };

    let canonical_root = canonicalize_best_effort(workspace_root).map_err(|error| {
        format!(
            "invalid workspace root '{}': {error}",
            workspace_root.display()
        )
    })?;
    let canonical = canonicalize_best_effort(&absolute).map_err(|error| {
        format!(
            "failed to canonicalize path '{}': {error}",
            absolute.display()
        )
    })?;

    if !canonical.starts_with(&canonical_root) {
        return Err(format!("path '{user_path}' is outside the workspace"));
    }
    Ok(canonical)
}

/// Canonicalizes the longest existing ancestor and re-appends the missing tail.
/// `..` in the missing tail is resolved lexically so it cannot climb out.
fn canonicalize_best_effort(path: &Path) -> std::io::Result<PathBuf> {
    if path.exists() {
        return std::fs::canonicalize(path);
    }

    let mut missing_suffix: Vec<OsString> = Vec::new();
    let mut cursor = path;

    while !cursor.exists() {
        match cursor.file_name() {
            Some(file_name) => missing_suffix.push(file_name.to_os_string()),
            None if cursor.ends_with("..") => missing_suffix.push(OsString::from("..")),
            None => {}
        }

        cursor = match cursor.parent() {
            Some(parent) => parent,
            None => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no existing ancestor for path",
                ));
            }
        };
    }

    let mut canonical = std::fs::canonicalize(cursor)?;
    for component in missing_suffix.iter().rev() {
        if component == ".." {
            canonical.pop();
        } else {
            canonical.push(component);
        }
    }

    Ok(canonical)
}

/// Both bounds → `[start, end]`; only start → from start; only end → up to end.
/// Any other combination returns the whole text.
pub(crate) fn slice_lines(content: &str, start_line: Option<i64>, end_line: Option<i64>) -> String {
    let lines = || content.split('\n');
    match (start_line, end_line) {
        (Some(start), Some(end)) if start >= 0 && end >= start => lines()
            .skip(start as usize)
            .take((end - start + 1) as usize)
            .collect::<Vec<_>>()
            .join("\n"),
        (Some(start), _) if start >= 0 => lines()
            .skip(start as usize)
            .collect::<Vec<_>>()
            .join("\n"),
        (_, Some(end)) if end >= 0 => lines()
            .take(end as usize + 1)
            .collect::<Vec<_>>()
            .join("\n"),
        _ => content.to_string(),
    }
}

fn optional_line(arguments: &Value, key: &str) -> Option<i64> {
    let value = arguments.get(key)?;
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|line| line.floor() as i64))
}

fn required_string(arguments: &Value, key: &str) -> Result<String, String> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .map(|value| value.to_string())
        .ok_or_else(|| format!("missing required string argument '{key}'"))
}

pub(crate) fn truncate_bytes(value: &str, limit: usize) -> String {
    if value.len() <= limit {
        return value.to_string();
    }

    if limit == 0 {
        return TRUNCATION_NOTICE.to_string();
    }

    let mut end = limit.min(value.len());
    while end > 0 && !value.is_char_boundary(end) {
        end -= 1;
    }

    let mut output = value[..end].to_string();
    output.push('\n');
    output.push_str(TRUNCATION_NOTICE);
    output
}

pub(crate) fn redact_secrets(text: &str, extra_values: &[String]) -> String {
    let mut redacted = text.to_string();

    for value in extra_values {
        if value.trim().len() >= 6 {
            redacted = redacted.replace(value.as_str(), REDACTION);
        }
    }

    for (name, value) in std::env::vars() {
        let upper = name.to_ascii_uppercase();
        let is_sensitive = upper.ends_with("_KEY")
            || upper.ends_with("_TOKEN")
            || upper.ends_with("_SECRET")
            || upper.ends_with("_PASSWORD");
        if !is_sensitive || value.trim().len() < 6 {
            continue;
        }

        redacted = redacted.replace(&value, REDACTION);
    }

    redacted
}
