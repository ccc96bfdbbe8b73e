use std::{path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tanpopo_agent_core::{AgentTool, ToolExecutionResult};
use tanpopo_ai::ToolDefinition;
use thiserror::Error;
use tokio::{process::Command, time::timeout};

use super::ToolPolicy;

const SAFE_EXEC_ENV_VARS: &[&str] = &[
    "PATH", "HOME", "USER", "SHELL", "LANG", "LC_ALL", "LC_CTYPE", "TERM", "TMPDIR", "TMP", "TEMP",
    "TZ", "CI",
];

#[derive(Debug, Error)]
/// Enumerates supported `ExecError` values.
pub enum ExecError {
    #[error("command must be a non-empty string")]
    EmptyCommand,
    #[error("invalid exec arguments: {0}")]
    InvalidArguments(String),
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("command '{command}' timed out after {timeout_ms} ms")]
    Timeout { command: String, timeout_ms: u64 },
}

/// Captured result of one process. A non-zero `exit_code` is data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Typed `exec` arguments, checked before any process is spawned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecArguments {
    pub command: String,
    pub args: Vec<String>,
}

impl ExecArguments {
    pub fn from_value(arguments: &Value) -> Result<Self, ExecError> {
        let command = match arguments.get("command") {
            Some(Value::String(command)) if !command.trim().is_empty() => command.clone(),
            Some(Value::String(_)) | None => return Err(ExecError::EmptyCommand),
            Some(other) => {
                return Err(ExecError::InvalidArguments(format!(
                    "command must be a string but got {other}"
                )))
            }
        };

        let args = match arguments.get("args") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        ExecError::InvalidArguments(format!("args must be strings but got {item}"))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => {
                return Err(ExecError::InvalidArguments(format!(
                    "args must be an array but got {other}"
                )))
            }
        };

        Ok(Self { command, args })
    }
}

/// Runs one program with discrete arguments inside a fixed directory.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    policy: Arc<ToolPolicy>,
}

impl CommandExecutor {
    pub fn new(policy: Arc<ToolPolicy>) -> Self {
        Self { policy }
    }

    /// Arguments are never passed through a shell. Output is redacted and
    /// truncated to the policy limit.
    pub async fn execute(
        &self,
        command: &str,
        args: &[String],
        working_dir: &Path,
    ) -> Result<CommandOutcome, ExecError> {
        if command.trim().is_empty() {
            return Err(ExecError::EmptyCommand);
        }

        let mut builder = Command::new(command);
        builder
            .args(args)
            .current_dir(working_dir)
            .kill_on_drop(true)
            .env_clear();
        for key in SAFE_EXEC_ENV_VARS {
            if let Ok(value) = std::env::var(key) {
                builder.env(key, value);
            }
        }

        let timeout_ms = self.policy.exec_timeout_ms.max(1);
        let output = match timeout(Duration::from_millis(timeout_ms), builder.output()).await {
            Ok(result) => result.map_err(|source| ExecError::Spawn {
                command: command.to_string(),
                source,
            })?,
            Err(_) => {
                return Err(ExecError::Timeout {
                    command: command.to_string(),
                    timeout_ms,
                })
            }
        };

        // A signal-terminated process has no exit code.
        let exit_code = output.status.code().unwrap_or(-1);
        tracing::debug!(command, exit_code, "command finished");
        Ok(CommandOutcome {
            stdout: self.policy.scrub(&String::from_utf8_lossy(&output.stdout)),
            stderr: self.policy.scrub(&String::from_utf8_lossy(&output.stderr)),
            exit_code,
        })
    }
}

/// Exposes [`CommandExecutor`] to the model as `exec`.
pub struct ExecTool {
    executor: CommandExecutor,
    policy: Arc<ToolPolicy>,
}

impl ExecTool {
    pub fn new(policy: Arc<ToolPolicy>) -> Self {
        Self {
            executor: CommandExecutor::new(policy.clone()),
            policy,
        }
    }
}

#[async_trait]
impl AgentTool for ExecTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "exec".to_string(),
            description:
                "Run a shell command in the workspace. Typical Linux commands are available, such as grep or sed."
                    .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "minLength": 1,
                        "description": "The command to run"
                    },
                    "args": {
                        "type": "array",
                        "items": {
                            "type": "string",
                            "description": "The arguments to the command"
                        }
                    }
                },
                "required": ["command"]
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        let parsed = match ExecArguments::from_value(&arguments) {
            Ok(parsed) => parsed,
            Err(error) => return ToolExecutionResult::error(json!({ "error": error.to_string() })),
        };

        tracing::info!(command = %parsed.command, args = ?parsed.args, "exec");
        match self
            .executor
            .execute(&parsed.command, &parsed.args, &self.policy.workspace_root)
            .await
        {
            Ok(outcome) => match serde_json::to_value(&outcome) {
                Ok(payload) => ToolExecutionResult::ok(payload),
                Err(error) => ToolExecutionResult::error(json!({ "error": error.to_string() })),
            },
            Err(error) => ToolExecutionResult::error(json!({
                "stdout": "",
                "stderr": error.to_string(),
                "exitCode": -1,
                "error": error.to_string(),
            })),
        }
    }
}
