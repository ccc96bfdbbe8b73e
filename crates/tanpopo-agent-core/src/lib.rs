//! Tool-calling agent loop that drives a completion service toward a terminal outcome.
use std::{
    collections::BTreeMap,
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use serde_json::Value;
use tanpopo_ai::{ChatRequest, LlmClient, Message, TanpopoAiError, ToolDefinition};
use thiserror::Error;

mod runtime_tool_bridge;
mod terminal_outcome;

pub use runtime_tool_bridge::validate_tool_arguments;
pub use terminal_outcome::{parse_terminal_outcome, TerminalOutcome, ERROR_SENTINEL};

use runtime_tool_bridge::execute_tool_call;

/// Settings for one agent loop invocation.
///
/// # Examples
///
/// ```
/// use tanpopo_agent_core::AgentConfig;
///
/// let config = AgentConfig {
///     max_turns: 12,
///     ..AgentConfig::default()
/// };
///
/// assert_eq!(config.max_turns, 12);
/// ```
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub model: String,
    pub system_prompt: String,
    pub max_turns: usize,
    /// Wall-clock budget for the whole loop; `None` disables it.
    pub time_budget_ms: Option<u64>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_turns: 50,
            time_budget_ms: Some(30 * 60 * 1_000),
            temperature: None,
            max_tokens: None,
        }
    }
}

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a software engineer.
If any command failed, stop the task and return a message with the prefix of \"ERROR:\".
Use the 'readFile' function to read source files if you need to inspect their content to fix issues.
Use the 'exec' function to run shell commands, for example, to run linters or build tools.";

/// Result payload produced by a tool, sent back to the model verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolExecutionResult {
    pub content: Value,
    pub is_error: bool,
}

impl ToolExecutionResult {
    pub fn ok(content: Value) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    pub fn error(content: Value) -> Self {
        Self {
            content,
            is_error: true,
        }
    }

    pub fn as_text(&self) -> String {
        match &self.content {
            Value::String(text) => text.clone(),
            other => serde_json::to_string(other).unwrap_or_else(|_| other.to_string()),
        }
    }
}

/// A function the model may call.
#[async_trait]
pub trait AgentTool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    /// Rejects malformed arguments before anything runs.
    fn validate(&self, arguments: &Value) -> Result<(), ToolArgumentError> {
        validate_tool_arguments(&self.definition(), arguments)
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
/// Enumerates supported `ToolArgumentError` values.
pub enum ToolArgumentError {
    #[error("invalid JSON schema for '{tool}': {message}")]
    Schema { tool: String, message: String },
    #[error("invalid arguments for '{tool}': {message}")]
    Invalid { tool: String, message: String },
}

#[derive(Debug, Error)]
/// Enumerates supported `AgentError` values.
pub enum AgentError {
    #[error(transparent)]
    Ai(#[from] TanpopoAiError),
    #[error(transparent)]
    InvalidToolArguments(#[from] ToolArgumentError),
    #[error("{0}")]
    TaskFailed(String),
    #[error("no content from the model: {}", reason.as_deref().unwrap_or("no reason given"))]
    EmptyResponse { reason: Option<String> },
    #[error("agent exceeded max turns ({0})")]
    MaxTurnsExceeded(usize),
    #[error("agent exceeded its time budget ({elapsed_ms}ms of {budget_ms}ms)")]
    TimeBudgetExceeded { elapsed_ms: u64, budget_ms: u64 },
}

/// Successful end of a loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentOutcome {
    pub message: String,
    pub turns: usize,
    pub tool_calls: usize,
}

/// Owns one conversation with the completion service.
pub struct Agent {
    client: Arc<dyn LlmClient>,
    config: AgentConfig,
    tools: BTreeMap<String, Arc<dyn AgentTool>>,
    messages: Vec<Message>,
}

impl Agent {
    pub fn new(client: Arc<dyn LlmClient>, config: AgentConfig) -> Self {
        let messages = if config.system_prompt.trim().is_empty() {
            Vec::new()
        } else {
            vec![Message::system(config.system_prompt.clone())]
        };
        Self {
            client,
            config,
            tools: BTreeMap::new(),
            messages,
        }
    }

    pub fn register_tool<T>(&mut self, tool: T)
    where
        T: AgentTool + 'static,
    {
        let tool: Arc<dyn AgentTool> = Arc::new(tool);
        self.tools.insert(tool.definition().name, tool);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|tool| tool.definition()).collect()
    }

    fn remaining_budget(&self, started: Instant) -> Result<Option<Duration>, AgentError> {
        let Some(budget_ms) = self.config.time_budget_ms.filter(|budget| *budget > 0) else {
            return Ok(None);
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;
        if elapsed_ms >= budget_ms {
            return Err(AgentError::TimeBudgetExceeded {
                elapsed_ms,
                budget_ms,
            });
        }
        Ok(Some(Duration::from_millis(budget_ms - elapsed_ms)))
    }

    /// Drives `future` to completion unless the loop budget runs out first.
    async fn within_budget<T, F>(&self, started: Instant, future: F) -> Result<T, AgentError>
    where
        F: Future<Output = Result<T, AgentError>>,
    {
        let Some(remaining) = self.remaining_budget(started)? else {
            return future.await;
        };
        match tokio::time::timeout(remaining, future).await {
            Ok(result) => result,
            Err(_) => Err(AgentError::TimeBudgetExceeded {
                elapsed_ms: started.elapsed().as_millis() as u64,
                budget_ms: self.config.time_budget_ms.unwrap_or_default(),
            }),
        }
    }

    /// Appends `seed` and loops until the model answers with text.
    ///
    /// Tool calls within a turn run in the order given. The working tree is
    /// never rolled back, so effects of earlier tool calls survive a failure.
    pub async fn run(&mut self, seed: Message) -> Result<AgentOutcome, AgentError> {
        self.messages.push(seed);
        let started = Instant::now();
        let mut executed_tool_calls = 0usize;

        for turn in 1..=self.config.max_turns {
            self.remaining_budget(started)?;
            tracing::info!(turn, "thinking");

            let request = ChatRequest {
                model: self.config.model.clone(),
                messages: self.messages.clone(),
                tools: self.tool_definitions(),
                max_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
            };
            let response = self
                .within_budget(started, async {
                    Ok::<_, AgentError>(self.client.complete(request).await?)
                })
                .await?;

            let assistant = response.message;
            let tool_calls = assistant.tool_calls();
            if !tool_calls.is_empty() {
                self.messages.push(assistant);
                for call in tool_calls {
                    tracing::info!(turn, tool = %call.name, arguments = %call.arguments, "tool call");
                    let registered = self.tools.get(&call.name).cloned();
                    let result = self
                        .within_budget(started, async {
                            Ok::<_, AgentError>(execute_tool_call(&call, registered).await?)
                        })
                        .await?;
                    executed_tool_calls += 1;
                    self.messages.push(Message::tool_result(
                        call.id,
                        call.name,
                        result.as_text(),
                        result.is_error,
                    ));
                }
                continue;
            }

            let text = assistant.text_content();
            if text.trim().is_empty() {
                return Err(AgentError::EmptyResponse {
                    reason: response.block_reason.or(response.finish_reason),
                });
            }
            self.messages.push(assistant);
            tracing::info!(turn, "model: {}", text.trim());

            return match parse_terminal_outcome(&text) {
                TerminalOutcome::Succeeded(message) => Ok(AgentOutcome {
                    message,
                    turns: turn,
                    tool_calls: executed_tool_calls,
                }),
                TerminalOutcome::Failed(message) => Err(AgentError::TaskFailed(message)),
            };
        }

        Err(AgentError::MaxTurnsExceeded(self.config.max_turns))
    }
}
