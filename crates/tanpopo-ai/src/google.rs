use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::sleep;

use crate::{
    retry::{
        is_retryable_http_error, new_request_id, parse_retry_after_ms, retry_budget_allows_delay,
        retry_delay, should_retry_status, BASE_BACKOFF_MS,
    },
    ChatRequest, ChatResponse, ChatUsage, ContentBlock, LlmClient, Message, MessageRole,
    TanpopoAiError, ToolDefinition,
};

#[derive(Debug, Clone)]
/// Connection settings for the Gemini `generateContent` endpoint.
pub struct GoogleConfig {
    pub api_base: String,
    pub api_key: String,
    pub request_timeout_ms: u64,
    pub max_retries: usize,
    pub retry_budget_ms: u64,
    pub retry_jitter: bool,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key: String::new(),
            request_timeout_ms: 120_000,
            max_retries: 3,
            retry_budget_ms: 0,
            retry_jitter: true,
        }
    }
}

#[derive(Debug, Clone)]
/// Gemini implementation of [`LlmClient`].
pub struct GoogleClient {
    client: reqwest::Client,
    config: GoogleConfig,
}

impl GoogleClient {
    pub fn new(config: GoogleConfig) -> Result<Self, TanpopoAiError> {
        if config.api_key.trim().is_empty() {
            return Err(TanpopoAiError::MissingApiKey);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()?;

        Ok(Self { client, config })
    }

    fn generate_content_url(&self, model: &str) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        if base.contains(":generateContent") {
            return base.replace("{model}", model);
        }

        format!("{base}/models/{model}:generateContent")
    }
}

#[async_trait]
impl LlmClient for GoogleClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, TanpopoAiError> {
        let body = build_generate_content_body(&request);
        let url = self.generate_content_url(&request.model);
        let started = Instant::now();
        let max_retries = self.config.max_retries;

        for attempt in 0..=max_retries {
            let response = self
                .client
                .post(&url)
                .header("x-tanpopo-request-id", new_request_id())
                .header("x-tanpopo-retry-attempt", attempt.to_string())
                .query(&[("key", self.config.api_key.as_str())])
                .json(&body)
                .send()
                .await;

            let retry_after_ms = match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let raw = response.text().await?;
                        return parse_generate_content_response(&raw);
                    }

                    let retry_after_ms = parse_retry_after_ms(response.headers());
                    let raw = response.text().await?;
                    if attempt >= max_retries || !should_retry_status(status.as_u16()) {
                        return Err(TanpopoAiError::HttpStatus {
                            status: status.as_u16(),
                            body: raw,
                        });
                    }
                    tracing::debug!(
                        status = status.as_u16(),
                        attempt,
                        "retrying gemini request after status"
                    );
                    retry_after_ms
                }
                Err(error) => {
                    if attempt >= max_retries || !is_retryable_http_error(&error) {
                        return Err(TanpopoAiError::Http(error));
                    }
                    tracing::debug!(%error, attempt, "retrying gemini request after transport error");
                    None
                }
            };

            let delay = retry_delay(
                BASE_BACKOFF_MS,
                attempt,
                self.config.retry_jitter,
                retry_after_ms,
            );
            let elapsed_ms = started.elapsed().as_millis() as u64;
            if !retry_budget_allows_delay(
                elapsed_ms,
                delay.as_millis() as u64,
                self.config.retry_budget_ms,
            ) {
                return Err(TanpopoAiError::InvalidResponse(format!(
                    "retry budget of {}ms exhausted after {} attempt(s)",
                    self.config.retry_budget_ms,
                    attempt + 1
                )));
            }
            sleep(delay).await;
        }

        Err(TanpopoAiError::InvalidResponse(
            "request retry loop terminated unexpectedly".to_string(),
        ))
    }
}

fn build_generate_content_body(request: &ChatRequest) -> Value {
    let system = extract_system_text(&request.messages);
    let mut body = json!({
        "contents": to_google_contents(&request.messages),
    });

    if !system.is_empty() {
        body["systemInstruction"] = json!({
            "parts": [{ "text": system }],
        });
    }

    if !request.tools.is_empty() {
        body["tools"] = json!([{
            "functionDeclarations": request.tools.iter().map(to_google_function_declaration).collect::<Vec<_>>()
        }]);
    }

    if request.temperature.is_some() || request.max_tokens.is_some() {
        let mut generation_config = json!({});
        if let Some(temperature) = request.temperature {
            generation_config["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = request.max_tokens {
            generation_config["maxOutputTokens"] = json!(max_tokens);
        }
        body["generationConfig"] = generation_config;
    }

    body
}

fn extract_system_text(messages: &[Message]) -> String {
    messages
        .iter()
        .filter(|message| message.role == MessageRole::System)
        .map(Message::text_content)
        .filter(|text| !text.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn to_google_function_declaration(tool: &ToolDefinition) -> Value {
    json!({
        "name": tool.name,
        "description": tool.description,
        "parameters": sanitize_google_schema(&tool.parameters),
    })
}

// Gemini rejects `additionalProperties` anywhere in a function schema.
fn sanitize_google_schema(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| key.as_str() != "additionalProperties")
                .map(|(key, nested)| (key.clone(), sanitize_google_schema(nested)))
                .collect(),
        ),
        Value::Array(values) => Value::Array(values.iter().map(sanitize_google_schema).collect()),
        _ => value.clone(),
    }
}

fn to_google_contents(messages: &[Message]) -> Value {
    let mut contents: Vec<Value> = Vec::new();
    // Index of the last emitted entry when it holds function responses only.
    let mut open_tool_turn: Option<usize> = None;

    for message in messages {
        match message.role {
            MessageRole::System => {}
            MessageRole::User | MessageRole::Assistant => {
                let parts = to_google_parts(message);
                if parts.is_empty() {
                    continue;
                }
                let role = if message.role == MessageRole::User {
                    "user"
                } else {
                    "model"
                };
                contents.push(json!({ "role": role, "parts": parts }));
                open_tool_turn = None;
            }
            MessageRole::Tool => {
                let part = to_google_function_response(message);
                match open_tool_turn {
                    Some(index) => {
                        if let Some(parts) = contents[index]["parts"].as_array_mut() {
                            parts.push(part);
                        }
                    }
                    None => {
                        contents.push(json!({ "role": "user", "parts": [part] }));
                        open_tool_turn = Some(contents.len() - 1);
                    }
                }
            }
        }
    }

    Value::Array(contents)
}

fn to_google_parts(message: &Message) -> Vec<Value> {
    let allow_tool_calls = message.role == MessageRole::Assistant;
    message
        .content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } if !text.trim().is_empty() => {
                Some(json!({ "text": text }))
            }
            ContentBlock::Text { .. } => None,
            ContentBlock::ToolCall {
                name, arguments, ..
            } if allow_tool_calls => Some(json!({
                "functionCall": {
                    "name": name,
                    "args": arguments,
                }
            })),
            ContentBlock::ToolCall { .. } => None,
        })
        .collect()
}

fn to_google_function_response(message: &Message) -> Value {
    let name = message.tool_name.as_deref().unwrap_or("unknown_tool");
    let text = message.text_content();
    let response = match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(object)) => Value::Object(object),
        _ => json!({ "content": text, "is_error": message.is_error }),
    };
    json!({
        "functionResponse": {
            "name": name,
            "response": response,
        }
    })
}

fn parse_generate_content_response(raw: &str) -> Result<ChatResponse, TanpopoAiError> {
    let parsed: GenerateContentResponse = serde_json::from_str(raw)?;
    let block_reason = parsed.prompt_feedback.and_then(|feedback| {
        feedback
            .block_reason_message
            .or(feedback.block_reason)
            .filter(|reason| !reason.trim().is_empty())
    });
    let usage = parsed
        .usage_metadata
        .map(|usage| ChatUsage {
            input_tokens: usage.prompt_token_count.unwrap_or(0),
            output_tokens: usage.candidates_token_count.unwrap_or(0),
            total_tokens: usage.total_token_count.unwrap_or(0),
        })
        .unwrap_or_default();

    let Some(candidate) = parsed
        .candidates
        .and_then(|candidates| candidates.into_iter().next())
    else {
        // A blocked prompt comes back without candidates; surface it as an empty turn.
        return Ok(ChatResponse {
            message: Message::assistant_blocks(Vec::new()),
            finish_reason: None,
            usage,
            block_reason,
        });
    };

    let parts = candidate
        .content
        .and_then(|content| content.parts)
        .unwrap_or_default();
    let mut blocks = Vec::new();
    for (index, part) in parts.into_iter().enumerate() {
        if let Some(text) = part.text.filter(|text| !text.trim().is_empty()) {
            blocks.push(ContentBlock::Text { text });
        }
        if let Some(function_call) = part.function_call {
            blocks.push(ContentBlock::ToolCall {
                id: function_call
                    .id
                    .unwrap_or_else(|| format!("google_call_{}", index + 1)),
                name: function_call.name,
                arguments: function_call.args.unwrap_or_else(|| json!({})),
            });
        }
    }

    Ok(ChatResponse {
        message: Message::assistant_blocks(blocks),
        finish_reason: candidate.finish_reason,
        usage,
        block_reason,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    candidates: Option<Vec<GenerateContentCandidate>>,
    usage_metadata: Option<GenerateContentUsage>,
    prompt_feedback: Option<GenerateContentPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentCandidate {
    content: Option<GenerateContentContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentContent {
    parts: Option<Vec<GenerateContentPart>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentPart {
    text: Option<String>,
    function_call: Option<GenerateContentFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentFunctionCall {
    id: Option<String>,
    name: String,
    args: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentPromptFeedback {
    block_reason: Option<String>,
    block_reason_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentUsage {
    prompt_token_count: Option<u64>,
    candidates_token_count: Option<u64>,
    total_token_count: Option<u64>,
}
