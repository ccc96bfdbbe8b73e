//! Completion-service surface for the tanpopo bot.
//!
//! The agent loop talks to a model exclusively through [`LlmClient`]; the Gemini
//! `generateContent` client is the single provider shipped here.
mod google;
pub mod retry;
mod types;

pub use google::{GoogleClient, GoogleConfig};
pub use types::{
    ChatRequest, ChatResponse, ChatUsage, ContentBlock, LlmClient, Message, MessageRole,
    TanpopoAiError, ToolCall, ToolDefinition,
};
