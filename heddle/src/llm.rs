//! Backend contract: the engine drives any LLM through this trait.
//!
//! Grounded on `loom::llm::LlmClient` (`invoke`/`invoke_with_tools`, optional
//! `model_id`/`last_token_usage`, default streaming methods that fall back to a
//! single chunk) trimmed to what the core engine actually needs: concrete backend
//! adapters (OpenAI, Anthropic, local) are explicit out-of-scope external
//! collaborators per the spec.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::error::AgentError;
use crate::message::{Message, TokenUsage};
use crate::tool::ToolSpec;

#[derive(Error, Debug, Clone)]
pub enum BackendError {
    #[error("backend call failed: {0}")]
    CallFailed(String),
}

impl From<BackendError> for AgentError {
    fn from(e: BackendError) -> Self {
        AgentError::BackendCallFailed(e.to_string())
    }
}

/// Whether, and how strongly, the backend should be nudged to call a tool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolChoiceMode {
    Auto,
    None,
    Required,
}

/// A tool-call request as returned by the backend, before it is turned into a
/// `Message::tool_call`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

/// One backend turn: free text plus zero or more requested tool calls.
#[derive(Clone, Debug, Default)]
pub struct LlmResponse {
    pub text: Option<String>,
    pub reasoning: Option<String>,
    pub tool_calls: Vec<ToolCallDelta>,
    pub usage: Option<TokenUsage>,
}

/// Any backend the engine can drive. Concrete adapters (HTTP clients for a
/// specific provider) live outside this crate.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Runs one turn over `messages`, offering `tools` for the backend to call.
    async fn invoke(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        tool_choice: ToolChoiceMode,
    ) -> Result<LlmResponse, BackendError>;

    /// Runs one turn with thinking-mode requested. `thinking`, if given, receives
    /// streamed reasoning text chunks as they arrive; the engine surfaces each on
    /// the `EventBus` as `Event::ThinkingChunk` and never appends them to state.
    /// Grounded on `loom::llm::LlmClient::invoke_stream`. The default
    /// implementation ignores `thinking` and falls back to a single non-streaming
    /// call, matching the teacher's default-streaming-falls-back-to-one-chunk shape
    /// for backends that don't support it.
    async fn invoke_stream(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        tool_choice: ToolChoiceMode,
        thinking: Option<mpsc::Sender<String>>,
    ) -> Result<LlmResponse, BackendError> {
        let _ = thinking;
        self.invoke(messages, tools, tool_choice).await
    }

    /// Stable identifier used by `crate::context_window`'s family lookup, e.g.
    /// `"gpt-4"`, `"claude-3-5-sonnet"`. `None` when the backend doesn't expose one.
    fn model_id(&self) -> Option<&str> {
        None
    }

    /// Token usage from the most recent `invoke` call, if the backend tracks it
    /// out of band instead of inside `LlmResponse::usage`.
    fn last_token_usage(&self) -> Option<TokenUsage> {
        None
    }

    /// Backend-declared context window size in tokens, if known without consulting
    /// the static fallback table.
    fn context_window(&self) -> Option<u32> {
        None
    }
}

/// Deterministic stub used by tests and by the compactor's summarization call
/// when no real backend is available. Grounded on `loom::llm::mock::MockLlm`,
/// whose source was not present in the retrieved pack; rebuilt fresh here to the
/// same "canned-response queue" shape.
#[derive(Default)]
pub struct MockBackend {
    responses: std::sync::Mutex<std::collections::VecDeque<LlmResponse>>,
}

impl MockBackend {
    pub fn new(responses: Vec<LlmResponse>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.into_iter().collect()),
        }
    }

    pub fn with_text(text: impl Into<String>) -> Self {
        Self::new(vec![LlmResponse {
            text: Some(text.into()),
            ..Default::default()
        }])
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn invoke(
        &self,
        _messages: &[Message],
        _tools: &[ToolSpec],
        _tool_choice: ToolChoiceMode,
    ) -> Result<LlmResponse, BackendError> {
        let mut q = self.responses.lock().unwrap();
        q.pop_front()
            .ok_or_else(|| BackendError::CallFailed("MockBackend exhausted".to_string()))
    }
}

/// Test double that streams a fixed sequence of chunks through the thinking
/// channel before returning its final response.
#[cfg(test)]
struct StreamingMockBackend {
    chunks: Vec<String>,
    final_response: LlmResponse,
}

#[cfg(test)]
#[async_trait]
impl Backend for StreamingMockBackend {
    async fn invoke(
        &self,
        _messages: &[Message],
        _tools: &[ToolSpec],
        _tool_choice: ToolChoiceMode,
    ) -> Result<LlmResponse, BackendError> {
        Ok(self.final_response.clone())
    }

    async fn invoke_stream(
        &self,
        _messages: &[Message],
        _tools: &[ToolSpec],
        _tool_choice: ToolChoiceMode,
        thinking: Option<mpsc::Sender<String>>,
    ) -> Result<LlmResponse, BackendError> {
        if let Some(tx) = thinking {
            for chunk in &self.chunks {
                let _ = tx.send(chunk.clone()).await;
            }
        }
        Ok(self.final_response.clone())
    }
}
