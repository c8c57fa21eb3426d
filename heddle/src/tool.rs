//! Tool contract: the engine calls tools by name through this trait; the concrete
//! bodies (filesystem, shell, web, todo, MCP bridges) are external collaborators.
//!
//! Grounded on `loom::tools::Tool` (`name`/`spec`/`call`) and
//! `loom::tool_source::ToolCallContext`, trimmed to what the spec's tool contract
//! (§6) names: `getTools`, `callTool`, `requiresApproval`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::Message;

/// Descriptor for a tool, as surfaced to the backend when building a turn.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
}

/// Structured outcome of a tool call. `error` and `text` are mutually exclusive in
/// practice; the engine converts whichever is present into the matching
/// `ToolOutcome` fields of a `ToolResult` message.
#[derive(Clone, Debug, Default)]
pub struct ToolCallContent {
    pub text: Option<String>,
    pub images: Vec<crate::message::Image>,
    pub error: Option<String>,
}

impl ToolCallContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            images: Vec::new(),
            error: None,
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum ToolSourceError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
}

/// Per-call context available to tools during execution.
///
/// Trimmed from `loom::tool_source::ToolCallContext`: the streaming writer and
/// multi-tenant `user_id` are dropped (no wire format or multi-tenancy in scope),
/// leaving the two fields a tool actually needs to stay within its scenario's
/// working directory and see recent turns.
#[derive(Debug, Clone, Default)]
pub struct ToolCallContext {
    pub recent_messages: Vec<Message>,
    pub working_dir: Option<std::path::PathBuf>,
}

impl ToolCallContext {
    pub fn new(recent_messages: Vec<Message>, working_dir: Option<std::path::PathBuf>) -> Self {
        Self {
            recent_messages,
            working_dir,
        }
    }
}

/// A single tool callable by name. Implementations live outside the core
/// (filesystem, bash, web, todo, MCP bridges); this crate only defines the seam.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn spec(&self) -> ToolSpec;
    /// Whether this tool requires explicit user approval before executing
    /// (writes, destructive operations). Checked by the engine before dispatch.
    fn requires_approval(&self) -> bool {
        false
    }
    async fn call(
        &self,
        args: serde_json::Value,
        ctx: &ToolCallContext,
    ) -> Result<ToolCallContent, ToolSourceError>;
}
