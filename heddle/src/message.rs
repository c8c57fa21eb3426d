//! Immutable message records that make up a [`crate::conversation::ConversationState`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Token usage reported by a backend for one message.
///
/// Interaction: late-bound onto an already-appended `Message` via
/// [`Message::with_usage`]; summed by [`crate::conversation::ConversationState::total_tokens`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u32,
    pub output: u32,
    pub total: u32,
}

/// Where a message came from. Drives the targeted-removal rules of
/// [`crate::conversation::ConversationState::remove_by_source`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Source {
    /// A normal message from the user, the model, or a tool.
    Default,
    /// Transient per-iteration guidance from the Aligner; always removed before the
    /// next model call that can see it persist.
    Aligner,
    /// A compaction summary.
    Summary,
    /// A scenario system-prompt header inserted by the `ScenarioResolver`.
    ScenarioHeader,
}

/// An opaque image payload. The engine never inspects bytes; it only counts and
/// drops them per the image-retention rule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// A single tool invocation requested by the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

/// The outcome of executing a [`ToolCall`], referenced by its identifier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub call_id: String,
    pub text: Option<String>,
    pub images: Vec<Image>,
    pub error: Option<String>,
}

/// Discriminates the kind of a [`Message`] and carries kind-specific fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Kind {
    User { content: String },
    Assistant { content: String },
    Reasoning { content: String },
    System { content: String },
    ToolCall(ToolCall),
    ToolResult(ToolOutcome),
}

/// An immutable, append-only unit of conversation history.
///
/// Messages are never mutated in place once appended, with one documented
/// exception: [`crate::compress::Compactor::cleanup_mandatory`] may replace an
/// old message's image list with an empty one, preserving every other field.
/// Token-usage annotation is the other permitted late binding — see
/// [`Message::with_usage`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub kind: Kind,
    pub thinking: Option<String>,
    pub images: Vec<Image>,
    pub timestamp: DateTime<Utc>,
    pub source: Source,
    pub usage: Option<TokenUsage>,
}

impl Message {
    fn new(kind: Kind, source: Source) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            thinking: None,
            images: Vec::new(),
            timestamp: Utc::now(),
            source,
            usage: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(
            Kind::User {
                content: content.into(),
            },
            Source::Default,
        )
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(
            Kind::Assistant {
                content: content.into(),
            },
            Source::Default,
        )
    }

    pub fn reasoning(content: impl Into<String>) -> Self {
        Self::new(
            Kind::Reasoning {
                content: content.into(),
            },
            Source::Default,
        )
    }

    pub fn system(content: impl Into<String>, source: Source) -> Self {
        Self::new(
            Kind::System {
                content: content.into(),
            },
            source,
        )
    }

    pub fn tool_call(id: impl Into<String>, tool_name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self::new(
            Kind::ToolCall(ToolCall {
                id: id.into(),
                tool_name: tool_name.into(),
                arguments,
            }),
            Source::Default,
        )
    }

    pub fn tool_result(call_id: impl Into<String>, text: impl Into<String>, images: Vec<Image>) -> Self {
        Self::new(
            Kind::ToolResult(ToolOutcome {
                call_id: call_id.into(),
                text: Some(text.into()),
                images,
                error: None,
            }),
            Source::Default,
        )
    }

    pub fn tool_error(call_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::new(
            Kind::ToolResult(ToolOutcome {
                call_id: call_id.into(),
                text: None,
                images: Vec::new(),
                error: Some(error.into()),
            }),
            Source::Default,
        )
    }

    /// One-time late binding of reported token usage onto an already-built message.
    /// The spec permits this as the sole exception to "messages are immutable once
    /// appended" beyond image stripping.
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn is_tool_call(&self) -> bool {
        matches!(self.kind, Kind::ToolCall(_))
    }

    pub fn is_tool_result(&self) -> bool {
        matches!(self.kind, Kind::ToolResult(_))
    }

    pub fn tool_call_id(&self) -> Option<&str> {
        match &self.kind {
            Kind::ToolCall(c) => Some(&c.id),
            _ => None,
        }
    }

    pub fn tool_result_call_id(&self) -> Option<&str> {
        match &self.kind {
            Kind::ToolResult(r) => Some(&r.call_id),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            Kind::User { content }
            | Kind::Assistant { content }
            | Kind::Reasoning { content }
            | Kind::System { content } => Some(content),
            Kind::ToolResult(r) => r.text.as_deref(),
            Kind::ToolCall(_) => None,
        }
    }

    /// Input + output tokens reported for this message, or zero if unreported.
    pub fn token_total(&self) -> u64 {
        self.usage
            .map(|u| u.input as u64 + u.output as u64)
            .unwrap_or(0)
    }
}
