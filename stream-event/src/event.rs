//! Protocol-level event types (protocol_spec §4: type + payload).
//! State-carrying variants use `serde_json::Value`; the bridge in heddle serializes `S` into that.

use serde::Serialize;
use serde_json::Value;

/// Protocol event: wire shape for one stream event (type + payload).
/// Matches protocol_spec §4.2; envelope (session_id, node_id, event_id) is applied separately.
///
/// Trimmed to the variants a ReAct-style engine actually emits (iteration
/// boundaries, text chunks, usage, checkpoints) plus `Custom` as the escape
/// hatch for everything else. The teacher's compiled-graph-only variants
/// (tree-of-thought expand/evaluate/backtrack, graph-of-thought plan/node/expand)
/// have no counterpart here: this engine's loop is a direct state machine, not a
/// compiled graph (see the engine's own module doc).
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProtocolEvent {
    NodeEnter { id: String },
    NodeExit {
        id: String,
        result: Value,
    },
    MessageChunk { content: String, id: String },
    Usage {
        prompt_tokens: u32,
        completion_tokens: u32,
        total_tokens: u32,
    },
    Custom { value: Value },
    Checkpoint {
        checkpoint_id: String,
        timestamp: String,
        step: i64,
        state: Value,
        thread_id: Option<String>,
        checkpoint_ns: Option<String>,
    },
}

impl ProtocolEvent {
    /// Serializes this event to a JSON object (type + payload only; no envelope).
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
