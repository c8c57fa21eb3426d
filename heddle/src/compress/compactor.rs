//! Mandatory cleanup and threshold-triggered compaction (§4.4).
//!
//! Grounded on `loom::compress` (this module's home in the teacher) and on
//! `loom::state::ReActState`'s notion of a "safe" truncation point that never
//! splits a tool call from its result. The prune pass is an additive supplement
//! grounded on the teacher's `CompactionConfig.prune*` fields, which have no
//! counterpart requirement in the base spec but do not remove or alter any
//! spec-mandated behavior.

use std::collections::HashSet;

use crate::conversation::ConversationState;
use crate::error::AgentError;
use crate::llm::{Backend, ToolChoiceMode};
use crate::message::{Kind, Message, Source};

use super::config::CompactionConfig;

/// Images are kept only on the most recent `IMAGE_RETENTION_WINDOW` messages;
/// older messages have their image list cleared during mandatory cleanup.
const IMAGE_RETENTION_WINDOW: usize = 10;

/// Overflow threshold as a percentage of the resolved context window, above
/// which `compact_if_needed` summarizes the oldest safe prefix.
const COMPACTION_THRESHOLD_PCT: u64 = 70;

pub struct Compactor {
    config: CompactionConfig,
}

impl Compactor {
    pub fn new(config: CompactionConfig) -> Self {
        Self { config }
    }

    /// Unconditional per-iteration cleanup: drop Summary-then-Aligner sourced
    /// messages, then strip images from everything but the most recent window.
    /// Runs before every model call regardless of `config.auto`.
    pub fn cleanup_mandatory(&self, state: &mut ConversationState) -> Result<(), AgentError> {
        state.remove_by_source(Source::Summary)?;
        state.remove_by_source(Source::Aligner)?;

        let len = state.messages().len();
        if len > IMAGE_RETENTION_WINDOW {
            let cutoff = len - IMAGE_RETENTION_WINDOW;
            let stripped: Vec<Message> = state
                .messages()
                .iter()
                .enumerate()
                .map(|(i, m)| {
                    if i < cutoff && !m.images.is_empty() {
                        let mut m = m.clone();
                        m.images.clear();
                        m
                    } else {
                        m.clone()
                    }
                })
                .collect();
            state.replace_messages(stripped);
        }
        Ok(())
    }

    /// Summarizes the oldest safe prefix via `backend` when `state`'s token total
    /// exceeds `COMPACTION_THRESHOLD_PCT` of `context_window`. No-op when
    /// `config.auto` is false, `context_window` is zero, or below threshold.
    /// Returns whether compaction actually ran.
    pub async fn compact_if_needed(
        &self,
        state: &mut ConversationState,
        backend: &dyn Backend,
        context_window: u32,
    ) -> Result<bool, AgentError> {
        if !self.config.auto || context_window == 0 {
            return Ok(false);
        }

        let used = state.total_tokens();
        let threshold = (context_window as u64) * COMPACTION_THRESHOLD_PCT / 100;
        if used < threshold {
            return Ok(false);
        }

        let messages = state.messages();
        let len = messages.len();
        let desired_split = len.saturating_sub(self.config.compact_keep_recent);
        if desired_split == 0 {
            return Ok(false);
        }

        let split = match find_safe_split(messages, desired_split) {
            Some(i) if i > 0 => i,
            _ => return Ok(false), // no safe split point; leave state untouched
        };

        let prefix = &messages[..split];
        let suffix = &messages[split..];

        let summary_text = self.summarize(prefix, backend).await;

        let mut rebuilt = Vec::with_capacity(1 + suffix.len());
        rebuilt.push(Message::system(summary_text, Source::Summary));
        rebuilt.extend(
            suffix
                .iter()
                .filter(|m| m.source != Source::Aligner)
                .cloned(),
        );
        state.replace_messages(rebuilt);
        Ok(true)
    }

    /// Asks the backend for a prose summary of `prefix`; falls back to a
    /// deterministic structural summary if the call fails, so compaction never
    /// errors out the engine's turn.
    async fn summarize(&self, prefix: &[Message], backend: &dyn Backend) -> String {
        let mut request = prefix.to_vec();
        request.push(Message::user(
            "Summarize the conversation above concisely, preserving any facts, decisions, \
             and outstanding tasks a continuation would need.",
        ));

        match backend.invoke(&request, &[], ToolChoiceMode::None).await {
            Ok(response) if response.text.as_deref().map(|t| !t.trim().is_empty()).unwrap_or(false) => {
                format!("[Summary of {} earlier messages] {}", prefix.len(), response.text.unwrap())
            }
            _ => structural_fallback_summary(prefix),
        }
    }

    /// Additive prune pass: when `config.prune` is set, clears tool-result text
    /// on messages older than the most recent `prune_keep_tokens` worth of tool
    /// output, provided at least `prune_minimum` tokens would be reclaimed.
    /// Never removes a message or touches pair integrity — only its text.
    pub fn prune_if_needed(&self, state: &mut ConversationState) -> usize {
        if !self.config.prune {
            return 0;
        }

        let messages = state.messages();
        let mut kept_tokens: u64 = 0;
        let mut prune_from = messages.len();
        for (i, m) in messages.iter().enumerate().rev() {
            if matches!(m.kind, Kind::ToolResult(_)) {
                let len = m.text().map(|t| t.len() as u64 / 4).unwrap_or(0);
                if kept_tokens + len > self.config.prune_keep_tokens as u64 {
                    prune_from = i;
                    break;
                }
                kept_tokens += len;
            }
        }

        if prune_from >= messages.len() {
            return 0;
        }

        let mut reclaimed: u64 = 0;
        let mut pruned = messages.to_vec();
        for m in pruned[..prune_from].iter_mut() {
            if let Kind::ToolResult(outcome) = &mut m.kind {
                if let Some(text) = outcome.text.take() {
                    reclaimed += text.len() as u64 / 4;
                    outcome.text = Some("[pruned]".to_string());
                }
            }
        }

        if let Some(minimum) = self.config.prune_minimum {
            if reclaimed < minimum as u64 {
                return 0;
            }
        }

        state.replace_messages(pruned);
        reclaimed as usize
    }
}

/// Deterministic fallback summary used when the backend call fails: lists
/// message kinds and counts rather than inventing prose.
fn structural_fallback_summary(prefix: &[Message]) -> String {
    let mut user = 0;
    let mut assistant = 0;
    let mut tool_calls = 0;
    let mut tool_results = 0;
    for m in prefix {
        match &m.kind {
            Kind::User { .. } => user += 1,
            Kind::Assistant { .. } => assistant += 1,
            Kind::ToolCall(_) => tool_calls += 1,
            Kind::ToolResult(_) => tool_results += 1,
            _ => {}
        }
    }
    format!(
        "[Summary unavailable] Earlier history contained {} user message(s), {} assistant \
         message(s), {} tool call(s), and {} tool result(s).",
        user, assistant, tool_calls, tool_results
    )
}

/// Largest index `i <= desired` such that no `ToolCall` in `messages[..i]` has
/// its matching `ToolResult` in `messages[i..]`. Falls back to smaller `i` when
/// `desired` itself isn't safe, down to `0`, `None` if nothing is ever safe
/// (only possible on a degenerate single-pending-call history).
fn find_safe_split(messages: &[Message], desired: usize) -> Option<usize> {
    for i in (0..=desired).rev() {
        let mut call_ids: HashSet<&str> = HashSet::new();
        for m in &messages[..i] {
            if let Some(id) = m.tool_call_id() {
                call_ids.insert(id);
            }
        }
        let orphaned = messages[i..]
            .iter()
            .any(|m| m.tool_result_call_id().map(|id| call_ids.contains(id)).unwrap_or(false));
        if !orphaned {
            return Some(i);
        }
    }
    None
}
