//! Per-iteration injection of transient system guidance.
//!
//! Grounded on `loom::helve::assemble_system_prompt`'s pattern of building a
//! message from conditional sections joined in a fixed order, and on
//! `loom::tools::todo`'s item shape for the rendered todo block. Every message
//! this produces carries `Source::Aligner` so the next `cleanup_mandatory` pass
//! removes it deterministically.

use crate::message::{Message, Source};
use crate::todo::TodoStore;

/// Patterns in a tool result's text that, when matched, add a "you may now
/// conclude" nudge. Configured per engine instance; empty means never nudge.
#[derive(Clone, Debug, Default)]
pub struct SuccessPatterns(pub Vec<String>);

impl SuccessPatterns {
    pub fn matches(&self, text: &str) -> bool {
        self.0.iter().any(|p| text.contains(p.as_str()))
    }
}

pub struct Aligner {
    pub success_patterns: SuccessPatterns,
}

impl Aligner {
    pub fn new(success_patterns: SuccessPatterns) -> Self {
        Self { success_patterns }
    }

    /// Produces the single transient message for iteration `i` of `max_iterations`,
    /// or `None` if no signal fires. `last_message` is the most recent message in
    /// state before this call (the Aligner's own prior message has already been
    /// removed by the caller, per the engine's per-iteration order).
    pub async fn align(
        &self,
        i: usize,
        max_iterations: usize,
        last_message: Option<&Message>,
        todo: &dyn TodoStore,
    ) -> Option<Message> {
        if i + 1 >= max_iterations {
            return Some(Message::system(
                "Iteration budget exhausted: conclude now without further tool calls.",
                Source::Aligner,
            ));
        }

        let mut parts: Vec<String> = Vec::new();

        if let Some(last) = last_message {
            if last.is_tool_result() {
                let has_images = !last.images.is_empty();
                if has_images {
                    parts.push(
                        "Analyse the visual content of the last tool result before invoking any more tools."
                            .to_string(),
                    );
                } else if let Some(text) = last.text() {
                    parts.push("Acknowledge the last tool result and decide the next step.".to_string());
                    if self.success_patterns.matches(text) {
                        parts.push("The last result indicates success; you may now conclude.".to_string());
                    }
                }
            }
        }

        let todos = todo.todos_for_prompt().await;
        if !todos.is_empty() {
            parts.push(format!(
                "Outstanding todo items:\n{}\nUpdate the todo list as you make progress.",
                todos
            ));
        } else if todo.is_all_completed().await {
            parts.push("All todo items are complete; you may now conclude.".to_string());
        }

        if parts.is_empty() {
            None
        } else {
            Some(Message::system(parts.join("\n"), Source::Aligner))
        }
    }
}
