//! Context-window size estimation (§4.5.1): backend-declared value, else a small
//! lookup table by backend model family, else a hardcoded fallback.
//!
//! Grounded on the composite/cached resolver chaining idea in the teacher's
//! (deleted) `model_spec` module, simplified here to a static table since network
//! fetching of model limits is out of scope for the core engine.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::llm::Backend;

/// Used when neither the backend nor the family table has an answer. Matches the
/// teacher's `CompactionConfig::max_context_tokens` default.
pub const DEFAULT_CONTEXT_WINDOW: u32 = 128_000;

static FAMILY_TABLE: Lazy<HashMap<&'static str, u32>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("gpt-4o", 128_000);
    m.insert("gpt-4-turbo", 128_000);
    m.insert("gpt-4", 8_192);
    m.insert("gpt-3.5-turbo", 16_385);
    m.insert("claude-3-5-sonnet", 200_000);
    m.insert("claude-3-opus", 200_000);
    m.insert("claude-3-haiku", 200_000);
    m
});

/// Resolves the effective context window for a backend.
pub struct ContextWindowResolver;

impl ContextWindowResolver {
    /// Order: `backend.context_window()`, then a prefix match of `backend.model_id()`
    /// against the family table, then [`DEFAULT_CONTEXT_WINDOW`].
    pub fn resolve(backend: &dyn Backend) -> u32 {
        if let Some(window) = backend.context_window() {
            return window;
        }
        if let Some(model_id) = backend.model_id() {
            if let Some(window) = Self::lookup_family(model_id) {
                return window;
            }
        }
        DEFAULT_CONTEXT_WINDOW
    }

    fn lookup_family(model_id: &str) -> Option<u32> {
        FAMILY_TABLE
            .iter()
            .find(|(family, _)| model_id.starts_with(**family))
            .map(|(_, window)| *window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Backend, BackendError, LlmResponse, ToolChoiceMode};
    use crate::message::Message;
    use crate::tool::ToolSpec;
    use async_trait::async_trait;

    struct StubBackend {
        model_id: Option<&'static str>,
        context_window: Option<u32>,
    }

    #[async_trait]
    impl Backend for StubBackend {
        async fn invoke(
            &self,
            _messages: &[Message],
            _tools: &[ToolSpec],
            _tool_choice: ToolChoiceMode,
        ) -> Result<LlmResponse, BackendError> {
            unimplemented!("not exercised by these tests")
        }

        fn model_id(&self) -> Option<&str> {
            self.model_id
        }

        fn context_window(&self) -> Option<u32> {
            self.context_window
        }
    }

    #[test]
    fn backend_declared_value_wins() {
        let backend = StubBackend {
            model_id: Some("gpt-4"),
            context_window: Some(99_000),
        };
        assert_eq!(ContextWindowResolver::resolve(&backend), 99_000);
    }

    #[test]
    fn falls_back_to_family_table_by_model_id_prefix() {
        let backend = StubBackend {
            model_id: Some("claude-3-5-sonnet-20241022"),
            context_window: None,
        };
        assert_eq!(ContextWindowResolver::resolve(&backend), 200_000);
    }

    #[test]
    fn falls_back_to_hardcoded_default_when_unknown() {
        let backend = StubBackend {
            model_id: Some("some-unlisted-model"),
            context_window: None,
        };
        assert_eq!(ContextWindowResolver::resolve(&backend), DEFAULT_CONTEXT_WINDOW);
    }

    #[test]
    fn falls_back_to_hardcoded_default_when_no_model_id() {
        let backend = StubBackend {
            model_id: None,
            context_window: None,
        };
        assert_eq!(ContextWindowResolver::resolve(&backend), DEFAULT_CONTEXT_WINDOW);
    }
}
