//! Composite tool registry: first-match-by-name lookup over an ordered composition
//! of tool sets.
//!
//! Grounded on `loom::tools::AggregateToolSource` (registers tools by name, dispatches
//! `call_tool` to the matching one) and the teacher's `tool_source` family, which
//! each wrap an `AggregateToolSource`. The spec's rule that "universal tools take
//! precedence on name collision" is realized here as first-match over composition
//! order, with `universal` composed first by the caller.

use std::collections::HashSet;
use std::sync::Arc;

use crate::tool::{Tool, ToolCallContent, ToolCallContext, ToolSourceError, ToolSpec};

/// Composed, read-only view of tools available to one scenario.
///
/// Built by [`crate::scenario::ScenarioResolver::resolve`]; immutable once built,
/// mirroring the spec's "Scenario ... immutable thereafter" lifecycle for the
/// tool-scope side of resolution.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    // Composition order matters: `get`/`call` return the first match, so tools
    // appended earlier (the universal set) shadow same-named tools appended later.
    tools: Vec<Arc<dyn Tool>>,
    // Names marked by `ApprovalPolicy::tools_requiring_approval`, independent of
    // whatever a tool's own `Tool::requires_approval()` returns.
    policy_required: HashSet<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            policy_required: HashSet::new(),
        }
    }

    /// Marks `names` as requiring approval regardless of each tool's own
    /// `requires_approval()`. Called by `ScenarioResolver::resolve` with the
    /// names `tools_requiring_approval(policy)` returns.
    pub fn mark_requires_approval(&mut self, names: &[&str]) {
        self.policy_required.extend(names.iter().map(|n| n.to_string()));
    }

    /// Appends one named tool set, preserving composition order.
    pub fn extend(&mut self, set: Vec<Arc<dyn Tool>>) {
        self.tools.extend(set);
    }

    /// Builds a registry from an ordered list of tool sets, first set first.
    pub fn compose(sets: Vec<Vec<Arc<dyn Tool>>>) -> Self {
        let mut reg = Self::new();
        for set in sets {
            reg.extend(set);
        }
        reg
    }

    /// First tool registered under `name`, in composition order.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// Specs for every distinct tool name, in composition order (the first
    /// registration of a shadowed name wins, matching `get`).
    pub fn list(&self) -> Vec<ToolSpec> {
        let mut seen = std::collections::HashSet::new();
        self.tools
            .iter()
            .filter(|t| seen.insert(t.name().to_string()))
            .map(|t| t.spec())
            .collect()
    }

    /// True when `name` requires approval either by its own `Tool::requires_approval()`
    /// or by scenario-level `ApprovalPolicy`.
    pub fn requires_approval(&self, name: &str) -> bool {
        self.policy_required.contains(name)
            || self.get(name).map(|t| t.requires_approval()).unwrap_or(false)
    }

    pub async fn call(
        &self,
        name: &str,
        args: serde_json::Value,
        ctx: &ToolCallContext,
    ) -> Result<ToolCallContent, ToolSourceError> {
        match self.get(name) {
            Some(tool) => tool.call(args, ctx).await,
            None => Err(ToolSourceError::InvalidInput(format!(
                "tool not found: {}",
                name
            ))),
        }
    }
}
