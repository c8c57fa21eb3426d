//! Scenario -> tool-scope resolution: binds a named scenario to a prompt template
//! and a restricted tool set.
//!
//! Grounded on `loom::helve`: `HelveConfig`/`assemble_system_prompt` (a system
//! prompt assembled from conditional sections in a fixed order) and
//! `ApprovalPolicy`/`tools_requiring_approval` (which tools are guarded, by
//! policy). YAML loading of scenario definitions (`loom::prompts::load`) is an
//! explicit external collaborator here; `ScenarioResolver` only resolves
//! already-loaded `Scenario` values.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::AgentError;
use crate::registry::ToolRegistry;
use crate::tool::Tool;

/// Scope tokens recognized in a scenario's `tools` field.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolScope {
    pub filesystem: bool,
    pub default: bool,
    pub todo: bool,
    pub bash: bool,
    pub solver: bool,
    /// Named MCP bridges, or `["*"]` meaning all available.
    pub mcp: Vec<String>,
}

impl ToolScope {
    /// Parses a comma-separated list of scope tokens. Unknown tokens are
    /// ignored, matching the "unknown tokens are ignored" rule of the scenario
    /// file contract.
    pub fn parse(tokens: &str) -> Self {
        let mut scope = ToolScope::default();
        for raw in tokens.split(',') {
            let token = raw.trim();
            match token {
                "filesystem" => scope.filesystem = true,
                "default" => scope.default = true,
                "todo" => scope.todo = true,
                "bash" => scope.bash = true,
                "solver" => scope.solver = true,
                t if t.starts_with("mcp:") => {
                    scope.mcp.push(t.trim_start_matches("mcp:").to_string());
                }
                _ => {} // unknown token, ignored
            }
        }
        scope
    }
}

/// Approval policy for destructive or high-risk tool calls.
///
/// Grounded on `loom::helve::prompt::ApprovalPolicy`. This is the policy-level
/// mechanism spec §4.3 calls "tools marked *requires-approval*"; it is orthogonal
/// to a tool's own `Tool::requires_approval()` boolean — `ToolRegistry::requires_approval`
/// checks both.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApprovalPolicy {
    /// No approval; every tool may execute unattended.
    None,
    /// Require approval only for destructive operations (e.g. `delete_file`).
    DestructiveOnly,
    /// Require approval for destructive and bulk-write operations.
    Always,
}

/// Tool names requiring approval under `policy`.
pub fn tools_requiring_approval(policy: ApprovalPolicy) -> &'static [&'static str] {
    match policy {
        ApprovalPolicy::None => &[],
        ApprovalPolicy::DestructiveOnly => &["delete_file"],
        ApprovalPolicy::Always => &["delete_file", "write_file"],
    }
}

/// A named, immutable scenario: prompt template plus tool scope.
#[derive(Clone, Debug)]
pub struct Scenario {
    pub name: String,
    pub tool_scope: ToolScope,
    pub prompt_template: String,
    pub description: String,
}

impl Scenario {
    /// Renders the prompt template, substituting `{userInput}`, `{scenarioReason}`,
    /// and `{workingDir}`. Pure and idempotent: identical arguments always yield
    /// identical text.
    pub fn render_prompt(&self, user_input: &str, scenario_reason: &str, working_dir: &str) -> String {
        self.prompt_template
            .replace("{userInput}", user_input)
            .replace("{scenarioReason}", scenario_reason)
            .replace("{workingDir}", working_dir)
    }
}

/// Supplies the concrete tools behind each scope token. Injected into
/// `ScenarioResolver` rather than looked up through a process-wide registry —
/// see the spec's design note on replacing `LoadBuiltinScenariosFunc` with
/// explicit dependency injection.
pub trait ToolSetProvider: Send + Sync {
    /// Tools always present regardless of scenario (todos, filesystem, bash,
    /// search), composed first so they win on name collision.
    fn universal(&self) -> Vec<Arc<dyn Tool>>;
    /// Tools for filesystem writes in ordinary scenarios.
    fn filesystem_write(&self) -> Vec<Arc<dyn Tool>> {
        Vec::new()
    }
    /// Proposal-only variant of the filesystem-write tools, used by the special
    /// "propose" scenario (see `ScenarioResolver::PROPOSAL_SCENARIO`).
    fn filesystem_propose(&self) -> Vec<Arc<dyn Tool>> {
        Vec::new()
    }
    fn bash(&self) -> Vec<Arc<dyn Tool>> {
        Vec::new()
    }
    fn solver(&self) -> Vec<Arc<dyn Tool>> {
        Vec::new()
    }
    /// Named MCP bridge tools. `None` for an unknown bridge name (dropped with a
    /// warning by the resolver, never fatal). `name` is `"*"` for "all available".
    fn mcp(&self, name: &str) -> Option<Vec<Arc<dyn Tool>>> {
        let _ = name;
        None
    }
}

/// Maps scenario name -> (tool registry, rendered system prompt).
pub struct ScenarioResolver {
    scenarios: HashMap<String, Scenario>,
    tool_sets: Arc<dyn ToolSetProvider>,
}

impl ScenarioResolver {
    /// Case-insensitive scenario name that swaps in the proposal-only
    /// filesystem-write tools instead of the real ones.
    pub const PROPOSAL_SCENARIO: &'static str = "propose";

    pub fn new(scenarios: Vec<Scenario>, tool_sets: Arc<dyn ToolSetProvider>) -> Self {
        let scenarios = scenarios
            .into_iter()
            .map(|s| (s.name.to_lowercase(), s))
            .collect();
        Self { scenarios, tool_sets }
    }

    fn lookup(&self, name: &str) -> Result<&Scenario, AgentError> {
        self.scenarios
            .get(&name.to_lowercase())
            .ok_or_else(|| AgentError::InvariantViolation(format!("unknown scenario: {}", name)))
    }

    /// Resolves `name` into an effective tool registry and its rendered system
    /// prompt. Idempotent: calling twice with identical arguments returns
    /// identical prompt text.
    pub fn resolve(
        &self,
        name: &str,
        user_input: &str,
        scenario_reason: &str,
        working_dir: &str,
        approval_policy: ApprovalPolicy,
    ) -> Result<(ToolRegistry, String), AgentError> {
        let scenario = self.lookup(name)?;
        let is_proposal = name.eq_ignore_ascii_case(Self::PROPOSAL_SCENARIO);

        let mut sets = vec![self.tool_sets.universal()];

        if scenario.tool_scope.filesystem {
            sets.push(if is_proposal {
                self.tool_sets.filesystem_propose()
            } else {
                self.tool_sets.filesystem_write()
            });
        }
        if scenario.tool_scope.bash {
            sets.push(self.tool_sets.bash());
        }
        if scenario.tool_scope.solver {
            sets.push(self.tool_sets.solver());
        }
        for bridge in &scenario.tool_scope.mcp {
            match self.tool_sets.mcp(bridge) {
                Some(tools) => sets.push(tools),
                None => {
                    tracing::warn!(bridge = %bridge, "unknown MCP bridge name, dropped");
                }
            }
        }

        let mut registry = ToolRegistry::compose(sets);
        registry.mark_requires_approval(tools_requiring_approval(approval_policy));
        let prompt = scenario.render_prompt(user_input, scenario_reason, working_dir);
        Ok((registry, prompt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::tool::{ToolCallContent, ToolCallContext, ToolSourceError, ToolSpec};

    struct StubTool(&'static str);

    #[async_trait]
    impl Tool for StubTool {
        fn name(&self) -> &str {
            self.0
        }
        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: self.0.to_string(),
                description: None,
                input_schema: serde_json::json!({}),
            }
        }
        async fn call(
            &self,
            _args: serde_json::Value,
            _ctx: &ToolCallContext,
        ) -> Result<ToolCallContent, ToolSourceError> {
            Ok(ToolCallContent::text(self.0))
        }
    }

    struct StubProvider;
    impl ToolSetProvider for StubProvider {
        fn universal(&self) -> Vec<Arc<dyn Tool>> {
            vec![Arc::new(StubTool("search"))]
        }
        fn filesystem_write(&self) -> Vec<Arc<dyn Tool>> {
            vec![Arc::new(StubTool("write_file"))]
        }
        fn filesystem_propose(&self) -> Vec<Arc<dyn Tool>> {
            vec![Arc::new(StubTool("propose_write"))]
        }
    }

    fn scenario(name: &str, tools: &str) -> Scenario {
        Scenario {
            name: name.to_string(),
            tool_scope: ToolScope::parse(tools),
            prompt_template: "Hello {userInput} in {workingDir} because {scenarioReason}".into(),
            description: "test scenario".into(),
        }
    }

    #[test]
    fn tool_scope_parse_recognizes_known_tokens_and_ignores_unknown() {
        let scope = ToolScope::parse("filesystem, bash, mcp:github, bogus");
        assert!(scope.filesystem);
        assert!(scope.bash);
        assert!(!scope.solver);
        assert_eq!(scope.mcp, vec!["github".to_string()]);
    }

    #[test]
    fn resolve_is_case_insensitive_and_idempotent() {
        let resolver = ScenarioResolver::new(
            vec![scenario("CODE", "filesystem")],
            Arc::new(StubProvider),
        );
        let (_r1, p1) = resolver.resolve("code", "hi", "r", "/tmp", ApprovalPolicy::None).unwrap();
        let (_r2, p2) = resolver.resolve("CODE", "hi", "r", "/tmp", ApprovalPolicy::None).unwrap();
        assert_eq!(p1, p2);
        assert_eq!(p1, "Hello hi in /tmp because r");
    }

    #[test]
    fn propose_scenario_swaps_in_proposal_only_filesystem_tools() {
        let resolver = ScenarioResolver::new(
            vec![scenario("propose", "filesystem")],
            Arc::new(StubProvider),
        );
        let (registry, _) = resolver.resolve("propose", "x", "r", "/tmp", ApprovalPolicy::None).unwrap();
        assert!(registry.get("propose_write").is_some());
        assert!(registry.get("write_file").is_none());
    }

    #[test]
    fn unknown_scenario_is_invariant_violation() {
        let resolver = ScenarioResolver::new(vec![], Arc::new(StubProvider));
        let err = resolver
            .resolve("missing", "x", "r", "/tmp", ApprovalPolicy::None)
            .unwrap_err();
        assert!(matches!(err, AgentError::InvariantViolation(_)));
    }

    #[test]
    fn always_policy_marks_write_file_as_requiring_approval_independent_of_tool_flag() {
        let resolver = ScenarioResolver::new(
            vec![scenario("CODE", "filesystem")],
            Arc::new(StubProvider),
        );
        let (registry, _) = resolver
            .resolve("code", "x", "r", "/tmp", ApprovalPolicy::Always)
            .unwrap();
        // StubProvider's `write_file` tool itself declares no approval requirement;
        // the policy alone is what gates it here.
        assert!(registry.requires_approval("write_file"));
    }

    #[test]
    fn none_policy_requires_no_approval() {
        let resolver = ScenarioResolver::new(
            vec![scenario("CODE", "filesystem")],
            Arc::new(StubProvider),
        );
        let (registry, _) = resolver
            .resolve("code", "x", "r", "/tmp", ApprovalPolicy::None)
            .unwrap();
        assert!(!registry.requires_approval("write_file"));
    }
}
