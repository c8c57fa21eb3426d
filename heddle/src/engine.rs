//! The iteration loop: model call, classification, tool dispatch, approval
//! gating, termination (§4.5).
//!
//! Grounded on `loom::agent::react`'s Think/Act/Observe loop, generalized from
//! the teacher's compiled-graph execution (`GraphInterrupt` suspension) to a
//! direct state machine that suspends by returning a typed sentinel — see the
//! REDESIGN FLAG recorded in `SPEC_FULL.md` for why the graph machinery itself
//! was not kept.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::aligner::Aligner;
use crate::compress::Compactor;
use crate::context_window::ContextWindowResolver;
use crate::conversation::ConversationState;
use crate::error::AgentError;
use crate::event::{Event, EventBus};
use crate::llm::{Backend, ToolCallDelta, ToolChoiceMode};
use crate::message::{Message, Source};
use crate::registry::ToolRegistry;
use crate::todo::TodoStore;
use crate::tool::{ToolCallContext, ToolSourceError};

/// Caller decision on a held, approval-gated tool call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApprovalDecision {
    Proceed,
    /// Proceed, and auto-approve every further guarded call for the rest of
    /// this engine instance's lifetime (scoped to one constructed `ReActEngine`,
    /// per the spec's open note on "always approve" scoping).
    ProceedAlways,
    Cancel,
}

/// A tool call held pending the caller's approval decision.
#[derive(Clone, Debug)]
pub struct PendingApproval {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

/// Result of `run`/`resume`: either a final answer or a suspension.
#[derive(Clone, Debug)]
pub enum RunOutcome {
    Finished { answer: String },
    WaitingApproval(PendingApproval),
}

/// Saved loop position for resuming after `WaitingApproval`.
struct Cursor {
    registry: ToolRegistry,
    iteration: usize,
    working_dir: Option<PathBuf>,
    remaining: VecDeque<ToolCallDelta>,
    held: ToolCallDelta,
}

/// Outcome of dispatching one batch of tool calls.
enum DispatchOutcome {
    Continue,
    Suspended(PendingApproval),
}

pub struct ReActEngine {
    backend: Arc<dyn Backend>,
    aligner: Aligner,
    compactor: Compactor,
    todo: Arc<dyn TodoStore>,
    pub events: EventBus,
    max_iterations: usize,
    cancellation: CancellationToken,
    auto_approve: bool,
    cursor: Option<Cursor>,
}

impl ReActEngine {
    pub fn new(
        backend: Arc<dyn Backend>,
        aligner: Aligner,
        compactor: Compactor,
        todo: Arc<dyn TodoStore>,
        max_iterations: usize,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            backend,
            aligner,
            compactor,
            todo,
            events: EventBus::new(),
            max_iterations,
            cancellation,
            auto_approve: false,
            cursor: None,
        }
    }

    /// Starts a new request: appends the scenario header (if it changed) and
    /// the user message, then runs the iteration loop from `i = 0`.
    pub async fn run(
        &mut self,
        state: &mut ConversationState,
        registry: ToolRegistry,
        scenario_name: &str,
        rendered_prompt: &str,
        user_input: &str,
        working_dir: Option<PathBuf>,
    ) -> Result<RunOutcome, AgentError> {
        self.ensure_scenario_header(state, scenario_name, rendered_prompt);
        state.append(Message::user(user_input));
        self.iterate(state, registry, working_dir, 0).await
    }

    /// Resumes after a `WaitingApproval` suspension with the caller's decision.
    pub async fn resume(
        &mut self,
        state: &mut ConversationState,
        decision: ApprovalDecision,
    ) -> Result<RunOutcome, AgentError> {
        let cursor = self
            .cursor
            .take()
            .ok_or_else(|| AgentError::InvariantViolation("resume called with no pending approval".into()))?;

        if decision == ApprovalDecision::ProceedAlways {
            self.auto_approve = true;
        }

        if decision == ApprovalDecision::Cancel {
            state.append(Message::tool_error(cursor.held.id.clone(), "declined by user"));
        } else {
            self.execute_tool_call(state, &cursor.registry, &cursor.held, &cursor.working_dir)
                .await?;
        }

        match self
            .dispatch_batch(
                state,
                &cursor.registry,
                &cursor.working_dir,
                cursor.iteration,
                cursor.remaining,
            )
            .await?
        {
            DispatchOutcome::Suspended(pending) => Ok(RunOutcome::WaitingApproval(pending)),
            DispatchOutcome::Continue => {
                self.iterate(state, cursor.registry, cursor.working_dir, cursor.iteration + 1)
                    .await
            }
        }
    }

    fn ensure_scenario_header(&self, state: &mut ConversationState, scenario_name: &str, rendered_prompt: &str) {
        let header = format!("[{}] {}", scenario_name, rendered_prompt);
        let already_current = state
            .messages()
            .iter()
            .rev()
            .find(|m| m.source == Source::ScenarioHeader)
            .and_then(|m| m.text())
            .map(|t| t == header)
            .unwrap_or(false);
        if !already_current {
            state.append(Message::system(header, Source::ScenarioHeader));
        }
    }

    async fn iterate(
        &mut self,
        state: &mut ConversationState,
        registry: ToolRegistry,
        working_dir: Option<PathBuf>,
        start: usize,
    ) -> Result<RunOutcome, AgentError> {
        for i in start..self.max_iterations {
            if self.cancellation.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            // `cleanup_mandatory` also strips Aligner-sourced messages (§4.4); run
            // it before injecting this iteration's nudge so the nudge actually
            // reaches the model call below instead of being wiped in the same
            // pass that just created it. See DESIGN.md for why this reorders the
            // two cleanup steps relative to their listing order in the spec.
            state.remove_by_source(Source::Aligner)?;
            self.compactor.cleanup_mandatory(state)?;
            let context_window = ContextWindowResolver::resolve(self.backend.as_ref());
            self.compactor
                .compact_if_needed(state, self.backend.as_ref(), context_window)
                .await?;

            if let Some(nudge) = self
                .aligner
                .align(i, self.max_iterations, state.last(), self.todo.as_ref())
                .await
            {
                state.append(nudge);
            }

            let history = state.messages().to_vec();
            let tools = registry.list();
            let (thinking_tx, mut thinking_rx) = mpsc::channel::<String>(32);
            let events = self.events.clone();
            let drain = async move {
                while let Some(chunk) = thinking_rx.recv().await {
                    events.emit(Event::ThinkingChunk { text: chunk });
                }
            };
            let call = self
                .backend
                .invoke_stream(&history, &tools, ToolChoiceMode::Auto, Some(thinking_tx));
            let (response, _) = tokio::join!(call, drain);
            let response = response.map_err(AgentError::from)?;

            if let Some(text) = &response.text {
                self.events.emit(Event::Response {
                    text: text.clone(),
                    usage: response.usage,
                });
            }

            if response.tool_calls.is_empty() {
                match response.text.clone() {
                    Some(text) => {
                        let mut msg = Message::assistant(text.clone());
                        if let Some(reasoning) = &response.reasoning {
                            msg.thinking = Some(reasoning.clone());
                        }
                        if let Some(usage) = response.usage {
                            msg = msg.with_usage(usage);
                        }
                        state.append(msg);
                        return Ok(RunOutcome::Finished { answer: text });
                    }
                    None => {
                        // Reasoning continuation (§4.5.f): no final text and no
                        // tool calls yet, only an intermediate reasoning chunk.
                        // Append it as `Kind::Reasoning` and loop back through
                        // think/act/observe rather than treating it as final.
                        let mut msg = Message::reasoning(response.reasoning.clone().unwrap_or_default());
                        if let Some(usage) = response.usage {
                            msg = msg.with_usage(usage);
                        }
                        state.append(msg);
                        continue;
                    }
                }
            }

            let queue: VecDeque<ToolCallDelta> = response.tool_calls.into_iter().collect();
            match self.dispatch_batch(state, &registry, &working_dir, i, queue).await? {
                DispatchOutcome::Suspended(pending) => return Ok(RunOutcome::WaitingApproval(pending)),
                DispatchOutcome::Continue => continue,
            }
        }

        Err(AgentError::IterationBudgetExhausted(self.max_iterations))
    }

    /// Appends `(ToolCall, ToolResult)` pairs for `queue` in order. Suspends via
    /// `Cursor` on the first guarded call (unless auto-approved).
    async fn dispatch_batch(
        &mut self,
        state: &mut ConversationState,
        registry: &ToolRegistry,
        working_dir: &Option<PathBuf>,
        iteration: usize,
        mut queue: VecDeque<ToolCallDelta>,
    ) -> Result<DispatchOutcome, AgentError> {
        while let Some(call) = queue.pop_front() {
            state.append(Message::tool_call(
                call.id.clone(),
                call.tool_name.clone(),
                call.arguments.clone(),
            ));
            self.events.emit(Event::ToolCallStart {
                call_id: call.id.clone(),
                tool_name: call.tool_name.clone(),
                arguments: call.arguments.clone(),
            });

            if registry.requires_approval(&call.tool_name) && !self.auto_approve {
                self.events.emit(Event::ApprovalRequested {
                    call_id: call.id.clone(),
                    tool_name: call.tool_name.clone(),
                });
                self.cursor = Some(Cursor {
                    registry: registry.clone(),
                    iteration,
                    working_dir: working_dir.clone(),
                    remaining: queue,
                    held: call.clone(),
                });
                return Ok(DispatchOutcome::Suspended(PendingApproval {
                    call_id: call.id,
                    tool_name: call.tool_name,
                    arguments: call.arguments,
                }));
            }

            self.execute_tool_call(state, registry, &call, working_dir).await?;
        }

        Ok(DispatchOutcome::Continue)
    }

    async fn execute_tool_call(
        &self,
        state: &mut ConversationState,
        registry: &ToolRegistry,
        call: &ToolCallDelta,
        working_dir: &Option<PathBuf>,
    ) -> Result<(), AgentError> {
        let ctx = ToolCallContext::new(state.messages().to_vec(), working_dir.clone());
        let result = registry.call(&call.tool_name, call.arguments.clone(), &ctx).await;

        let msg = match result {
            Ok(content) => {
                self.events.emit(Event::ToolResult {
                    call_id: call.id.clone(),
                    text: content.text.clone(),
                    images: content.images.clone(),
                    error: content.error.clone(),
                });
                if let Some(error) = content.error {
                    Message::tool_error(call.id.clone(), error)
                } else {
                    Message::tool_result(call.id.clone(), content.text.unwrap_or_default(), content.images)
                }
            }
            Err(ToolSourceError::InvalidInput(detail)) | Err(ToolSourceError::ExecutionFailed(detail)) => {
                let error = format!("Error: {}", detail);
                self.events.emit(Event::ToolResult {
                    call_id: call.id.clone(),
                    text: None,
                    images: Vec::new(),
                    error: Some(error.clone()),
                });
                Message::tool_error(call.id.clone(), error)
            }
        };

        state.append(msg);
        Ok(())
    }
}
