//! Engine-surface error kinds.
//!
//! One variant per row of the error handling table: tool failures are observations
//! (converted to a `ToolResult` and fed back to the model), backend failures escalate,
//! persistence failures never mask a successful turn. `WaitingForApproval` is not
//! constructed as an `AgentError`; it is represented separately as
//! [`crate::engine::RunOutcome::WaitingApproval`] since the spec treats it as a
//! sentinel, not an error.

use thiserror::Error;

/// Errors surfaced by the engine and its collaborators.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("backend call failed: {0}")]
    BackendCallFailed(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("iteration budget exhausted after {0} iterations")]
    IterationBudgetExhausted(usize),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("cancelled")]
    Cancelled,

    #[error("persistence failed: {0}")]
    PersistenceFailed(String),
}
