//! Agent execution engine: a ReAct-style reason/act loop over a token-bounded
//! conversation state, with scenario-scoped tools and per-iteration alignment.
//!
//! Concrete tool bodies, backend adapters, and the terminal/REPL front end are
//! external collaborators (see `crate::tool::Tool`, `crate::llm::Backend`);
//! this crate only implements the core loop named in the module table below.

pub mod aligner;
pub mod compress;
pub mod context_window;
pub mod conversation;
pub mod engine;
pub mod error;
pub mod event;
pub mod llm;
pub mod message;
pub mod registry;
pub mod scenario;
pub mod session_store;
pub mod todo;
pub mod tool;

pub use conversation::ConversationState;
pub use engine::{ApprovalDecision, PendingApproval, ReActEngine, RunOutcome};
pub use error::AgentError;
pub use message::{Image, Kind, Message, Source, TokenUsage};
pub use registry::ToolRegistry;
pub use scenario::{ApprovalPolicy, Scenario, ScenarioResolver, ToolScope, ToolSetProvider, tools_requiring_approval};
pub use session_store::SessionStore;

#[cfg(test)]
mod test_logging {
    use std::sync::Once;

    static INIT: Once = Once::new();

    /// Installs a `tracing` subscriber once per test binary, mirroring the
    /// teacher's `ctor`-based test logging setup so `RUST_LOG` filters apply
    /// uniformly across `cargo test` runs.
    #[ctor::ctor]
    fn init_test_tracing() {
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
        });
    }
}
