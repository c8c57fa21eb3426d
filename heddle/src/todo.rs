//! Todo store contract, used only by the [`crate::aligner::Aligner`].
//!
//! The concrete store (XDG-backed JSON file, per `loom::tools::todo`) is an
//! external collaborator; this crate only defines the seam the Aligner needs.

use async_trait::async_trait;

/// Read-only view the Aligner needs to decide whether to surface or nudge
/// about outstanding todo items.
#[async_trait]
pub trait TodoStore: Send + Sync {
    /// Rendered block of outstanding todos for inclusion in an Aligner message,
    /// or empty if there is nothing to show.
    async fn todos_for_prompt(&self) -> String;
    /// True when every tracked item is complete (including "no items at all").
    async fn is_all_completed(&self) -> bool;
}

/// A store with no items. Used when a scenario has no `todo` scope, and as a
/// test double.
///
/// `is_all_completed` deliberately returns `false` rather than the vacuously
/// true answer: this store never tracked anything, so the Aligner should stay
/// silent about todos rather than emit a "you may now conclude" nudge on every
/// single iteration of every scenario.
pub struct NoopTodoStore;

#[async_trait]
impl TodoStore for NoopTodoStore {
    async fn todos_for_prompt(&self) -> String {
        String::new()
    }

    async fn is_all_completed(&self) -> bool {
        false
    }
}
