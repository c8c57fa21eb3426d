//! Per-working-directory session persistence.
//!
//! Grounded on `loom::memory::Checkpointer`'s file-based save/load contract
//! (deleted here as too generic for the spec's single concrete need) and on
//! `heddle-config`'s XDG path resolution, extended from config files to data
//! files via `dirs::data_local_dir()`. Content-addressing the working directory
//! into a filename follows the session-file round-trip contract named in the
//! spec (§1 scope note: "session file I/O format details beyond round-trip
//! contract" are out of scope) without mandating any particular directory
//! layout on disk.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use crate::conversation::ConversationState;
use crate::error::AgentError;

/// Resolves and persists the one session file associated with a working
/// directory, under `$XDG_DATA_HOME/<app_name>/sessions/`.
pub struct SessionStore {
    app_name: String,
    root_override: Option<PathBuf>,
}

impl SessionStore {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            root_override: None,
        }
    }

    /// Overrides the data-dir root, bypassing `dirs::data_local_dir()`. Used by
    /// tests and by hosts that manage their own storage location.
    pub fn with_root(app_name: impl Into<String>, root: PathBuf) -> Self {
        Self {
            app_name: app_name.into(),
            root_override: Some(root),
        }
    }

    fn sessions_dir(&self) -> Result<PathBuf, AgentError> {
        let root = match &self.root_override {
            Some(root) => root.clone(),
            None => dirs::data_local_dir()
                .ok_or_else(|| AgentError::PersistenceFailed("no data directory for this platform".into()))?,
        };
        Ok(root.join(&self.app_name).join("sessions"))
    }

    /// Deterministic filename for `working_dir`; two calls with the same
    /// working directory always resolve to the same path.
    pub fn path_for(&self, working_dir: &Path) -> Result<PathBuf, AgentError> {
        let mut hasher = DefaultHasher::new();
        working_dir.hash(&mut hasher);
        let digest = hasher.finish();
        Ok(self.sessions_dir()?.join(format!("{:016x}.json", digest)))
    }

    pub fn save(&self, working_dir: &Path, state: &ConversationState) -> Result<(), AgentError> {
        state.save(&self.path_for(working_dir)?)
    }

    pub fn load(&self, working_dir: &Path) -> Result<ConversationState, AgentError> {
        ConversationState::load(&self.path_for(working_dir)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[test]
    fn path_for_is_deterministic_for_the_same_working_dir() {
        let store = SessionStore::with_root("heddle", PathBuf::from("/tmp/doesnotmatter"));
        let a = store.path_for(Path::new("/home/user/project")).unwrap();
        let b = store.path_for(Path::new("/home/user/project")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn path_for_differs_across_working_dirs() {
        let store = SessionStore::with_root("heddle", PathBuf::from("/tmp/doesnotmatter"));
        let a = store.path_for(Path::new("/home/user/project-a")).unwrap();
        let b = store.path_for(Path::new("/home/user/project-b")).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn save_then_load_round_trips_through_the_resolved_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::with_root("heddle", dir.path().to_path_buf());
        let working_dir = Path::new("/some/project");

        let mut state = ConversationState::new();
        state.append(Message::user("hello"));
        store.save(working_dir, &state).unwrap();

        let loaded = store.load(working_dir).unwrap();
        assert_eq!(loaded.messages().len(), 1);
    }

    #[test]
    fn load_with_no_prior_save_returns_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::with_root("heddle", dir.path().to_path_buf());
        let loaded = store.load(Path::new("/never/saved")).unwrap();
        assert!(loaded.is_empty());
    }
}
