use serde::{Deserialize, Serialize};
use warden_audit::Action;
use warden_core::SessionId;

/// A durable identity grouping a sequence of actions into one auditable
/// unit. Actions are append-only; the session id is stable for its life.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalSession {
    pub session_id: SessionId,
    pub created_at: String,
    pub project_root: String,
    pub actions: Vec<Action>,
    pub is_active: bool,
}

impl TerminalSession {
    pub fn new(project_root: String) -> Self {
        Self {
            session_id: SessionId::new(),
            created_at: warden_core::now_iso8601(),
            project_root,
            actions: Vec::new(),
            is_active: true,
        }
    }

    /// Appends an action to the in-memory tree and returns its audit hash.
    /// Callers must have already durably recorded the action in the WAL.
    pub fn add_action(&mut self, action: Action) -> String {
        let hash = action.hash();
        self.actions.push(action);
        hash
    }

    pub fn compute_merkle_root(&self) -> String {
        let hashes: Vec<String> = self.actions.iter().map(Action::hash).collect();
        warden_audit::merkle_root(&hashes)
    }

    pub fn action_count(&self) -> usize {
        self.actions.len()
    }
}

/// A session summary suitable for the list-active-sessions operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub created_at: String,
    pub action_count: usize,
    pub is_active: bool,
}

impl From<&TerminalSession> for SessionSummary {
    fn from(session: &TerminalSession) -> Self {
        Self {
            session_id: session.session_id.clone(),
            created_at: session.created_at.clone(),
            action_count: session.actions.len(),
            is_active: session.is_active,
        }
    }
}
