use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use warden_audit::{short_digest, Action, RiskLevel, WriteAheadLog};
use warden_core::{ActionId, ErrorKind, SessionId, WardenError};

use crate::anchor::AnchorSink;
use crate::session::{SessionSummary, TerminalSession};

/// Minimum interval between non-immediate anchors of the same session.
const ANCHOR_INTERVAL: Duration = Duration::from_secs(600);
/// Anchor-loop tick period.
const ANCHOR_LOOP_TICK: Duration = Duration::from_secs(60);

/// Creates, tracks, and closes sessions; orchestrates WAL-then-tree
/// ordering; runs the periodic anchor loop; replays WALs on recovery.
pub struct SessionManager {
    project_root: String,
    wal_dir: PathBuf,
    anchor_sink: Arc<dyn AnchorSink>,
    sessions: Mutex<HashMap<SessionId, TerminalSession>>,
    wals: Mutex<HashMap<SessionId, Arc<WriteAheadLog>>>,
    last_anchor: Mutex<HashMap<SessionId, Instant>>,
    anchor_task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    pub fn new(project_root: String, wal_dir: PathBuf, anchor_sink: Arc<dyn AnchorSink>) -> Self {
        Self {
            project_root,
            wal_dir,
            anchor_sink,
            sessions: Mutex::new(HashMap::new()),
            wals: Mutex::new(HashMap::new()),
            last_anchor: Mutex::new(HashMap::new()),
            anchor_task: Mutex::new(None),
        }
    }

    pub fn create_session(&self) -> Result<TerminalSession, WardenError> {
        let session = TerminalSession::new(self.project_root.clone());
        let wal = WriteAheadLog::open(session.session_id.clone(), &self.wal_dir)?;

        self.sessions_lock()?.insert(session.session_id.clone(), session.clone());
        self.wals_lock()?.insert(session.session_id.clone(), Arc::new(wal));
        self.last_anchor_lock()?.insert(session.session_id.clone(), Instant::now());

        info!(session_id = %session.session_id, "created session");
        Ok(session)
    }

    pub fn get_session(&self, session_id: &SessionId) -> Result<Option<TerminalSession>, WardenError> {
        Ok(self.sessions_lock()?.get(session_id).cloned())
    }

    pub fn list_active_sessions(&self) -> Result<Vec<SessionSummary>, WardenError> {
        Ok(self
            .sessions_lock()?
            .values()
            .filter(|s| s.is_active)
            .map(SessionSummary::from)
            .collect())
    }

    /// Records an action to a session. Ordering contract: the WAL append
    /// must durably succeed before the action is visible in the in-memory
    /// tree; a WAL failure leaves the session unchanged.
    #[allow(clippy::too_many_arguments)]
    pub fn record_action(
        &self,
        session_id: &SessionId,
        command: String,
        args: Vec<String>,
        cwd: String,
        risk_level: RiskLevel,
        exit_code: Option<i32>,
        stdout: &str,
        stderr: &str,
    ) -> Result<String, WardenError> {
        let wal = self
            .wals_lock()?
            .get(session_id)
            .cloned()
            .ok_or_else(|| WardenError::not_found(format!("session {session_id} not found")))?;

        let action = Action {
            action_id: ActionId::new(),
            session_id: session_id.clone(),
            timestamp: warden_core::now_iso8601(),
            command,
            args,
            cwd,
            risk_level,
            exit_code,
            stdout_digest: short_digest(stdout),
            stderr_digest: short_digest(stderr),
        };

        // 1. Durability before visibility.
        wal.append(&action)?;

        // 2. In-memory tree update.
        let mut sessions = self.sessions_lock()?;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| WardenError::not_found(format!("session {session_id} not found")))?;
        let hash = session.add_action(action.clone());

        tracing::debug!(action_id = %action.action_id, command = %action.command, "recorded action");
        Ok(hash)
    }

    /// Anchors a session's current Merkle root, skipping if the interval
    /// hasn't elapsed and `immediate` is false. On callback failure the WAL
    /// is left untouched so the next tick retries.
    pub async fn anchor_session(&self, session_id: &SessionId, immediate: bool) -> Result<Option<String>, WardenError> {
        let Some(session) = self.get_session(session_id)? else {
            return Ok(None);
        };

        if !immediate {
            let last = self.last_anchor_lock()?.get(session_id).copied();
            if let Some(last) = last {
                if last.elapsed() < ANCHOR_INTERVAL {
                    return Ok(None);
                }
            }
        }

        let merkle_root = session.compute_merkle_root();

        if let Err(err) = self.anchor_sink.anchor(session_id, &merkle_root).await {
            error!(session_id = %session_id, error = %err, "anchor callback failed");
            return Ok(None);
        }

        let wal = self.wals_lock()?.get(session_id).cloned();
        if let Some(wal) = wal {
            wal.truncate()?;
        }
        self.last_anchor_lock()?.insert(session_id.clone(), Instant::now());

        info!(session_id = %session_id, merkle_root = %merkle_root, "anchored session");
        Ok(Some(merkle_root))
    }

    /// Closes a session and performs one final immediate anchor.
    pub async fn close_session(&self, session_id: &SessionId) -> Result<Option<String>, WardenError> {
        {
            let mut sessions = self.sessions_lock()?;
            let session = sessions
                .get_mut(session_id)
                .ok_or_else(|| WardenError::not_found(format!("session {session_id} not found")))?;
            session.is_active = false;
        }

        let root = self.anchor_session(session_id, true).await?;
        info!(session_id = %session_id, "closed session");
        Ok(root)
    }

    /// Recovers a session's action list from its WAL after a crash. Does
    /// not clear the WAL; that only happens on a successful anchor.
    pub fn recover_session(&self, session_id: SessionId) -> Result<Option<TerminalSession>, WardenError> {
        let wal = WriteAheadLog::open(session_id.clone(), &self.wal_dir)?;
        let actions = wal.recover()?;

        if actions.is_empty() {
            return Ok(None);
        }

        let session = TerminalSession {
            session_id: session_id.clone(),
            created_at: warden_core::now_iso8601(),
            project_root: self.project_root.clone(),
            actions,
            is_active: true,
        };

        self.sessions_lock()?.insert(session_id.clone(), session.clone());
        self.wals_lock()?.insert(session_id.clone(), Arc::new(wal));
        self.last_anchor_lock()?.insert(session_id.clone(), Instant::now());

        info!(session_id = %session_id, action_count = session.actions.len(), "recovered session");
        Ok(Some(session))
    }

    /// Starts the periodic anchor loop as a background task. Exceptions
    /// from the anchor callback are caught per-session and logged; they
    /// never stop the loop.
    pub fn start_anchor_loop(self: &Arc<Self>) -> Result<(), WardenError> {
        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(ANCHOR_LOOP_TICK);
            loop {
                interval.tick().await;
                let ids: Vec<SessionId> = match manager.sessions_lock() {
                    Ok(sessions) => sessions.values().filter(|s| s.is_active).map(|s| s.session_id.clone()).collect(),
                    Err(err) => {
                        error!(error = %err, "anchor loop failed to read session map");
                        continue;
                    }
                };
                for session_id in ids {
                    if let Err(err) = manager.anchor_session(&session_id, false).await {
                        warn!(session_id = %session_id, error = %err, "anchor tick failed for session");
                    }
                }
            }
        });
        *self.anchor_task.lock().map_err(|_| WardenError::internal("anchor task lock poisoned"))? = Some(handle);
        Ok(())
    }

    /// Stops the anchor loop, awaiting task completion.
    pub async fn stop_anchor_loop(&self) {
        let handle = self.anchor_task.lock().ok().and_then(|mut guard| guard.take());
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
    }

    fn sessions_lock(&self) -> Result<MutexGuard<'_, HashMap<SessionId, TerminalSession>>, WardenError> {
        self.sessions.lock().map_err(|_| WardenError::new(ErrorKind::Internal, "session map lock poisoned"))
    }

    fn wals_lock(&self) -> Result<MutexGuard<'_, HashMap<SessionId, Arc<WriteAheadLog>>>, WardenError> {
        self.wals.lock().map_err(|_| WardenError::new(ErrorKind::Internal, "wal map lock poisoned"))
    }

    fn last_anchor_lock(&self) -> Result<MutexGuard<'_, HashMap<SessionId, Instant>>, WardenError> {
        self.last_anchor.lock().map_err(|_| WardenError::new(ErrorKind::Internal, "last-anchor map lock poisoned"))
    }
}
