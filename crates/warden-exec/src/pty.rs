use std::{
    collections::{BTreeMap, HashMap},
    io::{Read, Write},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tracing::info;

use warden_core::{ErrorKind, SessionId, WardenError};

use crate::env::build_safe_env;

/// Lifecycle state of an interactive session. `WaitingInput` is advisory and
/// not currently set by this implementation; it is exposed for API
/// completeness and future use by a caller that detects shell idleness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Starting,
    Running,
    WaitingInput,
    Completed,
    Aborted,
    Failed,
}

pub struct PtyOpenResult {
    pub session_id: SessionId,
    pub pid: Option<u32>,
}

struct PtySessionHandle {
    command: String,
    args: Vec<String>,
    cwd: String,
    created_at: String,
    pid: Option<u32>,
    writer: Mutex<Box<dyn Write + Send>>,
    master: Mutex<Box<dyn MasterPty + Send>>,
    child: Mutex<Box<dyn Child + Send>>,
    buffer: Mutex<Vec<u8>>,
    complete: AtomicBool,
    state: Mutex<SessionState>,
    exit_code: Mutex<Option<i32>>,
    /// Signal last sent to this session by `abort`, so cleanup can report
    /// the negated signal number (§6 "Exit codes") instead of the
    /// unsigned, sign-blind code `portable_pty::ExitStatus` exposes.
    last_signal: Mutex<Option<i32>>,
    closed: AtomicBool,
}

impl PtySessionHandle {
    fn is_alive(&self) -> bool {
        !self.complete.load(Ordering::SeqCst)
    }
}

/// Summary of a session for the list-sessions operation.
pub struct PtySessionSummary {
    pub session_id: SessionId,
    pub command: String,
    pub state: SessionState,
    pub created_at: String,
    pub is_alive: bool,
}

/// Owns pseudo-terminal-backed interactive sessions: opens them, accepts
/// stdin writes, exposes polled output reads, and handles abort/cleanup.
pub struct PtyManager {
    sessions: Mutex<HashMap<SessionId, Arc<PtySessionHandle>>>,
}

impl PtyManager {
    pub fn new() -> Self {
        Self { sessions: Mutex::new(HashMap::new()) }
    }

    /// Opens a pty-backed execution under the given session id, which the
    /// caller owns (typically the audit session the action is recorded
    /// against) so that later write-input/abort calls can address it.
    pub fn open(
        &self,
        session_id: SessionId,
        command: String,
        args: Vec<String>,
        cwd: String,
        env_overlay: BTreeMap<String, String>,
    ) -> Result<PtyOpenResult, WardenError> {
        if command.trim().is_empty() {
            return Err(WardenError::new(ErrorKind::InvalidRequest, "command cannot be empty"));
        }

        let env = build_safe_env(&env_overlay);

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize { rows: 24, cols: 80, pixel_width: 0, pixel_height: 0 })
            .map_err(|err| pty_error("open pty", err.to_string()))?;

        let mut builder = CommandBuilder::new(&command);
        builder.args(&args);
        builder.cwd(&cwd);
        builder.env_clear();
        for (key, value) in &env {
            builder.env(key, value);
        }

        let child = pair.slave.spawn_command(builder).map_err(|err| pty_error("spawn pty command", err.to_string()))?;
        let pid = child.process_id();

        let reader = pair.master.try_clone_reader().map_err(|err| pty_error("clone pty reader", err.to_string()))?;
        let writer = pair.master.take_writer().map_err(|err| pty_error("take pty writer", err.to_string()))?;

        let handle = Arc::new(PtySessionHandle {
            command: command.clone(),
            args,
            cwd,
            created_at: warden_core::now_iso8601(),
            pid,
            writer: Mutex::new(writer),
            master: Mutex::new(pair.master),
            child: Mutex::new(child),
            buffer: Mutex::new(Vec::new()),
            complete: AtomicBool::new(false),
            state: Mutex::new(SessionState::Running),
            exit_code: Mutex::new(None),
            last_signal: Mutex::new(None),
            closed: AtomicBool::new(false),
        });

        spawn_reader_thread(Arc::clone(&handle), reader);

        self.sessions_lock()?.insert(session_id.clone(), handle);
        info!(session_id = %session_id, command = %command, pid = ?pid, "opened pty session");

        Ok(PtyOpenResult { session_id, pid })
    }

    /// Writes stdin data to a running session. Returns `false`, not an
    /// error, when the session is unknown or already dead.
    pub fn write_input(&self, session_id: &SessionId, data: &str) -> bool {
        let Ok(Some(handle)) = self.get(session_id) else { return false };
        if !handle.is_alive() {
            return false;
        }
        let Ok(mut writer) = handle.writer.lock() else { return false };
        writer.write_all(data.as_bytes()).is_ok() && writer.flush().is_ok()
    }

    /// Waits up to `timeout` for buffered output or session death, then
    /// atomically drains and returns the buffer plus a completion flag.
    pub async fn read_output(&self, session_id: &SessionId, timeout: Duration) -> Result<(String, bool), WardenError> {
        let handle = self
            .get(session_id)?
            .ok_or_else(|| WardenError::not_found(format!("session {session_id} not found")))?;

        let start = Instant::now();
        loop {
            let has_output = handle.buffer.lock().map(|b| !b.is_empty()).unwrap_or(false);
            if has_output || !handle.is_alive() || start.elapsed() >= timeout {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let drained = {
            let mut buffer = handle.buffer.lock().map_err(|_| WardenError::internal("pty buffer lock poisoned"))?;
            std::mem::take(&mut *buffer)
        };

        if !handle.is_alive() {
            self.cleanup(&handle);
        }

        Ok((String::from_utf8_lossy(&drained).into_owned(), !handle.is_alive()))
    }

    /// Sends SIGTERM (or SIGKILL if `force`) to the session's child.
    /// Idempotent: returns `false` for an already-dead or unknown session.
    pub async fn abort(&self, session_id: &SessionId, force: bool) -> Result<bool, WardenError> {
        let Some(handle) = self.get(session_id)? else { return Ok(false) };
        if !handle.is_alive() {
            return Ok(false);
        }

        let killed = match handle.pid {
            Some(pid) if force => {
                let sent = send_signal(pid, "KILL").is_ok();
                if sent {
                    record_signal(&handle, libc::SIGKILL);
                }
                sent
            }
            Some(pid) => {
                let sent = send_signal(pid, "TERM").is_ok();
                if sent {
                    record_signal(&handle, libc::SIGTERM);
                }
                tokio::time::sleep(Duration::from_millis(250)).await;
                if handle.is_alive() && send_signal(pid, "KILL").is_ok() {
                    record_signal(&handle, libc::SIGKILL);
                }
                sent
            }
            None => handle.child.lock().map(|mut c| c.kill().is_ok()).unwrap_or(false),
        };

        if killed {
            *handle.state.lock().map_err(|_| WardenError::internal("pty state lock poisoned"))? = SessionState::Aborted;
        }
        Ok(killed)
    }

    /// Returns the exit code derived during cleanup, or `None` if the
    /// session is unknown, still running, or exited without a status (e.g.
    /// signal-killed and not yet reaped).
    pub fn exit_code(&self, session_id: &SessionId) -> Result<Option<i32>, WardenError> {
        let Some(handle) = self.get(session_id)? else { return Ok(None) };
        handle.exit_code.lock().map(|code| *code).map_err(|_| WardenError::internal("pty exit code lock poisoned"))
    }

    pub fn list_sessions(&self) -> Result<Vec<PtySessionSummary>, WardenError> {
        Ok(self
            .sessions_lock()?
            .iter()
            .map(|(id, handle)| PtySessionSummary {
                session_id: id.clone(),
                command: handle.command.clone(),
                state: *handle.state.lock().expect("pty state lock poisoned"),
                created_at: handle.created_at.clone(),
                is_alive: handle.is_alive(),
            })
            .collect())
    }

    fn get(&self, session_id: &SessionId) -> Result<Option<Arc<PtySessionHandle>>, WardenError> {
        Ok(self.sessions_lock()?.get(session_id).cloned())
    }

    /// Reaps the child, derives its exit code, closes the master once, and
    /// finalises state. Safe to call more than once.
    fn cleanup(&self, handle: &Arc<PtySessionHandle>) {
        if handle.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Ok(mut child) = handle.child.lock() {
            if let Ok(Some(status)) = child.try_wait() {
                let signal = handle.last_signal.lock().ok().and_then(|guard| *guard);
                let code = match signal {
                    Some(sig) => -sig,
                    None => status.exit_code() as i32,
                };
                if let Ok(mut exit_code) = handle.exit_code.lock() {
                    *exit_code = Some(code);
                }
            }
        }

        if let Ok(mut state) = handle.state.lock() {
            if *state == SessionState::Running {
                *state = SessionState::Completed;
            }
        }

        info!(command = %handle.command, "pty session completed");
    }

    fn sessions_lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<SessionId, Arc<PtySessionHandle>>>, WardenError> {
        self.sessions.lock().map_err(|_| WardenError::internal("pty session map lock poisoned"))
    }
}

impl Default for PtyManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns the background OS thread that copies PTY output into the session
/// buffer. A dedicated thread, not a tokio task, because `Read::read` on the
/// master blocks; this is the sole reader of the fd, so writers never race
/// it.
fn spawn_reader_thread(session: Arc<PtySessionHandle>, mut reader: Box<dyn Read + Send>) {
    std::thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if let Ok(mut bytes) = session.buffer.lock() {
                        bytes.extend_from_slice(&buf[..n]);
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        session.complete.store(true, Ordering::SeqCst);
    });
}

/// Signals a process by pid via `/bin/kill` rather than a dedicated
/// signal-handling crate; `portable_pty::Child` exposes only a single
/// forceful `kill()`, with no separate SIGTERM primitive.
fn send_signal(pid: u32, signal: &str) -> std::io::Result<()> {
    let status = std::process::Command::new("/bin/kill").arg(format!("-{signal}")).arg(pid.to_string()).status()?;
    if status.success() || status.code() == Some(1) {
        return Ok(());
    }
    Err(std::io::Error::other(format!("kill -{signal} {pid} failed with status {status}")))
}

fn record_signal(handle: &Arc<PtySessionHandle>, signal: i32) {
    if let Ok(mut last_signal) = handle.last_signal.lock() {
        *last_signal = Some(signal);
    }
}

fn pty_error(context: &str, detail: String) -> WardenError {
    WardenError::new(ErrorKind::TransientIo, format!("{context}: {detail}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_write_read_echo() {
        let manager = PtyManager::new();
        let opened =
            manager.open(SessionId::new(), "cat".to_string(), vec![], "/tmp".to_string(), BTreeMap::new()).unwrap();

        assert!(manager.write_input(&opened.session_id, "hello\n"));

        let deadline = Instant::now() + Duration::from_secs(2);
        let mut collected = String::new();
        while Instant::now() < deadline && !collected.contains("hello") {
            let (chunk, _) = manager.read_output(&opened.session_id, Duration::from_millis(200)).await.unwrap();
            collected.push_str(&chunk);
        }
        assert!(collected.contains("hello"));

        manager.abort(&opened.session_id, true).await.unwrap();
    }

    #[tokio::test]
    async fn abort_is_idempotent_for_dead_sessions() {
        let manager = PtyManager::new();
        let opened =
            manager.open(SessionId::new(), "true".to_string(), vec![], "/tmp".to_string(), BTreeMap::new()).unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = manager.read_output(&opened.session_id, Duration::from_millis(200)).await.unwrap();

        let second = manager.abort(&opened.session_id, false).await.unwrap();
        assert!(!second);
    }

    #[tokio::test]
    async fn write_input_to_unknown_session_returns_false() {
        let manager = PtyManager::new();
        assert!(!manager.write_input(&SessionId::new(), "x"));
    }

    #[tokio::test]
    async fn force_aborted_session_reports_negated_kill_signal() {
        let manager = PtyManager::new();
        let opened =
            manager.open(SessionId::new(), "sleep".to_string(), vec!["60".to_string()], "/tmp".to_string(), BTreeMap::new()).unwrap();

        assert!(manager.abort(&opened.session_id, true).await.unwrap());

        let deadline = Instant::now() + Duration::from_secs(2);
        let mut complete = false;
        while Instant::now() < deadline && !complete {
            let (_, done) = manager.read_output(&opened.session_id, Duration::from_millis(100)).await.unwrap();
            complete = done;
        }
        assert!(complete);
        assert_eq!(manager.exit_code(&opened.session_id).unwrap(), Some(-libc::SIGKILL));
    }
}
