use std::{
    fs::{self, OpenOptions},
    io::{BufRead, BufReader, Write},
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
};

use serde::{Deserialize, Serialize};
use warden_core::{ActionId, SessionId, WardenError};

use crate::action::{Action, RiskLevel};

/// One durable record of action intent, written before the action becomes
/// visible in any in-memory session tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry {
    pub sequence: u64,
    pub action_id: String,
    pub session_id: String,
    pub timestamp: String,
    pub command: String,
    pub args: Vec<String>,
    pub cwd: String,
    pub risk_level: String,
}

impl From<(&Action, u64)> for WalEntry {
    fn from((action, sequence): (&Action, u64)) -> Self {
        WalEntry {
            sequence,
            action_id: action.action_id.0.clone(),
            session_id: action.session_id.0.clone(),
            timestamp: action.timestamp.clone(),
            command: action.command.clone(),
            args: action.args.clone(),
            cwd: action.cwd.clone(),
            risk_level: action.risk_level.as_str().to_string(),
        }
    }
}

/// Append-only, crash-durable per-session record of action intent.
///
/// Actions are written here before updating the in-memory Merkle tree, so a
/// crash between the two leaves nothing unrecoverable.
pub struct WriteAheadLog {
    session_id: SessionId,
    path: PathBuf,
    sequence: AtomicU64,
}

impl WriteAheadLog {
    pub fn open(session_id: SessionId, wal_dir: &std::path::Path) -> Result<Self, WardenError> {
        fs::create_dir_all(wal_dir)?;
        let path = wal_dir.join(format!("{}.wal", session_id.0));
        Ok(Self { session_id, path, sequence: AtomicU64::new(0) })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Appends an action to the WAL, flushing and fsyncing before returning.
    /// Durability precedes visibility: callers must not add the action to
    /// any in-memory tree until this returns `Ok`.
    pub fn append(&self, action: &Action) -> Result<(), WardenError> {
        let sequence = self.sequence.load(Ordering::SeqCst);
        let entry = WalEntry::from((action, sequence));
        let mut line = serde_json::to_string(&entry)
            .map_err(|e| WardenError::internal(format!("failed to encode WAL entry: {e}")))?;
        line.push('\n');

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        file.sync_all()?;

        self.sequence.store(sequence + 1, Ordering::SeqCst);
        Ok(())
    }

    /// Replays recorded actions from disk. A malformed trailing line (a
    /// partial write from a crash mid-append) ends recovery at the last
    /// well-formed entry rather than failing outright.
    pub fn recover(&self) -> Result<Vec<Action>, WardenError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = fs::File::open(&self.path)?;
        let reader = BufReader::new(file);
        let mut actions = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: WalEntry = match serde_json::from_str(&line) {
                Ok(entry) => entry,
                Err(_) => break,
            };
            let risk_level: RiskLevel = match entry.risk_level.parse() {
                Ok(r) => r,
                Err(_) => break,
            };
            actions.push(Action {
                action_id: ActionId(entry.action_id),
                session_id: SessionId(entry.session_id),
                timestamp: entry.timestamp,
                command: entry.command,
                args: entry.args,
                cwd: entry.cwd,
                risk_level,
                exit_code: None,
                stdout_digest: String::new(),
                stderr_digest: String::new(),
            });
        }

        Ok(actions)
    }

    /// Truncates the WAL to zero length and resets the sequence counter.
    /// Only to be called after an anchor callback has reported success.
    pub fn truncate(&self) -> Result<(), WardenError> {
        if self.path.exists() {
            let file = OpenOptions::new().write(true).open(&self.path)?;
            file.set_len(0)?;
        }
        self.sequence.store(0, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true)
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::ActionId as Aid;

    fn action(session_id: &SessionId, command: &str) -> Action {
        Action {
            action_id: Aid::new(),
            session_id: session_id.clone(),
            timestamp: warden_core::now_iso8601(),
            command: command.into(),
            args: vec![],
            cwd: "/tmp".into(),
            risk_level: RiskLevel::Read,
            exit_code: Some(0),
            stdout_digest: String::new(),
            stderr_digest: String::new(),
        }
    }

    #[test]
    fn append_then_recover_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let session_id = SessionId::new();
        let wal = WriteAheadLog::open(session_id.clone(), dir.path()).unwrap();

        wal.append(&action(&session_id, "ls")).unwrap();
        wal.append(&action(&session_id, "cat")).unwrap();

        let recovered = wal.recover().unwrap();
        assert_eq!(recovered.len(), 2);
        assert_eq!(recovered[0].command, "ls");
        assert_eq!(recovered[1].command, "cat");
    }

    #[test]
    fn truncate_resets_length_and_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let session_id = SessionId::new();
        let wal = WriteAheadLog::open(session_id.clone(), dir.path()).unwrap();
        wal.append(&action(&session_id, "ls")).unwrap();

        wal.truncate().unwrap();

        assert!(wal.is_empty());
        assert!(wal.recover().unwrap().is_empty());
    }

    #[test]
    fn malformed_trailing_line_stops_recovery_without_erroring() {
        let dir = tempfile::tempdir().unwrap();
        let session_id = SessionId::new();
        let wal = WriteAheadLog::open(session_id.clone(), dir.path()).unwrap();
        wal.append(&action(&session_id, "ls")).unwrap();

        let mut file = OpenOptions::new().append(true).open(wal.path()).unwrap();
        file.write_all(b"{not json\n").unwrap();

        let recovered = wal.recover().unwrap();
        assert_eq!(recovered.len(), 1);
    }
}
