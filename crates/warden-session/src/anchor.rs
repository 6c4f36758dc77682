use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use warden_core::{now_iso8601, SessionId, WardenError};

/// External collaborator receiving anchor commits. Out of scope per the
/// core's own contract; bound here only by trait shape. Implementations
/// must be idempotent over (session_id, merkle_root) pairs and must return
/// failure rather than success on any doubt, since success here triggers
/// WAL truncation.
#[async_trait]
pub trait AnchorSink: Send + Sync {
    async fn anchor(&self, session_id: &SessionId, merkle_root: &str) -> Result<(), WardenError>;
}

#[derive(Serialize)]
struct AnchorRecord<'a> {
    session_id: &'a str,
    merkle_root: &'a str,
    anchored_at: String,
}

/// Local stand-in used when no production audit sink is configured. Appends
/// one JSON line per anchor to `<wal_dir>/anchors.jsonl`. This is explicitly
/// not the production sink; it exists only so the daemon has somewhere to
/// write when run standalone.
pub struct LocalJsonlAnchorSink {
    path: Mutex<PathBuf>,
}

impl LocalJsonlAnchorSink {
    pub fn new(wal_dir: PathBuf) -> Self {
        Self { path: Mutex::new(wal_dir.join("anchors.jsonl")) }
    }
}

#[async_trait]
impl AnchorSink for LocalJsonlAnchorSink {
    async fn anchor(&self, session_id: &SessionId, merkle_root: &str) -> Result<(), WardenError> {
        let path = self.path.lock().map_err(|_| WardenError::internal("anchor sink lock poisoned"))?.clone();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let record = AnchorRecord { session_id: &session_id.0, merkle_root, anchored_at: now_iso8601() };
        let mut line = serde_json::to_string(&record)
            .map_err(|e| WardenError::internal(format!("failed to encode anchor record: {e}")))?;
        line.push('\n');

        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_sink_appends_a_json_line_per_anchor() {
        let dir = tempfile::tempdir().unwrap();
        let sink = LocalJsonlAnchorSink::new(dir.path().to_path_buf());
        let session_id = SessionId::new();

        sink.anchor(&session_id, "root1").await.unwrap();
        sink.anchor(&session_id, "root2").await.unwrap();

        let content = std::fs::read_to_string(dir.path().join("anchors.jsonl")).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("root1"));
        assert!(content.contains("root2"));
    }
}
