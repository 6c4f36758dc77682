use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use warden_core::{ActionId, SessionId};

/// Risk classification for a terminal command, in ascending order of
/// required scrutiny.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Read,
    Write,
    HighRisk,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Read => "READ",
            RiskLevel::Write => "WRITE",
            RiskLevel::HighRisk => "HIGH_RISK",
        }
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "READ" => Ok(RiskLevel::Read),
            "WRITE" => Ok(RiskLevel::Write),
            "HIGH_RISK" => Ok(RiskLevel::HighRisk),
            other => Err(format!("unknown risk level: {other}")),
        }
    }
}

/// One classified-and-executed command within a session, auditable by its
/// hash. Append-only once recorded; never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub action_id: ActionId,
    pub session_id: SessionId,
    pub timestamp: String,
    pub command: String,
    pub args: Vec<String>,
    pub cwd: String,
    pub risk_level: RiskLevel,
    pub exit_code: Option<i32>,
    pub stdout_digest: String,
    pub stderr_digest: String,
}

impl Action {
    /// SHA-256 of the canonical (sorted-key, no-whitespace) JSON form of the
    /// hashed fields. `stdout_digest`/`stderr_digest` are deliberately not
    /// part of the hashed payload, matching the reference implementation's
    /// `compute_hash`, which hashes only action_id/session_id/timestamp/
    /// command/args/cwd/risk_level/exit_code.
    pub fn hash(&self) -> String {
        let canonical = self.canonical_json();
        let digest = Sha256::digest(canonical.as_bytes());
        hex::encode(digest)
    }

    fn canonical_json(&self) -> String {
        // serde_json's map serialization is insertion-ordered, so fields are
        // listed here already in sorted key order to produce the canonical
        // form without a BTreeMap round trip.
        let args_json = serde_json::to_string(&self.args).unwrap_or_else(|_| "[]".to_string());
        let exit_code_json = match self.exit_code {
            Some(code) => code.to_string(),
            None => "null".to_string(),
        };
        format!(
            "{{\"action_id\":{},\"args\":{},\"command\":{},\"cwd\":{},\"exit_code\":{},\"risk_level\":{},\"session_id\":{},\"timestamp\":{}}}",
            json_str(&self.action_id.0),
            args_json,
            json_str(&self.command),
            json_str(&self.cwd),
            exit_code_json,
            json_str(self.risk_level.as_str()),
            json_str(&self.session_id.0),
            json_str(&self.timestamp),
        )
    }
}

fn json_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

pub fn short_digest(content: &str) -> String {
    if content.is_empty() {
        return String::new();
    }
    let digest = Sha256::digest(content.as_bytes());
    hex::encode(digest)[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_action() -> Action {
        Action {
            action_id: ActionId("act-1".into()),
            session_id: SessionId("sess-1".into()),
            timestamp: "2026-01-01T00:00:00.000Z".into(),
            command: "ls".into(),
            args: vec!["-la".into()],
            cwd: "/home/agent".into(),
            risk_level: RiskLevel::Read,
            exit_code: Some(0),
            stdout_digest: "abc".into(),
            stderr_digest: String::new(),
        }
    }

    #[test]
    fn hash_is_stable_for_identical_content() {
        let a = sample_action();
        let b = sample_action();
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn hash_changes_with_exit_code() {
        let mut a = sample_action();
        let base = a.hash();
        a.exit_code = Some(1);
        assert_ne!(base, a.hash());
    }

    #[test]
    fn short_digest_is_empty_for_empty_content() {
        assert_eq!(short_digest(""), "");
        assert_eq!(short_digest("hello").len(), 16);
    }

    #[test]
    fn risk_level_round_trips_through_str() {
        for level in [RiskLevel::Read, RiskLevel::Write, RiskLevel::HighRisk] {
            let parsed: RiskLevel = level.as_str().parse().unwrap();
            assert_eq!(parsed, level);
        }
    }
}
