//! Wire protocol for the request dispatcher's transport binding: one
//! request/response shape per logical operation, carried in an envelope
//! tagging each call with a request id so responses can be matched on a
//! multiplexed connection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{SessionId, WardenError};

pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReqId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope<T> {
    pub req_id: ReqId,
    pub body: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope<T> {
    pub req_id: ReqId,
    pub body: T,
}

/// One proposed filesystem resource touched by an action, supplementing the
/// dispatcher boundary with the shape an external approval broker needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub kind: String,
    pub value: String,
}

/// Built by the dispatcher immediately before routing a HIGH_RISK (or
/// non-dev WRITE) command across the approval-broker boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub agent_id: String,
    pub risk_level: String,
    pub intent: String,
    pub resources: Vec<Resource>,
    pub command: String,
    pub args: Vec<String>,
    pub cwd: String,
    pub digest: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approved,
    Rejected,
    Escalated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Execute {
        command: String,
        args: Vec<String>,
        cwd: Option<String>,
        env_overlay: Option<BTreeMap<String, String>>,
        timeout_ms: u64,
        session_id: Option<SessionId>,
        idempotency_key: Option<String>,
    },
    ListSessions {},
    WriteInput {
        session_id: SessionId,
        data: String,
    },
    AnchorSession {
        session_id: SessionId,
    },
    Abort {
        session_id: SessionId,
        #[serde(default)]
        force: bool,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionListEntry {
    pub session_id: SessionId,
    pub created_at: String,
    pub action_count: u64,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Execute {
        session_id: SessionId,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
        truncated: bool,
        audit_hash: String,
        input_required: bool,
    },
    ListSessions {
        sessions: Vec<SessionListEntry>,
    },
    WriteInput {
        ack: bool,
    },
    AnchorSession {
        session_id: SessionId,
        merkle_root: String,
        action_count: u64,
    },
    Abort {
        ack: bool,
    },
    Error(WardenError),
}

impl From<WardenError> for Response {
    fn from(err: WardenError) -> Self {
        Response::Error(err)
    }
}
