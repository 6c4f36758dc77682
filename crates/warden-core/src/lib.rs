//! Shared identifiers, error taxonomy, time, and path helpers used by all warden binaries.

pub mod config;
pub mod errors;
pub mod ids;
pub mod paths;
pub mod protocol;
pub mod time;

pub use config::{Config, DeployEnv};
pub use errors::{ErrorKind, WardenError};
pub use ids::{ActionId, SessionId};
pub use paths::default_wal_dir;
pub use protocol::{
    ActionRequest, ApprovalDecision, ReqId, Request, RequestEnvelope, Resource, Response, ResponseEnvelope,
    SessionListEntry, PROTOCOL_VERSION,
};
pub use time::{now_iso8601, now_ms};
