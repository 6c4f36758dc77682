use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable kind for every error the core can surface, per the
/// dispatcher's operation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PolicyBlocked,
    PolicyRequiresApproval,
    OutOfSandbox,
    NotFound,
    Timeout,
    TransientIo,
    Conflict,
    InvalidRequest,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind:?}: {message}")]
pub struct WardenError {
    pub kind: ErrorKind,
    pub message: String,
    pub detail: Option<String>,
}

impl WardenError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), detail: None }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

impl From<std::io::Error> for WardenError {
    fn from(err: std::io::Error) -> Self {
        Self::new(ErrorKind::TransientIo, err.to_string())
    }
}
