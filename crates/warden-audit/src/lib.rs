//! Canonical hashing, Merkle-root computation, and the write-ahead log that
//! back a session's tamper-evident audit trail.

pub mod action;
pub mod merkle;
pub mod wal;

pub use action::{short_digest, Action, RiskLevel};
pub use merkle::merkle_root;
pub use wal::{WalEntry, WriteAheadLog};
