//! Session lifecycle on top of the audit primitives: create/close/recover
//! sessions, record actions under the WAL-then-tree ordering contract, and
//! run the periodic anchor loop.

pub mod anchor;
pub mod manager;
pub mod session;

pub use anchor::{AnchorSink, LocalJsonlAnchorSink};
pub use manager::SessionManager;
pub use session::{SessionSummary, TerminalSession};
