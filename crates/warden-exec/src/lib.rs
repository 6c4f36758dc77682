//! Execution backends for actions the classifier has cleared: a one-shot
//! process runner for discrete commands and a PTY-backed runner for
//! interactive sessions, sharing an environment-scrubbing helper.

pub mod env;
pub mod oneshot;
pub mod pty;

pub use env::build_safe_env;
pub use oneshot::{run_oneshot, OneshotResult};
pub use pty::{PtyManager, PtyOpenResult, PtySessionSummary, SessionState};
