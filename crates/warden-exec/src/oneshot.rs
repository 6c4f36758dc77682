use std::collections::BTreeMap;
use std::os::unix::process::ExitStatusExt;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use warden_core::{ErrorKind, WardenError};

use crate::env::build_safe_env;

/// Result of running a single command to completion.
#[derive(Debug)]
pub struct OneshotResult {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Runs a single command under a scrubbed environment, enforcing a timeout.
/// `cwd` is expected to already have been confined to the project root by
/// the caller; this executor does not itself check it.
pub async fn run_oneshot(
    command: &str,
    args: &[String],
    cwd: &str,
    env_overlay: &BTreeMap<String, String>,
    timeout: Duration,
) -> Result<OneshotResult, WardenError> {
    let env = build_safe_env(env_overlay);

    let mut cmd = Command::new(command);
    cmd.args(args);
    cmd.current_dir(cwd);
    cmd.env_clear();
    cmd.envs(env);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    let child = cmd
        .spawn()
        .map_err(|err| WardenError::new(ErrorKind::TransientIo, format!("failed to spawn {command}: {err}")))?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(OneshotResult {
            exit_code: output.status.code().or_else(|| output.status.signal().map(|sig| -sig)),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }),
        Ok(Err(err)) => Err(WardenError::new(ErrorKind::TransientIo, format!("command wait failed: {err}"))),
        Err(_) => Err(WardenError::new(
            ErrorKind::Timeout,
            format!("command exceeded timeout of {}ms", timeout.as_millis()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let result = run_oneshot("echo", &["hello".to_string()], "/tmp", &BTreeMap::new(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn timeout_kills_the_child_and_returns_timeout_error() {
        let err = run_oneshot("sleep", &["5".to_string()], "/tmp", &BTreeMap::new(), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn nonzero_exit_code_is_not_an_error() {
        let result = run_oneshot("sh", &["-c".to_string(), "exit 3".to_string()], "/tmp", &BTreeMap::new(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result.exit_code, Some(3));
    }

    #[tokio::test]
    async fn signal_killed_child_reports_negated_signal() {
        let result = run_oneshot("sh", &["-c".to_string(), "kill -TERM $$; sleep 5".to_string()], "/tmp", &BTreeMap::new(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result.exit_code, Some(-15));
    }
}
