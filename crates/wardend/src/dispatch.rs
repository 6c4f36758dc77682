use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use warden_audit::RiskLevel;
use warden_classify::CommandClassifier;
use warden_core::{
    ActionRequest, ApprovalDecision, Config, ErrorKind, Request, Resource, Response, SessionId, SessionListEntry,
    WardenError,
};
use warden_exec::{run_oneshot, PtyManager};
use warden_ipc::RequestHandler;
use warden_session::SessionManager;

use crate::broker::ApprovalBroker;

const MIN_TIMEOUT_MS: u64 = 1_000;
const MAX_TIMEOUT_MS: u64 = 300_000;
/// Per-stream output bound applied at the response boundary (§6).
const OUTPUT_TRUNCATE_BYTES: usize = 100 * 1024;

/// Routes incoming operations through Classifier → (approval broker) →
/// Session Manager → executor, the concrete binding of the request
/// dispatcher's interface contract to the CBOR transport.
pub struct Dispatcher {
    classifier: Arc<CommandClassifier>,
    sessions: Arc<SessionManager>,
    pty: Arc<PtyManager>,
    broker: Arc<dyn ApprovalBroker>,
    config: Config,
    project_root: PathBuf,
}

impl Dispatcher {
    pub fn new(
        classifier: Arc<CommandClassifier>,
        sessions: Arc<SessionManager>,
        pty: Arc<PtyManager>,
        broker: Arc<dyn ApprovalBroker>,
        config: Config,
    ) -> Result<Self, WardenError> {
        let project_root = std::fs::canonicalize(&config.project_root).map_err(|err| {
            WardenError::new(
                ErrorKind::InvalidRequest,
                format!("project root {} is not accessible: {err}", config.project_root.display()),
            )
        })?;
        Ok(Self { classifier, sessions, pty, broker, config, project_root })
    }

    async fn execute(
        &self,
        command: String,
        args: Vec<String>,
        cwd: Option<String>,
        env_overlay: BTreeMap<String, String>,
        timeout_ms: u64,
        session_id: Option<SessionId>,
    ) -> Result<Response, WardenError> {
        if command.trim().is_empty() {
            return Err(WardenError::new(ErrorKind::InvalidRequest, "command cannot be empty"));
        }
        let timeout_ms = timeout_ms.clamp(MIN_TIMEOUT_MS, MAX_TIMEOUT_MS);

        let classification = self.classifier.classify(&command, &args);
        if classification.is_blocked {
            return Err(WardenError::new(
                ErrorKind::PolicyBlocked,
                classification.block_reason.unwrap_or_else(|| "command is blocked".to_string()),
            )
            .with_detail(classification.matched_pattern.unwrap_or_default()));
        }

        let resolved_cwd = self.confine_cwd(cwd.as_deref())?;

        let needs_approval = classification.risk_level == RiskLevel::HighRisk
            || (classification.risk_level == RiskLevel::Write && !self.config.env.is_dev());

        if needs_approval {
            let request = build_action_request(&self.config.agent_id, classification.risk_level, &command, &args, &resolved_cwd);
            let decision = self.broker.request_approval(request).await?;
            if decision != ApprovalDecision::Approved {
                return Err(WardenError::new(
                    ErrorKind::PolicyRequiresApproval,
                    format!("{} command requires approval", classification.risk_level.as_str()),
                )
                .with_detail(format!("{decision:?}")));
            }
        }

        let session = match &session_id {
            Some(id) => {
                self.sessions.get_session(id)?.ok_or_else(|| WardenError::not_found(format!("session {id} not found")))?
            }
            None => self.sessions.create_session()?,
        };

        let (exit_code, mut stdout, mut stderr, input_required) = if classification.risk_level == RiskLevel::Read {
            let result = run_oneshot(&command, &args, &resolved_cwd, &env_overlay, Duration::from_millis(timeout_ms)).await?;
            (result.exit_code, result.stdout, result.stderr, false)
        } else {
            // WRITE and HIGH_RISK commands run behind a pty: the mediator's
            // primary job is brokering an interactive shell, and the agent
            // may need to follow up with write-input if the child prompts.
            let opened =
                self.pty.open(session.session_id.clone(), command.clone(), args.clone(), resolved_cwd.clone(), env_overlay)?;
            let (output, complete) = self.pty.read_output(&opened.session_id, Duration::from_millis(timeout_ms)).await?;
            let exit_code = if complete { self.pty.exit_code(&opened.session_id)? } else { None };
            (exit_code, output, String::new(), !complete)
        };

        let truncated = truncate_in_place(&mut stdout, OUTPUT_TRUNCATE_BYTES) | truncate_in_place(&mut stderr, OUTPUT_TRUNCATE_BYTES);

        let audit_hash = self.sessions.record_action(
            &session.session_id,
            command,
            args,
            resolved_cwd,
            classification.risk_level,
            exit_code,
            &stdout,
            &stderr,
        )?;

        Ok(Response::Execute { session_id: session.session_id, exit_code, stdout, stderr, truncated, audit_hash, input_required })
    }

    fn list_sessions(&self) -> Result<Response, WardenError> {
        let sessions = self
            .sessions
            .list_active_sessions()?
            .into_iter()
            .map(|s| SessionListEntry {
                session_id: s.session_id,
                created_at: s.created_at,
                action_count: s.action_count as u64,
                active: s.is_active,
            })
            .collect();
        Ok(Response::ListSessions { sessions })
    }

    fn write_input(&self, session_id: &SessionId, data: &str) -> Result<Response, WardenError> {
        Ok(Response::WriteInput { ack: self.pty.write_input(session_id, data) })
    }

    async fn anchor_session(&self, session_id: &SessionId) -> Result<Response, WardenError> {
        let session = self.sessions.get_session(session_id)?.ok_or_else(|| WardenError::not_found(format!("session {session_id} not found")))?;
        let merkle_root = self.sessions.anchor_session(session_id, true).await?.unwrap_or_else(|| session.compute_merkle_root());
        Ok(Response::AnchorSession { session_id: session_id.clone(), merkle_root, action_count: session.action_count() as u64 })
    }

    async fn abort(&self, session_id: &SessionId, force: bool) -> Result<Response, WardenError> {
        Ok(Response::Abort { ack: self.pty.abort(session_id, force).await? })
    }

    /// Enforces the project-root confinement invariant (P8): a caller-
    /// supplied cwd must canonicalise to a descendant of the project root,
    /// or the request is rejected before any executor runs.
    fn confine_cwd(&self, cwd: Option<&str>) -> Result<String, WardenError> {
        let candidate = match cwd {
            Some(path) => std::fs::canonicalize(path)
                .map_err(|err| WardenError::new(ErrorKind::OutOfSandbox, format!("cwd {path} is not accessible: {err}")))?,
            None => self.project_root.clone(),
        };

        if !candidate.starts_with(&self.project_root) {
            return Err(WardenError::new(
                ErrorKind::OutOfSandbox,
                format!("cwd {} escapes project root {}", candidate.display(), self.project_root.display()),
            ));
        }

        Ok(candidate.to_string_lossy().into_owned())
    }
}

#[async_trait]
impl RequestHandler for Dispatcher {
    async fn handle(&self, request: Request) -> Response {
        let result = match request {
            Request::Execute { command, args, cwd, env_overlay, timeout_ms, session_id, idempotency_key: _ } => {
                self.execute(command, args, cwd, env_overlay.unwrap_or_default(), timeout_ms, session_id).await
            }
            Request::ListSessions {} => self.list_sessions(),
            Request::WriteInput { session_id, data } => self.write_input(&session_id, &data),
            Request::AnchorSession { session_id } => self.anchor_session(&session_id).await,
            Request::Abort { session_id, force } => self.abort(&session_id, force).await,
        };

        result.unwrap_or_else(Response::from)
    }
}

/// Truncates `text` to `limit` bytes on a UTF-8 boundary. Returns whether
/// truncation occurred.
fn truncate_in_place(text: &mut String, limit: usize) -> bool {
    if text.len() <= limit {
        return false;
    }
    let mut cut = limit;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    true
}

fn build_action_request(agent_id: &str, risk_level: RiskLevel, command: &str, args: &[String], cwd: &str) -> ActionRequest {
    let digest = canonical_digest(command, args, cwd);
    ActionRequest {
        agent_id: agent_id.to_string(),
        risk_level: risk_level.as_str().to_string(),
        intent: format!("run `{command} {}`", args.join(" ")).trim().to_string(),
        resources: vec![Resource { kind: "path".to_string(), value: cwd.to_string() }],
        command: command.to_string(),
        args: args.to_vec(),
        cwd: cwd.to_string(),
        digest,
    }
}

fn canonical_digest(command: &str, args: &[String], cwd: &str) -> String {
    let args_json = serde_json::to_string(args).unwrap_or_else(|_| "[]".to_string());
    let canonical = format!(
        "{{\"args\":{},\"command\":{},\"cwd\":{}}}",
        args_json,
        serde_json::to_string(command).unwrap_or_else(|_| "\"\"".to_string()),
        serde_json::to_string(cwd).unwrap_or_else(|_| "\"\"".to_string()),
    );
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use warden_classify::CommandClassifier;
    use warden_core::DeployEnv;
    use warden_session::{LocalJsonlAnchorSink, SessionManager};

    struct RejectingBroker;

    #[async_trait]
    impl ApprovalBroker for RejectingBroker {
        async fn request_approval(&self, _request: ActionRequest) -> Result<ApprovalDecision, WardenError> {
            Ok(ApprovalDecision::Rejected)
        }
    }

    fn test_dispatcher(project_root: &std::path::Path, env: DeployEnv) -> Dispatcher {
        let wal_dir = project_root.join(".wal");
        std::fs::create_dir_all(&wal_dir).unwrap();
        let sink = Arc::new(LocalJsonlAnchorSink::new(wal_dir.clone()));
        let sessions = Arc::new(SessionManager::new(project_root.to_string_lossy().into_owned(), wal_dir, sink));
        let config = Config {
            project_root: project_root.to_path_buf(),
            policy_manifest: None,
            env,
            port: None,
            agent_id: "test-agent".into(),
            tga_url: None,
        };
        Dispatcher::new(
            Arc::new(CommandClassifier::new(false)),
            sessions,
            Arc::new(PtyManager::new()),
            Arc::new(RejectingBroker),
            config,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn read_command_runs_without_approval() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = test_dispatcher(dir.path(), DeployEnv::Prod);

        let response = dispatcher
            .execute("echo".into(), vec!["hi".into()], None, BTreeMap::new(), 5_000, None)
            .await
            .unwrap();

        match response {
            Response::Execute { exit_code, stdout, .. } => {
                assert_eq!(exit_code, Some(0));
                assert_eq!(stdout.trim(), "hi");
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn high_risk_command_without_approval_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = test_dispatcher(dir.path(), DeployEnv::Prod);

        let err = dispatcher.execute("curl".into(), vec!["http://x".into()], None, BTreeMap::new(), 5_000, None).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::PolicyRequiresApproval);
    }

    #[tokio::test]
    async fn cwd_outside_project_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let dispatcher = test_dispatcher(dir.path(), DeployEnv::Prod);

        let err = dispatcher
            .execute("ls".into(), vec![], Some(outside.path().to_string_lossy().into_owned()), BTreeMap::new(), 5_000, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::OutOfSandbox);
    }

    #[tokio::test]
    async fn blocked_command_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = test_dispatcher(dir.path(), DeployEnv::Prod);

        let err = dispatcher.execute("rm".into(), vec!["-rf".into(), "/".into()], None, BTreeMap::new(), 5_000, None).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::PolicyBlocked);
    }

    #[test]
    fn truncate_in_place_sets_flag_only_when_over_limit() {
        let mut short = "hi".to_string();
        assert!(!truncate_in_place(&mut short, 10));

        let mut long = "x".repeat(20);
        assert!(truncate_in_place(&mut long, 10));
        assert_eq!(long.len(), 10);
    }
}
