use async_trait::async_trait;

use warden_core::{ActionRequest, ApprovalDecision, WardenError};

/// External collaborator that decides whether a HIGH_RISK (or non-dev
/// WRITE) action proceeds. The decision logic itself — human approval,
/// policy evaluation, capability minting — is out of scope; this trait only
/// fixes the shape the dispatcher builds and hands across the boundary.
#[async_trait]
pub trait ApprovalBroker: Send + Sync {
    async fn request_approval(&self, request: ActionRequest) -> Result<ApprovalDecision, WardenError>;
}

/// Bundled so the daemon runs standalone without a real escalation endpoint
/// wired in. Conservatively refuses to self-approve: every call escalates.
pub struct EscalatingBroker;

#[async_trait]
impl ApprovalBroker for EscalatingBroker {
    async fn request_approval(&self, request: ActionRequest) -> Result<ApprovalDecision, WardenError> {
        tracing::info!(agent_id = %request.agent_id, command = %request.command, risk = %request.risk_level, "escalating action for external approval");
        Ok(ApprovalDecision::Escalated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::Resource;

    #[tokio::test]
    async fn default_broker_always_escalates() {
        let broker = EscalatingBroker;
        let decision = broker
            .request_approval(ActionRequest {
                agent_id: "agent-1".into(),
                risk_level: "HIGH_RISK".into(),
                intent: "run command".into(),
                resources: vec![Resource { kind: "path".into(), value: "/project".into() }],
                command: "rm".into(),
                args: vec!["-rf".into(), "build".into()],
                cwd: "/project".into(),
                digest: "deadbeef".into(),
            })
            .await
            .unwrap();
        assert_eq!(decision, ApprovalDecision::Escalated);
    }
}
