use std::path::Path;

use serde::{Deserialize, Serialize};
use warden_core::WardenError;

/// Supervisor-signed policy manifest overriding default classification for
/// specific command names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyManifest {
    pub version: String,
    #[serde(default)]
    pub safe_commands: Vec<String>,
    #[serde(default)]
    pub write_commands: Vec<String>,
    #[serde(default)]
    pub blocked_patterns: Vec<String>,
    #[serde(default)]
    pub signature: String,
}

impl PolicyManifest {
    pub fn load(path: &Path) -> Result<Self, WardenError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| WardenError::internal(format!("failed to read manifest {path:?}: {e}")))?;
        serde_json::from_str(&raw)
            .map_err(|e| WardenError::internal(format!("failed to parse manifest {path:?}: {e}")))
    }
}

/// Verifies a manifest's signature against an operator-supplied key scheme.
/// This is the pluggable, out-of-scope collaborator named by the
/// classifier's §4.1 contract.
pub trait ManifestVerifier: Send + Sync {
    fn verify(&self, manifest: &PolicyManifest) -> bool;
}

/// Default verifier bundled so the classifier can be constructed without an
/// operator-supplied verifier wired in. Treats every manifest as unverified,
/// which forces paranoid mode — safe-by-default rather than a stub that
/// trivially approves, unlike the reference implementation's always-true
/// placeholder.
pub struct UnverifiedManifest;

impl ManifestVerifier for UnverifiedManifest {
    fn verify(&self, _manifest: &PolicyManifest) -> bool {
        false
    }
}
