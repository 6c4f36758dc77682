use regex::Regex;

use warden_audit::RiskLevel;
use warden_core::WardenError;

use crate::manifest::{ManifestVerifier, PolicyManifest};
use crate::patterns::{BLOCKLIST_PATTERNS, HIGH_RISK_PATTERNS, READ_PATTERNS, WRITE_PATTERNS};

/// Result of classifying one (command, args) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationResult {
    pub command: String,
    pub args: Vec<String>,
    pub risk_level: RiskLevel,
    pub is_blocked: bool,
    pub block_reason: Option<String>,
    pub matched_pattern: Option<String>,
}

struct CompiledPatterns {
    blocklist: Vec<Regex>,
    read: Vec<Regex>,
    write: Vec<Regex>,
    high_risk: Vec<Regex>,
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).unwrap_or_else(|e| panic!("invalid built-in pattern {p:?}: {e}")))
        .collect()
}

/// Deterministic, pure classification of commands by risk level. Holds no
/// state beyond its compiled pattern tables and an optional verified
/// manifest; a fresh instance reclassifies identically to any other given
/// the same manifest and mode.
pub struct CommandClassifier {
    manifest: Option<PolicyManifest>,
    paranoid_mode: bool,
    patterns: CompiledPatterns,
}

impl CommandClassifier {
    pub fn new(paranoid_mode: bool) -> Self {
        Self {
            manifest: None,
            paranoid_mode,
            patterns: CompiledPatterns {
                blocklist: compile(BLOCKLIST_PATTERNS),
                read: compile(READ_PATTERNS),
                write: compile(WRITE_PATTERNS),
                high_risk: compile(HIGH_RISK_PATTERNS),
            },
        }
    }

    /// Loads a manifest from disk and verifies it. An unverified manifest
    /// forces paranoid mode rather than being silently ignored.
    pub fn with_manifest(
        manifest_path: &std::path::Path,
        verifier: &dyn ManifestVerifier,
    ) -> Result<Self, WardenError> {
        let manifest = PolicyManifest::load(manifest_path)?;
        let verified = verifier.verify(&manifest);
        let mut classifier = Self::new(!verified);
        if verified {
            classifier.manifest = Some(manifest);
        }
        Ok(classifier)
    }

    pub fn classify(&self, command: &str, args: &[String]) -> ClassificationResult {
        let full_command = format!("{command} {}", args.join(" ")).trim().to_string();

        // 1. Blocklist always wins, regardless of manifest or mode.
        for pattern in &self.patterns.blocklist {
            if pattern.is_match(&full_command) {
                return ClassificationResult {
                    command: command.to_string(),
                    args: args.to_vec(),
                    risk_level: RiskLevel::HighRisk,
                    is_blocked: true,
                    block_reason: Some("Command matches blocklist pattern".to_string()),
                    matched_pattern: Some(pattern.as_str().to_string()),
                };
            }
        }

        // 2. Paranoid mode escalates everything else to HIGH_RISK.
        if self.paranoid_mode {
            return ClassificationResult {
                command: command.to_string(),
                args: args.to_vec(),
                risk_level: RiskLevel::HighRisk,
                is_blocked: false,
                block_reason: Some("Paranoid mode - Supervisor approval required".to_string()),
                matched_pattern: None,
            };
        }

        // 3. Manifest-based classification, by exact command name.
        if let Some(manifest) = &self.manifest {
            if manifest.safe_commands.iter().any(|c| c == command) {
                return ClassificationResult {
                    command: command.to_string(),
                    args: args.to_vec(),
                    risk_level: RiskLevel::Read,
                    is_blocked: false,
                    block_reason: None,
                    matched_pattern: None,
                };
            }
            if manifest.write_commands.iter().any(|c| c == command) {
                return ClassificationResult {
                    command: command.to_string(),
                    args: args.to_vec(),
                    risk_level: RiskLevel::Write,
                    is_blocked: false,
                    block_reason: None,
                    matched_pattern: None,
                };
            }
        }

        // 4. Default pattern groups, read before write before high-risk.
        for (group, risk) in [
            (&self.patterns.read, RiskLevel::Read),
            (&self.patterns.write, RiskLevel::Write),
            (&self.patterns.high_risk, RiskLevel::HighRisk),
        ] {
            for pattern in group {
                if pattern.is_match(&full_command) {
                    return ClassificationResult {
                        command: command.to_string(),
                        args: args.to_vec(),
                        risk_level: risk,
                        is_blocked: false,
                        block_reason: None,
                        matched_pattern: Some(pattern.as_str().to_string()),
                    };
                }
            }
        }

        // 5. Unknown commands default to HIGH_RISK.
        ClassificationResult {
            command: command.to_string(),
            args: args.to_vec(),
            risk_level: RiskLevel::HighRisk,
            is_blocked: false,
            block_reason: Some("Unknown command - defaulting to HIGH_RISK".to_string()),
            matched_pattern: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn ls_is_read() {
        let c = CommandClassifier::new(false);
        let r = c.classify("ls", &args(&["-la"]));
        assert_eq!(r.risk_level, RiskLevel::Read);
        assert!(!r.is_blocked);
    }

    #[test]
    fn git_status_log_diff_are_read() {
        let c = CommandClassifier::new(false);
        for cmd_line in ["git status", "git log", "git diff"] {
            let mut parts = cmd_line.split_whitespace();
            let cmd = parts.next().unwrap();
            let rest = args(&parts.collect::<Vec<_>>());
            assert_eq!(c.classify(cmd, &rest).risk_level, RiskLevel::Read, "{cmd_line}");
        }
    }

    #[test]
    fn mkdir_and_git_add_are_write() {
        let c = CommandClassifier::new(false);
        assert_eq!(c.classify("mkdir", &args(&["foo"])).risk_level, RiskLevel::Write);
        assert_eq!(c.classify("git", &args(&["add", "."])).risk_level, RiskLevel::Write);
        assert_eq!(c.classify("npm", &args(&["install"])).risk_level, RiskLevel::Write);
    }

    #[test]
    fn rm_git_push_curl_sudo_redirection_are_high_risk() {
        let c = CommandClassifier::new(false);
        assert_eq!(c.classify("rm", &args(&["file"])).risk_level, RiskLevel::HighRisk);
        assert_eq!(c.classify("git", &args(&["push"])).risk_level, RiskLevel::HighRisk);
        assert_eq!(c.classify("curl", &args(&["http://x"])).risk_level, RiskLevel::HighRisk);
        assert_eq!(c.classify("sudo", &args(&["ls"])).risk_level, RiskLevel::HighRisk);
        assert_eq!(c.classify("echo", &args(&["hi", ">", "f"])).risk_level, RiskLevel::HighRisk);
    }

    #[test]
    fn system_wide_rm_rf_is_blocked() {
        let c = CommandClassifier::new(false);
        let r = c.classify("rm", &args(&["-rf", "/"]));
        assert!(r.is_blocked);
        assert_eq!(r.risk_level, RiskLevel::HighRisk);

        let r2 = c.classify("rm", &args(&["-rf", "/var"]));
        assert!(r2.is_blocked);
    }

    #[test]
    fn unknown_command_defaults_to_high_risk() {
        let c = CommandClassifier::new(false);
        let r = c.classify("my_custom_bin", &args(&["--x"]));
        assert_eq!(r.risk_level, RiskLevel::HighRisk);
        assert!(!r.is_blocked);
        assert!(r.block_reason.as_deref().unwrap().contains("Unknown"));
    }

    #[test]
    fn paranoid_mode_forces_high_risk_for_otherwise_safe_commands() {
        let c = CommandClassifier::new(true);
        let r = c.classify("ls", &args(&["-la"]));
        assert_eq!(r.risk_level, RiskLevel::HighRisk);
        assert!(!r.is_blocked);
    }

    #[test]
    fn blocklist_wins_even_in_paranoid_mode() {
        let c = CommandClassifier::new(true);
        let r = c.classify("pkill", &args(&["-9", "foo"]));
        assert!(r.is_blocked);
    }

    #[test]
    fn manifest_classification_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(
            &path,
            r#"{"version":"1.0","safe_commands":["custom_read"],"write_commands":["custom_write"],"blocked_patterns":[],"signature":"sig"}"#,
        )
        .unwrap();

        struct AlwaysVerify;
        impl ManifestVerifier for AlwaysVerify {
            fn verify(&self, _m: &PolicyManifest) -> bool {
                true
            }
        }

        let c = CommandClassifier::with_manifest(&path, &AlwaysVerify).unwrap();
        assert_eq!(c.classify("custom_read", &[]).risk_level, RiskLevel::Read);
        assert_eq!(c.classify("custom_write", &[]).risk_level, RiskLevel::Write);
    }

    #[test]
    fn unverified_manifest_forces_paranoid_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(
            &path,
            r#"{"version":"1.0","safe_commands":["custom_read"],"write_commands":[],"blocked_patterns":[],"signature":"sig"}"#,
        )
        .unwrap();

        let c = CommandClassifier::with_manifest(&path, &crate::manifest::UnverifiedManifest).unwrap();
        // even a manifest-listed safe command is escalated because the
        // manifest itself never loaded as trusted.
        assert_eq!(c.classify("custom_read", &[]).risk_level, RiskLevel::HighRisk);
    }
}
