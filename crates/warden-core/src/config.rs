use std::{env, path::PathBuf};

/// The deploy environment a daemon instance is running under. `Dev` relaxes
/// the approval requirement for WRITE-risk commands; it never relaxes
/// HIGH_RISK handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployEnv {
    Dev,
    Prod,
}

impl DeployEnv {
    fn from_env_var(raw: Option<String>) -> Self {
        match raw.as_deref() {
            Some("dev") => DeployEnv::Dev,
            _ => DeployEnv::Prod,
        }
    }

    pub fn is_dev(self) -> bool {
        matches!(self, DeployEnv::Dev)
    }
}

/// Operational configuration resolved once at daemon startup from the
/// environment variables named by the dispatcher's external interface.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_root: PathBuf,
    pub policy_manifest: Option<PathBuf>,
    pub env: DeployEnv,
    pub port: Option<u16>,
    pub agent_id: String,
    pub tga_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            project_root: env::var_os("PROJECT_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            policy_manifest: env::var_os("POLICY_MANIFEST").map(PathBuf::from),
            env: DeployEnv::from_env_var(env::var("ENV").ok()),
            port: env::var("PORT").ok().and_then(|p| p.parse().ok()),
            agent_id: env::var("AGENT_ID").unwrap_or_else(|_| "unknown-agent".to_string()),
            tga_url: env::var("TGA_URL").ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deploy_env_defaults_to_prod() {
        assert_eq!(DeployEnv::from_env_var(None), DeployEnv::Prod);
        assert_eq!(DeployEnv::from_env_var(Some("anything".into())), DeployEnv::Prod);
        assert_eq!(DeployEnv::from_env_var(Some("dev".into())), DeployEnv::Dev);
    }
}
