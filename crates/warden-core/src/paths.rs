use std::{env, path::PathBuf};

/// Resolves the WAL directory from environment and platform defaults,
/// mirroring `~/.talos/sessions` from the reference session manager.
pub fn default_wal_dir() -> PathBuf {
    if let Some(override_dir) = env::var_os("WARDEN_WAL_DIR") {
        return PathBuf::from(override_dir);
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".warden/sessions");
    }

    PathBuf::from(".warden/sessions")
}
