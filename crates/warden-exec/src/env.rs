use std::collections::BTreeMap;

/// Environment variable names a caller-supplied overlay is never allowed to
/// set, regardless of executor. Denied keys are silently dropped, not
/// treated as an error.
const DENYLIST: &[&str] = &["LD_PRELOAD", "LD_LIBRARY_PATH", "DYLD_INSERT_LIBRARIES"];

/// Builds the scrubbed environment shared by the one-shot and PTY
/// executors: only PATH/HOME/LANG/TERM survive from the host by default,
/// plus whatever the caller overlays (minus the denylist).
pub fn build_safe_env(overlay: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    env.insert("PATH".to_string(), std::env::var("PATH").unwrap_or_else(|_| "/usr/bin:/bin".to_string()));
    env.insert("HOME".to_string(), std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string()));
    env.insert("LANG".to_string(), "en_US.UTF-8".to_string());
    env.insert("TERM".to_string(), "xterm-256color".to_string());

    for (key, value) in overlay {
        if DENYLIST.contains(&key.as_str()) {
            continue;
        }
        env.insert(key.clone(), value.clone());
    }

    env
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denylisted_keys_are_dropped_not_rejected() {
        let mut overlay = BTreeMap::new();
        overlay.insert("LD_PRELOAD".to_string(), "evil.so".to_string());
        overlay.insert("MY_VAR".to_string(), "ok".to_string());

        let env = build_safe_env(&overlay);

        assert!(!env.contains_key("LD_PRELOAD"));
        assert_eq!(env.get("MY_VAR"), Some(&"ok".to_string()));
        assert!(env.contains_key("PATH"));
        assert!(env.contains_key("HOME"));
    }
}
