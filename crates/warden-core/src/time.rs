use chrono::Utc;

/// Returns the current UNIX time in milliseconds.
pub fn now_ms() -> u64 {
    Utc::now().timestamp_millis().try_into().unwrap_or(0)
}

/// Returns the current UTC time as an ISO-8601/RFC3339 timestamp with
/// millisecond precision, matching the canonical form used for action
/// hashing and WAL entries.
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso8601_has_expected_shape() {
        let ts = now_iso8601();
        assert_eq!(ts.len(), 24);
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.as_bytes()[4], b'-');
        assert_eq!(ts.as_bytes()[10], b'T');
    }
}
