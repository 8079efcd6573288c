//! Authorization failure detection in capture output.

/// Lowercase substrings that mean the source rejected our credentials.
pub const AUTH_FAILURE_MARKERS: [&str; 6] = [
    "401 unauthorized",
    "403 forbidden",
    "authorization failed",
    "auth failed",
    "unauthorized",
    "authentication failed",
];

/// Case-insensitive marker scan of one raw output line.
pub fn is_auth_failure(line: &str) -> bool {
    let lower = line.to_lowercase();
    AUTH_FAILURE_MARKERS.iter().any(|m| lower.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markers_match_any_case() {
        assert!(is_auth_failure(
            "[rtsp @ 0x55d] method DESCRIBE failed: 401 Unauthorized"
        ));
        assert!(is_auth_failure("Server returned 403 Forbidden (access denied)"));
        assert!(is_auth_failure("AUTHENTICATION FAILED"));
        assert!(is_auth_failure("digest auth failed for user"));
    }

    #[test]
    fn test_ordinary_errors_do_not_match() {
        assert!(!is_auth_failure("Connection refused"));
        assert!(!is_auth_failure("rtsp://cam/live: Invalid data found when processing input"));
        assert!(!is_auth_failure("frame=  100 fps= 25 q=-1.0 size=N/A"));
    }
}
