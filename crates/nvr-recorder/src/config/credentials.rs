//! Credential placeholders in source URLs.
//!
//! URLs in the configuration may carry `{RTSP_USER}` and `{RTSP_PASSWORD}`,
//! filled from the environment variables of the same name at load time. A
//! placeholder whose variable is unset is left in place, and the supervisor
//! refuses to spawn while any placeholder remains.

/// Environment variables consulted for placeholder expansion.
pub const CREDENTIAL_VARS: [&str; 2] = ["RTSP_USER", "RTSP_PASSWORD"];

fn token(var: &str) -> String {
    format!("{{{}}}", var)
}

/// Replace each placeholder whose variable `lookup` resolves.
pub fn expand_credentials<F>(url: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut expanded = url.to_string();
    for var in CREDENTIAL_VARS {
        let token = token(var);
        if !expanded.contains(&token) {
            continue;
        }
        if let Some(value) = lookup(var) {
            expanded = expanded.replace(&token, &value);
        }
    }
    expanded
}

/// True when `url` still carries a credential placeholder.
pub fn has_unresolved_placeholder(url: &str) -> bool {
    CREDENTIAL_VARS.iter().any(|var| url.contains(&token(var)))
}
