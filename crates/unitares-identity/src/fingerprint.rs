//! Fingerprint normalization for IP-rotating proxies (spec.md §4.2).
//!
//! Grounded in `examples/original_source/tests/test_onboard_pin.py`: the REST path
//! hashes a raw User-Agent header, the MCP path extracts the hash already embedded
//! in the transport session key. Both MUST agree byte-for-byte on the same UA.

use md5::{Digest, Md5};

/// Stable transport prefixes that already carry durable identity and must never
/// be pinned (spec.md §4.2 "Pins must not be written for stable keys").
const STABLE_PREFIXES: &[&str] = &["mcp:", "stdio:", "agent-"];

/// Canonical UA-hash computation: `md5(ua)[:6]` hex, `ua:`-prefixed. Used both to
/// write the onboard pin (from the raw header) and, via [`extract_base_fingerprint`],
/// to look it up (from the session key).
pub fn ua_hash_from_header(user_agent: &str) -> Option<String> {
    if user_agent.is_empty() {
        return None;
    }
    let mut hasher = Md5::new();
    hasher.update(user_agent.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().take(3).map(|b| format!("{:02x}", b)).collect();
    Some(format!("ua:{hex}"))
}

/// Extracts the base fingerprint from a transport session key of shape
/// `IP:UA_hash[:suffix]`, stripping the IP and any trailing suffix and keeping
/// only `ua:<hash>`. Returns `None` for stable keys and empty input.
pub fn extract_base_fingerprint(session_key: &str) -> Option<String> {
    if session_key.is_empty() {
        return None;
    }
    if STABLE_PREFIXES.iter().any(|p| session_key.starts_with(p)) {
        return None;
    }

    let parts: Vec<&str> = session_key.split(':').collect();
    if parts.len() == 1 {
        return Some(session_key.to_string());
    }
    Some(format!("ua:{}", parts[1]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_ip_and_suffix() {
        assert_eq!(extract_base_fingerprint("34.162.136.91:abc123"), Some("ua:abc123".into()));
        assert_eq!(extract_base_fingerprint("34.162.136.91:abc123:deadbeef"), Some("ua:abc123".into()));
        assert_eq!(extract_base_fingerprint("34.162.136.91:abc123:dead:beef"), Some("ua:abc123".into()));
    }

    #[test]
    fn different_ips_same_ua_hash_match() {
        let fp1 = extract_base_fingerprint("160.79.106.108:d20c2f");
        let fp2 = extract_base_fingerprint("160.79.106.126:d20c2f");
        let fp3 = extract_base_fingerprint("34.162.136.91:d20c2f:deadbeef");
        assert_eq!(fp1, fp2);
        assert_eq!(fp2, fp3);
        assert_eq!(fp1, Some("ua:d20c2f".into()));
    }

    #[test]
    fn stable_keys_return_none() {
        assert_eq!(extract_base_fingerprint("mcp:some-session-id"), None);
        assert_eq!(extract_base_fingerprint("stdio:12345"), None);
        assert_eq!(extract_base_fingerprint("agent-5e728ecb1234"), None);
        assert_eq!(extract_base_fingerprint(""), None);
    }

    #[test]
    fn single_part_key_returned_as_is() {
        assert_eq!(extract_base_fingerprint("somekey"), Some("somekey".to_string()));
    }

    #[test]
    fn rest_and_mcp_paths_agree() {
        let raw_ua = "python-httpx/0.27.0";
        let rest_fp = ua_hash_from_header(raw_ua).unwrap();

        let mut hasher = Md5::new();
        hasher.update(raw_ua.as_bytes());
        let full_hex: String = hasher.finalize().iter().map(|b| format!("{:02x}", b)).collect();
        let ua_hash_in_session_key = &full_hex[..6];
        let mcp_session_key = format!("34.162.136.91:{ua_hash_in_session_key}");
        let mcp_fp = extract_base_fingerprint(&mcp_session_key).unwrap();

        assert_eq!(rest_fp, mcp_fp);
    }

    #[test]
    fn empty_ua_returns_none() {
        assert_eq!(ua_hash_from_header(""), None);
    }
}
