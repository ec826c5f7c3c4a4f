//! Forwarded-header construction for the router proxy (spec §4.5 step 5).

/// Strip a trailing `:port`, trim, and lowercase — the form used to look
/// up a `HostRoute`. IPv6-aware: `[::1]:4080` strips to `[::1]`.
pub fn normalize_host_for_lookup(host: &str) -> String {
    let trimmed = host.trim();
    let without_port = if let Some(rest) = trimmed.strip_prefix('[') {
        match rest.find(']') {
            Some(end) => &trimmed[..end + 1],
            None => trimmed,
        }
    } else {
        match trimmed.rfind(':') {
            Some(idx) if trimmed[idx + 1..].chars().all(|c| c.is_ascii_digit()) && !trimmed[idx + 1..].is_empty() => {
                &trimmed[..idx]
            }
            _ => trimmed,
        }
    };
    without_port.to_lowercase()
}

/// Extract the numeric port embedded in a `Host` header value, if any.
/// Recognizes the IPv6 `[addr]:port` form.
pub fn extract_port(host: &str) -> Option<String> {
    let trimmed = host.trim();
    if let Some(rest) = trimmed.strip_prefix('[') {
        let end = rest.find(']')?;
        let after = &rest[end + 1..];
        let port = after.strip_prefix(':')?;
        return (!port.is_empty() && port.chars().all(|c| c.is_ascii_digit())).then(|| port.to_string());
    }
    let idx = trimmed.rfind(':')?;
    let port = &trimmed[idx + 1..];
    (!port.is_empty() && port.chars().all(|c| c.is_ascii_digit())).then(|| port.to_string())
}

/// Lowercase first comma-separated token of `X-Forwarded-Proto`, or `"http"`
/// when absent/empty.
pub fn forwarded_proto(incoming: Option<&str>) -> String {
    incoming
        .and_then(|v| v.split(',').next())
        .map(|tok| tok.trim().to_lowercase())
        .filter(|tok| !tok.is_empty())
        .unwrap_or_else(|| "http".to_string())
}

/// Port for `X-Forwarded-Port`: the port embedded in `Host` if present,
/// else `443`/`80` keyed off `proto`.
pub fn forwarded_port(host_header: &str, proto: &str) -> String {
    extract_port(host_header).unwrap_or_else(|| if proto == "https" { "443".to_string() } else { "80".to_string() })
}

/// Append `peer` to an existing `X-Forwarded-For` value, or set it alone.
pub fn forwarded_for(existing: Option<&str>, peer: &str) -> String {
    match existing {
        Some(v) if !v.is_empty() => format!("{v}, {peer}"),
        _ => peer.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_port() {
        assert_eq!(normalize_host_for_lookup("my-app-s1.localtest.me:4080"), "my-app-s1.localtest.me");
        assert_eq!(normalize_host_for_lookup("My-App-S1.LocalTest.me"), "my-app-s1.localtest.me");
    }

    #[test]
    fn ipv6_host_strips_port_but_keeps_brackets() {
        assert_eq!(normalize_host_for_lookup("[::1]:4080"), "[::1]");
    }

    #[test]
    fn ipv6_port_extraction() {
        assert_eq!(extract_port("[::1]:4080").as_deref(), Some("4080"));
    }

    #[test]
    fn plain_host_port_extraction() {
        assert_eq!(extract_port("example.com:8080").as_deref(), Some("8080"));
        assert_eq!(extract_port("example.com"), None);
    }

    #[test]
    fn proto_takes_first_token_lowercased() {
        assert_eq!(forwarded_proto(Some("HTTPS, http")), "https");
        assert_eq!(forwarded_proto(None), "http");
        assert_eq!(forwarded_proto(Some("")), "http");
    }

    #[test]
    fn port_falls_back_by_proto_when_host_has_none() {
        assert_eq!(forwarded_port("example.com", "https"), "443");
        assert_eq!(forwarded_port("example.com", "http"), "80");
        assert_eq!(forwarded_port("example.com:9000", "https"), "9000");
    }

    #[test]
    fn for_header_appends_or_sets() {
        assert_eq!(forwarded_for(None, "10.0.0.1"), "10.0.0.1");
        assert_eq!(forwarded_for(Some("10.0.0.1"), "10.0.0.2"), "10.0.0.1, 10.0.0.2");
    }
}
