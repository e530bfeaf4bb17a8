//! Client address and request-origin helpers
//!
//! The real client address is read from a configurable header (set by the
//! proxy in front of us, `X-Real-IP` by default) and falls back to the
//! socket peer address when that header is absent.

use axum::http::HeaderMap;
use regex::Regex;
use std::net::{IpAddr, SocketAddr};
use std::sync::LazyLock;

static ACCEPT_LANGUAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([a-zA-Z\-]+)(?:;q=\d\.\d)?(?:,\s)?").expect("accept-language pattern is valid")
});

/// Raw client address: the configured header value if present, otherwise
/// the peer IP. Returned unparsed so callers can report bad header values.
pub fn raw_client_ip(headers: &HeaderMap, header_name: &str, peer: Option<SocketAddr>) -> Option<String> {
    let from_header = headers
        .get(header_name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty());

    match from_header {
        Some(value) => Some(value.to_string()),
        None => peer.map(|addr| addr.ip().to_string()),
    }
}

/// Extract the client IP address
///
/// # Returns
/// `Ok(ip)` when an address could be determined, `Err(raw)` with the
/// offending value when the header is not a valid IP (empty when there was
/// nothing to parse at all).
pub fn extract_client_ip(
    headers: &HeaderMap,
    header_name: &str,
    peer: Option<SocketAddr>,
) -> Result<IpAddr, String> {
    let raw = raw_client_ip(headers, header_name, peer).unwrap_or_default();
    raw.parse::<IpAddr>().map_err(|_| raw)
}

/// Lower-case a host and strip any port, e.g. `Example.com:8443` -> `example.com`.
pub fn normalize_hostname(host: &str) -> String {
    let host = host.trim();

    // Bracketed IPv6 literal, optionally followed by a port
    if host.starts_with('[') {
        if let Some(end) = host.find(']') {
            return host[..=end].to_ascii_lowercase();
        }
    }

    host.split(':').next().unwrap_or("").to_ascii_lowercase()
}

/// First language tag of an `Accept-Language` header, or an empty string.
pub fn parse_accept_language(accept_language: &str) -> String {
    ACCEPT_LANGUAGE
        .captures(accept_language)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> Option<SocketAddr> {
        Some(SocketAddr::from(([192, 168, 1, 1], 54321)))
    }

    #[test]
    fn test_extract_client_ip_from_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("203.0.113.1"));

        let result = extract_client_ip(&headers, "X-Real-IP", peer());
        assert_eq!(result, Ok("203.0.113.1".parse::<IpAddr>().unwrap()));
    }

    #[test]
    fn test_extract_client_ip_falls_back_to_peer() {
        let headers = HeaderMap::new();

        let result = extract_client_ip(&headers, "X-Real-IP", peer());
        assert_eq!(result, Ok("192.168.1.1".parse::<IpAddr>().unwrap()));
    }

    #[test]
    fn test_extract_client_ip_rejects_garbage_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("not-an-ip"));

        let result = extract_client_ip(&headers, "X-Real-IP", peer());
        assert_eq!(result, Err("not-an-ip".to_string()));
    }

    #[test]
    fn test_extract_client_ip_without_any_source() {
        let result = extract_client_ip(&HeaderMap::new(), "X-Real-IP", None);
        assert_eq!(result, Err(String::new()));
    }

    #[test]
    fn test_extract_client_ip_ipv6_header() {
        let mut headers = HeaderMap::new();
        headers.insert("cf-connecting-ip", HeaderValue::from_static("2001:db8::1"));

        let result = extract_client_ip(&headers, "CF-Connecting-IP", None);
        assert_eq!(result, Ok("2001:db8::1".parse::<IpAddr>().unwrap()));
    }

    #[test]
    fn test_normalize_hostname_strips_port_and_case() {
        assert_eq!(normalize_hostname("example.com:8443"), "example.com");
        assert_eq!(normalize_hostname("Shop.Example.COM"), "shop.example.com");
        assert_eq!(normalize_hostname("[2001:DB8::1]:443"), "[2001:db8::1]");
        assert_eq!(normalize_hostname(""), "");
    }

    #[test]
    fn test_parse_accept_language() {
        assert_eq!(parse_accept_language("en-US,en;q=0.9,de;q=0.8"), "en-US");
        assert_eq!(parse_accept_language("de;q=0.7, fr"), "de");
        assert_eq!(parse_accept_language(""), "");
        assert_eq!(parse_accept_language("*"), "");
    }
}
