//! Client identity resolution from HTTP headers
//!
//! Resolves the identity used as the key for rate limiting and the dynamic
//! blocklist. The chain is an ordered fallback:
//! - first entry of a comma-separated `X-Forwarded-For` list, trimmed
//! - `X-Real-IP`
//! - the transport-level peer address
//!
//! A missing or malformed header never fails the request; it just falls
//! through to the next source.

use axum::http::HeaderMap;
use std::net::SocketAddr;

/// Resolve the client identity for a request.
pub fn resolve_client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    if let Some(ip) = from_forwarded_for(headers) {
        return ip;
    }
    if let Some(ip) = from_real_ip(headers) {
        return ip;
    }
    peer.ip().to_string()
}

fn from_forwarded_for(headers: &HeaderMap) -> Option<String> {
    let value = headers.get("x-forwarded-for")?.to_str().ok()?;
    // Proxies append; the first entry is the original client.
    let first = value.split(',').next()?.trim();
    if first.is_empty() {
        return None;
    }
    Some(first.to_string())
}

fn from_real_ip(headers: &HeaderMap) -> Option<String> {
    let value = headers.get("x-real-ip")?.to_str().ok()?.trim();
    if value.is_empty() {
        return None;
    }
    Some(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> SocketAddr {
        "192.168.1.1:40000".parse().unwrap()
    }

    #[test]
    fn test_no_headers_falls_back_to_peer() {
        let headers = HeaderMap::new();
        assert_eq!(resolve_client_ip(&headers, peer()), "192.168.1.1");
    }

    #[test]
    fn test_forwarded_for_takes_first_entry() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 198.51.100.1, 10.0.0.1"),
        );
        assert_eq!(resolve_client_ip(&headers, peer()), "203.0.113.7");
    }

    #[test]
    fn test_forwarded_for_trims_whitespace() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("  203.0.113.7 , 10.0.0.1"),
        );
        assert_eq!(resolve_client_ip(&headers, peer()), "203.0.113.7");
    }

    #[test]
    fn test_real_ip_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.9"));
        assert_eq!(resolve_client_ip(&headers, peer()), "198.51.100.9");
    }

    #[test]
    fn test_forwarded_for_preferred_over_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7"));
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.9"));
        assert_eq!(resolve_client_ip(&headers, peer()), "203.0.113.7");
    }

    #[test]
    fn test_empty_forwarded_for_falls_through() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("  "));
        assert_eq!(resolve_client_ip(&headers, peer()), "192.168.1.1");
    }
}
