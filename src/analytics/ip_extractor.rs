//! Client IP extraction from proxy forwarding headers
//!
//! Headers are checked in a fixed priority order. The first header that is
//! present, non-empty and not the literal `unknown` wins, and its first
//! comma-separated entry is the client address. Without a usable header the
//! socket remote address is returned.

use axum::http::HeaderMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Forwarding headers in the order they are trusted
pub const FORWARDING_HEADERS: &[&str] = &[
    "x-forwarded-for",
    "x-real-ip",
    "proxy-client-ip",
    "wl-proxy-client-ip",
    "http_x_forwarded_for",
    "http_x_forwarded",
    "http_x_cluster_client_ip",
    "http_client_ip",
    "http_forwarded_for",
    "http_forwarded",
    "http_via",
    "remote-addr",
    "remote_addr",
];

/// Best-effort client address as text. Header values are passed through
/// without requiring them to parse as IP addresses.
pub fn extract_client_ip(headers: &HeaderMap, remote_addr: IpAddr) -> String {
    FORWARDING_HEADERS
        .iter()
        .find_map(|name| header_candidate(headers, name))
        .unwrap_or_else(|| remote_addr.to_string())
}

fn header_candidate(headers: &HeaderMap, name: &str) -> Option<String> {
    let value = headers.get(name)?.to_str().ok()?.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("unknown") {
        return None;
    }

    let first = value.split(',').next()?.trim();
    if first.is_empty() || first.eq_ignore_ascii_case("unknown") {
        return None;
    }

    Some(first.to_string())
}

const IPV4_KEEP_MASK: u32 = !0 << 8;
const IPV6_KEEP_MASK: u128 = !0 << 80;

/// Zero the host part of an address: IPv4 keeps its /24, IPv6 its /48
pub fn anonymize_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V4(addr) => IpAddr::V4(Ipv4Addr::from(u32::from(addr) & IPV4_KEEP_MASK)),
        IpAddr::V6(addr) => IpAddr::V6(Ipv6Addr::from(u128::from(addr) & IPV6_KEEP_MASK)),
    }
}

/// Anonymize a textual address; values that are not IPs are returned as-is
pub fn anonymize_ip_str(ip: &str) -> String {
    match ip.parse::<IpAddr>() {
        Ok(addr) => anonymize_ip(addr).to_string(),
        Err(_) => ip.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderName, HeaderValue};

    fn socket() -> IpAddr {
        "192.168.1.1".parse().unwrap()
    }

    #[test]
    fn test_no_headers_uses_socket_address() {
        let headers = HeaderMap::new();
        assert_eq!(extract_client_ip(&headers, socket()), "192.168.1.1");
    }

    #[test]
    fn test_x_forwarded_for_takes_first_entry() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("1.2.3.4, 5.6.7.8"));
        headers.insert("remote-addr", HeaderValue::from_static("9.9.9.9"));

        assert_eq!(extract_client_ip(&headers, socket()), "1.2.3.4");
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_bytes(b"X-Forwarded-For").unwrap(),
            HeaderValue::from_static(" 203.0.113.7 "),
        );
        assert_eq!(extract_client_ip(&headers, socket()), "203.0.113.7");
    }

    #[test]
    fn test_unknown_values_are_skipped() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("UNKNOWN"));
        headers.insert("proxy-client-ip", HeaderValue::from_static(""));
        headers.insert("http_client_ip", HeaderValue::from_static("198.51.100.4"));

        assert_eq!(extract_client_ip(&headers, socket()), "198.51.100.4");
    }

    #[test]
    fn test_empty_first_entry_falls_through() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(" , 5.6.7.8"));
        headers.insert("remote-addr", HeaderValue::from_static("9.9.9.9"));

        assert_eq!(extract_client_ip(&headers, socket()), "9.9.9.9");
    }

    #[test]
    fn test_ipv6_socket_fallback() {
        let headers = HeaderMap::new();
        let ip: IpAddr = "2001:db8::1".parse().unwrap();
        assert_eq!(extract_client_ip(&headers, ip), "2001:db8::1");
    }

    #[test]
    fn test_anonymize_ipv4() {
        let ip: IpAddr = "192.168.1.100".parse().unwrap();
        let anonymized = anonymize_ip(ip);
        assert_eq!(anonymized, "192.168.1.0".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_anonymize_ipv6() {
        let ip: IpAddr = "2001:db8::1234:5678".parse().unwrap();
        let anonymized = anonymize_ip(ip);
        assert_eq!(anonymized, "2001:db8::".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_anonymize_non_ip_text() {
        assert_eq!(anonymize_ip_str("10.1.2.3"), "10.1.2.0");
        assert_eq!(anonymize_ip_str("proxy.local"), "proxy.local");
    }
}
