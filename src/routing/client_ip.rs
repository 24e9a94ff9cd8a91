//! Client address lookup and anonymization

use axum::http::HeaderMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Headers that may carry the original client address, in lookup order
pub const CLIENT_IP_HEADER_CANDIDATES: &[&str] = &[
    "X-Forwarded-For",
    "Proxy-Client-IP",
    "WL-Proxy-Client-IP",
    "HTTP_X_FORWARDED_FOR",
    "HTTP_X_FORWARDED",
    "HTTP_X_CLUSTER_CLIENT_IP",
    "HTTP_CLIENT_IP",
    "HTTP_FORWARDED_FOR",
    "HTTP_FORWARDED",
    "HTTP_VIA",
    "REMOTE_ADDR",
];

/// Look up the client address from forwarding headers, falling back to the peer
pub fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>) -> Option<String> {
    for candidate in CLIENT_IP_HEADER_CANDIDATES {
        let Some(value) = headers.get(*candidate).and_then(|v| v.to_str().ok()) else {
            continue;
        };
        if value.is_empty() || value.eq_ignore_ascii_case("unknown") {
            continue;
        }
        let first = value.split(',').next().unwrap_or(value).trim();
        return Some(first.to_string());
    }

    peer.map(|ip| ip.to_string())
}

/// Zero the last two octets (IPv4) or segments (IPv6).
///
/// Input that is not a valid address is returned unchanged.
pub fn obfuscate_ip(address: &str) -> String {
    match address.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => {
            let [a, b, _, _] = v4.octets();
            Ipv4Addr::new(a, b, 0, 0).to_string()
        }
        Ok(IpAddr::V6(v6)) => {
            let mut segments = v6.segments();
            segments[6] = 0;
            segments[7] = 0;
            Ipv6Addr::from(segments).to_string()
        }
        Err(_) => address.to_string(),
    }
}
