//! Allow-list filters applied between the inbound and outbound messages.
//!
//! All functions here are pure; nothing that is not explicitly configured
//! on the [`RoutePolicy`] is ever copied across.

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use std::collections::HashSet;
use tracing::warn;

use super::policy::{CookieMatchMode, RoutePolicy};

/// A cookie as sent by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundCookie {
    pub name: String,
    pub value: String,
    /// Max-age in seconds, rendered as `; expires=`.
    ///
    /// A `Cookie` request header carries only name and value, so
    /// [`parse_cookies`] always leaves this `None`. It is only set by
    /// callers that build cookies from a richer source.
    pub max_age: Option<i64>,
}

impl InboundCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            max_age: None,
        }
    }
}

/// Build the outbound query string.
///
/// Blocked names are dropped by exact, case-sensitive comparison. For
/// repeated names only the first value survives. Values are encoded with
/// the policy's [`QueryEncoding`](super::QueryEncoding), names are not.
pub fn filter_query(params: &[(String, String)], policy: &RoutePolicy) -> String {
    let mut seen = HashSet::new();
    let mut pairs = Vec::new();

    for (name, value) in params {
        if policy.blocked_query_params.contains(name) || !seen.insert(name.as_str()) {
            continue;
        }
        pairs.push(format!("{}={}", name, policy.query_encoding.encode(value)));
    }

    pairs.join("&")
}

/// Copy allow-listed request headers, then overlay the additional headers
pub fn filter_request_headers(inbound: &HeaderMap, policy: &RoutePolicy) -> HeaderMap {
    let mut outbound = HeaderMap::new();

    for allowed in &policy.allowed_request_headers {
        let Ok(name) = HeaderName::from_bytes(allowed.as_bytes()) else {
            warn!(route = %policy.name, header = %allowed, "Ignoring invalid allow-listed header name");
            continue;
        };
        if let Some(value) = inbound.get(&name) {
            outbound.insert(name, value.clone());
        }
    }

    for (name, value) in &policy.additional_request_headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                outbound.insert(name, value);
            }
            _ => warn!(route = %policy.name, header = %name, "Ignoring invalid additional header"),
        }
    }

    outbound
}

/// Parse every `Cookie` header of the inbound request
pub fn parse_cookies(headers: &HeaderMap) -> Vec<InboundCookie> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|line| line.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some(InboundCookie::new(name, value.trim()))
        })
        .collect()
}

/// Assemble the outbound `Cookie` header value.
///
/// Returns `None` when the policy allows no cookies or none matched.
pub fn assemble_cookies(cookies: &[InboundCookie], policy: &RoutePolicy) -> Option<String> {
    if policy.allowed_cookie_names.is_empty() {
        return None;
    }

    let mut parts = Vec::new();
    for configured in &policy.allowed_cookie_names {
        match policy.cookie_match_mode {
            CookieMatchMode::Full => {
                if let Some(cookie) = cookies.iter().find(|c| &c.name == configured) {
                    parts.push(render_cookie(cookie));
                }
            }
            CookieMatchMode::Prefix => {
                parts.extend(
                    cookies
                        .iter()
                        .filter(|c| c.name.starts_with(configured.as_str()))
                        .map(render_cookie),
                );
            }
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("; "))
    }
}

fn render_cookie(cookie: &InboundCookie) -> String {
    let mut rendered = format!("{}={}; path=/", cookie.name, cookie.value);
    if let Some(max_age) = cookie.max_age {
        rendered.push_str(&format!("; expires={}", max_age));
    }
    rendered
}

/// Copy allow-listed response headers and force `Cache-Control: no-cache`.
///
/// The upstream content type is always preserved.
pub fn filter_response_headers(upstream: &HeaderMap, policy: &RoutePolicy) -> HeaderMap {
    let mut headers = HeaderMap::new();

    for allowed in &policy.allowed_response_headers {
        let Ok(name) = HeaderName::from_bytes(allowed.as_bytes()) else {
            continue;
        };
        for value in upstream.get_all(&name) {
            headers.append(name.clone(), value.clone());
        }
    }

    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));

    if let Some(content_type) = upstream.get(header::CONTENT_TYPE) {
        headers.insert(header::CONTENT_TYPE, content_type.clone());
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::QueryEncoding;
    use reqwest::Url;
    use std::collections::{BTreeMap, BTreeSet};

    fn policy() -> RoutePolicy {
        RoutePolicy::builder()
            .name("test")
            .target_endpoint(Url::parse("https://collect.example.com/batch").unwrap())
            .build()
    }

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_query_string_is_encoded() {
        let query = filter_query(
            &params(&[("one", "parameter1"), ("two", "some, special chars?")]),
            &policy(),
        );
        assert_eq!(query, "one=parameter1&two=some%2C+special+chars%3F");
    }

    #[test]
    fn test_query_string_raw_encoding() {
        let mut policy = policy();
        policy.query_encoding = QueryEncoding::Raw;
        assert_eq!(
            filter_query(&params(&[("param", "value, test")]), &policy),
            "param=value, test"
        );
    }

    #[test]
    fn test_query_string_drops_blocked_params() {
        let mut policy = policy();
        policy.blocked_query_params = BTreeSet::from(["restricted".to_string()]);
        let query = filter_query(
            &params(&[("restricted", "hidden value"), ("param", "some value")]),
            &policy,
        );
        assert_eq!(query, "param=some+value");
    }

    #[test]
    fn test_query_blocking_is_case_sensitive_and_first_value_wins() {
        let mut policy = policy();
        policy.blocked_query_params = BTreeSet::from(["uid".to_string()]);
        let query = filter_query(
            &params(&[("UID", "1"), ("uid", "2"), ("a", "x"), ("a", "y")]),
            &policy,
        );
        assert_eq!(query, "UID=1&a=x");
    }

    #[test]
    fn test_only_allow_listed_request_headers_survive() {
        let mut policy = policy();
        policy.allowed_request_headers = vec!["User-Agent".to_string()];

        let mut inbound = HeaderMap::new();
        inbound.insert(header::USER_AGENT, HeaderValue::from_static("X"));
        inbound.insert(header::REFERER, HeaderValue::from_static("Y"));

        let outbound = filter_request_headers(&inbound, &policy);
        assert_eq!(outbound.get(header::USER_AGENT).unwrap(), "X");
        assert!(outbound.get(header::REFERER).is_none());
        assert_eq!(outbound.len(), 1);
    }

    #[test]
    fn test_additional_headers_overwrite_allow_listed() {
        let mut policy = policy();
        policy.allowed_request_headers = vec!["User-Agent".to_string(), "Accept".to_string()];
        policy.additional_request_headers = BTreeMap::from([
            ("User-Agent".to_string(), "privacy-proxy".to_string()),
            ("env".to_string(), "prod".to_string()),
        ]);

        let mut inbound = HeaderMap::new();
        inbound.insert(header::USER_AGENT, HeaderValue::from_static("browser"));

        let outbound = filter_request_headers(&inbound, &policy);
        assert_eq!(outbound.get(header::USER_AGENT).unwrap(), "privacy-proxy");
        assert_eq!(outbound.get("env").unwrap(), "prod");
        assert!(outbound.get(header::ACCEPT).is_none());
    }

    #[test]
    fn test_parse_cookies_across_headers() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("a=1; b=2"));
        headers.append(header::COOKIE, HeaderValue::from_static("c=3;broken; =x"));

        let cookies = parse_cookies(&headers);
        assert_eq!(
            cookies,
            vec![
                InboundCookie::new("a", "1"),
                InboundCookie::new("b", "2"),
                InboundCookie::new("c", "3"),
            ]
        );
    }

    #[test]
    fn test_full_mode_takes_at_most_one_cookie_per_name() {
        let mut policy = policy();
        policy.allowed_cookie_names = vec!["_pk_id".to_string(), "missing".to_string()];

        let cookies = vec![
            InboundCookie::new("_pk_id", "first"),
            InboundCookie::new("_pk_id", "second"),
            InboundCookie::new("_pk_id.extra", "nope"),
            InboundCookie::new("session", "secret"),
        ];

        assert_eq!(
            assemble_cookies(&cookies, &policy).unwrap(),
            "_pk_id=first; path=/"
        );
    }

    #[test]
    fn test_prefix_mode_takes_every_matching_cookie() {
        let mut policy = policy();
        policy.allowed_cookie_names = vec!["_example_pk_".to_string()];
        policy.cookie_match_mode = CookieMatchMode::Prefix;

        let mut expiring = InboundCookie::new("_example_pk_ses", "2");
        expiring.max_age = Some(1800);
        let cookies = vec![
            InboundCookie::new("_example_pk_id", "1"),
            expiring,
            InboundCookie::new("session", "secret"),
        ];

        assert_eq!(
            assemble_cookies(&cookies, &policy).unwrap(),
            "_example_pk_id=1; path=/; _example_pk_ses=2; path=/; expires=1800"
        );
    }

    #[test]
    fn test_no_cookie_header_without_matches() {
        let mut policy = policy();
        assert!(assemble_cookies(&[InboundCookie::new("a", "1")], &policy).is_none());

        policy.allowed_cookie_names = vec!["b".to_string()];
        assert!(assemble_cookies(&[InboundCookie::new("a", "1")], &policy).is_none());
    }

    #[test]
    fn test_response_headers_are_allow_listed() {
        let mut policy = policy();
        policy.allowed_response_headers = vec!["X-Request-Id".to_string()];

        let mut upstream = HeaderMap::new();
        upstream.insert("x-request-id", HeaderValue::from_static("abc"));
        upstream.insert(header::SET_COOKIE, HeaderValue::from_static("track=1"));
        upstream.insert(header::CACHE_CONTROL, HeaderValue::from_static("max-age=3600"));
        upstream.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/gif"));

        let headers = filter_response_headers(&upstream, &policy);
        assert_eq!(headers.get("x-request-id").unwrap(), "abc");
        assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), "no-cache");
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "image/gif");
        assert!(headers.get(header::SET_COOKIE).is_none());
        assert_eq!(headers.len(), 3);
    }
}
