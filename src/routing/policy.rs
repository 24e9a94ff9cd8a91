use bon::Builder;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::config::RouteConfig;

/// How configured cookie names are compared with inbound cookie names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CookieMatchMode {
    /// At most one cookie with exactly the configured name
    #[default]
    Full,
    /// Every cookie whose name starts with the configured name
    Prefix,
}

/// Outbound method of a route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RouteMethod {
    Get,
    #[default]
    Post,
}

impl RouteMethod {
    pub fn as_method(&self) -> reqwest::Method {
        match self {
            RouteMethod::Get => reqwest::Method::GET,
            RouteMethod::Post => reqwest::Method::POST,
        }
    }
}

/// Encoding applied to surviving query parameter values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryEncoding {
    /// `application/x-www-form-urlencoded` value encoding
    #[default]
    Form,
    /// Values are passed through unchanged
    Raw,
}

impl QueryEncoding {
    pub fn encode(&self, value: &str) -> String {
        match self {
            QueryEncoding::Form => url::form_urlencoded::byte_serialize(value.as_bytes()).collect(),
            QueryEncoding::Raw => value.to_string(),
        }
    }
}

/// Allow-list policy for one third-party integration.
///
/// Immutable once built; shared read-only between concurrent requests.
#[derive(Debug, Clone, Builder)]
pub struct RoutePolicy {
    #[builder(into)]
    pub name: String,
    pub target_endpoint: Url,
    #[builder(default)]
    pub method: RouteMethod,
    #[builder(default)]
    pub allowed_request_headers: Vec<String>,
    #[builder(default)]
    pub allowed_cookie_names: Vec<String>,
    #[builder(default)]
    pub cookie_match_mode: CookieMatchMode,
    #[builder(default)]
    pub blocked_query_params: BTreeSet<String>,
    #[builder(default)]
    pub allowed_response_headers: Vec<String>,
    #[builder(default)]
    pub additional_request_headers: BTreeMap<String, String>,
    #[builder(default)]
    pub query_encoding: QueryEncoding,
    /// Header that receives the anonymized client address, if any
    pub client_ip_header: Option<String>,
}

impl RoutePolicy {
    pub fn from_config(name: &str, config: &RouteConfig) -> Result<Self, url::ParseError> {
        let target_endpoint = Url::parse(&config.endpoint)?;

        Ok(RoutePolicy::builder()
            .name(name)
            .target_endpoint(target_endpoint)
            .method(config.method)
            .allowed_request_headers(config.allowed_request_headers.clone())
            .allowed_cookie_names(config.allowed_cookies.clone())
            .cookie_match_mode(config.cookie_match)
            .blocked_query_params(config.blocked_query_params.iter().cloned().collect())
            .allowed_response_headers(config.allowed_response_headers.clone())
            .additional_request_headers(config.additional_request_headers.clone())
            .query_encoding(config.query_encoding)
            .maybe_client_ip_header(config.client_ip_header.clone())
            .build())
    }
}
