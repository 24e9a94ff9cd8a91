use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::routing::{CookieMatchMode, QueryEncoding, RouteMethod};

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream_proxy: UpstreamProxyConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub assets: AssetsConfig,
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub routes: HashMap<String, RouteConfig>,
}

/// Inbound HTTP server
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Mount point of the routing endpoints
    #[serde(default = "default_proxy_context")]
    pub proxy_context: String,
    /// Mount point of the asset delivery endpoints
    #[serde(default = "default_delivery_context")]
    pub delivery_context: String,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            proxy_context: default_proxy_context(),
            delivery_context: default_delivery_context(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 2907))
}

fn default_proxy_context() -> String {
    "/proxy".to_string()
}

fn default_delivery_context() -> String {
    "/delivery".to_string()
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

/// Optional upstream proxy all outbound traffic may be sent through
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UpstreamProxyConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// `|`-separated host patterns that bypass the upstream proxy
    #[serde(default)]
    pub non_proxy_hosts: String,
    /// Loaded from the environment, never from the config file
    #[serde(skip)]
    pub username: Option<String>,
    /// Loaded from the environment, never from the config file
    #[serde(skip)]
    pub password: Option<String>,
}

/// Outbound HTTP client settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Whole-request timeout for routed requests
    #[serde(default = "default_routing_timeout_ms")]
    pub routing_timeout_ms: u64,
    /// Whole-request timeout for asset retrieval
    #[serde(default = "default_retrieval_timeout_ms")]
    pub retrieval_timeout_ms: u64,
    /// User-Agent sent when retrieving assets
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            routing_timeout_ms: default_routing_timeout_ms(),
            retrieval_timeout_ms: default_retrieval_timeout_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl HttpConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn routing_timeout(&self) -> Duration {
        Duration::from_millis(self.routing_timeout_ms)
    }

    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_millis(self.retrieval_timeout_ms)
    }
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_routing_timeout_ms() -> u64 {
    5_000
}

fn default_retrieval_timeout_ms() -> u64 {
    30_000
}

fn default_user_agent() -> String {
    "3rd Party Privacy Proxy".to_string()
}

/// Local asset cache
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssetsConfig {
    #[serde(default = "default_file_location")]
    pub file_location: PathBuf,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            file_location: default_file_location(),
            retry: RetryConfig::default(),
        }
    }
}

fn default_file_location() -> PathBuf {
    PathBuf::from("data/assets")
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Total attempts per endpoint, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    4
}

fn default_backoff_ms() -> u64 {
    3_000
}

/// A third party whose assets are mirrored on a schedule
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Cron expression with a leading seconds field
    pub interval: String,
    /// Response cache group invalidated after every run
    pub cache_group: String,
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
    pub remote_url: String,
    /// Local name; defaults to the last path segment of `remote_url`
    pub filename: Option<String>,
}

/// A routing endpoint, keyed by its slug under the proxy context
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    pub endpoint: String,
    #[serde(default)]
    pub method: RouteMethod,
    #[serde(default)]
    pub allowed_request_headers: Vec<String>,
    #[serde(default)]
    pub allowed_cookies: Vec<String>,
    #[serde(default)]
    pub cookie_match: CookieMatchMode,
    #[serde(default)]
    pub blocked_query_params: Vec<String>,
    #[serde(default)]
    pub allowed_response_headers: Vec<String>,
    #[serde(default)]
    pub additional_request_headers: BTreeMap<String, String>,
    #[serde(default)]
    pub query_encoding: QueryEncoding,
    pub client_ip_header: Option<String>,
}
