use reqwest::Url;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use super::pattern::{matches, split_patterns};

/// Host and port of an upstream HTTP proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPort {
    pub host: String,
    pub port: u16,
}

impl HostPort {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Proxy URL handed to the HTTP client
    pub fn to_url(&self) -> Option<Url> {
        Url::parse(&format!("http://{}:{}", self.host, self.port)).ok()
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Basic auth credentials for the upstream proxy (environment only)
#[derive(Clone)]
pub struct ProxyCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for ProxyCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Transport decision for a single outbound connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyDecision {
    pub use_upstream: bool,
    pub upstream_host: Option<HostPort>,
}

impl ProxyDecision {
    pub fn direct() -> Self {
        Self {
            use_upstream: false,
            upstream_host: None,
        }
    }

    pub fn upstream(host: HostPort) -> Self {
        Self {
            use_upstream: true,
            upstream_host: Some(host),
        }
    }
}

#[derive(Debug)]
struct RouterInner {
    upstream: Option<HostPort>,
    credentials: Option<ProxyCredentials>,
    non_proxy_patterns: Vec<String>,
}

/// Chooses between a direct connection and the upstream proxy per destination.
///
/// Cheap to clone; the configuration is shared and read-only.
#[derive(Debug, Clone)]
pub struct ProxyRouter {
    inner: Arc<RouterInner>,
}

impl ProxyRouter {
    pub fn new(upstream: Option<HostPort>, non_proxy_hosts: &str) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                upstream,
                credentials: None,
                non_proxy_patterns: split_patterns(non_proxy_hosts),
            }),
        }
    }

    /// Router that always connects directly
    pub fn direct() -> Self {
        Self::new(None, "")
    }

    pub fn with_credentials(self, credentials: Option<ProxyCredentials>) -> Self {
        let inner = RouterInner {
            upstream: self.inner.upstream.clone(),
            credentials,
            non_proxy_patterns: self.inner.non_proxy_patterns.clone(),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn upstream(&self) -> Option<&HostPort> {
        self.inner.upstream.as_ref()
    }

    pub(crate) fn credentials(&self) -> Option<&ProxyCredentials> {
        self.inner.credentials.as_ref()
    }

    /// Decide the transport for a parsed destination.
    ///
    /// Evaluated on every call; nothing is cached per host.
    pub fn select_transport(&self, destination: &Url) -> ProxyDecision {
        let Some(upstream) = &self.inner.upstream else {
            return ProxyDecision::direct();
        };

        if self.inner.non_proxy_patterns.is_empty() {
            return ProxyDecision::upstream(upstream.clone());
        }

        let Some(hostname) = destination.host_str() else {
            warn!(%destination, "Destination has no host, routing via upstream proxy");
            return ProxyDecision::upstream(upstream.clone());
        };

        let excluded = self
            .inner
            .non_proxy_patterns
            .iter()
            .any(|pattern| matches(hostname, pattern));

        if excluded {
            debug!(hostname, upstream = %upstream, "Host excluded from upstream proxy, connecting directly");
            ProxyDecision::direct()
        } else {
            debug!(hostname, upstream = %upstream, "Routing via upstream proxy");
            ProxyDecision::upstream(upstream.clone())
        }
    }

    /// Decide the transport for a raw destination string.
    ///
    /// A malformed destination is routed via the upstream proxy (if any),
    /// never directly.
    pub fn select_transport_str(&self, destination: &str) -> ProxyDecision {
        match Url::parse(destination) {
            Ok(url) => self.select_transport(&url),
            Err(e) => {
                warn!(destination, error = %e, "Malformed destination URL, routing via upstream proxy");
                match &self.inner.upstream {
                    Some(upstream) => ProxyDecision::upstream(upstream.clone()),
                    None => ProxyDecision::direct(),
                }
            }
        }
    }

    /// Proxy URL to use for `destination`, `None` for a direct connection
    pub(crate) fn proxy_url_for(&self, destination: &Url) -> Option<Url> {
        self.select_transport(destination)
            .upstream_host
            .and_then(|host| host.to_url())
    }
}
