//! HTTP client construction with per-destination proxy selection

use reqwest::{Client, Proxy};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use super::router::ProxyRouter;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Timeouts and identity for an outbound client
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Fixed User-Agent; `None` sends none unless a caller sets one
    pub user_agent: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(5),
            user_agent: None,
        }
    }
}

impl ProxyRouter {
    /// Build a client whose every connection is routed by this router.
    ///
    /// System proxy environment variables are ignored; the configured
    /// upstream and exclusion list are the only source of truth.
    pub fn build_client(&self, options: &ClientOptions) -> Result<Client, TransportError> {
        let mut builder = Client::builder()
            .connect_timeout(options.connect_timeout)
            .timeout(options.request_timeout)
            .redirect(reqwest::redirect::Policy::limited(10));

        if let Some(agent) = &options.user_agent {
            builder = builder.user_agent(agent);
        }

        match self.upstream() {
            Some(upstream) => {
                debug!(%upstream, "Building client with upstream proxy selection");
                let router = self.clone();
                let mut proxy = Proxy::custom(move |url| router.proxy_url_for(url));
                if let Some(creds) = self.credentials() {
                    proxy = proxy.basic_auth(&creds.username, &creds.password);
                }
                builder = builder.proxy(proxy);
            }
            None => {
                builder = builder.no_proxy();
            }
        }

        Ok(builder.build()?)
    }
}
