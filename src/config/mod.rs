//! Configuration management for the privacy proxy
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use privacy_proxy::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `PRIVACY_PROXY__<section>__<key>`
//!
//! Examples:
//! - `PRIVACY_PROXY__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `PRIVACY_PROXY__ASSETS__FILE_LOCATION=/var/cache/assets`
//!
//! Upstream proxy credentials are only read from `UPSTREAM_PROXY_USERNAME`
//! and `UPSTREAM_PROXY_PASSWORD`.
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/privacy-proxy.toml`.
//! This can be overridden using the `PRIVACY_PROXY_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use models::{
    AssetsConfig, Config, EndpointConfig, HttpConfig, ProviderConfig, RetryConfig, RouteConfig,
    ServerConfig, UpstreamProxyConfig,
};
pub use validation::ValidationError;

use std::collections::BTreeMap;
use thiserror::Error;

use crate::proxy::{HostPort, ProxyCredentials, ProxyRouter};
use crate::retrieval::{RetrievalJob, RetryPolicy};
use crate::routing::RoutePolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("Route '{route}' is invalid: {source}")]
    InvalidRoute {
        route: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Provider '{provider}' is invalid: {source}")]
    InvalidProvider {
        provider: String,
        #[source]
        source: cron::error::Error,
    },
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`PRIVACY_PROXY__*`)
    /// 2. TOML file (default: `config/privacy-proxy.toml`)
    /// 3. Default values
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Router for outbound connections built from `[upstream_proxy]`
    pub fn proxy_router(&self) -> ProxyRouter {
        let upstream = &self.upstream_proxy;
        let host = match (&upstream.host, upstream.port) {
            (Some(host), Some(port)) if !host.is_empty() => Some(HostPort::new(host.clone(), port)),
            _ => None,
        };

        let credentials = upstream.username.as_ref().map(|username| ProxyCredentials {
            username: username.clone(),
            password: upstream.password.clone().unwrap_or_default(),
        });

        ProxyRouter::new(host, &upstream.non_proxy_hosts).with_credentials(credentials)
    }

    /// Route policies keyed by slug
    pub fn route_policies(&self) -> Result<BTreeMap<String, RoutePolicy>, ConfigError> {
        self.routes
            .iter()
            .map(|(slug, route)| {
                RoutePolicy::from_config(slug, route)
                    .map(|policy| (slug.clone(), policy))
                    .map_err(|source| ConfigError::InvalidRoute {
                        route: slug.clone(),
                        source,
                    })
            })
            .collect()
    }

    /// Retrieval jobs of all enabled providers, sorted by provider name
    pub fn retrieval_jobs(&self) -> Result<Vec<RetrievalJob>, ConfigError> {
        let mut jobs = self
            .providers
            .iter()
            .filter(|(_, provider)| provider.enabled)
            .map(|(name, provider)| {
                RetrievalJob::from_config(name, provider).map_err(|source| {
                    ConfigError::InvalidProvider {
                        provider: name.clone(),
                        source,
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        jobs.sort_by(|a, b| a.provider.cmp(&b.provider));
        Ok(jobs)
    }

    /// Cache group of every configured provider, enabled or not
    pub fn cache_groups(&self) -> BTreeMap<String, String> {
        self.providers
            .iter()
            .map(|(name, provider)| (name.clone(), provider.cache_group.clone()))
            .collect()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.assets.retry.max_attempts,
            backoff: std::time::Duration::from_millis(self.assets.retry.backoff_ms),
        }
    }
}
