use super::models::{Config, ProviderConfig, RouteConfig};
use crate::retrieval::RetrievalEndpoint;
use cron::Schedule;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} '{value}' must start with '/' and must not end with '/'")]
    InvalidContext { field: String, value: String },

    #[error("Upstream proxy host and port must be configured together")]
    IncompleteUpstreamProxy,

    #[error("Provider '{provider}' has an invalid interval '{interval}': {reason}")]
    InvalidInterval {
        provider: String,
        interval: String,
        reason: String,
    },

    #[error("Provider '{provider}' has an empty cache group")]
    EmptyCacheGroup { provider: String },

    #[error("Provider '{provider}' has no endpoints")]
    NoEndpoints { provider: String },

    #[error("Provider '{provider}' has an invalid endpoint URL '{url}'")]
    InvalidEndpointUrl { provider: String, url: String },

    #[error("Provider '{provider}' cannot derive a filename from '{url}'")]
    MissingFilename { provider: String, url: String },

    #[error("Route '{route}' has an invalid endpoint URL '{url}'")]
    InvalidRouteUrl { route: String, url: String },

    #[error("Route slug '{route}' must be a single non-empty path segment")]
    InvalidRouteSlug { route: String },

    #[error("Retry max_attempts must be at least 1")]
    InvalidMaxAttempts,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_contexts(config)?;
    validate_upstream_proxy(config)?;
    validate_retry(config)?;

    for (name, provider) in &config.providers {
        validate_provider(name, provider)?;
    }
    for (slug, route) in &config.routes {
        validate_route(slug, route)?;
    }
    Ok(())
}

fn validate_contexts(config: &Config) -> Result<(), ValidationError> {
    for (field, value) in [
        ("proxy_context", &config.server.proxy_context),
        ("delivery_context", &config.server.delivery_context),
    ] {
        if !value.starts_with('/') || value.ends_with('/') {
            return Err(ValidationError::InvalidContext {
                field: field.to_string(),
                value: value.clone(),
            });
        }
    }
    Ok(())
}

fn validate_upstream_proxy(config: &Config) -> Result<(), ValidationError> {
    let upstream = &config.upstream_proxy;
    let host_set = upstream.host.as_deref().is_some_and(|h| !h.is_empty());
    if host_set != upstream.port.is_some() {
        return Err(ValidationError::IncompleteUpstreamProxy);
    }
    Ok(())
}

fn validate_retry(config: &Config) -> Result<(), ValidationError> {
    if config.assets.retry.max_attempts == 0 {
        return Err(ValidationError::InvalidMaxAttempts);
    }
    Ok(())
}

fn validate_provider(name: &str, provider: &ProviderConfig) -> Result<(), ValidationError> {
    if let Err(e) = Schedule::from_str(&provider.interval) {
        return Err(ValidationError::InvalidInterval {
            provider: name.to_string(),
            interval: provider.interval.clone(),
            reason: e.to_string(),
        });
    }

    if provider.cache_group.trim().is_empty() {
        return Err(ValidationError::EmptyCacheGroup {
            provider: name.to_string(),
        });
    }

    if provider.endpoints.is_empty() {
        return Err(ValidationError::NoEndpoints {
            provider: name.to_string(),
        });
    }

    for endpoint in &provider.endpoints {
        if Url::parse(&endpoint.remote_url).is_err() {
            return Err(ValidationError::InvalidEndpointUrl {
                provider: name.to_string(),
                url: endpoint.remote_url.clone(),
            });
        }

        let resolved = RetrievalEndpoint::new(endpoint.remote_url.clone(), endpoint.filename.clone());
        if resolved.filename().is_empty() {
            return Err(ValidationError::MissingFilename {
                provider: name.to_string(),
                url: endpoint.remote_url.clone(),
            });
        }
    }

    Ok(())
}

fn validate_route(slug: &str, route: &RouteConfig) -> Result<(), ValidationError> {
    if slug.is_empty() || slug.contains('/') {
        return Err(ValidationError::InvalidRouteSlug {
            route: slug.to_string(),
        });
    }

    if Url::parse(&route.endpoint).is_err() {
        return Err(ValidationError::InvalidRouteUrl {
            route: slug.to_string(),
            url: route.endpoint.clone(),
        });
    }
    Ok(())
}
