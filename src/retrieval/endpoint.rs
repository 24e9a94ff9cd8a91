use chrono::Utc;
use cron::Schedule;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::ProviderConfig;

/// How a retrieved file is handled, decided by its filename
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Archive,
    Pdf,
    Plain,
}

/// One remote file to mirror
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalEndpoint {
    remote_url: String,
    filename: String,
}

impl RetrievalEndpoint {
    /// `filename` defaults to the last path segment of `remote_url`
    pub fn new(remote_url: impl Into<String>, filename: Option<String>) -> Self {
        let remote_url = remote_url.into();
        let filename = filename
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| last_segment(&remote_url).to_string());

        Self {
            remote_url,
            filename,
        }
    }

    pub fn remote_url(&self) -> &str {
        &self.remote_url
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn kind(&self) -> AssetKind {
        let lower = self.filename.to_ascii_lowercase();
        if lower.ends_with(".zip") {
            AssetKind::Archive
        } else if lower.ends_with(".pdf") {
            AssetKind::Pdf
        } else {
            AssetKind::Plain
        }
    }

    /// Remote URL with a `_=<token>` parameter appended
    pub fn url_with_cache_buster(&self, token: u64) -> String {
        let separator = if self.remote_url.contains('?') { '&' } else { '?' };
        format!("{}{}_={}", self.remote_url, separator, token)
    }
}

fn last_segment(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().unwrap_or(path)
}

/// Produces strictly increasing cache-busting tokens based on wall-clock millis
#[derive(Debug, Default)]
pub struct CacheBuster {
    last: AtomicU64,
}

impl CacheBuster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u64 {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        let mut previous = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(previous + 1);
            match self.last.compare_exchange_weak(
                previous,
                candidate,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(actual) => previous = actual,
            }
        }
    }
}

/// A provider's set of endpoints, retrieved together on a cron schedule
#[derive(Debug, Clone)]
pub struct RetrievalJob {
    pub provider: String,
    pub endpoints: Vec<RetrievalEndpoint>,
    pub schedule: Schedule,
    pub cache_group: String,
}

impl RetrievalJob {
    pub fn from_config(provider: &str, config: &ProviderConfig) -> Result<Self, cron::error::Error> {
        let schedule = Schedule::from_str(&config.interval)?;
        let endpoints = config
            .endpoints
            .iter()
            .map(|e| RetrievalEndpoint::new(e.remote_url.clone(), e.filename.clone()))
            .collect();

        Ok(Self {
            provider: provider.to_string(),
            endpoints,
            schedule,
            cache_group: config.cache_group.clone(),
        })
    }
}
