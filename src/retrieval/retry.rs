//! Fixed-backoff retries around a single-attempt [`AssetSource`]

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use super::endpoint::RetrievalEndpoint;
use super::error::FetchError;
use super::fetcher::{AssetSource, Retrieved};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            backoff: Duration::from_secs(3),
        }
    }
}

pub struct RetryCoordinator {
    source: Arc<dyn AssetSource>,
    policy: RetryPolicy,
}

impl RetryCoordinator {
    pub fn new(source: Arc<dyn AssetSource>, policy: RetryPolicy) -> Self {
        Self { source, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Retrieve `endpoint`, retrying transient failures.
    ///
    /// Returns the last error once attempts are exhausted, or the first
    /// non-retryable error immediately.
    pub async fn retrieve(
        &self,
        provider: &str,
        endpoint: &RetrievalEndpoint,
    ) -> Result<Retrieved, FetchError> {
        let url = endpoint.remote_url();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            attempts += 1;

            match self.source.retrieve(provider, endpoint).await {
                Ok(retrieved) => {
                    if attempts > 1 {
                        debug!(provider, url, attempts, "Retrieval succeeded after retry");
                    }
                    return Ok(retrieved);
                }
                Err(e) if !e.is_retryable() => {
                    error!(provider, url, attempts, error = %e, "Retrieval failed, not retrying");
                    return Err(e);
                }
                Err(e) => {
                    if attempts >= max_attempts {
                        error!(provider, url, attempts, error = %e, "Retrieval failed after retries");
                        return Err(e);
                    }

                    warn!(provider, url, attempts, error = %e, "Retrieval failed, retrying");
                    tokio::time::sleep(self.policy.backoff).await;
                }
            }
        }
    }
}
