//! Cron-driven retrieval runs, one task per provider

use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::endpoint::RetrievalJob;
use super::error::FetchError;
use super::retry::RetryCoordinator;
use crate::observability::Metrics;
use crate::storage::{AssetStore, ResponseCache};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("a run for {0} is already in progress")]
    AlreadyRunning(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Running,
}

/// Outcome of one run over all endpoints of a provider
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub provider: String,
    /// Committed files per successful endpoint
    pub succeeded: Vec<String>,
    /// Endpoint URL and error of each failed endpoint
    pub failed: Vec<(String, String)>,
    pub invalidated: usize,
}

struct ScheduledJob {
    job: RetrievalJob,
    running: AtomicBool,
}

impl ScheduledJob {
    fn state(&self) -> JobState {
        if self.running.load(Ordering::Acquire) {
            JobState::Running
        } else {
            JobState::Idle
        }
    }
}

/// Resets a job to idle when a run ends, however it ends
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct RetrievalScheduler {
    jobs: Vec<ScheduledJob>,
    coordinator: RetryCoordinator,
    store: AssetStore,
    cache: Arc<ResponseCache>,
    metrics: Arc<Metrics>,
}

impl RetrievalScheduler {
    pub fn new(
        jobs: Vec<RetrievalJob>,
        coordinator: RetryCoordinator,
        store: AssetStore,
        cache: Arc<ResponseCache>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let jobs = jobs
            .into_iter()
            .map(|job| ScheduledJob {
                job,
                running: AtomicBool::new(false),
            })
            .collect();

        Self {
            jobs,
            coordinator,
            store,
            cache,
            metrics,
        }
    }

    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.jobs.iter().map(|s| s.job.provider.as_str())
    }

    pub fn state(&self, provider: &str) -> Option<JobState> {
        self.find(provider).map(ScheduledJob::state)
    }

    fn find(&self, provider: &str) -> Option<&ScheduledJob> {
        self.jobs.iter().find(|s| s.job.provider == provider)
    }

    /// Retrieve every endpoint of `provider` once.
    ///
    /// Endpoints are processed in order and a failing endpoint does not stop
    /// the others. The provider's cache group is invalidated after the run.
    pub async fn run(&self, provider: &str) -> Result<RunReport, RunError> {
        let scheduled = self
            .find(provider)
            .ok_or_else(|| RunError::UnknownProvider(provider.to_string()))?;

        if scheduled
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(RunError::AlreadyRunning(provider.to_string()));
        }
        let _guard = RunGuard(&scheduled.running);

        let job = &scheduled.job;
        let dir = self.store.provider_dir(provider);
        if let Err(e) = self.store.ensure_provider_dir(provider).await {
            let source = match e {
                crate::storage::StorageError::Io(io) => io,
                other => std::io::Error::other(other.to_string()),
            };
            return Err(FetchError::DirectoryUnavailable {
                path: dir.display().to_string(),
                source,
            }
            .into());
        }

        info!(provider, endpoints = job.endpoints.len(), "Starting retrieval run");

        let mut report = RunReport {
            provider: provider.to_string(),
            ..RunReport::default()
        };

        for endpoint in &job.endpoints {
            match self.coordinator.retrieve(provider, endpoint).await {
                Ok(retrieved) => report.succeeded.extend(retrieved.files),
                Err(e) => {
                    self.metrics.retrieval_failed();
                    report
                        .failed
                        .push((endpoint.remote_url().to_string(), e.to_string()));
                }
            }
        }

        report.invalidated = self.cache.invalidate_group(&job.cache_group);

        info!(
            provider,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            invalidated = report.invalidated,
            "Finished retrieval run"
        );
        Ok(report)
    }

    async fn run_logged(&self, provider: &str) {
        match self.run(provider).await {
            Ok(_) => {}
            Err(RunError::AlreadyRunning(_)) => {
                warn!(provider, "Skipping scheduled run, previous run still in progress");
            }
            Err(e) => error!(provider, error = %e, "Retrieval run failed"),
        }
    }

    /// Spawn one task per job: an immediate run, then a run at every cron tick
    pub fn spawn(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        self.jobs
            .iter()
            .map(|scheduled| {
                let scheduler = Arc::clone(self);
                let provider = scheduled.job.provider.clone();
                tokio::spawn(async move { scheduler.run_forever(&provider).await })
            })
            .collect()
    }

    async fn run_forever(&self, provider: &str) {
        let Some(scheduled) = self.find(provider) else {
            return;
        };

        self.run_logged(provider).await;

        loop {
            let Some(next) = scheduled.job.schedule.upcoming(Utc).next() else {
                warn!(provider, "Schedule has no upcoming runs, stopping");
                return;
            };

            let delay = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            info!(provider, next_run = %next, "Next retrieval run scheduled");
            tokio::time::sleep(delay).await;

            self.run_logged(provider).await;
        }
    }
}
