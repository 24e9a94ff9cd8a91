//! Scheduled mirroring of third party assets into the local cache

pub mod archive;
mod endpoint;
mod error;
mod fetcher;
pub mod pdf;
mod retry;
mod scheduler;

pub use endpoint::{AssetKind, CacheBuster, RetrievalEndpoint, RetrievalJob};
pub use error::FetchError;
pub use fetcher::{AssetFetcher, AssetSource, Retrieved};
pub use retry::{RetryCoordinator, RetryPolicy};
pub use scheduler::{JobState, RetrievalScheduler, RunError, RunReport};
