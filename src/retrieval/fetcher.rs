//! Single-attempt retrieval of one endpoint into the asset store

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::{Client, Response};
use std::io::BufReader;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::archive::extract_zip;
use super::endpoint::{AssetKind, CacheBuster, RetrievalEndpoint};
use super::error::FetchError;
use super::pdf::is_pdf;
use crate::observability::Metrics;
use crate::proxy::{ClientOptions, ProxyRouter, TransportError};
use crate::storage::{AssetStore, StagedFile};

/// Files committed by one successful attempt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Retrieved {
    pub files: Vec<String>,
    pub bytes: u64,
}

/// Something that can make one attempt at retrieving an endpoint
#[async_trait]
pub trait AssetSource: Send + Sync {
    async fn retrieve(
        &self,
        provider: &str,
        endpoint: &RetrievalEndpoint,
    ) -> Result<Retrieved, FetchError>;
}

/// Downloads endpoints over the routed HTTP client and commits them
pub struct AssetFetcher {
    client: Client,
    store: AssetStore,
    cache_buster: CacheBuster,
    metrics: Arc<Metrics>,
}

impl AssetFetcher {
    pub fn new(
        router: &ProxyRouter,
        options: &ClientOptions,
        store: AssetStore,
        metrics: Arc<Metrics>,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            client: router.build_client(options)?,
            store,
            cache_buster: CacheBuster::new(),
            metrics,
        })
    }

    pub fn store(&self) -> &AssetStore {
        &self.store
    }

    async fn open(&self, endpoint: &RetrievalEndpoint) -> Result<(Response, Option<u64>), FetchError> {
        let url = endpoint.url_with_cache_buster(self.cache_buster.next());
        debug!(url, "Starting retrieval");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(endpoint.remote_url(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: endpoint.remote_url().to_string(),
                status: status.as_u16(),
            });
        }

        let declared = response.content_length();
        Ok((response, declared))
    }

    /// Map a failed body read.
    ///
    /// A transfer that ends before the declared length is a size mismatch,
    /// whatever the client reports as the cause.
    fn body_error(
        &self,
        endpoint: &RetrievalEndpoint,
        declared: Option<u64>,
        transferred: u64,
        error: reqwest::Error,
    ) -> FetchError {
        match declared {
            Some(declared) if transferred < declared => {
                warn!(
                    url = endpoint.remote_url(),
                    declared,
                    transferred,
                    error = %error,
                    "Transfer ended before the declared length"
                );
                FetchError::SizeMismatch {
                    name: endpoint.filename().to_string(),
                    declared,
                    transferred,
                }
            }
            _ => FetchError::from_reqwest(endpoint.remote_url(), error),
        }
    }

    fn check_length(
        &self,
        endpoint: &RetrievalEndpoint,
        declared: Option<u64>,
        transferred: u64,
    ) -> Result<(), FetchError> {
        match declared {
            Some(declared) if declared != transferred => {
                warn!(
                    url = endpoint.remote_url(),
                    declared, transferred, "Transferred size differs from the declared length"
                );
                Err(FetchError::SizeMismatch {
                    name: endpoint.filename().to_string(),
                    declared,
                    transferred,
                })
            }
            _ => Ok(()),
        }
    }

    async fn read_body(
        &self,
        endpoint: &RetrievalEndpoint,
        mut response: Response,
        declared: Option<u64>,
    ) -> Result<Bytes, FetchError> {
        let mut body = BytesMut::new();
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => body.extend_from_slice(&chunk),
                Ok(None) => break,
                Err(e) => return Err(self.body_error(endpoint, declared, body.len() as u64, e)),
            }
        }

        self.check_length(endpoint, declared, body.len() as u64)?;
        Ok(body.freeze())
    }

    /// Stream the body into `staged`, checking the declared length
    async fn spool(
        &self,
        endpoint: &RetrievalEndpoint,
        mut response: Response,
        declared: Option<u64>,
        staged: &mut StagedFile,
    ) -> Result<(), FetchError> {
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => staged.write(&chunk).await?,
                Ok(None) => break,
                Err(e) => return Err(self.body_error(endpoint, declared, staged.written(), e)),
            }
        }

        self.check_length(endpoint, declared, staged.written())
    }

    async fn retrieve_archive(
        &self,
        provider: &str,
        endpoint: &RetrievalEndpoint,
    ) -> Result<Retrieved, FetchError> {
        let (response, declared) = self.open(endpoint).await?;

        // The archive itself is never committed; its staging file goes away
        // when `spooled` is dropped.
        let mut spooled = self.store.stage(provider, endpoint.filename()).await?;
        self.spool(endpoint, response, declared, &mut spooled).await?;
        spooled.close().await?;

        let archive_path = spooled.temp_path().to_path_buf();
        let target_dir = self.store.provider_dir(provider);
        let entries = tokio::task::spawn_blocking(move || -> Result<_, FetchError> {
            let file = std::fs::File::open(&archive_path)?;
            extract_zip(BufReader::new(file), &target_dir)
        })
        .await
        .map_err(|e| FetchError::Io(std::io::Error::other(e)))??;
        drop(spooled);

        for _ in &entries {
            self.metrics.asset_committed();
        }

        Ok(Retrieved {
            bytes: entries.iter().map(|e| e.size).sum(),
            files: entries.into_iter().map(|e| e.name).collect(),
        })
    }

    async fn retrieve_pdf(
        &self,
        provider: &str,
        endpoint: &RetrievalEndpoint,
    ) -> Result<Retrieved, FetchError> {
        let (response, declared) = self.open(endpoint).await?;
        let body = self.read_body(endpoint, response, declared).await?;

        if !is_pdf(&body) {
            return Err(FetchError::InvalidFormat(format!(
                "{} did not return a PDF document",
                endpoint.remote_url()
            )));
        }

        let mut staged = self.store.stage(provider, endpoint.filename()).await?;
        staged.write(&body).await?;
        let size = staged.commit(declared).await?;
        self.metrics.asset_committed();

        Ok(Retrieved {
            files: vec![endpoint.filename().to_string()],
            bytes: size,
        })
    }

    async fn retrieve_plain(
        &self,
        provider: &str,
        endpoint: &RetrievalEndpoint,
    ) -> Result<Retrieved, FetchError> {
        let (response, declared) = self.open(endpoint).await?;
        let mut staged = self.store.stage(provider, endpoint.filename()).await?;

        self.spool(endpoint, response, declared, &mut staged).await?;
        let size = staged.commit(declared).await?;
        self.metrics.asset_committed();

        Ok(Retrieved {
            files: vec![endpoint.filename().to_string()],
            bytes: size,
        })
    }
}

#[async_trait]
impl AssetSource for AssetFetcher {
    async fn retrieve(
        &self,
        provider: &str,
        endpoint: &RetrievalEndpoint,
    ) -> Result<Retrieved, FetchError> {
        let retrieved = match endpoint.kind() {
            AssetKind::Archive => self.retrieve_archive(provider, endpoint).await?,
            AssetKind::Pdf => self.retrieve_pdf(provider, endpoint).await?,
            AssetKind::Plain => self.retrieve_plain(provider, endpoint).await?,
        };

        info!(
            provider,
            url = endpoint.remote_url(),
            files = retrieved.files.len(),
            bytes = retrieved.bytes,
            "Retrieved third party asset"
        );
        Ok(retrieved)
    }
}
