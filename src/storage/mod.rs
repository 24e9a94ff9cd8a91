//! File-system asset cache
//!
//! Layout is `<root>/<provider>/<filename>`. Writers stage into a sibling
//! `<filename>.tmp` and rename it into place, so readers only ever see a
//! complete previous or complete new file.

pub mod cache;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

pub use cache::ResponseCache;

/// Suffix of staged, not yet committed files
pub const TEMP_SUFFIX: &str = ".tmp";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("asset not found: {0}")]
    NotFound(String),

    #[error("invalid asset name: {0}")]
    InvalidName(String),

    #[error("size mismatch for {path}: declared {declared} bytes, transferred {transferred}")]
    SizeMismatch {
        path: String,
        declared: u64,
        transferred: u64,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// A committed asset as read back from the cache
#[derive(Debug, Clone)]
pub struct CachedAsset {
    pub provider: String,
    pub filename: String,
    pub bytes: Bytes,
    pub committed_at: DateTime<Utc>,
}

/// Root of the mirrored assets
#[derive(Debug, Clone)]
pub struct AssetStore {
    root: PathBuf,
}

impl AssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn provider_dir(&self, provider: &str) -> PathBuf {
        self.root.join(provider)
    }

    /// Resolve the final path of an asset, rejecting names that escape the
    /// provider directory. A leading `/` is stripped.
    pub fn asset_path(&self, provider: &str, filename: &str) -> Result<PathBuf> {
        let relative = sanitize_name(filename)?;
        Ok(self.provider_dir(provider).join(relative))
    }

    /// Create the provider directory if it does not exist yet
    pub async fn ensure_provider_dir(&self, provider: &str) -> Result<PathBuf> {
        let dir = self.provider_dir(provider);
        fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Open a staging file for `provider/filename`
    pub async fn stage(&self, provider: &str, filename: &str) -> Result<StagedFile> {
        let final_path = self.asset_path(provider, filename)?;
        StagedFile::create(final_path).await
    }

    /// Read a committed asset. Staging files are never served.
    pub async fn read(&self, provider: &str, filename: &str) -> Result<CachedAsset> {
        if filename.ends_with(TEMP_SUFFIX) {
            return Err(StorageError::InvalidName(filename.to_string()));
        }
        let path = self.asset_path(provider, filename)?;

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(format!("{}/{}", provider, filename)));
            }
            Err(e) => return Err(e.into()),
        };

        let committed_at = fs::metadata(&path)
            .await?
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Ok(CachedAsset {
            provider: provider.to_string(),
            filename: filename.to_string(),
            bytes: Bytes::from(bytes),
            committed_at,
        })
    }
}

/// Strip a leading `/` and reject empty names or `..` components
pub fn sanitize_name(name: &str) -> Result<PathBuf> {
    let trimmed = name.trim_start_matches('/');
    if trimmed.is_empty() {
        return Err(StorageError::InvalidName(name.to_string()));
    }

    let path = Path::new(trimmed);
    let safe = path
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !safe {
        return Err(StorageError::InvalidName(name.to_string()));
    }

    Ok(path.to_path_buf())
}

/// Temporary sibling of `path`
pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

/// A file being written next to its final location.
///
/// Dropping it without [`commit`](StagedFile::commit) removes the
/// temporary file and leaves the committed version untouched.
pub struct StagedFile {
    final_path: PathBuf,
    temp_path: PathBuf,
    file: Option<fs::File>,
    written: u64,
    committed: bool,
}

impl StagedFile {
    pub async fn create(final_path: PathBuf) -> Result<Self> {
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let temp_path = temp_path_for(&final_path);
        let file = fs::File::create(&temp_path).await?;

        Ok(Self {
            final_path,
            temp_path,
            file: Some(file),
            written: 0,
            committed: false,
        })
    }

    pub async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.write_all(chunk).await?;
            self.written += chunk.len() as u64;
        }
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Flush and close the staging file so it can be read back.
    ///
    /// Dropping the `StagedFile` afterwards still removes it.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }
        Ok(())
    }

    /// Verify the transferred size and rename into place.
    ///
    /// `declared` is the expected byte count, if one is known.
    pub async fn commit(mut self, declared: Option<u64>) -> Result<u64> {
        self.close().await?;

        if let Some(declared) = declared {
            if declared != self.written {
                return Err(StorageError::SizeMismatch {
                    path: self.final_path.display().to_string(),
                    declared,
                    transferred: self.written,
                });
            }
        }

        fs::rename(&self.temp_path, &self.final_path).await?;
        self.committed = true;
        Ok(self.written)
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.temp_path);
        }
    }
}
