use thiserror::Error;

use crate::storage::StorageError;

/// Failure of a single retrieval attempt
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("transport failure for {url}: {message}")]
    Transport { url: String, message: String },

    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("size mismatch for {name}: declared {declared} bytes, transferred {transferred}")]
    SizeMismatch {
        name: String,
        declared: u64,
        transferred: u64,
    },

    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("directory {path} unavailable: {source}")]
    DirectoryUnavailable {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    /// Transient failures are worth another attempt; broken content and a
    /// missing cache directory are not.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            FetchError::InvalidFormat(_) | FetchError::DirectoryUnavailable { .. }
        )
    }

    pub(crate) fn from_reqwest(url: &str, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else {
            FetchError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            }
        }
    }
}

impl From<StorageError> for FetchError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::SizeMismatch {
                path,
                declared,
                transferred,
            } => FetchError::SizeMismatch {
                name: path,
                declared,
                transferred,
            },
            StorageError::InvalidName(name) => {
                FetchError::InvalidFormat(format!("unsafe asset name '{}'", name))
            }
            StorageError::NotFound(name) => FetchError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                name,
            )),
            StorageError::Io(e) => FetchError::Io(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(FetchError::Timeout { url: "u".into() }.is_retryable());
        assert!(
            FetchError::SizeMismatch {
                name: "a.js".into(),
                declared: 10,
                transferred: 5
            }
            .is_retryable()
        );
        assert!(FetchError::Io(std::io::Error::other("disk")).is_retryable());
        assert!(!FetchError::InvalidFormat("not a pdf".into()).is_retryable());
        assert!(
            !FetchError::DirectoryUnavailable {
                path: "/x".into(),
                source: std::io::Error::other("denied"),
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_storage_size_mismatch_maps_to_fetch_size_mismatch() {
        let err: FetchError = StorageError::SizeMismatch {
            path: "example/app.js".into(),
            declared: 3,
            transferred: 2,
        }
        .into();
        assert!(matches!(
            err,
            FetchError::SizeMismatch {
                declared: 3,
                transferred: 2,
                ..
            }
        ));
    }
}
