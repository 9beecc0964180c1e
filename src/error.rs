use std::time::Duration;
use thiserror::Error;

/// Main error type for blob storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("The container '{container}' does not exist")]
    ContainerNotFound { container: String },

    #[error("Unable to get blobClient for '{blob}' in container '{container}' as no blob with this name exists in this container")]
    BlobNotFound { blob: String, container: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid connection string: {0}")]
    ConnectionStringError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Azure API error: {0}")]
    AzureApiError(#[from] azure_core::Error),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration loading error: {0}")]
    ConfigLoadError(#[from] config::ConfigError),

    #[error("Regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("URL error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

impl StorageError {
    pub fn container_not_found<S: Into<String>>(container: S) -> Self {
        Self::ContainerNotFound {
            container: container.into(),
        }
    }

    pub fn blob_not_found<S: Into<String>>(blob: S, container: S) -> Self {
        Self::BlobNotFound {
            blob: blob.into(),
            container: container.into(),
        }
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn connection_string<S: Into<String>>(msg: S) -> Self {
        Self::ConnectionStringError(msg.into())
    }

    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn backend<S: Into<String>>(msg: S) -> Self {
        Self::BackendError(msg.into())
    }

    /// True for the two "target does not exist" conditions raised by the service layer
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ContainerNotFound { .. } | Self::BlobNotFound { .. }
        )
    }
}

/// Result type alias for blob storage operations
pub type Result<T> = std::result::Result<T, StorageError>;
