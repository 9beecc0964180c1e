//! Storage clients and client factories
//!
//! [`StorageClient`] is the seam between the service layer and a concrete
//! backend: the Azure SDK in production, or the in-process
//! [`MemoryStorageClient`]. A [`ClientFactory`] resolves configuration into
//! a client handle plus the default container, which is what lets several
//! independently configured accounts live in one process.

pub mod azure;
pub mod connection;
pub mod factory;
pub mod memory;

use crate::blob::models::BlobItem;
use crate::config::DEFAULT_FILE_URL_EXPIRES;
use crate::error::Result;
use crate::stream::PooledBuffer;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use std::sync::Arc;
use std::time::Duration;

pub use azure::AzureStorageClient;
pub use connection::{ConnectionString, Credentials};
pub use factory::{ClientOptions, DefaultClientFactory, MemoryClientFactory};
pub use memory::MemoryStorageClient;

/// Operations a storage backend offers to the service layer
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StorageClient: Send + Sync {
    fn account_name(&self) -> String;

    /// Names of all containers in the account, in service order
    fn list_containers(&self) -> BoxStream<'static, Result<String>>;

    async fn container_exists(&self, container: &str) -> Result<bool>;

    /// Create a container; `Ok(false)` when it already existed
    async fn create_container(&self, container: &str) -> Result<bool>;

    async fn delete_container(&self, container: &str) -> Result<()>;

    /// Blobs whose name starts with `prefix`, in service order
    fn list_blobs(&self, container: &str, prefix: Option<String>)
        -> BoxStream<'static, Result<BlobItem>>;

    async fn blob_exists(&self, container: &str, blob: &str) -> Result<bool>;

    async fn get_blob_properties(&self, container: &str, blob: &str) -> Result<BlobItem>;

    /// Append the blob's content to `target`
    async fn download_blob(&self, container: &str, blob: &str, target: &mut PooledBuffer)
        -> Result<()>;

    /// Create or overwrite a block blob
    async fn upload_blob(
        &self,
        container: &str,
        blob: &str,
        content_type: &str,
        content: Bytes,
    ) -> Result<()>;

    /// Delete a blob together with its snapshots; fails if it does not exist
    async fn delete_blob(&self, container: &str, blob: &str) -> Result<()>;

    /// Whether this client holds credentials able to sign SAS tokens
    fn can_generate_sas(&self) -> bool;

    /// Read-only SAS URL for one blob
    async fn generate_read_sas_url(
        &self,
        container: &str,
        blob: &str,
        expires_on: DateTime<Utc>,
    ) -> Result<String>;
}

/// Resolves configuration into a storage client handle
pub trait ClientFactory: Send + Sync + 'static {
    fn client(&self) -> Result<Arc<dyn StorageClient>>;

    /// Container used when an operation doesn't name one
    fn default_container_name(&self) -> Option<String>;

    /// Lifetime of generated read URLs
    fn file_url_expires(&self) -> Duration {
        DEFAULT_FILE_URL_EXPIRES
    }
}
