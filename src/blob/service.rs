//! Blob storage façade
//!
//! [`BlobStorage`] is what application code depends on. [`BlobStorageService`]
//! implements it on top of whatever [`StorageClient`] a [`ClientFactory`]
//! hands out, checking that containers and blobs exist before touching them
//! and mapping client records into contracts.

use crate::blob::contracts::{BlobContract, BlobInfoContract, StorageContainerContract};
use crate::blob::mapper;
use crate::blob::models::{blob_path, folder_prefix};
use crate::client::{ClientFactory, DefaultClientFactory, StorageClient};
use crate::config::AzureBlobStorageOptions;
use crate::error::{Result, StorageError};
use crate::stream::StreamManager;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Container and blob operations against one storage account
///
/// Container-scoped operations take `container: Option<&str>`; `None` means
/// the container configured for the account.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    fn storage_account_name(&self) -> &str;

    fn list_containers(&self) -> BoxStream<'static, Result<StorageContainerContract>>;

    /// Create the container unless it already exists
    async fn create_container_if_not_exists(&self, container: Option<&str>) -> Result<()>;

    async fn delete_container(&self, container: Option<&str>) -> Result<()>;

    /// Blobs whose names start with `folder`, in listing order
    fn list_blobs(
        &self,
        container: Option<&str>,
        folder: Option<&str>,
    ) -> BoxStream<'static, Result<BlobInfoContract>>;

    async fn get_blob_contents(&self, blob: &str, container: Option<&str>) -> Result<BlobContract>;

    /// Time-limited read URL, or `None` when the account credentials can't sign
    async fn get_blob_url(&self, blob: &str, container: Option<&str>) -> Result<Option<String>>;

    /// Upload to `folder/blob` (or `blob` without a folder), overwriting
    async fn upload_blob(
        &self,
        blob: &str,
        content_type: &str,
        content: Bytes,
        container: Option<&str>,
        folder: Option<&str>,
    ) -> Result<()>;

    async fn delete_blob(&self, blob: &str, container: Option<&str>) -> Result<()>;

    /// Delete every blob under `folder/`
    ///
    /// Not atomic: the first failure stops the sweep and leaves the blobs
    /// deleted so far deleted.
    async fn delete_folder(&self, folder: &str, container: Option<&str>) -> Result<()>;

    async fn container_exists(&self, container: Option<&str>) -> Result<bool>;
}

/// [`BlobStorage`] backed by the client of factory `F`
pub struct BlobStorageService<F: ClientFactory> {
    factory: Arc<F>,
    client: Arc<dyn StorageClient>,
    account_name: String,
    default_container: Option<String>,
    stream_manager: StreamManager,
    file_url_expires: Duration,
}

impl<F: ClientFactory> BlobStorageService<F> {
    /// Build the service; without a stream manager the process-wide one is used
    pub fn new(factory: F, stream_manager: Option<StreamManager>) -> Result<Self> {
        let client = factory.client()?;
        let file_url_expires = factory.file_url_expires();
        let account_name = client.account_name();
        let default_container = factory.default_container_name();

        debug!(
            account = %account_name,
            container = ?default_container,
            "Created blob storage service"
        );

        Ok(Self {
            factory: Arc::new(factory),
            client,
            account_name,
            default_container,
            stream_manager: stream_manager.unwrap_or_else(|| StreamManager::global().clone()),
            file_url_expires,
        })
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn client(&self) -> Arc<dyn StorageClient> {
        Arc::clone(&self.client)
    }

    pub fn stream_manager(&self) -> &StreamManager {
        &self.stream_manager
    }

    pub fn default_container(&self) -> Option<&str> {
        self.default_container.as_deref()
    }

    fn resolve_container(&self, container: Option<&str>) -> Result<String> {
        match container.filter(|c| !c.trim().is_empty()) {
            Some(container) => Ok(container.to_string()),
            None => self.default_container.clone().ok_or_else(|| {
                StorageError::invalid_argument(
                    "No container given and no default container configured",
                )
            }),
        }
    }

    async fn ensure_container(&self, container: &str) -> Result<()> {
        if !self.client.container_exists(container).await? {
            return Err(StorageError::container_not_found(container));
        }
        Ok(())
    }

    async fn ensure_blob(&self, container: &str, blob: &str) -> Result<()> {
        self.ensure_container(container).await?;
        if !self.client.blob_exists(container, blob).await? {
            return Err(StorageError::blob_not_found(blob, container));
        }
        Ok(())
    }
}

impl BlobStorageService<DefaultClientFactory> {
    /// Service for the account described by `options`
    pub fn from_options(
        options: AzureBlobStorageOptions,
        stream_manager: Option<StreamManager>,
    ) -> Result<Self> {
        Self::new(DefaultClientFactory::new(options), stream_manager)
    }
}

#[async_trait]
impl<F: ClientFactory> BlobStorage for BlobStorageService<F> {
    fn storage_account_name(&self) -> &str {
        &self.account_name
    }

    fn list_containers(&self) -> BoxStream<'static, Result<StorageContainerContract>> {
        debug!(account = %self.account_name, "Listing containers");
        self.client
            .list_containers()
            .map_ok(mapper::to_container_contract)
            .boxed()
    }

    async fn create_container_if_not_exists(&self, container: Option<&str>) -> Result<()> {
        let container = self.resolve_container(container)?;
        if self.client.create_container(&container).await? {
            info!(container = %container, "Created container");
        } else {
            debug!(container = %container, "Container already exists");
        }
        Ok(())
    }

    async fn delete_container(&self, container: Option<&str>) -> Result<()> {
        let container = self.resolve_container(container)?;
        self.ensure_container(&container).await?;

        self.client.delete_container(&container).await?;
        info!(container = %container, "Deleted container");
        Ok(())
    }

    fn list_blobs(
        &self,
        container: Option<&str>,
        folder: Option<&str>,
    ) -> BoxStream<'static, Result<BlobInfoContract>> {
        let container = match self.resolve_container(container) {
            Ok(container) => container,
            Err(e) => return stream::once(async move { Err(e) }).boxed(),
        };
        let prefix = folder.filter(|f| !f.is_empty()).map(str::to_string);
        let client = Arc::clone(&self.client);

        debug!(container = %container, prefix = ?prefix, "Listing blobs");

        stream::once(async move {
            if !client.container_exists(&container).await? {
                return Err(StorageError::container_not_found(container));
            }
            Ok(client.list_blobs(&container, prefix))
        })
        .try_flatten()
        .map_ok(|item| mapper::to_blob_info_contract(&item))
        .boxed()
    }

    async fn get_blob_contents(&self, blob: &str, container: Option<&str>) -> Result<BlobContract> {
        let container = self.resolve_container(container)?;
        self.ensure_blob(&container, blob).await?;

        let properties = self.client.get_blob_properties(&container, blob).await?;
        let size = usize::try_from(properties.content_length).unwrap_or(0);
        let mut content = self.stream_manager.get_stream_with_capacity(size);

        // Ranged reads of 0-byte blobs fail with 416
        if size > 0 {
            self.client
                .download_blob(&container, blob, &mut content)
                .await?;
        }
        content.rewind();

        debug!(container = %container, blob = %blob, size = content.len(), "Downloaded blob");
        Ok(mapper::to_blob_contract(blob, &properties, content))
    }

    async fn get_blob_url(&self, blob: &str, container: Option<&str>) -> Result<Option<String>> {
        let container = self.resolve_container(container)?;
        self.ensure_blob(&container, blob).await?;

        if !self.client.can_generate_sas() {
            debug!(account = %self.account_name, "Credentials cannot sign, no URL generated");
            return Ok(None);
        }

        let expires_on = chrono::Duration::from_std(self.file_url_expires)
            .ok()
            .and_then(|expires_in| Utc::now().checked_add_signed(expires_in))
            .ok_or_else(|| {
                StorageError::config(format!(
                    "URL expiry of {}s is out of range",
                    self.file_url_expires.as_secs()
                ))
            })?;
        let url = self
            .client
            .generate_read_sas_url(&container, blob, expires_on)
            .await?;

        Ok(Some(url))
    }

    async fn upload_blob(
        &self,
        blob: &str,
        content_type: &str,
        content: Bytes,
        container: Option<&str>,
        folder: Option<&str>,
    ) -> Result<()> {
        let container = self.resolve_container(container)?;
        self.ensure_container(&container).await?;

        let path = blob_path(folder, blob);
        let size = content.len();
        self.client
            .upload_blob(&container, &path, content_type, content)
            .await?;

        info!(container = %container, blob = %path, size, "Uploaded blob");
        Ok(())
    }

    async fn delete_blob(&self, blob: &str, container: Option<&str>) -> Result<()> {
        let container = self.resolve_container(container)?;
        self.ensure_blob(&container, blob).await?;

        self.client.delete_blob(&container, blob).await?;
        info!(container = %container, blob = %blob, "Deleted blob");
        Ok(())
    }

    async fn delete_folder(&self, folder: &str, container: Option<&str>) -> Result<()> {
        let container = self.resolve_container(container)?;
        let prefix = folder_prefix(folder);

        let mut blobs = self.list_blobs(Some(&container), Some(&prefix));
        let mut deleted = 0usize;
        while let Some(blob) = blobs.try_next().await? {
            self.delete_blob(&blob.name, Some(&container)).await?;
            deleted += 1;
        }

        info!(container = %container, folder = %prefix, deleted, "Deleted folder");
        Ok(())
    }

    async fn container_exists(&self, container: Option<&str>) -> Result<bool> {
        let container = self.resolve_container(container)?;
        self.client.container_exists(&container).await
    }
}
