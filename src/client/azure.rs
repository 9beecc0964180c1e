//! Azure Blob Storage client backed by the `azure_storage_blobs` SDK

use crate::blob::models::{BlobItem, BlobKind};
use crate::client::connection::{ConnectionString, Credentials};
use crate::client::factory::ClientOptions;
use crate::client::StorageClient;
use crate::error::{Result, StorageError};
use crate::stream::PooledBuffer;
use async_trait::async_trait;
use azure_core::auth::Secret;
use azure_core::{RetryOptions, StatusCode};
use azure_storage::shared_access_signature::service_sas::BlobSasPermissions;
use azure_storage::{CloudLocation, StorageCredentials};
use azure_storage_blobs::blob::{Blob, BlobType};
use azure_storage_blobs::prelude::*;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use time::OffsetDateTime;
use tracing::debug;

/// Storage client talking to an Azure storage account
pub struct AzureStorageClient {
    account_name: String,
    service: BlobServiceClient,
    can_sign: bool,
}

impl AzureStorageClient {
    pub fn from_connection_string(connection_string: &str, options: &ClientOptions) -> Result<Self> {
        let parsed = ConnectionString::parse(connection_string)?;
        Self::new(&parsed, options)
    }

    pub fn new(connection: &ConnectionString, options: &ClientOptions) -> Result<Self> {
        let account = connection.account_name.clone();

        let credentials = match &connection.credentials {
            Credentials::AccountKey(key) => {
                StorageCredentials::access_key(account.clone(), Secret::new(key.clone()))
            }
            Credentials::SasToken(token) => StorageCredentials::sas_token(token.as_str())?,
            Credentials::Anonymous => StorageCredentials::anonymous(),
        };

        let mut builder = if connection.uses_default_endpoint() {
            ClientBuilder::new(account.clone(), credentials)
        } else {
            ClientBuilder::with_location(
                CloudLocation::Custom {
                    account: account.clone(),
                    uri: connection.blob_endpoint(),
                },
                credentials,
            )
        };

        if options.disable_retries {
            builder = builder.retry(RetryOptions::none());
        }

        debug!(account = %account, endpoint = %connection.blob_endpoint(), "Created Azure blob service client");

        Ok(Self {
            account_name: account,
            service: builder.blob_service_client(),
            can_sign: connection.can_sign(),
        })
    }

    fn container_client(&self, container: &str) -> ContainerClient {
        self.service.container_client(container)
    }

    fn blob_client(&self, container: &str, blob: &str) -> BlobClient {
        self.container_client(container).blob_client(blob)
    }
}

#[async_trait]
impl StorageClient for AzureStorageClient {
    fn account_name(&self) -> String {
        self.account_name.clone()
    }

    fn list_containers(&self) -> BoxStream<'static, Result<String>> {
        self.service
            .list_containers()
            .into_stream()
            .map_err(StorageError::from)
            .map_ok(|page| {
                stream::iter(
                    page.containers
                        .into_iter()
                        .map(|container| Ok::<_, StorageError>(container.name)),
                )
            })
            .try_flatten()
            .boxed()
    }

    async fn container_exists(&self, container: &str) -> Result<bool> {
        Ok(self.container_client(container).exists().await?)
    }

    async fn create_container(&self, container: &str) -> Result<bool> {
        match self.container_client(container).create().await {
            Ok(_) => Ok(true),
            Err(e) if has_status(&e, StatusCode::Conflict) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_container(&self, container: &str) -> Result<()> {
        self.container_client(container).delete().await?;
        Ok(())
    }

    fn list_blobs(
        &self,
        container: &str,
        prefix: Option<String>,
    ) -> BoxStream<'static, Result<BlobItem>> {
        let mut builder = self.container_client(container).list_blobs();
        if let Some(prefix) = prefix {
            builder = builder.prefix(prefix);
        }

        builder
            .into_stream()
            .map_err(StorageError::from)
            .map_ok(|page| {
                let items: Vec<Result<BlobItem>> =
                    page.blobs.blobs().map(|blob| Ok(blob_item(blob))).collect();
                stream::iter(items)
            })
            .try_flatten()
            .boxed()
    }

    async fn blob_exists(&self, container: &str, blob: &str) -> Result<bool> {
        Ok(self.blob_client(container, blob).exists().await?)
    }

    async fn get_blob_properties(&self, container: &str, blob: &str) -> Result<BlobItem> {
        let response = self.blob_client(container, blob).get_properties().await?;
        Ok(blob_item(&response.blob))
    }

    async fn download_blob(
        &self,
        container: &str,
        blob: &str,
        target: &mut PooledBuffer,
    ) -> Result<()> {
        let mut chunks = self.blob_client(container, blob).get().into_stream();
        while let Some(chunk) = chunks.next().await {
            let data = chunk?.data.collect().await?;
            target.extend_from_slice(&data);
        }

        Ok(())
    }

    async fn upload_blob(
        &self,
        container: &str,
        blob: &str,
        content_type: &str,
        content: Bytes,
    ) -> Result<()> {
        self.blob_client(container, blob)
            .put_block_blob(content)
            .content_type(content_type.to_string())
            .await?;
        Ok(())
    }

    async fn delete_blob(&self, container: &str, blob: &str) -> Result<()> {
        self.blob_client(container, blob)
            .delete()
            .delete_snapshots_method(DeleteSnapshotsMethod::Include)
            .await?;
        Ok(())
    }

    fn can_generate_sas(&self) -> bool {
        self.can_sign
    }

    async fn generate_read_sas_url(
        &self,
        container: &str,
        blob: &str,
        expires_on: DateTime<Utc>,
    ) -> Result<String> {
        let blob_client = self.blob_client(container, blob);
        let expiry = OffsetDateTime::from_unix_timestamp(expires_on.timestamp())
            .map_err(|e| StorageError::invalid_argument(format!("Invalid expiry: {e}")))?;
        let permissions = BlobSasPermissions {
            read: true,
            ..Default::default()
        };

        let sas = blob_client.shared_access_signature(permissions, expiry).await?;
        let url = blob_client.generate_signed_blob_url(&sas)?;

        Ok(url.to_string())
    }
}

fn has_status(error: &azure_core::Error, status: StatusCode) -> bool {
    error
        .as_http_error()
        .is_some_and(|e| e.status() == status)
}

fn blob_item(blob: &Blob) -> BlobItem {
    let properties = &blob.properties;

    #[allow(unreachable_patterns)]
    let kind = match properties.blob_type {
        BlobType::BlockBlob => BlobKind::Block,
        BlobType::PageBlob => BlobKind::Page,
        BlobType::AppendBlob => BlobKind::Append,
        _ => BlobKind::Block,
    };

    BlobItem {
        name: blob.name.clone(),
        kind,
        content_type: properties.content_type.clone(),
        content_encoding: properties.content_encoding.clone(),
        content_length: properties.content_length,
        created_on: DateTime::from_timestamp(properties.creation_time.unix_timestamp(), 0),
        access_tier: properties.access_tier.as_ref().map(|tier| format!("{tier:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONNECTION_STRING: &str =
        "DefaultEndpointsProtocol=https;AccountName=myacct;AccountKey=a2V5;EndpointSuffix=core.windows.net";

    #[test]
    fn test_client_from_connection_string() {
        let client =
            AzureStorageClient::from_connection_string(CONNECTION_STRING, &ClientOptions::default())
                .unwrap();

        assert_eq!(client.account_name(), "myacct");
        assert!(client.can_generate_sas());
    }

    #[test]
    fn test_sas_credentials_cannot_sign() {
        let client = AzureStorageClient::from_connection_string(
            "BlobEndpoint=https://myacct.blob.core.windows.net;SharedAccessSignature=sv=2021-08-06&sig=abc;AccountName=myacct",
            &ClientOptions::default(),
        )
        .unwrap();

        assert!(!client.can_generate_sas());
    }

    #[test]
    fn test_invalid_connection_string() {
        assert!(AzureStorageClient::from_connection_string("garbage", &ClientOptions::default()).is_err());
    }
}
