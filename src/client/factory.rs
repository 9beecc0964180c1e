use crate::client::{AzureStorageClient, ClientFactory, MemoryStorageClient, StorageClient};
use crate::config::{AzureBlobStorageOptions, DEFAULT_FILE_URL_EXPIRES};
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;

/// Per-client transport options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientOptions {
    /// Fail on the first transport error instead of retrying
    pub disable_retries: bool,
}

/// Builds Azure SDK clients from [`AzureBlobStorageOptions`]
#[derive(Debug, Clone)]
pub struct DefaultClientFactory {
    options: AzureBlobStorageOptions,
}

impl DefaultClientFactory {
    pub fn new(options: AzureBlobStorageOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &AzureBlobStorageOptions {
        &self.options
    }

    /// Client with explicit transport options
    pub fn client_with(&self, client_options: &ClientOptions) -> Result<Arc<dyn StorageClient>> {
        self.options.validate()?;
        let client =
            AzureStorageClient::from_connection_string(&self.options.connection_string, client_options)?;
        Ok(Arc::new(client))
    }
}

impl ClientFactory for DefaultClientFactory {
    fn client(&self) -> Result<Arc<dyn StorageClient>> {
        self.client_with(&ClientOptions::default())
    }

    fn default_container_name(&self) -> Option<String> {
        self.options.container_name.clone()
    }

    fn file_url_expires(&self) -> Duration {
        self.options.file_url_expires()
    }
}

/// Hands out one shared [`MemoryStorageClient`]
#[derive(Debug, Clone)]
pub struct MemoryClientFactory {
    client: Arc<MemoryStorageClient>,
    container_name: Option<String>,
    file_url_expires: Duration,
}

impl MemoryClientFactory {
    pub fn new(client: Arc<MemoryStorageClient>) -> Self {
        Self {
            client,
            container_name: None,
            file_url_expires: DEFAULT_FILE_URL_EXPIRES,
        }
    }

    pub fn with_container<S: Into<String>>(mut self, container_name: S) -> Self {
        self.container_name = Some(container_name.into());
        self
    }

    pub fn with_file_url_expires(mut self, expires: Duration) -> Self {
        self.file_url_expires = expires;
        self
    }

    /// The backing client, for inspecting state in tests and tools
    pub fn storage(&self) -> Arc<MemoryStorageClient> {
        Arc::clone(&self.client)
    }
}

impl ClientFactory for MemoryClientFactory {
    fn client(&self) -> Result<Arc<dyn StorageClient>> {
        let client: Arc<dyn StorageClient> = self.client.clone();
        Ok(client)
    }

    fn default_container_name(&self) -> Option<String> {
        self.container_name.clone()
    }

    fn file_url_expires(&self) -> Duration {
        self.file_url_expires
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONNECTION_STRING: &str =
        "DefaultEndpointsProtocol=https;AccountName=factoryacct;AccountKey=a2V5;EndpointSuffix=core.windows.net";

    #[test]
    fn test_default_factory_builds_client() {
        let factory = DefaultClientFactory::new(
            AzureBlobStorageOptions::new(CONNECTION_STRING).with_container("uploads"),
        );

        let client = factory.client().unwrap();
        assert_eq!(client.account_name(), "factoryacct");
        assert_eq!(factory.default_container_name().as_deref(), Some("uploads"));
        assert_eq!(factory.file_url_expires(), Duration::from_secs(86_400));

        let client = factory
            .client_with(&ClientOptions {
                disable_retries: true,
            })
            .unwrap();
        assert!(client.can_generate_sas());
    }

    #[test]
    fn test_default_factory_rejects_empty_connection_string() {
        let factory = DefaultClientFactory::new(AzureBlobStorageOptions::default());
        assert!(factory.client().is_err());
    }

    #[tokio::test]
    async fn test_memory_factory_shares_client() {
        let factory = MemoryClientFactory::new(Arc::new(MemoryStorageClient::new("mem")));

        factory.client().unwrap().create_container("shared").await.unwrap();
        assert!(factory
            .client()
            .unwrap()
            .container_exists("shared")
            .await
            .unwrap());
        assert!(factory.storage().container_exists("shared").await.unwrap());
        assert_eq!(factory.default_container_name(), None);
    }
}
