//! Service registration
//!
//! Wires configured storage accounts into blob storage services that the
//! rest of an application can look up by default, by factory type or by
//! name. Every service registered here shares one [`StreamManager`].

use crate::blob::{BlobStorage, BlobStorageService};
use crate::client::{ClientFactory, DefaultClientFactory};
use crate::config::{AzureBlobStorageOptions, Settings};
use crate::error::{Result, StorageError};
use crate::stream::StreamManager;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

type AnyService = Arc<dyn Any + Send + Sync>;

pub struct ServiceRegistry {
    stream_manager: StreamManager,
    default: Option<Arc<dyn BlobStorage>>,
    typed: HashMap<TypeId, AnyService>,
    named: HashMap<String, Arc<dyn BlobStorage>>,
}

impl ServiceRegistry {
    /// Empty registry sharing the process-wide stream manager
    pub fn new() -> Self {
        Self::with_stream_manager(StreamManager::global().clone())
    }

    pub fn with_stream_manager(stream_manager: StreamManager) -> Self {
        Self {
            stream_manager,
            default: None,
            typed: HashMap::new(),
            named: HashMap::new(),
        }
    }

    /// Registry with the default account and every `[accounts.<name>]` section
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let mut registry = Self::with_stream_manager(StreamManager::new(&settings.stream_manager));
        registry.add_default_blob_storage_from(settings)?;
        Ok(registry)
    }

    pub fn stream_manager(&self) -> &StreamManager {
        &self.stream_manager
    }

    /// Register the default account
    ///
    /// The service becomes both the untyped default and the typed
    /// `BlobStorageService<DefaultClientFactory>`.
    pub fn add_default_blob_storage(&mut self, options: AzureBlobStorageOptions) -> Result<&mut Self> {
        options.validate()?;
        let service = self.register_typed(DefaultClientFactory::new(options))?;
        self.default = Some(service);
        Ok(self)
    }

    /// Register the default account, when configured, and every named account
    pub fn add_default_blob_storage_from(&mut self, settings: &Settings) -> Result<&mut Self> {
        if settings.has_default_account() {
            self.add_default_blob_storage(settings.azure_blob_storage.clone())?;
        }
        for (name, options) in &settings.accounts {
            self.add_named_blob_storage(name, options.clone())?;
        }
        Ok(self)
    }

    /// Register a service for a custom factory type
    ///
    /// A later registration of the same factory type replaces the earlier one.
    pub fn add_blob_storage<F: ClientFactory>(&mut self, factory: F) -> Result<&mut Self> {
        self.register_typed(factory)?;
        Ok(self)
    }

    pub fn add_named_blob_storage<S: Into<String>>(
        &mut self,
        name: S,
        options: AzureBlobStorageOptions,
    ) -> Result<&mut Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(StorageError::config("Registration name cannot be empty"));
        }
        options
            .validate()
            .map_err(|e| StorageError::config(format!("Account '{name}': {e}")))?;

        let service = BlobStorageService::new(
            DefaultClientFactory::new(options),
            Some(self.stream_manager.clone()),
        )?;

        debug!(name = %name, account = %service.storage_account_name(), "Registered named blob storage");
        self.named.insert(name, Arc::new(service));
        Ok(self)
    }

    pub fn default_blob_storage(&self) -> Result<Arc<dyn BlobStorage>> {
        self.default
            .clone()
            .ok_or_else(|| StorageError::config("No default blob storage registered"))
    }

    pub fn blob_storage<F: ClientFactory>(&self) -> Result<Arc<BlobStorageService<F>>> {
        self.typed
            .get(&TypeId::of::<F>())
            .cloned()
            .and_then(|service| service.downcast::<BlobStorageService<F>>().ok())
            .ok_or_else(|| {
                StorageError::config(format!(
                    "No blob storage registered for factory '{}'",
                    std::any::type_name::<F>()
                ))
            })
    }

    pub fn named_blob_storage(&self, name: &str) -> Result<Arc<dyn BlobStorage>> {
        self.named
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::config(format!("No blob storage registered as '{name}'")))
    }

    /// Names of the named registrations, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.named.keys().cloned().collect();
        names.sort();
        names
    }

    fn register_typed<F: ClientFactory>(&mut self, factory: F) -> Result<Arc<dyn BlobStorage>> {
        let service = Arc::new(BlobStorageService::new(
            factory,
            Some(self.stream_manager.clone()),
        )?);

        debug!(
            factory = std::any::type_name::<F>(),
            account = %service.storage_account_name(),
            "Registered blob storage"
        );

        let any: AnyService = service.clone();
        self.typed.insert(TypeId::of::<F>(), any);

        let storage: Arc<dyn BlobStorage> = service;
        Ok(storage)
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{MemoryClientFactory, MemoryStorageClient};

    const CONNECTION_STRING: &str =
        "DefaultEndpointsProtocol=https;AccountName=primary;AccountKey=a2V5;EndpointSuffix=core.windows.net";
    const ARCHIVE_CONNECTION_STRING: &str =
        "DefaultEndpointsProtocol=https;AccountName=archive;AccountKey=a2V5;EndpointSuffix=core.windows.net";

    #[test]
    fn test_default_registration() {
        let mut registry = ServiceRegistry::with_stream_manager(StreamManager::default());
        registry
            .add_default_blob_storage(AzureBlobStorageOptions::new(CONNECTION_STRING))
            .unwrap();

        let default = registry.default_blob_storage().unwrap();
        assert_eq!(default.storage_account_name(), "primary");

        let typed = registry.blob_storage::<DefaultClientFactory>().unwrap();
        assert_eq!(typed.storage_account_name(), "primary");
    }

    #[test]
    fn test_lookups_fail_when_unregistered() {
        let registry = ServiceRegistry::with_stream_manager(StreamManager::default());
        assert!(registry.default_blob_storage().is_err());
        assert!(registry.blob_storage::<MemoryClientFactory>().is_err());
        assert!(registry.named_blob_storage("archive").is_err());
    }

    #[test]
    fn test_typed_registrations_coexist() {
        let mut registry = ServiceRegistry::with_stream_manager(StreamManager::default());
        registry
            .add_default_blob_storage(AzureBlobStorageOptions::new(CONNECTION_STRING))
            .unwrap()
            .add_blob_storage(MemoryClientFactory::new(Arc::new(MemoryStorageClient::new("memacct"))))
            .unwrap();

        assert_eq!(
            registry
                .blob_storage::<MemoryClientFactory>()
                .unwrap()
                .storage_account_name(),
            "memacct"
        );
        assert_eq!(registry.default_blob_storage().unwrap().storage_account_name(), "primary");
    }

    #[test]
    fn test_from_settings_registers_named_accounts() {
        let mut settings = Settings::new();
        settings.azure_blob_storage = AzureBlobStorageOptions::new(CONNECTION_STRING);
        settings.accounts.insert(
            "archive".to_string(),
            AzureBlobStorageOptions::new(ARCHIVE_CONNECTION_STRING).with_container("archive"),
        );

        let registry = ServiceRegistry::from_settings(&settings).unwrap();
        assert_eq!(registry.names(), vec!["archive"]);
        assert_eq!(
            registry
                .named_blob_storage("archive")
                .unwrap()
                .storage_account_name(),
            "archive"
        );
    }

    #[test]
    fn test_from_settings_with_named_accounts_only() {
        let mut settings = Settings::new();
        settings.accounts.insert(
            "archive".to_string(),
            AzureBlobStorageOptions::new(ARCHIVE_CONNECTION_STRING),
        );

        let registry = ServiceRegistry::from_settings(&settings).unwrap();
        assert!(registry.named_blob_storage("archive").is_ok());
        assert!(registry.default_blob_storage().is_err());
        assert!(registry.blob_storage::<DefaultClientFactory>().is_err());
    }

    #[test]
    fn test_named_registration_validates_options() {
        let mut registry = ServiceRegistry::with_stream_manager(StreamManager::default());
        assert!(registry
            .add_named_blob_storage("archive", AzureBlobStorageOptions::default())
            .is_err());
        assert!(registry
            .add_named_blob_storage(" ", AzureBlobStorageOptions::new(CONNECTION_STRING))
            .is_err());
    }
}
