//! Integration tests for configuration loading, service registration and
//! health checks

use azblob_service::blob::BlobStorage;
use azblob_service::client::{
    DefaultClientFactory, MemoryClientFactory, MemoryStorageClient, StorageClient,
};
use azblob_service::config::{load_settings_no_validation, Settings};
use azblob_service::health::{BlobStorageHealthCheck, HealthChecksBuilder, HealthStatus};
use azblob_service::registry::ServiceRegistry;
use azblob_service::stream::StreamManager;
use bytes::Bytes;
use futures::TryStreamExt;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const PRIMARY: &str =
    "DefaultEndpointsProtocol=https;AccountName=primaryacct;AccountKey=a2V5;EndpointSuffix=core.windows.net";
const ARCHIVE: &str =
    "DefaultEndpointsProtocol=https;AccountName=archiveacct;AccountKey=a2V5;EndpointSuffix=core.windows.net";

fn write_config(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("azblob.toml");
    std::fs::write(
        &path,
        format!(
            r#"
[azure_blob_storage]
connection_string = "{PRIMARY}"
container_name = "uploads"

[stream_manager]
max_small_pool_free_bytes = 4096
max_large_pool_free_bytes = 0

[accounts.archive]
connection_string = "{ARCHIVE}"
container_name = "archive"
file_url_expires_secs = 600
"#
        ),
    )
    .unwrap();
    path
}

#[test]
fn test_registry_from_config_file() {
    let dir = TempDir::new().unwrap();
    let settings = load_settings_no_validation(Some(&write_config(&dir))).unwrap();
    settings.validate().unwrap();

    let registry = ServiceRegistry::from_settings(&settings).unwrap();

    let default = registry.default_blob_storage().unwrap();
    assert_eq!(default.storage_account_name(), "primaryacct");

    let typed = registry.blob_storage::<DefaultClientFactory>().unwrap();
    assert_eq!(typed.default_container(), Some("uploads"));

    let archive = registry.named_blob_storage("archive").unwrap();
    assert_eq!(archive.storage_account_name(), "archiveacct");
    assert_eq!(registry.names(), vec!["archive"]);
}

#[test]
fn test_config_with_named_accounts_only() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("azblob.toml");
    std::fs::write(
        &path,
        format!(
            r#"
[accounts.archive]
connection_string = "{ARCHIVE}"
container_name = "archive"
"#
        ),
    )
    .unwrap();

    let settings = load_settings_no_validation(Some(&path)).unwrap();
    settings.validate().unwrap();

    let registry = ServiceRegistry::from_settings(&settings).unwrap();
    let archive = registry.named_blob_storage("archive").unwrap();
    assert_eq!(archive.storage_account_name(), "archiveacct");
    assert!(registry.default_blob_storage().is_err());
}

#[test]
fn test_invalid_named_account_fails_registration() {
    let mut settings = Settings::new();
    settings.azure_blob_storage.connection_string = PRIMARY.to_string();
    settings
        .accounts
        .insert("broken".to_string(), Default::default());

    let err = ServiceRegistry::from_settings(&settings).err().unwrap();
    assert!(err.to_string().contains("broken"));
}

#[tokio::test]
async fn test_registered_services_share_stream_manager() {
    let manager = StreamManager::with_thresholds(1_000_000, 0);
    let memory = Arc::new(MemoryStorageClient::new("memacct"));

    let mut registry = ServiceRegistry::with_stream_manager(manager.clone());
    registry
        .add_blob_storage(MemoryClientFactory::new(memory.clone()).with_container("shared"))
        .unwrap();

    let service = registry.blob_storage::<MemoryClientFactory>().unwrap();
    service.create_container_if_not_exists(None).await.unwrap();
    service
        .upload_blob("a.txt", "text/plain", Bytes::from_static(b"abc"), None, None)
        .await
        .unwrap();

    drop(service.get_blob_contents("a.txt", None).await.unwrap());
    assert_eq!(registry.stream_manager().stats().small_free_buffers, 1);
    assert_eq!(manager.stats().small_free_buffers, 1);

    let names: Vec<String> = service
        .list_blobs(None, None)
        .map_ok(|b| b.name)
        .try_collect()
        .await
        .unwrap();
    assert_eq!(names, vec!["a.txt"]);
}

#[tokio::test]
async fn test_health_checks_against_memory_account() {
    let memory = Arc::new(MemoryStorageClient::new("memacct"));
    let mut builder = HealthChecksBuilder::new();
    builder
        .add_check(
            "account",
            Arc::new(BlobStorageHealthCheck::new(memory.clone(), None)),
        )
        .add_check(
            "uploads",
            Arc::new(BlobStorageHealthCheck::new(
                memory.clone(),
                Some("uploads".to_string()),
            )),
        );

    let report = builder.run().await;
    assert_eq!(report.status, HealthStatus::Unhealthy);
    assert_eq!(report.entry("account").unwrap().status, HealthStatus::Healthy);

    memory.create_container("uploads").await.unwrap();

    let report = builder.run().await;
    assert_eq!(report.status, HealthStatus::Healthy);
    assert_eq!(report.entries.len(), 2);
}

#[test]
fn test_health_registration_from_options() {
    let dir = TempDir::new().unwrap();
    let settings = load_settings_no_validation(Some(&write_config(&dir))).unwrap();

    let mut builder = HealthChecksBuilder::new();
    builder
        .add_blob_storage(
            &settings.accounts["archive"],
            Some("archive"),
            Some("archive-storage"),
            Some(HealthStatus::Degraded),
            vec!["storage".to_string(), "archive".to_string()],
            Some(Duration::from_secs(5)),
        )
        .unwrap();

    let registration = &builder.registrations()[0];
    assert_eq!(registration.name, "archive-storage");
    assert_eq!(registration.failure_status, HealthStatus::Degraded);
    assert_eq!(registration.tags, vec!["storage", "archive"]);
    assert_eq!(registration.timeout, Some(Duration::from_secs(5)));
}
