//! Health checks for storage accounts
//!
//! A [`HealthChecksBuilder`] collects named registrations, each wrapping a
//! [`HealthCheck`] with the status to report on failure, free-form tags and an
//! optional timeout. [`HealthChecksBuilder::run`] executes them all and folds
//! the results into a [`HealthReport`].

use crate::client::{ClientOptions, DefaultClientFactory, StorageClient};
use crate::config::AzureBlobStorageOptions;
use crate::error::{Result, StorageError};
use async_trait::async_trait;
use futures::future::join_all;
use futures::StreamExt;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tabled::Tabled;
use tracing::{debug, warn};

/// Registration name used when none is given
pub const DEFAULT_BLOB_STORAGE_CHECK_NAME: &str = "azurestorage";

/// Outcome of a check, ordered from worst to best
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum HealthStatus {
    Unhealthy,
    Degraded,
    Healthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthStatus::Unhealthy => "Unhealthy",
            HealthStatus::Degraded => "Degraded",
            HealthStatus::Healthy => "Healthy",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckResult {
    pub status: HealthStatus,
    pub description: Option<String>,
}

impl HealthCheckResult {
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            description: None,
        }
    }

    pub fn unhealthy<S: Into<String>>(description: S) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            description: Some(description.into()),
        }
    }
}

#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn check(&self) -> HealthCheckResult;
}

/// Probes a storage account, or one container in it
pub struct BlobStorageHealthCheck {
    client: Arc<dyn StorageClient>,
    container_name: Option<String>,
}

impl BlobStorageHealthCheck {
    pub fn new(client: Arc<dyn StorageClient>, container_name: Option<String>) -> Self {
        Self {
            client,
            container_name,
        }
    }

    /// Check against the account in `options`, with SDK retries disabled
    pub fn from_options(
        options: &AzureBlobStorageOptions,
        container_name: Option<String>,
    ) -> Result<Self> {
        let factory = DefaultClientFactory::new(options.clone());
        let client = factory.client_with(&ClientOptions {
            disable_retries: true,
        })?;
        Ok(Self::new(client, container_name))
    }
}

#[async_trait]
impl HealthCheck for BlobStorageHealthCheck {
    async fn check(&self) -> HealthCheckResult {
        match &self.container_name {
            Some(container) => match self.client.container_exists(container).await {
                Ok(true) => HealthCheckResult::healthy(),
                Ok(false) => {
                    HealthCheckResult::unhealthy(format!("Container '{container}' does not exist"))
                }
                Err(e) => HealthCheckResult::unhealthy(e.to_string()),
            },
            None => {
                // Any answer to a listing proves the account is reachable
                let mut containers = self.client.list_containers();
                match containers.next().await {
                    Some(Err(e)) => HealthCheckResult::unhealthy(e.to_string()),
                    _ => HealthCheckResult::healthy(),
                }
            }
        }
    }
}

/// A named check plus how to report it
#[derive(Clone)]
pub struct HealthCheckRegistration {
    pub name: String,
    pub check: Arc<dyn HealthCheck>,
    pub failure_status: HealthStatus,
    pub tags: Vec<String>,
    pub timeout: Option<Duration>,
}

impl fmt::Debug for HealthCheckRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthCheckRegistration")
            .field("name", &self.name)
            .field("failure_status", &self.failure_status)
            .field("tags", &self.tags)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Tabled)]
pub struct HealthReportEntry {
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Status")]
    pub status: HealthStatus,
    #[tabled(rename = "Description", display_with = "display_description")]
    pub description: Option<String>,
    #[tabled(rename = "Duration (ms)")]
    pub duration_ms: u128,
    #[tabled(rename = "Tags", display_with = "display_tags")]
    pub tags: Vec<String>,
}

fn display_description(description: &Option<String>) -> String {
    description.clone().unwrap_or_default()
}

fn display_tags(tags: &[String]) -> String {
    tags.join(", ")
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Worst status among the entries
    pub status: HealthStatus,
    pub entries: Vec<HealthReportEntry>,
    pub total_duration_ms: u128,
}

impl HealthReport {
    pub fn entry(&self, name: &str) -> Option<&HealthReportEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct HealthChecksBuilder {
    registrations: Vec<HealthCheckRegistration>,
}

impl HealthChecksBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, registration: HealthCheckRegistration) -> &mut Self {
        self.registrations.push(registration);
        self
    }

    /// Register a check failing as `Unhealthy`, untagged, without timeout
    pub fn add_check<S: Into<String>>(&mut self, name: S, check: Arc<dyn HealthCheck>) -> &mut Self {
        self.add(HealthCheckRegistration {
            name: name.into(),
            check,
            failure_status: HealthStatus::Unhealthy,
            tags: Vec::new(),
            timeout: None,
        })
    }

    /// Register a storage account check
    ///
    /// `name` defaults to [`DEFAULT_BLOB_STORAGE_CHECK_NAME`] and
    /// `failure_status` to [`HealthStatus::Unhealthy`]. Without a container
    /// the check only proves the account answers.
    pub fn add_blob_storage(
        &mut self,
        options: &AzureBlobStorageOptions,
        container_name: Option<&str>,
        name: Option<&str>,
        failure_status: Option<HealthStatus>,
        tags: Vec<String>,
        timeout: Option<Duration>,
    ) -> Result<&mut Self> {
        let check =
            BlobStorageHealthCheck::from_options(options, container_name.map(str::to_string))?;

        Ok(self.add(HealthCheckRegistration {
            name: name.unwrap_or(DEFAULT_BLOB_STORAGE_CHECK_NAME).to_string(),
            check: Arc::new(check),
            failure_status: failure_status.unwrap_or(HealthStatus::Unhealthy),
            tags,
            timeout,
        }))
    }

    pub fn registrations(&self) -> &[HealthCheckRegistration] {
        &self.registrations
    }

    /// Run every registered check concurrently
    pub async fn run(&self) -> HealthReport {
        let started = Instant::now();
        let entries = join_all(self.registrations.iter().map(run_registration)).await;

        let status = entries
            .iter()
            .map(|entry| entry.status)
            .min()
            .unwrap_or(HealthStatus::Healthy);

        HealthReport {
            status,
            entries,
            total_duration_ms: started.elapsed().as_millis(),
        }
    }
}

async fn run_registration(registration: &HealthCheckRegistration) -> HealthReportEntry {
    let started = Instant::now();

    let result = match registration.timeout {
        Some(timeout) => tokio::time::timeout(timeout, registration.check.check())
            .await
            .unwrap_or_else(|_| {
                HealthCheckResult::unhealthy(StorageError::Timeout(timeout).to_string())
            }),
        None => registration.check.check().await,
    };

    let status = if result.status == HealthStatus::Healthy {
        debug!(check = %registration.name, "Health check passed");
        HealthStatus::Healthy
    } else {
        warn!(
            check = %registration.name,
            description = ?result.description,
            "Health check failed"
        );
        registration.failure_status
    };

    HealthReportEntry {
        name: registration.name.clone(),
        status,
        description: result.description,
        duration_ms: started.elapsed().as_millis(),
        tags: registration.tags.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MemoryStorageClient;

    struct SlowCheck;

    #[async_trait]
    impl HealthCheck for SlowCheck {
        async fn check(&self) -> HealthCheckResult {
            tokio::time::sleep(Duration::from_secs(5)).await;
            HealthCheckResult::healthy()
        }
    }

    #[tokio::test]
    async fn test_container_existence_check() {
        let memory = Arc::new(MemoryStorageClient::new("acct"));
        memory.create_container("present").await.unwrap();

        let present = BlobStorageHealthCheck::new(memory.clone(), Some("present".to_string()));
        assert_eq!(present.check().await.status, HealthStatus::Healthy);

        let missing = BlobStorageHealthCheck::new(memory.clone(), Some("missing".to_string()));
        let result = missing.check().await;
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert_eq!(
            result.description.as_deref(),
            Some("Container 'missing' does not exist")
        );

        let account = BlobStorageHealthCheck::new(memory, None);
        assert_eq!(account.check().await.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_failure_status_and_worst_overall() {
        let memory = Arc::new(MemoryStorageClient::new("acct"));
        let mut builder = HealthChecksBuilder::new();
        builder
            .add_check(
                "account",
                Arc::new(BlobStorageHealthCheck::new(memory.clone(), None)),
            )
            .add(HealthCheckRegistration {
                name: "uploads".to_string(),
                check: Arc::new(BlobStorageHealthCheck::new(memory, Some("uploads".to_string()))),
                failure_status: HealthStatus::Degraded,
                tags: vec!["storage".to_string()],
                timeout: None,
            });

        let report = builder.run().await;
        assert_eq!(report.entry("account").unwrap().status, HealthStatus::Healthy);
        assert_eq!(report.entry("uploads").unwrap().status, HealthStatus::Degraded);
        assert_eq!(report.entry("uploads").unwrap().tags, vec!["storage"]);
        assert_eq!(report.status, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn test_timeout_reports_failure_status() {
        let mut builder = HealthChecksBuilder::new();
        builder.add(HealthCheckRegistration {
            name: "slow".to_string(),
            check: Arc::new(SlowCheck),
            failure_status: HealthStatus::Unhealthy,
            tags: Vec::new(),
            timeout: Some(Duration::from_millis(50)),
        });

        let report = builder.run().await;
        let entry = report.entry("slow").unwrap();
        assert_eq!(entry.status, HealthStatus::Unhealthy);
        assert_eq!(entry.description.as_deref(), Some("Timed out after 50ms"));
    }

    #[test]
    fn test_add_blob_storage_defaults() {
        let options = AzureBlobStorageOptions::new(
            "DefaultEndpointsProtocol=https;AccountName=acct;AccountKey=a2V5;EndpointSuffix=core.windows.net",
        );
        let mut builder = HealthChecksBuilder::new();
        builder
            .add_blob_storage(&options, Some("uploads"), None, None, Vec::new(), None)
            .unwrap();

        let registration = &builder.registrations()[0];
        assert_eq!(registration.name, "azurestorage");
        assert_eq!(registration.failure_status, HealthStatus::Unhealthy);
        assert!(registration.timeout.is_none());

        assert!(HealthChecksBuilder::new()
            .add_blob_storage(
                &AzureBlobStorageOptions::default(),
                None,
                None,
                None,
                Vec::new(),
                None
            )
            .is_err());
    }

    #[test]
    fn test_empty_report_is_healthy() {
        let report = tokio_test::block_on(HealthChecksBuilder::new().run());
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(report.entries.is_empty());
    }
}
