//! Configuration settings management
//!
//! This module handles loading the storage options from a configuration file
//! and environment variables, and validating them before first use.

use crate::error::{Result, StorageError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default lifetime of generated read URLs
pub const DEFAULT_FILE_URL_EXPIRES: Duration = Duration::from_secs(24 * 60 * 60);

/// Longest accepted lifetime of generated read URLs (ten years)
pub const MAX_FILE_URL_EXPIRES: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Default free-byte cap of the small buffer pool
pub const DEFAULT_MAX_SMALL_POOL_FREE_BYTES: u64 = 1_000_000;

/// Default free-byte cap of the large buffer pool
pub const DEFAULT_MAX_LARGE_POOL_FREE_BYTES: u64 = 10_000_000;

/// Connection options of one storage account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AzureBlobStorageOptions {
    #[serde(default)]
    pub connection_string: String,
    /// Container used when an operation doesn't name one
    #[serde(default)]
    pub container_name: Option<String>,
    #[serde(default)]
    pub file_url_expires_secs: Option<u64>,
}

impl AzureBlobStorageOptions {
    pub fn new<S: Into<String>>(connection_string: S) -> Self {
        Self {
            connection_string: connection_string.into(),
            ..Default::default()
        }
    }

    pub fn with_container<S: Into<String>>(mut self, container_name: S) -> Self {
        self.container_name = Some(container_name.into());
        self
    }

    pub fn with_file_url_expires(mut self, expires: Duration) -> Self {
        self.file_url_expires_secs = Some(expires.as_secs());
        self
    }

    /// Lifetime of generated read URLs, one day unless configured
    pub fn file_url_expires(&self) -> Duration {
        self.file_url_expires_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_FILE_URL_EXPIRES)
    }

    pub fn validate(&self) -> Result<()> {
        if self.connection_string.trim().is_empty() {
            return Err(StorageError::config("Connection string is required"));
        }

        if let Some(container) = &self.container_name {
            if container.trim().is_empty() {
                return Err(StorageError::config("Container name cannot be empty"));
            }
        }

        match self.file_url_expires_secs {
            Some(0) => {
                return Err(StorageError::config("File URL expiry must be greater than zero"));
            }
            Some(secs) if secs > MAX_FILE_URL_EXPIRES.as_secs() => {
                return Err(StorageError::config(format!(
                    "File URL expiry of {secs}s exceeds the maximum of {}s",
                    MAX_FILE_URL_EXPIRES.as_secs()
                )));
            }
            _ => {}
        }

        Ok(())
    }
}

/// Pool thresholds of the stream manager
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamManagerOptions {
    #[serde(default)]
    pub max_small_pool_free_bytes: Option<u64>,
    #[serde(default)]
    pub max_large_pool_free_bytes: Option<u64>,
}

impl StreamManagerOptions {
    pub fn small_pool_cap(&self) -> u64 {
        self.max_small_pool_free_bytes
            .unwrap_or(DEFAULT_MAX_SMALL_POOL_FREE_BYTES)
    }

    pub fn large_pool_cap(&self) -> u64 {
        self.max_large_pool_free_bytes
            .unwrap_or(DEFAULT_MAX_LARGE_POOL_FREE_BYTES)
    }
}

/// Complete process configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub azure_blob_storage: AzureBlobStorageOptions,
    #[serde(default)]
    pub stream_manager: StreamManagerOptions,
    /// Additional storage accounts keyed by registration name
    #[serde(default)]
    pub accounts: BTreeMap<String, AzureBlobStorageOptions>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `[azure_blob_storage]` configures a default account
    pub fn has_default_account(&self) -> bool {
        self.azure_blob_storage != AzureBlobStorageOptions::default()
    }

    /// Options of the named account, or of the default account for `None`
    pub fn account_options(&self, name: Option<&str>) -> Result<&AzureBlobStorageOptions> {
        match name {
            Some(name) => self
                .accounts
                .get(name)
                .ok_or_else(|| StorageError::config(format!("No account named '{name}' configured"))),
            None if self.has_default_account() => Ok(&self.azure_blob_storage),
            None => Err(StorageError::config("No default storage account configured")),
        }
    }

    /// The default account may be left out when named accounts are configured
    pub fn validate(&self) -> Result<()> {
        if self.has_default_account() || self.accounts.is_empty() {
            self.azure_blob_storage.validate()?;
        }

        for (name, account) in &self.accounts {
            if name.trim().is_empty() {
                return Err(StorageError::config("Account name cannot be empty"));
            }
            account
                .validate()
                .map_err(|e| StorageError::config(format!("Account '{name}': {e}")))?;
        }

        Ok(())
    }

    pub fn get_config_path() -> Result<PathBuf> {
        #[cfg(any(target_os = "linux", target_os = "macos"))]
        {
            use std::env;
            let config_dir = if let Ok(xdg_config_home) = env::var("XDG_CONFIG_HOME") {
                PathBuf::from(xdg_config_home)
            } else {
                let home_dir = env::var("HOME")
                    .map_err(|_| StorageError::config("HOME environment variable not set"))?;
                PathBuf::from(home_dir).join(".config")
            };
            Ok(config_dir.join("azblob").join("azblob.toml"))
        }

        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            let config_dir = dirs::config_dir()
                .ok_or_else(|| StorageError::config("Unable to determine config directory"))?;
            Ok(config_dir.join("azblob").join("azblob.toml"))
        }
    }

    pub fn load() -> Result<Self> {
        load_settings(None)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        load_settings(Some(path))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        save_settings(self, path)
    }
}

/// Load configuration from multiple sources with priority order:
/// 1. Environment variables
/// 2. Configuration file (explicit path, or the default location if present)
/// 3. Default values
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let mut settings = load_settings_no_validation(path)?;
    load_from_env(&mut settings);

    settings.validate()?;

    Ok(settings)
}

/// Load configuration without env overrides or validation
pub fn load_settings_no_validation(path: Option<&Path>) -> Result<Settings> {
    let mut builder = config::Config::builder();

    match path {
        Some(path) => {
            if !path.exists() {
                return Err(StorageError::config(format!(
                    "Configuration file '{}' not found",
                    path.display()
                )));
            }
            builder = builder.add_source(config::File::from(path).required(true));
        }
        None => {
            let default_path = Settings::get_config_path()?;
            builder = builder.add_source(config::File::from(default_path).required(false));
        }
    }

    let settings = builder.build()?.try_deserialize::<Settings>()?;
    Ok(settings)
}

pub fn load_from_env(settings: &mut Settings) {
    if let Ok(value) = std::env::var("AZURE_STORAGE_CONNECTION_STRING") {
        settings.azure_blob_storage.connection_string = value;
    }

    if let Ok(value) = std::env::var("AZURE_STORAGE_CONTAINER") {
        settings.azure_blob_storage.container_name = Some(value);
    }

    if let Ok(value) = std::env::var("AZURE_STORAGE_URL_EXPIRES_SECS") {
        if let Ok(seconds) = value.parse::<u64>() {
            settings.azure_blob_storage.file_url_expires_secs = Some(seconds);
        }
    }

    if let Ok(value) = std::env::var("MAX_SMALLPOOL_FREEBYTES") {
        if let Ok(bytes) = value.parse::<u64>() {
            settings.stream_manager.max_small_pool_free_bytes = Some(bytes);
        }
    }

    if let Ok(value) = std::env::var("MAX_LARGEPOOL_FREEBYTES") {
        if let Ok(bytes) = value.parse::<u64>() {
            settings.stream_manager.max_large_pool_free_bytes = Some(bytes);
        }
    }
}

pub fn save_settings(settings: &Settings, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(settings)
        .map_err(|e| StorageError::config(format!("Failed to serialize settings: {e}")))?;

    std::fs::write(path, contents)?;

    Ok(())
}
