//! In-process storage client
//!
//! Keeps containers and blobs in ordered maps so listings come back in the
//! same lexicographic order the service uses. When built with an account key
//! it signs read SAS URLs the same way the service does (HMAC-SHA256 over the
//! blob string-to-sign), and can validate them again.

use crate::blob::models::{BlobItem, BlobKind};
use crate::client::connection::{ConnectionString, Credentials};
use crate::client::StorageClient;
use crate::error::{Result, StorageError};
use crate::stream::PooledBuffer;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use hmac::{Hmac, Mac};
use parking_lot::RwLock;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;
use url::Url;

type HmacSha256 = Hmac<Sha256>;

const SAS_VERSION: &str = "2021-08-06";
const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:10000";

static CONTAINER_NAME: OnceLock<Regex> = OnceLock::new();

#[derive(Debug, Clone)]
struct StoredBlob {
    content: Bytes,
    content_type: String,
    created_on: DateTime<Utc>,
    etag: String,
    snapshots: Vec<(DateTime<Utc>, Bytes)>,
}

type Containers = BTreeMap<String, BTreeMap<String, StoredBlob>>;

/// Storage client keeping everything in memory
#[derive(Debug)]
pub struct MemoryStorageClient {
    account_name: String,
    account_key: Option<Vec<u8>>,
    endpoint: String,
    containers: RwLock<Containers>,
}

impl MemoryStorageClient {
    /// Client without signing credentials
    pub fn new<S: Into<String>>(account_name: S) -> Self {
        let account_name = account_name.into();
        Self {
            endpoint: format!("{DEFAULT_ENDPOINT}/{account_name}"),
            account_name,
            account_key: None,
            containers: RwLock::new(BTreeMap::new()),
        }
    }

    /// Client able to sign SAS URLs with a base64 account key
    pub fn with_account_key<S: Into<String>>(account_name: S, account_key: &str) -> Result<Self> {
        let key = BASE64
            .decode(account_key)
            .map_err(|e| StorageError::connection_string(format!("Invalid account key encoding: {e}")))?;

        let mut client = Self::new(account_name);
        client.account_key = Some(key);
        Ok(client)
    }

    pub fn from_connection_string(connection_string: &str) -> Result<Self> {
        let parsed = ConnectionString::parse(connection_string)?;
        let mut client = match &parsed.credentials {
            Credentials::AccountKey(key) => Self::with_account_key(parsed.account_name.clone(), key)?,
            _ => Self::new(parsed.account_name.clone()),
        };
        client.endpoint = parsed.blob_endpoint();
        Ok(client)
    }

    /// Check a URL produced by [`StorageClient::generate_read_sas_url`]
    ///
    /// Returns the signed expiry when the signature matches and the URL is
    /// still valid at `now`.
    pub fn validate_sas_url(&self, url: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let key = self
            .account_key
            .as_deref()
            .ok_or_else(|| StorageError::backend("AuthenticationFailed: client has no account key"))?;

        let url = Url::parse(url)?;
        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
        let param = |name: &str| {
            params
                .get(name)
                .cloned()
                .ok_or_else(|| StorageError::backend(format!("AuthenticationFailed: missing '{name}'")))
        };

        let permissions = param("sp")?;
        let expiry_raw = param("se")?;
        let version = param("sv")?;
        let signature = param("sig")?;

        let resource = self.resource_path(&url);
        if !resource.contains('/') {
            return Err(StorageError::backend("AuthenticationFailed: URL does not address a blob"));
        }

        let expiry = DateTime::parse_from_rfc3339(&expiry_raw)
            .map_err(|e| StorageError::backend(format!("AuthenticationFailed: bad expiry: {e}")))?
            .with_timezone(&Utc);

        let expected = sign(
            key,
            &string_to_sign(&permissions, &expiry_raw, &self.account_name, &resource, &version),
        )?;
        if expected != signature {
            return Err(StorageError::backend("AuthenticationFailed: signature mismatch"));
        }
        if expiry <= now {
            return Err(StorageError::backend("AuthenticationFailed: signed expiry has passed"));
        }

        Ok(expiry)
    }

    /// Stored content of a blob, if present
    pub fn blob_content(&self, container: &str, blob: &str) -> Option<Bytes> {
        self.containers
            .read()
            .get(container)
            .and_then(|blobs| blobs.get(blob))
            .map(|stored| stored.content.clone())
    }

    /// Take a read-only snapshot of a blob's current content
    pub fn create_snapshot(&self, container: &str, blob: &str) -> Result<DateTime<Utc>> {
        let mut containers = self.containers.write();
        let stored = containers
            .get_mut(container)
            .ok_or_else(|| container_missing(container))?
            .get_mut(blob)
            .ok_or_else(|| blob_missing(blob))?;

        let taken_at = Utc::now();
        stored.snapshots.push((taken_at, stored.content.clone()));
        Ok(taken_at)
    }

    pub fn snapshot_count(&self, container: &str, blob: &str) -> usize {
        self.containers
            .read()
            .get(container)
            .and_then(|blobs| blobs.get(blob))
            .map_or(0, |stored| stored.snapshots.len())
    }

    pub fn etag(&self, container: &str, blob: &str) -> Option<String> {
        self.containers
            .read()
            .get(container)
            .and_then(|blobs| blobs.get(blob))
            .map(|stored| stored.etag.clone())
    }

    fn blob_url(&self, container: &str, blob: &str) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint)?;
        url.path_segments_mut()
            .map_err(|_| StorageError::config(format!("Endpoint '{}' cannot be a base URL", self.endpoint)))?
            .pop_if_empty()
            .push(container)
            .extend(blob.split('/'));
        Ok(url)
    }

    /// `container/blob` part of a blob URL, as it appears on the wire
    fn resource_path(&self, url: &Url) -> String {
        let path = url.path().trim_start_matches('/');
        path.strip_prefix(&format!("{}/", self.account_name))
            .unwrap_or(path)
            .to_string()
    }
}

#[async_trait]
impl StorageClient for MemoryStorageClient {
    fn account_name(&self) -> String {
        self.account_name.clone()
    }

    fn list_containers(&self) -> BoxStream<'static, Result<String>> {
        let names: Vec<Result<String>> = self.containers.read().keys().cloned().map(Ok).collect();
        stream::iter(names).boxed()
    }

    async fn container_exists(&self, container: &str) -> Result<bool> {
        Ok(self.containers.read().contains_key(container))
    }

    async fn create_container(&self, container: &str) -> Result<bool> {
        validate_container_name(container)?;

        let mut containers = self.containers.write();
        if containers.contains_key(container) {
            return Ok(false);
        }
        containers.insert(container.to_string(), BTreeMap::new());
        Ok(true)
    }

    async fn delete_container(&self, container: &str) -> Result<()> {
        self.containers
            .write()
            .remove(container)
            .map(|_| ())
            .ok_or_else(|| container_missing(container))
    }

    fn list_blobs(
        &self,
        container: &str,
        prefix: Option<String>,
    ) -> BoxStream<'static, Result<BlobItem>> {
        let containers = self.containers.read();
        let Some(blobs) = containers.get(container) else {
            return stream::iter(vec![Err(container_missing(container))]).boxed();
        };

        let prefix = prefix.unwrap_or_default();
        let items: Vec<Result<BlobItem>> = blobs
            .range(prefix.clone()..)
            .take_while(|(name, _)| name.starts_with(&prefix))
            .map(|(name, stored)| Ok(blob_item(name, stored)))
            .collect();

        stream::iter(items).boxed()
    }

    async fn blob_exists(&self, container: &str, blob: &str) -> Result<bool> {
        Ok(self
            .containers
            .read()
            .get(container)
            .is_some_and(|blobs| blobs.contains_key(blob)))
    }

    async fn get_blob_properties(&self, container: &str, blob: &str) -> Result<BlobItem> {
        let containers = self.containers.read();
        let blobs = containers
            .get(container)
            .ok_or_else(|| container_missing(container))?;
        let stored = blobs.get(blob).ok_or_else(|| blob_missing(blob))?;
        Ok(blob_item(blob, stored))
    }

    async fn download_blob(
        &self,
        container: &str,
        blob: &str,
        target: &mut PooledBuffer,
    ) -> Result<()> {
        let content = {
            let containers = self.containers.read();
            let blobs = containers
                .get(container)
                .ok_or_else(|| container_missing(container))?;
            blobs
                .get(blob)
                .ok_or_else(|| blob_missing(blob))?
                .content
                .clone()
        };

        target.extend_from_slice(&content);
        Ok(())
    }

    async fn upload_blob(
        &self,
        container: &str,
        blob: &str,
        content_type: &str,
        content: Bytes,
    ) -> Result<()> {
        if blob.is_empty() || blob.len() > 1024 {
            return Err(StorageError::backend(
                "InvalidResourceName: blob name must be between 1 and 1024 characters",
            ));
        }

        let etag = format!("\"0x{}\"", hex::encode(&Sha256::digest(&content)[..8]).to_uppercase());
        let now = Utc::now();

        let mut containers = self.containers.write();
        let blobs = containers
            .get_mut(container)
            .ok_or_else(|| container_missing(container))?;

        // Overwrites keep the creation time and snapshots of the replaced blob
        let (created_on, snapshots) = blobs
            .remove(blob)
            .map(|b| (b.created_on, b.snapshots))
            .unwrap_or((now, Vec::new()));
        blobs.insert(
            blob.to_string(),
            StoredBlob {
                content,
                content_type: content_type.to_string(),
                created_on,
                etag,
                snapshots,
            },
        );
        Ok(())
    }

    async fn delete_blob(&self, container: &str, blob: &str) -> Result<()> {
        // Snapshots go with the base blob
        let mut containers = self.containers.write();
        let blobs = containers
            .get_mut(container)
            .ok_or_else(|| container_missing(container))?;
        blobs
            .remove(blob)
            .map(|_| ())
            .ok_or_else(|| blob_missing(blob))
    }

    fn can_generate_sas(&self) -> bool {
        self.account_key.is_some()
    }

    async fn generate_read_sas_url(
        &self,
        container: &str,
        blob: &str,
        expires_on: DateTime<Utc>,
    ) -> Result<String> {
        let key = self.account_key.as_deref().ok_or_else(|| {
            StorageError::backend("SAS can be generated only from key and account clients")
        })?;

        let expiry = format_sas_datetime(&expires_on);
        let mut url = self.blob_url(container, blob)?;
        let resource = self.resource_path(&url);
        let signature = sign(
            key,
            &string_to_sign("r", &expiry, &self.account_name, &resource, SAS_VERSION),
        )?;

        url.query_pairs_mut()
            .append_pair("sv", SAS_VERSION)
            .append_pair("se", &expiry)
            .append_pair("sr", "b")
            .append_pair("sp", "r")
            .append_pair("sig", &signature);

        Ok(url.to_string())
    }
}

fn blob_item(name: &str, stored: &StoredBlob) -> BlobItem {
    BlobItem {
        name: name.to_string(),
        kind: BlobKind::Block,
        content_type: stored.content_type.clone(),
        content_encoding: None,
        content_length: stored.content.len() as u64,
        created_on: Some(stored.created_on),
        access_tier: Some("Hot".to_string()),
    }
}

fn container_missing(container: &str) -> StorageError {
    StorageError::backend(format!(
        "ContainerNotFound: The specified container '{container}' does not exist."
    ))
}

fn blob_missing(blob: &str) -> StorageError {
    StorageError::backend(format!("BlobNotFound: The specified blob '{blob}' does not exist."))
}

/// Container names: 3-63 chars of lowercase letters, digits and single hyphens
fn validate_container_name(name: &str) -> Result<()> {
    if name.len() < 3 || name.len() > 63 {
        return Err(StorageError::backend(
            "InvalidResourceName: container name must be between 3 and 63 characters",
        ));
    }

    let re = match CONTAINER_NAME.get() {
        Some(re) => re,
        None => {
            let re = Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?$")?;
            CONTAINER_NAME.get_or_init(|| re)
        }
    };
    if !re.is_match(name) || name.contains("--") {
        return Err(StorageError::backend(format!(
            "InvalidResourceName: '{name}' is not a valid container name"
        )));
    }

    Ok(())
}

fn string_to_sign(
    permissions: &str,
    expiry: &str,
    account: &str,
    resource: &str,
    version: &str,
) -> String {
    [
        permissions,
        "",
        expiry,
        &format!("/blob/{account}/{resource}"),
        "",
        "",
        "",
        version,
        "b",
        "",
        "",
        "",
        "",
        "",
        "",
        "",
    ]
    .join("\n")
}

fn sign(key: &[u8], string_to_sign: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| StorageError::backend(format!("Failed to create HMAC: {e}")))?;
    mac.update(string_to_sign.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

fn format_sas_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
