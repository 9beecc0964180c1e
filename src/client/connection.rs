//! Storage account connection strings
//!
//! Parses the `Key=Value;Key=Value` format used by the Azure portal, e.g.
//! `DefaultEndpointsProtocol=https;AccountName=acct;AccountKey=...;EndpointSuffix=core.windows.net`.

use crate::error::{Result, StorageError};
use std::collections::HashMap;

/// Well-known development storage account
pub const DEV_STORAGE_ACCOUNT: &str = "devstoreaccount1";
/// Well-known development storage account key
pub const DEV_STORAGE_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
const DEV_STORAGE_BLOB_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";
const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";

/// Credentials carried by a connection string
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    AccountKey(String),
    SasToken(String),
    Anonymous,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::AccountKey(_) => f.write_str("AccountKey(****)"),
            Credentials::SasToken(_) => f.write_str("SasToken(****)"),
            Credentials::Anonymous => f.write_str("Anonymous"),
        }
    }
}

/// Parsed storage account connection string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pub account_name: String,
    pub credentials: Credentials,
    /// Explicit blob endpoint, if the connection string names one
    pub blob_endpoint: Option<String>,
    pub protocol: String,
    pub endpoint_suffix: String,
    pub development_storage: bool,
}

impl ConnectionString {
    pub fn parse(connection_string: &str) -> Result<Self> {
        let params = parse_pairs(connection_string);
        if params.is_empty() {
            return Err(StorageError::connection_string(
                "connection string contains no Key=Value pairs",
            ));
        }

        let development_storage = params
            .get("usedevelopmentstorage")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));

        if development_storage {
            return Ok(Self {
                account_name: DEV_STORAGE_ACCOUNT.to_string(),
                credentials: Credentials::AccountKey(DEV_STORAGE_KEY.to_string()),
                blob_endpoint: Some(DEV_STORAGE_BLOB_ENDPOINT.to_string()),
                protocol: "http".to_string(),
                endpoint_suffix: DEFAULT_ENDPOINT_SUFFIX.to_string(),
                development_storage,
            });
        }

        let account_name = params
            .get("accountname")
            .filter(|v| !v.is_empty())
            .cloned()
            .ok_or_else(|| StorageError::connection_string("AccountName is required"))?;

        let credentials = match (params.get("accountkey"), params.get("sharedaccesssignature")) {
            (Some(key), _) if !key.is_empty() => Credentials::AccountKey(key.clone()),
            (_, Some(sas)) if !sas.is_empty() => {
                Credentials::SasToken(sas.trim_start_matches('?').to_string())
            }
            _ => Credentials::Anonymous,
        };

        let protocol = params
            .get("defaultendpointsprotocol")
            .cloned()
            .unwrap_or_else(|| "https".to_string());
        if protocol != "https" && protocol != "http" {
            return Err(StorageError::connection_string(format!(
                "unsupported DefaultEndpointsProtocol '{protocol}'"
            )));
        }

        Ok(Self {
            account_name,
            credentials,
            blob_endpoint: params
                .get("blobendpoint")
                .map(|v| v.trim_end_matches('/').to_string()),
            protocol,
            endpoint_suffix: params
                .get("endpointsuffix")
                .cloned()
                .unwrap_or_else(|| DEFAULT_ENDPOINT_SUFFIX.to_string()),
            development_storage,
        })
    }

    /// Base URL of the blob service
    pub fn blob_endpoint(&self) -> String {
        self.blob_endpoint.clone().unwrap_or_else(|| {
            format!(
                "{}://{}.blob.{}",
                self.protocol, self.account_name, self.endpoint_suffix
            )
        })
    }

    /// True when the blob endpoint is the public-cloud default for the account
    pub fn uses_default_endpoint(&self) -> bool {
        self.blob_endpoint.is_none()
            && self.protocol == "https"
            && self.endpoint_suffix == DEFAULT_ENDPOINT_SUFFIX
    }

    /// Only shared-key credentials can sign new SAS tokens
    pub fn can_sign(&self) -> bool {
        matches!(self.credentials, Credentials::AccountKey(_))
    }
}

/// Split a connection string into lower-cased keys and raw values
fn parse_pairs(connection_string: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    for pair in connection_string.split(';') {
        if let Some((key, value)) = pair.split_once('=') {
            params.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_account_key_connection_string() {
        let parsed = ConnectionString::parse(
            "DefaultEndpointsProtocol=https;AccountName=myacct;AccountKey=a2V5PT0=;EndpointSuffix=core.windows.net",
        )
        .unwrap();

        assert_eq!(parsed.account_name, "myacct");
        assert_eq!(parsed.credentials, Credentials::AccountKey("a2V5PT0=".to_string()));
        assert!(parsed.can_sign());
        assert!(parsed.uses_default_endpoint());
        assert_eq!(parsed.blob_endpoint(), "https://myacct.blob.core.windows.net");
    }

    #[test]
    fn test_parse_sas_connection_string() {
        let parsed = ConnectionString::parse(
            "BlobEndpoint=https://myacct.blob.core.windows.net/;SharedAccessSignature=?sv=2021&sig=abc;AccountName=myacct",
        )
        .unwrap();

        assert_eq!(parsed.credentials, Credentials::SasToken("sv=2021&sig=abc".to_string()));
        assert!(!parsed.can_sign());
        assert_eq!(parsed.blob_endpoint(), "https://myacct.blob.core.windows.net");
        assert!(!parsed.uses_default_endpoint());
    }

    #[test]
    fn test_parse_development_storage() {
        let parsed = ConnectionString::parse("UseDevelopmentStorage=true").unwrap();

        assert_eq!(parsed.account_name, DEV_STORAGE_ACCOUNT);
        assert!(parsed.development_storage);
        assert!(parsed.can_sign());
        assert_eq!(parsed.blob_endpoint(), "http://127.0.0.1:10000/devstoreaccount1");
    }

    #[test]
    fn test_parse_errors() {
        assert!(ConnectionString::parse("").is_err());
        assert!(ConnectionString::parse("AccountKey=abc").is_err());
        assert!(ConnectionString::parse("AccountName=a;DefaultEndpointsProtocol=ftp").is_err());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let parsed = ConnectionString::parse("AccountName=a;AccountKey=supersecret").unwrap();
        assert!(!format!("{parsed:?}").contains("supersecret"));
    }
}
