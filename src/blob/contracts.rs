//! Output contracts of the blob storage service

use crate::stream::PooledBuffer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tabled::Tabled;

/// Metadata snapshot of one blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Tabled)]
pub struct BlobInfoContract {
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Type")]
    pub blob_type: String,
    #[tabled(skip)]
    pub content_encoding: String,
    #[tabled(rename = "Content Type")]
    pub content_type: String,
    #[tabled(rename = "Size", display_with = "display_size")]
    pub size: Option<u64>,
    #[tabled(rename = "Created", display_with = "display_date")]
    pub date_created: Option<DateTime<Utc>>,
    #[tabled(rename = "Tier", display_with = "display_optional")]
    pub access_tier: Option<String>,
}

/// Blob metadata plus its downloaded content
///
/// The content buffer belongs to the caller; dropping it hands the
/// allocation back to the stream manager.
#[derive(Debug)]
pub struct BlobContract {
    pub info: BlobInfoContract,
    pub content: PooledBuffer,
}

impl BlobContract {
    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn into_parts(self) -> (BlobInfoContract, PooledBuffer) {
        (self.info, self.content)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Tabled)]
pub struct StorageContainerContract {
    #[tabled(rename = "Name")]
    pub name: String,
}

fn display_size(size: &Option<u64>) -> String {
    size.map(format_size).unwrap_or_default()
}

fn display_date(date: &Option<DateTime<Utc>>) -> String {
    date.map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

fn display_optional(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

/// Format file size in human-readable format
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
    }

    #[test]
    fn test_blob_info_serializes_to_json() {
        let info = BlobInfoContract {
            name: "docs/a.txt".to_string(),
            blob_type: "Block".to_string(),
            content_encoding: String::new(),
            content_type: "text/plain".to_string(),
            size: Some(3),
            date_created: None,
            access_tier: Some("Hot".to_string()),
        };

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["name"], "docs/a.txt");
        assert_eq!(json["access_tier"], "Hot");
        assert_eq!(json["content_encoding"], "");
    }
}
