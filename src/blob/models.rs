//! Data models for blob storage operations
//!
//! These are the records storage clients produce. They stay close to what
//! the service reports and are turned into contracts by the mapper.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a stored blob
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlobKind {
    Block,
    Page,
    Append,
}

impl BlobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlobKind::Block => "Block",
            BlobKind::Page => "Page",
            BlobKind::Append => "Append",
        }
    }
}

impl fmt::Display for BlobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Properties of one blob as reported by a storage client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobItem {
    /// Full blob path, including any folder prefix
    pub name: String,
    pub kind: BlobKind,
    pub content_type: String,
    pub content_encoding: Option<String>,
    pub content_length: u64,
    pub created_on: Option<DateTime<Utc>>,
    pub access_tier: Option<String>,
}

impl BlobItem {
    pub fn new<S: Into<String>>(name: S, content_type: S, content_length: u64) -> Self {
        Self {
            name: name.into(),
            kind: BlobKind::Block,
            content_type: content_type.into(),
            content_encoding: None,
            content_length,
            created_on: None,
            access_tier: None,
        }
    }
}

/// Join an optional folder and a blob name into a blob path
///
/// A blank folder leaves the name untouched.
pub fn blob_path(folder: Option<&str>, blob: &str) -> String {
    match folder {
        Some(folder) if !folder.trim().is_empty() => format!("{folder}/{blob}"),
        _ => blob.to_string(),
    }
}

/// Listing prefix that matches exactly the blobs inside `folder`
pub fn folder_prefix(folder: &str) -> String {
    format!("{}/", folder.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_path() {
        assert_eq!(blob_path(None, "a.txt"), "a.txt");
        assert_eq!(blob_path(Some(""), "a.txt"), "a.txt");
        assert_eq!(blob_path(Some("   "), "a.txt"), "a.txt");
        assert_eq!(blob_path(Some("docs"), "a.txt"), "docs/a.txt");
        assert_eq!(blob_path(Some("docs/2024"), "a.txt"), "docs/2024/a.txt");
    }

    #[test]
    fn test_folder_prefix() {
        assert_eq!(folder_prefix("1"), "1/");
        assert_eq!(folder_prefix("1/"), "1/");
        assert_eq!(folder_prefix("docs//"), "docs/");
    }

    #[test]
    fn test_blob_kind_display() {
        assert_eq!(BlobKind::Block.to_string(), "Block");
        assert_eq!(BlobKind::Page.to_string(), "Page");
        assert_eq!(BlobKind::Append.to_string(), "Append");
    }
}
