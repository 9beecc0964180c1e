//! Blob storage operations
//!
//! Contracts handed to callers, the records storage clients produce, the
//! mapping between the two, and the [`BlobStorage`] façade itself.

pub mod contracts;
pub mod mapper;
pub mod models;
pub mod service;

// Re-export commonly used types
pub use contracts::{format_size, BlobContract, BlobInfoContract, StorageContainerContract};
pub use models::{BlobItem, BlobKind};
pub use service::{BlobStorage, BlobStorageService};
