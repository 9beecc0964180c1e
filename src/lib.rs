//! azblob-service - Azure Blob Storage service layer
//!
//! Container and blob operations behind a [`blob::BlobStorage`] façade, a
//! pluggable client factory so several storage accounts can live side by
//! side, pooled download buffers, health checks and registration helpers.

pub mod blob;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod health;
pub mod registry;
pub mod stream;

// Re-export commonly used types
pub use blob::{BlobStorage, BlobStorageService};
pub use error::{Result, StorageError};
pub use registry::ServiceRegistry;
