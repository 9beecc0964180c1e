//! Conversion of storage client records into service contracts

use crate::blob::contracts::{BlobContract, BlobInfoContract, StorageContainerContract};
use crate::blob::models::BlobItem;
use crate::stream::PooledBuffer;

pub fn to_blob_info_contract(item: &BlobItem) -> BlobInfoContract {
    BlobInfoContract {
        name: item.name.clone(),
        blob_type: item.kind.to_string(),
        content_encoding: item.content_encoding.clone().unwrap_or_default(),
        content_type: item.content_type.clone(),
        size: Some(item.content_length),
        date_created: item.created_on,
        access_tier: item.access_tier.clone(),
    }
}

/// Build a blob contract; `name` wins over the name inside `properties`
pub fn to_blob_contract(name: &str, properties: &BlobItem, content: PooledBuffer) -> BlobContract {
    let mut info = to_blob_info_contract(properties);
    info.name = name.to_string();

    BlobContract { info, content }
}

pub fn to_container_contract<S: Into<String>>(name: S) -> StorageContainerContract {
    StorageContainerContract { name: name.into() }
}
