//! Blob storage for generated documents

use crate::error::Result;
use async_trait::async_trait;

/// Object storage that serves uploaded files from a public URL.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` under `key` and return its public URL.
    ///
    /// Writing an existing key replaces the object.
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<String>;
}
