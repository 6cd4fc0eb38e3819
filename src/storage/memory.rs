use super::BlobConfig;
use crate::error::Result;
use crate::traits::blob::BlobStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Blob store keeping objects in process memory.
///
/// Used for local runs without a bucket and in tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    objects: Arc<RwLock<HashMap<String, (String, Vec<u8>)>>>,
    base_url: String,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::with_base_url("memory://blobs")
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            objects: Arc::default(),
            base_url: base_url.into(),
        }
    }

    pub fn from_config(config: &BlobConfig) -> Self {
        if config.public_base_url.is_empty() {
            Self::new()
        } else {
            Self::with_base_url(config.public_base_url.clone())
        }
    }

    /// Stored object, with its content type.
    pub fn get(&self, key: &str) -> Option<(String, Vec<u8>)> {
        self.objects.read().ok()?.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .read()
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<String> {
        self.objects
            .write()
            .map_err(|_| crate::error::AppError::internal("blob store lock poisoned"))?
            .insert(key.to_string(), (content_type.to_string(), data));
        Ok(format!("{}/{}", self.base_url.trim_end_matches('/'), key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_returns_public_url() {
        let store = MemoryBlobStore::with_base_url("https://cdn.acme.test");
        let url = store
            .put("billing/w1/c1/2024-03/PRO-1.pdf", b"%PDF".to_vec(), "application/pdf")
            .await
            .unwrap();
        assert_eq!(url, "https://cdn.acme.test/billing/w1/c1/2024-03/PRO-1.pdf");
        let (content_type, data) = store.get("billing/w1/c1/2024-03/PRO-1.pdf").unwrap();
        assert_eq!(content_type, "application/pdf");
        assert_eq!(data, b"%PDF");
    }
}
