//! Blob storage backends for generated PDFs.

mod memory;
mod s3;

pub use memory::MemoryBlobStore;
pub use s3::S3BlobStore;

pub use crate::traits::blob::BlobStore;

use crate::utils::{get_env_parsed, get_env_with_prefix};
use serde::{Deserialize, Serialize};

/// Blob storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlobConfig {
    /// `None` keeps documents in process memory (local runs)
    pub bucket: Option<String>,
    /// Public URL prefix; objects are served at `<public_base_url>/<key>`
    pub public_base_url: String,
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible services
    pub endpoint: Option<String>,
    /// Upper bound of one upload, in seconds (default: 60)
    #[serde(default = "default_upload_timeout")]
    pub upload_timeout_seconds: u64,
}

fn default_upload_timeout() -> u64 {
    60
}

impl BlobConfig {
    pub fn new(bucket: impl Into<String>, public_base_url: impl Into<String>) -> Self {
        Self {
            bucket: Some(bucket.into()),
            public_base_url: public_base_url.into(),
            region: None,
            endpoint: None,
            upload_timeout_seconds: default_upload_timeout(),
        }
    }

    /// Apply `BILLING_BUCKET`, `BILLING_PUBLIC_BASE_URL`, `AWS_REGION`,
    /// `S3_ENDPOINT` and `BILLING_UPLOAD_TIMEOUT_SECONDS`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(bucket) = get_env_with_prefix("BILLING_BUCKET") {
            self.bucket = Some(bucket);
        }
        if let Some(url) = get_env_with_prefix("BILLING_PUBLIC_BASE_URL") {
            self.public_base_url = url;
        }
        if let Some(region) = get_env_with_prefix("AWS_REGION") {
            self.region = Some(region);
        }
        if let Some(endpoint) = get_env_with_prefix("S3_ENDPOINT") {
            self.endpoint = Some(endpoint);
        }
        if let Some(timeout) = get_env_parsed("BILLING_UPLOAD_TIMEOUT_SECONDS") {
            self.upload_timeout_seconds = timeout;
        }
        self
    }

    /// Public URL of an object key.
    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url.trim_end_matches('/'), key)
    }
}
