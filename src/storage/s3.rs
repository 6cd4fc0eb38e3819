use super::BlobConfig;
use crate::error::{AppError, Result};
use crate::traits::blob::BlobStore;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_config::timeout::TimeoutConfig;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use std::time::Duration;

/// S3-compatible blob store.
#[derive(Debug, Clone)]
pub struct S3BlobStore {
    client: Client,
    bucket: String,
    config: BlobConfig,
}

impl S3BlobStore {
    /// Build a client from the ambient AWS credentials chain.
    pub async fn connect(config: BlobConfig) -> Result<Self> {
        let bucket = config
            .bucket
            .clone()
            .ok_or_else(|| AppError::internal("BILLING_BUCKET is not configured"))?;

        let timeouts = TimeoutConfig::builder()
            .operation_timeout(Duration::from_secs(config.upload_timeout_seconds))
            .build();

        let mut loader = aws_config::defaults(BehaviorVersion::latest()).timeout_config(timeouts);
        if let Some(region) = &config.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint.clone());
        }
        let sdk_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.endpoint.is_some())
            .build();

        tracing::info!(bucket = %bucket, "S3 blob store configured");

        Ok(Self {
            client: Client::from_conf(s3_config),
            bucket,
            config,
        })
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<String> {
        let size = data.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(key = %key, error = ?e, "S3 put_object failed");
                AppError::service_unavailable(format!("Failed to upload {}: {}", key, e))
            })?;

        tracing::debug!(key = %key, bytes = size, "Uploaded object");
        Ok(self.config.public_url(key))
    }
}
