use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use domain::AssetKey;

use super::{AssetDelivery, AssetStorage, validate_key};
use crate::error::StorageError;

/// Default lifetime of a presigned URL.
pub const DEFAULT_SIGNED_URL_TTL: Duration = Duration::from_secs(300);

/// Hands out presigned GET URLs for objects in an S3 bucket.
#[derive(Debug, Clone)]
pub struct S3AssetStorage {
    client: aws_sdk_s3::Client,
    bucket: String,
    url_ttl: Duration,
}

impl S3AssetStorage {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>, url_ttl: Duration) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            url_ttl,
        }
    }

    /// Builds the storage from the ambient AWS configuration.
    pub async fn from_env(bucket: impl Into<String>, url_ttl: Duration) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(aws_sdk_s3::Client::new(&config), bucket, url_ttl)
    }
}

#[async_trait]
impl AssetStorage for S3AssetStorage {
    async fn open(&self, key: &AssetKey) -> Result<AssetDelivery, StorageError> {
        validate_key(key)?;
        let object_key = key.as_str().trim_start_matches("./");

        self.client
            .head_object()
            .bucket(&self.bucket)
            .key(object_key)
            .send()
            .await
            .map_err(|e| match e.into_service_error() {
                err if err.is_not_found() => StorageError::NotFound,
                err => StorageError::Backend(err.to_string()),
            })?;

        let presigning = PresigningConfig::expires_in(self.url_ttl)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(object_key)
            .presigned(presigning)
            .await
            .map_err(|e| {
                tracing::error!(bucket = %self.bucket, error = %e, "failed to presign asset URL");
                StorageError::Backend(e.to_string())
            })?;

        Ok(AssetDelivery::SignedUrl {
            url: presigned.uri().to_string(),
            expires_in: self.url_ttl,
        })
    }

    fn backend(&self) -> &'static str {
        "s3"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_storage() -> S3AssetStorage {
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new("us-east-1"))
            .build();
        S3AssetStorage::new(
            aws_sdk_s3::Client::from_conf(config),
            "assets",
            DEFAULT_SIGNED_URL_TTL,
        )
    }

    #[tokio::test]
    async fn test_traversal_key_is_rejected_before_any_request() {
        let storage = offline_storage();

        let result = storage.open(&AssetKey::new("../other-bucket/key")).await;

        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }

    #[test]
    fn test_backend_name() {
        assert_eq!(offline_storage().backend(), "s3");
    }
}
