//! S3 object store backend for raw replays and rendered videos.

use super::{ObjectStore, StoreError, StoreResult};
use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::time::Duration;

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: Client, bucket: String) -> Self {
        S3ObjectStore { client, bucket }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> StoreResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| StoreError::storage(format!("S3 PutObject failed: {e}")))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                if let aws_sdk_s3::error::SdkError::ServiceError(se) = &e {
                    if se.err().is_no_such_key() {
                        return Ok(None);
                    }
                }
                return Err(StoreError::storage(format!("S3 GetObject failed: {e}")));
            }
        };

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| StoreError::storage(format!("S3 body read failed: {e}")))?;
        Ok(Some(bytes.into_bytes().to_vec()))
    }

    async fn presign_get(&self, key: &str, expires_secs: u64) -> StoreResult<String> {
        let config = PresigningConfig::expires_in(Duration::from_secs(expires_secs))
            .map_err(|e| StoreError::storage(format!("presign config: {e}")))?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(|e| StoreError::storage(format!("S3 presign failed: {e}")))?;
        Ok(request.uri().to_string())
    }
}
