//! Storage client implementation over the AWS SDK

use crate::config::ClientConfig;
use crate::error::{Result, StorageError};
use crate::operations::ObjectOperations;
use crate::retry::{with_retry, RetryPolicy};
use crate::types::{CompleteMultipartResult, ObjectStat, PartTag};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client as AwsS3Client;
use bytes::Bytes;
use std::time::{Duration, SystemTime};

/// Client for S3-compatible object storage
#[derive(Clone)]
pub struct Client {
    /// AWS SDK client
    client: AwsS3Client,

    /// Client configuration
    config: ClientConfig,

    /// Retry policy applied to part-level requests
    retry: RetryPolicy,
}

impl Client {
    /// Create a new client with the given configuration
    ///
    /// # Example
    ///
    /// ```no_run
    /// use cirrus::{Client, ClientConfig};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let config = ClientConfig::new();
    ///     let client = Client::new(config).await?;
    ///     Ok(())
    /// }
    /// ```
    pub async fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let client = Self::build_aws_client(&config).await?;
        let retry = RetryPolicy::with_max_attempts(config.max_retries.max(1));

        Ok(Self {
            client,
            config,
            retry,
        })
    }

    /// Build the AWS SDK client from configuration
    async fn build_aws_client(config: &ClientConfig) -> Result<AwsS3Client> {
        let mut aws_config_loader = aws_config::defaults(BehaviorVersion::latest());

        // Set region
        let region_provider = if let Some(region_str) = &config.region {
            RegionProviderChain::first_try(Region::new(region_str.clone()))
        } else {
            RegionProviderChain::default_provider()
        };
        aws_config_loader = aws_config_loader.region(region_provider);

        // Set explicit credentials if provided
        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            let credentials = Credentials::new(
                access_key,
                secret_key,
                config.session_token.clone(),
                None,
                "cirrus-explicit",
            );
            aws_config_loader = aws_config_loader.credentials_provider(credentials);
        }

        let aws_config = aws_config_loader.load().await;

        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&aws_config);

        // Set custom endpoint if provided
        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        // Force path-style addressing if configured (required for MinIO, LocalStack)
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let timeout_config = aws_sdk_s3::config::timeout::TimeoutConfig::builder()
            .operation_timeout(Duration::from_secs(config.timeout_seconds))
            .build();
        s3_config_builder = s3_config_builder.timeout_config(timeout_config);

        Ok(AwsS3Client::from_conf(s3_config_builder.build()))
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Get a reference to the underlying AWS SDK client
    pub fn aws_client(&self) -> &AwsS3Client {
        &self.client
    }

    /// Check if an object exists in the bucket
    pub async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        match self.stat_object(bucket, key).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ObjectOperations for Client {
    async fn stat_object(&self, bucket: &str, key: &str) -> Result<ObjectStat> {
        let response = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.to_string().contains("404") || e.to_string().contains("NotFound") {
                    StorageError::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    }
                } else {
                    StorageError::from(e)
                }
            })?;

        let size = response.content_length().unwrap_or(0) as u64;
        let last_modified = response
            .last_modified()
            .and_then(|dt| SystemTime::try_from(*dt).ok());

        Ok(ObjectStat {
            key: key.to_string(),
            size,
            last_modified,
            etag: response.e_tag().map(|s| s.to_string()),
            content_type: response.content_type().map(|s| s.to_string()),
        })
    }

    async fn get_object_range(
        &self,
        bucket: &str,
        key: &str,
        start: u64,
        end: u64,
    ) -> Result<Bytes> {
        if end < start {
            return Err(StorageError::InvalidRange(format!(
                "range end {} precedes start {}",
                end, start
            )));
        }

        with_retry(&self.retry, || async {
            let range = format!("bytes={}-{}", start, end);

            let response = self
                .client
                .get_object()
                .bucket(bucket)
                .key(key)
                .range(range)
                .send()
                .await
                .map_err(|e| {
                    if e.to_string().contains("404") || e.to_string().contains("NoSuchKey") {
                        StorageError::NotFound {
                            bucket: bucket.to_string(),
                            key: key.to_string(),
                        }
                    } else {
                        StorageError::from(e)
                    }
                })?;

            let body = response.body.collect().await.map_err(|e| {
                StorageError::Network(format!("failed to collect response body: {}", e))
            })?;

            Ok(body.into_bytes())
        })
        .await
    }

    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> Result<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(StorageError::from)?;
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.to_string().contains("404") || e.to_string().contains("NoSuchKey") {
                    StorageError::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    }
                } else {
                    StorageError::from(e)
                }
            })?;

        let body = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Network(format!("failed to collect response body: {}", e)))?;

        Ok(body.into_bytes())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(StorageError::from)?;
        Ok(())
    }

    async fn initiate_multipart(&self, bucket: &str, key: &str) -> Result<String> {
        let response = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(StorageError::from)?;

        response
            .upload_id()
            .ok_or_else(|| StorageError::MultipartUpload("no upload ID returned".to_string()))
            .map(|s| s.to_string())
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<String> {
        with_retry(&self.retry, || async {
            let response = self
                .client
                .upload_part()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(data.clone()))
                .send()
                .await
                .map_err(StorageError::from)?;

            response
                .e_tag()
                .ok_or_else(|| {
                    StorageError::MultipartUpload("no ETag returned for part".to_string())
                })
                .map(|s| s.to_string())
        })
        .await
    }

    async fn complete_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[PartTag],
    ) -> Result<CompleteMultipartResult> {
        let completed_parts: Vec<CompletedPart> = parts
            .iter()
            .map(|p| {
                CompletedPart::builder()
                    .part_number(p.part_number)
                    .e_tag(&p.etag)
                    .build()
            })
            .collect();

        let multipart_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        let response = self
            .client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(multipart_upload)
            .send()
            .await
            .map_err(StorageError::from)?;

        Ok(CompleteMultipartResult {
            etag: response.e_tag().map(|s| s.to_string()),
            location: response.location().map(|s| s.to_string()),
        })
    }

    async fn abort_multipart(&self, bucket: &str, key: &str, upload_id: &str) -> Result<()> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(StorageError::from)?;
        Ok(())
    }
}
