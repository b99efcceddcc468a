//! S3-compatible client implementation.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::store::ObjectStore;

/// Configuration for the S3 client.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// S3 API endpoint URL
    pub endpoint_url: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Bucket name
    pub bucket_name: String,
    /// Region ("auto" works for most S3-compatible providers)
    pub region: String,
}

impl S3Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: std::env::var("S3_ENDPOINT")
                .map_err(|_| StorageError::config_error("S3_ENDPOINT not set"))?,
            access_key_id: std::env::var("S3_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("S3_ACCESS_KEY not set"))?,
            secret_access_key: std::env::var("S3_SECRET_KEY")
                .map_err(|_| StorageError::config_error("S3_SECRET_KEY not set"))?,
            bucket_name: std::env::var("S3_BUCKET")
                .map_err(|_| StorageError::config_error("S3_BUCKET not set"))?,
            region: std::env::var("S3_REGION").unwrap_or_else(|_| "auto".to_string()),
        })
    }
}

/// S3-compatible storage client.
#[derive(Clone)]
pub struct S3Client {
    client: Client,
    bucket: String,
}

impl S3Client {
    /// Create a new client from configuration.
    pub fn new(config: S3Config) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "xform",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name,
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self::new(S3Config::from_env()?))
    }

    /// Upload bytes.
    pub async fn upload_bytes(
        &self,
        data: Vec<u8>,
        key: &str,
        content_type: &str,
    ) -> StorageResult<()> {
        debug!("Uploading {} bytes to {}", data.len(), key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        Ok(())
    }

    /// Download object as bytes.
    pub async fn download_bytes(&self, key: &str) -> StorageResult<Vec<u8>> {
        debug!("Downloading {}", key);

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.to_string().contains("NoSuchKey") {
                    StorageError::not_found(key)
                } else {
                    StorageError::download_failed(e.to_string())
                }
            })?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::download_failed(e.to_string()))?
            .into_bytes()
            .to_vec();

        Ok(bytes)
    }

    /// List object keys with a prefix, following continuation tokens.
    pub async fn list_objects(&self, prefix: &str) -> StorageResult<Vec<String>> {
        debug!("Listing objects with prefix: {}", prefix);

        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);

            if let Some(token) = continuation_token {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| StorageError::ListFailed(e.to_string()))?;

            if let Some(ref contents) = response.contents {
                keys.extend(contents.iter().filter_map(|obj| obj.key.clone()));
            }

            if response.is_truncated() == Some(true) {
                continuation_token = response.next_continuation_token;
            } else {
                break;
            }
        }

        Ok(keys)
    }

    /// Check connectivity by performing a head bucket operation.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| StorageError::AwsSdk(format!("S3 connectivity check failed: {}", e)))?;
        info!("Connected to bucket {}", self.bucket);
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn list_keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.list_objects(prefix).await
    }

    async fn get_object(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.download_bytes(key).await
    }

    async fn put_object(&self, key: &str, data: Vec<u8>) -> StorageResult<()> {
        self.upload_bytes(data, key, "application/octet-stream").await
    }
}
