use async_trait::async_trait;
use log::{error, info, warn};
use std::sync::Arc;
use thiserror::Error;

use crate::config::S3Config;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("object storage is not configured")]
    Unconfigured,
    #[error("other: {0}")]
    Other(String),
}

/// Where an uploaded object ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub public_id: String,
    pub url: String,
}

/// Content-addressed blob storage. Storing the same bytes twice is a no-op
/// that returns the same location.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, hash: &str, mime: &str, bytes: &[u8]) -> Result<StoredObject, ObjectStoreError>;
}

// ---------------- S3 implementation (MinIO compatible) ----------------
pub struct S3ObjectStore {
    bucket: String,
    client: aws_sdk_s3::Client,
    folder: String,
    public_base: String,
}

impl S3ObjectStore {
    pub async fn new(cfg: &S3Config) -> anyhow::Result<Self> {
        use aws_credential_types::provider::SharedCredentialsProvider;
        use aws_credential_types::Credentials;

        let endpoint = cfg
            .endpoint
            .clone()
            .ok_or_else(|| anyhow::anyhow!("S3_ENDPOINT must be set (MinIO / S3 endpoint)"))?;
        let public_base = cfg
            .public_base()
            .ok_or_else(|| anyhow::anyhow!("cannot derive public URL base for uploads"))?;

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(cfg.region.clone()))
            .endpoint_url(endpoint);
        if !cfg.access_key.is_empty() && !cfg.secret_key.is_empty() {
            let creds = Credentials::new(cfg.access_key.clone(), cfg.secret_key.clone(), None, None, "static");
            loader = loader.credentials_provider(SharedCredentialsProvider::new(creds));
        }
        let conf = loader.load().await;
        // path-style addressing for MinIO and endpoints without wildcard DNS
        let s3_conf = aws_sdk_s3::config::Builder::from(&conf).force_path_style(true).build();
        let client = aws_sdk_s3::Client::from_conf(s3_conf);
        info!("Initialized S3 client for bucket '{}'", cfg.bucket);

        let store = Self { bucket: cfg.bucket.clone(), client, folder: cfg.folder.clone(), public_base };
        store.ensure_bucket().await?;
        Ok(store)
    }

    async fn ensure_bucket(&self) -> anyhow::Result<()> {
        let bucket = &self.bucket;
        if let Err(e) = self.client.head_bucket().bucket(bucket).send().await {
            warn!("head_bucket failed for '{bucket}' (will attempt create): {e:?}");
            let max_attempts = 8u32;
            for attempt in 1..=max_attempts {
                match self.client.create_bucket().bucket(bucket).send().await {
                    Ok(_) => {
                        info!("created bucket '{bucket}' (attempt {attempt})");
                        return Ok(());
                    }
                    Err(e2) if attempt == max_attempts => {
                        error!("create_bucket failed for '{bucket}' after {attempt} attempts: {e2:?}");
                        return Err(anyhow::anyhow!("failed to ensure bucket '{bucket}': {e2}"));
                    }
                    Err(e2) => {
                        let backoff_ms = 200 * attempt.pow(2);
                        warn!("create_bucket attempt {attempt} failed for '{bucket}': {e2:?} (retrying in {backoff_ms}ms)");
                        tokio::time::sleep(std::time::Duration::from_millis(backoff_ms as u64)).await;
                    }
                }
            }
        }
        Ok(())
    }

    fn key_for(&self, hash: &str) -> String {
        object_key(&self.folder, hash)
    }
}

/// `<folder>/<first two hex chars>/<hash>`
pub fn object_key(folder: &str, hash: &str) -> String {
    let shard = hash.get(0..2).unwrap_or(hash);
    format!("{}/{}/{}", folder.trim_matches('/'), shard, hash)
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, hash: &str, mime: &str, bytes: &[u8]) -> Result<StoredObject, ObjectStoreError> {
        use aws_sdk_s3::primitives::ByteStream;
        let key = self.key_for(hash);
        let stored = StoredObject { url: format!("{}/{}", self.public_base, key), public_id: key.clone() };
        if self.client.head_object().bucket(&self.bucket).key(&key).send().await.is_ok() {
            info!("object {key} already stored, reusing");
            return Ok(stored);
        }
        let put = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(bytes.to_vec()))
            .content_type(mime);
        if let Err(e) = put.send().await {
            error!("put_object failed key={key} bucket={} err={:?}", self.bucket, e);
            let hint = if e.to_string().contains("NoSuchBucket") {
                " (bucket missing or not yet propagated)"
            } else if e.to_string().contains("AccessDenied") {
                " (check S3_ACCESS_KEY/S3_SECRET_KEY permissions)"
            } else {
                ""
            };
            return Err(ObjectStoreError::Other(format!("{e}{hint}")));
        }
        Ok(stored)
    }
}

/// Stand-in used when no endpoint is configured; every upload fails.
pub struct UnconfiguredStore;

#[async_trait]
impl ObjectStore for UnconfiguredStore {
    async fn put(&self, _hash: &str, _mime: &str, _bytes: &[u8]) -> Result<StoredObject, ObjectStoreError> {
        Err(ObjectStoreError::Unconfigured)
    }
}

/// S3 when `S3_ENDPOINT` is set, otherwise a store that rejects uploads.
pub async fn build_object_store(cfg: &S3Config) -> anyhow::Result<Arc<dyn ObjectStore>> {
    if cfg.endpoint.is_none() {
        warn!("S3_ENDPOINT not set; file uploads are disabled");
        return Ok(Arc::new(UnconfiguredStore));
    }
    Ok(Arc::new(S3ObjectStore::new(cfg).await?))
}
