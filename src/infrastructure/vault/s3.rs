//! S3-style vault. Grounded on `beyondessential-bestool/src/aws/s3.rs`
//! (`aws_sdk_s3::{primitives::ByteStream, Client}`, `ByteStream::from_path`,
//! `put_object().checksum_algorithm(...)`) — the teacher itself carries no
//! S3 code, so this backend is enrichment from the pack, not a reuse.
//!
//! Content and metadata may live under distinct buckets/prefixes (§4.1
//! "Layout"), enabling separate lifecycle/storage-class policies.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::VaultConfig;
use crate::domain::{Digest, DigestHasher};

use super::{Vault, VaultError};

const STREAM_BUF: usize = 8 * 1024 * 1024;
const MAX_ATTEMPTS: u32 = 5;

pub struct S3Vault {
    client: Client,
    content_bucket: String,
    content_prefix: String,
    metadata_bucket: String,
    metadata_prefix: String,
}

impl S3Vault {
    pub async fn from_config(cfg: &VaultConfig) -> Result<Self, VaultError> {
        let VaultConfig::S3 {
            bucket,
            content_prefix,
            metadata_bucket,
            metadata_prefix,
            region,
            endpoint,
        } = cfg
        else {
            return Err(VaultError::AuthDenied("not an s3 vault config".into()));
        };

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region.clone() {
            loader = loader.region(aws_config::Region::new(region));
        }
        if let Some(endpoint) = endpoint.clone() {
            loader = loader.endpoint_url(endpoint);
        }
        let shared_config = loader.load().await;
        let client = Client::new(&shared_config);

        Ok(Self {
            client,
            content_bucket: bucket.clone(),
            content_prefix: content_prefix.clone().unwrap_or_else(|| "content".into()),
            metadata_bucket: metadata_bucket.clone().unwrap_or_else(|| bucket.clone()),
            metadata_prefix: metadata_prefix.clone().unwrap_or_else(|| "metadata".into()),
        })
    }

    fn content_key(&self, digest: &Digest) -> String {
        format!("{}/{digest}", self.content_prefix)
    }

    fn metadata_key(&self, host_id: Uuid) -> String {
        format!("{}/{host_id}", self.metadata_prefix)
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, VaultError> {
        match self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                let svc = err.into_service_error();
                if svc.is_not_found() {
                    Ok(false)
                } else {
                    Err(classify(svc.to_string()))
                }
            }
        }
    }

    async fn upload(&self, bucket: &str, key: &str, path: &Path) -> Result<(), VaultError> {
        with_backoff(|| async {
            let body = ByteStream::from_path(path)
                .await
                .map_err(|e| VaultError::Io(std::io::Error::other(e.to_string())))?;
            self.client
                .put_object()
                .bucket(bucket)
                .key(key)
                .body(body)
                .send()
                .await
                .map_err(|e| classify(e.into_service_error().to_string()))?;
            Ok(())
        })
        .await
    }

    /// Streams the object at `key` to `output_path`. Callers own tmp-file
    /// placement and rename semantics; this just writes the bytes.
    async fn download(&self, bucket: &str, key: &str, output_path: &Path) -> Result<(), VaultError> {
        with_backoff(|| async {
            let output = self
                .client
                .get_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| {
                    let svc = e.into_service_error();
                    if svc.is_no_such_key() {
                        VaultError::NotFound(key.to_string())
                    } else {
                        classify(svc.to_string())
                    }
                })?;

            if let Some(parent) = output_path.parent() {
                fs::create_dir_all(parent).await?;
            }
            let mut reader = output.body.into_async_read();
            let mut writer = fs::File::create(output_path).await?;
            let mut buf = vec![0u8; STREAM_BUF];
            loop {
                let n = reader.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                writer.write_all(&buf[..n]).await?;
            }
            writer.flush().await?;
            Ok(())
        })
        .await
    }

    async fn upload_bytes_consistency_check(
        &self,
        digest: &Digest,
        source_path: &Path,
    ) -> Result<(), VaultError> {
        let mut reader = fs::File::open(source_path).await?;
        let mut hasher = DigestHasher::new();
        let mut buf = vec![0u8; STREAM_BUF];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        let actual = hasher.finish();
        if &actual != digest {
            return Err(VaultError::Corrupt(format!(
                "source file hashes to {actual}, expected {digest}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Vault for S3Vault {
    async fn put_content(&self, digest: &Digest, source_path: &Path) -> Result<(), VaultError> {
        let key = self.content_key(digest);
        if self.exists(&self.content_bucket, &key).await? {
            debug!(%digest, "content already present in bucket, skipping upload");
            return Ok(());
        }
        self.upload_bytes_consistency_check(digest, source_path)
            .await?;
        self.upload(&self.content_bucket, &key, source_path).await?;
        info!(%digest, bucket = %self.content_bucket, "uploaded content to s3 vault");
        Ok(())
    }

    async fn get_content(&self, digest: &Digest, output_path: &Path) -> Result<(), VaultError> {
        let key = self.content_key(digest);
        let tmp = output_path.with_extension("tmp-download");
        self.download(&self.content_bucket, &key, &tmp).await?;

        let actual = hash_file(&tmp).await?;
        if &actual != digest {
            let _ = fs::remove_file(&tmp).await;
            return Err(VaultError::Corrupt(format!(
                "downloaded bytes hash to {actual}, expected {digest}"
            )));
        }
        fs::rename(&tmp, output_path).await?;
        Ok(())
    }

    async fn put_metadata(&self, host_id: Uuid, source_path: &Path) -> Result<(), VaultError> {
        let key = self.metadata_key(host_id);
        self.upload(&self.metadata_bucket, &key, source_path).await?;
        info!(%host_id, bucket = %self.metadata_bucket, "uploaded metadata database to s3 vault");
        Ok(())
    }

    async fn get_metadata(&self, host_id: Uuid, output_path: &Path) -> Result<(), VaultError> {
        let key = self.metadata_key(host_id);
        if !self.exists(&self.metadata_bucket, &key).await? {
            return Err(VaultError::NotFound(format!("metadata for {host_id}")));
        }
        self.download(&self.metadata_bucket, &key, output_path).await
    }

    async fn validate_setup(&self) -> Result<(), VaultError> {
        with_backoff(|| async {
            self.client
                .head_bucket()
                .bucket(&self.content_bucket)
                .send()
                .await
                .map_err(|e| classify(e.into_service_error().to_string()))?;
            if self.metadata_bucket != self.content_bucket {
                self.client
                    .head_bucket()
                    .bucket(&self.metadata_bucket)
                    .send()
                    .await
                    .map_err(|e| classify(e.into_service_error().to_string()))?;
            }
            Ok(())
        })
        .await?;

        let probe_key = format!("{}/.probe-{}", self.metadata_prefix, Uuid::new_v4());
        self.client
            .put_object()
            .bucket(&self.metadata_bucket)
            .key(&probe_key)
            .body(ByteStream::from_static(b"probe"))
            .send()
            .await
            .map_err(|e| classify(e.into_service_error().to_string()))?;
        self.client
            .delete_object()
            .bucket(&self.metadata_bucket)
            .key(&probe_key)
            .send()
            .await
            .map_err(|e| classify(e.into_service_error().to_string()))?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("s3:{}/{}", self.content_bucket, self.content_prefix)
    }
}

async fn hash_file(path: &Path) -> Result<Digest, VaultError> {
    let mut reader = fs::File::open(path).await?;
    let mut hasher = DigestHasher::new();
    let mut buf = vec![0u8; STREAM_BUF];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finish())
}

fn classify(message: String) -> VaultError {
    let lower = message.to_lowercase();
    if lower.contains("access denied") || lower.contains("forbidden") || lower.contains("credential") {
        VaultError::AuthDenied(message)
    } else if lower.contains("not found") || lower.contains("no such") {
        VaultError::NotFound(message)
    } else {
        VaultError::Transient(message)
    }
}

/// Retries transient failures with exponential backoff, up to
/// `MAX_ATTEMPTS` (§5 "individual vault calls... retry with exponential
/// backoff up to an implementation-chosen cap (3-5 attempts)").
async fn with_backoff<F, Fut, T>(f: F) -> Result<T, VaultError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, VaultError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match f().await {
            Ok(v) => return Ok(v),
            Err(VaultError::Transient(msg)) if attempt < MAX_ATTEMPTS => {
                let delay = Duration::from_millis(200 * 2u64.pow(attempt - 1));
                warn!(attempt, %msg, delay_ms = delay.as_millis() as u64, "retrying transient vault failure");
                tokio::time::sleep(delay).await;
            }
            Err(other) => return Err(other),
        }
    }
}
