//! Filesystem-backed vault. Grounded on the teacher's `tokio::fs` usage
//! throughout `location/manager.rs` (copy/rename-based atomic writes): every
//! write lands at `<key>.tmp-<rand>` then is renamed into place, so a
//! concurrent reader never observes a partial object (§4.1 "Failure model").

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{Digest, DigestHasher};

use super::{content_key, metadata_key, Vault, VaultError};

const STREAM_BUF: usize = 8 * 1024 * 1024;

pub struct FilesystemVault {
    root: PathBuf,
}

impl FilesystemVault {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn tmp_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.tmp-{}", Uuid::new_v4().simple()))
    }

    /// Copies `src` to `dst` via a temp-file-then-rename, hashing the bytes
    /// as they're streamed through (never loading the whole file).
    async fn atomic_copy_with_hash(&self, src: &Path, final_key: &str) -> Result<Digest, VaultError> {
        let dst = self.object_path(final_key);
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp = self.tmp_path(final_key);

        let mut reader = fs::File::open(src).await?;
        let mut writer = fs::File::create(&tmp).await?;
        let mut hasher = DigestHasher::new();
        let mut buf = vec![0u8; STREAM_BUF];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            writer.write_all(&buf[..n]).await?;
        }
        writer.flush().await?;
        writer.sync_all().await?;
        drop(writer);

        fs::rename(&tmp, &dst).await?;
        Ok(hasher.finish())
    }
}

#[async_trait]
impl Vault for FilesystemVault {
    async fn put_content(&self, digest: &Digest, source_path: &Path) -> Result<(), VaultError> {
        let key = content_key(digest);
        if self.object_path(&key).exists() {
            debug!(%digest, "content already present, skipping upload");
            return Ok(());
        }
        let actual = self.atomic_copy_with_hash(source_path, &key).await?;
        if &actual != digest {
            let _ = fs::remove_file(self.object_path(&key)).await;
            return Err(VaultError::Corrupt(format!(
                "uploaded bytes hash to {actual}, expected {digest}"
            )));
        }
        info!(%digest, "uploaded content to filesystem vault");
        Ok(())
    }

    async fn get_content(&self, digest: &Digest, output_path: &Path) -> Result<(), VaultError> {
        let key = content_key(digest);
        let src = self.object_path(&key);
        if !src.exists() {
            return Err(VaultError::NotFound(format!("content {digest}")));
        }
        let tmp = self.tmp_path("download");
        let actual = copy_with_hash(&src, &tmp).await?;
        if &actual != digest {
            let _ = fs::remove_file(&tmp).await;
            return Err(VaultError::Corrupt(format!(
                "downloaded bytes hash to {actual}, expected {digest}"
            )));
        }
        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&tmp, output_path).await?;
        Ok(())
    }

    async fn put_metadata(&self, host_id: Uuid, source_path: &Path) -> Result<(), VaultError> {
        let key = metadata_key(host_id);
        self.atomic_copy_with_hash(source_path, &key).await?;
        info!(%host_id, "uploaded metadata database to filesystem vault");
        Ok(())
    }

    async fn get_metadata(&self, host_id: Uuid, output_path: &Path) -> Result<(), VaultError> {
        let key = metadata_key(host_id);
        let src = self.object_path(&key);
        if !src.exists() {
            return Err(VaultError::NotFound(format!("metadata for {host_id}")));
        }
        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(&src, output_path).await?;
        Ok(())
    }

    async fn validate_setup(&self) -> Result<(), VaultError> {
        fs::create_dir_all(self.root.join(super::CONTENT_PREFIX)).await?;
        fs::create_dir_all(self.root.join(super::METADATA_PREFIX)).await?;

        let probe_key = format!("{}/.probe-{}", super::METADATA_PREFIX, Uuid::new_v4());
        let probe_path = self.object_path(&probe_key);
        fs::write(&probe_path, b"probe").await?;
        let read_back = fs::read(&probe_path).await?;
        fs::remove_file(&probe_path).await?;
        if read_back != b"probe" {
            return Err(VaultError::Corrupt("probe roundtrip mismatch".into()));
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("fs:{}", self.root.display())
    }
}

async fn copy_with_hash(src: &Path, dst: &Path) -> Result<Digest, VaultError> {
    let mut reader = fs::File::open(src).await?;
    let mut writer = fs::File::create(dst).await?;
    let mut hasher = DigestHasher::new();
    let mut buf = vec![0u8; STREAM_BUF];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        writer.write_all(&buf[..n]).await?;
    }
    writer.flush().await?;
    Ok(hasher.finish())
}
