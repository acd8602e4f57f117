//! `Vault` — the content-addressed blob + per-host metadata contract (§4.1).
//!
//! New trait, modeled on the trait-object-backend pattern the teacher uses
//! for storage abstraction in `library/manager.rs`. Two backends: a local
//! filesystem vault (`fs.rs`) and an S3-style vault (`s3.rs`).

pub mod fs;
pub mod s3;

use std::path::Path;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::Digest;

pub const CONTENT_PREFIX: &str = "content";
pub const METADATA_PREFIX: &str = "metadata";

#[async_trait]
pub trait Vault: Send + Sync {
    /// Uploads the bytes at `source_path` under `digest`. Idempotent: a
    /// cheap existence check short-circuits re-upload of an object already
    /// present. Implementations verify the uploaded bytes hash to `digest`.
    async fn put_content(&self, digest: &Digest, source_path: &Path) -> Result<(), VaultError>;

    /// Streams the object named `digest` to `output_path`; verifies the
    /// downloaded hash, deleting the partial file on mismatch.
    async fn get_content(&self, digest: &Digest, output_path: &Path) -> Result<(), VaultError>;

    /// Uploads the metadata database under a key derived from `host_id`.
    /// Overwrites; backends may retain prior versions out-of-band.
    async fn put_metadata(&self, host_id: Uuid, source_path: &Path) -> Result<(), VaultError>;

    /// Fetches the most recent metadata blob for `host_id`.
    async fn get_metadata(&self, host_id: Uuid, output_path: &Path) -> Result<(), VaultError>;

    /// Idempotent backend-specific initialization and permission probe.
    async fn validate_setup(&self) -> Result<(), VaultError>;

    /// A short label for diagnostics (e.g. `"fs:/home/me/vault"`).
    fn describe(&self) -> String;
}

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("transient vault failure: {0}")]
    Transient(String),
    #[error("corrupt object: {0}")]
    Corrupt(String),
    #[error("vault authentication denied: {0}")]
    AuthDenied(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub fn content_key(digest: &Digest) -> String {
    format!("{CONTENT_PREFIX}/{digest}")
}

pub fn metadata_key(host_id: Uuid) -> String {
    format!("{METADATA_PREFIX}/{host_id}")
}
