//! Crate-wide error taxonomy.
//!
//! Every fallible public function returns `Result<T, BtError>` (or a
//! component-local error convertible into it via `#[from]`). The CLI
//! boundary (`infrastructure::cli`) is the only place this type is ever
//! unwrapped into a process exit code and a human-readable message.

use std::path::PathBuf;

use crate::infrastructure::fs_manager::FsManagerError;
use crate::infrastructure::staging::StagingError;
use crate::infrastructure::vault::VaultError;

pub type Result<T> = std::result::Result<T, BtError>;

/// Exit codes follow BSD `sysexits.h`-style conventions, matching the
/// mapping several CLIs in this corpus use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    UserError = 1,
    StagingFailure = 2,
    Transient = 3,
    Corrupt = 4,
    AuthOrConfig = 5,
    Software = 70,
}

#[derive(thiserror::Error, Debug)]
pub enum BtError {
    /// Network timeout, 5xx, disk-full-temporary. Retried by the vault
    /// client with backoff before ever reaching this variant.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Digest mismatch on download, truncated database, or similar.
    #[error("corrupt data: {0}")]
    Corrupt(String),

    /// A file changed on disk between the pre- and post-copy `stat` calls
    /// during staging.
    #[error("file mutated while staging {path}")]
    FileMutatedDuringStage { path: PathBuf },

    #[error("path is not tracked: {0}")]
    NotTracked(PathBuf),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("authentication denied: {0}")]
    AuthDenied(String),

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Database corruption, lock contention, or anything that should
    /// preserve on-disk state and ask for operator attention.
    #[error("fatal: {0}")]
    Fatal(String),

    #[error(transparent)]
    Database(#[from] sea_orm::DbErr),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BtError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            BtError::NotTracked(_) | BtError::NotFound(_) => ExitCode::UserError,
            BtError::FileMutatedDuringStage { .. } => ExitCode::StagingFailure,
            BtError::Transient(_) => ExitCode::Transient,
            BtError::Corrupt(_) => ExitCode::Corrupt,
            BtError::AuthDenied(_) | BtError::ConfigInvalid(_) => ExitCode::AuthOrConfig,
            BtError::Fatal(_) | BtError::Database(_) | BtError::Io(_) => ExitCode::Software,
        }
    }
}

impl From<VaultError> for BtError {
    fn from(e: VaultError) -> Self {
        match e {
            VaultError::Transient(msg) => BtError::Transient(msg),
            VaultError::Corrupt(msg) => BtError::Corrupt(msg),
            VaultError::AuthDenied(msg) => BtError::AuthDenied(msg),
            VaultError::NotFound(msg) => BtError::NotFound(msg),
            VaultError::Io(e) => BtError::Io(e),
        }
    }
}

impl From<FsManagerError> for BtError {
    fn from(e: FsManagerError) -> Self {
        match e {
            FsManagerError::NotFound(path) => BtError::NotFound(path.display().to_string()),
            FsManagerError::NotRegularFile(path) => {
                BtError::ConfigInvalid(format!("not a regular file: {}", path.display()))
            }
            FsManagerError::PermissionDenied(path) => {
                BtError::AuthDenied(format!("permission denied: {}", path.display()))
            }
            FsManagerError::Io(e) => BtError::Io(e),
        }
    }
}

impl From<StagingError> for BtError {
    fn from(e: StagingError) -> Self {
        match e {
            StagingError::FileMutatedDuringStage { path } => {
                BtError::FileMutatedDuringStage { path }
            }
            StagingError::Corrupt(msg) => BtError::Corrupt(msg),
            StagingError::Io(e) => BtError::Io(e),
            StagingError::Cbor(msg) => BtError::Corrupt(msg),
            StagingError::AlreadyRunning => {
                BtError::Fatal("another bt process is already running".into())
            }
        }
    }
}
