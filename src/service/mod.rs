//! `BackupService` (§4.5) — the orchestrator binding `MetadataStore`,
//! `StagingArea`, `FilesystemManager`, `IgnoreRuler` and the configured
//! `Vault`s behind the logical verbs the CLI calls.
//!
//! New composition: no single teacher file plays this role, since the
//! teacher's closest analogue (`operations/indexing/`) drives continuous
//! indexing rather than a staged WAL. Structured as a facade type the way
//! `core-new/src/library/manager.rs` composes a database handle and
//! filesystem operations behind high-level async methods.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_concurrency::future::Join;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::FileStatus;
use crate::error::{BtError, Result};
use crate::infrastructure::database::entities::{directory, file, file_snapshot};
use crate::infrastructure::database::repo::MetadataStore;
use crate::infrastructure::database::Database;
use crate::infrastructure::fs_manager::FilesystemManager;
use crate::infrastructure::ignore::IgnoreRuler;
use crate::infrastructure::staging::{ProcessLock, StagingArea};
use crate::infrastructure::vault::Vault;

const HASH_CONCURRENCY: usize = 8;

pub struct FileStatusEntry {
    pub relative_name: String,
    pub status: FileStatus,
}

/// Binds one host's metadata store, staging area, and vault set together.
pub struct BackupService {
    store: MetadataStore,
    staging_root: PathBuf,
    vaults: Vec<Arc<dyn Vault>>,
    host_id: Uuid,
    ignore_list: Vec<String>,
}

impl BackupService {
    pub fn new(
        db: &Database,
        staging_root: PathBuf,
        vaults: Vec<Arc<dyn Vault>>,
        host_id: Uuid,
        ignore_list: Vec<String>,
    ) -> Self {
        Self {
            store: MetadataStore::new(db.conn().clone()),
            staging_root,
            vaults,
            host_id,
            ignore_list,
        }
    }

    fn ignore_ruler(&self) -> IgnoreRuler {
        IgnoreRuler::new(self.ignore_list.clone())
    }

    /// `add_directory(path)` (§4.5): track `path`, consolidating any
    /// already-tracked descendants into it.
    pub async fn add_directory(&self, path: &Path) -> Result<directory::Model> {
        let resolved = FilesystemManager::resolve_and_validate(path)?;
        if let Some(existing) = self.store.search_directory_for_path(&resolved).await? {
            info!(path = %resolved.display(), "directory already tracked");
            return Ok(existing);
        }
        FilesystemManager::require_read_execute(&resolved)?;
        let dir = self.store.create_directory(&resolved).await?;
        info!(path = %resolved.display(), uuid = %dir.uuid, "tracking directory");
        Ok(dir)
    }

    /// `stage_file(path)` (§4.5): walk `path` (a file or directory),
    /// hashing independent files concurrently, and append a WAL entry for
    /// each one not excluded by ignore rules.
    pub async fn stage_file(&self, path: &Path) -> Result<usize> {
        let resolved = FilesystemManager::resolve_and_validate(path)?;
        let dir = self
            .store
            .search_directory_for_path(&resolved)
            .await?
            .ok_or_else(|| BtError::NotTracked(resolved.clone()))?;
        let dir_root = PathBuf::from(&dir.path);

        let ruler = self.ignore_ruler();
        let is_dir = tokio::fs::metadata(&resolved).await?.is_dir();

        let mut targets = Vec::new();
        if is_dir {
            let mut walker = FilesystemManager::walk(resolved.clone(), ruler.clone());
            while let Some(p) = walker.next().await? {
                targets.push(p);
            }
        } else if !ruler.is_ignored(&dir_root, &resolved, false) {
            targets.push(resolved.clone());
        }

        let mut hashing: JoinSet<Result<(PathBuf, crate::domain::FileStats)>> = JoinSet::new();
        let mut staged = 0usize;
        let mut pending = targets.into_iter();
        let mut in_flight = 0usize;
        let mut results = Vec::new();

        loop {
            while in_flight < HASH_CONCURRENCY {
                let Some(p) = pending.next() else { break };
                in_flight += 1;
                hashing.spawn(async move {
                    let stats = FilesystemManager::stat(&p).await?;
                    Ok((p, stats))
                });
            }
            let Some(joined) = hashing.join_next().await else {
                break;
            };
            in_flight -= 1;
            results.push(joined.map_err(|e| BtError::Fatal(e.to_string()))??);
        }

        let mut staging = StagingArea::open(self.staging_root.clone()).await?;
        for (file_path, _stats) in results {
            let relative = file_path
                .strip_prefix(&dir_root)
                .unwrap_or(&file_path)
                .to_string_lossy()
                .replace(std::path::MAIN_SEPARATOR, "/");
            let file_row = self.store.find_or_create_file(dir.id, &relative).await?;
            staging
                .stage_for_backup(&file_path, file_row.id, dir.id, &relative)
                .await?;
            staged += 1;
        }

        info!(path = %resolved.display(), staged, "staged files for backup");
        Ok(staged)
    }

    /// `backup()` (§4.5): drain the WAL, running the commit protocol
    /// (§4.4) for each queued operation in `seq` order, then upload the
    /// metadata database to every vault.
    pub async fn backup(&self, db: &Database) -> Result<usize> {
        let _lock = ProcessLock::acquire(&self.staging_root).await?;
        let mut staging = StagingArea::open(self.staging_root.clone()).await?;

        let mut committed = 0usize;
        loop {
            let Some(op) = staging.peek_head().await? else {
                break;
            };

            let record = &op.record;
            let blob_path = staging.blob_path_for(op.op_uuid);

            let file_row = self
                .store
                .get_file_by_id(record.file_id)
                .await?
                .ok_or_else(|| BtError::Corrupt(format!("file {} missing", record.file_id)))?;

            // Keyed on the file's current snapshot, not any historical one
            // sharing the digest: a file reverted to an earlier version must
            // still re-commit a fresh snapshot so `current_snapshot_id` advances.
            let already_current = match file_row.current_snapshot_id {
                Some(snapshot_id) => {
                    let snapshot = self
                        .store
                        .get_snapshot_by_id(snapshot_id)
                        .await?
                        .ok_or_else(|| BtError::Corrupt(format!("snapshot {snapshot_id} missing")))?;
                    snapshot.content_id == record.digest.as_str()
                        && snapshot.size == record.stats.size as i64
                }
                None => false,
            };

            if !already_current {
                let uploads = self
                    .vaults
                    .iter()
                    .map(|v| v.put_content(&record.digest, &blob_path));
                let results: Vec<_> = uploads.collect::<Vec<_>>().join().await;
                for r in results {
                    r?;
                }

                self.store
                    .commit_snapshot(record.file_id, &record.digest, &record.stats)
                    .await?;
                db.checkpoint_full().await?;
            }

            staging.retire(op.seq, op.op_uuid).await?;
            committed += 1;
        }

        if committed > 0 {
            self.upload_metadata(db).await?;
        }
        info!(committed, "backup drained WAL");
        Ok(committed)
    }

    async fn upload_metadata(&self, db: &Database) -> Result<()> {
        let tmp = self.staging_root.join(format!(".metadata-{}.db", Uuid::new_v4()));
        db.vacuum_into(&tmp).await?;

        let uploads = self
            .vaults
            .iter()
            .map(|v| v.put_metadata(self.host_id, &tmp));
        let results: Vec<_> = uploads.collect::<Vec<_>>().join().await;
        let cleanup = tokio::fs::remove_file(&tmp).await;
        for r in results {
            r?;
        }
        cleanup?;
        info!(host_id = %self.host_id, "uploaded metadata database to all vaults");
        Ok(())
    }

    /// `get_status(path)` (§4.5): per-file status beneath the tracked
    /// directory containing `path`.
    pub async fn get_status(&self, path: &Path, include_deleted: bool) -> Result<Vec<FileStatusEntry>> {
        let resolved = FilesystemManager::resolve_and_validate(path)?;
        let dir = self
            .store
            .search_directory_for_path(&resolved)
            .await?
            .ok_or_else(|| BtError::NotTracked(resolved.clone()))?;
        let dir_root = PathBuf::from(&dir.path);
        let ruler = self.ignore_ruler();
        let staging = StagingArea::open(self.staging_root.clone()).await?;

        let rows = self.store.list_files_in_directory(dir.id).await?;
        let mut seen_names = HashSet::new();
        let mut out = Vec::new();

        for row in &rows {
            seen_names.insert(row.name.clone());
            let on_disk = dir_root.join(&row.name);
            if !on_disk.exists() {
                if !row.deleted {
                    self.store.set_file_deleted(row.id, true).await?;
                }
                if include_deleted {
                    out.push(FileStatusEntry {
                        relative_name: row.name.clone(),
                        status: FileStatus::Deleted,
                    });
                }
                continue;
            }
            if row.deleted {
                self.store.set_file_deleted(row.id, false).await?;
            }

            if ruler.is_ignored(&dir_root, &on_disk, false) {
                out.push(FileStatusEntry {
                    relative_name: row.name.clone(),
                    status: FileStatus::Ignored,
                });
                continue;
            }

            let status = self.status_of_tracked_file(row, &on_disk, &staging).await?;
            out.push(FileStatusEntry {
                relative_name: row.name.clone(),
                status,
            });
        }

        let mut walker = FilesystemManager::walk(dir_root.clone(), ruler.clone());
        while let Some(p) = walker.next().await? {
            let relative = p
                .strip_prefix(&dir_root)
                .unwrap_or(&p)
                .to_string_lossy()
                .replace(std::path::MAIN_SEPARATOR, "/");
            if seen_names.contains(&relative) {
                continue;
            }
            out.push(FileStatusEntry {
                relative_name: relative,
                status: FileStatus::Untracked,
            });
        }

        Ok(out)
    }

    async fn status_of_tracked_file(
        &self,
        row: &file::Model,
        on_disk: &Path,
        staging: &StagingArea,
    ) -> Result<FileStatus> {
        let Some(snapshot_id) = row.current_snapshot_id else {
            return Ok(FileStatus::Untracked);
        };
        let snapshot = self
            .store
            .get_snapshot_by_id(snapshot_id)
            .await?
            .ok_or_else(|| BtError::Corrupt(format!("snapshot {snapshot_id} missing")))?;
        let current_stats = FilesystemManager::stat(on_disk).await?;
        let snapshot_stats = stats_from_snapshot(&snapshot);

        if current_stats.differs_for_status(&snapshot_stats) {
            return Ok(FileStatus::Modified);
        }
        if staging.is_staged(row.id).await? {
            return Ok(FileStatus::Staged);
        }
        Ok(FileStatus::BackedUp)
    }

    /// `get_file_history(path)` (§4.5): snapshots newest-first.
    pub async fn get_file_history(&self, path: &Path) -> Result<Vec<file_snapshot::Model>> {
        let resolved = FilesystemManager::resolve_and_validate(path)?;
        let dir = self
            .store
            .search_directory_for_path(&resolved)
            .await?
            .ok_or_else(|| BtError::NotTracked(resolved.clone()))?;
        let relative = relative_name(&dir, &resolved);
        let file_row = self
            .store
            .find_or_create_file(dir.id, &relative)
            .await?;
        self.store.list_snapshots(file_row.id).await.map_err(Into::into)
    }

    /// `restore_file(path, digest)` (§4.5): download the named snapshot's
    /// content to `<parent>/<filename>.<digest>`, then best-effort restore
    /// of mode/owner/mtimes (logged, never fatal).
    pub async fn restore_file(&self, path: &Path, digest: &crate::domain::Digest) -> Result<PathBuf> {
        let resolved = resolve_possibly_missing(path)?;
        let dir = self
            .store
            .search_directory_for_path(resolved.parent().unwrap_or(&resolved))
            .await?
            .ok_or_else(|| BtError::NotTracked(resolved.clone()))?;
        let relative = relative_name(&dir, &resolved);
        let file_row = self
            .store
            .find_or_create_file(dir.id, &relative)
            .await?;
        let snapshot = self
            .store
            .find_snapshot_by_digest(file_row.id, digest)
            .await?
            .ok_or_else(|| BtError::NotFound(format!("snapshot {digest} for {relative}")))?;

        let file_name = resolved
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| relative.clone());
        let output_path = resolved
            .parent()
            .unwrap_or(Path::new("."))
            .join(format!("{file_name}.{digest}"));

        let mut last_err = None;
        let mut restored = false;
        for vault in &self.vaults {
            match vault.get_content(digest, &output_path).await {
                Ok(()) => {
                    restored = true;
                    break;
                }
                Err(e) => {
                    warn!(vault = %vault.describe(), error = %e, "vault failed, trying next");
                    last_err = Some(e);
                }
            }
        }
        if !restored {
            return Err(last_err
                .map(Into::into)
                .unwrap_or_else(|| BtError::NotFound(format!("content {digest}"))));
        }

        apply_metadata(&output_path, &stats_from_snapshot(&snapshot));
        Ok(output_path)
    }
}

/// Canonicalizes `path`'s parent directory and rejoins the file name,
/// since a file targeted by `restore` may currently be absent on disk
/// (the DELETED case) — `resolve_and_validate` would reject that.
fn resolve_possibly_missing(path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(FilesystemManager::resolve_and_validate(path)?);
    }
    let parent = path.parent().unwrap_or(Path::new("."));
    let file_name = path
        .file_name()
        .ok_or_else(|| BtError::NotFound(path.display().to_string()))?;
    let resolved_parent = FilesystemManager::resolve_and_validate(parent)?;
    Ok(resolved_parent.join(file_name))
}

fn relative_name(dir: &directory::Model, path: &Path) -> String {
    path.strip_prefix(&dir.path)
        .unwrap_or(path)
        .to_string_lossy()
        .replace(std::path::MAIN_SEPARATOR, "/")
}

fn stats_from_snapshot(snapshot: &file_snapshot::Model) -> crate::domain::FileStats {
    crate::domain::FileStats {
        size: snapshot.size as u64,
        permissions: snapshot.permissions as u32,
        uid: snapshot.uid as u32,
        gid: snapshot.gid as u32,
        accessed_at: snapshot.accessed_at,
        modified_at: snapshot.modified_at,
        changed_at: snapshot.changed_at,
        birthtime: snapshot.born_at,
    }
}

/// Applies recorded mode/owner/mtimes to a restored file. Failures (not
/// running as the file's owner, permission denied) are logged as warnings
/// per §4.5 — restore already succeeded in the sense that matters, the
/// bytes are correct.
#[cfg(unix)]
fn apply_metadata(path: &Path, stats: &crate::domain::FileStats) {
    use nix::sys::stat::{utimensat, Mode, UtimensatFlags};
    use nix::sys::time::TimeSpec;
    use nix::unistd::{chown, Gid, Uid};

    if let Err(e) = nix::sys::stat::fchmodat(
        None,
        path,
        Mode::from_bits_truncate(stats.permissions),
        nix::sys::stat::FchmodatFlags::FollowSymlink,
    ) {
        warn!(path = %path.display(), error = %e, "could not restore permissions");
    }

    if let Err(e) = chown(path, Some(Uid::from_raw(stats.uid)), Some(Gid::from_raw(stats.gid))) {
        warn!(path = %path.display(), error = %e, "could not restore owner");
    }

    let atime = TimeSpec::new(stats.accessed_at / 1_000_000_000, stats.accessed_at % 1_000_000_000);
    let mtime = TimeSpec::new(stats.modified_at / 1_000_000_000, stats.modified_at % 1_000_000_000);
    if let Err(e) = utimensat(None, path, &atime, &mtime, UtimensatFlags::FollowSymlink) {
        warn!(path = %path.display(), error = %e, "could not restore timestamps");
    }
}

#[cfg(not(unix))]
fn apply_metadata(_path: &Path, _stats: &crate::domain::FileStats) {}
