//! Staging Area (Write-Ahead Log), §4.4 — the crash-recovery nucleus.
//!
//! On-disk layout and protocol grounded on the teacher's own job-system
//! checkpointing idiom (`operations/jobs/`'s persisted, resumable step
//! queue) generalized to this spec's three-sided commit (vault upload, DB
//! transaction, local cleanup), which the teacher's job system does not
//! itself need since it has no remote-storage leg.

mod lock;
mod wal;

pub use lock::ProcessLock;
pub use wal::{OperationRecord, WAL_FORMAT_VERSION};

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{Digest, DigestHasher, FileStats};

const STREAM_BUF: usize = 8 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("file mutated while staging {path}")]
    FileMutatedDuringStage { path: PathBuf },
    #[error("corrupt staging state: {0}")]
    Corrupt(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed operation record: {0}")]
    Cbor(String),
    #[error("another bt process already holds the staging lock")]
    AlreadyRunning,
}

/// A queue entry as seen from disk: its monotonic sequence number and the
/// decoded record.
pub struct QueuedOp {
    pub seq: u64,
    pub op_uuid: Uuid,
    pub record: OperationRecord,
}

/// Crash-safe persistent queue of pending backup operations (§4.4).
///
/// Owns `<staging_root>/staging/` (copied blobs) and `<staging_root>/queue/`
/// (operation records). There is exactly one `StagingArea` per process,
/// guarded by `ProcessLock`; no internal locking is needed beyond that.
pub struct StagingArea {
    root: PathBuf,
    next_seq: u64,
}

impl StagingArea {
    /// Opens (creating if absent) the staging directories under `root` and
    /// seeds the monotonic sequence counter from the highest existing
    /// `queue/` entry.
    pub async fn open(root: PathBuf) -> Result<Self, StagingError> {
        fs::create_dir_all(root.join("staging")).await?;
        fs::create_dir_all(root.join("queue")).await?;

        let mut next_seq = 0u64;
        let mut rd = fs::read_dir(root.join("queue")).await?;
        while let Some(entry) = rd.next_entry().await? {
            if let Some(seq) = seq_from_filename(&entry.file_name()) {
                next_seq = next_seq.max(seq + 1);
            }
        }

        Ok(Self { root, next_seq })
    }

    fn staging_dir(&self) -> PathBuf {
        self.root.join("staging")
    }

    fn queue_dir(&self) -> PathBuf {
        self.root.join("queue")
    }

    fn blob_path(&self, op_uuid: Uuid) -> PathBuf {
        self.staging_dir().join(format!("{op_uuid}.blob"))
    }

    fn queue_entry_path(&self, seq: u64, op_uuid: Uuid) -> PathBuf {
        self.queue_dir().join(format!("{seq:020}-{op_uuid}.op"))
    }

    /// Enqueue protocol (§4.4): stat, copy-and-hash, re-stat, compare (all
    /// but `atime`), then durably append the operation record.
    pub async fn stage_for_backup(
        &mut self,
        source: &Path,
        file_id: i32,
        directory_id: i32,
        relative_name: &str,
    ) -> Result<Uuid, StagingError> {
        let stat1 = stat(source).await?;

        let op_uuid = Uuid::new_v4();
        let blob_path = self.blob_path(op_uuid);
        let digest = copy_with_hash(source, &blob_path).await?;

        let stat2 = stat(source).await?;
        if !stat1.eq_ignoring_atime(&stat2) {
            let _ = fs::remove_file(&blob_path).await;
            return Err(StagingError::FileMutatedDuringStage {
                path: source.to_path_buf(),
            });
        }

        let record = OperationRecord {
            op_uuid,
            file_id,
            directory_id,
            relative_name: relative_name.to_string(),
            digest,
            stats: stat2,
            source_path: source.to_path_buf(),
        };

        let seq = self.next_seq;
        self.next_seq += 1;

        let tmp = self.queue_dir().join(format!(".tmp-{}", Uuid::new_v4().simple()));
        fs::write(&tmp, record.encode()?).await?;
        fs::rename(&tmp, self.queue_entry_path(seq, op_uuid)).await?;

        debug!(seq, %op_uuid, path = %source.display(), "staged file for backup");
        Ok(op_uuid)
    }

    /// Lists queued operations in ascending `seq` order.
    pub async fn list_queue(&self) -> Result<Vec<QueuedOp>, StagingError> {
        let mut out = Vec::new();
        let mut rd = fs::read_dir(self.queue_dir()).await?;
        while let Some(entry) = rd.next_entry().await? {
            let name = entry.file_name();
            let Some(seq) = seq_from_filename(&name) else {
                continue;
            };
            let Some(op_uuid) = uuid_from_filename(&name) else {
                continue;
            };
            let bytes = fs::read(entry.path()).await?;
            let record = OperationRecord::decode(&bytes)?;
            out.push(QueuedOp {
                seq,
                op_uuid,
                record,
            });
        }
        out.sort_by_key(|q| q.seq);
        Ok(out)
    }

    /// The head of the queue (lowest `seq`), if any.
    pub async fn peek_head(&self) -> Result<Option<QueuedOp>, StagingError> {
        Ok(self.list_queue().await?.into_iter().next())
    }

    /// `is_staged(file)` (§4.4): O(queue length) scan for any op referring
    /// to `file_id`.
    pub async fn is_staged(&self, file_id: i32) -> Result<bool, StagingError> {
        Ok(self
            .list_queue()
            .await?
            .iter()
            .any(|q| q.record.file_id == file_id))
    }

    pub fn blob_path_for(&self, op_uuid: Uuid) -> PathBuf {
        self.blob_path(op_uuid)
    }

    /// Cleanup step of the commit protocol (§4.4 step 4): remove the queue
    /// entry then the blob. Order matters — removing the queue entry first
    /// means a crash between the two leaves only an orphan blob, never a
    /// dangling queue entry pointing at a missing one.
    pub async fn retire(&self, seq: u64, op_uuid: Uuid) -> Result<(), StagingError> {
        let queue_path = self.queue_entry_path(seq, op_uuid);
        if queue_path.exists() {
            fs::remove_file(&queue_path).await?;
        }
        let blob_path = self.blob_path(op_uuid);
        if blob_path.exists() {
            fs::remove_file(&blob_path).await?;
        }
        Ok(())
    }

    /// True once both `queue/` and `staging/` are empty (§8 testable
    /// property 4, "WAL drains cleanly").
    pub async fn is_drained(&self) -> Result<bool, StagingError> {
        let mut queue = fs::read_dir(self.queue_dir()).await?;
        if queue.next_entry().await?.is_some() {
            return Ok(false);
        }
        let mut staging = fs::read_dir(self.staging_dir()).await?;
        Ok(staging.next_entry().await?.is_none())
    }
}

async fn stat(path: &Path) -> Result<FileStats, StagingError> {
    crate::infrastructure::fs_manager::FilesystemManager::stat(path)
        .await
        .map_err(|e| StagingError::Io(std::io::Error::other(e.to_string())))
}

async fn copy_with_hash(src: &Path, dst: &Path) -> Result<Digest, StagingError> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }
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
    writer.sync_all().await?;
    Ok(hasher.finish())
}

fn seq_from_filename(name: &std::ffi::OsStr) -> Option<u64> {
    let name = name.to_str()?;
    if name.starts_with('.') {
        return None;
    }
    let (seq_part, _) = name.split_once('-')?;
    seq_part.parse().ok()
}

fn uuid_from_filename(name: &std::ffi::OsStr) -> Option<Uuid> {
    let name = name.to_str()?;
    let stem = name.strip_suffix(".op")?;
    let (_, uuid_part) = stem.split_once('-')?;
    Uuid::parse_str(uuid_part).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stage_then_retire_drains_the_queue() {
        let tmp = tempfile::tempdir().unwrap();
        let source_dir = tmp.path().join("source");
        std::fs::create_dir_all(&source_dir).unwrap();
        let source_file = source_dir.join("a.txt");
        std::fs::write(&source_file, b"hello\n").unwrap();

        let staging_root = tmp.path().join("staging_root");
        let mut area = StagingArea::open(staging_root).await.unwrap();
        assert!(area.is_drained().await.unwrap());

        let op_uuid = area
            .stage_for_backup(&source_file, 1, 1, "a.txt")
            .await
            .unwrap();
        assert!(!area.is_drained().await.unwrap());
        assert!(area.is_staged(1).await.unwrap());

        let head = area.peek_head().await.unwrap().unwrap();
        assert_eq!(head.op_uuid, op_uuid);
        assert_eq!(head.seq, 0);

        area.retire(head.seq, head.op_uuid).await.unwrap();
        assert!(area.is_drained().await.unwrap());
        assert!(!area.is_staged(1).await.unwrap());
    }

    #[tokio::test]
    async fn mutation_between_stats_aborts_without_a_queue_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let source_file = tmp.path().join("a.txt");
        std::fs::write(&source_file, b"hello\n").unwrap();

        // Make the file huge enough that a concurrent truncate during the
        // copy is reliably observed by the second stat; instead, simulate
        // mutation directly by changing permissions after staging begins
        // is awkward in a unit test, so here we assert the happy path
        // produces a stat-equal record and leave the interleaved-mutation
        // case to the crash/mutation integration test.
        let staging_root = tmp.path().join("staging_root");
        let mut area = StagingArea::open(staging_root).await.unwrap();
        let op_uuid = area
            .stage_for_backup(&source_file, 1, 1, "a.txt")
            .await
            .unwrap();
        let queued = area.list_queue().await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].op_uuid, op_uuid);
    }

    #[tokio::test]
    async fn reopening_seeds_seq_counter_from_existing_queue() {
        let tmp = tempfile::tempdir().unwrap();
        let source_file = tmp.path().join("a.txt");
        std::fs::write(&source_file, b"hello\n").unwrap();
        let staging_root = tmp.path().join("staging_root");

        {
            let mut area = StagingArea::open(staging_root.clone()).await.unwrap();
            area.stage_for_backup(&source_file, 1, 1, "a.txt")
                .await
                .unwrap();
        }

        let mut reopened = StagingArea::open(staging_root).await.unwrap();
        let op_uuid = reopened
            .stage_for_backup(&source_file, 2, 1, "b.txt")
            .await
            .unwrap();
        let queued = reopened.list_queue().await.unwrap();
        assert_eq!(queued.len(), 2);
        assert_eq!(queued.iter().find(|q| q.op_uuid == op_uuid).unwrap().seq, 1);
    }
}
