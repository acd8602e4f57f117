//! Filesystem Manager (§4.3) — path resolution, directory walking, stat
//! collection, and checksum computation.
//!
//! The walk is grounded on the BFS-over-a-directory-queue shape of
//! `core-new/src/operations/indexing/phases/discovery.rs::run_discovery_phase`
//! (`dirs_to_walk` queue, symlinks never followed). `digest_of` deliberately
//! DEVIATES from `domain/content_identity.rs::ContentHashGenerator`'s
//! large-file sampling: it always streams the full file through a buffered
//! hasher, since this spec's dedup/round-trip invariants require exact
//! digests, not samples.

use std::collections::VecDeque;
use std::io::Read;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use crate::domain::{Digest, DigestHasher, FileStats};
use crate::infrastructure::ignore::IgnoreRuler;

const STREAM_BUF: usize = 8 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum FsManagerError {
    #[error("path does not exist: {0}")]
    NotFound(PathBuf),
    #[error("not a regular file: {0}")]
    NotRegularFile(PathBuf),
    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct FilesystemManager;

impl FilesystemManager {
    /// Canonicalizes `p` to an absolute path. Rejects a non-existent target;
    /// callers that need "must be a regular file" check that separately
    /// (directories are valid resolve targets, e.g. for `track`/`stage`).
    pub fn resolve_and_validate(p: &Path) -> Result<PathBuf, FsManagerError> {
        p.canonicalize().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FsManagerError::NotFound(p.to_path_buf())
            } else {
                FsManagerError::Io(e)
            }
        })
    }

    /// Requires read+execute permission on a directory, the precondition
    /// `add_directory` imposes before tracking it (§4.5).
    #[cfg(unix)]
    pub fn require_read_execute(p: &Path) -> Result<(), FsManagerError> {
        use nix::unistd::{access, AccessFlags};
        access(p, AccessFlags::R_OK | AccessFlags::X_OK)
            .map_err(|_| FsManagerError::PermissionDenied(p.to_path_buf()))
    }

    #[cfg(not(unix))]
    pub fn require_read_execute(_p: &Path) -> Result<(), FsManagerError> {
        Ok(())
    }

    /// Starts a restartable, lazy walk of regular files under `root`,
    /// skipping entries the ignore rules reject. Symlinks are never
    /// followed.
    pub fn walk(root: PathBuf, ignore: IgnoreRuler) -> Walker {
        Walker {
            dir_queue: VecDeque::from([root.clone()]),
            pending_files: VecDeque::new(),
            root,
            ignore,
        }
    }

    /// Collects `stat(2)`-equivalent metadata for `path`.
    pub async fn stat(path: &Path) -> Result<FileStats, FsManagerError> {
        let meta = fs::metadata(path).await?;
        Ok(stats_from_metadata(&meta))
    }

    /// Streams `path` through SHA-256 in `STREAM_BUF`-sized chunks on a
    /// blocking thread, never loading the whole file into memory.
    pub async fn digest_of(path: &Path) -> Result<Digest, FsManagerError> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<Digest, FsManagerError> {
            let mut file = std::fs::File::open(&path)?;
            let mut hasher = DigestHasher::new();
            let mut buf = vec![0u8; STREAM_BUF];
            loop {
                let n = file.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            Ok(hasher.finish())
        })
        .await
        .map_err(|e| FsManagerError::Io(std::io::Error::other(e)))?
    }

    /// Content-only copy into the staging area; preserves no metadata.
    pub async fn copy_to_staging(src: &Path, dst: &Path) -> Result<(), FsManagerError> {
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(src, dst).await?;
        Ok(())
    }
}

#[cfg(unix)]
fn stats_from_metadata(meta: &std::fs::Metadata) -> FileStats {
    use std::os::unix::fs::MetadataExt;
    let birthtime = meta
        .created()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as i64);
    FileStats {
        size: meta.size(),
        permissions: meta.mode(),
        uid: meta.uid(),
        gid: meta.gid(),
        accessed_at: meta.atime() * 1_000_000_000 + meta.atime_nsec(),
        modified_at: meta.mtime() * 1_000_000_000 + meta.mtime_nsec(),
        changed_at: meta.ctime() * 1_000_000_000 + meta.ctime_nsec(),
        birthtime,
    }
}

#[cfg(not(unix))]
fn stats_from_metadata(meta: &std::fs::Metadata) -> FileStats {
    let to_ns = |t: std::io::Result<std::time::SystemTime>| {
        t.ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0)
    };
    FileStats {
        size: meta.len(),
        permissions: if meta.permissions().readonly() { 0o444 } else { 0o644 },
        uid: 0,
        gid: 0,
        accessed_at: to_ns(meta.accessed()),
        modified_at: to_ns(meta.modified()),
        changed_at: to_ns(meta.modified()),
        birthtime: meta.created().ok().and_then(|t| {
            t.duration_since(std::time::UNIX_EPOCH)
                .ok()
                .map(|d| d.as_nanos() as i64)
        }),
    }
}

/// Lazy, pull-based walk over regular files beneath a root. Each call to
/// `next` advances at most one directory read; constructing a fresh
/// `Walker` over the same root re-walks it from scratch (restartable, §4.3).
pub struct Walker {
    dir_queue: VecDeque<PathBuf>,
    pending_files: VecDeque<PathBuf>,
    root: PathBuf,
    ignore: IgnoreRuler,
}

impl Walker {
    pub async fn next(&mut self) -> Result<Option<PathBuf>, FsManagerError> {
        loop {
            if let Some(f) = self.pending_files.pop_front() {
                return Ok(Some(f));
            }
            let Some(dir) = self.dir_queue.pop_front() else {
                return Ok(None);
            };
            let mut rd = match fs::read_dir(&dir).await {
                Ok(rd) => rd,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = rd.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_symlink() {
                    debug!(path = %path.display(), "not following symlink");
                    continue;
                }
                let is_dir = file_type.is_dir();
                if self.ignore.is_ignored(&self.root, &path, is_dir) {
                    continue;
                }
                if is_dir {
                    self.dir_queue.push_back(path);
                } else if file_type.is_file() {
                    self.pending_files.push_back(path);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ignore::IgnoreRuler;

    #[tokio::test]
    async fn walk_finds_nested_regular_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::write(dir.path().join("sub/b.txt"), b"b").unwrap();

        let ruler = IgnoreRuler::new(Vec::new());
        let mut walker = FilesystemManager::walk(dir.path().to_path_buf(), ruler);
        let mut found = Vec::new();
        while let Some(p) = walker.next().await.unwrap() {
            found.push(p);
        }
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn digest_matches_known_sha256() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hi.txt");
        std::fs::write(&path, b"hi\n").unwrap();
        let digest = FilesystemManager::digest_of(&path).await.unwrap();
        assert_eq!(
            digest.as_str(),
            "98ea6e4f216f2fb4b69fff9b3a44842c38686ca685f3f55dc48c5d3fb1107be4"
        );
    }
}
