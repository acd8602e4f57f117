use serde::{Deserialize, Serialize};

/// Per-file status reported by `bt status` (§4.5), in descending precedence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStatus {
    /// Matches the directory's ignore rules.
    Ignored,
    /// A `File` row exists and on-disk stats differ from `current_snapshot`.
    Modified,
    /// Has a pending WAL entry.
    Staged,
    /// No `File` row, or one with a null `current_snapshot_id`.
    Untracked,
    /// Snapshotted and unchanged on disk.
    BackedUp,
    /// `File` row exists but the on-disk path is gone. Reported only on
    /// request (`--deleted`), never ranked against the others above.
    Deleted,
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FileStatus::Ignored => "IGNORED",
            FileStatus::Modified => "MODIFIED",
            FileStatus::Staged => "STAGED",
            FileStatus::Untracked => "UNTRACKED",
            FileStatus::BackedUp => "BACKED_UP",
            FileStatus::Deleted => "DELETED",
        };
        f.write_str(s)
    }
}
