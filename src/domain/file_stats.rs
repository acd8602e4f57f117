use serde::{Deserialize, Serialize};

/// A filesystem `stat(2)` snapshot, timestamps stored as nanoseconds since
/// the Unix epoch, UTC (§9 "Timestamps").
///
/// `birthtime` is `None` on platforms that do not report a creation time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStats {
    pub size: u64,
    pub permissions: u32,
    pub uid: u32,
    pub gid: u32,
    pub accessed_at: i64,
    pub modified_at: i64,
    pub changed_at: i64,
    pub birthtime: Option<i64>,
}

impl FileStats {
    /// Staging's mid-copy mutation check (§4.4 step 4): every field except
    /// `atime` must be equal.
    pub fn eq_ignoring_atime(&self, other: &FileStats) -> bool {
        self.size == other.size
            && self.permissions == other.permissions
            && self.uid == other.uid
            && self.gid == other.gid
            && self.changed_at == other.changed_at
            && self.modified_at == other.modified_at
            && self.birthtime == other.birthtime
    }

    /// Status's "changed since last snapshot" check (§4.5 MODIFIED):
    /// size, mtime, ctime.
    pub fn differs_for_status(&self, other: &FileStats) -> bool {
        self.size != other.size || self.modified_at != other.modified_at || self.changed_at != other.changed_at
    }
}
