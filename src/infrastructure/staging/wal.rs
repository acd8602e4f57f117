//! Operation record (de)serialization — the unit written to `queue/`.
//!
//! CBOR via `serde_cbor`, prefixed with a one-byte format version (§4.4).
//! Grounded on `core-new`'s job-system checkpoint encoding, which the
//! teacher also versions ahead of a self-describing payload (see
//! `operations/jobs/mod.rs`'s `JOB_REPORT_VERSION` byte, kept only in the
//! retrieval pack as a reference, not copied here).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Digest, FileStats};

use super::StagingError;

pub const WAL_FORMAT_VERSION: u8 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRecord {
    pub op_uuid: Uuid,
    pub file_id: i32,
    pub directory_id: i32,
    pub relative_name: String,
    pub digest: Digest,
    pub stats: FileStats,
    /// Absolute source path, kept for diagnostics only — never re-read
    /// during commit.
    pub source_path: PathBuf,
}

impl OperationRecord {
    pub fn encode(&self) -> Result<Vec<u8>, StagingError> {
        let mut buf = vec![WAL_FORMAT_VERSION];
        serde_cbor::to_writer(&mut buf, self)
            .map_err(|e| StagingError::Cbor(e.to_string()))?;
        Ok(buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StagingError> {
        let Some((&version, body)) = bytes.split_first() else {
            return Err(StagingError::Corrupt("empty operation record".into()));
        };
        if version != WAL_FORMAT_VERSION {
            return Err(StagingError::Corrupt(format!(
                "unrecognized WAL format version {version}, expected {WAL_FORMAT_VERSION}"
            )));
        }
        serde_cbor::from_slice(body).map_err(|e| StagingError::Cbor(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> OperationRecord {
        OperationRecord {
            op_uuid: Uuid::new_v4(),
            file_id: 7,
            directory_id: 3,
            relative_name: "a/b.txt".into(),
            digest: "98ea6e4f216f2fb4b69fff9b3a44842c38686ca685f3f55dc48c5d3fb1107be4"
                .parse()
                .unwrap(),
            stats: FileStats {
                size: 3,
                permissions: 0o644,
                uid: 1000,
                gid: 1000,
                accessed_at: 1,
                modified_at: 2,
                changed_at: 3,
                birthtime: Some(0),
            },
            source_path: PathBuf::from("/home/me/a/b.txt"),
        }
    }

    #[test]
    fn round_trips_through_encode_decode() {
        let original = sample();
        let encoded = original.encode().unwrap();
        let decoded = OperationRecord::decode(&encoded).unwrap();
        assert_eq!(decoded.op_uuid, original.op_uuid);
        assert_eq!(decoded.digest, original.digest);
        assert_eq!(decoded.relative_name, original.relative_name);
    }

    #[test]
    fn rejects_unknown_format_version() {
        let mut encoded = sample().encode().unwrap();
        encoded[0] = WAL_FORMAT_VERSION + 1;
        let err = OperationRecord::decode(&encoded).unwrap_err();
        assert!(matches!(err, StagingError::Corrupt(_)));
    }

    #[test]
    fn rejects_empty_buffer() {
        let err = OperationRecord::decode(&[]).unwrap_err();
        assert!(matches!(err, StagingError::Corrupt(_)));
    }
}
