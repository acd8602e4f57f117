use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

/// A SHA-256 digest, stored as 64 lowercase hex characters.
///
/// This is `Content::id` (§3): the primary key of a `Content` row, not a
/// synthetic identifier. Fixed width permits a `CHAR(64)` schema column.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    /// Hex-decodes and validates `s` as a 64-character SHA-256 digest.
    pub fn parse(s: &str) -> Result<Self, DigestParseError> {
        if s.len() != 64 {
            return Err(DigestParseError::WrongLength(s.len()));
        }
        if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(DigestParseError::NotHex);
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `content/<digest>` / `metadata/<host_id>` vault key for this digest.
    pub fn vault_key(&self) -> String {
        format!("content/{}", self.0)
    }
}

/// Incrementally hashes bytes and produces a [`Digest`] at the end.
///
/// Wraps `sha2::Sha256` so callers (staging, restore verification) never
/// import `sha2` directly.
#[derive(Default)]
pub struct DigestHasher(Sha256);

impl DigestHasher {
    pub fn new() -> Self {
        Self(Sha256::new())
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    pub fn finish(self) -> Digest {
        let out = self.0.finalize();
        Digest(hex::encode(out))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Digest {
    type Err = DigestParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for Digest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DigestParseError {
    #[error("digest must be 64 hex characters, got {0}")]
    WrongLength(usize),
    #[error("digest must be hexadecimal")]
    NotHex,
}
