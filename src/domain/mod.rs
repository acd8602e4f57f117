//! Plain value types shared across components.
//!
//! Nothing in this module touches the database or the filesystem; it is the
//! vocabulary the other layers speak. Grounded on the teacher's split between
//! `domain/` value types and their `infrastructure/database/entities/`
//! counterparts (e.g. `domain/content_identity.rs::ContentKind`).

mod digest;
mod file_stats;
mod status;

pub use digest::Digest;
pub use file_stats::FileStats;
pub use status::FileStatus;
