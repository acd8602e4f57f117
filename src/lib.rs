//! `bt` — a personal, multi-host backup engine.
//!
//! A directory tree tracked with `bt init`/`bt add` is staged into a
//! write-ahead log, then drained by `bt backup` into one or more
//! content-addressed vaults. Deduplication across files, snapshots and
//! hosts falls out of addressing blob content by its SHA-256 digest.

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod service;

pub use error::{BtError, Result};
