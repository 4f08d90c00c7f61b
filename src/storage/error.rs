//! Storage error types

use crate::crypto::HashError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Record (de)serialization errors. Always a corruption condition.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("record truncated: need {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },
    #[error("header length {found}, expected {expected}")]
    HeaderLength { expected: usize, found: usize },
    #[error("cumulative work does not fit in {width} bytes")]
    WorkOverflow { width: usize },
    #[error("invalid hash: {0}")]
    Hash(#[from] HashError),
}

/// Ring file store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("store file {path} has size {actual}, expected {expected}")]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("store file {path} has magic {found:?}, expected {expected:?}")]
    BadMagic {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("store file {path} is already locked by another process")]
    AlreadyLocked { path: PathBuf },

    #[error("corrupted store: {0}")]
    Corrupted(String),

    #[error("chain head {hash} recorded in prologue has no stored record")]
    HeadMissing { hash: String },

    #[error("record codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("access at offset {offset} (+{len}) outside mapped region of {size} bytes")]
    OutOfBounds {
        offset: usize,
        len: usize,
        size: usize,
    },

    #[error("ring capacity must be at least one record")]
    ZeroCapacity,

    #[error("store is closed")]
    Closed,
}

impl StoreError {
    /// True for errors that mean the on-disk invariants no longer hold
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            StoreError::Corrupted(_) | StoreError::HeadMissing { .. } | StoreError::Codec(_)
        )
    }
}
