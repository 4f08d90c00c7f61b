//! Header-chain storage engine and chain validator
//!
//! Persists block headers for two proof-of-work chains in fixed-capacity,
//! memory-mapped ring files and decides which incoming headers extend the
//! best chain.
//!
//! - `BtcChain`: full-hash chain, 32-byte double-SHA256 identifiers.
//! - `VbkChain`: partial-hash chain, 24-byte identifiers referenced through
//!   truncated previous-block and keystone hashes.

pub mod blockchain;
pub mod config;
pub mod consensus;
pub mod crypto;
pub mod storage;

/// File format constants - HARD-CODED, NEVER CONFIGURABLE
pub mod constants {
    /// Bytes reserved at the start of every ring file
    pub const PROLOGUE_SIZE: usize = 1024;

    /// Offset of the ASCII magic tag
    pub const MAGIC_OFFSET: usize = 0;

    /// Offset of the ring cursor (u32, big-endian)
    pub const CURSOR_OFFSET: usize = 4;

    /// Offset of the chain head hash
    pub const HEAD_HASH_OFFSET: usize = 8;

    /// Offset of the archive series number (u32, big-endian)
    pub const SERIES_OFFSET: usize = 40;

    /// Width of the cumulative work field in a stored record
    pub const WORK_SIZE: usize = 12;

    /// Default number of records in a ring file
    pub const DEFAULT_CAPACITY: usize = 5000;

    /// Default bound of the negative-result cache
    pub const DEFAULT_NEGATIVE_CACHE_SIZE: usize = 100;

    /// Blocks between two keystones on the partial-hash chain
    pub const KEYSTONE_INTERVAL: u32 = 20;

    /// Number of ancestors whose timestamps form the median-time-past
    pub const MEDIAN_TIME_SPAN: usize = 20;

    /// Beyond this many blocks ahead of the stored head, reconcile by reset
    pub const MAX_REORG_DISTANCE: u32 = 500;
}
