//! Header rejection reasons and context-free header checks

use crate::consensus::NetworkParameters;
use crate::storage::ChainFlavor;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// How a caller should react to a rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    /// The header itself is broken; never retry
    Malformed,
    /// The parent is not known yet; buffer and retry once it arrives
    MissingParent,
    /// The header contradicts the stored chain
    Invalid,
    /// The stored chain is too far behind; reset and re-download
    ResetRequired,
}

/// Reasons a header is not admitted
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("malformed header: {0}")]
    Malformed(String),
    #[error("block {hash} does not satisfy its proof of work")]
    InsufficientProofOfWork { hash: String },
    #[error("block timestamp {timestamp} is too far in the future (now {now})")]
    TimestampInFuture { timestamp: u32, now: u64 },
    #[error("block does not fit: previous block {previous} not found")]
    DoesNotConnect { previous: String },
    #[error("block height {found} does not follow its parent (expected {expected})")]
    HeightMismatch { expected: u32, found: u32 },
    #[error("{which} keystone not found: expected {expected}, block declares {declared}")]
    KeystoneNotFound {
        which: &'static str,
        expected: String,
        declared: String,
    },
    #[error("block timestamp {timestamp} is not after median time past {median}")]
    TimestampTooOld { timestamp: u32, median: u32 },
    #[error("bad difficulty bits {found:#010x}, expected {expected:#010x}")]
    BadDifficulty { expected: u32, found: u32 },
    #[error("block at height {height} is more than {limit} blocks ahead of head {head}")]
    TooFarAhead { head: u32, height: u32, limit: u32 },
}

impl Rejection {
    /// Classify the rejection for retry decisions
    pub fn kind(&self) -> RejectionKind {
        match self {
            Rejection::Malformed(_)
            | Rejection::InsufficientProofOfWork { .. }
            | Rejection::TimestampInFuture { .. } => RejectionKind::Malformed,
            Rejection::DoesNotConnect { .. } => RejectionKind::MissingParent,
            Rejection::TooFarAhead { .. } => RejectionKind::ResetRequired,
            Rejection::HeightMismatch { .. }
            | Rejection::KeystoneNotFound { .. }
            | Rejection::TimestampTooOld { .. }
            | Rejection::BadDifficulty { .. } => RejectionKind::Invalid,
        }
    }
}

/// Current Unix time in seconds
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Context-free checks: proof of work, decodable bits, bounded timestamp
pub fn check_header<C: ChainFlavor>(
    header: &C::Header,
    params: &NetworkParameters,
    now: u64,
) -> Result<(), Rejection> {
    C::check_proof_of_work(header, params)?;

    let timestamp = C::timestamp(header);
    if timestamp as u64 > now.saturating_add(params.max_future_block_time) {
        return Err(Rejection::TimestampInFuture { timestamp, now });
    }

    Ok(())
}

/// Median of a window of timestamps (upper median for even counts)
pub fn median_timestamp(timestamps: &[u32]) -> Option<u32> {
    if timestamps.is_empty() {
        return None;
    }
    let mut sorted = timestamps.to_vec();
    sorted.sort_unstable();
    Some(sorted[sorted.len() / 2])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_timestamp() {
        assert_eq!(median_timestamp(&[]), None);
        assert_eq!(median_timestamp(&[5]), Some(5));
        assert_eq!(median_timestamp(&[3, 1, 2]), Some(2));
        assert_eq!(median_timestamp(&[4, 1, 3, 2]), Some(3));
    }

    #[test]
    fn test_rejection_kinds() {
        assert_eq!(
            Rejection::DoesNotConnect { previous: "00".into() }.kind(),
            RejectionKind::MissingParent
        );
        assert_eq!(
            Rejection::Malformed("short".into()).kind(),
            RejectionKind::Malformed
        );
        assert_eq!(
            Rejection::BadDifficulty { expected: 1, found: 2 }.kind(),
            RejectionKind::Invalid
        );
        assert_eq!(
            Rejection::TooFarAhead { head: 1, height: 900, limit: 500 }.kind(),
            RejectionKind::ResetRequired
        );
    }
}
