//! Validator errors and outcomes

use crate::consensus::{Rejection, RejectionKind};
use crate::storage::{ChainFlavor, StoreError, StoredHeader};
use thiserror::Error;

/// Failure to admit a header
#[derive(Debug, Error)]
pub enum BlockchainError {
    /// The store failed; passed through unchanged
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    /// The header was refused
    #[error("rejected: {0}")]
    Rejected(#[from] Rejection),
}

impl BlockchainError {
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            BlockchainError::Rejected(r) => Some(r),
            BlockchainError::Store(_) => None,
        }
    }

    /// Rejection kind, `None` for store failures
    pub fn kind(&self) -> Option<RejectionKind> {
        self.rejection().map(Rejection::kind)
    }
}

/// Result of a successful `add`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome<C: ChainFlavor> {
    /// Stored and made the chain head
    Added(StoredHeader<C>),
    /// A record with this hash was already stored
    AlreadyKnown,
}

impl<C: ChainFlavor> AddOutcome<C> {
    pub fn is_added(&self) -> bool {
        matches!(self, AddOutcome::Added(_))
    }
}
