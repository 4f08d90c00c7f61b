//! Chain notifications published to subscribers

use crate::storage::{ChainFlavor, StoredHeader};

/// Published on the validator's broadcast channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent<C: ChainFlavor> {
    /// One block extended the best chain
    NewBestBlock(StoredHeader<C>),
    /// The best chain switched branches.
    ///
    /// `old` are the headers the caller reported as abandoned, `new` the
    /// blocks that were actually added, oldest first.
    Reorganized {
        old: Vec<C::Header>,
        new: Vec<StoredHeader<C>>,
    },
}

impl<C: ChainFlavor> ChainEvent<C> {
    /// Block that is the chain head after this event
    pub fn tip(&self) -> Option<&StoredHeader<C>> {
        match self {
            ChainEvent::NewBestBlock(block) => Some(block),
            ChainEvent::Reorganized { new, .. } => new.last(),
        }
    }
}
