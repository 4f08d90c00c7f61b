//! Header admission against a ring store
//!
//! `add` runs the context-free checks, then checks the header against the
//! stored chain: connectivity, height, keystones, duplicates, median time
//! past and difficulty. Checks that need more history than the store holds
//! are skipped rather than failed.

use crate::blockchain::{AddOutcome, BlockchainError, ChainEvent};
use crate::consensus::{
    check_header, median_timestamp, unix_now, AveragingWindow, BitcoinRetarget,
    DifficultyCalculator, NetworkParameters, Rejection,
};
use crate::crypto::ChainHash;
use crate::storage::{BtcChain, ChainFlavor, RingFileStore, StoredHeader, VbkChain};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

/// Buffered events per subscriber before the slowest one starts lagging
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Distance back to the previous keystone for a block at `height`.
///
/// A block directly after a keystone already references it as its previous
/// block, so its previous keystone is the one before.
pub fn keystone_distance(height: u32, interval: u32) -> u32 {
    match height % interval {
        0 => interval,
        1 => interval + 1,
        d => d,
    }
}

/// Chain validator over one ring store
pub struct Blockchain<C: ChainFlavor> {
    store: Arc<RingFileStore<C>>,
    params: NetworkParameters,
    calculator: Box<dyn DifficultyCalculator<C>>,
    events: broadcast::Sender<ChainEvent<C>>,
}

impl Blockchain<BtcChain> {
    /// Full-hash chain validator with periodic retargeting
    pub fn bitcoin(store: Arc<RingFileStore<BtcChain>>, params: NetworkParameters) -> Self {
        let calculator = Box::new(BitcoinRetarget::new(&params));
        Self::new(store, params, calculator)
    }
}

impl Blockchain<VbkChain> {
    /// Partial-hash chain validator with a moving difficulty window
    pub fn veriblock(store: Arc<RingFileStore<VbkChain>>, params: NetworkParameters) -> Self {
        let calculator = Box::new(AveragingWindow::new(&params));
        Self::new(store, params, calculator)
    }
}

impl<C: ChainFlavor> Blockchain<C> {
    pub fn new(
        store: Arc<RingFileStore<C>>,
        params: NetworkParameters,
        calculator: Box<dyn DifficultyCalculator<C>>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            params,
            calculator,
            events,
        }
    }

    pub fn store(&self) -> &Arc<RingFileStore<C>> {
        &self.store
    }

    pub fn params(&self) -> &NetworkParameters {
        &self.params
    }

    /// Receive best-block and reorganization events
    pub fn subscribe(&self) -> broadcast::Receiver<ChainEvent<C>> {
        self.events.subscribe()
    }

    pub fn get(&self, hash: &C::Hash) -> Result<Option<StoredHeader<C>>, BlockchainError> {
        Ok(self.store.get(hash)?)
    }

    pub fn get_chain_head(&self) -> Result<Option<StoredHeader<C>>, BlockchainError> {
        Ok(self.store.get_chain_head()?)
    }

    /// Whether `hash` lies on the chain ending at the current head
    pub fn is_on_best_chain(&self, hash: &C::Hash) -> Result<bool, BlockchainError> {
        Ok(self.store.scan_best_chain(hash)?.is_some())
    }

    /// Drop all stored headers
    pub fn reset(&self) -> Result<(), BlockchainError> {
        warn!(chain = C::NAME, "resetting stored chain");
        self.store.reset()?;
        Ok(())
    }

    /// Admit `header` as the new chain head.
    ///
    /// The whole admission holds the store lock, so concurrent callers
    /// adding the same header store it once.
    ///
    /// # Errors
    ///
    /// `BlockchainError::Rejected` when any check fails, with a
    /// [`RejectionKind`](crate::consensus::RejectionKind) telling the caller
    /// whether to retry. Store failures pass through as
    /// `BlockchainError::Store`.
    pub fn add(&self, header: C::Header) -> Result<AddOutcome<C>, BlockchainError> {
        self.store.exclusive(|| self.admit(header))
    }

    fn admit(&self, header: C::Header) -> Result<AddOutcome<C>, BlockchainError> {
        check_header::<C>(&header, &self.params, unix_now())?;
        let hash = C::hash_header(&header);

        if self.store.get_chain_head()?.is_none() {
            let height = C::header_height(&header).unwrap_or(0);
            let work = C::work(&header);
            let record = StoredHeader::new(header, height, work);
            self.store.put(&record)?;
            self.store.set_chain_head(record.clone())?;
            info!(chain = C::NAME, %hash, height, "first block stored");
            return Ok(AddOutcome::Added(record));
        }

        let previous_hash = C::previous_block(&header);
        let previous = self
            .store
            .get(&previous_hash)?
            .ok_or_else(|| Rejection::DoesNotConnect {
                previous: previous_hash.to_string(),
            })?;

        let height = previous.height.checked_add(1).ok_or_else(|| {
            Rejection::Malformed(format!("height overflow after parent at {}", previous.height))
        })?;
        if let Some(declared) = C::header_height(&header) {
            if declared != height {
                return Err(Rejection::HeightMismatch {
                    expected: height,
                    found: declared,
                }
                .into());
            }
        }

        let ancestors = self.store.get_ancestors(&previous.hash, self.context_depth(height))?;
        trace!(chain = C::NAME, height, available = ancestors.len(), "loaded ancestors");

        self.check_keystones(&header, height, &ancestors)?;

        if self.store.get(&hash)?.is_some() {
            debug!(chain = C::NAME, %hash, "block already known");
            return Ok(AddOutcome::AlreadyKnown);
        }

        self.check_median_time(&header, &ancestors)?;
        self.check_difficulty(&header, height, &ancestors)?;

        let work = previous.work.saturating_add(C::work(&header));
        let record = StoredHeader::new(header, height, work);
        self.store.put(&record)?;
        self.store.set_chain_head(record.clone())?;
        debug!(chain = C::NAME, %hash, height, "block added");
        Ok(AddOutcome::Added(record))
    }

    /// Configured keystone spacing, for flavors that carry keystones
    fn keystone_interval(&self) -> Option<u32> {
        C::KEYSTONE_INTERVAL
            .map(|_| self.params.keystone_interval)
            .filter(|interval| *interval > 0)
    }

    /// Ancestors needed, counting the previous block, for every contextual
    /// check at `height`
    fn context_depth(&self, height: u32) -> usize {
        let keystones = match self.keystone_interval() {
            Some(interval) => (keystone_distance(height, interval) + interval) as usize,
            None => 0,
        };
        keystones
            .max(self.params.median_time_span)
            .max(self.calculator.window())
    }

    /// Declared keystones must be the ancestors at the keystone distances
    fn check_keystones(
        &self,
        header: &C::Header,
        height: u32,
        ancestors: &[StoredHeader<C>],
    ) -> Result<(), Rejection> {
        let (interval, (previous, second)) = match (self.keystone_interval(), C::keystones(header)) {
            (Some(interval), Some(declared)) => (interval, declared),
            _ => return Ok(()),
        };
        let distance = keystone_distance(height, interval) as usize;

        for (which, declared, index) in [
            ("previous", &previous, distance - 1),
            ("second previous", &second, distance - 1 + interval as usize),
        ] {
            let ancestor = match ancestors.get(index) {
                Some(ancestor) => ancestor,
                None => {
                    trace!(chain = C::NAME, height, which, "keystone beyond stored history");
                    continue;
                }
            };
            let expected = C::keystone_reference(&ancestor.hash);
            if !declared.matches(&expected) {
                return Err(Rejection::KeystoneNotFound {
                    which,
                    expected: expected.to_string(),
                    declared: declared.to_string(),
                });
            }
        }
        Ok(())
    }

    fn check_median_time(
        &self,
        header: &C::Header,
        ancestors: &[StoredHeader<C>],
    ) -> Result<(), Rejection> {
        let span = self.params.median_time_span;
        if span == 0 || ancestors.len() < span {
            return Ok(());
        }
        let timestamps: Vec<u32> = ancestors[..span]
            .iter()
            .map(|a| C::timestamp(&a.header))
            .collect();
        let timestamp = C::timestamp(header);
        match median_timestamp(&timestamps) {
            Some(median) if timestamp <= median => {
                Err(Rejection::TimestampTooOld { timestamp, median })
            }
            _ => Ok(()),
        }
    }

    fn check_difficulty(
        &self,
        header: &C::Header,
        height: u32,
        ancestors: &[StoredHeader<C>],
    ) -> Result<(), Rejection> {
        let window = self.calculator.window();
        if window == 0 || ancestors.len() < window {
            return Ok(());
        }
        let expected = self.calculator.expected_bits(height, &ancestors[..window]);
        let found = C::bits(header);
        if found != expected {
            return Err(Rejection::BadDifficulty { expected, found });
        }
        Ok(())
    }

    /// Apply a new best chain reported by the network layer.
    ///
    /// A non-empty `old` makes this a reorganization, announced once with
    /// the blocks that were added. Otherwise every added block is announced
    /// on its own. Processing stops at the first failing block; blocks added
    /// before it stay.
    pub fn handle_new_best_chain(
        &self,
        old: Vec<C::Header>,
        new: Vec<C::Header>,
    ) -> Result<Vec<StoredHeader<C>>, BlockchainError> {
        self.store.exclusive(|| self.apply_best_chain(old, new))
    }

    /// Height `header` would get: its own, or one past its stored parent
    fn incoming_height(&self, header: &C::Header) -> Result<Option<u32>, BlockchainError> {
        if let Some(height) = C::header_height(header) {
            return Ok(Some(height));
        }
        let parent = self.store.get(&C::previous_block(header))?;
        Ok(parent.and_then(|parent| parent.height.checked_add(1)))
    }

    fn apply_best_chain(
        &self,
        old: Vec<C::Header>,
        new: Vec<C::Header>,
    ) -> Result<Vec<StoredHeader<C>>, BlockchainError> {
        let first_height = match new.first() {
            Some(first) => self.incoming_height(first)?,
            None => None,
        };
        if let Some(first_height) = first_height {
            if let Some(head) = self.store.get_chain_head()? {
                let limit = self.params.max_reorg_distance;
                if first_height > head.height.saturating_add(limit) {
                    warn!(chain = C::NAME, head = head.height, height = first_height, "new chain too far ahead");
                    return Err(Rejection::TooFarAhead {
                        head: head.height,
                        height: first_height,
                        limit,
                    }
                    .into());
                }
            }
        }

        let reorg = !old.is_empty();
        if reorg {
            warn!(chain = C::NAME, abandoned = old.len(), incoming = new.len(), "chain reorganization");
        }

        let mut added = Vec::with_capacity(new.len());
        let mut failure = None;
        for header in new {
            match self.add(header) {
                Ok(AddOutcome::Added(record)) => {
                    if !reorg {
                        info!(chain = C::NAME, hash = %record.hash, height = record.height, "new best block");
                        self.publish(ChainEvent::NewBestBlock(record.clone()));
                    }
                    added.push(record);
                }
                Ok(AddOutcome::AlreadyKnown) => {}
                Err(e) => {
                    warn!(chain = C::NAME, error = %e, "stopped applying new best chain");
                    failure = Some(e);
                    break;
                }
            }
        }

        if reorg {
            if let Some(tip) = added.last() {
                info!(chain = C::NAME, hash = %tip.hash, height = tip.height, "reorganized to new tip");
            }
            self.publish(ChainEvent::Reorganized {
                old,
                new: added.clone(),
            });
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(added),
        }
    }

    /// Seed an empty store with a connected run of headers, skipping the
    /// contextual checks.
    ///
    /// Returns `false` when the store already has a chain head or there is
    /// nothing to store.
    pub fn bootstrap(
        &self,
        headers: Vec<C::Header>,
        first_height: u32,
    ) -> Result<bool, BlockchainError> {
        self.store.exclusive(|| self.seed(headers, first_height))
    }

    fn seed(&self, headers: Vec<C::Header>, first_height: u32) -> Result<bool, BlockchainError> {
        if headers.is_empty() || self.store.get_chain_head()?.is_some() {
            return Ok(false);
        }

        let now = unix_now();
        let mut previous: Option<StoredHeader<C>> = None;
        for (offset, header) in headers.into_iter().enumerate() {
            check_header::<C>(&header, &self.params, now)?;
            let height = u32::try_from(offset)
                .ok()
                .and_then(|offset| first_height.checked_add(offset))
                .ok_or_else(|| {
                    Rejection::Malformed(format!(
                        "bootstrap height overflow {} blocks past {}",
                        offset, first_height
                    ))
                })?;
            if let Some(declared) = C::header_height(&header) {
                if declared != height {
                    return Err(Rejection::HeightMismatch {
                        expected: height,
                        found: declared,
                    }
                    .into());
                }
            }

            let work = match &previous {
                Some(parent) => {
                    let reference = C::previous_block(&header);
                    if !reference.matches(&parent.hash) {
                        return Err(Rejection::Malformed(format!(
                            "bootstrap header at height {} does not follow {}",
                            height, parent.hash
                        ))
                        .into());
                    }
                    parent.work.saturating_add(C::work(&header))
                }
                None => C::work(&header),
            };

            let record = StoredHeader::new(header, height, work);
            self.store.put(&record)?;
            previous = Some(record);
        }

        if let Some(head) = previous {
            info!(chain = C::NAME, hash = %head.hash, height = head.height, "bootstrapped chain");
            self.store.set_chain_head(head)?;
        }
        Ok(true)
    }

    fn publish(&self, event: ChainEvent<C>) {
        if self.events.send(event).is_err() {
            trace!(chain = C::NAME, "no event subscribers");
        }
    }
}
