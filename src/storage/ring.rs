//! Fixed-capacity ring file store
//!
//! One memory-mapped file per chain:
//!
//! ```text
//! [0, 4)            magic
//! [4, 8)            ring cursor (u32 BE), byte offset of the next write
//! [8, 8 + N)        chain head hash (N = C::HEAD_HASH_SIZE)
//! [40, 44)          archive series number (u32 BE)
//! [1024, ..)        capacity x C::RECORD_SIZE records
//! ```
//!
//! Lookups are backward linear scans from the cursor over one full ring.
//! A bounded negative cache remembers hashes whose scan came up empty.

use crate::config::StoreConfig;
use crate::constants::{
    CURSOR_OFFSET, HEAD_HASH_OFFSET, MAGIC_OFFSET, PROLOGUE_SIZE, SERIES_OFFSET, WORK_SIZE,
};
use crate::crypto::ChainHash;
use crate::storage::{ChainFlavor, CodecError, MappedFile, StoreError, StoredHeader};
use lru::LruCache;
use parking_lot::ReentrantMutex;
use serde::Serialize;
use std::cell::RefCell;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn};

/// Scan and cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Scans that visited every slot without stopping early
    pub full_scans: u64,
    /// Ring slots inspected by all scans
    pub slots_visited: u64,
    /// `get` calls answered from the negative cache
    pub negative_cache_hits: u64,
    /// Successful archive copies
    pub archives: u64,
}

/// Ring slot offsets walked backward from the cursor, wrapping once
struct BackwardSlots {
    next_index: usize,
    remaining: usize,
    capacity: usize,
    record_size: usize,
}

impl Iterator for BackwardSlots {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let index = if self.next_index == 0 {
            self.capacity - 1
        } else {
            self.next_index - 1
        };
        self.next_index = index;
        Some(PROLOGUE_SIZE + index * self.record_size)
    }
}

struct State<C: ChainFlavor> {
    mapped: Option<MappedFile>,
    head: Option<StoredHeader<C>>,
    negative: Option<LruCache<C::Hash, ()>>,
    stats: StoreStats,
}

impl<C: ChainFlavor> State<C> {
    fn mapped(&self) -> Result<&MappedFile, StoreError> {
        self.mapped.as_ref().ok_or(StoreError::Closed)
    }

    fn mapped_mut(&mut self) -> Result<&mut MappedFile, StoreError> {
        self.mapped.as_mut().ok_or(StoreError::Closed)
    }

    fn cursor(&self) -> Result<usize, StoreError> {
        Ok(self.mapped()?.read_u32(CURSOR_OFFSET)? as usize)
    }

    fn set_cursor(&mut self, cursor: usize) -> Result<(), StoreError> {
        let cursor = u32::try_from(cursor)
            .map_err(|_| StoreError::Corrupted(format!("cursor {} does not fit in u32", cursor)))?;
        self.mapped_mut()?.write_u32(CURSOR_OFFSET, cursor)
    }

    fn slots(&self, capacity: usize) -> Result<BackwardSlots, StoreError> {
        let cursor = self.cursor()?;
        Ok(BackwardSlots {
            next_index: (cursor - PROLOGUE_SIZE) / C::RECORD_SIZE,
            remaining: capacity,
            capacity,
            record_size: C::RECORD_SIZE,
        })
    }

    fn slot_hash(&self, offset: usize) -> Result<&[u8], StoreError> {
        self.mapped()?.read(offset, C::HASH_SIZE)
    }

    /// Previous-block reference read straight from the raw header bytes
    fn slot_previous_block(&self, offset: usize) -> Result<C::Hash, StoreError> {
        let start = offset + C::HASH_SIZE + C::HEIGHT_SIZE + WORK_SIZE + C::PREVIOUS_BLOCK_OFFSET;
        let raw = self.mapped()?.read(start, C::PREVIOUS_BLOCK_SIZE)?;
        Ok(C::Hash::from_slice(raw).map_err(CodecError::from)?)
    }

    fn read_record(&self, offset: usize) -> Result<StoredHeader<C>, StoreError> {
        let mut input = self.mapped()?.read(offset, C::RECORD_SIZE)?;
        Ok(StoredHeader::deserialize(&mut input)?)
    }

    /// First slot, newest first, whose hash matches `hash`
    fn find(&mut self, hash: &C::Hash, capacity: usize) -> Result<Option<usize>, StoreError> {
        let mut visited = 0u64;
        let mut found = None;
        for offset in self.slots(capacity)? {
            visited += 1;
            let stored = self.slot_hash(offset)?;
            if stored.iter().all(|b| *b == 0) {
                continue;
            }
            if hash.matches_bytes(stored) {
                found = Some(offset);
                break;
            }
        }
        self.record_scan(visited, found.is_none());
        trace!(chain = C::NAME, %hash, visited, found = found.is_some(), "ring scan");
        Ok(found)
    }

    /// Walk previous-block references from `start`, within one ring pass.
    ///
    /// `visit` is called for each matched record; returning `false` stops.
    fn walk<F>(&mut self, start: C::Hash, capacity: usize, mut visit: F) -> Result<(), StoreError>
    where
        F: FnMut(StoredHeader<C>) -> bool,
    {
        let mut target = start;
        let mut visited = 0u64;
        let mut finished = false;
        for offset in self.slots(capacity)? {
            visited += 1;
            let stored = self.slot_hash(offset)?;
            if stored.iter().all(|b| *b == 0) || !target.matches_bytes(stored) {
                continue;
            }
            let previous = self.slot_previous_block(offset)?;
            let record = self.read_record(offset)?;
            if !visit(record) || previous.is_zero() {
                finished = true;
                break;
            }
            target = previous;
        }
        self.record_scan(visited, !finished);
        Ok(())
    }

    fn record_scan(&mut self, visited: u64, exhausted: bool) {
        self.stats.slots_visited += visited;
        if exhausted {
            self.stats.full_scans += 1;
        }
    }

    fn invalidate_negative(&mut self, hash: &C::Hash) {
        if let Some(cache) = self.negative.as_mut() {
            let stale: Vec<C::Hash> = cache
                .iter()
                .filter(|(key, _)| key.matches_bytes(hash.as_slice()))
                .map(|(key, _)| key.clone())
                .collect();
            for key in stale {
                cache.pop(&key);
            }
        }
    }

    fn load_head(&mut self, capacity: usize) -> Result<Option<StoredHeader<C>>, StoreError> {
        if let Some(head) = &self.head {
            return Ok(Some(head.clone()));
        }
        let raw = self.mapped()?.read(HEAD_HASH_OFFSET, C::HEAD_HASH_SIZE)?;
        if raw.iter().all(|b| *b == 0) {
            return Ok(None);
        }
        let hash = C::Hash::from_slice(raw).map_err(CodecError::from)?;
        let offset = self
            .find(&hash, capacity)?
            .ok_or_else(|| StoreError::HeadMissing { hash: hash.to_string() })?;
        let head = self.read_record(offset)?;
        self.head = Some(head.clone());
        Ok(Some(head))
    }
}

/// Memory-mapped ring store of stored headers for one chain
pub struct RingFileStore<C: ChainFlavor> {
    path: PathBuf,
    capacity: usize,
    archive_extension: String,
    state: ReentrantMutex<RefCell<State<C>>>,
}

impl<C: ChainFlavor> RingFileStore<C> {
    /// Open the store at `path`, creating it if absent.
    ///
    /// # Errors
    ///
    /// Fails when the file size does not match the configured capacity, the
    /// magic tag belongs to another chain, or another process holds the lock.
    pub fn open(path: impl AsRef<Path>, config: &StoreConfig) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if config.capacity == 0 {
            return Err(StoreError::ZeroCapacity);
        }
        let size = PROLOGUE_SIZE + C::RECORD_SIZE * config.capacity;
        let data_end = size;
        let (mut mapped, created) = MappedFile::open_or_create(path, size)?;

        if created {
            mapped.write(MAGIC_OFFSET, &C::MAGIC)?;
            mapped.write_u32(SERIES_OFFSET, 0)?;
            mapped.write_u32(CURSOR_OFFSET, PROLOGUE_SIZE as u32)?;
            mapped.flush()?;
            info!(chain = C::NAME, path = %path.display(), capacity = config.capacity, "created ring store");
        } else {
            let magic = mapped.read(MAGIC_OFFSET, C::MAGIC.len())?;
            if magic != C::MAGIC {
                return Err(StoreError::BadMagic {
                    path: path.to_path_buf(),
                    expected: String::from_utf8_lossy(&C::MAGIC).into_owned(),
                    found: String::from_utf8_lossy(magic).into_owned(),
                });
            }
            let cursor = mapped.read_u32(CURSOR_OFFSET)? as usize;
            if cursor < PROLOGUE_SIZE
                || cursor > data_end
                || (cursor - PROLOGUE_SIZE) % C::RECORD_SIZE != 0
            {
                return Err(StoreError::Corrupted(format!(
                    "ring cursor {} outside data region [{}, {}]",
                    cursor, PROLOGUE_SIZE, data_end
                )));
            }
            info!(
                chain = C::NAME,
                path = %path.display(),
                cursor,
                series = mapped.read_u32(SERIES_OFFSET)?,
                "opened ring store"
            );
        }

        let negative = NonZeroUsize::new(config.negative_cache_size).map(LruCache::new);

        Ok(Self {
            path: path.to_path_buf(),
            capacity: config.capacity,
            archive_extension: config.archive_extension.clone(),
            state: ReentrantMutex::new(RefCell::new(State {
                mapped: Some(mapped),
                head: None,
                negative,
                stats: StoreStats::default(),
            })),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of record slots
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn data_end(&self) -> usize {
        PROLOGUE_SIZE + C::RECORD_SIZE * self.capacity
    }

    /// Current archive series number
    pub fn series(&self) -> Result<u32, StoreError> {
        let guard = self.state.lock();
        let state = guard.borrow();
        state.mapped()?.read_u32(SERIES_OFFSET)
    }

    pub fn stats(&self) -> StoreStats {
        let guard = self.state.lock();
        let stats = guard.borrow().stats;
        stats
    }

    /// Run `f` with the store lock held.
    ///
    /// The lock is re-entrant, so store calls made by `f` on this thread go
    /// through while other threads wait until `f` returns.
    pub fn exclusive<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.state.lock();
        f()
    }

    /// Current chain head, or `None` for an empty store.
    ///
    /// A head hash in the prologue with no matching record is corruption.
    pub fn get_chain_head(&self) -> Result<Option<StoredHeader<C>>, StoreError> {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        state.load_head(self.capacity)
    }

    /// Record `head` as the chain head and return the previously cached one.
    ///
    /// The record must already have been `put`. The prologue is not read
    /// back, so a head whose record was lost can still be replaced.
    pub fn set_chain_head(
        &self,
        head: StoredHeader<C>,
    ) -> Result<Option<StoredHeader<C>>, StoreError> {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        state.mapped()?;

        let hash = head.hash.as_slice();
        let reference = &hash[hash.len().saturating_sub(C::HEAD_HASH_SIZE)..];
        let mut field = vec![0u8; C::HEAD_HASH_SIZE];
        field[C::HEAD_HASH_SIZE - reference.len()..].copy_from_slice(reference);
        state.mapped_mut()?.write(HEAD_HASH_OFFSET, &field)?;

        debug!(chain = C::NAME, hash = %head.hash, height = head.height, "chain head set");
        Ok(state.head.replace(head))
    }

    /// Write `record` at the cursor and return the record it overwrote.
    ///
    /// When the cursor sits at the end of the data region the file is
    /// archived and the ring wraps to the first slot.
    pub fn put(&self, record: &StoredHeader<C>) -> Result<Option<StoredHeader<C>>, StoreError> {
        let guard = self.state.lock();
        let at_end = guard.borrow().cursor()? >= self.data_end();
        if at_end {
            self.archive()?;
            guard.borrow_mut().set_cursor(PROLOGUE_SIZE)?;
        }

        let mut state = guard.borrow_mut();
        let cursor = state.cursor()?;
        let overwritten = if state.slot_hash(cursor)?.iter().all(|b| *b == 0) {
            None
        } else {
            Some(state.read_record(cursor)?)
        };

        let bytes = record.to_bytes()?;
        state.mapped_mut()?.write(cursor, &bytes)?;
        state.set_cursor(cursor + C::RECORD_SIZE)?;
        state.invalidate_negative(&record.hash);

        debug!(
            chain = C::NAME,
            hash = %record.hash,
            height = record.height,
            slot = (cursor - PROLOGUE_SIZE) / C::RECORD_SIZE,
            overwrote = overwritten.is_some(),
            "stored header"
        );
        Ok(overwritten)
    }

    /// Overwrite the newest record matching `hash` in place.
    ///
    /// The cursor does not move. Returns the replaced record.
    pub fn replace(
        &self,
        hash: &C::Hash,
        record: &StoredHeader<C>,
    ) -> Result<Option<StoredHeader<C>>, StoreError> {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        let offset = match state.find(hash, self.capacity)? {
            Some(offset) => offset,
            None => return Ok(None),
        };
        let previous = state.read_record(offset)?;
        let bytes = record.to_bytes()?;
        state.mapped_mut()?.write(offset, &bytes)?;
        state.invalidate_negative(&record.hash);
        if state.head.as_ref().map_or(false, |head| head.hash == previous.hash) {
            state.head = None;
        }
        debug!(chain = C::NAME, %hash, "replaced header");
        Ok(Some(previous))
    }

    /// Newest record matching `hash`
    pub fn get(&self, hash: &C::Hash) -> Result<Option<StoredHeader<C>>, StoreError> {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        state.mapped()?;

        if state.negative.as_ref().map_or(false, |cache| cache.contains(hash)) {
            state.stats.negative_cache_hits += 1;
            trace!(chain = C::NAME, %hash, "negative cache hit");
            return Ok(None);
        }

        match state.find(hash, self.capacity)? {
            Some(offset) => Ok(Some(state.read_record(offset)?)),
            None => {
                if let Some(cache) = state.negative.as_mut() {
                    cache.put(hash.clone(), ());
                }
                Ok(None)
            }
        }
    }

    /// Up to `count` records starting at `hash` and following previous-block
    /// references, newest first.
    ///
    /// Returns fewer when the ring holds a shorter chain.
    pub fn get_ancestors(
        &self,
        hash: &C::Hash,
        count: usize,
    ) -> Result<Vec<StoredHeader<C>>, StoreError> {
        let mut chain = Vec::with_capacity(count.min(self.capacity));
        if count == 0 {
            return Ok(chain);
        }
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        state.walk(hash.clone(), self.capacity, |record| {
            chain.push(record);
            chain.len() < count
        })?;
        Ok(chain)
    }

    /// The block `n` steps back from `hash` (0 is the block itself)
    pub fn get_from_chain(
        &self,
        hash: &C::Hash,
        n: usize,
    ) -> Result<Option<StoredHeader<C>>, StoreError> {
        let mut chain = self.get_ancestors(hash, n + 1)?;
        if chain.len() == n + 1 {
            Ok(chain.pop())
        } else {
            Ok(None)
        }
    }

    /// Return the record for `hash` if it lies on the chain ending at the
    /// current head.
    pub fn scan_best_chain(&self, hash: &C::Hash) -> Result<Option<StoredHeader<C>>, StoreError> {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        let head = match state.load_head(self.capacity)? {
            Some(head) => head,
            None => return Ok(None),
        };

        let mut found = None;
        state.walk(head.hash, self.capacity, |record| {
            if hash.matches(&record.hash) {
                found = Some(record);
                false
            } else {
                true
            }
        })?;
        Ok(found)
    }

    /// Copy the file to `<stem>-<series>.<ext>` next to it.
    ///
    /// Copy failures are logged and swallowed; only I/O on the live file
    /// (flush, re-locking) is returned.
    pub fn archive(&self) -> Result<(), StoreError> {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        let series = state.mapped()?.read_u32(SERIES_OFFSET)?;
        let target = self.archive_path(series);

        match state.mapped_mut()?.copy_unlocked(&target)? {
            Ok(bytes) => {
                state.mapped_mut()?.write_u32(SERIES_OFFSET, series.wrapping_add(1))?;
                state.stats.archives += 1;
                info!(chain = C::NAME, target = %target.display(), series, bytes, "archived ring store");
            }
            Err(e) => {
                warn!(
                    chain = C::NAME,
                    target = %target.display(),
                    error = %e,
                    "archive copy failed, oldest records will be lost"
                );
            }
        }
        Ok(())
    }

    /// Path of the archive written for `series`
    pub fn archive_path(&self, series: u32) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = format!("{}-{:08x}.{}", stem, series, self.archive_extension);
        self.path.with_file_name(name)
    }

    /// Zero the data region and forget the head; the series number is kept
    pub fn reset(&self) -> Result<(), StoreError> {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        let data_len = C::RECORD_SIZE * self.capacity;
        let mapped = state.mapped_mut()?;
        mapped.zero(PROLOGUE_SIZE, data_len)?;
        mapped.zero(HEAD_HASH_OFFSET, C::HEAD_HASH_SIZE)?;
        mapped.write_u32(CURSOR_OFFSET, PROLOGUE_SIZE as u32)?;
        mapped.flush()?;
        state.head = None;
        if let Some(cache) = state.negative.as_mut() {
            cache.clear();
        }
        info!(chain = C::NAME, path = %self.path.display(), "ring store reset");
        Ok(())
    }

    /// Flush pending writes
    pub fn flush(&self) -> Result<(), StoreError> {
        let guard = self.state.lock();
        let state = guard.borrow();
        state.mapped()?.flush()
    }

    /// Flush, unmap and release the file lock. Closing twice is a no-op.
    pub fn close(&self) -> Result<(), StoreError> {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        state.head = None;
        match state.mapped.take() {
            Some(mapped) => {
                mapped.close()?;
                debug!(chain = C::NAME, path = %self.path.display(), "closed ring store");
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        let guard = self.state.lock();
        let closed = guard.borrow().mapped.is_none();
        closed
    }
}

impl<C: ChainFlavor> Drop for RingFileStore<C> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(chain = C::NAME, path = %self.path.display(), error = %e, "failed to close ring store");
        }
    }
}

impl<C: ChainFlavor> std::fmt::Debug for RingFileStore<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingFileStore")
            .field("chain", &C::NAME)
            .field("path", &self.path)
            .field("capacity", &self.capacity)
            .finish()
    }
}
