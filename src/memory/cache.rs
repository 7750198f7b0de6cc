//! Cache implementation: fully associative, LRU replacement, write-back

use tracing::{debug, trace};

use super::store::BackingStore;
use super::{MemoryLocation, BANK_CELLS};
use crate::bitvector::Word;

pub fn is_pow_2(value: usize) -> bool {
    value != 0 && value & (value - 1) == 0
}

/// Identifies a block: the bank it lives in and its index within the bank
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockTag {
    pub bank: usize,
    pub block: usize,
}

/// Cache implementation.
///
/// A block is `block_size` consecutive cells of a single bank, so an
/// address maps to tag (bank, cell / block_size) and offset
/// cell % block_size.
#[derive(Clone, Debug)]
pub struct Cache {
    pub policy: CachePolicy,

    pub history: CacheHistory,

    pub lines: Vec<CacheLine>,

    // Stamped onto a line at every access; the smallest stamp is the LRU
    ref_counter: u64,
}

impl Cache {
    pub fn make(policy: CachePolicy) -> Self {
        assert!(policy.is_valid());

        Self {
            policy,
            history: CacheHistory::default(),
            lines: vec![CacheLine::default(); policy.lines],
            ref_counter: 0,
        }
    }

    pub fn get_tag(&self, location: MemoryLocation) -> BlockTag {
        BlockTag {
            bank: location.bank,
            block: location.cell / self.policy.block_size,
        }
    }

    pub fn get_offset(&self, location: MemoryLocation) -> usize {
        location.cell % self.policy.block_size
    }

    pub fn is_in_cache(&self, location: MemoryLocation) -> bool {
        self.lookup(self.get_tag(location)).is_some()
    }

    pub fn lookup(&self, tag: BlockTag) -> Option<usize> {
        self.lines.iter().position(|line| line.tag == Some(tag))
    }

    pub fn record_hit(&mut self) {
        self.history.num_hit += 1;
    }

    pub fn record_miss(&mut self) {
        self.history.num_miss += 1;
    }

    /// Computes the current miss rate of the cache
    pub fn get_miss_rate(&self) -> f64 {
        let total = self.history.num_hit + self.history.num_miss;
        if total == 0 {
            return 0.;
        }
        (self.history.num_miss as f64) / (total as f64)
    }

    /// Returns the word on a hit. On a miss the block is brought in and
    /// `None` is returned; the caller retries on a later tick.
    pub fn fetch_word(
        &mut self,
        location: MemoryLocation,
        store: &mut BackingStore,
    ) -> Option<Word> {
        let tag = self.get_tag(location);
        match self.lookup(tag) {
            Some(index) => {
                trace!(?tag, line = index, "cache hit during fetch");
                self.record_hit();
                self.touch(index);
                Some(self.lines[index].data[self.get_offset(location)])
            }
            None => {
                trace!(?tag, "cache miss during fetch");
                self.record_miss();
                self.fetch_block(tag, store);
                None
            }
        }
    }

    /// Writes the word on a hit and marks the line dirty. On a miss the
    /// block is brought in, nothing is written and `false` is returned.
    pub fn store_word(
        &mut self,
        location: MemoryLocation,
        value: Word,
        store: &mut BackingStore,
    ) -> bool {
        let tag = self.get_tag(location);
        match self.lookup(tag) {
            Some(index) => {
                trace!(?tag, line = index, "cache hit during store");
                self.record_hit();
                self.write_line(index, location, value);
                true
            }
            None => {
                trace!(?tag, "cache miss during store");
                self.record_miss();
                self.fetch_block(tag, store);
                false
            }
        }
    }

    /// Non-clocked read: allocates the block if needed and returns the word
    /// in the same call. Hit/miss statistics are left alone.
    pub fn engineer_fetch_word(
        &mut self,
        location: MemoryLocation,
        store: &mut BackingStore,
    ) -> Word {
        let index = self.ensure_block(self.get_tag(location), store);
        self.touch(index);
        self.lines[index].data[self.get_offset(location)]
    }

    /// Non-clocked write through the cache
    pub fn engineer_store_word(
        &mut self,
        location: MemoryLocation,
        value: Word,
        store: &mut BackingStore,
    ) {
        let index = self.ensure_block(self.get_tag(location), store);
        self.write_line(index, location, value);
    }

    /// Write every dirty line back, keeping the lines resident
    pub fn flush(&mut self, store: &mut BackingStore) {
        for index in 0..self.lines.len() {
            self.write_back(index, store);
        }
    }

    /// Drop every line without writing anything back
    pub fn reset(&mut self) {
        self.lines = vec![CacheLine::default(); self.policy.lines];
        self.history = CacheHistory::default();
        self.ref_counter = 0;
    }

    fn ensure_block(
        &mut self,
        tag: BlockTag,
        store: &mut BackingStore,
    ) -> usize {
        match self.lookup(tag) {
            Some(index) => index,
            None => self.fetch_block(tag, store),
        }
    }

    fn touch(&mut self, index: usize) {
        self.ref_counter += 1;
        self.lines[index].last_used = Some(self.ref_counter);
    }

    fn write_line(
        &mut self,
        index: usize,
        location: MemoryLocation,
        value: Word,
    ) {
        let offset = self.get_offset(location);
        self.touch(index);
        let line = &mut self.lines[index];
        line.data[offset] = value;
        line.dirty = true;
    }

    /// Load a block from the store into a free or least recently used line
    fn fetch_block(
        &mut self,
        tag: BlockTag,
        store: &mut BackingStore,
    ) -> usize {
        let index = self.get_index_to_replace();
        self.clean_line(index, store);

        let first_cell = tag.block * self.policy.block_size;
        let line = &mut self.lines[index];
        line.data =
            store.read_block(tag.bank, first_cell, self.policy.block_size);
        line.tag = Some(tag);
        line.dirty = false;
        self.touch(index);

        debug!(?tag, line = index, "fetched block into cache");
        index
    }

    /// Prefer an unused line, otherwise the least recently used one
    pub fn get_index_to_replace(&self) -> usize {
        let free = self.lines.iter().position(|line| line.tag.is_none());
        if let Some(free) = free {
            return free;
        }
        let mut result = 0;
        for (i, line) in self.lines.iter().enumerate() {
            if line.last_used < self.lines[result].last_used {
                result = i;
            }
        }
        result
    }

    fn write_back(&mut self, index: usize, store: &mut BackingStore) {
        let block_size = self.policy.block_size;
        let line = &mut self.lines[index];
        if let (Some(tag), true) = (line.tag, line.dirty) {
            store.write_block(tag.bank, tag.block * block_size, &line.data);
            line.dirty = false;
            self.history.num_writeback += 1;
            debug!(?tag, line = index, "wrote dirty block back to memory");
        }
    }

    /// Free a line, writing it back first if it is dirty
    fn clean_line(&mut self, index: usize, store: &mut BackingStore) {
        self.write_back(index, store);
        let line = &mut self.lines[index];
        line.tag = None;
        line.last_used = None;
    }
}

#[derive(Clone, Debug, Default)]
pub struct CacheLine {
    pub tag: Option<BlockTag>,
    pub dirty: bool,
    pub last_used: Option<u64>,
    pub data: Vec<Word>,
}

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct CacheHistory {
    pub num_hit: u64,
    pub num_miss: u64,
    pub num_writeback: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CachePolicy {
    /// Number of lines
    pub lines: usize,
    /// Words per block
    pub block_size: usize,
}

impl Default for CachePolicy {
    /// 8 lines of 32 words
    fn default() -> Self {
        Self::make(8, 32)
    }
}

impl CachePolicy {
    pub fn make(lines: usize, block_size: usize) -> Self {
        Self { lines, block_size }
    }

    pub fn is_valid(&self) -> bool {
        // Need at least one line
        if self.lines == 0 {
            return false;
        }
        // Block size must be a power of 2
        if !is_pow_2(self.block_size) {
            return false;
        }
        // Blocks must tile a bank exactly
        BANK_CELLS % self.block_size == 0
    }
}
