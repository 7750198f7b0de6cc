//! Memory structure: banked backing store behind the MAR/MBR handshake

pub mod cache;
pub mod store;

use tracing::{debug, trace};

use crate::bitvector::{BitVector, Word, ADDRESS_WIDTH, WORD_WIDTH};
use crate::error::{MachineFault, SimulatorResult};
use cache::{Cache, CacheHistory, CachePolicy};
use store::BackingStore;

/// Number of interleaved banks
pub const BANK_COUNT: usize = 8;
/// Cells per bank
pub const BANK_CELLS: usize = 256;
/// Addressable words
pub const MEMORY_SIZE: usize = BANK_COUNT * BANK_CELLS;

/// A word's physical position. Consecutive addresses are striped across
/// banks: bank = address mod 8, cell = address div 8.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MemoryLocation {
    pub bank: usize,
    pub cell: usize,
}

impl MemoryLocation {
    pub fn decompose(address: u64) -> Result<Self, MachineFault> {
        let bank = (address % BANK_COUNT as u64) as usize;
        let cell = address / BANK_COUNT as u64;
        if cell >= BANK_CELLS as u64 {
            return Err(MachineFault::IllegalMemoryAddress(address));
        }
        Ok(Self {
            bank,
            cell: cell as usize,
        })
    }

    pub fn address(&self) -> u64 {
        (self.cell * BANK_COUNT + self.bank) as u64
    }
}

/// Fits an address into the 13-bit MAR/PC width
pub fn address_register(address: u64) -> Result<BitVector, MachineFault> {
    if address > BitVector::max_unsigned(ADDRESS_WIDTH) as u64 {
        return Err(MachineFault::IllegalMemoryAddress(address));
    }
    Ok(BitVector::from_bits(ADDRESS_WIDTH, address))
}

/// Memory handshake state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MemoryState {
    #[default]
    None,
    /// MAR or MBR latched, nothing requested yet
    Waiting,
    PreFetch,
    PreStore,
}

/// Memory control unit.
///
/// The control unit latches MAR (and MBR for stores), raises a fetch or
/// store signal, then polls `is_busy` until the request completes. With
/// the cache enabled a miss keeps the request pending and it is retried on
/// the next tick.
#[derive(Debug)]
pub struct MemoryControlUnit {
    store: BackingStore,
    cache: Option<Cache>,
    mar: BitVector,
    mbr: Word,
    state: MemoryState,
}

impl MemoryControlUnit {
    pub fn make(cache: Option<CachePolicy>) -> Self {
        Self {
            store: BackingStore::make(),
            cache: cache.map(Cache::make),
            mar: BitVector::zero(ADDRESS_WIDTH),
            mbr: Word::zero(WORD_WIDTH),
            state: MemoryState::None,
        }
    }

    /// Latch an address. Refused while a request is in flight.
    pub fn set_mar(&mut self, address: BitVector) -> bool {
        if self.is_busy() {
            return false;
        }
        self.mar = address.resize(ADDRESS_WIDTH);
        self.state = MemoryState::Waiting;
        true
    }

    /// Latch a data word. Refused while a request is in flight.
    pub fn set_mbr(&mut self, value: Word) -> bool {
        if self.is_busy() {
            return false;
        }
        self.mbr = value.resize(WORD_WIDTH);
        self.state = MemoryState::Waiting;
        true
    }

    pub fn mar(&self) -> BitVector {
        self.mar
    }

    pub fn mbr(&self) -> Word {
        self.mbr
    }

    pub fn signal_fetch(&mut self) {
        self.state = MemoryState::PreFetch;
    }

    pub fn signal_store(&mut self) {
        self.state = MemoryState::PreStore;
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.state, MemoryState::PreFetch | MemoryState::PreStore)
    }

    pub fn state(&self) -> MemoryState {
        self.state
    }

    pub fn cache(&self) -> Option<&Cache> {
        self.cache.as_ref()
    }

    pub fn cache_history(&self) -> CacheHistory {
        self.cache.as_ref().map(|cache| cache.history).unwrap_or_default()
    }

    /// Drop any pending request
    pub fn abort(&mut self) {
        self.state = MemoryState::None;
    }

    pub fn clock_cycle(&mut self) -> SimulatorResult<()> {
        match self.state {
            MemoryState::PreFetch => {
                let location = self.locate()?;
                let value = match self.cache.as_mut() {
                    Some(cache) => cache.fetch_word(location, &mut self.store),
                    None => Some(self.store.get(location)),
                };
                match value {
                    Some(value) => {
                        let address = self.mar.unsigned();
                        debug!(address, %value, "memory fetch");
                        self.mbr = value;
                        self.state = MemoryState::None;
                    }
                    None => trace!(
                        address = self.mar.unsigned(),
                        "fetch stalled on cache miss"
                    ),
                }
            }
            MemoryState::PreStore => {
                let location = self.locate()?;
                let done = match self.cache.as_mut() {
                    Some(cache) => {
                        cache.store_word(location, self.mbr, &mut self.store)
                    }
                    None => {
                        self.store.set(location, self.mbr);
                        true
                    }
                };
                if done {
                    debug!(
                        address = self.mar.unsigned(),
                        value = %self.mbr,
                        "memory store"
                    );
                    self.state = MemoryState::None;
                } else {
                    trace!(
                        address = self.mar.unsigned(),
                        "store stalled on cache miss"
                    );
                }
            }
            MemoryState::None | MemoryState::Waiting => {}
        }
        Ok(())
    }

    // A bad MAR ends the request before the fault is raised
    fn locate(&mut self) -> Result<MemoryLocation, MachineFault> {
        MemoryLocation::decompose(self.mar.unsigned()).inspect_err(|_| {
            self.state = MemoryState::None;
        })
    }

    /// Non-clocked read, allocating a cache line when caching is enabled
    pub fn engineer_fetch(
        &mut self,
        address: u64,
    ) -> Result<Word, MachineFault> {
        let location = MemoryLocation::decompose(address)?;
        Ok(match self.cache.as_mut() {
            Some(cache) => cache.engineer_fetch_word(location, &mut self.store),
            None => self.store.get(location),
        })
    }

    /// Non-clocked write, going through the cache when caching is enabled
    pub fn engineer_store(
        &mut self,
        address: u64,
        value: Word,
    ) -> Result<(), MachineFault> {
        let location = MemoryLocation::decompose(address)?;
        let value = value.resize(WORD_WIDTH);
        match self.cache.as_mut() {
            Some(cache) => {
                cache.engineer_store_word(location, value, &mut self.store)
            }
            None => self.store.set(location, value),
        }
        Ok(())
    }

    /// Read the backing store directly, ignoring anything cached
    pub fn backing_word(&self, address: u64) -> Result<Word, MachineFault> {
        Ok(self.store.get(MemoryLocation::decompose(address)?))
    }

    /// Write every dirty cache line back to the backing store
    pub fn flush_cache(&mut self) {
        if let Some(cache) = self.cache.as_mut() {
            cache.flush(&mut self.store);
        }
    }

    /// Power-up state: zeroed store and registers, empty cache
    pub fn reset(&mut self) {
        self.store.clear();
        if let Some(cache) = self.cache.as_mut() {
            cache.reset();
        }
        self.mar = BitVector::zero(ADDRESS_WIDTH);
        self.mbr = Word::zero(WORD_WIDTH);
        self.state = MemoryState::None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimulatorError;

    fn word(value: i128) -> Word {
        Word::word(value).unwrap()
    }

    fn address(value: u64) -> BitVector {
        address_register(value).unwrap()
    }

    /// Clock until the request completes, returning the ticks it took
    fn settle(memory: &mut MemoryControlUnit) -> u32 {
        let mut ticks = 0;
        while memory.is_busy() {
            memory.clock_cycle().unwrap();
            ticks += 1;
        }
        ticks
    }

    #[test]
    fn test_bank_mapping() {
        let a = MemoryLocation::decompose(100).unwrap();
        let b = MemoryLocation::decompose(108).unwrap();
        let c = MemoryLocation::decompose(101).unwrap();
        assert_eq!(a.bank, b.bank);
        assert_ne!(a.cell, b.cell);
        assert_ne!(a.bank, c.bank);
        assert_eq!(a, MemoryLocation { bank: 4, cell: 12 });
        assert_eq!(a.address(), 100);
    }

    #[test]
    fn test_illegal_address() {
        assert_eq!(
            MemoryLocation::decompose(MEMORY_SIZE as u64),
            Err(MachineFault::IllegalMemoryAddress(2048))
        );
        assert!(MemoryLocation::decompose(MEMORY_SIZE as u64 - 1).is_ok());
        assert!(address_register(8191).is_ok());
        assert_eq!(
            address_register(8192),
            Err(MachineFault::IllegalMemoryAddress(8192))
        );
    }

    #[test]
    fn test_fetch_store_without_cache() {
        let mut memory = MemoryControlUnit::make(None);

        assert!(memory.set_mar(address(77)));
        assert!(memory.set_mbr(word(1234)));
        assert_eq!(memory.state(), MemoryState::Waiting);
        memory.signal_store();
        assert!(memory.is_busy());
        // Busy memory refuses new requests
        assert!(!memory.set_mar(address(0)));
        assert_eq!(settle(&mut memory), 1);

        memory.set_mbr(word(0));
        memory.set_mar(address(77));
        memory.signal_fetch();
        assert_eq!(settle(&mut memory), 1);
        assert_eq!(memory.mbr(), word(1234));
        assert_eq!(memory.state(), MemoryState::None);
    }

    #[test]
    fn test_cache_miss_stalls_one_tick() {
        let mut memory = MemoryControlUnit::make(Some(CachePolicy::default()));
        memory.engineer_store(300, word(9)).unwrap();
        memory.flush_cache();
        // Start from a cold cache that still sees the flushed value
        let mut cold = MemoryControlUnit::make(Some(CachePolicy::default()));
        cold.store = memory.store.clone();

        cold.set_mar(address(300));
        cold.signal_fetch();
        assert_eq!(settle(&mut cold), 2);
        assert_eq!(cold.mbr(), word(9));

        // Same block is now resident
        cold.set_mar(address(308));
        cold.signal_fetch();
        assert_eq!(settle(&mut cold), 1);
        assert_eq!(cold.cache_history().num_miss, 1);
        assert_eq!(cold.cache_history().num_hit, 2);
    }

    #[test]
    fn test_fault_clears_request() {
        let mut memory = MemoryControlUnit::make(None);
        memory.set_mar(address(5000));
        memory.signal_fetch();
        let error = memory.clock_cycle().unwrap_err();
        assert!(matches!(
            error,
            SimulatorError::Fault(MachineFault::IllegalMemoryAddress(5000))
        ));
        assert!(!memory.is_busy());
    }

    #[test]
    fn test_write_back_visible_in_backing_store() {
        let mut memory = MemoryControlUnit::make(Some(CachePolicy::default()));

        // Dirty the block holding address 0 (bank 0, block 0)
        memory.set_mar(address(0));
        memory.set_mbr(word(4321));
        memory.signal_store();
        settle(&mut memory);
        assert_eq!(memory.engineer_fetch(0).unwrap(), word(4321));
        assert!(memory.backing_word(0).unwrap().is_zero());

        // Block 0 of banks 1-7, then block 1 of bank 0
        for address in (1..8).chain([256]) {
            memory.engineer_fetch(address).unwrap();
        }
        assert_eq!(memory.backing_word(0).unwrap(), word(4321));
        assert_eq!(memory.cache_history().num_writeback, 1);
        let first = MemoryLocation { bank: 0, cell: 0 };
        assert!(!memory.cache().unwrap().is_in_cache(first));
    }

    #[test]
    fn test_engineer_access_without_cache() {
        let mut memory = MemoryControlUnit::make(None);
        memory.engineer_store(2047, word(-5)).unwrap();
        assert_eq!(memory.engineer_fetch(2047).unwrap().signed(), -5);
        assert_eq!(memory.backing_word(2047).unwrap().signed(), -5);
        assert_eq!(
            memory.engineer_store(2048, word(1)),
            Err(MachineFault::IllegalMemoryAddress(2048))
        );

        memory.reset();
        assert!(memory.backing_word(2047).unwrap().is_zero());
    }
}
