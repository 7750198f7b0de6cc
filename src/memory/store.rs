//! Backing store: 8 banks of 256 words, addressed by (bank, cell)

use super::{MemoryLocation, BANK_CELLS, BANK_COUNT};
use crate::bitvector::{Word, WORD_WIDTH};

/// Backing store. Exclusively owned by the memory control unit; the cache
/// only borrows it to load and write back blocks.
#[derive(Clone, Debug)]
pub struct BackingStore {
    // banks[b][c] stores the word at address c * BANK_COUNT + b
    banks: Vec<Vec<Word>>,
}

impl Default for BackingStore {
    fn default() -> Self {
        Self::make()
    }
}

impl BackingStore {
    /// Make a zero-filled store
    pub fn make() -> Self {
        Self {
            banks: vec![vec![Word::zero(WORD_WIDTH); BANK_CELLS]; BANK_COUNT],
        }
    }

    pub fn get(&self, location: MemoryLocation) -> Word {
        self.banks[location.bank][location.cell]
    }

    pub fn set(&mut self, location: MemoryLocation, value: Word) {
        self.banks[location.bank][location.cell] = value.resize(WORD_WIDTH);
    }

    /// Copy `len` consecutive cells of one bank starting at `first_cell`
    pub fn read_block(
        &self,
        bank: usize,
        first_cell: usize,
        len: usize,
    ) -> Vec<Word> {
        self.banks[bank][first_cell..first_cell + len].to_vec()
    }

    /// Write a block back into consecutive cells of one bank
    pub fn write_block(
        &mut self,
        bank: usize,
        first_cell: usize,
        block: &[Word],
    ) {
        let cells = first_cell..first_cell + block.len();
        self.banks[bank][cells].copy_from_slice(block);
    }

    /// Zero every cell
    pub fn clear(&mut self) {
        for bank in self.banks.iter_mut() {
            bank.fill(Word::zero(WORD_WIDTH));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_on_power_up() {
        let store = BackingStore::make();
        for bank in 0..BANK_COUNT {
            for cell in [0, 17, BANK_CELLS - 1] {
                assert!(store.get(MemoryLocation { bank, cell }).is_zero());
            }
        }
    }

    #[test]
    fn test_set_get() {
        let mut store = BackingStore::make();
        let location = MemoryLocation { bank: 3, cell: 200 };
        store.set(location, Word::word(1023).unwrap());
        assert_eq!(store.get(location).unsigned(), 1023);
        assert!(store.get(MemoryLocation { bank: 2, cell: 200 }).is_zero());
    }

    #[test]
    fn test_blocks() {
        let mut store = BackingStore::make();
        let block: Vec<Word> =
            (0..4).map(|v| Word::word(v + 10).unwrap()).collect();
        store.write_block(5, 32, &block);
        assert_eq!(store.read_block(5, 32, 4), block);
        let last = store.get(MemoryLocation { bank: 5, cell: 35 });
        assert_eq!(last.unsigned(), 13);

        store.clear();
        assert!(store.read_block(5, 32, 4).iter().all(|w| w.is_zero()));
    }
}
