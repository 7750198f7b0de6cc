//! Decoding helper functions.
//! Field positions count from the most significant bit, as in the
//! instruction layout table.

use super::{DecodedInstruction, Opcode};
use crate::bitvector::{Word, WORD_WIDTH};
use crate::error::MachineFault;

const OPCODE: (u32, u32) = (0, 5);
const REGISTER: (u32, u32) = (6, 7);
const INDEX: (u32, u32) = (8, 9);
const INDIRECT: u32 = 10;
const TRACE: u32 = 11;
const ADDRESS: (u32, u32) = (12, 19);

/// Extracts an inclusive field from a word. The ranges above always fit a
/// 20-bit word, so slicing cannot fail.
fn field(word: &Word, (start, stop): (u32, u32)) -> u64 {
    word.decompose(start, stop)
        .map(|bits| bits.unsigned())
        .unwrap_or_default()
}

fn flag(word: &Word, index: u32) -> bool {
    word.bit(index).unwrap_or_default()
}

/// Looks up the opcode field
pub fn raw_to_opcode(word: &Word) -> Result<Opcode, MachineFault> {
    Opcode::try_from(field(word, OPCODE) as u8)
}

/// Splits an instruction word into its fields
pub fn parse(word: Word) -> Result<DecodedInstruction, MachineFault> {
    let word = word.resize(WORD_WIDTH);
    Ok(DecodedInstruction {
        opcode: raw_to_opcode(&word)?,
        register: field(&word, REGISTER) as u8,
        index: field(&word, INDEX) as u8,
        indirect: flag(&word, INDIRECT),
        trace: flag(&word, TRACE),
        address: field(&word, ADDRESS) as u8,
    })
}
