//! ROM boot image: reads a card deck into memory at 64 and jumps to it

use tracing::debug;

use crate::bitvector::Word;
use crate::control_unit::{TRAP_TABLE_BASE, MAX_TRAP_CODE};
use crate::error::SimulatorResult;
use crate::memory::MemoryControlUnit;

/// PC after IPL
pub const BOOT_START: u64 = 10;
/// Where the loaded program begins
pub const PROGRAM_START: u64 = 64;
/// Error handler: prints "ERR" and halts
pub const ERROR_HANDLER: u64 = 32;
/// Last card of a deck; never stored
pub const DECK_SENTINEL: &str = "11111111111111111111";

/// (address, word) pairs, fields grouped as opcode R X I T address
pub const BOOT_IMAGE: &[(u64, &str)] = &[
    // Data
    (1, "00000000000000101011"), // fault vector: 43
    (5, "00000000000000000000"), // zero, indexed store offset
    (6, "00000000000001000000"), // next load address: 64
    (7, DECK_SENTINEL),
    // Loader
    (10, "111111 11 00 0 0 00000010"), // CHK 3,0,2
    (11, "001010 11 00 0 0 00100000"), // JZ 3,0,32     deck ran out
    (12, "111101 00 00 0 0 00000010"), // IN 0,0,2
    (13, "000010 00 00 0 0 00001001"), // STR 0,0,9
    (14, "000101 00 00 0 0 00000111"), // SMR 0,0,7
    (15, "001010 00 00 0 0 00011000"), // JZ 0,0,24     sentinel
    (16, "000001 00 00 0 0 00001001"), // LDR 0,0,9
    (17, "101001 00 01 0 0 00000110"), // LDX 0,1,6
    (18, "000010 00 01 0 0 00000101"), // STR 0,1,5
    (19, "000001 01 00 0 0 00000110"), // LDR 1,0,6
    (20, "000110 01 00 0 0 00000001"), // AIR 1,0,1
    (21, "000010 01 00 0 0 00000110"), // STR 1,0,6
    (22, "001101 00 00 0 0 00001010"), // JMP 0,0,10
    (23, "000000 00 00 0 0 00000000"), // HLT
    (24, "001101 00 00 0 0 01000000"), // JMP 0,0,64
    // Error handler
    (32, "000001 00 00 0 0 00101000"), // LDR 0,0,40
    (33, "111110 00 00 0 0 00000001"), // OUT 0,0,1
    (34, "000001 00 00 0 0 00101001"), // LDR 0,0,41
    (35, "111110 00 00 0 0 00000001"), // OUT 0,0,1
    (36, "111110 00 00 0 0 00000001"), // OUT 0,0,1
    (37, "000000 00 00 0 0 00000000"), // HLT
    (40, "00000000000001000101"),      // 'E'
    (41, "00000000000001010010"),      // 'R'
    // Machine fault entry
    (43, "000001 00 00 0 0 00101110"), // LDR 0,0,46
    (44, "111110 00 00 0 0 00000001"), // OUT 0,0,1
    (45, "001101 00 00 0 0 00100000"), // JMP 0,0,32
    (46, "00000000000001000110"),      // 'F'
];

/// Writes the boot image through the engineer path. Every trap vector
/// points at the error handler.
pub fn load_boot_image(memory: &mut MemoryControlUnit) -> SimulatorResult<()> {
    for (address, binary) in BOOT_IMAGE {
        memory.engineer_store(*address, Word::from_binary_string(binary)?)?;
    }
    let handler = Word::word(ERROR_HANDLER as i128)?;
    for code in 0..=MAX_TRAP_CODE {
        memory.engineer_store(TRAP_TABLE_BASE + code, handler)?;
    }
    debug!(words = BOOT_IMAGE.len(), "boot image loaded");
    Ok(())
}
