//! Instruction representation

use std::fmt;

use crate::bitvector::{BitVector, Word, WORD_WIDTH};
use crate::error::MachineFault;

pub mod decode_helper;

macro_rules! opcodes {
    ($($name:ident = $code:literal),* $(,)?) => {
        /// Instruction-set opcode. Discriminants are the opcode field values.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u8)]
        pub enum Opcode {
            $($name = $code),*
        }

        impl Opcode {
            pub const ALL: &'static [Opcode] = &[$(Opcode::$name),*];

            pub fn mnemonic(&self) -> &'static str {
                match self {
                    $(Opcode::$name => stringify!($name)),*
                }
            }
        }
    };
}

opcodes! {
    HLT = 0,
    LDR = 1,
    STR = 2,
    LDA = 3,
    AMR = 4,
    SMR = 5,
    AIR = 6,
    SIR = 7,
    JZ = 10,
    JNE = 11,
    JCC = 12,
    JMP = 13,
    JSR = 14,
    RFS = 15,
    SOB = 16,
    JGE = 17,
    MLT = 20,
    DVD = 21,
    TRR = 22,
    AND = 23,
    ORR = 24,
    NOT = 25,
    TRAP = 30,
    SRC = 31,
    RRC = 32,
    FADD = 33,
    FSUB = 34,
    VADD = 35,
    VSUB = 36,
    CNVRT = 37,
    LDX = 41,
    STX = 42,
    LDFR = 50,
    STFR = 51,
    IN = 61,
    OUT = 62,
    CHK = 63,
}

impl Opcode {
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Branches whose outcome depends on machine state
    pub fn is_conditional_branch(&self) -> bool {
        matches!(self, Opcode::JCC | Opcode::JNE | Opcode::JGE | Opcode::SOB)
    }
}

impl TryFrom<u8> for Opcode {
    type Error = MachineFault;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Opcode::ALL
            .iter()
            .copied()
            .find(|opcode| opcode.code() == code)
            .ok_or(MachineFault::IllegalOpcode(code as u64))
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Fields of an instruction word, most significant bit first:
///
/// | bits  | field        |
/// |-------|--------------|
/// | 0-5   | opcode       |
/// | 6-7   | register     |
/// | 8-9   | index        |
/// | 10    | indirect     |
/// | 11    | trace        |
/// | 12-19 | address      |
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodedInstruction {
    pub opcode: Opcode,
    pub register: u8,
    pub index: u8,
    pub indirect: bool,
    pub trace: bool,
    pub address: u8,
}

impl DecodedInstruction {
    pub fn new(
        opcode: Opcode,
        register: u8,
        index: u8,
        indirect: bool,
        address: u8,
    ) -> Self {
        Self {
            opcode,
            register: register & 0b11,
            index: index & 0b11,
            indirect,
            trace: false,
            address,
        }
    }

    pub fn decode(word: Word) -> Result<Self, MachineFault> {
        decode_helper::parse(word)
    }

    pub fn with_trace(mut self) -> Self {
        self.trace = true;
        self
    }

    /// The address field as a full-width immediate operand
    pub fn immediate(&self) -> Word {
        BitVector::from_bits(WORD_WIDTH, self.address as u64)
    }

    pub fn encode(&self) -> Word {
        let bits = (self.opcode.code() as u64) << 14
            | ((self.register & 0b11) as u64) << 12
            | ((self.index & 0b11) as u64) << 10
            | (self.indirect as u64) << 9
            | (self.trace as u64) << 8
            | self.address as u64;
        BitVector::from_bits(WORD_WIDTH, bits)
    }
}

impl fmt::Display for DecodedInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {},{},{}",
            self.opcode, self.register, self.index, self.address
        )?;
        if self.indirect {
            write!(f, ",I")?;
        }
        Ok(())
    }
}

/// Assemble one instruction word
pub fn encode(
    opcode: Opcode,
    register: u8,
    index: u8,
    indirect: bool,
    address: u8,
) -> Word {
    DecodedInstruction::new(opcode, register, index, indirect, address).encode()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_opcode_codes_are_unique() {
        for (i, a) in Opcode::ALL.iter().enumerate() {
            for b in &Opcode::ALL[i + 1..] {
                assert_ne!(a.code(), b.code());
            }
            assert_eq!(Opcode::try_from(a.code()), Ok(*a));
        }
        assert_eq!(Opcode::ALL.len(), 37);
    }

    #[test]
    fn test_unknown_opcode() {
        for code in [8, 9, 18, 26, 40, 43, 60] {
            assert_eq!(
                Opcode::try_from(code),
                Err(MachineFault::IllegalOpcode(code as u64))
            );
        }
    }

    #[test]
    fn test_encode_layout() {
        let word = encode(Opcode::JMP, 0, 0, false, 64);
        assert_eq!(word.to_binary_string(), "00110100000001000000");

        let word = DecodedInstruction::new(Opcode::LDR, 3, 2, true, 255)
            .with_trace()
            .encode();
        assert_eq!(word.to_binary_string(), "00000111101111111111");
    }

    #[test]
    fn test_display() {
        assert_eq!(
            DecodedInstruction::new(Opcode::STR, 1, 2, true, 30).to_string(),
            "STR 1,2,30,I"
        );
        assert_eq!(Opcode::TRAP.to_string(), "TRAP");
    }
}
