//! Register file owned by the control unit

use std::fmt;
use std::str::FromStr;

use crate::alu::ConditionFlags;
use crate::bitvector::{BitVector, Word, ADDRESS_WIDTH, FAULT_WIDTH, WORD_WIDTH};
use crate::error::SimulatorError;

/// Width of the condition code register
pub const CC_WIDTH: u32 = 4;

/// Condition code bits, in register order
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConditionCode {
    pub overflow: bool,
    pub underflow: bool,
    pub divide_by_zero: bool,
    pub equal_or_not: bool,
}

impl ConditionCode {
    /// Overwrites the arithmetic flags with those of the latest result
    pub fn apply(&mut self, flags: ConditionFlags) {
        self.overflow = flags.overflow;
        self.underflow = flags.underflow;
        self.divide_by_zero = flags.divide_by_zero;
    }

    /// Bit `index` as tested by JCC: 0 overflow, 1 underflow,
    /// 2 divide-by-zero, 3 equal-or-not
    pub fn bit(&self, index: u8) -> bool {
        match index & 0b11 {
            0 => self.overflow,
            1 => self.underflow,
            2 => self.divide_by_zero,
            _ => self.equal_or_not,
        }
    }

    pub fn to_bitvector(&self) -> BitVector {
        let bits = (self.overflow as u64) << 3
            | (self.underflow as u64) << 2
            | (self.divide_by_zero as u64) << 1
            | self.equal_or_not as u64;
        BitVector::from_bits(CC_WIDTH, bits)
    }

    pub fn from_bitvector(value: BitVector) -> Self {
        let value = value.resize(CC_WIDTH);
        Self {
            overflow: value.unsigned() & 0b1000 != 0,
            underflow: value.unsigned() & 0b0100 != 0,
            divide_by_zero: value.unsigned() & 0b0010 != 0,
            equal_or_not: value.unsigned() & 0b0001 != 0,
        }
    }
}

/// Every register visible to an operator
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RegisterId {
    R0,
    R1,
    R2,
    R3,
    X1,
    X2,
    X3,
    Pc,
    Ir,
    Msr,
    Mfr,
    Cc,
    Mar,
    Mbr,
}

impl RegisterId {
    pub const ALL: [RegisterId; 14] = [
        RegisterId::R0,
        RegisterId::R1,
        RegisterId::R2,
        RegisterId::R3,
        RegisterId::X1,
        RegisterId::X2,
        RegisterId::X3,
        RegisterId::Pc,
        RegisterId::Ir,
        RegisterId::Msr,
        RegisterId::Mfr,
        RegisterId::Cc,
        RegisterId::Mar,
        RegisterId::Mbr,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            RegisterId::R0 => "R0",
            RegisterId::R1 => "R1",
            RegisterId::R2 => "R2",
            RegisterId::R3 => "R3",
            RegisterId::X1 => "X1",
            RegisterId::X2 => "X2",
            RegisterId::X3 => "X3",
            RegisterId::Pc => "PC",
            RegisterId::Ir => "IR",
            RegisterId::Msr => "MSR",
            RegisterId::Mfr => "MFR",
            RegisterId::Cc => "CC",
            RegisterId::Mar => "MAR",
            RegisterId::Mbr => "MBR",
        }
    }

    pub fn width(&self) -> u32 {
        match self {
            RegisterId::X1 | RegisterId::X2 | RegisterId::X3 => ADDRESS_WIDTH,
            RegisterId::Pc | RegisterId::Mar => ADDRESS_WIDTH,
            RegisterId::Mfr => FAULT_WIDTH,
            RegisterId::Cc => CC_WIDTH,
            _ => WORD_WIDTH,
        }
    }
}

impl fmt::Display for RegisterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RegisterId {
    type Err = SimulatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RegisterId::ALL
            .iter()
            .copied()
            .find(|id| id.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                SimulatorError::ConfigError(format!("unknown register '{s}'"))
            })
    }
}

/// Register file
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterFile {
    pub pc: BitVector,
    pub ir: Word,
    pub msr: Word,
    pub mfr: BitVector,
    pub gpr: [Word; 4],
    /// Slot 0 exists so LDA can target it, but no addressing mode reads it
    pub index: [BitVector; 4],
    pub cc: ConditionCode,
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self {
            pc: BitVector::zero(ADDRESS_WIDTH),
            ir: Word::zero(WORD_WIDTH),
            msr: Word::zero(WORD_WIDTH),
            mfr: BitVector::zero(FAULT_WIDTH),
            gpr: [Word::zero(WORD_WIDTH); 4],
            index: [BitVector::zero(ADDRESS_WIDTH); 4],
            cc: ConditionCode::default(),
        }
    }
}

impl RegisterFile {
    /// Reads a register; `None` for the memory interface registers
    pub fn read(&self, id: RegisterId) -> Option<BitVector> {
        Some(match id {
            RegisterId::R0 => self.gpr[0],
            RegisterId::R1 => self.gpr[1],
            RegisterId::R2 => self.gpr[2],
            RegisterId::R3 => self.gpr[3],
            RegisterId::X1 => self.index[1],
            RegisterId::X2 => self.index[2],
            RegisterId::X3 => self.index[3],
            RegisterId::Pc => self.pc,
            RegisterId::Ir => self.ir,
            RegisterId::Msr => self.msr,
            RegisterId::Mfr => self.mfr,
            RegisterId::Cc => self.cc.to_bitvector(),
            RegisterId::Mar | RegisterId::Mbr => return None,
        })
    }

    /// Writes a register, truncating to its width. Returns false for the
    /// memory interface registers.
    pub fn write(&mut self, id: RegisterId, value: BitVector) -> bool {
        let value = value.resize(id.width());
        match id {
            RegisterId::R0 => self.gpr[0] = value,
            RegisterId::R1 => self.gpr[1] = value,
            RegisterId::R2 => self.gpr[2] = value,
            RegisterId::R3 => self.gpr[3] = value,
            RegisterId::X1 => self.index[1] = value,
            RegisterId::X2 => self.index[2] = value,
            RegisterId::X3 => self.index[3] = value,
            RegisterId::Pc => self.pc = value,
            RegisterId::Ir => self.ir = value,
            RegisterId::Msr => self.msr = value,
            RegisterId::Mfr => self.mfr = value,
            RegisterId::Cc => self.cc = ConditionCode::from_bitvector(value),
            RegisterId::Mar | RegisterId::Mbr => return false,
        }
        true
    }

    pub fn set_gpr(&mut self, register: u8, value: Word) {
        self.gpr[(register & 0b11) as usize] = value.resize(WORD_WIDTH);
    }

    pub fn gpr(&self, register: u8) -> Word {
        self.gpr[(register & 0b11) as usize]
    }

    pub fn set_index(&mut self, register: u8, value: BitVector) {
        self.index[(register & 0b11) as usize] = value.resize(ADDRESS_WIDTH);
    }

    pub fn index(&self, register: u8) -> BitVector {
        self.index[(register & 0b11) as usize]
    }
}
