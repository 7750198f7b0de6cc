//! Control unit: the fetch, decode, execute cycle as a micro-stepped
//! state machine. Every call to `clock_cycle` performs exactly one
//! micro-step.

pub mod handlers;

use tracing::{debug, info, warn};

use crate::alu::ArithmeticLogicUnit;
use crate::bitvector::{
    BitVector, Word, ADDRESS_WIDTH, FAULT_WIDTH, WORD_WIDTH,
};
use crate::error::{
    ExecutionError, MachineFault, SimulatorError, SimulatorResult,
};
use crate::instruction::{DecodedInstruction, Opcode};
use crate::io::InputOutputController;
use crate::memory::{address_register, MemoryControlUnit};
use crate::registers::RegisterFile;
use handlers::{handler_for, Handler};

/// Holds the handler address for machine faults
pub const FAULT_VECTOR_ADDRESS: u64 = 1;
/// TRAP saves PC+1 here
pub const TRAP_PC_ADDRESS: u64 = 2;
/// A machine fault saves the faulting PC here
pub const FAULT_PC_ADDRESS: u64 = 4;
/// First entry of the trap vector table
pub const TRAP_TABLE_BASE: u64 = 47;
/// Highest trap code with a table entry
pub const MAX_TRAP_CODE: u64 = 16;

/// Instruction cycle phase
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CycleState {
    #[default]
    FetchInstruction,
    DecodeInstruction,
    ExecuteInstruction,
    Halted,
}

/// What a handler's micro-step achieved
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Progress {
    /// Move on to the next micro-step
    Advance,
    /// Repeat this micro-step on the next tick
    Stall,
    /// Instruction finished; PC moves to the next word
    Complete,
    /// Instruction finished; PC takes the target
    Branch(BitVector),
    Halt,
}

/// The units a handler may drive during one micro-step
pub struct Bus<'a> {
    pub memory: &'a mut MemoryControlUnit,
    pub alu: &'a mut ArithmeticLogicUnit,
    pub io: &'a mut InputOutputController,
}

/// Outcome of an executed conditional branch
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BranchOutcome {
    pub address: u64,
    pub opcode: Opcode,
    pub taken: bool,
}

/// Control unit
#[derive(Debug)]
pub struct ControlUnit {
    pub registers: RegisterFile,

    state: CycleState,
    micro_state: u8,

    instruction: Option<DecodedInstruction>,
    handler: Option<Handler>,

    // Latched by the first execute micro-step of memory-reference opcodes
    effective_address: BitVector,

    last_branch: Option<BranchOutcome>,

    stall_count: u64,
    instruction_count: u64,
}

impl Default for ControlUnit {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlUnit {
    pub fn new() -> Self {
        Self {
            registers: RegisterFile::default(),
            state: CycleState::FetchInstruction,
            micro_state: 0,
            instruction: None,
            handler: None,
            effective_address: BitVector::zero(ADDRESS_WIDTH),
            last_branch: None,
            stall_count: 0,
            instruction_count: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn micro_state(&self) -> u8 {
        self.micro_state
    }

    pub fn is_halted(&self) -> bool {
        self.state == CycleState::Halted
    }

    /// True between instructions
    pub fn at_instruction_boundary(&self) -> bool {
        self.state == CycleState::FetchInstruction && self.micro_state == 0
    }

    /// The instruction being executed, once decoded
    pub fn current_instruction(&self) -> Option<DecodedInstruction> {
        self.instruction
    }

    pub fn stall_count(&self) -> u64 {
        self.stall_count
    }

    pub fn instruction_count(&self) -> u64 {
        self.instruction_count
    }

    /// Hands over the outcome of the last conditional branch, if any
    pub fn take_last_branch(&mut self) -> Option<BranchOutcome> {
        self.last_branch.take()
    }

    /// Set the PC, e.g. from the operator console or IPL
    pub fn jump_to(&mut self, address: BitVector) {
        self.registers.pc = address.resize(ADDRESS_WIDTH);
        self.state = CycleState::FetchInstruction;
        self.micro_state = 0;
        self.instruction = None;
        self.handler = None;
    }

    pub fn clock_cycle(&mut self, bus: &mut Bus<'_>) -> SimulatorResult<()> {
        match self.state {
            CycleState::Halted => Ok(()),
            CycleState::FetchInstruction => {
                self.fetch_step(bus.memory);
                Ok(())
            }
            CycleState::DecodeInstruction => self.decode_step(),
            CycleState::ExecuteInstruction => self.execute_step(bus),
        }
    }

    fn fetch_step(&mut self, memory: &mut MemoryControlUnit) {
        let progress = match self.micro_state {
            0 => Self::request_fetch(memory, self.registers.pc),
            _ => match Self::await_memory(memory) {
                Progress::Advance => {
                    self.registers.ir = memory.mbr();
                    self.state = CycleState::DecodeInstruction;
                    self.micro_state = 0;
                    debug!(
                        pc = self.registers.pc.unsigned(),
                        ir = %self.registers.ir,
                        "fetched instruction"
                    );
                    return;
                }
                other => other,
            },
        };
        self.follow(progress);
    }

    fn decode_step(&mut self) -> SimulatorResult<()> {
        let instruction = DecodedInstruction::decode(self.registers.ir)?;
        let handler = handler_for(instruction.opcode).ok_or(
            ExecutionError::NotImplemented(instruction.opcode.mnemonic()),
        )?;

        if instruction.trace {
            info!(pc = self.registers.pc.unsigned(), %instruction, "trace");
        } else {
            debug!(pc = self.registers.pc.unsigned(), %instruction, "decoded");
        }

        self.instruction = Some(instruction);
        self.handler = Some(handler);
        self.state = CycleState::ExecuteInstruction;
        self.micro_state = 0;
        Ok(())
    }

    fn execute_step(&mut self, bus: &mut Bus<'_>) -> SimulatorResult<()> {
        let (Some(instruction), Some(handler)) =
            (self.instruction, self.handler)
        else {
            // Nothing decoded: start over from fetch
            self.jump_to(self.registers.pc);
            return Ok(());
        };

        match handler(self, instruction, bus)? {
            Progress::Complete => {
                let next =
                    address_register(self.registers.pc.unsigned() + 1)?;
                self.finish(next);
            }
            Progress::Branch(target) => self.finish(target),
            Progress::Halt => {
                self.instruction_count += 1;
                self.state = CycleState::Halted;
                debug!(pc = self.registers.pc.unsigned(), "halted");
            }
            other => self.follow(other),
        }
        Ok(())
    }

    fn follow(&mut self, progress: Progress) {
        match progress {
            Progress::Advance => self.micro_state += 1,
            Progress::Stall => self.stall_count += 1,
            _ => {}
        }
    }

    fn finish(&mut self, next_pc: BitVector) {
        self.instruction_count += 1;
        self.jump_to(next_pc);
    }

    /// MAR <- address and raise fetch. Stalls while memory is busy.
    pub(crate) fn request_fetch(
        memory: &mut MemoryControlUnit,
        address: BitVector,
    ) -> Progress {
        if !memory.set_mar(address) {
            return Progress::Stall;
        }
        memory.signal_fetch();
        Progress::Advance
    }

    /// MAR <- address, MBR <- value and raise store
    pub(crate) fn request_store(
        memory: &mut MemoryControlUnit,
        address: BitVector,
        value: Word,
    ) -> Progress {
        if !memory.set_mar(address) || !memory.set_mbr(value) {
            return Progress::Stall;
        }
        memory.signal_store();
        Progress::Advance
    }

    pub(crate) fn await_memory(memory: &MemoryControlUnit) -> Progress {
        if memory.is_busy() {
            Progress::Stall
        } else {
            Progress::Advance
        }
    }

    /// Effective address of a memory-reference instruction:
    ///
    /// | I | X    | EA                                      |
    /// |---|------|-----------------------------------------|
    /// | 0 | 0    | address                                 |
    /// | 0 | 1..3 | c(Xx) + c(address)                      |
    /// | 1 | 0    | c(c(address))                           |
    /// | 1 | 1..3 | c(c(Xx) + c(address))                   |
    ///
    /// Operand reads are non-clocked. With `indexed` false the X field is
    /// ignored (LDX and STX use it to name their register).
    pub fn effective_address(
        &self,
        instruction: &DecodedInstruction,
        memory: &mut MemoryControlUnit,
        indexed: bool,
    ) -> SimulatorResult<BitVector> {
        let field = instruction.address as u64;
        let index = if indexed { instruction.index } else { 0 };

        let base = match index {
            0 => None,
            x => {
                let offset = memory.engineer_fetch(field)?.unsigned();
                Some(self.registers.index(x).unsigned() + offset)
            }
        };
        let address = match (instruction.indirect, base) {
            (false, None) => field,
            (false, Some(base)) => base,
            (true, None) => {
                let pointer = memory.engineer_fetch(field)?.unsigned();
                memory.engineer_fetch(pointer)?.unsigned()
            }
            (true, Some(base)) => memory.engineer_fetch(base)?.unsigned(),
        };
        Ok(address_register(address)?)
    }

    /// Compute and latch the effective address
    pub(crate) fn latch_effective_address(
        &mut self,
        instruction: &DecodedInstruction,
        memory: &mut MemoryControlUnit,
        indexed: bool,
    ) -> SimulatorResult<Progress> {
        self.effective_address =
            self.effective_address(instruction, memory, indexed)?;
        debug!(ea = self.effective_address.unsigned(), "effective address");
        Ok(Progress::Advance)
    }

    /// Vector to the machine fault handler: MFR <- fault id, memory[4] <- PC,
    /// PC <- memory[1]. Any pending memory or ALU work is discarded.
    pub fn signal_fault(
        &mut self,
        fault: MachineFault,
        bus: &mut Bus<'_>,
    ) -> SimulatorResult<()> {
        warn!(%fault, pc = self.registers.pc.unsigned(), "machine fault");
        bus.memory.abort();
        bus.alu.reset();
        self.registers.mfr = BitVector::from_bits(FAULT_WIDTH, fault.code());

        let pc =
            BitVector::from_bits(WORD_WIDTH, self.registers.pc.unsigned());
        let target = bus
            .memory
            .engineer_store(FAULT_PC_ADDRESS, pc)
            .and_then(|_| bus.memory.engineer_fetch(FAULT_VECTOR_ADDRESS))
            .and_then(|target| address_register(target.unsigned()))
            .map_err(|_| {
                SimulatorError::from(ExecutionError::DoubleFault(fault))
            })?;

        self.jump_to(target);
        Ok(())
    }
}
