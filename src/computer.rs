//! Computer: CPU, memory, I/O and the branch predictor, advanced one tick
//! at a time

use tracing::debug;

use crate::bitvector::{BitVector, Word};
use crate::boot::{self, BOOT_START};
use crate::branch_predictor::BranchPredictor;
use crate::cpu::{CPUHistory, CPUPolicy, CentralProcessingUnit};
use crate::error::{ExecutionError, SimulatorError, SimulatorResult};
use crate::io::{CardReader, InputOutputController};
use crate::memory::{address_register, MemoryControlUnit};
use crate::registers::RegisterId;

/// Summary of a finished run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunOutcome {
    pub ticks: u64,
    pub instructions: u64,
}

#[derive(Debug)]
pub struct Computer {
    pub cpu: CentralProcessingUnit,
    pub memory: MemoryControlUnit,
    pub io: InputOutputController,
    pub predictor: BranchPredictor,
    pub policy: CPUPolicy,
    pub history: CPUHistory,
}

impl Computer {
    pub fn make(policy: CPUPolicy) -> SimulatorResult<Self> {
        policy.validate()?;
        Ok(Self {
            cpu: CentralProcessingUnit::make(),
            memory: MemoryControlUnit::make(policy.cache_policy()),
            io: InputOutputController::new(),
            predictor: BranchPredictor::new(),
            policy,
            history: CPUHistory::default(),
        })
    }

    pub fn attach_card_reader(&mut self, reader: CardReader) {
        self.io.attach_card_reader(reader);
    }

    /// Initial program load: clear everything, load the boot image and
    /// point the PC at the loader
    pub fn ipl(&mut self) -> SimulatorResult<()> {
        self.cpu.reset();
        self.memory.reset();
        self.predictor.clear();
        self.history = CPUHistory::default();

        boot::load_boot_image(&mut self.memory)?;
        self.cpu.control_unit.jump_to(address_register(BOOT_START)?);
        debug!(pc = BOOT_START, "IPL complete");
        Ok(())
    }

    pub fn is_halted(&self) -> bool {
        self.cpu.is_halted()
    }

    fn tick(&mut self) -> SimulatorResult<()> {
        self.cpu.clock_cycle(&mut self.memory, &mut self.io)?;
        self.memory.clock_cycle()
    }

    /// Advance one tick. Machine faults are vectored to their handler;
    /// anything else stops the machine.
    pub fn clock_cycle(&mut self) -> SimulatorResult<()> {
        if self.is_halted() {
            return Ok(());
        }
        self.history.cycle_count += 1;

        match self.tick() {
            Err(SimulatorError::Fault(fault)) => {
                self.history.fault_count += 1;
                self.cpu.signal_fault(fault, &mut self.memory, &mut self.io)?;
            }
            other => other?,
        }

        let control_unit = &mut self.cpu.control_unit;
        if let Some(branch) = control_unit.take_last_branch() {
            self.predictor.record_outcome(
                branch.address,
                branch.opcode,
                branch.taken,
            );
        }
        self.history.inst_count = control_unit.instruction_count();
        self.history.mem_stall_count = control_unit.stall_count();
        Ok(())
    }

    fn check_tick_limit(&self) -> SimulatorResult<()> {
        match self.policy.max_ticks {
            Some(limit) if self.history.cycle_count >= limit => {
                Err(ExecutionError::TickLimitReached(limit).into())
            }
            _ => Ok(()),
        }
    }

    /// Run ticks until the next instruction boundary. Returns the ticks used.
    pub fn step_instruction(&mut self) -> SimulatorResult<u64> {
        let start = self.history.cycle_count;
        while !self.is_halted() {
            self.check_tick_limit()?;
            self.clock_cycle()?;
            if self.cpu.control_unit.at_instruction_boundary() {
                break;
            }
        }
        Ok(self.history.cycle_count - start)
    }

    /// Run until HLT
    pub fn run(&mut self) -> SimulatorResult<RunOutcome> {
        while !self.is_halted() {
            self.check_tick_limit()?;
            self.clock_cycle()?;
        }
        Ok(RunOutcome {
            ticks: self.history.cycle_count,
            instructions: self.history.inst_count,
        })
    }

    /// Register the branches currently in memory with the predictor
    pub fn scan_branches(&mut self) -> SimulatorResult<()> {
        self.predictor.scan_memory(&mut self.memory)
    }

    pub fn register(&self, id: RegisterId) -> BitVector {
        match id {
            RegisterId::Mar => self.memory.mar(),
            RegisterId::Mbr => self.memory.mbr(),
            _ => self
                .cpu
                .control_unit
                .registers
                .read(id)
                .unwrap_or(BitVector::zero(id.width())),
        }
    }

    /// Operator deposit into a register. The value must fit its width.
    pub fn deposit(
        &mut self,
        id: RegisterId,
        value: i128,
    ) -> SimulatorResult<()> {
        let value = BitVector::new(id.width(), value)?;
        let accepted = match id {
            RegisterId::Mar => self.memory.set_mar(value),
            RegisterId::Mbr => self.memory.set_mbr(value),
            RegisterId::Pc => {
                self.cpu.control_unit.jump_to(value);
                true
            }
            _ => self.cpu.control_unit.registers.write(id, value),
        };
        if !accepted {
            return Err(SimulatorError::ConfigError(format!("{id} is busy")));
        }
        Ok(())
    }

    pub fn read_memory(&mut self, address: u64) -> SimulatorResult<Word> {
        Ok(self.memory.engineer_fetch(address)?)
    }

    pub fn write_memory(
        &mut self,
        address: u64,
        value: Word,
    ) -> SimulatorResult<()> {
        Ok(self.memory.engineer_store(address, value)?)
    }

    pub fn printer_output(&self) -> &str {
        self.io.printer.text()
    }
}
