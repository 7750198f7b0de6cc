//! CPU implementation: the control unit and the ALU it drives

use crate::alu::ArithmeticLogicUnit;
use crate::control_unit::{Bus, ControlUnit};
use crate::error::{MachineFault, SimulatorError, SimulatorResult};
use crate::io::InputOutputController;
use crate::memory::cache::CachePolicy;
use crate::memory::MemoryControlUnit;

/// CPU state
#[derive(Debug, Default)]
pub struct CentralProcessingUnit {
    pub control_unit: ControlUnit,
    pub alu: ArithmeticLogicUnit,
}

impl CentralProcessingUnit {
    pub fn make() -> Self {
        Self::default()
    }

    /// One tick: a control unit micro-step, then the ALU
    pub fn clock_cycle(
        &mut self,
        memory: &mut MemoryControlUnit,
        io: &mut InputOutputController,
    ) -> SimulatorResult<()> {
        let mut bus = Bus {
            memory,
            alu: &mut self.alu,
            io,
        };
        self.control_unit.clock_cycle(&mut bus)?;
        self.alu.clock_cycle()
    }

    pub fn signal_fault(
        &mut self,
        fault: MachineFault,
        memory: &mut MemoryControlUnit,
        io: &mut InputOutputController,
    ) -> SimulatorResult<()> {
        let mut bus = Bus {
            memory,
            alu: &mut self.alu,
            io,
        };
        self.control_unit.signal_fault(fault, &mut bus)
    }

    pub fn is_halted(&self) -> bool {
        self.control_unit.is_halted()
    }

    pub fn reset(&mut self) {
        self.control_unit.reset();
        self.alu.reset();
    }
}

/// CPU policy
#[derive(Clone, Copy, Debug)]
pub struct CPUPolicy {
    pub verbose: bool,
    pub history: bool,
    pub cache_enabled: bool,
    pub cache: CachePolicy,
    /// Give up after this many ticks
    pub max_ticks: Option<u64>,
}

impl Default for CPUPolicy {
    fn default() -> Self {
        Self {
            verbose: false,
            history: false,
            cache_enabled: true,
            cache: CachePolicy::default(),
            max_ticks: None,
        }
    }
}

impl CPUPolicy {
    pub fn cache_policy(&self) -> Option<CachePolicy> {
        self.cache_enabled.then_some(self.cache)
    }

    pub fn validate(&self) -> SimulatorResult<()> {
        if self.cache_enabled && !self.cache.is_valid() {
            return Err(SimulatorError::ConfigError(format!(
                "invalid cache geometry: {} lines of {} words",
                self.cache.lines, self.cache.block_size
            )));
        }
        Ok(())
    }
}

/// History module
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CPUHistory {
    pub cycle_count: u64,
    pub inst_count: u64,
    pub mem_stall_count: u64,
    pub fault_count: u64,
}

impl CPUHistory {
    /// Cycles per instruction
    pub fn get_cpi(&self) -> f64 {
        if self.inst_count == 0 {
            return 0.;
        }
        self.cycle_count as f64 / self.inst_count as f64
    }
}
