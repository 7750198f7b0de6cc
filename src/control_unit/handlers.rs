//! Per-opcode micro-sequences. Each handler runs one micro-step per call,
//! selected by the control unit's micro-state, and reports its progress.

use super::{
    BranchOutcome, Bus, ControlUnit, Progress, MAX_TRAP_CODE, TRAP_PC_ADDRESS,
    TRAP_TABLE_BASE,
};
use crate::alu::ALUOp;
use crate::bitvector::{Word, WORD_WIDTH};
use crate::error::{MachineFault, SimulatorResult};
use crate::instruction::{DecodedInstruction, Opcode};
use crate::memory::address_register;
use crate::registers::RegisterFile;

pub type Handler = fn(
    &mut ControlUnit,
    DecodedInstruction,
    &mut Bus<'_>,
) -> SimulatorResult<Progress>;

/// Dispatch table. Opcodes that decode but have no micro-sequence map to
/// `None`.
pub fn handler_for(opcode: Opcode) -> Option<Handler> {
    use Opcode::*;
    let handler: Handler = match opcode {
        HLT => halt,
        LDR => ldr,
        STR => store,
        LDA => lda,
        AMR => amr,
        SMR => smr,
        AIR => air,
        SIR => sir,
        JZ => jz,
        JNE => jne,
        JCC => jcc,
        JMP => jmp,
        SOB => sob,
        JGE => jge,
        MLT => mlt,
        DVD => dvd,
        TRR => trr,
        TRAP => trap,
        LDX => ldx,
        STX => stx,
        IN => input,
        OUT => output,
        CHK => check,
        JSR | RFS | AND | ORR | NOT | SRC | RRC | FADD | FSUB | VADD | VSUB
        | CNVRT | LDFR | STFR => return None,
    };
    Some(handler)
}

fn word(value: u64) -> Word {
    Word::from_bits(WORD_WIDTH, value)
}

fn halt(
    _: &mut ControlUnit,
    _: DecodedInstruction,
    _: &mut Bus<'_>,
) -> SimulatorResult<Progress> {
    Ok(Progress::Halt)
}

/// EA, MAR <- EA, wait for MBR, register <- MBR
fn load_sequence(
    cu: &mut ControlUnit,
    inst: &DecodedInstruction,
    bus: &mut Bus<'_>,
    indexed: bool,
    write: impl FnOnce(&mut RegisterFile, Word),
) -> SimulatorResult<Progress> {
    match cu.micro_state {
        0 => cu.latch_effective_address(inst, bus.memory, indexed),
        1 => Ok(ControlUnit::request_fetch(bus.memory, cu.effective_address)),
        2 => Ok(ControlUnit::await_memory(bus.memory)),
        _ => {
            write(&mut cu.registers, bus.memory.mbr());
            Ok(Progress::Complete)
        }
    }
}

/// EA, MAR <- EA and MBR <- value, wait for the write
fn store_sequence(
    cu: &mut ControlUnit,
    inst: &DecodedInstruction,
    bus: &mut Bus<'_>,
    indexed: bool,
    value: Word,
) -> SimulatorResult<Progress> {
    match cu.micro_state {
        0 => cu.latch_effective_address(inst, bus.memory, indexed),
        1 => Ok(ControlUnit::request_store(
            bus.memory,
            cu.effective_address,
            value,
        )),
        _ => Ok(match ControlUnit::await_memory(bus.memory) {
            Progress::Advance => Progress::Complete,
            other => other,
        }),
    }
}

fn ldr(
    cu: &mut ControlUnit,
    inst: DecodedInstruction,
    bus: &mut Bus<'_>,
) -> SimulatorResult<Progress> {
    load_sequence(cu, &inst, bus, true, |registers, value| {
        registers.set_gpr(inst.register, value)
    })
}

fn store(
    cu: &mut ControlUnit,
    inst: DecodedInstruction,
    bus: &mut Bus<'_>,
) -> SimulatorResult<Progress> {
    let value = cu.registers.gpr(inst.register);
    store_sequence(cu, &inst, bus, true, value)
}

/// Loads the word at EA into index slot R
fn lda(
    cu: &mut ControlUnit,
    inst: DecodedInstruction,
    bus: &mut Bus<'_>,
) -> SimulatorResult<Progress> {
    load_sequence(cu, &inst, bus, true, |registers, value| {
        registers.set_index(inst.register, value)
    })
}

fn ldx(
    cu: &mut ControlUnit,
    inst: DecodedInstruction,
    bus: &mut Bus<'_>,
) -> SimulatorResult<Progress> {
    load_sequence(cu, &inst, bus, false, |registers, value| {
        registers.set_index(inst.index, value)
    })
}

fn stx(
    cu: &mut ControlUnit,
    inst: DecodedInstruction,
    bus: &mut Bus<'_>,
) -> SimulatorResult<Progress> {
    let value = cu.registers.index(inst.index).resize(WORD_WIDTH);
    store_sequence(cu, &inst, bus, false, value)
}

/// Collects the ALU result into register R and applies its flags
fn retire_arithmetic(
    cu: &mut ControlUnit,
    inst: &DecodedInstruction,
    bus: &mut Bus<'_>,
) -> Progress {
    let Some(output) = bus.alu.result() else {
        return Progress::Stall;
    };
    cu.registers.set_gpr(inst.register, output.value);
    cu.registers.cc.apply(output.flags);
    Progress::Complete
}

/// R <- c(R) op c(EA)
fn memory_arithmetic(
    cu: &mut ControlUnit,
    inst: &DecodedInstruction,
    bus: &mut Bus<'_>,
    op: ALUOp,
) -> SimulatorResult<Progress> {
    match cu.micro_state {
        0 => cu.latch_effective_address(inst, bus.memory, true),
        1 => Ok(ControlUnit::request_fetch(bus.memory, cu.effective_address)),
        2 => {
            if ControlUnit::await_memory(bus.memory) == Progress::Stall {
                return Ok(Progress::Stall);
            }
            bus.alu.load(op, cu.registers.gpr(inst.register), bus.memory.mbr());
            bus.alu.signal_ready();
            Ok(Progress::Advance)
        }
        _ => Ok(retire_arithmetic(cu, inst, bus)),
    }
}

/// R <- c(R) op immediate
fn immediate_arithmetic(
    cu: &mut ControlUnit,
    inst: &DecodedInstruction,
    bus: &mut Bus<'_>,
    op: ALUOp,
) -> SimulatorResult<Progress> {
    match cu.micro_state {
        0 => {
            bus.alu.load(op, cu.registers.gpr(inst.register), inst.immediate());
            bus.alu.signal_ready();
            Ok(Progress::Advance)
        }
        _ => Ok(retire_arithmetic(cu, inst, bus)),
    }
}

fn amr(
    cu: &mut ControlUnit,
    inst: DecodedInstruction,
    bus: &mut Bus<'_>,
) -> SimulatorResult<Progress> {
    memory_arithmetic(cu, &inst, bus, ALUOp::ADD)
}

fn smr(
    cu: &mut ControlUnit,
    inst: DecodedInstruction,
    bus: &mut Bus<'_>,
) -> SimulatorResult<Progress> {
    memory_arithmetic(cu, &inst, bus, ALUOp::SUBTRACT)
}

fn air(
    cu: &mut ControlUnit,
    inst: DecodedInstruction,
    bus: &mut Bus<'_>,
) -> SimulatorResult<Progress> {
    immediate_arithmetic(cu, &inst, bus, ALUOp::ADD)
}

fn sir(
    cu: &mut ControlUnit,
    inst: DecodedInstruction,
    bus: &mut Bus<'_>,
) -> SimulatorResult<Progress> {
    immediate_arithmetic(cu, &inst, bus, ALUOp::SUBTRACT)
}

/// MLT and DVD only name registers 0 and 2
fn register_pair(inst: &DecodedInstruction) -> Result<(u8, u8), MachineFault> {
    let (rx, ry) = (inst.register, inst.index);
    if rx % 2 != 0 || ry % 2 != 0 {
        return Err(MachineFault::IllegalOpcode(inst.opcode.code() as u64));
    }
    Ok((rx, ry))
}

/// rx <- high word, rx+1 <- low word of a 40-bit result
fn double_register(
    cu: &mut ControlUnit,
    inst: &DecodedInstruction,
    bus: &mut Bus<'_>,
    op: ALUOp,
) -> SimulatorResult<Progress> {
    let (rx, ry) = register_pair(inst)?;
    match cu.micro_state {
        0 => {
            bus.alu.load(op, cu.registers.gpr(rx), cu.registers.gpr(ry));
            bus.alu.signal_ready();
            Ok(Progress::Advance)
        }
        _ => {
            let Some(output) = bus.alu.result() else {
                return Ok(Progress::Stall);
            };
            let high = output.value.decompose(0, WORD_WIDTH - 1)?;
            let low = output.value.decompose(WORD_WIDTH, 2 * WORD_WIDTH - 1)?;
            cu.registers.set_gpr(rx, high);
            cu.registers.set_gpr(rx + 1, low);
            cu.registers.cc.apply(output.flags);
            Ok(Progress::Complete)
        }
    }
}

fn mlt(
    cu: &mut ControlUnit,
    inst: DecodedInstruction,
    bus: &mut Bus<'_>,
) -> SimulatorResult<Progress> {
    double_register(cu, &inst, bus, ALUOp::MULTIPLY)
}

fn dvd(
    cu: &mut ControlUnit,
    inst: DecodedInstruction,
    bus: &mut Bus<'_>,
) -> SimulatorResult<Progress> {
    double_register(cu, &inst, bus, ALUOp::DIVIDE)
}

fn trr(
    cu: &mut ControlUnit,
    inst: DecodedInstruction,
    _: &mut Bus<'_>,
) -> SimulatorResult<Progress> {
    let registers = &mut cu.registers;
    registers.cc.equal_or_not =
        registers.gpr(inst.register) == registers.gpr(inst.index);
    Ok(Progress::Complete)
}

/// EA, then branch when `condition` holds
fn branch_sequence(
    cu: &mut ControlUnit,
    inst: &DecodedInstruction,
    bus: &mut Bus<'_>,
    condition: impl FnOnce(&RegisterFile) -> bool,
) -> SimulatorResult<Progress> {
    match cu.micro_state {
        0 => cu.latch_effective_address(inst, bus.memory, true),
        _ => {
            let taken = condition(&cu.registers);
            Ok(resolve_branch(cu, inst, taken))
        }
    }
}

fn resolve_branch(
    cu: &mut ControlUnit,
    inst: &DecodedInstruction,
    taken: bool,
) -> Progress {
    if inst.opcode.is_conditional_branch() {
        cu.last_branch = Some(BranchOutcome {
            address: cu.registers.pc.unsigned(),
            opcode: inst.opcode,
            taken,
        });
    }
    if taken {
        Progress::Branch(cu.effective_address)
    } else {
        Progress::Complete
    }
}

fn jz(
    cu: &mut ControlUnit,
    inst: DecodedInstruction,
    bus: &mut Bus<'_>,
) -> SimulatorResult<Progress> {
    branch_sequence(cu, &inst, bus, |registers| {
        registers.gpr(inst.register).is_zero()
    })
}

fn jne(
    cu: &mut ControlUnit,
    inst: DecodedInstruction,
    bus: &mut Bus<'_>,
) -> SimulatorResult<Progress> {
    branch_sequence(cu, &inst, bus, |registers| {
        !registers.gpr(inst.register).is_zero()
    })
}

/// The R field selects the condition code bit
fn jcc(
    cu: &mut ControlUnit,
    inst: DecodedInstruction,
    bus: &mut Bus<'_>,
) -> SimulatorResult<Progress> {
    branch_sequence(cu, &inst, bus, |registers| registers.cc.bit(inst.register))
}

fn jmp(
    cu: &mut ControlUnit,
    inst: DecodedInstruction,
    bus: &mut Bus<'_>,
) -> SimulatorResult<Progress> {
    branch_sequence(cu, &inst, bus, |_| true)
}

fn jge(
    cu: &mut ControlUnit,
    inst: DecodedInstruction,
    bus: &mut Bus<'_>,
) -> SimulatorResult<Progress> {
    branch_sequence(cu, &inst, bus, |registers| {
        registers.gpr(inst.register).signed() >= 0
    })
}

/// R <- c(R) - 1, branch while the result is positive. Flags are left alone.
fn sob(
    cu: &mut ControlUnit,
    inst: DecodedInstruction,
    bus: &mut Bus<'_>,
) -> SimulatorResult<Progress> {
    match cu.micro_state {
        0 => cu.latch_effective_address(&inst, bus.memory, true),
        1 => {
            let count = cu.registers.gpr(inst.register);
            bus.alu.load(ALUOp::SUBTRACT, count, word(1));
            bus.alu.signal_ready();
            Ok(Progress::Advance)
        }
        _ => {
            let Some(output) = bus.alu.result() else {
                return Ok(Progress::Stall);
            };
            cu.registers.set_gpr(inst.register, output.value);
            Ok(resolve_branch(cu, &inst, output.value.signed() > 0))
        }
    }
}

/// memory[2] <- PC+1, PC <- memory[47 + code]
fn trap(
    cu: &mut ControlUnit,
    inst: DecodedInstruction,
    bus: &mut Bus<'_>,
) -> SimulatorResult<Progress> {
    let code = inst.address as u64;
    if code > MAX_TRAP_CODE {
        return Err(MachineFault::IllegalTrapCode(code).into());
    }
    let return_address = word(cu.registers.pc.unsigned() + 1);
    bus.memory.engineer_store(TRAP_PC_ADDRESS, return_address)?;
    let target = bus.memory.engineer_fetch(TRAP_TABLE_BASE + code)?;
    Ok(Progress::Branch(address_register(target.unsigned())?))
}

fn input(
    cu: &mut ControlUnit,
    inst: DecodedInstruction,
    bus: &mut Bus<'_>,
) -> SimulatorResult<Progress> {
    let value = bus.io.input(inst.address as u64)?;
    cu.registers.set_gpr(inst.register, value);
    Ok(Progress::Complete)
}

fn output(
    cu: &mut ControlUnit,
    inst: DecodedInstruction,
    bus: &mut Bus<'_>,
) -> SimulatorResult<Progress> {
    bus.io.output(inst.address as u64, cu.registers.gpr(inst.register))?;
    Ok(Progress::Complete)
}

fn check(
    cu: &mut ControlUnit,
    inst: DecodedInstruction,
    bus: &mut Bus<'_>,
) -> SimulatorResult<Progress> {
    let status = bus.io.check_status(inst.address as u64)?;
    cu.registers.set_gpr(inst.register, status.to_word());
    Ok(Progress::Complete)
}
