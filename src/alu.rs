//! ALU implementation

use tracing::debug;

use crate::bitvector::{BitVector, PRODUCT_WIDTH, WORD_WIDTH};
use crate::error::{ExecutionError, SimulatorResult};

/// Control codes accepted by the ALU
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ALUOp {
    #[default]
    NONE,
    ADD,
    SUBTRACT,
    MULTIPLY,
    DIVIDE,
}

/// Condition flags produced by a computation. The control unit merges
/// these into its condition code register; the ALU never touches it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConditionFlags {
    pub overflow: bool,
    pub underflow: bool,
    pub divide_by_zero: bool,
}

/// Result value plus the flags it raised
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AluOutput {
    pub value: BitVector,
    pub flags: ConditionFlags,
}

/// Performs an atomic ALU operation
pub fn alu(op: ALUOp, op1: &BitVector, op2: &BitVector) -> AluOutput {
    match op {
        ALUOp::NONE => AluOutput {
            value: *op1,
            flags: ConditionFlags::default(),
        },
        ALUOp::ADD => add(op1, op2),
        ALUOp::SUBTRACT => subtract(op1, op2),
        ALUOp::MULTIPLY => multiply(op1, op2),
        ALUOp::DIVIDE => divide(op1, op2),
    }
}

/// Ripple-carry addition of two equal-width bit patterns with a carry in.
/// Returns the sum bits and whether the carry ran off the top.
fn ripple_add(width: u32, a: u64, b: u64, carry_in: bool) -> (u64, bool) {
    let mut sum = 0u64;
    let mut carry = carry_in as u64;
    for i in 0..width {
        let x = (a >> i) & 1;
        let y = (b >> i) & 1;
        sum |= (x ^ y ^ carry) << i;
        carry = (x & y) | (carry & (x ^ y));
    }
    (sum, carry == 1)
}

fn add_with(op1: &BitVector, op2: &BitVector, invert: bool) -> AluOutput {
    let width = op1.width().max(op2.width());
    let a = op1.sign_extend(width).unsigned();
    let b = op2.sign_extend(width);
    let b = if invert { (!b).unsigned() } else { b.unsigned() };
    let (sum, carry_out) = ripple_add(width, a, b, invert);

    let wide = if invert {
        op1.signed() as i128 - op2.signed() as i128
    } else {
        op1.signed() as i128 + op2.signed() as i128
    };

    AluOutput {
        value: BitVector::from_bits(width, sum),
        flags: ConditionFlags {
            overflow: carry_out,
            underflow: wide < BitVector::min_signed(width),
            divide_by_zero: false,
        },
    }
}

/// Twos-complement addition; result width is the wider operand's
pub fn add(op1: &BitVector, op2: &BitVector) -> AluOutput {
    add_with(op1, op2, false)
}

/// Subtraction as invert + add one + add
pub fn subtract(op1: &BitVector, op2: &BitVector) -> AluOutput {
    add_with(op1, op2, true)
}

fn fits(width: u32, value: i128) -> bool {
    value >= BitVector::min_signed(width)
        && value <= BitVector::max_signed(width)
}

/// Full-precision signed product, truncated to 40 bits
pub fn multiply(op1: &BitVector, op2: &BitVector) -> AluOutput {
    let product = op1.signed() as i128 * op2.signed() as i128;
    AluOutput {
        value: BitVector::from_bits(PRODUCT_WIDTH, product as u64),
        flags: ConditionFlags {
            overflow: !fits(PRODUCT_WIDTH, product),
            ..Default::default()
        },
    }
}

/// Floored signed division. Quotient goes in the high 20 bits and the
/// remainder in the low 20 bits of a 40-bit result. A zero divisor raises
/// the divide-by-zero flag and yields quotient 0, remainder = dividend.
pub fn divide(op1: &BitVector, op2: &BitVector) -> AluOutput {
    let dividend = op1.signed() as i128;
    let divisor = op2.signed() as i128;

    let (quotient, remainder, divide_by_zero) = if divisor == 0 {
        (0, dividend, true)
    } else {
        let mut quotient = dividend / divisor;
        if dividend % divisor != 0 && ((dividend < 0) != (divisor < 0)) {
            quotient -= 1;
        }
        (quotient, dividend - quotient * divisor, false)
    };

    let high = BitVector::from_bits(WORD_WIDTH, quotient as u64).unsigned();
    let low = BitVector::from_bits(WORD_WIDTH, remainder as u64).unsigned();

    AluOutput {
        value: BitVector::from_bits(PRODUCT_WIDTH, (high << WORD_WIDTH) | low),
        flags: ConditionFlags {
            overflow: !fits(WORD_WIDTH, quotient)
                || !fits(WORD_WIDTH, remainder),
            underflow: false,
            divide_by_zero,
        },
    }
}

/// ALU state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AluState {
    #[default]
    Idle,
    StartComputation,
    ComputationFinished,
}

/// Clocked ALU: operands and a control code are latched, a ready signal
/// is raised, and the next tick computes the result and clears the inputs.
#[derive(Debug, Default)]
pub struct ArithmeticLogicUnit {
    operand1: Option<BitVector>,
    operand2: Option<BitVector>,
    control: ALUOp,
    state: AluState,
    result: Option<AluOutput>,
}

impl ArithmeticLogicUnit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_operand1(&mut self, value: BitVector) {
        self.operand1 = Some(value);
        self.state = AluState::Idle;
    }

    pub fn set_operand2(&mut self, value: BitVector) {
        self.operand2 = Some(value);
        self.state = AluState::Idle;
    }

    pub fn set_control(&mut self, op: ALUOp) {
        self.control = op;
    }

    /// Latches both operands and the control code in one go
    pub fn load(&mut self, op: ALUOp, op1: BitVector, op2: BitVector) {
        self.set_operand1(op1);
        self.set_operand2(op2);
        self.set_control(op);
    }

    /// Both operands are present; compute on the next tick
    pub fn signal_ready(&mut self) {
        self.state = AluState::StartComputation;
    }

    pub fn state(&self) -> AluState {
        self.state
    }

    /// The last finished computation, retained until new operands arrive
    pub fn result(&self) -> Option<AluOutput> {
        match self.state {
            AluState::ComputationFinished => self.result,
            _ => None,
        }
    }

    pub fn clock_cycle(&mut self) -> SimulatorResult<()> {
        if self.state != AluState::StartComputation {
            return Ok(());
        }

        let op1 = self
            .operand1
            .take()
            .ok_or(ExecutionError::MissingOperand("operand 1"))?;
        let op2 = self
            .operand2
            .take()
            .ok_or(ExecutionError::MissingOperand("operand 2"))?;

        let output = alu(self.control, &op1, &op2);
        debug!(
            op = ?self.control,
            ?op1,
            ?op2,
            result = ?output.value,
            flags = ?output.flags,
            "ALU computed"
        );

        self.result = Some(output);
        self.control = ALUOp::NONE;
        self.state = AluState::ComputationFinished;
        Ok(())
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(width: u32, value: i128) -> BitVector {
        BitVector::new(width, value).unwrap()
    }

    #[test]
    fn test_add() {
        let result = add(&unit(5, 1), &unit(5, 1));
        assert_eq!(result.value.to_binary_string(), "00010");
        assert_eq!(result.flags, ConditionFlags::default());
    }

    #[test]
    fn test_subtract() {
        let result = subtract(&unit(5, 17), &unit(5, 14));
        assert_eq!(result.value.to_binary_string(), "00011");
    }

    #[test]
    fn test_subtract_negative_result() {
        let result = subtract(&unit(20, 3), &unit(20, 5));
        assert_eq!(result.value.signed(), -2);
        assert!(!result.flags.underflow);
    }

    #[test]
    fn test_add_mixed_width() {
        let result = add(&unit(3, -1), &unit(8, 10));
        assert_eq!(result.value.width(), 8);
        assert_eq!(result.value.signed(), 9);
    }

    #[test]
    fn test_overflow_then_cleared() {
        let mut alu = ArithmeticLogicUnit::new();

        alu.load(ALUOp::ADD, unit(5, -15), unit(5, -15));
        alu.signal_ready();
        alu.clock_cycle().unwrap();
        let flags = alu.result().unwrap().flags;
        assert!(flags.overflow);
        assert!(flags.underflow);

        alu.load(ALUOp::ADD, unit(5, 31), unit(5, 31));
        alu.signal_ready();
        alu.clock_cycle().unwrap();
        assert!(alu.result().unwrap().flags.overflow);

        alu.load(ALUOp::ADD, unit(5, 1), unit(5, 1));
        alu.signal_ready();
        alu.clock_cycle().unwrap();
        let output = alu.result().unwrap();
        assert_eq!(output.value.unsigned(), 2);
        assert!(!output.flags.overflow);
        assert!(!output.flags.underflow);
    }

    #[test]
    fn test_overflow_is_carry_out() {
        // 15 + 15 runs into the sign bit but never carries out of it, so
        // neither flag is raised even though 30 has no 5-bit signed form
        let result = add(&unit(5, 15), &unit(5, 15));
        assert_eq!(result.value.to_binary_string(), "11110");
        assert_eq!(result.flags, ConditionFlags::default());

        // One more and the carry leaves the top bit
        let result = add(&unit(5, 15), &unit(5, 17));
        assert_eq!(result.value.to_binary_string(), "00000");
        assert!(result.flags.overflow);
    }

    #[test]
    fn test_multiply() {
        let result = multiply(&unit(20, -300), &unit(20, 1000));
        assert_eq!(result.value.width(), PRODUCT_WIDTH);
        assert_eq!(result.value.signed(), -300_000);
        assert!(!result.flags.overflow);

        let big = unit(64, BitVector::max_signed(64));
        assert!(multiply(&big, &big).flags.overflow);
    }

    #[test]
    fn test_divide_floored() {
        let result = divide(&unit(20, -7), &unit(20, 2));
        let quotient = result.value.decompose(0, 19).unwrap();
        let remainder = result.value.decompose(20, 39).unwrap();
        assert_eq!(quotient.signed(), -4);
        assert_eq!(remainder.signed(), 1);

        let result = divide(&unit(20, 7), &unit(20, -2));
        assert_eq!(result.value.decompose(0, 19).unwrap().signed(), -4);
        assert_eq!(result.value.decompose(20, 39).unwrap().signed(), -1);
    }

    #[test]
    fn test_divide_by_zero() {
        let mut alu = ArithmeticLogicUnit::new();
        alu.load(ALUOp::DIVIDE, unit(20, 42), unit(20, 0));
        alu.signal_ready();
        alu.clock_cycle().unwrap();

        let output = alu.result().unwrap();
        assert!(output.flags.divide_by_zero);
        assert_eq!(output.value.decompose(0, 19).unwrap().unsigned(), 0);
        assert_eq!(output.value.decompose(20, 39).unwrap().unsigned(), 42);
    }

    #[test]
    fn test_state_machine() {
        let mut alu = ArithmeticLogicUnit::new();
        assert_eq!(alu.state(), AluState::Idle);

        alu.load(ALUOp::SUBTRACT, unit(20, 10), unit(20, 4));
        // Nothing happens until ready is signalled
        alu.clock_cycle().unwrap();
        assert_eq!(alu.result(), None);

        alu.signal_ready();
        assert_eq!(alu.state(), AluState::StartComputation);
        alu.clock_cycle().unwrap();
        assert_eq!(alu.state(), AluState::ComputationFinished);
        assert_eq!(alu.result().unwrap().value.unsigned(), 6);

        // Kept across idle ticks, dropped once new operands arrive
        alu.clock_cycle().unwrap();
        assert_eq!(alu.result().unwrap().value.unsigned(), 6);
        alu.set_operand1(unit(20, 1));
        assert_eq!(alu.state(), AluState::Idle);
        assert_eq!(alu.result(), None);
    }

    #[test]
    fn test_missing_operand() {
        let mut alu = ArithmeticLogicUnit::new();
        alu.set_operand1(unit(20, 1));
        alu.set_control(ALUOp::ADD);
        alu.signal_ready();
        let error = alu.clock_cycle().unwrap_err();
        assert!(matches!(
            error,
            crate::error::SimulatorError::Execution(
                ExecutionError::MissingOperand("operand 2")
            )
        ));
    }
}
