use thiserror::Error;

/// Top-level error type for the simulator
#[derive(Error, Debug)]
pub enum SimulatorError {
    #[error("Machine fault: {0}")]
    Fault(#[from] MachineFault),

    #[error("Invalid value: {0}")]
    Value(#[from] BitVectorError),

    #[error("CPU execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

/// Machine faults raised during a tick. These are recoverable: the computer
/// vectors to the fault handler instead of stopping.
///
/// Fault ID    Fault Type
///     0       Illegal Memory Address
///     1       Illegal TRAP Code
///     2       Illegal Opcode
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineFault {
    #[error("illegal memory address {0}")]
    IllegalMemoryAddress(u64),

    #[error("illegal trap code {0}")]
    IllegalTrapCode(u64),

    #[error("illegal opcode {0}")]
    IllegalOpcode(u64),
}

impl MachineFault {
    /// The ID recorded in the machine fault register
    pub fn code(&self) -> u64 {
        match self {
            MachineFault::IllegalMemoryAddress(_) => 0,
            MachineFault::IllegalTrapCode(_) => 1,
            MachineFault::IllegalOpcode(_) => 2,
        }
    }
}

/// Errors constructing or slicing fixed-width values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BitVectorError {
    #[error("width {0} outside the valid range 1-64")]
    InvalidWidth(u32),

    #[error("{value} out of range for width {width}: [{min} through {max}]")]
    OutOfRange { value: i128, width: u32, min: i128, max: i128 },

    #[error("invalid binary digit '{0}'")]
    InvalidDigit(char),

    #[error("empty binary string")]
    Empty,

    #[error("binary string of {0} digits exceeds 64 bits")]
    TooLong(usize),

    #[error("bit range {start}..={stop} outside width {width}")]
    IndexOutOfRange { start: u32, stop: u32, width: u32 },
}

/// Errors related to CPU execution
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("opcode {0} is not implemented")]
    NotImplemented(&'static str),

    #[error("ALU computation started with missing {0}")]
    MissingOperand(&'static str),

    #[error("Execution limit reached: {0} ticks")]
    TickLimitReached(u64),

    #[error("fault raised while vectoring to the fault handler: {0}")]
    DoubleFault(MachineFault),
}

/// Errors related to peripheral devices
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("no device attached with id {0}")]
    NoSuchDevice(u64),

    #[error("{device} does not support {operation}")]
    Unsupported { device: &'static str, operation: &'static str },

    #[error("{0} has no data available")]
    Starved(&'static str),

    #[error("invalid card at line {line}: {reason}")]
    InvalidCard { line: usize, reason: String },
}

/// Type alias for Result with SimulatorError
pub type SimulatorResult<T> = Result<T, SimulatorError>;
