pub mod alu;
pub mod bitvector;
pub mod boot;
pub mod branch_predictor;
pub mod computer;
pub mod control_unit;
pub mod cpu;
pub mod instruction;
pub mod io;
pub mod memory;
pub mod registers;
pub mod run_wrapper;

pub mod error;
