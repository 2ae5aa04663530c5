//! Integration test suite for the bytecode VM
//!
//! This crate provides integration tests that verify components work
//! together correctly across component boundaries, plus a few helpers for
//! building single-function snapshots.

use bytecode_system::{Constant, FunctionRecord, Instruction, OpCode, SnapshotWriter};

/// Re-export components for test convenience
pub mod components {
    pub use bytecode_system;
    pub use core_types;
    pub use interpreter;
    pub use js_cli;
    pub use memory_manager;
}

/// Snapshot holding only a program body with `constants` and `code`.
pub fn single_function(stack_size: u16, constants: Vec<Constant>, code: Vec<Instruction>) -> Vec<u8> {
    let mut writer = SnapshotWriter::new();
    writer.add_function(FunctionRecord {
        stack_size,
        constants,
        instructions: code,
        ..FunctionRecord::root()
    });
    writer.finish()
}

/// `LOADK r{register}, k{constant}`
pub fn load(register: u32, constant: u32) -> Instruction {
    Instruction::abx(OpCode::LoadK, register, constant)
}

/// `RETURN1 r{register}`
pub fn ret(register: u32) -> Instruction {
    Instruction::abc(OpCode::Return1, register, 0, 0)
}
